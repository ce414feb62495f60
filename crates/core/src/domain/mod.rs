pub mod dimension;
pub mod numeric;
pub mod period;
pub mod rag;
pub mod renewal;
pub mod segment;

//! Source adapters and the report service that fans queries out to them.

pub mod service;
pub mod sources;

pub use service::{ReportService, ServiceResponse, ServiceSettings, SourceAvailability};
pub use sources::{
    CrmSource, InMemoryCrm, InMemoryWarehouse, JsonSnapshotSource, PeriodSnapshot, Snapshot,
    SourceError, WarehouseSource,
};

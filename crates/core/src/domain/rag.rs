use serde::{Deserialize, Serialize};

/// Health of a metric against its threshold policy.
///
/// `NoData` is only produced when there is no sample to judge (for example a
/// win rate with no closed deals); it is never a softer `Red`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RagStatus {
    Green,
    Yellow,
    Red,
    #[default]
    NoData,
}

impl RagStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Green => "GREEN",
            Self::Yellow => "YELLOW",
            Self::Red => "RED",
            Self::NoData => "NO_DATA",
        }
    }
}

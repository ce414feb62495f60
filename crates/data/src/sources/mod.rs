use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use revpulse_core::domain::period::{FiscalQuarter, ReportPeriod};
use revpulse_core::domain::renewal::{
    ContractRecord, CurrencyTable, RenewalOpportunity, RenewalTarget,
};
use revpulse_core::domain::segment::{ActionItem, AttainmentRow, SourceAttainmentRow};

pub mod memory;
pub mod snapshot;

pub use memory::{InMemoryCrm, InMemoryWarehouse};
pub use snapshot::{JsonSnapshotSource, PeriodSnapshot, Snapshot};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("{source_name} is unavailable: {message}")]
    Unavailable { source_name: &'static str, message: String },
    #[error("{source_name} did not answer within {timeout_secs}s")]
    Timeout { source_name: &'static str, timeout_secs: u64 },
    #[error("{source_name} has no data for {what}")]
    NotFound { source_name: &'static str, what: String },
    #[error("decode error: {0}")]
    Decode(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Bookings facts, targets and reference tables from the data warehouse.
#[async_trait]
pub trait WarehouseSource: Send + Sync {
    async fn attainment_rows(&self, period: &ReportPeriod)
        -> Result<Vec<AttainmentRow>, SourceError>;

    async fn source_attainment_rows(
        &self,
        period: &ReportPeriod,
    ) -> Result<Vec<SourceAttainmentRow>, SourceError>;

    async fn action_items(&self) -> Result<Vec<ActionItem>, SourceError>;

    async fn renewal_targets(&self) -> Result<Vec<RenewalTarget>, SourceError>;

    async fn currency_rates(&self) -> Result<CurrencyTable, SourceError>;

    /// Problems found while ingesting upstream data that did not stop the
    /// source from answering, such as rows dropped for an unknown dimension.
    fn ingest_warnings(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Contracts and renewal opportunities from the CRM.
#[async_trait]
pub trait CrmSource: Send + Sync {
    /// Activated contracts whose end date is on or after `as_of`.
    async fn renewal_contracts(&self, as_of: NaiveDate) -> Result<Vec<ContractRecord>, SourceError>;

    async fn renewal_opportunities(
        &self,
        quarter: &FiscalQuarter,
    ) -> Result<Vec<RenewalOpportunity>, SourceError>;

    fn ingest_warnings(&self) -> Vec<String> {
        Vec::new()
    }
}

pub mod config;
pub mod domain;
pub mod errors;
pub mod metrics;

pub use config::{AppConfig, ConfigError, EngineConfig, LoadOptions, LogFormat};
pub use domain::dimension::{Category, Dimension, Product, Region, ReportSelection, Selection, Source};
pub use domain::period::{FiscalQuarter, PeriodInfo, ReportPeriod};
pub use domain::rag::RagStatus;
pub use domain::renewal::{
    ContractRecord, CurrencyTable, RenewalContract, RenewalOpportunity, RenewalReport,
    RenewalSummary, RenewalTarget,
};
pub use domain::segment::{ActionItem, AttainmentRow, SegmentMeasures, SourceAttainmentRow};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use metrics::comparison::{compare, compare_aggregates, MetricComparison, Trend};
pub use metrics::rag::{Classifier, TableClassifier, ThresholdPolicy, ThresholdTables};
pub use metrics::renewal::{
    DeterministicRenewalForecaster, RenewalForecaster, RenewalInputs, RenewalPolicy,
};
pub use metrics::rollup::{recompute_aggregate, AggregateTotal, Rollup};
pub use metrics::{
    DashboardInput, DashboardReport, DashboardRuntime, DeterministicDashboardRuntime,
    PeriodComparison,
};

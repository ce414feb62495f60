//! Request orchestration: query every source once, concurrently, then hand
//! immutable snapshots to the engine.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde::Serialize;
use tokio::task::JoinSet;
use uuid::Uuid;

use revpulse_core::config::AppConfig;
use revpulse_core::domain::dimension::{ReportSelection, Selection};
use revpulse_core::domain::period::ReportPeriod;
use revpulse_core::domain::renewal::RenewalReport;
use revpulse_core::errors::{ApplicationError, DomainError};
use revpulse_core::metrics::rag::TableClassifier;
use revpulse_core::metrics::renewal::{
    DeterministicRenewalForecaster, RenewalForecaster, RenewalInputs,
};
use revpulse_core::metrics::{
    DashboardInput, DashboardReport, DashboardRuntime, DeterministicDashboardRuntime,
    PeriodComparison,
};

use crate::sources::{CrmSource, SourceError, WarehouseSource};

const WAREHOUSE: &str = "warehouse";
const CRM: &str = "crm";

/// Per-source limits. With `crm_enabled` off the CRM is never queried and
/// its answers count as unavailable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ServiceSettings {
    pub warehouse_timeout: Duration,
    pub crm_timeout: Duration,
    pub crm_enabled: bool,
}

impl ServiceSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            warehouse_timeout: Duration::from_secs(config.warehouse.timeout_secs),
            crm_timeout: Duration::from_secs(config.crm.timeout_secs),
            crm_enabled: config.crm.enabled,
        }
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            warehouse_timeout: Duration::from_secs(30),
            crm_timeout: Duration::from_secs(20),
            crm_enabled: true,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SourceAvailability {
    pub warehouse: bool,
    pub crm: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceResponse<T> {
    pub correlation_id: String,
    pub sources: SourceAvailability,
    pub warnings: Vec<String>,
    pub data: T,
}

pub struct ReportService<W: ?Sized, C: ?Sized> {
    warehouse: Arc<W>,
    crm: Arc<C>,
    dashboard: Arc<DeterministicDashboardRuntime<TableClassifier>>,
    forecaster: Arc<DeterministicRenewalForecaster>,
    settings: ServiceSettings,
}

impl<W, C> ReportService<W, C>
where
    W: WarehouseSource + ?Sized,
    C: CrmSource + ?Sized,
{
    pub fn new(
        warehouse: Arc<W>,
        crm: Arc<C>,
        dashboard: DeterministicDashboardRuntime<TableClassifier>,
        forecaster: DeterministicRenewalForecaster,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            warehouse,
            crm,
            dashboard: Arc::new(dashboard),
            forecaster: Arc::new(forecaster),
            settings,
        }
    }

    pub fn from_config(warehouse: Arc<W>, crm: Arc<C>, config: &AppConfig) -> Self {
        let engine = &config.engine;
        let tables = engine.threshold_tables();
        Self::new(
            warehouse,
            crm,
            DeterministicDashboardRuntime::with_tables(
                tables.clone(),
                engine.fiscal_quarter(),
                engine.trend_epsilon_percent,
            ),
            DeterministicRenewalForecaster::new(
                engine.renewal_policy(),
                TableClassifier::new(tables),
            ),
            ServiceSettings::from_config(config),
        )
    }

    /// Bookings attainment for one period under a selection.
    pub async fn build_report(
        &self,
        period: ReportPeriod,
        selection: &ReportSelection,
        as_of: NaiveDate,
    ) -> Result<ServiceResponse<DashboardReport>, ApplicationError> {
        validate_period(&period)?;
        let correlation_id = new_correlation_id();
        tracing::info!(
            event_name = "report.bookings.started",
            correlation_id = %correlation_id,
            period_start = %period.start,
            period_end = %period.end,
            "building bookings report"
        );

        let limit = self.settings.warehouse_timeout;
        let (attainment, sources, action_items) = tokio::join!(
            bounded(WAREHOUSE, limit, self.warehouse.attainment_rows(&period)),
            bounded(WAREHOUSE, limit, self.warehouse.source_attainment_rows(&period)),
            bounded(WAREHOUSE, limit, self.warehouse.action_items()),
        );

        let mut warnings = self.warehouse.ingest_warnings();
        let warehouse_available = attainment.is_ok() && sources.is_ok() && action_items.is_ok();
        let attainment = absorb(attainment, "attainment rows", &correlation_id, &mut warnings);
        let sources = absorb(sources, "source attainment rows", &correlation_id, &mut warnings);
        let action_items = absorb(action_items, "action items", &correlation_id, &mut warnings);

        let report = self.dashboard.build_report(DashboardInput {
            data_available: attainment.is_some(),
            attainment_rows: &attainment.unwrap_or_default(),
            source_rows: &sources.unwrap_or_default(),
            action_items: &action_items.unwrap_or_default(),
            selection,
            as_of,
        });

        tracing::info!(
            event_name = "report.bookings.completed",
            correlation_id = %correlation_id,
            warnings = warnings.len(),
            "bookings report ready"
        );

        Ok(ServiceResponse {
            correlation_id,
            sources: SourceAvailability { warehouse: warehouse_available, crm: false },
            warnings,
            data: report,
        })
    }

    /// Renewal forecast for every selected product.
    ///
    /// Contracts, renewal opportunities, targets and currency rates are
    /// fetched concurrently; each product is then forecast on its own task.
    pub async fn build_renewals(
        &self,
        selection: &ReportSelection,
        as_of: NaiveDate,
    ) -> Result<ServiceResponse<RenewalReport>, ApplicationError> {
        let correlation_id = new_correlation_id();
        tracing::info!(
            event_name = "report.renewals.started",
            correlation_id = %correlation_id,
            as_of = %as_of,
            "building renewal forecast"
        );

        let quarter = self.forecaster.policy().fiscal_quarter;
        let warehouse_limit = self.settings.warehouse_timeout;
        let (contracts, opportunities, targets, currency) = tokio::join!(
            self.crm_query(self.crm.renewal_contracts(as_of)),
            self.crm_query(self.crm.renewal_opportunities(&quarter)),
            bounded(WAREHOUSE, warehouse_limit, self.warehouse.renewal_targets()),
            bounded(WAREHOUSE, warehouse_limit, self.warehouse.currency_rates()),
        );

        let mut warnings = self.warehouse.ingest_warnings();
        if self.settings.crm_enabled {
            for warning in self.crm.ingest_warnings() {
                if !warnings.contains(&warning) {
                    warnings.push(warning);
                }
            }
        }
        let warehouse_available = targets.is_ok() && currency.is_ok();
        if contracts.is_err() {
            tracing::warn!(
                event_name = "report.renewals.crm_unavailable",
                correlation_id = %correlation_id,
                "contract source unavailable; renewal summaries will be zeroed"
            );
        }
        let inputs = Arc::new(RenewalInputs {
            contracts: absorb(contracts, "renewal contracts", &correlation_id, &mut warnings),
            opportunities: absorb(
                opportunities,
                "renewal opportunities",
                &correlation_id,
                &mut warnings,
            ),
            targets: absorb(targets, "renewal targets", &correlation_id, &mut warnings)
                .unwrap_or_default(),
            currency: absorb(currency, "currency rates", &correlation_id, &mut warnings)
                .unwrap_or_default(),
        });

        let mut tasks = JoinSet::new();
        for product in selection.products.allowed_values() {
            let forecaster = Arc::clone(&self.forecaster);
            let inputs = Arc::clone(&inputs);
            let scoped = ReportSelection {
                products: Selection::from_values([product]),
                ..selection.clone()
            };
            let task_correlation_id = correlation_id.clone();
            tasks.spawn(async move {
                tracing::debug!(
                    event_name = "report.renewals.product",
                    correlation_id = %task_correlation_id,
                    product = %product,
                    "forecasting product renewals"
                );
                forecaster.forecast(&inputs, &scoped, as_of)
            });
        }

        let mut report = RenewalReport {
            crm_available: inputs.contracts.is_some(),
            ..RenewalReport::default()
        };
        while let Some(joined) = tasks.join_next().await {
            let part = joined.map_err(|error| {
                ApplicationError::Computation(format!("renewal forecast task failed: {error}"))
            })?;
            report.products.extend(part.products);
            for warning in part.warnings {
                if !report.warnings.contains(&warning) {
                    report.warnings.push(warning);
                }
            }
        }

        tracing::info!(
            event_name = "report.renewals.completed",
            correlation_id = %correlation_id,
            products = report.products.len(),
            crm_available = report.crm_available,
            "renewal forecast ready"
        );

        Ok(ServiceResponse {
            correlation_id,
            sources: SourceAvailability { warehouse: warehouse_available, crm: report.crm_available },
            warnings,
            data: report,
        })
    }

    /// Compares `period` with the equal-length window right before it. Both
    /// periods run the full filter and rollup pipeline before the diff.
    pub async fn compare_periods(
        &self,
        period: ReportPeriod,
        selection: &ReportSelection,
    ) -> Result<ServiceResponse<PeriodComparison>, ApplicationError> {
        validate_period(&period)?;
        let correlation_id = new_correlation_id();
        let previous = period.previous();
        tracing::info!(
            event_name = "report.comparison.started",
            correlation_id = %correlation_id,
            period_start = %period.start,
            previous_start = %previous.start,
            "building period comparison"
        );

        let limit = self.settings.warehouse_timeout;
        let (current_rows, previous_rows) = tokio::join!(
            bounded(WAREHOUSE, limit, self.warehouse.attainment_rows(&period)),
            bounded(WAREHOUSE, limit, self.warehouse.attainment_rows(&previous)),
        );

        let mut warnings = self.warehouse.ingest_warnings();
        let warehouse_available = current_rows.is_ok() && previous_rows.is_ok();
        let current_rows =
            absorb(current_rows, "current period rows", &correlation_id, &mut warnings)
                .unwrap_or_default();
        let previous_rows =
            absorb(previous_rows, "previous period rows", &correlation_id, &mut warnings)
                .unwrap_or_default();

        let comparison = self.dashboard.compare_periods(&current_rows, &previous_rows, selection);

        Ok(ServiceResponse {
            correlation_id,
            sources: SourceAvailability { warehouse: warehouse_available, crm: false },
            warnings,
            data: comparison,
        })
    }

    /// Runs a CRM query under the CRM timeout, or answers unavailable
    /// without polling it when the CRM is switched off.
    async fn crm_query<T, F>(&self, query: F) -> Result<T, SourceError>
    where
        F: Future<Output = Result<T, SourceError>>,
    {
        if !self.settings.crm_enabled {
            return Err(SourceError::Unavailable {
                source_name: CRM,
                message: "disabled by configuration (crm.enabled = false)".to_string(),
            });
        }
        bounded(CRM, self.settings.crm_timeout, query).await
    }
}

fn new_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

fn validate_period(period: &ReportPeriod) -> Result<(), ApplicationError> {
    if period.end < period.start {
        return Err(DomainError::InvalidPeriod { start: period.start, end: period.end }.into());
    }
    Ok(())
}

async fn bounded<T, F>(source_name: &'static str, limit: Duration, query: F) -> Result<T, SourceError>
where
    F: Future<Output = Result<T, SourceError>>,
{
    match tokio::time::timeout(limit, query).await {
        Ok(result) => result,
        Err(_) => Err(SourceError::Timeout { source_name, timeout_secs: limit.as_secs() }),
    }
}

/// Turns a failed query into a warning; the report renders without it.
fn absorb<T>(
    result: Result<T, SourceError>,
    query: &'static str,
    correlation_id: &str,
    warnings: &mut Vec<String>,
) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(error) => {
            tracing::warn!(
                event_name = "report.source.failed",
                correlation_id = %correlation_id,
                query,
                error = %error,
                "source query failed; continuing without it"
            );
            warnings.push(format!("{query}: {error}"));
            None
        }
    }
}

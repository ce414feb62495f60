use std::collections::HashMap;

use chrono::NaiveDate;
use tokio::sync::RwLock;

use revpulse_core::domain::period::{FiscalQuarter, ReportPeriod};
use revpulse_core::domain::renewal::{
    ContractRecord, CurrencyTable, RenewalOpportunity, RenewalTarget,
};
use revpulse_core::domain::segment::{ActionItem, AttainmentRow, SourceAttainmentRow};

use super::{CrmSource, SourceError, WarehouseSource};

const WAREHOUSE: &str = "warehouse";
const CRM: &str = "crm";

#[derive(Clone, Debug, Default)]
struct PeriodRows {
    attainment: Vec<AttainmentRow>,
    sources: Vec<SourceAttainmentRow>,
}

#[derive(Default)]
pub struct InMemoryWarehouse {
    periods: RwLock<HashMap<ReportPeriod, PeriodRows>>,
    action_items: RwLock<Vec<ActionItem>>,
    renewal_targets: RwLock<Vec<RenewalTarget>>,
    currency: RwLock<CurrencyTable>,
}

impl InMemoryWarehouse {
    pub async fn insert_period(
        &self,
        period: ReportPeriod,
        attainment: Vec<AttainmentRow>,
        sources: Vec<SourceAttainmentRow>,
    ) {
        let mut periods = self.periods.write().await;
        periods.insert(period, PeriodRows { attainment, sources });
    }

    pub async fn set_action_items(&self, items: Vec<ActionItem>) {
        *self.action_items.write().await = items;
    }

    pub async fn set_renewal_targets(&self, targets: Vec<RenewalTarget>) {
        *self.renewal_targets.write().await = targets;
    }

    pub async fn set_currency_rates(&self, currency: CurrencyTable) {
        *self.currency.write().await = currency;
    }

    async fn period_rows(&self, period: &ReportPeriod) -> Result<PeriodRows, SourceError> {
        let periods = self.periods.read().await;
        periods.get(period).cloned().ok_or_else(|| SourceError::NotFound {
            source_name: WAREHOUSE,
            what: format!("period {} to {}", period.start, period.end),
        })
    }
}

#[async_trait::async_trait]
impl WarehouseSource for InMemoryWarehouse {
    async fn attainment_rows(
        &self,
        period: &ReportPeriod,
    ) -> Result<Vec<AttainmentRow>, SourceError> {
        Ok(self.period_rows(period).await?.attainment)
    }

    async fn source_attainment_rows(
        &self,
        period: &ReportPeriod,
    ) -> Result<Vec<SourceAttainmentRow>, SourceError> {
        Ok(self.period_rows(period).await?.sources)
    }

    async fn action_items(&self) -> Result<Vec<ActionItem>, SourceError> {
        Ok(self.action_items.read().await.clone())
    }

    async fn renewal_targets(&self) -> Result<Vec<RenewalTarget>, SourceError> {
        Ok(self.renewal_targets.read().await.clone())
    }

    async fn currency_rates(&self) -> Result<CurrencyTable, SourceError> {
        Ok(self.currency.read().await.clone())
    }
}

/// A CRM stand-in. Each collection starts unset, and an unset collection
/// answers as an unavailable source.
#[derive(Default)]
pub struct InMemoryCrm {
    contracts: RwLock<Option<Vec<ContractRecord>>>,
    opportunities: RwLock<Option<Vec<RenewalOpportunity>>>,
}

impl InMemoryCrm {
    pub async fn set_contracts(&self, contracts: Vec<ContractRecord>) {
        *self.contracts.write().await = Some(contracts);
    }

    pub async fn set_opportunities(&self, opportunities: Vec<RenewalOpportunity>) {
        *self.opportunities.write().await = Some(opportunities);
    }
}

fn not_connected(what: &str) -> SourceError {
    SourceError::Unavailable { source_name: CRM, message: format!("{what} not loaded") }
}

pub(crate) fn open_contracts(contracts: &[ContractRecord], as_of: NaiveDate) -> Vec<ContractRecord> {
    contracts.iter().filter(|contract| contract.end_date >= as_of).cloned().collect()
}

pub(crate) fn quarter_opportunities(
    opportunities: &[RenewalOpportunity],
    quarter: &FiscalQuarter,
) -> Vec<RenewalOpportunity> {
    opportunities
        .iter()
        .filter(|opportunity| {
            opportunity
                .close_date
                .map_or(true, |close| close >= quarter.start && close <= quarter.end)
        })
        .cloned()
        .collect()
}

#[async_trait::async_trait]
impl CrmSource for InMemoryCrm {
    async fn renewal_contracts(&self, as_of: NaiveDate) -> Result<Vec<ContractRecord>, SourceError> {
        let contracts = self.contracts.read().await;
        let contracts = contracts.as_deref().ok_or_else(|| not_connected("contracts"))?;
        Ok(open_contracts(contracts, as_of))
    }

    async fn renewal_opportunities(
        &self,
        quarter: &FiscalQuarter,
    ) -> Result<Vec<RenewalOpportunity>, SourceError> {
        let opportunities = self.opportunities.read().await;
        let opportunities =
            opportunities.as_deref().ok_or_else(|| not_connected("renewal opportunities"))?;
        Ok(quarter_opportunities(opportunities, quarter))
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use revpulse_core::domain::dimension::{Category, Product, Region};
    use revpulse_core::domain::period::{FiscalQuarter, ReportPeriod};
    use revpulse_core::domain::renewal::{ContractRecord, RenewalOpportunity};
    use revpulse_core::domain::segment::{AttainmentRow, SegmentMeasures};

    use crate::sources::{CrmSource, InMemoryCrm, InMemoryWarehouse, SourceError, WarehouseSource};

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    #[tokio::test]
    async fn warehouse_serves_rows_per_period() {
        let warehouse = InMemoryWarehouse::default();
        let period = ReportPeriod::new(date(2026, 1, 1), date(2026, 2, 14));
        let row = AttainmentRow {
            product: Product::Por,
            region: Region::Amer,
            category: Category::NewLogo,
            measures: SegmentMeasures::default(),
        };
        warehouse.insert_period(period, vec![row.clone()], Vec::new()).await;

        let rows = warehouse.attainment_rows(&period).await.expect("rows for period");
        assert_eq!(rows, vec![row]);

        let missing = warehouse.attainment_rows(&period.previous()).await;
        assert!(matches!(missing, Err(SourceError::NotFound { .. })));
    }

    #[tokio::test]
    async fn crm_reports_unavailable_until_loaded() {
        let crm = InMemoryCrm::default();
        let as_of = date(2026, 2, 14);
        assert!(matches!(
            crm.renewal_contracts(as_of).await,
            Err(SourceError::Unavailable { .. })
        ));

        let contract = |id: &str, end_date| ContractRecord {
            contract_id: id.to_string(),
            account_id: "acct".to_string(),
            account_name: None,
            end_date,
            current_acv: Decimal::from(1_000),
            currency_code: "USD".to_string(),
            uplift_rate_percent: None,
            auto_renewal_flag: false,
            evergreen_flag: false,
            renewal_status: None,
            product: Product::R360,
            region: Region::Emea,
        };
        crm.set_contracts(vec![contract("expired", date(2026, 2, 1)), contract("open", as_of)])
            .await;

        let contracts = crm.renewal_contracts(as_of).await.expect("contracts loaded");
        assert_eq!(contracts.len(), 1);
        assert_eq!(contracts[0].contract_id, "open");
    }

    #[tokio::test]
    async fn opportunities_are_scoped_to_the_quarter() {
        let crm = InMemoryCrm::default();
        let quarter = FiscalQuarter { start: date(2026, 1, 1), end: date(2026, 3, 31) };
        let opportunity = |close_date| RenewalOpportunity {
            opportunity_id: None,
            account_id: None,
            amount: Decimal::from(500),
            close_date,
            is_won: false,
            is_closed: false,
            loss_reason: None,
            product: Product::Por,
            region: Region::Apac,
            uplift_amount: Decimal::ZERO,
            prior_acv: Decimal::ZERO,
        };
        crm.set_opportunities(vec![
            opportunity(Some(date(2026, 3, 31))),
            opportunity(Some(date(2026, 4, 1))),
            opportunity(None),
        ])
        .await;

        let scoped = crm.renewal_opportunities(&quarter).await.expect("opportunities loaded");
        assert_eq!(scoped.len(), 2);
    }
}

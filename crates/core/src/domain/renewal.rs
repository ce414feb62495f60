use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::dimension::{Product, Region};
use crate::domain::numeric::{
    lenient_bool, lenient_decimal, lenient_optional_decimal, saturating_div,
};
use crate::domain::rag::RagStatus;

/// A contract row as the CRM returns it: local currency, raw flags.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractRecord {
    pub contract_id: String,
    pub account_id: String,
    #[serde(default)]
    pub account_name: Option<String>,
    pub end_date: NaiveDate,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub current_acv: Decimal,
    #[serde(default = "default_currency")]
    pub currency_code: String,
    /// Absent means "use the configured default"; an explicit zero is kept.
    #[serde(default, deserialize_with = "lenient_optional_decimal")]
    pub uplift_rate_percent: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub auto_renewal_flag: bool,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub evergreen_flag: bool,
    #[serde(default)]
    pub renewal_status: Option<String>,
    pub product: Product,
    pub region: Region,
}

fn default_currency() -> String {
    "USD".to_string()
}

/// A contract normalised to USD with its renewal economics derived.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenewalContract {
    pub contract_id: String,
    pub account_id: String,
    pub account_name: Option<String>,
    pub end_date: NaiveDate,
    pub currency_code: String,
    pub local_acv: Decimal,
    #[serde(rename = "currentACV")]
    pub current_acv: Decimal,
    pub uplift_rate: Decimal,
    pub uplift_amount: Decimal,
    pub is_auto_renewing: bool,
    pub days_until_renewal: i64,
    pub is_at_risk: bool,
    pub product: Product,
    pub region: Region,
}

/// A CRM opportunity of type "Renewal".
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenewalOpportunity {
    #[serde(default)]
    pub opportunity_id: Option<String>,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub amount: Decimal,
    #[serde(default)]
    pub close_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub is_won: bool,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub is_closed: bool,
    #[serde(default)]
    pub loss_reason: Option<String>,
    pub product: Product,
    pub region: Region,
    /// Renewal amount minus prior-year ACV, when the warehouse knows it.
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub uplift_amount: Decimal,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub prior_acv: Decimal,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OpportunityOutcome {
    Won,
    Lost,
    Pipeline,
}

impl RenewalOpportunity {
    pub fn outcome(&self) -> OpportunityOutcome {
        if self.is_won {
            OpportunityOutcome::Won
        } else if self.is_closed {
            OpportunityOutcome::Lost
        } else {
            OpportunityOutcome::Pipeline
        }
    }
}

/// Historical-actuals baseline for one (product, region) renewal cell.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenewalTarget {
    pub product: Product,
    pub region: Region,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub amount: Decimal,
}

/// ISO code to "local units per USD". USD is always 1.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, Decimal>", into = "BTreeMap<String, Decimal>")]
pub struct CurrencyTable(BTreeMap<String, Decimal>);

impl From<BTreeMap<String, Decimal>> for CurrencyTable {
    fn from(rates: BTreeMap<String, Decimal>) -> Self {
        Self::new(rates)
    }
}

impl From<CurrencyTable> for BTreeMap<String, Decimal> {
    fn from(table: CurrencyTable) -> Self {
        table.0
    }
}

impl CurrencyTable {
    pub fn new(rates: impl IntoIterator<Item = (String, Decimal)>) -> Self {
        Self(rates.into_iter().map(|(code, rate)| (code.trim().to_ascii_uppercase(), rate)).collect())
    }

    /// Unknown codes and non-positive rates fall back to 1.
    pub fn rate_for(&self, iso_code: &str) -> Decimal {
        let code = iso_code.trim().to_ascii_uppercase();
        if code == "USD" {
            return Decimal::ONE;
        }
        self.0.get(&code).copied().filter(|rate| *rate > Decimal::ZERO).unwrap_or(Decimal::ONE)
    }

    pub fn to_usd(&self, local_amount: Decimal, iso_code: &str) -> Decimal {
        saturating_div(local_amount, self.rate_for(iso_code))
    }
}

/// Renewal metrics for one product under the active selection.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenewalSummary {
    pub data_available: bool,
    pub renewal_count: u64,
    pub renewal_acv: Decimal,
    pub auto_renewal_count: u64,
    pub auto_renewal_acv: Decimal,
    pub manual_renewal_count: u64,
    pub manual_renewal_acv: Decimal,
    pub avg_uplift_percent: Decimal,
    pub total_uplift_amount: Decimal,
    pub at_risk_count: u64,
    pub at_risk_acv: Decimal,
    pub upcoming: Vec<UpcomingBucket>,
    pub upcoming_quarter_remaining_count: u64,
    pub upcoming_quarter_remaining_acv: Decimal,
    pub won_renewal_count: u64,
    pub won_renewal_acv: Decimal,
    pub lost_renewal_count: u64,
    pub lost_renewal_acv: Decimal,
    pub pipeline_renewal_count: u64,
    pub pipeline_renewal_acv: Decimal,
    pub expected_renewal_acv: Decimal,
    pub expected_uplift: Decimal,
    pub forecasted_bookings: Decimal,
    pub renewal_risk_gap: Decimal,
    pub q1_target: Decimal,
    pub qtd_target: Decimal,
    pub qtd_attainment_percent: Decimal,
    pub rag_status: RagStatus,
    pub missing_uplift_count: u64,
    pub missing_uplift_acv: Decimal,
    pub potential_lost_uplift: Decimal,
}

/// Contracts renewing within `window_days` of the as-of date.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpcomingBucket {
    pub window_days: u32,
    pub count: u64,
    pub acv: Decimal,
}

impl RenewalSummary {
    /// The all-zero summary returned when the contract source is down.
    pub fn unavailable(upcoming_windows: &[u32]) -> Self {
        Self {
            data_available: false,
            upcoming: upcoming_windows
                .iter()
                .map(|window_days| UpcomingBucket {
                    window_days: *window_days,
                    count: 0,
                    acv: Decimal::ZERO,
                })
                .collect(),
            rag_status: RagStatus::NoData,
            ..Self::default()
        }
    }

    pub fn upcoming_within(&self, window_days: u32) -> Option<&UpcomingBucket> {
        self.upcoming.iter().find(|bucket| bucket.window_days == window_days)
    }
}

/// Per-product renewal output plus the contract and opportunity listings
/// behind each number.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRenewals {
    pub summary: RenewalSummary,
    pub won_renewals: Vec<RenewalOpportunity>,
    pub lost_renewals: Vec<RenewalOpportunity>,
    pub pipeline_renewals: Vec<RenewalOpportunity>,
    pub upcoming_contracts: Vec<RenewalContract>,
    pub at_risk_contracts: Vec<RenewalContract>,
    pub missing_uplift_contracts: Vec<RenewalContract>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenewalReport {
    pub products: BTreeMap<Product, ProductRenewals>,
    pub crm_available: bool,
    pub warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{CurrencyTable, OpportunityOutcome, RenewalOpportunity};
    use crate::domain::dimension::{Product, Region};

    #[test]
    fn currency_table_falls_back_to_parity() {
        let table = CurrencyTable::new([("gbp".to_string(), Decimal::new(8, 1))]);
        assert_eq!(table.rate_for("GBP"), Decimal::new(8, 1));
        assert_eq!(table.rate_for("USD"), Decimal::ONE);
        assert_eq!(table.rate_for("AUD"), Decimal::ONE);
        assert_eq!(table.to_usd(Decimal::from(80), "GBP"), Decimal::from(100));
    }

    #[test]
    fn opportunity_outcome_prefers_won_over_closed() {
        let mut opportunity = RenewalOpportunity {
            opportunity_id: None,
            account_id: None,
            amount: Decimal::from(1_000),
            close_date: None,
            is_won: true,
            is_closed: true,
            loss_reason: None,
            product: Product::Por,
            region: Region::Amer,
            uplift_amount: Decimal::ZERO,
            prior_acv: Decimal::ZERO,
        };
        assert_eq!(opportunity.outcome(), OpportunityOutcome::Won);

        opportunity.is_won = false;
        assert_eq!(opportunity.outcome(), OpportunityOutcome::Lost);

        opportunity.is_closed = false;
        assert_eq!(opportunity.outcome(), OpportunityOutcome::Pipeline);
    }
}

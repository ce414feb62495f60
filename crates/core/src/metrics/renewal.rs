//! Renewal bookings forecast.
//!
//! A renewing contract books only its uplift as new revenue; the base ACV is
//! retained revenue. The forecast for the current quarter is won renewal
//! opportunity amounts plus the uplift of auto-renewing contracts whose end
//! date falls on or before the fiscal quarter end.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::dimension::{Dimension, Product, ReportSelection};
use crate::domain::numeric::{percent_of, saturating_sum, tenth_percent, whole_percent, HUNDRED};
use crate::domain::period::FiscalQuarter;
use crate::domain::renewal::{
    ContractRecord, CurrencyTable, OpportunityOutcome, ProductRenewals, RenewalContract,
    RenewalOpportunity, RenewalReport, RenewalSummary, RenewalTarget, UpcomingBucket,
};
use crate::metrics::filter::filter_product_region;
use crate::metrics::rag::{Classifier, TableClassifier, ThresholdPolicy};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenewalPolicy {
    pub default_uplift_rate_percent: Decimal,
    pub fiscal_quarter: FiscalQuarter,
    pub at_risk_window_days: i64,
    /// Strictly increasing, e.g. `[30, 60, 90]`.
    pub upcoming_windows_days: Vec<u32>,
    /// CRM renewal statuses that imply the contract renews on its own.
    pub auto_renew_statuses: Vec<String>,
}

impl RenewalPolicy {
    fn longest_window(&self) -> i64 {
        self.upcoming_windows_days.iter().copied().max().map(i64::from).unwrap_or(0)
    }

    fn is_auto_renew_status(&self, status: Option<&str>) -> bool {
        status.is_some_and(|status| {
            self.auto_renew_statuses
                .iter()
                .any(|candidate| candidate.eq_ignore_ascii_case(status.trim()))
        })
    }
}

/// Everything one forecast pass reads. `None` marks a source that failed.
#[derive(Clone, Debug, Default)]
pub struct RenewalInputs {
    pub contracts: Option<Vec<ContractRecord>>,
    pub opportunities: Option<Vec<RenewalOpportunity>>,
    pub targets: Vec<RenewalTarget>,
    pub currency: CurrencyTable,
}

/// Normalises a CRM contract to USD and derives its renewal economics.
pub fn derive_contract(
    record: &ContractRecord,
    currency: &CurrencyTable,
    policy: &RenewalPolicy,
    as_of: NaiveDate,
) -> RenewalContract {
    let current_acv = currency.to_usd(record.current_acv, &record.currency_code);
    let uplift_rate = record.uplift_rate_percent.unwrap_or(policy.default_uplift_rate_percent);
    let uplift_amount = percent_of(current_acv, uplift_rate);
    let is_auto_renewing = record.auto_renewal_flag
        || record.evergreen_flag
        || policy.is_auto_renew_status(record.renewal_status.as_deref());
    let days_until_renewal = (record.end_date - as_of).num_days();

    RenewalContract {
        contract_id: record.contract_id.clone(),
        account_id: record.account_id.clone(),
        account_name: record.account_name.clone(),
        end_date: record.end_date,
        currency_code: record.currency_code.trim().to_ascii_uppercase(),
        local_acv: record.current_acv,
        current_acv,
        uplift_rate,
        uplift_amount,
        is_auto_renewing,
        days_until_renewal,
        is_at_risk: days_until_renewal <= policy.at_risk_window_days && !is_auto_renewing,
        product: record.product,
        region: record.region,
    }
}

/// The Q1 target for one product: the sum of the selected regions' targets.
pub fn effective_target(
    product: Product,
    targets: &[RenewalTarget],
    selection: &ReportSelection,
) -> Decimal {
    saturating_sum(
        targets
            .iter()
            .filter(|target| target.product == product && selection.regions.allows(&target.region))
            .map(|target| target.amount),
    )
}

fn sum_acv<'a>(contracts: impl Iterator<Item = &'a RenewalContract>) -> (u64, Decimal) {
    contracts.fold((0, Decimal::ZERO), |(count, acv), contract| {
        (count + 1, acv.saturating_add(contract.current_acv))
    })
}

fn sum_amount<'a>(opportunities: impl Iterator<Item = &'a RenewalOpportunity>) -> (u64, Decimal) {
    opportunities.fold((0, Decimal::ZERO), |(count, amount), opportunity| {
        (count + 1, amount.saturating_add(opportunity.amount))
    })
}

fn within(contract: &RenewalContract, days: i64) -> bool {
    (0..=days).contains(&contract.days_until_renewal)
}

/// Forecasts one product from already filtered, already derived inputs.
pub fn forecast_product<C: Classifier + ?Sized>(
    contracts: &[RenewalContract],
    opportunities: &[RenewalOpportunity],
    q1_target: Decimal,
    as_of: NaiveDate,
    policy: &RenewalPolicy,
    classifier: &C,
) -> ProductRenewals {
    let by_outcome = |outcome: OpportunityOutcome| -> Vec<RenewalOpportunity> {
        opportunities.iter().filter(|opp| opp.outcome() == outcome).cloned().collect()
    };
    let won_renewals = by_outcome(OpportunityOutcome::Won);
    let lost_renewals = by_outcome(OpportunityOutcome::Lost);
    let pipeline_renewals = by_outcome(OpportunityOutcome::Pipeline);

    let (won_renewal_count, won_renewal_acv) = sum_amount(won_renewals.iter());
    let (lost_renewal_count, lost_renewal_acv) = sum_amount(lost_renewals.iter());
    let (pipeline_renewal_count, pipeline_renewal_acv) = sum_amount(pipeline_renewals.iter());

    let total_uplift_amount = saturating_sum(won_renewals.iter().map(|opp| opp.uplift_amount));
    let total_prior_acv = saturating_sum(won_renewals.iter().map(|opp| opp.prior_acv));
    let avg_uplift_percent = if total_prior_acv > Decimal::ZERO {
        whole_percent(total_uplift_amount, total_prior_acv)
    } else {
        Decimal::ZERO
    };

    let (auto_renewal_count, auto_renewal_acv) =
        sum_acv(contracts.iter().filter(|contract| contract.is_auto_renewing));
    let (manual_renewal_count, manual_renewal_acv) =
        sum_acv(contracts.iter().filter(|contract| !contract.is_auto_renewing));
    let (at_risk_count, at_risk_acv) =
        sum_acv(contracts.iter().filter(|contract| contract.is_at_risk));

    let upcoming = policy
        .upcoming_windows_days
        .iter()
        .map(|window_days| {
            let (count, acv) = sum_acv(
                contracts.iter().filter(|contract| within(contract, i64::from(*window_days))),
            );
            UpcomingBucket { window_days: *window_days, count, acv }
        })
        .collect();

    let days_left_in_quarter = policy.fiscal_quarter.days_remaining(as_of);
    let in_quarter: Vec<&RenewalContract> =
        contracts.iter().filter(|contract| within(contract, days_left_in_quarter)).collect();
    let (upcoming_quarter_remaining_count, upcoming_quarter_remaining_acv) =
        sum_acv(in_quarter.iter().copied());

    let forecastable = in_quarter.iter().filter(|contract| contract.is_auto_renewing);
    let expected_uplift = saturating_sum(forecastable.clone().map(|contract| contract.uplift_amount));
    let expected_renewal_acv = saturating_sum(
        forecastable.map(|contract| contract.current_acv.saturating_add(contract.uplift_amount)),
    );

    let forecasted_bookings = won_renewal_acv.saturating_add(expected_uplift);
    let qtd_attainment_percent = if q1_target > Decimal::ZERO {
        tenth_percent(forecasted_bookings, q1_target)
    } else {
        HUNDRED
    };
    let rag_status =
        classifier.classify(Some(qtd_attainment_percent), &ThresholdPolicy::RenewalAttainment);

    let missing_uplift_contracts: Vec<RenewalContract> = contracts
        .iter()
        .filter(|contract| contract.current_acv > Decimal::ZERO && contract.uplift_amount.is_zero())
        .cloned()
        .collect();
    let (missing_uplift_count, missing_uplift_acv) = sum_acv(missing_uplift_contracts.iter());
    let potential_lost_uplift = percent_of(missing_uplift_acv, policy.default_uplift_rate_percent);

    let longest_window = policy.longest_window();
    let upcoming_contracts =
        contracts.iter().filter(|contract| within(contract, longest_window)).cloned().collect();
    let at_risk_contracts = contracts.iter().filter(|contract| contract.is_at_risk).cloned().collect();

    let summary = RenewalSummary {
        data_available: true,
        renewal_count: won_renewal_count + pipeline_renewal_count,
        renewal_acv: won_renewal_acv.saturating_add(pipeline_renewal_acv),
        auto_renewal_count,
        auto_renewal_acv,
        manual_renewal_count,
        manual_renewal_acv,
        avg_uplift_percent,
        total_uplift_amount,
        at_risk_count,
        at_risk_acv,
        upcoming,
        upcoming_quarter_remaining_count,
        upcoming_quarter_remaining_acv,
        won_renewal_count,
        won_renewal_acv,
        lost_renewal_count,
        lost_renewal_acv,
        pipeline_renewal_count,
        pipeline_renewal_acv,
        expected_renewal_acv,
        expected_uplift,
        forecasted_bookings,
        renewal_risk_gap: forecasted_bookings.saturating_sub(q1_target),
        q1_target,
        qtd_target: q1_target,
        qtd_attainment_percent,
        rag_status,
        missing_uplift_count,
        missing_uplift_acv,
        potential_lost_uplift,
    };

    ProductRenewals {
        summary,
        won_renewals,
        lost_renewals,
        pipeline_renewals,
        upcoming_contracts,
        at_risk_contracts,
        missing_uplift_contracts,
    }
}

pub trait RenewalForecaster: Send + Sync {
    fn forecast(
        &self,
        inputs: &RenewalInputs,
        selection: &ReportSelection,
        as_of: NaiveDate,
    ) -> RenewalReport;
}

#[derive(Clone, Debug)]
pub struct DeterministicRenewalForecaster {
    policy: RenewalPolicy,
    classifier: TableClassifier,
}

impl DeterministicRenewalForecaster {
    pub fn new(policy: RenewalPolicy, classifier: TableClassifier) -> Self {
        Self { policy, classifier }
    }

    pub fn policy(&self) -> &RenewalPolicy {
        &self.policy
    }

    pub fn classifier(&self) -> &TableClassifier {
        &self.classifier
    }
}

impl RenewalForecaster for DeterministicRenewalForecaster {
    fn forecast(
        &self,
        inputs: &RenewalInputs,
        selection: &ReportSelection,
        as_of: NaiveDate,
    ) -> RenewalReport {
        let products = selection.products.allowed_values();
        let mut warnings = Vec::new();

        let Some(records) = inputs.contracts.as_deref() else {
            warnings.push("contract source unavailable; renewal metrics zeroed".to_string());
            let unavailable = ProductRenewals {
                summary: RenewalSummary::unavailable(&self.policy.upcoming_windows_days),
                ..ProductRenewals::default()
            };
            return RenewalReport {
                products: products.into_iter().map(|product| (product, unavailable.clone())).collect(),
                crm_available: false,
                warnings,
            };
        };

        let opportunities = match inputs.opportunities.as_deref() {
            Some(opportunities) => filter_product_region(opportunities, selection),
            None => {
                warnings.push(
                    "renewal opportunity source unavailable; won and pipeline renewals treated as empty"
                        .to_string(),
                );
                Vec::new()
            }
        };

        let contracts: Vec<RenewalContract> = filter_product_region(records, selection)
            .iter()
            .map(|record| derive_contract(record, &inputs.currency, &self.policy, as_of))
            .collect();

        let report_products = products
            .into_iter()
            .map(|product| {
                let product_contracts: Vec<RenewalContract> =
                    contracts.iter().filter(|contract| contract.product == product).cloned().collect();
                let product_opportunities: Vec<RenewalOpportunity> =
                    opportunities.iter().filter(|opp| opp.product == product).cloned().collect();
                let q1_target = effective_target(product, &inputs.targets, selection);

                let renewals = forecast_product(
                    &product_contracts,
                    &product_opportunities,
                    q1_target,
                    as_of,
                    &self.policy,
                    &self.classifier,
                );
                if renewals.summary.missing_uplift_count > 0 {
                    tracing::warn!(
                        event_name = "metrics.renewals.missing_uplift",
                        product = product.as_str(),
                        contracts = renewals.summary.missing_uplift_count,
                        potential_lost_uplift = %renewals.summary.potential_lost_uplift,
                        "contracts carry ACV but no uplift"
                    );
                    warnings.push(format!(
                        "{product}: {} contract(s) with ACV but no uplift configured",
                        renewals.summary.missing_uplift_count
                    ));
                }
                (product, renewals)
            })
            .collect();

        RenewalReport { products: report_products, crm_available: true, warnings }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate};
    use rust_decimal::Decimal;

    use crate::domain::dimension::{Product, Region, ReportSelection, Selection};
    use crate::domain::period::FiscalQuarter;
    use crate::domain::rag::RagStatus;
    use crate::domain::renewal::{ContractRecord, CurrencyTable, RenewalOpportunity, RenewalTarget};
    use crate::metrics::rag::TableClassifier;

    use super::{
        derive_contract, DeterministicRenewalForecaster, RenewalForecaster, RenewalInputs,
        RenewalPolicy,
    };

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    fn as_of() -> NaiveDate {
        date(2026, 2, 14)
    }

    fn policy() -> RenewalPolicy {
        RenewalPolicy {
            default_uplift_rate_percent: Decimal::from(5),
            fiscal_quarter: FiscalQuarter { start: date(2026, 1, 1), end: date(2026, 3, 31) },
            at_risk_window_days: 30,
            upcoming_windows_days: vec![30, 60, 90],
            auto_renew_statuses: vec!["Future Renewal".to_string()],
        }
    }

    fn contract(id: &str, days_out: i64, acv: i64) -> ContractRecord {
        ContractRecord {
            contract_id: id.to_string(),
            account_id: format!("acct-{id}"),
            account_name: None,
            end_date: as_of() + Duration::days(days_out),
            current_acv: Decimal::from(acv),
            currency_code: "USD".to_string(),
            uplift_rate_percent: None,
            auto_renewal_flag: true,
            evergreen_flag: false,
            renewal_status: None,
            product: Product::Por,
            region: Region::Amer,
        }
    }

    fn won(amount: i64, region: Region) -> RenewalOpportunity {
        RenewalOpportunity {
            opportunity_id: None,
            account_id: None,
            amount: Decimal::from(amount),
            close_date: Some(date(2026, 1, 20)),
            is_won: true,
            is_closed: true,
            loss_reason: None,
            product: Product::Por,
            region,
            uplift_amount: Decimal::from(amount / 20),
            prior_acv: Decimal::from(amount - amount / 20),
        }
    }

    fn forecaster() -> DeterministicRenewalForecaster {
        DeterministicRenewalForecaster::new(policy(), TableClassifier::default())
    }

    #[test]
    fn uplift_is_computed_on_usd_normalised_acv() {
        let mut record = contract("C-1", 10, 120_000);
        record.currency_code = "EUR".to_string();
        let currency = CurrencyTable::new([("EUR".to_string(), Decimal::new(12, 1))]);

        let derived = derive_contract(&record, &currency, &policy(), as_of());
        assert_eq!(derived.current_acv, Decimal::from(100_000));
        assert_eq!(derived.uplift_amount, Decimal::from(5_000));
        assert_eq!(derived.days_until_renewal, 10);
        assert!(!derived.is_at_risk);
    }

    #[test]
    fn manual_contract_inside_window_is_at_risk() {
        let mut record = contract("C-2", 30, 10_000);
        record.auto_renewal_flag = false;
        let derived = derive_contract(&record, &CurrencyTable::default(), &policy(), as_of());
        assert!(derived.is_at_risk);

        record.renewal_status = Some("future renewal".to_string());
        let derived = derive_contract(&record, &CurrencyTable::default(), &policy(), as_of());
        assert!(derived.is_auto_renewing);
        assert!(!derived.is_at_risk);
    }

    #[test]
    fn renewal_after_quarter_end_is_upcoming_but_not_forecast() {
        let days_to_quarter_end = policy().fiscal_quarter.days_remaining(as_of());
        let inputs = RenewalInputs {
            contracts: Some(vec![
                contract("C-in", days_to_quarter_end, 100_000),
                contract("C-out", days_to_quarter_end + 1, 100_000),
            ]),
            opportunities: Some(Vec::new()),
            targets: Vec::new(),
            currency: CurrencyTable::default(),
        };

        let report = forecaster().forecast(&inputs, &ReportSelection::default(), as_of());
        let summary = &report.products[&Product::Por].summary;

        assert_eq!(summary.upcoming_within(90).map(|bucket| bucket.count), Some(2));
        assert_eq!(summary.forecasted_bookings, Decimal::from(5_000));
        assert_eq!(summary.upcoming_quarter_remaining_count, 1);
        assert_eq!(summary.expected_renewal_acv, Decimal::from(105_000));
    }

    #[test]
    fn region_filter_reselects_the_target_denominator() {
        let inputs = RenewalInputs {
            contracts: Some(Vec::new()),
            opportunities: Some(vec![won(40_000, Region::Amer), won(60_000, Region::Emea)]),
            targets: vec![
                RenewalTarget { product: Product::Por, region: Region::Amer, amount: Decimal::from(50_000) },
                RenewalTarget { product: Product::Por, region: Region::Emea, amount: Decimal::from(150_000) },
            ],
            currency: CurrencyTable::default(),
        };
        let selection = ReportSelection {
            regions: Selection::from_values([Region::Amer]),
            ..ReportSelection::default()
        };

        let report = forecaster().forecast(&inputs, &selection, as_of());
        let summary = &report.products[&Product::Por].summary;

        assert_eq!(summary.q1_target, Decimal::from(50_000));
        assert_eq!(summary.forecasted_bookings, Decimal::from(40_000));
        assert_eq!(summary.qtd_attainment_percent, Decimal::from(80));
        assert_eq!(summary.rag_status, RagStatus::Yellow);
        assert_eq!(summary.renewal_risk_gap, Decimal::from(-10_000));
    }

    #[test]
    fn zero_target_reports_full_attainment() {
        let inputs = RenewalInputs {
            contracts: Some(Vec::new()),
            opportunities: Some(Vec::new()),
            ..RenewalInputs::default()
        };
        let report = forecaster().forecast(&inputs, &ReportSelection::default(), as_of());
        let summary = &report.products[&Product::R360].summary;

        assert_eq!(summary.qtd_attainment_percent, Decimal::from(100));
        assert_eq!(summary.rag_status, RagStatus::Green);
    }

    #[test]
    fn missing_uplift_is_tracked_outside_the_forecast() {
        let mut zero_uplift = contract("C-3", 20, 200_000);
        zero_uplift.uplift_rate_percent = Some(Decimal::ZERO);
        let inputs = RenewalInputs {
            contracts: Some(vec![zero_uplift]),
            opportunities: Some(Vec::new()),
            ..RenewalInputs::default()
        };

        let report = forecaster().forecast(&inputs, &ReportSelection::default(), as_of());
        let renewals = &report.products[&Product::Por];

        assert_eq!(renewals.summary.missing_uplift_count, 1);
        assert_eq!(renewals.summary.missing_uplift_acv, Decimal::from(200_000));
        assert_eq!(renewals.summary.potential_lost_uplift, Decimal::from(10_000));
        assert_eq!(renewals.summary.forecasted_bookings, Decimal::ZERO);
        assert_eq!(renewals.missing_uplift_contracts.len(), 1);
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn unavailable_contract_source_zeroes_every_product() {
        let inputs = RenewalInputs {
            contracts: None,
            opportunities: Some(vec![won(40_000, Region::Amer)]),
            ..RenewalInputs::default()
        };

        let report = forecaster().forecast(&inputs, &ReportSelection::default(), as_of());

        assert!(!report.crm_available);
        assert_eq!(report.products.len(), 2);
        for renewals in report.products.values() {
            assert!(!renewals.summary.data_available);
            assert_eq!(renewals.summary.forecasted_bookings, Decimal::ZERO);
            assert_eq!(renewals.summary.rag_status, RagStatus::NoData);
            assert_eq!(renewals.summary.upcoming.len(), 3);
        }
    }

    #[test]
    fn avg_uplift_comes_from_won_renewals() {
        let inputs = RenewalInputs {
            contracts: Some(Vec::new()),
            opportunities: Some(vec![won(21_000, Region::Amer)]),
            ..RenewalInputs::default()
        };
        let report = forecaster().forecast(&inputs, &ReportSelection::default(), as_of());
        let summary = &report.products[&Product::Por].summary;

        assert_eq!(summary.total_uplift_amount, Decimal::from(1_050));
        assert_eq!(summary.avg_uplift_percent, Decimal::from(5));
        assert_eq!(summary.renewal_count, 1);
    }
}

pub mod comparison;
pub mod filter;
pub mod rag;
pub mod renewal;
pub mod rollup;

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::dimension::{Product, ReportSelection};
use crate::domain::period::{FiscalQuarter, PeriodInfo};
use crate::domain::rag::RagStatus;
use crate::domain::segment::{ActionItem, AttainmentRow, SourceAttainmentRow};

use self::{
    comparison::{compare_aggregates, AggregateComparison},
    filter::{filter_action_items, filter_attainment_rows, filter_source_rows},
    rag::{Classifier, TableClassifier, ThresholdPolicy},
    rollup::{
        classify_rows, executive_counts, rollup_by_product, ClassifiedRow, ExecutiveCounts, Rollup,
    },
};

/// Immutable rows for one bookings report pass.
///
/// `data_available` is false when the attainment rows could not be fetched;
/// the report then keeps its neutral totals but classifies them `NO_DATA`.
#[derive(Clone, Debug)]
pub struct DashboardInput<'a> {
    pub data_available: bool,
    pub attainment_rows: &'a [AttainmentRow],
    pub source_rows: &'a [SourceAttainmentRow],
    pub action_items: &'a [ActionItem],
    pub selection: &'a ReportSelection,
    pub as_of: NaiveDate,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardReport {
    pub data_available: bool,
    pub period: PeriodInfo,
    pub selection: ReportSelection,
    pub rollup: Rollup,
    pub product_status: BTreeMap<Product, RagStatus>,
    pub grand_total_status: RagStatus,
    pub attainment: Vec<ClassifiedRow<AttainmentRow>>,
    pub sources: Vec<ClassifiedRow<SourceAttainmentRow>>,
    pub executive_counts: ExecutiveCounts,
    pub action_items: Vec<ActionItem>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodComparison {
    pub by_product: BTreeMap<Product, AggregateComparison>,
    pub grand_total: AggregateComparison,
}

pub trait DashboardRuntime: Send + Sync {
    fn build_report(&self, input: DashboardInput<'_>) -> DashboardReport;

    /// Runs the full filter and rollup pipeline over each period's rows,
    /// then diffs the two results.
    fn compare_periods(
        &self,
        current_rows: &[AttainmentRow],
        previous_rows: &[AttainmentRow],
        selection: &ReportSelection,
    ) -> PeriodComparison;
}

pub struct DeterministicDashboardRuntime<C> {
    classifier: C,
    fiscal_quarter: FiscalQuarter,
    trend_epsilon: Decimal,
}

impl<C> DeterministicDashboardRuntime<C> {
    pub fn new(classifier: C, fiscal_quarter: FiscalQuarter, trend_epsilon: Decimal) -> Self {
        Self { classifier, fiscal_quarter, trend_epsilon }
    }

    pub fn fiscal_quarter(&self) -> FiscalQuarter {
        self.fiscal_quarter
    }

    fn rollup_for(&self, rows: &[AttainmentRow], selection: &ReportSelection) -> Rollup {
        let filtered = filter_attainment_rows(rows, selection);
        rollup_by_product(&filtered, &selection.products.allowed_values())
    }
}

impl DeterministicDashboardRuntime<TableClassifier> {
    pub fn with_tables(
        tables: rag::ThresholdTables,
        fiscal_quarter: FiscalQuarter,
        trend_epsilon: Decimal,
    ) -> Self {
        Self::new(TableClassifier::new(tables), fiscal_quarter, trend_epsilon)
    }
}

impl<C: Classifier> DashboardRuntime for DeterministicDashboardRuntime<C> {
    fn build_report(&self, input: DashboardInput<'_>) -> DashboardReport {
        let selection = input.selection;
        let attainment_rows = filter_attainment_rows(input.attainment_rows, selection);
        let source_rows = filter_source_rows(input.source_rows, selection);
        let rollup = rollup_by_product(&attainment_rows, &selection.products.allowed_values());

        let general = ThresholdPolicy::GeneralAttainment;
        let classify_total = |attainment_percent: Decimal| {
            if input.data_available {
                self.classifier.classify(Some(attainment_percent), &general)
            } else {
                RagStatus::NoData
            }
        };
        let product_status = rollup
            .by_product
            .iter()
            .map(|(product, total)| (*product, classify_total(total.attainment_percent)))
            .collect();
        let grand_total_status = classify_total(rollup.grand_total.attainment_percent);

        let attainment = classify_rows(&attainment_rows, &self.classifier);
        let sources = classify_rows(&source_rows, &self.classifier);
        let executive_counts = executive_counts(&attainment);

        tracing::debug!(
            event_name = "metrics.report.built",
            attainment_rows = attainment.len(),
            source_rows = sources.len(),
            "bookings report computed"
        );

        DashboardReport {
            data_available: input.data_available,
            period: self.fiscal_quarter.period_info(input.as_of),
            selection: selection.clone(),
            rollup,
            product_status,
            grand_total_status,
            attainment,
            sources,
            executive_counts,
            action_items: filter_action_items(input.action_items, selection),
        }
    }

    fn compare_periods(
        &self,
        current_rows: &[AttainmentRow],
        previous_rows: &[AttainmentRow],
        selection: &ReportSelection,
    ) -> PeriodComparison {
        let current = self.rollup_for(current_rows, selection);
        let previous = self.rollup_for(previous_rows, selection);

        let by_product = current
            .by_product
            .iter()
            .map(|(product, total)| {
                let prior = previous.by_product.get(product).cloned().unwrap_or_default();
                (*product, compare_aggregates(total, &prior, self.trend_epsilon))
            })
            .collect();

        PeriodComparison {
            by_product,
            grand_total: compare_aggregates(
                &current.grand_total,
                &previous.grand_total,
                self.trend_epsilon,
            ),
        }
    }
}

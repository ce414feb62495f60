use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::dimension::Product;
use crate::domain::numeric::{round_half_up, saturating_div, whole_percent, HUNDRED};
use crate::domain::rag::RagStatus;
use crate::domain::segment::{AttainmentRow, SegmentMeasures, SegmentRow, SourceAttainmentRow};
use crate::metrics::rag::{Classifier, ThresholdPolicy};

/// A reduction of a set of segment rows. Ratios are derived from the sums
/// every time; two totals are never combined by adding their ratios.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateTotal {
    pub target_amount: Decimal,
    pub qtd_target_amount: Decimal,
    pub actual_amount: Decimal,
    pub attainment_percent: Decimal,
    pub pipeline_amount: Decimal,
    pub pipeline_coverage_ratio: Decimal,
    pub lost_deal_count: u64,
    pub lost_amount: Decimal,
}

impl AggregateTotal {
    pub fn gap(&self) -> Decimal {
        self.actual_amount - self.qtd_target_amount
    }
}

#[derive(Default)]
struct RunningSums {
    target_amount: Decimal,
    qtd_target_amount: Decimal,
    actual_amount: Decimal,
    pipeline_amount: Decimal,
    lost_deal_count: u64,
    lost_amount: Decimal,
}

impl RunningSums {
    fn add(&mut self, measures: &SegmentMeasures) {
        self.target_amount = self.target_amount.saturating_add(measures.target_amount);
        self.qtd_target_amount = self.qtd_target_amount.saturating_add(measures.qtd_target_amount);
        self.actual_amount = self.actual_amount.saturating_add(measures.actual_amount);
        self.pipeline_amount = self.pipeline_amount.saturating_add(measures.pipeline_amount);
        self.lost_deal_count = self.lost_deal_count.saturating_add(measures.lost_deal_count);
        self.lost_amount = self.lost_amount.saturating_add(measures.lost_amount);
    }

    fn finish(self) -> AggregateTotal {
        AggregateTotal {
            attainment_percent: attainment_percent(self.actual_amount, self.qtd_target_amount),
            pipeline_coverage_ratio: pipeline_coverage_ratio(
                self.pipeline_amount,
                self.target_amount.saturating_sub(self.actual_amount),
            ),
            target_amount: self.target_amount,
            qtd_target_amount: self.qtd_target_amount,
            actual_amount: self.actual_amount,
            pipeline_amount: self.pipeline_amount,
            lost_deal_count: self.lost_deal_count,
            lost_amount: self.lost_amount,
        }
    }
}

/// Whole-percent attainment. A zero (or negative) target counts as fully met.
pub fn attainment_percent(actual: Decimal, target: Decimal) -> Decimal {
    if target > Decimal::ZERO {
        whole_percent(actual, target)
    } else {
        HUNDRED
    }
}

/// Pipeline over the remaining deficit, one decimal. No deficit reports 0.
pub fn pipeline_coverage_ratio(pipeline: Decimal, remaining: Decimal) -> Decimal {
    if remaining > Decimal::ZERO {
        round_half_up(saturating_div(pipeline, remaining), 1)
    } else {
        Decimal::ZERO
    }
}

pub fn recompute_aggregate<R: SegmentRow>(rows: &[R]) -> AggregateTotal {
    rows.iter()
        .fold(RunningSums::default(), |mut sums, row| {
            sums.add(row.measures());
            sums
        })
        .finish()
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rollup {
    pub by_product: BTreeMap<Product, AggregateTotal>,
    pub grand_total: AggregateTotal,
}

/// Product totals plus a grand total recomputed over the union of all rows.
///
/// `products` lists the products to report; a listed product with no rows
/// still gets a (zero-target) total.
pub fn rollup_by_product<R: SegmentRow>(rows: &[R], products: &[Product]) -> Rollup {
    let by_product = products
        .iter()
        .map(|product| {
            let mut sums = RunningSums::default();
            rows.iter()
                .filter(|row| row.product() == *product)
                .for_each(|row| sums.add(row.measures()));
            (*product, sums.finish())
        })
        .collect();

    let mut union = RunningSums::default();
    rows.iter()
        .filter(|row| products.contains(&row.product()))
        .for_each(|row| union.add(row.measures()));

    Rollup { by_product, grand_total: union.finish() }
}

/// Row shapes that can be annotated with statuses.
pub trait ClassifiableRow: SegmentRow {
    /// The benchmark cell for this row's win rate, if it has one.
    fn win_rate_policy(&self) -> Option<ThresholdPolicy>;
}

impl ClassifiableRow for AttainmentRow {
    fn win_rate_policy(&self) -> Option<ThresholdPolicy> {
        Some(ThresholdPolicy::WinRate { product: self.product, category: self.category })
    }
}

impl ClassifiableRow for SourceAttainmentRow {
    fn win_rate_policy(&self) -> Option<ThresholdPolicy> {
        None
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedRow<R> {
    #[serde(flatten)]
    pub row: R,
    pub attainment_percent: Decimal,
    pub gap: Decimal,
    pub pipeline_coverage_ratio: Decimal,
    pub rag_status: RagStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub win_rate_status: Option<RagStatus>,
}

pub fn classify_rows<R, C>(rows: &[R], classifier: &C) -> Vec<ClassifiedRow<R>>
where
    R: ClassifiableRow + Clone,
    C: Classifier + ?Sized,
{
    rows.iter()
        .map(|row| {
            let measures = row.measures();
            let attainment = attainment_percent(measures.actual_amount, measures.qtd_target_amount);
            let win_rate_status = row
                .win_rate_policy()
                .map(|policy| classifier.classify(measures.effective_win_rate(), &policy));

            ClassifiedRow {
                row: row.clone(),
                attainment_percent: attainment,
                gap: measures.gap(),
                pipeline_coverage_ratio: pipeline_coverage_ratio(
                    measures.pipeline_amount,
                    measures.target_amount - measures.actual_amount,
                ),
                rag_status: classifier
                    .classify(Some(attainment), &ThresholdPolicy::GeneralAttainment),
                win_rate_status,
            }
        })
        .collect()
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutiveCounts {
    pub areas_exceeding_target: u64,
    pub areas_at_risk: u64,
    pub areas_needing_attention: u64,
}

pub fn executive_counts<R>(rows: &[ClassifiedRow<R>]) -> ExecutiveCounts {
    let mut counts = ExecutiveCounts::default();
    for row in rows {
        if row.attainment_percent >= HUNDRED {
            counts.areas_exceeding_target += 1;
        }
        match row.rag_status {
            RagStatus::Red => counts.areas_at_risk += 1,
            RagStatus::Yellow => counts.areas_needing_attention += 1,
            RagStatus::Green | RagStatus::NoData => {}
        }
    }
    counts
}

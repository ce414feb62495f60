use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::numeric::{tenth_percent, HUNDRED};
use crate::metrics::rollup::AggregateTotal;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Trend {
    Up,
    Down,
    Flat,
}

impl Trend {
    /// `epsilon` is in percentage points; moves within it are noise.
    pub fn of(delta_percent: Decimal, epsilon: Decimal) -> Self {
        if delta_percent > epsilon {
            Self::Up
        } else if delta_percent < -epsilon {
            Self::Down
        } else {
            Self::Flat
        }
    }
}

/// A scalar that can be compared across periods.
pub trait Measure: Copy + fmt::Debug + Eq + Serialize {
    type Delta: Copy + fmt::Debug + Eq + Serialize;

    fn delta(self, previous: Self) -> Self::Delta;
    fn delta_as_decimal(delta: Self::Delta) -> Decimal;
    fn as_decimal(self) -> Decimal;
}

impl Measure for Decimal {
    type Delta = Decimal;

    fn delta(self, previous: Self) -> Decimal {
        self - previous
    }

    fn delta_as_decimal(delta: Decimal) -> Decimal {
        delta
    }

    fn as_decimal(self) -> Decimal {
        self
    }
}

impl Measure for u64 {
    type Delta = i64;

    fn delta(self, previous: Self) -> i64 {
        let delta = i128::from(self) - i128::from(previous);
        i64::try_from(delta).unwrap_or(if delta < 0 { i64::MIN } else { i64::MAX })
    }

    fn delta_as_decimal(delta: i64) -> Decimal {
        Decimal::from(delta)
    }

    fn as_decimal(self) -> Decimal {
        Decimal::from(self)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", bound(serialize = ""))]
pub struct MetricComparison<T: Measure> {
    pub current: T,
    pub previous: T,
    pub delta: T::Delta,
    pub delta_percent: Decimal,
    pub trend: Trend,
}

/// Pairs two independently computed values.
///
/// A zero previous value reports +100% when the current value is nonzero and
/// 0% otherwise.
pub fn compare<T: Measure>(current: T, previous: T, epsilon: Decimal) -> MetricComparison<T> {
    let delta = current.delta(previous);
    let previous_value = previous.as_decimal();
    let delta_percent = if !previous_value.is_zero() {
        tenth_percent(T::delta_as_decimal(delta), previous_value)
    } else if !current.as_decimal().is_zero() {
        HUNDRED
    } else {
        Decimal::ZERO
    };

    MetricComparison { current, previous, delta, delta_percent, trend: Trend::of(delta_percent, epsilon) }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateComparison {
    pub target_amount: MetricComparison<Decimal>,
    pub qtd_target_amount: MetricComparison<Decimal>,
    pub actual_amount: MetricComparison<Decimal>,
    pub attainment_percent: MetricComparison<Decimal>,
    pub pipeline_amount: MetricComparison<Decimal>,
    pub pipeline_coverage_ratio: MetricComparison<Decimal>,
    pub lost_deal_count: MetricComparison<u64>,
    pub lost_amount: MetricComparison<Decimal>,
}

/// Field-by-field comparison of two totals, each already recomputed from its
/// own period's rows.
pub fn compare_aggregates(
    current: &AggregateTotal,
    previous: &AggregateTotal,
    epsilon: Decimal,
) -> AggregateComparison {
    AggregateComparison {
        target_amount: compare(current.target_amount, previous.target_amount, epsilon),
        qtd_target_amount: compare(current.qtd_target_amount, previous.qtd_target_amount, epsilon),
        actual_amount: compare(current.actual_amount, previous.actual_amount, epsilon),
        attainment_percent: compare(current.attainment_percent, previous.attainment_percent, epsilon),
        pipeline_amount: compare(current.pipeline_amount, previous.pipeline_amount, epsilon),
        pipeline_coverage_ratio: compare(
            current.pipeline_coverage_ratio,
            previous.pipeline_coverage_ratio,
            epsilon,
        ),
        lost_deal_count: compare(current.lost_deal_count, previous.lost_deal_count, epsilon),
        lost_amount: compare(current.lost_amount, previous.lost_amount, epsilon),
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use crate::domain::dimension::{Category, Product, Region};
    use crate::domain::segment::{AttainmentRow, SegmentMeasures};
    use crate::metrics::rollup::recompute_aggregate;

    use super::{compare, compare_aggregates, Trend};

    fn epsilon() -> Decimal {
        Decimal::new(5, 1)
    }

    #[test]
    fn small_moves_are_flat() {
        let comparison = compare(Decimal::new(1003, 1), Decimal::from(100), epsilon());
        assert_eq!(comparison.delta, Decimal::new(3, 1));
        assert_eq!(comparison.delta_percent, Decimal::new(3, 1));
        assert_eq!(comparison.trend, Trend::Flat);
    }

    #[test]
    fn moves_beyond_epsilon_have_direction() {
        let up = compare(Decimal::from(102), Decimal::from(100), epsilon());
        assert_eq!(up.delta_percent, Decimal::from(2));
        assert_eq!(up.trend, Trend::Up);

        let down = compare(Decimal::from(90), Decimal::from(100), epsilon());
        assert_eq!(down.delta_percent, Decimal::from(-10));
        assert_eq!(down.trend, Trend::Down);
    }

    #[test]
    fn zero_previous_is_guarded() {
        let from_zero = compare(Decimal::from(250), Decimal::ZERO, epsilon());
        assert_eq!(from_zero.delta_percent, Decimal::from(100));
        assert_eq!(from_zero.trend, Trend::Up);

        let both_zero = compare(0_u64, 0_u64, epsilon());
        assert_eq!(both_zero.delta, 0);
        assert_eq!(both_zero.delta_percent, Decimal::ZERO);
        assert_eq!(both_zero.trend, Trend::Flat);
    }

    #[test]
    fn counts_can_shrink() {
        let comparison = compare(3_u64, 4_u64, epsilon());
        assert_eq!(comparison.delta, -1);
        assert_eq!(comparison.delta_percent, Decimal::from(-25));
        assert_eq!(comparison.trend, Trend::Down);
    }

    #[test]
    fn aggregate_comparison_diffs_recomputed_totals() {
        let row = |target: i64, actual: i64| AttainmentRow {
            product: Product::Por,
            region: Region::Amer,
            category: Category::NewLogo,
            measures: SegmentMeasures {
                target_amount: Decimal::from(target),
                qtd_target_amount: Decimal::from(target),
                actual_amount: Decimal::from(actual),
                ..SegmentMeasures::default()
            },
        };
        let current = recompute_aggregate(&[row(100, 90), row(100, 30)]);
        let previous = recompute_aggregate(&[row(100, 50), row(100, 50)]);

        let comparison = compare_aggregates(&current, &previous, epsilon());
        assert_eq!(comparison.attainment_percent.current, Decimal::from(60));
        assert_eq!(comparison.attainment_percent.previous, Decimal::from(50));
        assert_eq!(comparison.attainment_percent.delta_percent, Decimal::from(20));
        assert_eq!(comparison.actual_amount.delta, Decimal::from(20));
        assert_eq!(comparison.target_amount.trend, Trend::Flat);
    }
}

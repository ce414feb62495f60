use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::dimension::{Category, Product};
use crate::domain::rag::RagStatus;

/// Absolute lower bounds: `value >= green_at` is green, `value >= yellow_at`
/// is yellow, anything below is red.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdBand {
    pub green_at: Decimal,
    pub yellow_at: Decimal,
}

impl ThresholdBand {
    pub const fn new(green_at: Decimal, yellow_at: Decimal) -> Self {
        Self { green_at, yellow_at }
    }

    pub fn status_of(&self, value: Decimal) -> RagStatus {
        if value >= self.green_at {
            RagStatus::Green
        } else if value >= self.yellow_at {
            RagStatus::Yellow
        } else {
            RagStatus::Red
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinRateBenchmark {
    pub product: Product,
    pub category: Category,
    pub benchmark_percent: Decimal,
}

/// Historical win rate per (product, category), maintained as data.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WinRateBenchmarks(BTreeMap<(Product, Category), Decimal>);

impl WinRateBenchmarks {
    pub fn new(entries: &[WinRateBenchmark]) -> Self {
        Self(
            entries
                .iter()
                .map(|entry| ((entry.product, entry.category), entry.benchmark_percent))
                .collect(),
        )
    }

    pub fn get(&self, product: Product, category: Category) -> Option<Decimal> {
        self.0.get(&(product, category)).copied()
    }

    pub fn entries(&self) -> Vec<WinRateBenchmark> {
        self.0
            .iter()
            .map(|((product, category), benchmark_percent)| WinRateBenchmark {
                product: *product,
                category: *category,
                benchmark_percent: *benchmark_percent,
            })
            .collect()
    }
}

/// Which threshold table a caller wants applied. Chosen explicitly at every
/// call site, never inferred from the value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThresholdPolicy {
    GeneralAttainment,
    RenewalAttainment,
    WinRate { product: Product, category: Category },
}

/// Every threshold table the dashboard uses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThresholdTables {
    pub general: ThresholdBand,
    pub renewal: ThresholdBand,
    /// Band used for saturated categories and for cells with no benchmark.
    pub win_rate_absolute: ThresholdBand,
    /// Benchmarks at or above this use `win_rate_absolute`.
    pub win_rate_saturation_at: Decimal,
    /// Half-width of the floating band around a benchmark.
    pub win_rate_band_width: Decimal,
    pub benchmarks: WinRateBenchmarks,
}

impl Default for ThresholdTables {
    fn default() -> Self {
        let standard = ThresholdBand::new(Decimal::from(90), Decimal::from(70));
        Self {
            general: standard,
            renewal: standard,
            win_rate_absolute: standard,
            win_rate_saturation_at: Decimal::from(90),
            win_rate_band_width: Decimal::from(15),
            benchmarks: WinRateBenchmarks::default(),
        }
    }
}

impl ThresholdTables {
    /// Resolves the concrete band a policy classifies against.
    pub fn band_for(&self, policy: &ThresholdPolicy) -> ThresholdBand {
        match policy {
            ThresholdPolicy::GeneralAttainment => self.general,
            ThresholdPolicy::RenewalAttainment => self.renewal,
            ThresholdPolicy::WinRate { product, category } => {
                match self.benchmarks.get(*product, *category) {
                    Some(benchmark) if benchmark < self.win_rate_saturation_at => ThresholdBand::new(
                        benchmark + self.win_rate_band_width,
                        benchmark - self.win_rate_band_width,
                    ),
                    _ => self.win_rate_absolute,
                }
            }
        }
    }
}

pub trait Classifier: Send + Sync {
    /// `None` means there is no sample to classify.
    fn classify(&self, value: Option<Decimal>, policy: &ThresholdPolicy) -> RagStatus;
}

#[derive(Clone, Debug, Default)]
pub struct TableClassifier {
    tables: ThresholdTables,
}

impl TableClassifier {
    pub fn new(tables: ThresholdTables) -> Self {
        Self { tables }
    }

    pub fn tables(&self) -> &ThresholdTables {
        &self.tables
    }
}

impl Classifier for TableClassifier {
    fn classify(&self, value: Option<Decimal>, policy: &ThresholdPolicy) -> RagStatus {
        match value {
            Some(value) => self.tables.band_for(policy).status_of(value),
            None => RagStatus::NoData,
        }
    }
}

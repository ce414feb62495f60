use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::dimension::{Category, Product, Region, Source};
use crate::domain::numeric::{lenient_count, lenient_decimal, lenient_optional_decimal};

/// Additive measures shared by every segment row shape.
///
/// `gap` is never stored; it is always `actual_amount - qtd_target_amount`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentMeasures {
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub target_amount: Decimal,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub qtd_target_amount: Decimal,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub actual_amount: Decimal,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub pipeline_amount: Decimal,
    #[serde(default, deserialize_with = "lenient_count")]
    pub lost_deal_count: u64,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub lost_amount: Decimal,
    #[serde(default, deserialize_with = "lenient_optional_decimal")]
    pub win_rate_percent: Option<Decimal>,
}

impl SegmentMeasures {
    pub fn gap(&self) -> Decimal {
        self.actual_amount - self.qtd_target_amount
    }

    /// The win rate, or `None` when there is no closed-deal sample behind it.
    ///
    /// A zero rate with zero lost deals means nothing closed at all.
    pub fn effective_win_rate(&self) -> Option<Decimal> {
        match self.win_rate_percent {
            Some(rate) if rate.is_zero() && self.lost_deal_count == 0 => None,
            other => other,
        }
    }
}

/// Common read access over the concrete segment row shapes.
pub trait SegmentRow {
    fn product(&self) -> Product;
    fn region(&self) -> Region;
    fn measures(&self) -> &SegmentMeasures;
}

/// One (product, region, category) bookings cell.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttainmentRow {
    pub product: Product,
    pub region: Region,
    pub category: Category,
    #[serde(flatten)]
    pub measures: SegmentMeasures,
}

/// One (product, region, source) bookings cell.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceAttainmentRow {
    pub product: Product,
    pub region: Region,
    pub source: Source,
    #[serde(flatten)]
    pub measures: SegmentMeasures,
}

impl SegmentRow for AttainmentRow {
    fn product(&self) -> Product {
        self.product
    }

    fn region(&self) -> Region {
        self.region
    }

    fn measures(&self) -> &SegmentMeasures {
        &self.measures
    }
}

impl SegmentRow for SourceAttainmentRow {
    fn product(&self) -> Product {
        self.product
    }

    fn region(&self) -> Region {
        self.region
    }

    fn measures(&self) -> &SegmentMeasures {
        &self.measures
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionHorizon {
    Immediate,
    ShortTerm,
    Strategic,
}

/// A recommended follow-up. `region: None` marks a product-wide item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionItem {
    pub product: Product,
    #[serde(default)]
    pub region: Option<Region>,
    pub horizon: ActionHorizon,
    /// Free-form topic such as "Pipeline Coverage"; not a deal category.
    pub topic: String,
    pub action: String,
    #[serde(default)]
    pub owner: Option<String>,
}

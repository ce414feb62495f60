use std::collections::BTreeSet;
use std::fmt;
use std::hash::Hash;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A closed reporting dimension with a known, finite domain.
pub trait Dimension: Copy + Ord + Eq + Hash + fmt::Debug + Send + Sync + 'static {
    const NAME: &'static str;
    const ALL: &'static [Self];

    fn as_str(&self) -> &'static str;

    fn parse(raw: &str) -> Option<Self>;
}

/// A wire value outside a dimension's domain.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("unknown {dimension} `{value}`")]
pub struct UnknownDimensionValue {
    pub dimension: &'static str,
    pub value: String,
}

// Deserialization goes through `Dimension::parse`, so CRM spellings such as
// `US` or `NEW_LOGO` decode the same as the canonical names.

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum Product {
    #[serde(rename = "POR")]
    Por,
    #[serde(rename = "R360")]
    R360,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", try_from = "String")]
pub enum Region {
    Amer,
    Emea,
    Apac,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum Category {
    #[serde(rename = "NEW LOGO")]
    NewLogo,
    #[serde(rename = "STRATEGIC")]
    Strategic,
    #[serde(rename = "EXPANSION")]
    Expansion,
    #[serde(rename = "MIGRATION")]
    Migration,
    #[serde(rename = "RENEWAL")]
    Renewal,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum Source {
    #[serde(rename = "INBOUND")]
    Inbound,
    #[serde(rename = "OUTBOUND")]
    Outbound,
    #[serde(rename = "AE SOURCED")]
    AeSourced,
    #[serde(rename = "AM SOURCED")]
    AmSourced,
    #[serde(rename = "TRADESHOW")]
    Tradeshow,
    #[serde(rename = "PARTNERSHIPS")]
    Partnerships,
}

impl Dimension for Product {
    const NAME: &'static str = "product";
    const ALL: &'static [Self] = &[Self::Por, Self::R360];

    fn as_str(&self) -> &'static str {
        match self {
            Self::Por => "POR",
            Self::R360 => "R360",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "POR" => Some(Self::Por),
            "R360" => Some(Self::R360),
            _ => None,
        }
    }
}

impl Dimension for Region {
    const NAME: &'static str = "region";
    const ALL: &'static [Self] = &[Self::Amer, Self::Emea, Self::Apac];

    fn as_str(&self) -> &'static str {
        match self {
            Self::Amer => "AMER",
            Self::Emea => "EMEA",
            Self::Apac => "APAC",
        }
    }

    /// Accepts report regions as well as CRM divisions (`US`, `UK`, `AU`).
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "AMER" | "US" => Some(Self::Amer),
            "EMEA" | "UK" => Some(Self::Emea),
            "APAC" | "AU" => Some(Self::Apac),
            _ => None,
        }
    }
}

impl Dimension for Category {
    const NAME: &'static str = "category";
    const ALL: &'static [Self] =
        &[Self::NewLogo, Self::Strategic, Self::Expansion, Self::Migration, Self::Renewal];

    fn as_str(&self) -> &'static str {
        match self {
            Self::NewLogo => "NEW LOGO",
            Self::Strategic => "STRATEGIC",
            Self::Expansion => "EXPANSION",
            Self::Migration => "MIGRATION",
            Self::Renewal => "RENEWAL",
        }
    }

    /// Accepts report categories as well as CRM opportunity types.
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().replace('_', " ").as_str() {
            "NEW LOGO" | "NEW BUSINESS" => Some(Self::NewLogo),
            "STRATEGIC" => Some(Self::Strategic),
            "EXPANSION" | "EXISTING BUSINESS" => Some(Self::Expansion),
            "MIGRATION" => Some(Self::Migration),
            "RENEWAL" => Some(Self::Renewal),
            _ => None,
        }
    }
}

impl Dimension for Source {
    const NAME: &'static str = "source";
    const ALL: &'static [Self] = &[
        Self::Inbound,
        Self::Outbound,
        Self::AeSourced,
        Self::AmSourced,
        Self::Tradeshow,
        Self::Partnerships,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            Self::Inbound => "INBOUND",
            Self::Outbound => "OUTBOUND",
            Self::AeSourced => "AE SOURCED",
            Self::AmSourced => "AM SOURCED",
            Self::Tradeshow => "TRADESHOW",
            Self::Partnerships => "PARTNERSHIPS",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().replace('_', " ").as_str() {
            "INBOUND" => Some(Self::Inbound),
            "OUTBOUND" => Some(Self::Outbound),
            "AE SOURCED" => Some(Self::AeSourced),
            "AM SOURCED" => Some(Self::AmSourced),
            "TRADESHOW" => Some(Self::Tradeshow),
            "PARTNERSHIPS" => Some(Self::Partnerships),
            _ => None,
        }
    }
}

macro_rules! dimension_impls {
    ($($dimension:ty),*) => {
        $(impl fmt::Display for $dimension {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl TryFrom<String> for $dimension {
            type Error = UnknownDimensionValue;

            fn try_from(raw: String) -> Result<Self, Self::Error> {
                <$dimension as Dimension>::parse(&raw).ok_or(UnknownDimensionValue {
                    dimension: <$dimension as Dimension>::NAME,
                    value: raw,
                })
            }
        })*
    };
}

dimension_impls!(Product, Region, Category, Source);

/// The allowed values of one dimension.
///
/// "Nothing checked" and "everything checked" both collapse to
/// `Unrestricted` at construction, so callers never infer it from a count.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "values", rename_all = "snake_case")]
pub enum Selection<D: Dimension> {
    Unrestricted,
    RestrictedTo(BTreeSet<D>),
}

impl<D: Dimension> Default for Selection<D> {
    fn default() -> Self {
        Self::Unrestricted
    }
}

impl<D: Dimension> Selection<D> {
    pub fn from_values(values: impl IntoIterator<Item = D>) -> Self {
        let selected: BTreeSet<D> = values.into_iter().collect();
        let covers_domain = D::ALL.iter().all(|value| selected.contains(value));
        if selected.is_empty() || covers_domain {
            Self::Unrestricted
        } else {
            Self::RestrictedTo(selected)
        }
    }

    /// Parses `ALL`, an empty string, or a comma list. Unknown values are dropped.
    pub fn parse_param(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("") => Self::Unrestricted,
            Some(value) if value.eq_ignore_ascii_case("ALL") => Self::Unrestricted,
            Some(value) => Self::from_values(value.split(',').filter_map(D::parse)),
        }
    }

    pub fn to_param(&self) -> String {
        match self {
            Self::Unrestricted => "ALL".to_string(),
            Self::RestrictedTo(values) => {
                values.iter().map(Dimension::as_str).collect::<Vec<_>>().join(",")
            }
        }
    }

    pub fn is_unrestricted(&self) -> bool {
        matches!(self, Self::Unrestricted)
    }

    pub fn allows(&self, value: &D) -> bool {
        match self {
            Self::Unrestricted => true,
            Self::RestrictedTo(values) => values.contains(value),
        }
    }

    /// The domain values this selection admits, in domain order.
    pub fn allowed_values(&self) -> Vec<D> {
        D::ALL.iter().copied().filter(|value| self.allows(value)).collect()
    }
}

/// One selection per dimension, as chosen in the dashboard filter bar.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSelection {
    pub products: Selection<Product>,
    pub regions: Selection<Region>,
    pub categories: Selection<Category>,
    pub sources: Selection<Source>,
}

impl ReportSelection {
    pub fn is_unrestricted(&self) -> bool {
        self.products.is_unrestricted()
            && self.regions.is_unrestricted()
            && self.categories.is_unrestricted()
            && self.sources.is_unrestricted()
    }
}

#[cfg(test)]
mod tests {
    use super::{Category, Dimension, Product, Region, Selection, Source};

    #[test]
    fn empty_and_full_selections_are_unrestricted() {
        assert!(Selection::<Region>::from_values([]).is_unrestricted());
        assert!(Selection::from_values(Region::ALL.iter().copied()).is_unrestricted());
        assert!(!Selection::from_values([Region::Amer]).is_unrestricted());
    }

    #[test]
    fn params_round_trip_through_selection() {
        let selection = Selection::<Region>::parse_param(Some("EMEA,AMER"));
        assert_eq!(selection.to_param(), "AMER,EMEA");
        assert!(Selection::<Region>::parse_param(Some("ALL")).is_unrestricted());
        assert!(Selection::<Region>::parse_param(None).is_unrestricted());
    }

    #[test]
    fn unknown_param_values_are_dropped() {
        let selection = Selection::<Source>::parse_param(Some("INBOUND,BILLBOARDS,ae_sourced"));
        assert_eq!(selection, Selection::from_values([Source::Inbound, Source::AeSourced]));

        let nothing_known = Selection::<Category>::parse_param(Some("CREDIT CARD"));
        assert!(nothing_known.is_unrestricted());
    }

    #[test]
    fn crm_divisions_and_types_parse_to_report_values() {
        assert_eq!(Region::parse("UK"), Some(Region::Emea));
        assert_eq!(Category::parse("Existing Business"), Some(Category::Expansion));
        assert_eq!(Category::parse("Credit Card"), None);
    }

    #[test]
    fn strategic_is_a_category() {
        assert_eq!(Category::parse("strategic"), Some(Category::Strategic));
        assert!(Category::ALL.contains(&Category::Strategic));
        assert_eq!(Category::Strategic.to_string(), "STRATEGIC");
    }

    #[test]
    fn wire_values_decode_through_parse() {
        let region: Region = serde_json::from_str(r#""US""#).expect("division decodes");
        assert_eq!(region, Region::Amer);
        let category: Category = serde_json::from_str(r#""NEW_LOGO""#).expect("underscore decodes");
        assert_eq!(category, Category::NewLogo);
        let source: Source = serde_json::from_str(r#""ae sourced""#).expect("lowercase decodes");
        assert_eq!(source, Source::AeSourced);
        let product: Product = serde_json::from_str(r#""r360""#).expect("product decodes");
        assert_eq!(product, Product::R360);

        let unknown = serde_json::from_str::<Category>(r#""BILLBOARDS""#)
            .expect_err("unknown category rejected");
        assert!(unknown.to_string().contains("unknown category `BILLBOARDS`"));

        assert_eq!(serde_json::to_string(&Category::NewLogo).expect("serialize"), r#""NEW LOGO""#);
    }
}

use crate::domain::dimension::{
    Category, Dimension, Product, Region, ReportSelection, Selection, Source,
};
use crate::domain::renewal::{ContractRecord, RenewalContract, RenewalOpportunity, RenewalTarget};
use crate::domain::segment::{ActionItem, AttainmentRow, SourceAttainmentRow};

/// Exposes a row's value along dimension `D`.
///
/// `None` means the row is not specific to any single value of `D` (a
/// product-wide action item has no region) and passes every filter on `D`.
pub trait DimensionKey<D: Dimension> {
    fn key(&self) -> Option<D>;
}

/// Strict membership filter over one dimension. Always returns new rows.
pub fn filter_by_dimension<D, R>(rows: &[R], selection: &Selection<D>) -> Vec<R>
where
    D: Dimension,
    R: DimensionKey<D> + Clone,
{
    match selection {
        Selection::Unrestricted => rows.to_vec(),
        Selection::RestrictedTo(_) => rows
            .iter()
            .filter(|row| row.key().map_or(true, |value| selection.allows(&value)))
            .cloned()
            .collect(),
    }
}

/// Applies the product and region selections.
pub fn filter_product_region<R>(rows: &[R], selection: &ReportSelection) -> Vec<R>
where
    R: DimensionKey<Product> + DimensionKey<Region> + Clone,
{
    let by_product = filter_by_dimension(rows, &selection.products);
    filter_by_dimension(&by_product, &selection.regions)
}

pub fn filter_attainment_rows(
    rows: &[AttainmentRow],
    selection: &ReportSelection,
) -> Vec<AttainmentRow> {
    filter_by_dimension(&filter_product_region(rows, selection), &selection.categories)
}

pub fn filter_source_rows(
    rows: &[SourceAttainmentRow],
    selection: &ReportSelection,
) -> Vec<SourceAttainmentRow> {
    filter_by_dimension(&filter_product_region(rows, selection), &selection.sources)
}

pub fn filter_action_items(items: &[ActionItem], selection: &ReportSelection) -> Vec<ActionItem> {
    filter_product_region(items, selection)
}

macro_rules! dimension_key {
    ($row:ty => $($dimension:ty : $field:ident),+) => {
        $(impl DimensionKey<$dimension> for $row {
            fn key(&self) -> Option<$dimension> {
                Some(self.$field)
            }
        })+
    };
}

dimension_key!(AttainmentRow => Product: product, Region: region, Category: category);
dimension_key!(SourceAttainmentRow => Product: product, Region: region, Source: source);
dimension_key!(ContractRecord => Product: product, Region: region);
dimension_key!(RenewalContract => Product: product, Region: region);
dimension_key!(RenewalOpportunity => Product: product, Region: region);
dimension_key!(RenewalTarget => Product: product, Region: region);
dimension_key!(ActionItem => Product: product);

impl DimensionKey<Region> for ActionItem {
    fn key(&self) -> Option<Region> {
        self.region
    }
}

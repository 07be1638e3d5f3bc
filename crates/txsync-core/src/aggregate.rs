//! Line-item aggregation.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::LineItem;

/// Fractional digits kept in a stored total (BigQuery NUMERIC scale).
pub const TOTAL_SCALE: u32 = 9;

/// Data-integrity failure while aggregating one record's line items.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AggregationError {
    #[error("line item {index} has no numeric {field}")]
    MissingField { index: usize, field: &'static str },
    #[error("line item {index} overflows the total")]
    Overflow { index: usize },
}

/// Sum of `quantity * unit_price` over `items`.
///
/// `Ok(None)` means "not attempted": the collection was absent or empty and
/// the record must be left alone.
pub fn aggregate_line_items(
    items: Option<&[LineItem]>,
) -> Result<Option<Decimal>, AggregationError> {
    let items = match items {
        Some(items) if !items.is_empty() => items,
        _ => return Ok(None),
    };

    let mut total = Decimal::ZERO;
    for (index, item) in items.iter().enumerate() {
        let quantity = item.quantity.ok_or(AggregationError::MissingField {
            index,
            field: "quantity",
        })?;
        let unit_price = item.unit_price.ok_or(AggregationError::MissingField {
            index,
            field: "unit_price",
        })?;
        total = quantity
            .checked_mul(unit_price)
            .and_then(|line| total.checked_add(line))
            .ok_or(AggregationError::Overflow { index })?;
    }
    Ok(Some(total))
}

/// Round a computed total to [`TOTAL_SCALE`], halfway values away from zero,
/// as the store does on write. Applied once so the stored and mirrored totals
/// agree.
pub fn round_total(total: Decimal) -> Decimal {
    total.round_dp_with_strategy(TOTAL_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

//! Order-level aggregation of line item subtotals.

use super::error::ValidationError;
use super::line_item::{check_amount, round_currency};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Gross, discount and net amounts of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub gross_total: Decimal,
    pub discount: Decimal,
    pub net_total: Decimal,
}

impl Totals {
    /// Totals of an order with no items and no discount.
    pub fn zero() -> Self {
        Self {
            gross_total: round_currency(Decimal::ZERO),
            discount: round_currency(Decimal::ZERO),
            net_total: round_currency(Decimal::ZERO),
        }
    }
}

/// Normalise a requested discount to currency precision and reject negatives.
pub fn normalize_discount(discount: Decimal) -> Result<Decimal, ValidationError> {
    if discount < Decimal::ZERO {
        return Err(ValidationError::InvalidDiscount { discount });
    }
    Ok(round_currency(discount))
}

/// Sum subtotals into a gross total and apply the discount.
///
/// Pure and deterministic: the same subtotals and discount always yield the
/// same totals.
pub fn compute_totals<I>(subtotals: I, discount: Decimal) -> Result<Totals, ValidationError>
where
    I: IntoIterator<Item = Decimal>,
{
    let discount = normalize_discount(discount)?;
    let gross_total = check_amount(
        subtotals
            .into_iter()
            .try_fold(Decimal::ZERO, |sum, subtotal| sum.checked_add(subtotal))
            .map(round_currency),
    )?;

    if discount > gross_total {
        return Err(ValidationError::DiscountExceedsTotal {
            discount,
            gross_total,
        });
    }

    Ok(Totals {
        gross_total,
        discount,
        net_total: round_currency(gross_total - discount),
    })
}

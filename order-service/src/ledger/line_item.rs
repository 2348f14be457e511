//! Per-item validation and subtotal computation.

use super::error::ValidationError;
use crate::models::LineItemInput;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use uuid::Uuid;

/// Decimal places kept for every money amount.
pub const CURRENCY_SCALE: u32 = 2;

/// Round to currency precision, half-up, and pad to two decimal places.
pub fn round_currency(amount: Decimal) -> Decimal {
    let mut rounded =
        amount.round_dp_with_strategy(CURRENCY_SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(CURRENCY_SCALE);
    rounded
}

/// Largest amount a subtotal or order total may reach: 999,999,999,999.99,
/// the capacity of a `NUMERIC(14, 2)` column.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(0x107A_3FFF, 0x5AF3, 0, false, CURRENCY_SCALE);

/// Reject amounts above [`MAX_AMOUNT`].
pub(crate) fn check_amount(amount: Option<Decimal>) -> Result<Decimal, ValidationError> {
    match amount {
        Some(amount) if amount <= MAX_AMOUNT => Ok(amount),
        _ => Err(ValidationError::AmountOutOfRange { limit: MAX_AMOUNT }),
    }
}

/// `quantity * unit_price` at currency precision.
pub fn line_subtotal(quantity: i32, unit_price: Decimal) -> Result<Decimal, ValidationError> {
    let product = Decimal::from(quantity).checked_mul(unit_price);
    check_amount(product.map(round_currency))
}

/// A line item that passed validation, with its subtotal attached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatedLineItem {
    pub service_type_id: Option<Uuid>,
    pub description: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
}

/// Check quantity and price, then compute the subtotal.
pub fn validate_line_item(input: &LineItemInput) -> Result<ValidatedLineItem, ValidationError> {
    if input.quantity < 1 {
        return Err(ValidationError::InvalidQuantity {
            quantity: input.quantity,
        });
    }

    if input.unit_price < Decimal::ZERO {
        return Err(ValidationError::InvalidPrice {
            unit_price: input.unit_price,
        });
    }

    Ok(ValidatedLineItem {
        service_type_id: input.service_type_id,
        description: input.description.trim().to_string(),
        quantity: input.quantity,
        unit_price: input.unit_price,
        subtotal: line_subtotal(input.quantity, input.unit_price)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use std::str::FromStr;

    fn input(quantity: i32, unit_price: &str) -> LineItemInput {
        LineItemInput {
            service_type_id: None,
            description: "Oil change".to_string(),
            quantity,
            unit_price: Decimal::from_str(unit_price).unwrap(),
        }
    }

    #[test]
    fn computes_subtotal() {
        let item = validate_line_item(&input(2, "50.00")).unwrap();
        assert_eq!(item.subtotal, Decimal::from_str("100.00").unwrap());
        assert_eq!(item.subtotal.to_string(), "100.00");
    }

    #[test]
    fn rejects_zero_and_negative_quantity() {
        assert_eq!(
            validate_line_item(&input(0, "10.00")),
            Err(ValidationError::InvalidQuantity { quantity: 0 })
        );
        assert_eq!(
            validate_line_item(&input(-3, "10.00")),
            Err(ValidationError::InvalidQuantity { quantity: -3 })
        );
    }

    #[test]
    fn rejects_negative_price() {
        let err = validate_line_item(&input(1, "-0.01")).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidPrice { .. }));
    }

    #[test]
    fn accepts_free_item() {
        let item = validate_line_item(&input(4, "0")).unwrap();
        assert!(item.subtotal.is_zero());
    }

    #[test]
    fn rounds_half_up_to_cents() {
        // 3 * 0.125 = 0.375 -> 0.38
        let item = validate_line_item(&input(3, "0.125")).unwrap();
        assert_eq!(item.subtotal, Decimal::from_str("0.38").unwrap());

        // 1 * 2.004 -> 2.00
        let item = validate_line_item(&input(1, "2.004")).unwrap();
        assert_eq!(item.subtotal, Decimal::from_str("2.00").unwrap());
    }

    #[test]
    fn max_amount_fits_numeric_14_2() {
        assert_eq!(MAX_AMOUNT.to_string(), "999999999999.99");
    }

    #[test]
    fn rejects_subtotal_that_overflows_decimal() {
        let item = LineItemInput {
            service_type_id: None,
            description: "Fleet contract".to_string(),
            quantity: 2,
            unit_price: Decimal::MAX,
        };
        assert_eq!(
            validate_line_item(&item),
            Err(ValidationError::AmountOutOfRange { limit: MAX_AMOUNT })
        );
    }

    #[test]
    fn subtotal_up_to_the_ceiling_is_accepted() {
        let item = validate_line_item(&input(1, "999999999999.99")).unwrap();
        assert_eq!(item.subtotal, MAX_AMOUNT);

        let err = validate_line_item(&input(1, "1000000000000.00")).unwrap_err();
        assert!(matches!(err, ValidationError::AmountOutOfRange { .. }));

        // Rounds up past the ceiling.
        let err = validate_line_item(&input(1, "999999999999.995")).unwrap_err();
        assert!(matches!(err, ValidationError::AmountOutOfRange { .. }));
    }

    #[test]
    fn subtotal_is_exact_product_for_cent_prices() {
        let mut rng = StdRng::seed_from_u64(0x5eed_0001);

        for _ in 0..2_000 {
            let quantity: i32 = rng.gen_range(1..=500);
            let cents: i64 = rng.gen_range(0..=5_000_000);
            let unit_price = Decimal::new(cents, 2);

            let item = validate_line_item(&LineItemInput {
                service_type_id: None,
                description: "generated".to_string(),
                quantity,
                unit_price,
            })
            .unwrap();

            assert_eq!(item.subtotal, Decimal::from(quantity) * unit_price);
        }
    }
}

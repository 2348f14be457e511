//! Storage-independent rules of the service order ledger.
//!
//! Everything here is pure: no I/O, no clocks except the `now` passed in.

mod error;
mod line_item;
mod status;
mod totals;

pub use error::{StateError, ValidationError};
pub use line_item::{
    line_subtotal, round_currency, validate_line_item, ValidatedLineItem, CURRENCY_SCALE,
    MAX_AMOUNT,
};
pub use status::{apply_transition, check_transition, ensure_mutable, Transition};
pub use totals::{compute_totals, normalize_discount, Totals};

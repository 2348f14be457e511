//! Service order lifecycle guard.
//!
//! Orders move strictly forward: `awaiting -> in_progress -> completed ->
//! delivered`. `delivered` is terminal and stamps `delivered_at` once.

use super::error::StateError;
use crate::models::OrderStatus;
use chrono::{DateTime, Utc};

/// Outcome of an accepted transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub delivered_at: Option<DateTime<Utc>>,
}

/// Check whether `from -> to` is a legal move.
pub fn check_transition(from: OrderStatus, to: OrderStatus) -> Result<(), StateError> {
    if from.is_terminal() {
        return Err(if to.is_terminal() {
            StateError::AlreadyTerminal
        } else {
            StateError::OrderTerminal
        });
    }

    match from.next() {
        Some(next) if next == to => Ok(()),
        _ => Err(StateError::IllegalTransition { from, to }),
    }
}

/// Reject line item and discount changes once the order is delivered.
pub fn ensure_mutable(status: OrderStatus) -> Result<(), StateError> {
    if status.is_terminal() {
        Err(StateError::OrderTerminal)
    } else {
        Ok(())
    }
}

/// Validate the move and compute the resulting `delivered_at`.
///
/// `delivered_at` is carried through untouched unless the order enters
/// `delivered`, in which case it becomes `now`.
pub fn apply_transition(
    from: OrderStatus,
    delivered_at: Option<DateTime<Utc>>,
    to: OrderStatus,
    now: DateTime<Utc>,
) -> Result<Transition, StateError> {
    check_transition(from, to)?;

    let delivered_at = if to.is_terminal() {
        Some(delivered_at.unwrap_or(now))
    } else {
        delivered_at
    };

    Ok(Transition {
        from,
        to,
        delivered_at,
    })
}

//! Error taxonomy of the order service and its HTTP mapping.

use crate::ledger::{StateError, ValidationError};
use crate::services::metrics::ERRORS_TOTAL;
use crate::services::store::StoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use service_core::retry::Retryable;
use thiserror::Error;
use uuid::Uuid;

/// Coarse classification of failures. Only concurrency conflicts and store
/// outages are worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    State,
    NotFound,
    Concurrency,
    Infrastructure,
}

#[derive(Debug, Error)]
pub enum OrderError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("Order {0} not found")]
    OrderNotFound(Uuid),

    #[error("Line item {0} not found on order")]
    ItemNotFound(Uuid),

    #[error("Vehicle {0} not found")]
    VehicleNotFound(Uuid),

    #[error("Vehicle {vehicle_id} does not belong to customer {customer_id}")]
    VehicleCustomerMismatch { vehicle_id: Uuid, customer_id: Uuid },

    #[error("Order was modified concurrently; reload and retry")]
    ConcurrentModification,

    #[error("Order store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Order data integrity violation: {0}")]
    DataIntegrity(String),
}

impl OrderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrderError::Validation(_) => ErrorKind::Validation,
            OrderError::State(_) => ErrorKind::State,
            OrderError::OrderNotFound(_)
            | OrderError::ItemNotFound(_)
            | OrderError::VehicleNotFound(_)
            | OrderError::VehicleCustomerMismatch { .. } => ErrorKind::NotFound,
            OrderError::ConcurrentModification => ErrorKind::Concurrency,
            OrderError::StoreUnavailable(_) | OrderError::DataIntegrity(_) => {
                ErrorKind::Infrastructure
            }
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            OrderError::Validation(ValidationError::InvalidQuantity { .. }) => "invalid_quantity",
            OrderError::Validation(ValidationError::InvalidPrice { .. }) => "invalid_price",
            OrderError::Validation(ValidationError::InvalidDiscount { .. }) => "invalid_discount",
            OrderError::Validation(ValidationError::AmountOutOfRange { .. }) => {
                "amount_out_of_range"
            }
            OrderError::Validation(ValidationError::DiscountExceedsTotal { .. }) => {
                "discount_exceeds_total"
            }
            OrderError::State(StateError::IllegalTransition { .. }) => "illegal_transition",
            OrderError::State(StateError::OrderTerminal) => "order_terminal",
            OrderError::State(StateError::AlreadyTerminal) => "already_terminal",
            OrderError::OrderNotFound(_) => "order_not_found",
            OrderError::ItemNotFound(_) => "item_not_found",
            OrderError::VehicleNotFound(_) => "vehicle_not_found",
            OrderError::VehicleCustomerMismatch { .. } => "vehicle_customer_mismatch",
            OrderError::ConcurrentModification => "concurrent_modification",
            OrderError::StoreUnavailable(_) => "store_unavailable",
            OrderError::DataIntegrity(_) => "data_integrity",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            OrderError::VehicleCustomerMismatch { .. } => StatusCode::BAD_REQUEST,
            _ => match self.kind() {
                ErrorKind::Validation => StatusCode::BAD_REQUEST,
                ErrorKind::State | ErrorKind::Concurrency => StatusCode::CONFLICT,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Infrastructure => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl Retryable for OrderError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            OrderError::ConcurrentModification | OrderError::StoreUnavailable(_)
        )
    }
}

impl From<StoreError> for OrderError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => OrderError::OrderNotFound(id),
            StoreError::ItemNotFound(id) => OrderError::ItemNotFound(id),
            StoreError::ConcurrentModification => OrderError::ConcurrentModification,
            StoreError::Integrity(e) => OrderError::DataIntegrity(e.to_string()),
            StoreError::Unavailable(e) => OrderError::StoreUnavailable(e.to_string()),
        }
    }
}

/// JSON body for order errors.
#[derive(Debug, Serialize)]
pub struct OrderErrorResponse {
    pub error: String,
    pub code: &'static str,
    pub kind: ErrorKind,
    pub retryable: bool,
}

impl IntoResponse for OrderError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        ERRORS_TOTAL.with_label_values(&[code]).inc();

        let message = match &self {
            OrderError::StoreUnavailable(detail) => {
                tracing::error!(error = %detail, "Order store unavailable");
                "Order store unavailable".to_string()
            }
            OrderError::DataIntegrity(detail) => {
                tracing::error!(error = %detail, "Order data integrity violation");
                "Order data integrity violation".to_string()
            }
            other => other.to_string(),
        };

        (
            status,
            Json(OrderErrorResponse {
                error: message,
                code,
                kind: self.kind(),
                retryable: self.is_retryable(),
            }),
        )
            .into_response()
    }
}

/// Result type alias for order operations.
pub type OrderResult<T> = Result<T, OrderError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderStatus;
    use rust_decimal::Decimal;

    #[test]
    fn maps_kinds_to_status_classes() {
        let cases: Vec<(OrderError, StatusCode, &str)> = vec![
            (
                ValidationError::InvalidQuantity { quantity: 0 }.into(),
                StatusCode::BAD_REQUEST,
                "invalid_quantity",
            ),
            (
                ValidationError::DiscountExceedsTotal {
                    discount: Decimal::from(150),
                    gross_total: Decimal::from(130),
                }
                .into(),
                StatusCode::BAD_REQUEST,
                "discount_exceeds_total",
            ),
            (
                StateError::IllegalTransition {
                    from: OrderStatus::Awaiting,
                    to: OrderStatus::Completed,
                }
                .into(),
                StatusCode::CONFLICT,
                "illegal_transition",
            ),
            (
                StateError::OrderTerminal.into(),
                StatusCode::CONFLICT,
                "order_terminal",
            ),
            (
                OrderError::OrderNotFound(Uuid::nil()),
                StatusCode::NOT_FOUND,
                "order_not_found",
            ),
            (
                OrderError::VehicleCustomerMismatch {
                    vehicle_id: Uuid::nil(),
                    customer_id: Uuid::nil(),
                },
                StatusCode::BAD_REQUEST,
                "vehicle_customer_mismatch",
            ),
            (
                OrderError::ConcurrentModification,
                StatusCode::CONFLICT,
                "concurrent_modification",
            ),
            (
                ValidationError::AmountOutOfRange {
                    limit: crate::ledger::MAX_AMOUNT,
                }
                .into(),
                StatusCode::BAD_REQUEST,
                "amount_out_of_range",
            ),
            (
                OrderError::DataIntegrity("check constraint".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
                "data_integrity",
            ),
            (
                OrderError::StoreUnavailable("timeout".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
                "store_unavailable",
            ),
        ];

        for (err, status, code) in cases {
            assert_eq!(err.status_code(), status, "{code}");
            assert_eq!(err.code(), code);
        }
    }

    #[test]
    fn only_concurrency_and_infrastructure_are_retryable() {
        assert!(OrderError::ConcurrentModification.is_retryable());
        assert!(OrderError::StoreUnavailable("down".into()).is_retryable());
        assert!(!OrderError::OrderNotFound(Uuid::nil()).is_retryable());
        assert!(!OrderError::DataIntegrity("numeric overflow".into()).is_retryable());
        assert!(
            !OrderError::from(ValidationError::AmountOutOfRange {
                limit: crate::ledger::MAX_AMOUNT
            })
            .is_retryable()
        );
        assert!(!OrderError::from(StateError::AlreadyTerminal).is_retryable());
        assert!(
            !OrderError::from(ValidationError::InvalidPrice {
                unit_price: Decimal::NEGATIVE_ONE
            })
            .is_retryable()
        );
    }

    #[test]
    fn store_errors_translate() {
        let id = Uuid::new_v4();
        assert!(matches!(
            OrderError::from(StoreError::NotFound(id)),
            OrderError::OrderNotFound(found) if found == id
        ));
        assert!(matches!(
            OrderError::from(StoreError::ConcurrentModification),
            OrderError::ConcurrentModification
        ));
        assert!(matches!(
            OrderError::from(StoreError::Integrity(anyhow::anyhow!("check violation"))),
            OrderError::DataIntegrity(_)
        ));
    }
}

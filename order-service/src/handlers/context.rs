//! Caller identity extraction.
//!
//! Every order route runs on behalf of a tenant named by `x-tenant-id`.
//! `x-actor-id` is optional and only recorded in logs.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use uuid::Uuid;

use crate::error::{ErrorKind, OrderErrorResponse};
use crate::models::RequestContext;
use crate::services::metrics::ERRORS_TOTAL;

pub const TENANT_HEADER: &str = "x-tenant-id";
pub const ACTOR_HEADER: &str = "x-actor-id";

/// Rejection for a request whose identity headers are missing or malformed.
#[derive(Debug)]
pub struct IdentityRejection {
    code: &'static str,
    message: String,
}

impl IdentityRejection {
    fn missing_tenant(message: impl Into<String>) -> Self {
        Self {
            code: "missing_tenant",
            message: message.into(),
        }
    }

    fn invalid_actor(message: impl Into<String>) -> Self {
        Self {
            code: "invalid_actor",
            message: message.into(),
        }
    }
}

impl IntoResponse for IdentityRejection {
    fn into_response(self) -> Response {
        ERRORS_TOTAL.with_label_values(&[self.code]).inc();

        (
            StatusCode::BAD_REQUEST,
            Json(OrderErrorResponse {
                error: self.message,
                code: self.code,
                kind: ErrorKind::Validation,
                retryable: false,
            }),
        )
            .into_response()
    }
}

fn header_uuid(headers: &HeaderMap, name: &str) -> Result<Option<Uuid>, String> {
    let Some(value) = headers.get(name) else {
        return Ok(None);
    };

    value
        .to_str()
        .ok()
        .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
        .map(Some)
        .ok_or_else(|| format!("{} must be a UUID", name))
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = IdentityRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let tenant_id = header_uuid(&parts.headers, TENANT_HEADER)
            .map_err(IdentityRejection::missing_tenant)?
            .ok_or_else(|| {
                IdentityRejection::missing_tenant(format!("{} header is required", TENANT_HEADER))
            })?;

        let actor_id =
            header_uuid(&parts.headers, ACTOR_HEADER).map_err(IdentityRejection::invalid_actor)?;

        Ok(RequestContext {
            tenant_id,
            actor_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn header_uuid_handles_absent_valid_and_garbage() {
        let mut headers = HeaderMap::new();
        assert_eq!(header_uuid(&headers, TENANT_HEADER), Ok(None));

        let id = Uuid::new_v4();
        headers.insert(
            TENANT_HEADER,
            HeaderValue::from_str(&id.to_string()).unwrap(),
        );
        assert_eq!(header_uuid(&headers, TENANT_HEADER), Ok(Some(id)));

        headers.insert(TENANT_HEADER, HeaderValue::from_static("workshop-1"));
        assert!(header_uuid(&headers, TENANT_HEADER).is_err());
    }
}

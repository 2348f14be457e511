//! Caller identity passed explicitly into every order operation.

use uuid::Uuid;

/// Who is calling and on behalf of which workshop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestContext {
    pub tenant_id: Uuid,
    pub actor_id: Option<Uuid>,
}

impl RequestContext {
    pub fn new(tenant_id: Uuid) -> Self {
        Self {
            tenant_id,
            actor_id: None,
        }
    }

    pub fn with_actor(tenant_id: Uuid, actor_id: Uuid) -> Self {
        Self {
            tenant_id,
            actor_id: Some(actor_id),
        }
    }
}

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The authenticated backend user. Every row write is stamped with `id`
/// and every select is filtered by it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthUser {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl AuthUser {
    pub fn new(id: Uuid) -> Self {
        Self { id, email: None }
    }
}

//! Identity verification.
//!
//! Authentication is consumed as a capability: a credential goes in, an
//! identity with a role comes out, or the action is rejected with
//! `Unauthenticated` and no session is created or mutated.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::UserId;

pub mod errors;
pub mod jwt;

pub use errors::{AuthError, AuthResult};
pub use jwt::JwtVerifier;

/// Role attached to a verified identity.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Player,
    Admin,
}

impl Role {
    pub fn is_admin(self) -> bool {
        matches!(self, Role::Admin)
    }
}

/// A verified identity.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Identity {
    pub id: UserId,
    pub display_name: String,
    pub role: Role,
}

/// Credential verification consumed by the connection layer.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, credential: &str) -> AuthResult<Identity>;
}

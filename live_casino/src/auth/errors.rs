//! Auth error types.

use thiserror::Error;

/// Authentication errors
#[derive(Debug, Error)]
pub enum AuthError {
    /// Token signature or structure is invalid
    #[error("invalid credential")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),

    /// Token is structurally valid but carries unusable claims
    #[error("malformed claims: {0}")]
    MalformedClaims(String),
}

/// Result type for auth operations
pub type AuthResult<T> = Result<T, AuthError>;

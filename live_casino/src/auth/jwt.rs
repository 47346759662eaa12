//! JWT-backed identity verification.

use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use super::{
    errors::{AuthError, AuthResult},
    Identity, IdentityVerifier, Role,
};

#[derive(Debug, Deserialize, Serialize)]
struct Claims {
    /// User id.
    sub: String,
    /// Display name.
    name: String,
    /// `admin` or `player`.
    role: String,
    exp: usize,
}

/// Verifier for HS256-signed bearer tokens.
pub struct JwtVerifier {
    decoding: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }
}

#[async_trait]
impl IdentityVerifier for JwtVerifier {
    async fn verify(&self, credential: &str) -> AuthResult<Identity> {
        let token = decode::<Claims>(credential, &self.decoding, &self.validation)?;
        let claims = token.claims;
        let id = claims
            .sub
            .parse()
            .map_err(|_| AuthError::MalformedClaims(format!("bad subject: {}", claims.sub)))?;
        let role = match claims.role.as_str() {
            "admin" => Role::Admin,
            _ => Role::Player,
        };
        Ok(Identity {
            id,
            display_name: claims.name,
            role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token(secret: &str, sub: &str, role: &str) -> String {
        let claims = Claims {
            sub: sub.to_string(),
            name: "alice".to_string(),
            role: role.to_string(),
            exp: (chrono::Utc::now().timestamp() + 3600) as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn verifies_valid_token() {
        let verifier = JwtVerifier::new("test-secret");
        let identity = verifier.verify(&token("test-secret", "42", "admin")).await.unwrap();
        assert_eq!(identity.id, 42);
        assert_eq!(identity.role, Role::Admin);
        assert_eq!(identity.display_name, "alice");
    }

    #[tokio::test]
    async fn unknown_role_defaults_to_player() {
        let verifier = JwtVerifier::new("test-secret");
        let identity = verifier.verify(&token("test-secret", "1", "vip")).await.unwrap();
        assert_eq!(identity.role, Role::Player);
    }

    #[tokio::test]
    async fn rejects_wrong_signature() {
        let verifier = JwtVerifier::new("test-secret");
        let result = verifier.verify(&token("other-secret", "1", "player")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn rejects_non_numeric_subject() {
        let verifier = JwtVerifier::new("test-secret");
        let result = verifier.verify(&token("test-secret", "alice", "player")).await;
        assert!(matches!(result, Err(AuthError::MalformedClaims(_))));
    }
}

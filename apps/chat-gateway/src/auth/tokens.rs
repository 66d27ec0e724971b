//! Bearer token verification for socket handshakes.

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::Identity;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    /// Malformed, badly signed or expired.
    #[error("invalid token: {0}")]
    Invalid(String),
    /// The verifier itself could not be reached.
    #[error("token verifier unavailable: {0}")]
    Unavailable(String),
}

/// Verifies a credential and decodes the identity it carries.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Identity, TokenError>;
}

/// Access-token claims issued by the API layer.
#[derive(Debug, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default = "default_role")]
    pub role: String,
    pub exp: i64,
}

fn default_role() -> String {
    "USER".to_string()
}

impl From<AccessClaims> for Identity {
    fn from(claims: AccessClaims) -> Self {
        Identity {
            id: claims.sub,
            name: claims.name,
            avatar: claims.avatar,
            role: claims.role,
        }
    }
}

/// HS256 verifier sharing its secret with the token issuer.
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }
}

#[async_trait]
impl TokenVerifier for JwtVerifier {
    async fn verify(&self, token: &str) -> Result<Identity, TokenError> {
        let data = jsonwebtoken::decode::<AccessClaims>(token, &self.key, &self.validation)
            .map_err(|e| {
                tracing::debug!(?e, "access token rejected");
                TokenError::Invalid(e.to_string())
            })?;

        if data.claims.sub.trim().is_empty() {
            return Err(TokenError::Invalid("empty subject".to_string()));
        }
        Ok(data.claims.into())
    }
}

#[cfg(test)]
mod tests {
    use jsonwebtoken::{EncodingKey, Header};

    use super::*;

    const SECRET: &str = "unit-test-secret";

    fn mint(sub: &str, exp_offset_secs: i64, secret: &str) -> String {
        let claims = AccessClaims {
            sub: sub.to_string(),
            name: format!("{sub} display"),
            avatar: Some("https://cdn.example/a.png".to_string()),
            role: "ADMIN".to_string(),
            exp: chrono::Utc::now().timestamp() + exp_offset_secs,
        };
        jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn valid_token_yields_identity() {
        let verifier = JwtVerifier::new(SECRET);
        let identity = verifier.verify(&mint("alice", 300, SECRET)).await.unwrap();
        assert_eq!(identity.id, "alice");
        assert_eq!(identity.name, "alice display");
        assert_eq!(identity.role, "ADMIN");
        assert_eq!(identity.avatar.as_deref(), Some("https://cdn.example/a.png"));
    }

    #[tokio::test]
    async fn expired_token_is_invalid() {
        let verifier = JwtVerifier::new(SECRET);
        let err = verifier.verify(&mint("alice", -600, SECRET)).await.unwrap_err();
        assert!(matches!(err, TokenError::Invalid(_)));
    }

    #[tokio::test]
    async fn wrong_signature_is_invalid() {
        let verifier = JwtVerifier::new(SECRET);
        let err = verifier.verify(&mint("alice", 300, "other-secret")).await.unwrap_err();
        assert!(matches!(err, TokenError::Invalid(_)));
    }

    #[tokio::test]
    async fn garbage_is_invalid() {
        let verifier = JwtVerifier::new(SECRET);
        assert!(matches!(
            verifier.verify("not-a-jwt").await,
            Err(TokenError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn empty_subject_is_invalid() {
        let verifier = JwtVerifier::new(SECRET);
        assert!(matches!(
            verifier.verify(&mint("", 300, SECRET)).await,
            Err(TokenError::Invalid(_))
        ));
    }
}

//! Connection gate: classifies a handshake credential before admission.
//!
//! The gate never touches the transport. Callers close the socket on any
//! rejection, using [`GateError::close_code`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::auth::directory::UserDirectory;
use crate::auth::tokens::{TokenError, TokenVerifier};
use crate::auth::Identity;

/// Close codes (4000-range for application-level).
pub const CLOSE_UNAUTHENTICATED: u16 = 4001;
pub const CLOSE_INVALID_USER: u16 = 4003;
pub const CLOSE_AUTH_UNAVAILABLE: u16 = 4503;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GateError {
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),
    #[error("user account is not valid")]
    InvalidUser,
    #[error("auth service unavailable: {0}")]
    AuthServiceUnavailable(String),
}

impl GateError {
    pub fn close_code(&self) -> u16 {
        match self {
            GateError::Unauthenticated(_) => CLOSE_UNAUTHENTICATED,
            GateError::InvalidUser => CLOSE_INVALID_USER,
            GateError::AuthServiceUnavailable(_) => CLOSE_AUTH_UNAVAILABLE,
        }
    }

    /// Short reason safe to show the client.
    pub fn client_message(&self) -> &'static str {
        match self {
            GateError::Unauthenticated(_) => "Unauthenticated",
            GateError::InvalidUser => "Invalid user",
            GateError::AuthServiceUnavailable(_) => "Authentication service unavailable",
        }
    }
}

pub struct ConnectionGate {
    verifier: Arc<dyn TokenVerifier>,
    directory: Arc<dyn UserDirectory>,
    timeout: Duration,
}

impl ConnectionGate {
    pub fn new(
        verifier: Arc<dyn TokenVerifier>,
        directory: Arc<dyn UserDirectory>,
        timeout: Duration,
    ) -> Self {
        Self {
            verifier,
            directory,
            timeout,
        }
    }

    /// Verify the credential and confirm the account still exists.
    pub async fn admit(&self, token: Option<&str>) -> Result<Identity, GateError> {
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| GateError::Unauthenticated("missing token".to_string()))?;

        let identity = self
            .bounded("token verification", self.verifier.verify(token))
            .await?
            .map_err(|e| match e {
                TokenError::Invalid(reason) => GateError::Unauthenticated(reason),
                TokenError::Unavailable(reason) => GateError::AuthServiceUnavailable(reason),
            })?;

        let valid = self
            .bounded("user lookup", self.directory.is_valid(&identity.id))
            .await?
            .map_err(|e| {
                tracing::warn!(user_id = %identity.id, error = %e, "user directory unavailable");
                GateError::AuthServiceUnavailable(e.to_string())
            })?;

        if !valid {
            return Err(GateError::InvalidUser);
        }
        Ok(identity)
    }

    async fn bounded<T>(&self, what: &str, fut: impl Future<Output = T>) -> Result<T, GateError> {
        tokio::time::timeout(self.timeout, fut).await.map_err(|_| {
            tracing::warn!(timeout_ms = self.timeout.as_millis() as u64, "{what} timed out");
            GateError::AuthServiceUnavailable(format!("{what} timed out"))
        })
    }
}

//! User-existence checks against the identity service.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{StatusCode, Url};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("invalid identity service url: {0}")]
    InvalidUrl(String),
    #[error("identity service client setup failed: {0}")]
    Client(String),
    #[error("identity service request failed: {0}")]
    Transport(String),
    #[error("identity service returned {0}")]
    Status(u16),
}

/// Answers whether a user id refers to a currently valid account.
///
/// `Ok(false)` means the account is gone or disabled; `Err` means the answer
/// is unknown right now.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn is_valid(&self, user_id: &str) -> Result<bool, DirectoryError>;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

/// Looks users up with `GET {base_url}/users/{id}`.
///
/// 2xx means valid, 404/410 invalid. Anything else is transient and retried
/// with exponential backoff up to `max_attempts`.
#[derive(Clone)]
pub struct HttpUserDirectory {
    base_url: Url,
    http: reqwest::Client,
    max_attempts: u32,
    backoff: Duration,
}

impl HttpUserDirectory {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, DirectoryError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| DirectoryError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(DirectoryError::InvalidUrl(base_url.to_string()));
        }
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| DirectoryError::Client(e.to_string()))?;
        Ok(Self {
            base_url,
            http,
            max_attempts: 3,
            backoff: Duration::from_millis(100),
        })
    }

    pub fn with_retry(mut self, max_attempts: u32, backoff: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.backoff = backoff;
        self
    }

    /// `{base_url}/users/{user_id}` with the id as a single escaped segment.
    fn user_url(&self, user_id: &str) -> Result<Url, DirectoryError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| DirectoryError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .push("users")
            .push(user_id);
        Ok(url)
    }

    async fn lookup_once(&self, user_id: &str) -> Result<bool, DirectoryError> {
        let resp = self
            .http
            .get(self.user_url(user_id)?)
            .send()
            .await
            .map_err(|e| DirectoryError::Transport(e.to_string()))?;

        match resp.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND | StatusCode::GONE => Ok(false),
            s => Err(DirectoryError::Status(s.as_u16())),
        }
    }
}

#[async_trait]
impl UserDirectory for HttpUserDirectory {
    async fn is_valid(&self, user_id: &str) -> Result<bool, DirectoryError> {
        // Dot segments are dropped from URLs and would resolve elsewhere.
        if matches!(user_id, "" | "." | "..") {
            return Ok(false);
        }
        let mut delay = self.backoff;
        let mut attempt = 1;
        loop {
            match self.lookup_once(user_id).await {
                Ok(valid) => return Ok(valid),
                Err(err) if attempt < self.max_attempts => {
                    tracing::warn!(%user_id, attempt, error = %err, "user lookup failed, retrying");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory implementation (dev / tests)
// ---------------------------------------------------------------------------

pub struct MemoryUserDirectory {
    /// `None` accepts every user the token verifier accepted.
    allowed: Option<RwLock<HashSet<String>>>,
}

impl MemoryUserDirectory {
    pub fn allow_all() -> Self {
        Self { allowed: None }
    }

    pub fn with_users<I, S>(users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: Some(RwLock::new(users.into_iter().map(Into::into).collect())),
        }
    }

    /// Mark an account deleted. No effect in allow-all mode.
    pub fn remove(&self, user_id: &str) {
        if let Some(allowed) = &self.allowed {
            allowed.write().remove(user_id);
        }
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn is_valid(&self, user_id: &str) -> Result<bool, DirectoryError> {
        Ok(match &self.allowed {
            Some(allowed) => allowed.read().contains(user_id),
            None => true,
        })
    }
}

pub mod auth;
pub mod config;
pub mod error;
pub mod gateway;
pub mod routes;

use std::sync::Arc;

use auth::directory::{HttpUserDirectory, MemoryUserDirectory, UserDirectory};
use auth::tokens::JwtVerifier;
use config::Config;
use gateway::gate::ConnectionGate;
use gateway::Gateway;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wire the production collaborators from configuration.
    ///
    /// Panics if `USER_DIRECTORY_URL` is set but cannot be used.
    pub fn from_config(config: Config) -> Self {
        let directory: Arc<dyn UserDirectory> = match &config.user_directory_url {
            Some(url) => match HttpUserDirectory::new(url, config.auth_timeout) {
                Ok(directory) => Arc::new(directory),
                Err(e) => panic!("USER_DIRECTORY_URL is unusable: {e}"),
            },
            None => {
                tracing::warn!("USER_DIRECTORY_URL not set, accepting every verified token");
                Arc::new(MemoryUserDirectory::allow_all())
            }
        };
        let gate = ConnectionGate::new(
            Arc::new(JwtVerifier::new(&config.jwt_secret)),
            directory,
            config.auth_timeout,
        );
        Self {
            gateway: Arc::new(Gateway::new(gate)),
            config: Arc::new(config),
        }
    }
}

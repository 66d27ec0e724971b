pub mod directory;
pub mod middleware;
pub mod tokens;

use serde::{Deserialize, Serialize};

/// Authenticated user identity decoded from a bearer token.
///
/// Owned by the connection once admitted and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub avatar: Option<String>,
    pub role: String,
}

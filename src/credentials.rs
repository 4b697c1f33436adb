//! Gamer credentials
//!
//! Every authenticated call and every event loop is scoped to a gamer
//! identity obtained from a login. The backend authenticates with HTTP
//! Basic auth over the (gamer id, gamer secret) pair.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

/// Credentials identifying one logged-in gamer.
///
/// Serializable so a host can persist the pair from a login and resume
/// the session later without logging in again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Server-assigned gamer id
    pub gamer_id: String,
    /// Secret paired with the gamer id at login
    pub gamer_secret: String,
}

impl Credentials {
    /// Create credentials from a login result
    pub fn new(gamer_id: impl Into<String>, gamer_secret: impl Into<String>) -> Self {
        Self {
            gamer_id: gamer_id.into(),
            gamer_secret: gamer_secret.into(),
        }
    }

    /// Value for the `Authorization` header on authenticated requests
    pub fn authorization(&self) -> String {
        let pair = format!("{}:{}", self.gamer_id, self.gamer_secret);
        format!("Basic {}", STANDARD.encode(pair))
    }
}

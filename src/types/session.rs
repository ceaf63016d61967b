//! Authenticated guard session

use serde::{Deserialize, Serialize};

/// The logged-in guard, handed to orchestrators and the gateway at
/// construction.
///
/// Login itself happens elsewhere; this crate only carries the result.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardSession {
    /// Login name
    pub username: String,
    /// Name shown in the console header
    pub display_name: String,
    /// Bearer token for the backend API
    #[serde(skip_serializing)]
    pub access_token: String,
}

impl GuardSession {
    pub fn new(
        username: impl Into<String>,
        display_name: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            display_name: display_name.into(),
            access_token: access_token.into(),
        }
    }
}

impl std::fmt::Debug for GuardSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardSession")
            .field("username", &self.username)
            .field("display_name", &self.display_name)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

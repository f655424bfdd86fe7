use super::game::Platform;
use serde::{Deserialize, Serialize};

/// Username reported for a Steam account whose auto-login credential is unknown.
pub const UNKNOWN_USERNAME: &str = "UNKNOWN";

/// A locally known identity for one platform.
///
/// For Steam `id` is the numeric userdata folder name and `username` is the login
/// used for auto-login; for snapshot platforms both come from the snapshot name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountProfile {
    pub id: String,
    pub display_name: String,
    pub username: String,
    pub platform: Platform,
    #[serde(default)]
    pub avatar_url: String,
    #[serde(default)]
    pub comment: String,
}

impl AccountProfile {
    pub fn new(
        platform: Platform,
        id: impl Into<String>,
        display_name: impl Into<String>,
        username: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            username: username.into(),
            platform,
            avatar_url: String::new(),
            comment: String::new(),
        }
    }

    /// Whether this account carries a credential usable for auto-login.
    pub fn has_login(&self) -> bool {
        !self.username.is_empty() && self.username != UNKNOWN_USERNAME
    }
}

/// Accounts of one client, as presented to the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountGroup {
    pub name: String,
    pub platform: Platform,
    pub accounts: Vec<AccountProfile>,
}

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A game client (or pseudo-client) that contributes games and accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Platform {
    Steam,
    Epic,
    Legendary,
    Riot,
    Custom,
    Torrent,
}

impl Platform {
    /// Every platform, in the order account groups are presented.
    pub const ALL: [Platform; 6] = [
        Platform::Steam,
        Platform::Epic,
        Platform::Legendary,
        Platform::Riot,
        Platform::Custom,
        Platform::Torrent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Steam => "Steam",
            Platform::Epic => "Epic",
            Platform::Legendary => "Legendary",
            Platform::Riot => "Riot",
            Platform::Custom => "Custom",
            Platform::Torrent => "Torrent",
        }
    }

    /// Human-facing client name used for account groups and restart hints.
    pub fn client_name(&self) -> &'static str {
        match self {
            Platform::Steam => "Steam",
            Platform::Epic => "Epic Games",
            Platform::Legendary => "Legendary",
            Platform::Riot => "Riot Games",
            Platform::Custom => "Custom",
            Platform::Torrent => "Torrent",
        }
    }

    /// Platforms whose identities are switched by swapping a saved auth-state snapshot.
    pub fn uses_snapshots(&self) -> bool {
        matches!(self, Platform::Epic | Platform::Legendary | Platform::Riot)
    }

    /// Platforms whose games are local executables owned by the machine, not by an account.
    pub fn is_local(&self) -> bool {
        matches!(self, Platform::Custom | Platform::Torrent)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Platform::ALL
            .iter()
            .copied()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown platform: {}", s))
    }
}

/// Synthesized display name for a game whose real name could not be resolved.
pub fn placeholder_name(platform: Platform, id: &str) -> String {
    format!("{} App {}", platform, id)
}

/// Association between a local account and a game it can play.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerRef {
    pub account_id: String,
    pub display_name: String,
    pub username: String,
    #[serde(default)]
    pub note: String,
    #[serde(default, rename = "isHidden")]
    pub hidden_for_this_game: bool,
}

impl OwnerRef {
    pub fn new(
        account_id: impl Into<String>,
        display_name: impl Into<String>,
        username: impl Into<String>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            display_name: display_name.into(),
            username: username.into(),
            note: String::new(),
            hidden_for_this_game: false,
        }
    }
}

/// One entry of the unified library.
///
/// `id` is unique within a platform, `owners` never holds two entries with the same
/// `account_id`, and `name` is never empty (see [`placeholder_name`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameRecord {
    pub id: String,
    pub name: String,
    pub platform: Platform,
    #[serde(default, rename = "exePath")]
    pub install_path: Option<String>,
    #[serde(default, rename = "iconUrl")]
    pub icon_ref: String,
    #[serde(default, rename = "isInstalled")]
    pub installed: bool,
    #[serde(default, rename = "isPinned")]
    pub pinned: bool,
    #[serde(default, rename = "availableOn")]
    pub owners: Vec<OwnerRef>,
}

impl GameRecord {
    /// Create a record, substituting the placeholder when `name` is blank.
    pub fn new(platform: Platform, id: impl Into<String>, name: impl Into<String>) -> Self {
        let id = id.into();
        let name = name.into();
        let name = if name.trim().is_empty() {
            placeholder_name(platform, &id)
        } else {
            name
        };

        Self {
            id,
            name,
            platform,
            install_path: None,
            icon_ref: String::new(),
            installed: false,
            pinned: false,
            owners: Vec::new(),
        }
    }

    pub fn has_placeholder_name(&self) -> bool {
        self.name == placeholder_name(self.platform, &self.id)
    }

    /// Add an owner unless one with the same account id is already present.
    ///
    /// Returns `true` if the owner was added.
    pub fn add_owner(&mut self, owner: OwnerRef) -> bool {
        if self.owners.iter().any(|o| o.account_id == owner.account_id) {
            return false;
        }
        self.owners.push(owner);
        true
    }

    /// Replace a placeholder name with a real one. Real names are never overwritten.
    pub fn upgrade_name(&mut self, candidate: &str) {
        if self.has_placeholder_name() && !candidate.trim().is_empty() {
            self.name = candidate.to_string();
        }
    }
}

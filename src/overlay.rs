// Settings overlay
//
// User annotations layered on top of the resolved library: pins, per-account game notes,
// per-account hidden games, account comments/avatars and hidden accounts. The resolver
// never reads these; they are applied to its output afterwards.

use crate::models::{AccountGroup, GameRecord, Platform};
use crate::services::library::sort_catalog;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use std::fs;
use std::sync::{PoisonError, RwLock};

pub const ACCOUNT_SETTINGS_FILE: &str = "accounts_settings.json";
pub const GAME_SETTINGS_FILE: &str = "games_settings.json";

/// Annotations for one account, keyed by [`account_key`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSettings {
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub avatar_path: String,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub game_notes: IndexMap<String, String>,
    #[serde(default)]
    pub hidden_games: IndexMap<String, bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSettings {
    #[serde(default)]
    pub pinned: bool,
}

/// `"<Platform>:<username>"`
pub fn account_key(platform: Platform, username: &str) -> String {
    format!("{}:{}", platform, username)
}

#[derive(Debug, Default)]
struct OverlayMaps {
    accounts: IndexMap<String, AccountSettings>,
    games: IndexMap<String, GameSettings>,
}

/// The two overlay files and their in-memory copy.
///
/// Loaded once; every mutation writes the affected file straight back.
#[derive(Debug)]
pub struct SettingsOverlay {
    dir: Utf8PathBuf,
    maps: RwLock<OverlayMaps>,
}

impl SettingsOverlay {
    /// Load both files from `dir`. Missing or malformed files start empty.
    pub fn load(dir: impl Into<Utf8PathBuf>) -> Self {
        let dir = dir.into();
        let maps = OverlayMaps {
            accounts: read_map(&dir.join(ACCOUNT_SETTINGS_FILE)),
            games: read_map(&dir.join(GAME_SETTINGS_FILE)),
        };
        tracing::debug!(
            "Loaded overlay: {} account entries, {} game entries",
            maps.accounts.len(),
            maps.games.len()
        );
        Self {
            dir,
            maps: RwLock::new(maps),
        }
    }

    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    pub fn account(&self, platform: Platform, username: &str) -> Option<AccountSettings> {
        let maps = self.maps.read().unwrap_or_else(PoisonError::into_inner);
        maps.accounts.get(&account_key(platform, username)).cloned()
    }

    pub fn is_pinned(&self, game_id: &str) -> bool {
        let maps = self.maps.read().unwrap_or_else(PoisonError::into_inner);
        maps.games.get(game_id).is_some_and(|g| g.pinned)
    }

    /// Flip the pin of `game_id`. Returns the new value.
    pub fn toggle_game_pin(&self, game_id: &str) -> Result<bool> {
        let mut maps = self.maps.write().unwrap_or_else(PoisonError::into_inner);
        let entry = maps.games.entry(game_id.to_string()).or_default();
        entry.pinned = !entry.pinned;
        let pinned = entry.pinned;

        write_map(&self.dir.join(GAME_SETTINGS_FILE), &maps.games)?;
        tracing::info!("Game {} pinned: {}", game_id, pinned);
        Ok(pinned)
    }

    /// Flip whether `game_id` is hidden for one account. Returns the new value.
    pub fn toggle_game_account_hidden(
        &self,
        platform: Platform,
        username: &str,
        game_id: &str,
    ) -> Result<bool> {
        self.update_account(platform, username, |settings| {
            let hidden = settings.hidden_games.entry(game_id.to_string()).or_default();
            *hidden = !*hidden;
            *hidden
        })
    }

    /// Set the comment, and the avatar when `avatar_path` is non-empty.
    pub fn update_account_data(
        &self,
        platform: Platform,
        username: &str,
        comment: &str,
        avatar_path: &str,
    ) -> Result<()> {
        self.update_account(platform, username, |settings| {
            settings.comment = comment.to_string();
            if !avatar_path.is_empty() {
                settings.avatar_path = avatar_path.to_string();
            }
        })
    }

    /// Hide an account from every group. Its files are left alone.
    pub fn hide_account(&self, platform: Platform, username: &str) -> Result<()> {
        self.update_account(platform, username, |settings| settings.hidden = true)
    }

    pub fn update_game_note(
        &self,
        platform: Platform,
        username: &str,
        game_id: &str,
        note: &str,
    ) -> Result<()> {
        self.update_account(platform, username, |settings| {
            settings
                .game_notes
                .insert(game_id.to_string(), note.to_string());
        })
    }

    fn update_account<R>(
        &self,
        platform: Platform,
        username: &str,
        f: impl FnOnce(&mut AccountSettings) -> R,
    ) -> Result<R> {
        let mut maps = self.maps.write().unwrap_or_else(PoisonError::into_inner);
        let result = f(maps
            .accounts
            .entry(account_key(platform, username))
            .or_default());

        write_map(&self.dir.join(ACCOUNT_SETTINGS_FILE), &maps.accounts)?;
        Ok(result)
    }

    /// Apply pins, notes and hidden flags, then re-sort.
    pub fn apply_to_library(&self, games: &mut [GameRecord]) {
        let maps = self.maps.read().unwrap_or_else(PoisonError::into_inner);

        for game in games.iter_mut() {
            if let Some(settings) = maps.games.get(&game.id) {
                game.pinned = settings.pinned;
            }

            for owner in &mut game.owners {
                let Some(settings) = maps.accounts.get(&account_key(game.platform, &owner.username))
                else {
                    continue;
                };
                if let Some(note) = settings.game_notes.get(&game.id) {
                    owner.note = note.clone();
                }
                if settings.hidden_games.get(&game.id).copied().unwrap_or(false) {
                    owner.hidden_for_this_game = true;
                }
            }
        }

        drop(maps);
        sort_catalog(games);
    }

    /// Drop hidden accounts and fill in comments and avatars.
    ///
    /// A Steam group left with no accounts is removed; the snapshot clients keep their
    /// group so a first snapshot can still be saved.
    pub fn apply_to_groups(&self, groups: Vec<AccountGroup>) -> Vec<AccountGroup> {
        let maps = self.maps.read().unwrap_or_else(PoisonError::into_inner);

        groups
            .into_iter()
            .filter_map(|mut group| {
                group.accounts.retain_mut(|account| {
                    let key = account_key(account.platform, &account.username);
                    let Some(settings) = maps.accounts.get(&key) else {
                        return true;
                    };
                    if settings.hidden {
                        return false;
                    }
                    account.comment = settings.comment.clone();
                    if !settings.avatar_path.is_empty() {
                        account.avatar_url = settings.avatar_path.clone();
                    }
                    true
                });

                let keep = !group.accounts.is_empty() || group.platform.uses_snapshots();
                keep.then_some(group)
            })
            .collect()
    }
}

fn read_map<T: DeserializeOwned>(path: &Utf8Path) -> IndexMap<String, T> {
    let Ok(text) = fs::read_to_string(path) else {
        return IndexMap::new();
    };
    serde_json::from_str(&text).unwrap_or_else(|e| {
        tracing::warn!("Ignoring malformed {}: {}", path, e);
        IndexMap::new()
    })
}

fn write_map<T: Serialize>(path: &Utf8Path, map: &IndexMap<String, T>) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent))?;
    }
    let json = serde_json::to_string_pretty(map).context("Failed to serialize overlay")?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AccountProfile, OwnerRef};
    use tempfile::TempDir;

    fn overlay(dir: &TempDir) -> SettingsOverlay {
        SettingsOverlay::load(Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap())
    }

    #[test]
    fn test_pin_persists_and_resorts() {
        let tmp = TempDir::new().unwrap();
        let overlay = overlay(&tmp);
        assert!(overlay.toggle_game_pin("440").unwrap());

        // A fresh load sees the pin
        let overlay = self::overlay(&tmp);
        assert!(overlay.is_pinned("440"));

        let mut games = vec![
            GameRecord::new(Platform::Steam, "730", "Counter-Strike 2"),
            GameRecord::new(Platform::Steam, "440", "Team Fortress 2"),
        ];
        overlay.apply_to_library(&mut games);
        assert_eq!(games[0].id, "440");
        assert!(games[0].pinned);

        assert!(!overlay.toggle_game_pin("440").unwrap());
    }

    #[test]
    fn test_notes_and_hidden_games_apply_to_owners() {
        let tmp = TempDir::new().unwrap();
        let overlay = overlay(&tmp);
        overlay
            .update_game_note(Platform::Steam, "alice", "730", "main")
            .unwrap();
        assert!(overlay
            .toggle_game_account_hidden(Platform::Steam, "bob", "730")
            .unwrap());

        let mut game = GameRecord::new(Platform::Steam, "730", "Counter-Strike 2");
        game.add_owner(OwnerRef::new("1", "Alice", "alice"));
        game.add_owner(OwnerRef::new("2", "Bob", "bob"));
        let mut games = vec![game];
        overlay.apply_to_library(&mut games);

        assert_eq!(games[0].owners[0].note, "main");
        assert!(!games[0].owners[0].hidden_for_this_game);
        assert!(games[0].owners[1].hidden_for_this_game);
    }

    #[test]
    fn test_account_key_includes_platform() {
        let tmp = TempDir::new().unwrap();
        let overlay = overlay(&tmp);
        overlay
            .update_game_note(Platform::Epic, "alice", "730", "wrong client")
            .unwrap();

        let mut game = GameRecord::new(Platform::Steam, "730", "Counter-Strike 2");
        game.add_owner(OwnerRef::new("1", "Alice", "alice"));
        let mut games = vec![game];
        overlay.apply_to_library(&mut games);
        assert!(games[0].owners[0].note.is_empty());
    }

    #[test]
    fn test_groups_hide_and_annotate() {
        let tmp = TempDir::new().unwrap();
        let overlay = overlay(&tmp);
        overlay.hide_account(Platform::Steam, "bob").unwrap();
        overlay
            .update_account_data(Platform::Steam, "alice", "smurf", "")
            .unwrap();
        overlay
            .update_account_data(Platform::Steam, "alice", "main", "/img/a.png")
            .unwrap();
        overlay.hide_account(Platform::Epic, "work").unwrap();

        let groups = vec![
            AccountGroup {
                name: "Steam".into(),
                platform: Platform::Steam,
                accounts: vec![
                    AccountProfile::new(Platform::Steam, "1", "Alice", "alice"),
                    AccountProfile::new(Platform::Steam, "2", "Bob", "bob"),
                ],
            },
            AccountGroup {
                name: "Epic Games".into(),
                platform: Platform::Epic,
                accounts: vec![AccountProfile::new(Platform::Epic, "epic_work", "work", "work")],
            },
        ];

        let groups = overlay.apply_to_groups(groups);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].accounts.len(), 1);
        assert_eq!(groups[0].accounts[0].comment, "main");
        assert_eq!(groups[0].accounts[0].avatar_url, "/img/a.png");
        assert!(groups[1].accounts.is_empty());
    }

    #[test]
    fn test_empty_steam_group_removed() {
        let tmp = TempDir::new().unwrap();
        let overlay = overlay(&tmp);
        overlay.hide_account(Platform::Steam, "alice").unwrap();

        let groups = overlay.apply_to_groups(vec![AccountGroup {
            name: "Steam".into(),
            platform: Platform::Steam,
            accounts: vec![AccountProfile::new(Platform::Steam, "1", "Alice", "alice")],
        }]);
        assert!(groups.is_empty());
    }

    #[test]
    fn test_file_format() {
        let tmp = TempDir::new().unwrap();
        let overlay = overlay(&tmp);
        overlay
            .update_account_data(Platform::Riot, "main", "ranked", "")
            .unwrap();

        let text = fs::read_to_string(overlay.dir().join(ACCOUNT_SETTINGS_FILE)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["Riot:main"]["comment"], "ranked");
        assert_eq!(value["Riot:main"]["hidden"], false);
        assert!(value["Riot:main"]["gameNotes"].is_object());
    }

    #[test]
    fn test_malformed_file_starts_empty() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(GAME_SETTINGS_FILE), "{not json").unwrap();
        let overlay = overlay(&tmp);
        assert!(!overlay.is_pinned("440"));
    }
}

use super::{GameScanner, snapshot_accounts};
use crate::models::{AccountProfile, GameRecord, Platform};
use crate::services::profile_store::ProfileStore;
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use std::fs;

pub const EPIC_ICON: &str = "https://upload.wikimedia.org/wikipedia/commons/3/31/Epic_Games_logo.svg";

/// The fields we use from an Epic launcher `.item` manifest.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EpicManifest {
    app_name: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    install_location: String,
}

/// Installed Epic launcher games, plus saved Epic sessions as accounts.
pub struct EpicScanner {
    manifest_dir: Option<Utf8PathBuf>,
    profiles: Option<ProfileStore>,
}

impl EpicScanner {
    pub fn new(manifest_dir: Option<Utf8PathBuf>, profiles: Option<ProfileStore>) -> Self {
        Self {
            manifest_dir,
            profiles,
        }
    }

    fn read_manifest(path: &Utf8Path) -> Option<GameRecord> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("Skipping unreadable manifest {}: {}", path, e);
                return None;
            }
        };
        let manifest: EpicManifest = match serde_json::from_str(&text) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!("Skipping malformed manifest {}: {}", path, e);
                return None;
            }
        };
        if manifest.app_name.is_empty() {
            return None;
        }

        let mut game = GameRecord::new(Platform::Epic, manifest.app_name, manifest.display_name);
        game.installed = true;
        game.icon_ref = EPIC_ICON.to_string();
        if !manifest.install_location.is_empty() {
            game.install_path = Some(manifest.install_location);
        }
        Some(game)
    }
}

impl GameScanner for EpicScanner {
    fn platform(&self) -> Platform {
        Platform::Epic
    }

    fn scan_games(&self) -> Vec<GameRecord> {
        let Some(dir) = &self.manifest_dir else {
            return Vec::new();
        };
        let Ok(entries) = fs::read_dir(dir) else {
            tracing::debug!("No Epic manifests at {}", dir);
            return Vec::new();
        };

        let mut paths: Vec<Utf8PathBuf> = entries
            .flatten()
            .filter_map(|e| Utf8PathBuf::from_path_buf(e.path()).ok())
            .filter(|p| p.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("item")))
            .collect();
        paths.sort();

        paths.iter().filter_map(|p| Self::read_manifest(p)).collect()
    }

    fn scan_accounts(&self) -> Vec<AccountProfile> {
        self.profiles
            .as_ref()
            .map(snapshot_accounts)
            .unwrap_or_default()
    }
}

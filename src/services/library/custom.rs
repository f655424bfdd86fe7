use super::GameScanner;
use crate::models::{GameRecord, OwnerRef, Platform};
use anyhow::{Context, Result, bail};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::time::{SystemTime, UNIX_EPOCH};

pub const CUSTOM_GAMES_FILE: &str = "custom_games.json";

/// Games added by hand are owned by the machine, not by an account.
pub fn local_owner() -> OwnerRef {
    OwnerRef::new("local_pc", "This PC", "Local")
}

/// The user-maintained `custom_games.json` list.
#[derive(Debug, Clone)]
pub struct CustomGameStore {
    path: Utf8PathBuf,
}

impl CustomGameStore {
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Saved games. A missing file is an empty list.
    pub fn load(&self) -> Result<Vec<GameRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let text = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path))?;
        serde_json::from_str(&text).with_context(|| format!("Failed to parse {}", self.path))
    }

    fn save(&self, games: &[GameRecord]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent))?;
        }
        let json = serde_json::to_string_pretty(games).context("Failed to serialize games")?;
        fs::write(&self.path, json).with_context(|| format!("Failed to write {}", self.path))
    }

    /// Add an executable as a Custom or Torrent game.
    pub fn add_game(&self, platform: Platform, name: &str, exe_path: &str) -> Result<GameRecord> {
        if !platform.is_local() {
            bail!("{} games cannot be added by hand", platform);
        }
        if name.trim().is_empty() || exe_path.trim().is_empty() {
            bail!("empty fields");
        }

        let mut games = self.load()?;

        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let base = format!("{}_{}", platform.as_str().to_lowercase(), stamp);
        let mut id = base.clone();
        let mut n = 1;
        while games.iter().any(|g| g.id == id) {
            id = format!("{}_{}", base, n);
            n += 1;
        }

        let mut game = GameRecord::new(platform, id, name.trim());
        game.install_path = Some(exe_path.to_string());
        game.installed = true;

        games.push(game.clone());
        self.save(&games)?;
        tracing::info!("Added {} game \"{}\" ({})", platform, game.name, game.id);
        Ok(game)
    }

    /// Point a saved game at a custom icon image.
    pub fn update_icon(&self, id: &str, image_path: &str) -> Result<()> {
        let mut games = self.load()?;
        let game = games
            .iter_mut()
            .find(|g| g.id == id)
            .with_context(|| format!("Game not found: {}", id))?;
        game.icon_ref = image_path.to_string();

        self.save(&games)?;
        tracing::info!("Set icon of custom game {} to {}", id, image_path);
        Ok(())
    }

    /// Remove a game by id. Returns whether anything was removed.
    pub fn remove_game(&self, id: &str) -> Result<bool> {
        let mut games = self.load()?;
        let before = games.len();
        games.retain(|g| g.id != id);
        if games.len() == before {
            return Ok(false);
        }
        self.save(&games)?;
        tracing::info!("Removed custom game {}", id);
        Ok(true)
    }
}

pub struct CustomGamesScanner {
    store: CustomGameStore,
}

impl CustomGamesScanner {
    pub fn new(store: CustomGameStore) -> Self {
        Self { store }
    }
}

impl GameScanner for CustomGamesScanner {
    fn platform(&self) -> Platform {
        Platform::Custom
    }

    fn scan_games(&self) -> Vec<GameRecord> {
        let games = match self.store.load() {
            Ok(games) => games,
            Err(e) => {
                tracing::warn!("Skipping custom games: {:#}", e);
                return Vec::new();
            }
        };

        games
            .into_iter()
            .filter(|g| g.platform.is_local())
            .map(|mut g| {
                g.installed = true;
                g.owners = vec![local_owner()];
                g
            })
            .collect()
    }
}

use super::{GameScanner, snapshot_accounts};
use crate::models::{AccountProfile, GameRecord, Platform};
use crate::services::profile_store::ProfileStore;
use camino::Utf8PathBuf;
use serde_json::{Map, Value};
use std::fs;

/// Display name and icon of a known Riot product id.
fn product_info(id: &str) -> (String, &'static str) {
    match id {
        "valorant" => (
            "VALORANT".to_string(),
            "https://img.icons8.com/color/48/valorant.png",
        ),
        "league_of_legends" => (
            "League of Legends".to_string(),
            "https://img.icons8.com/color/48/league-of-legends.png",
        ),
        "bacon" => (
            "Legends of Runeterra".to_string(),
            "https://img.icons8.com/fluency/48/legends-of-runeterra.png",
        ),
        "2xko" => ("2XKO".to_string(), ""),
        other => (other.to_string(), ""),
    }
}

/// Installed products from `RiotClientInstalls.json`.
pub fn parse_installs(json: &str) -> serde_json::Result<Vec<GameRecord>> {
    let installs: Map<String, Value> = serde_json::from_str(json)?;

    let mut games: Vec<GameRecord> = installs
        .iter()
        .filter(|(key, _)| !matches!(key.as_str(), "rc_default" | "rc_live" | "rc_beta"))
        .filter_map(|(key, value)| {
            let path = value.as_str()?;
            let id = key.strip_suffix("_live").unwrap_or(key);
            let (name, icon) = product_info(id);

            let mut game = GameRecord::new(Platform::Riot, id, name);
            game.installed = true;
            game.icon_ref = icon.to_string();
            game.install_path = Some(path.to_string());
            Some(game)
        })
        .collect();

    games.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(games)
}

pub struct RiotScanner {
    installs_file: Option<Utf8PathBuf>,
    profiles: Option<ProfileStore>,
}

impl RiotScanner {
    pub fn new(installs_file: Option<Utf8PathBuf>, profiles: Option<ProfileStore>) -> Self {
        Self {
            installs_file,
            profiles,
        }
    }
}

impl GameScanner for RiotScanner {
    fn platform(&self) -> Platform {
        Platform::Riot
    }

    fn scan_games(&self) -> Vec<GameRecord> {
        let Some(path) = &self.installs_file else {
            return Vec::new();
        };
        let Ok(text) = fs::read_to_string(path) else {
            tracing::debug!("No Riot installs at {}", path);
            return Vec::new();
        };

        parse_installs(&text).unwrap_or_else(|e| {
            tracing::warn!("Skipping malformed {}: {}", path, e);
            Vec::new()
        })
    }

    fn scan_accounts(&self) -> Vec<AccountProfile> {
        self.profiles
            .as_ref()
            .map(snapshot_accounts)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_installs() {
        let json = r#"{
            "rc_default": "C:/Riot Games/Riot Client/RiotClientServices.exe",
            "rc_live": "C:/Riot Games/Riot Client/RiotClientServices.exe",
            "valorant_live": "C:/Riot Games/VALORANT/live/",
            "bacon_live": "C:/Riot Games/LoR/live/",
            "mystery": "D:/Riot/mystery",
            "associated_client": {"x": 1}
        }"#;

        let games = parse_installs(json).unwrap();
        let ids: Vec<&str> = games.iter().map(|g| g.id.as_str()).collect();
        assert_eq!(ids, vec!["bacon", "mystery", "valorant"]);
        assert_eq!(games[0].name, "Legends of Runeterra");
        assert_eq!(games[2].name, "VALORANT");
        assert!(games.iter().all(|g| g.installed && g.owners.is_empty()));
    }
}

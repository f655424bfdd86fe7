//! Unified game library built from every client's local files.
//!
//! Each client contributes through a [`GameScanner`]. Scanners are tolerant: an unreadable
//! or unparsable file is logged and skipped, never failing the whole scan.
//! [`LibraryResolver`] concatenates their output, merges duplicates and sorts the result
//! with [`sort_catalog`].

pub mod custom;
pub mod epic;
pub mod legendary;
pub mod riot;
pub mod steam;

pub use custom::{CustomGameStore, CustomGamesScanner};
pub use epic::EpicScanner;
pub use legendary::LegendaryScanner;
pub use riot::RiotScanner;
pub use steam::SteamScanner;

use super::profile_store::ProfileStore;
use crate::models::{AccountGroup, AccountProfile, GameRecord, Platform};
use std::collections::HashMap;

/// One client's view of installed/owned games and local accounts.
pub trait GameScanner: Send + Sync {
    fn platform(&self) -> Platform;

    fn scan_games(&self) -> Vec<GameRecord>;

    fn scan_accounts(&self) -> Vec<AccountProfile> {
        Vec::new()
    }
}

/// Accounts of a snapshot-based client are its saved snapshots.
pub fn snapshot_accounts(store: &ProfileStore) -> Vec<AccountProfile> {
    let platform = store.platform();
    store
        .list_snapshots()
        .into_iter()
        .map(|s| {
            AccountProfile::new(
                platform,
                format!("{}_{}", platform.as_str().to_lowercase(), s.metadata.name),
                s.metadata.name.clone(),
                s.metadata.name,
            )
        })
        .collect()
}

/// Pinned first, then installed, then name by ordinal comparison. Stable.
pub fn sort_catalog(games: &mut [GameRecord]) {
    games.sort_by(|a, b| {
        b.pinned
            .cmp(&a.pinned)
            .then(b.installed.cmp(&a.installed))
            .then_with(|| a.name.cmp(&b.name))
    });
}

/// Runs every registered scanner and produces the sorted catalog.
#[derive(Default)]
pub struct LibraryResolver {
    scanners: Vec<Box<dyn GameScanner>>,
}

impl LibraryResolver {
    pub fn new(scanners: Vec<Box<dyn GameScanner>>) -> Self {
        Self { scanners }
    }

    pub fn add_scanner(&mut self, scanner: Box<dyn GameScanner>) {
        self.scanners.push(scanner);
    }

    pub fn platforms(&self) -> Vec<Platform> {
        self.scanners.iter().map(|s| s.platform()).collect()
    }

    /// Every game from every scanner, one record per `(platform, id)`.
    pub fn resolve(&self) -> Vec<GameRecord> {
        let mut catalog: Vec<GameRecord> = Vec::new();
        let mut index: HashMap<(Platform, String), usize> = HashMap::new();

        for scanner in &self.scanners {
            let games = scanner.scan_games();
            tracing::debug!("{} scanner returned {} games", scanner.platform(), games.len());

            for game in games {
                let key = (game.platform, game.id.clone());
                match index.get(&key) {
                    Some(&i) => merge_into(&mut catalog[i], game),
                    None => {
                        index.insert(key, catalog.len());
                        catalog.push(game);
                    }
                }
            }
        }

        sort_catalog(&mut catalog);
        tracing::info!("Resolved library with {} games", catalog.len());
        catalog
    }

    /// Accounts from every scanner, in scanner order.
    pub fn scan_accounts(&self) -> Vec<AccountProfile> {
        self.scanners
            .iter()
            .flat_map(|s| s.scan_accounts())
            .collect()
    }

    /// Accounts grouped per client. Steam appears only when it has accounts; the snapshot
    /// clients always appear so the UI can offer to save one.
    pub fn account_groups(&self) -> Vec<AccountGroup> {
        let mut groups = Vec::new();

        for scanner in &self.scanners {
            let platform = scanner.platform();
            if platform.is_local() {
                continue;
            }

            let accounts = scanner.scan_accounts();
            if accounts.is_empty() && !platform.uses_snapshots() {
                continue;
            }

            groups.push(AccountGroup {
                name: platform.client_name().to_string(),
                platform,
                accounts,
            });
        }

        groups
    }
}

fn merge_into(existing: &mut GameRecord, incoming: GameRecord) {
    existing.upgrade_name(&incoming.name);
    existing.installed |= incoming.installed;
    existing.pinned |= incoming.pinned;
    if existing.install_path.is_none() {
        existing.install_path = incoming.install_path;
    }
    if existing.icon_ref.is_empty() {
        existing.icon_ref = incoming.icon_ref;
    }
    for owner in incoming.owners {
        existing.add_owner(owner);
    }
}

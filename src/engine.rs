//! Composition root: owns every long-lived piece and exposes the operations the UI calls.
//!
//! Operations that the UI renders as a single line return that line (`"Switched to alice"`,
//! `"Saved"`, `"Error: ..."`) instead of a `Result`, so every failure reaches the user
//! verbatim. Library and account queries return data.

use crate::metrics::Metrics;
use crate::models::{AccountGroup, GameRecord, Platform, UserConfig};
use crate::overlay::SettingsOverlay;
use crate::services::library::custom::{CUSTOM_GAMES_FILE, CustomGameStore, CustomGamesScanner};
use crate::services::library::legendary::LegendaryClient;
use crate::services::library::{EpicScanner, LegendaryScanner, RiotScanner, SteamScanner};
use crate::services::name_cache::CACHE_FILE_NAME;
use crate::services::{
    AppNameCache, AuthState, CatalogSource, HttpCatalogSource, LibraryResolver, PlatformOps,
    ProcessCoordinator, ProcessTarget, ProfileStore, SwitchOrchestrator,
};
use crate::state::StateManager;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::HashMap;
use std::fs;
use std::sync::Arc;

const LEGENDARY_PROGRAM: &str = "legendary";
const LEGENDARY_USER_FILE: &str = "user.json";

/// Status returned by [`Engine::remove_game`] for store-owned games.
pub const REMOVE_UNSUPPORTED: &str = "Cannot remove Steam/Epic/Riot games via this method";

/// Status returned by [`Engine::set_game_image`] for store-owned games.
pub const IMAGE_UNSUPPORTED: &str = "Not supported for this platform";

/// Everything needed to answer the UI, built once at startup.
pub struct Engine {
    config: UserConfig,
    data_dir: Utf8PathBuf,
    profiles: HashMap<Platform, ProfileStore>,
    custom_games: CustomGameStore,
    legendary: LegendaryClient,
    resolver: LibraryResolver,
    overlay: SettingsOverlay,
    orchestrator: SwitchOrchestrator,
    state: StateManager,
    metrics: Arc<Metrics>,
}

impl Engine {
    /// Wire up the engine against the real OS process table and the remote app catalog.
    pub fn new(config: UserConfig, ops: Arc<dyn PlatformOps>) -> Result<Self> {
        let data_dir = resolve_data_dir(&config)?;
        let catalog = Box::new(HttpCatalogSource::new(
            config.catalog_urls.clone(),
            config.catalog_timeout(),
        ));
        Self::from_parts(config, data_dir, ops, ProcessCoordinator::system(), catalog)
    }

    /// Wire up the engine from explicit collaborators.
    pub fn from_parts(
        config: UserConfig,
        data_dir: Utf8PathBuf,
        ops: Arc<dyn PlatformOps>,
        coordinator: ProcessCoordinator,
        catalog: Box<dyn CatalogSource>,
    ) -> Result<Self> {
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir))?;

        let steam_root = if config.steam_path.trim().is_empty() {
            ops.steam_root()
        } else {
            Some(Utf8PathBuf::from(config.steam_path.trim()))
        };
        match &steam_root {
            Some(root) => tracing::info!("Steam root: {}", root),
            None => tracing::info!("Steam not found on this system"),
        }

        let names = Arc::new(AppNameCache::new(Some(data_dir.join(CACHE_FILE_NAME)), catalog));

        let auth_states = [
            (Platform::Epic, ops.epic_auth_dir().map(AuthState::Directory)),
            (Platform::Riot, ops.riot_settings_file().map(AuthState::File)),
            (
                Platform::Legendary,
                ops.legendary_config_dir()
                    .map(|dir| AuthState::File(dir.join(LEGENDARY_USER_FILE))),
            ),
        ];

        let mut profiles = HashMap::new();
        for (platform, auth_state) in auth_states {
            let Some(auth_state) = auth_state else {
                tracing::debug!("No {} auth state on {}", platform, ops.os_name());
                continue;
            };
            let target = ProcessTarget::new(
                platform,
                ops.process_names(platform),
                config.kill_poll_attempts,
                config.kill_poll_interval(),
            );
            let store = ProfileStore::new(
                platform,
                auth_state,
                data_dir.join(format!("{}_accounts", platform.as_str().to_lowercase())),
                Some(target),
                coordinator.clone(),
            );
            profiles.insert(platform, store);
        }

        let custom_games = CustomGameStore::new(data_dir.join(CUSTOM_GAMES_FILE));
        let legendary = LegendaryClient::new(LEGENDARY_PROGRAM, Arc::clone(&ops));

        let resolver = LibraryResolver::new(vec![
            Box::new(SteamScanner::new(steam_root.clone(), Arc::clone(&names))),
            Box::new(EpicScanner::new(
                ops.epic_manifest_dir(),
                profiles.get(&Platform::Epic).cloned(),
            )),
            Box::new(LegendaryScanner::new(
                legendary.clone(),
                profiles.get(&Platform::Legendary).cloned(),
            )),
            Box::new(RiotScanner::new(
                ops.riot_installs_file(),
                profiles.get(&Platform::Riot).cloned(),
            )),
            Box::new(CustomGamesScanner::new(custom_games.clone())),
        ]);

        let overlay = SettingsOverlay::load(data_dir.clone());
        let state = StateManager::new();
        let metrics = Arc::new(Metrics::new());

        let mut orchestrator =
            SwitchOrchestrator::new(ops, coordinator, state.clone(), Arc::clone(&metrics))
                .with_steam_root(steam_root)
                .with_kill_polling(config.kill_poll_attempts, config.kill_poll_interval())
                .with_legendary_program(LEGENDARY_PROGRAM);
        for store in profiles.values() {
            orchestrator = orchestrator.with_profile_store(store.clone());
        }

        tracing::info!(
            "Engine ready: data dir {}, snapshot clients {:?}",
            data_dir,
            profiles.keys().map(Platform::as_str).collect::<Vec<_>>()
        );

        Ok(Self {
            config,
            data_dir,
            profiles,
            custom_games,
            legendary,
            resolver,
            overlay,
            orchestrator,
            state,
            metrics,
        })
    }

    pub fn config(&self) -> &UserConfig {
        &self.config
    }

    pub fn data_dir(&self) -> &Utf8Path {
        &self.data_dir
    }

    pub fn state(&self) -> &StateManager {
        &self.state
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// The unified catalog with pins, notes and hidden flags applied.
    ///
    /// Blocking: may read many files and fetch the remote app catalog once.
    pub fn get_library(&self) -> Vec<GameRecord> {
        let mut games = self.resolver.resolve();
        self.overlay.apply_to_library(&mut games);

        self.metrics.record_library_scan(games.len());
        let accounts = self.state.read(|s| s.account_count);
        self.state.set_library_counts(games.len(), accounts);
        games
    }

    /// Accounts per client, minus hidden ones.
    pub fn get_account_groups(&self) -> Vec<AccountGroup> {
        let groups = self.overlay.apply_to_groups(self.resolver.account_groups());

        let accounts = groups.iter().map(|g| g.accounts.len()).sum();
        let games = self.state.read(|s| s.library_size);
        self.state.set_library_counts(games, accounts);
        groups
    }

    pub async fn switch_to_account(&self, account: &str, platform: Platform) -> String {
        match self.orchestrator.switch_to_account(platform, account).await {
            Ok(outcome) => outcome.status,
            Err(e) => e.status(),
        }
    }

    /// `exe_path` is only used for Custom/Torrent games; pass `""` otherwise.
    pub async fn launch_game(
        &self,
        account: &str,
        game_id: &str,
        platform: Platform,
        exe_path: &str,
    ) -> String {
        let exe_path = Some(exe_path).filter(|p| !p.is_empty());
        match self
            .orchestrator
            .launch_game(platform, account, game_id, exe_path)
            .await
        {
            Ok(outcome) => outcome.status,
            Err(e) => e.status(),
        }
    }

    /// Snapshot the live login of `platform` under `name`.
    pub fn save_snapshot(&self, platform: Platform, name: &str) -> String {
        let Some(store) = self.profiles.get(&platform) else {
            return "Platform not supported".to_string();
        };

        match store.save_snapshot(name) {
            Ok(snapshot) => {
                self.metrics.record_snapshot_saved();
                self.state.snapshot_saved(platform, &snapshot.name);
                "Saved".to_string()
            }
            Err(e) => {
                tracing::error!("Saving {} snapshot \"{}\" failed: {}", platform, name, e);
                format!("Error: {}", e)
            }
        }
    }

    /// Names of the saved snapshots of `platform`, sorted.
    pub fn list_snapshots(&self, platform: Platform) -> Vec<String> {
        self.profiles
            .get(&platform)
            .map(|store| {
                store
                    .list_snapshots()
                    .into_iter()
                    .map(|s| s.name)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn add_custom_game(&self, name: &str, exe_path: &str, platform: Platform) -> String {
        if name.trim().is_empty() || exe_path.trim().is_empty() {
            return "Error: empty fields".to_string();
        }
        status(self.custom_games.add_game(platform, name, exe_path), "Success")
    }

    pub fn remove_game(&self, game_id: &str, platform: Platform) -> String {
        if !platform.is_local() {
            return REMOVE_UNSUPPORTED.to_string();
        }
        status(self.custom_games.remove_game(game_id), "Success")
    }

    /// Use `image_path` as the icon of a Custom/Torrent game. Returns the path on success.
    pub fn set_game_image(&self, game_id: &str, platform: Platform, image_path: &str) -> String {
        if image_path.trim().is_empty() {
            return "Cancelled".to_string();
        }
        if !platform.is_local() {
            return IMAGE_UNSUPPORTED.to_string();
        }
        status(
            self.custom_games.update_icon(game_id, image_path),
            image_path,
        )
    }

    /// Open a terminal running `legendary auth`; the login finishes there.
    pub fn login_legendary_account(&self) -> String {
        match self.legendary.open_login_terminal() {
            Ok(()) => "Terminal launched. Please complete login there.".to_string(),
            Err(e) => {
                tracing::error!("{}", e);
                format!("Error launching terminal: {}", e)
            }
        }
    }

    /// Log Legendary in with an Epic session id.
    pub fn legendary_login(&self, sid: &str) -> String {
        status(self.legendary.auth(sid), "Success")
    }

    pub fn legendary_status(&self) -> String {
        match self.legendary.status() {
            Ok(Some(account)) => format!("Logged in as {}", account),
            Ok(None) => "Not logged in".to_string(),
            Err(e) => status::<(), _>(Err(e), ""),
        }
    }

    pub fn legendary_install(&self, app_name: &str) -> String {
        status(self.legendary.install(app_name), "Installation Started")
    }

    pub fn legendary_logout(&self) -> String {
        status(self.legendary.logout(), "Logged out")
    }

    pub fn toggle_game_pin(&self, game_id: &str) -> String {
        status(self.overlay.toggle_game_pin(game_id), "Success")
    }

    pub fn toggle_game_account_hidden(
        &self,
        username: &str,
        platform: Platform,
        game_id: &str,
    ) -> String {
        status(
            self.overlay
                .toggle_game_account_hidden(platform, username, game_id),
            "Success",
        )
    }

    pub fn update_account_data(
        &self,
        username: &str,
        platform: Platform,
        comment: &str,
        avatar_path: &str,
    ) -> String {
        status(
            self.overlay
                .update_account_data(platform, username, comment, avatar_path),
            "Saved",
        )
    }

    /// Hide an account from the list. Nothing on disk besides the overlay changes.
    pub fn delete_account(&self, username: &str, platform: Platform) -> String {
        status(
            self.overlay.hide_account(platform, username),
            "Account removed from list",
        )
    }

    pub fn update_game_note(
        &self,
        username: &str,
        platform: Platform,
        game_id: &str,
        note: &str,
    ) -> String {
        status(
            self.overlay
                .update_game_note(platform, username, game_id, note),
            "Saved",
        )
    }
}

fn status<T, E>(result: Result<T, E>, success: &str) -> String
where
    E: Into<anyhow::Error>,
{
    match result.map_err(Into::into) {
        Ok(_) => success.to_string(),
        Err(e) => {
            tracing::error!("{:#}", e);
            format!("Error: {:#}", e)
        }
    }
}

/// `config.data_dir`, or `<OS config dir>/swch` when unset.
pub fn resolve_data_dir(config: &UserConfig) -> Result<Utf8PathBuf> {
    if !config.data_dir.trim().is_empty() {
        return Ok(Utf8PathBuf::from(config.data_dir.trim()));
    }
    crate::config::ConfigManager::default_dir()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{LaunchRequest, ProcessTable};
    use std::collections::HashMap as Map;
    use std::process::Command;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct Offline;

    impl CatalogSource for Offline {
        fn fetch(&self) -> Option<Map<String, String>> {
            None
        }
    }

    struct EmptyTable;

    impl ProcessTable for EmptyTable {
        fn kill_matching(&self, _names: &[String]) -> usize {
            0
        }
        fn any_running(&self, _names: &[String]) -> bool {
            false
        }
    }

    /// Every client file lives under one temp directory; launches are recorded.
    struct SandboxOps {
        home: Utf8PathBuf,
        launched: Mutex<Vec<LaunchRequest>>,
    }

    impl PlatformOps for SandboxOps {
        fn os_name(&self) -> &'static str {
            "sandbox"
        }
        fn steam_root(&self) -> Option<Utf8PathBuf> {
            None
        }
        fn steam_client(&self, _root: &Utf8Path) -> LaunchRequest {
            LaunchRequest::Uri("steam://open/main".into())
        }
        fn write_steam_auto_login(&self, _root: &Utf8Path, _username: &str) -> Result<()> {
            Ok(())
        }
        fn epic_auth_dir(&self) -> Option<Utf8PathBuf> {
            Some(self.home.join("epic_auth"))
        }
        fn epic_manifest_dir(&self) -> Option<Utf8PathBuf> {
            Some(self.home.join("epic_manifests"))
        }
        fn epic_client(&self) -> Option<LaunchRequest> {
            None
        }
        fn riot_settings_file(&self) -> Option<Utf8PathBuf> {
            Some(self.home.join("RiotClientPrivateSettings.yaml"))
        }
        fn riot_installs_file(&self) -> Option<Utf8PathBuf> {
            None
        }
        fn riot_product_launch(&self, _product_id: &str) -> Option<LaunchRequest> {
            None
        }
        fn legendary_config_dir(&self) -> Option<Utf8PathBuf> {
            None
        }
        fn process_names(&self, _platform: Platform) -> Vec<String> {
            Vec::new()
        }
        fn open_command(&self, uri: &str) -> Command {
            Command::new(uri)
        }
        fn launch(&self, request: &LaunchRequest) -> Result<(), crate::services::ProcessError> {
            self.launched.lock().unwrap().push(request.clone());
            Ok(())
        }
    }

    fn sandbox(dir: &TempDir) -> (Engine, Utf8PathBuf, Arc<SandboxOps>) {
        let home = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        let ops = Arc::new(SandboxOps {
            home: home.clone(),
            launched: Mutex::new(Vec::new()),
        });
        let engine = Engine::from_parts(
            UserConfig::default(),
            home.join("data"),
            ops.clone(),
            ProcessCoordinator::new(Arc::new(EmptyTable)),
            Box::new(Offline),
        )
        .unwrap();
        (engine, home, ops)
    }

    fn engine(dir: &TempDir) -> (Engine, Utf8PathBuf) {
        let (engine, home, _ops) = sandbox(dir);
        (engine, home)
    }

    #[test]
    fn test_custom_game_lifecycle() {
        let dir = TempDir::new().unwrap();
        let (engine, _home) = engine(&dir);

        assert_eq!(
            engine.add_custom_game("", "/bin/game", Platform::Custom),
            "Error: empty fields"
        );
        assert_eq!(
            engine.add_custom_game("Doom", "/games/doom.exe", Platform::Custom),
            "Success"
        );

        let library = engine.get_library();
        let doom = library.iter().find(|g| g.name == "Doom").unwrap();
        assert_eq!(doom.platform, Platform::Custom);
        assert_eq!(engine.state().snapshot().library_size, library.len());

        assert_eq!(engine.remove_game(&doom.id, Platform::Steam), REMOVE_UNSUPPORTED);
        assert_eq!(engine.remove_game(&doom.id, Platform::Custom), "Success");
        assert!(engine.get_library().iter().all(|g| g.name != "Doom"));
    }

    #[test]
    fn test_set_game_image() {
        let dir = TempDir::new().unwrap();
        let (engine, _home) = engine(&dir);
        engine.add_custom_game("Doom", "/games/doom.exe", Platform::Custom);
        let doom = engine.get_library().into_iter().find(|g| g.name == "Doom").unwrap();

        assert_eq!(
            engine.set_game_image(&doom.id, Platform::Custom, "/art/doom.png"),
            "/art/doom.png"
        );
        let doom = engine.get_library().into_iter().find(|g| g.id == doom.id).unwrap();
        assert_eq!(doom.icon_ref, "/art/doom.png");

        assert_eq!(
            engine.set_game_image("440", Platform::Steam, "/art/tf2.png"),
            IMAGE_UNSUPPORTED
        );
        assert_eq!(engine.set_game_image(&doom.id, Platform::Custom, ""), "Cancelled");
        assert!(engine
            .set_game_image("custom_missing", Platform::Torrent, "/art/x.png")
            .starts_with("Error: Game not found"));
    }

    #[test]
    fn test_legendary_terminal_login_and_install() {
        let dir = TempDir::new().unwrap();
        let (engine, _home, ops) = sandbox(&dir);

        assert_eq!(
            engine.login_legendary_account(),
            "Terminal launched. Please complete login there."
        );
        assert_eq!(engine.legendary_install("Sugar"), "Installation Started");

        let launched = ops.launched.lock().unwrap();
        assert_eq!(launched[0].describe(), "x-terminal-emulator -e legendary auth");
        assert_eq!(launched[1].describe(), "legendary install Sugar --yes");
    }

    #[test]
    fn test_legendary_status_lines() {
        use crate::services::library::legendary::{CliOutput, MockCliRunner};

        let dir = TempDir::new().unwrap();
        let (mut engine, _home) = engine(&dir);

        let mut runner = MockCliRunner::new();
        runner
            .expect_output()
            .withf(|_, args| args.first().map(String::as_str) == Some("status"))
            .returning(|_, _| {
                Ok(CliOutput {
                    success: true,
                    stdout: r#"{"account":"alice"}"#.into(),
                    ..CliOutput::default()
                })
            });
        runner
            .expect_output()
            .withf(|_, args| args.first().map(String::as_str) == Some("auth"))
            .returning(|_, _| Err(std::io::Error::from(std::io::ErrorKind::NotFound)));
        engine.legendary = engine.legendary.clone().with_runner(Arc::new(runner));

        assert_eq!(engine.legendary_status(), "Logged in as alice");
        assert!(engine.legendary_logout().starts_with("Error: legendary not found"));
        assert_eq!(engine.legendary_login(""), "Error: Session ID is empty");
    }

    #[test]
    fn test_pin_moves_game_to_front() {
        let dir = TempDir::new().unwrap();
        let (engine, _home) = engine(&dir);
        engine.add_custom_game("Alpha", "/a.exe", Platform::Custom);
        engine.add_custom_game("Zeta", "/z.exe", Platform::Torrent);

        let zeta = engine
            .get_library()
            .into_iter()
            .find(|g| g.name == "Zeta")
            .unwrap();
        assert_eq!(engine.toggle_game_pin(&zeta.id), "Success");

        let library = engine.get_library();
        assert_eq!(library[0].name, "Zeta");
        assert!(library[0].pinned);
    }

    #[tokio::test]
    async fn test_save_and_switch_snapshot() {
        let dir = TempDir::new().unwrap();
        let (engine, home) = engine(&dir);
        let auth = home.join("epic_auth");

        assert!(engine.save_snapshot(Platform::Epic, "alice").starts_with("Error: Nothing to save"));

        fs::create_dir_all(&auth).unwrap();
        fs::write(auth.join("token.ini"), "alice").unwrap();
        assert_eq!(engine.save_snapshot(Platform::Epic, "alice"), "Saved");
        fs::write(auth.join("token.ini"), "bob").unwrap();
        assert_eq!(engine.save_snapshot(Platform::Epic, "bob"), "Saved");
        assert_eq!(engine.list_snapshots(Platform::Epic), vec!["alice", "bob"]);
        assert_eq!(engine.metrics().snapshots_saved.load(std::sync::atomic::Ordering::Relaxed), 2);

        let status = engine.switch_to_account("alice", Platform::Epic).await;
        assert_eq!(status, "Switched to alice. Please restart Epic Launcher.");
        assert_eq!(fs::read_to_string(auth.join("token.ini")).unwrap(), "alice");

        let groups = engine.get_account_groups();
        let epic = groups.iter().find(|g| g.platform == Platform::Epic).unwrap();
        assert_eq!(epic.accounts.len(), 2);
        assert_eq!(engine.state().snapshot().account_count, 2);
    }

    #[tokio::test]
    async fn test_unsupported_paths_report_status() {
        let dir = TempDir::new().unwrap();
        let (engine, _home) = engine(&dir);

        assert_eq!(engine.save_snapshot(Platform::Legendary, "x"), "Platform not supported");
        assert!(engine.list_snapshots(Platform::Legendary).is_empty());
        assert_eq!(
            engine.switch_to_account("alice", Platform::Steam).await,
            "Platform not supported"
        );
        assert_eq!(
            engine.launch_game("", "riot_game", Platform::Riot, "").await,
            "Platform not supported"
        );
    }

    #[test]
    fn test_delete_account_hides_it() {
        let dir = TempDir::new().unwrap();
        let (engine, home) = engine(&dir);
        let riot = home.join("RiotClientPrivateSettings.yaml");
        fs::write(&riot, "session: a").unwrap();
        assert_eq!(engine.save_snapshot(Platform::Riot, "main"), "Saved");

        assert_eq!(
            engine.update_account_data("main", Platform::Riot, "smurf", ""),
            "Saved"
        );
        let riot_group = |engine: &Engine| {
            engine
                .get_account_groups()
                .into_iter()
                .find(|g| g.platform == Platform::Riot)
                .unwrap()
        };
        assert_eq!(riot_group(&engine).accounts[0].comment, "smurf");

        assert_eq!(
            engine.delete_account("main", Platform::Riot),
            "Account removed from list"
        );
        assert!(riot_group(&engine).accounts.is_empty());
        assert_eq!(engine.list_snapshots(Platform::Riot), vec!["main"]);
    }
}

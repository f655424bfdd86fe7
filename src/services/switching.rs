//! Account switching and game launching.
//!
//! Every request walks the same state machine, reported through [`StateManager`]:
//!
//! ```text
//! Idle → Terminating → StateSwapped → Relaunching → Done
//!   └──────────┴─────────────┴──────────────┴──────→ Failed(kind)
//! ```
//!
//! Steam switches patch `loginusers.vdf` and the auto-login credential in place. Epic,
//! Riot and Legendary switches restore a [`ProfileStore`] snapshot. Steps run strictly in
//! order and the first error aborts the request; nothing is retried or rolled back.
//!
//! Requests for the same platform are serialized by a per-platform async mutex, so two
//! restores can never interleave on one auth-state directory. Different platforms run
//! independently.

use super::keyvalue::{self, KeyValueDocument};
use super::library::steam::{find_login_user, login_users_path};
use super::platform_ops::{LaunchRequest, PlatformOps};
use super::process::{ProcessCoordinator, ProcessError, ProcessTarget, StopOutcome};
use super::profile_store::{ProfileError, ProfileStore};
use crate::metrics::Metrics;
use crate::models::{Platform, SwitchFailureKind, SwitchPhase, UNKNOWN_USERNAME};
use crate::state::StateManager;
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::HashMap;
use std::fs;
use std::sync::{Arc, PoisonError};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::Mutex;

/// Account names meaning "use whoever is logged in": no switch before a launch.
pub const NO_SWITCH_SENTINELS: [&str; 3] = ["", "Main Profile", "Active Account"];

#[derive(Error, Debug)]
pub enum SwitchError {
    #[error("Login not found.")]
    LoginNotResolved(String),

    #[error(transparent)]
    ProcessKillFailed(ProcessError),

    #[error("{0}")]
    StateSwapFailed(String),

    #[error(transparent)]
    RelaunchFailed(ProcessError),

    #[error("{0} is not supported here")]
    Unsupported(Platform),
}

impl SwitchError {
    pub fn kind(&self) -> SwitchFailureKind {
        match self {
            SwitchError::LoginNotResolved(_) => SwitchFailureKind::LoginNotResolved,
            SwitchError::ProcessKillFailed(_) => SwitchFailureKind::ProcessKillFailed,
            SwitchError::StateSwapFailed(_) => SwitchFailureKind::StateSwapFailed,
            SwitchError::RelaunchFailed(_) => SwitchFailureKind::RelaunchFailed,
            SwitchError::Unsupported(_) => SwitchFailureKind::Unsupported,
        }
    }

    /// Status line shown to the user.
    pub fn status(&self) -> String {
        match self {
            SwitchError::Unsupported(_) => "Platform not supported".to_string(),
            other => format!("Error: {}", other),
        }
    }
}

impl From<ProfileError> for SwitchError {
    fn from(e: ProfileError) -> Self {
        match e {
            ProfileError::Process(e) => SwitchError::ProcessKillFailed(e),
            other => SwitchError::StateSwapFailed(other.to_string()),
        }
    }
}

/// A finished request: the status line plus any non-fatal warnings raised on the way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchOutcome {
    pub status: String,
    pub warnings: Vec<String>,
}

/// Whether launching as `account` first requires a switch.
pub fn needs_switch(platform: Platform, account: &str) -> bool {
    !platform.is_local() && !NO_SWITCH_SENTINELS.contains(&account)
}

/// Make `account_name` the most recent, auto-login-allowed user of `loginusers.vdf`.
///
/// Clears `MostRecent` on every record, then sets `MostRecent`, `Timestamp` and
/// `AllowAutoLogin` inside the target's block, adding them if missing. All other bytes
/// are left as they were.
pub fn activate_login_user(
    text: &str,
    account_name: &str,
    timestamp: u64,
) -> Result<String, SwitchError> {
    let doc = KeyValueDocument::parse(text)
        .map_err(|e| SwitchError::StateSwapFailed(e.to_string()))?;
    let id64 = find_login_user(&doc, account_name)
        .ok_or_else(|| SwitchError::LoginNotResolved(account_name.to_string()))?;

    let (text, cleared) = keyvalue::patch_all_fields(text, "MostRecent", "0");
    tracing::debug!("Cleared MostRecent on {} login record(s)", cleared);

    let patch = |text: &str, field: &str, value: &str| {
        keyvalue::patch_field(text, field, value, Some(id64.as_str()))
            .map_err(|e| SwitchError::StateSwapFailed(e.to_string()))
    };
    let text = patch(&text, "MostRecent", "1")?;
    let text = patch(&text, "Timestamp", &timestamp.to_string())?;
    patch(&text, "AllowAutoLogin", "1")
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Runs switch and launch requests against the host OS.
pub struct SwitchOrchestrator {
    ops: Arc<dyn PlatformOps>,
    coordinator: ProcessCoordinator,
    steam_root: Option<Utf8PathBuf>,
    profiles: HashMap<Platform, ProfileStore>,
    legendary_program: String,
    kill_poll_attempts: u32,
    kill_poll_interval: Duration,
    state: StateManager,
    metrics: Arc<Metrics>,
    locks: std::sync::Mutex<HashMap<Platform, Arc<Mutex<()>>>>,
}

impl SwitchOrchestrator {
    pub fn new(
        ops: Arc<dyn PlatformOps>,
        coordinator: ProcessCoordinator,
        state: StateManager,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            ops,
            coordinator,
            steam_root: None,
            profiles: HashMap::new(),
            legendary_program: "legendary".to_string(),
            kill_poll_attempts: 20,
            kill_poll_interval: Duration::from_millis(500),
            state,
            metrics,
            locks: std::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn with_steam_root(mut self, root: Option<Utf8PathBuf>) -> Self {
        self.steam_root = root;
        self
    }

    /// Register the snapshot store used to switch its platform.
    pub fn with_profile_store(mut self, store: ProfileStore) -> Self {
        self.profiles.insert(store.platform(), store);
        self
    }

    pub fn with_kill_polling(mut self, attempts: u32, interval: Duration) -> Self {
        self.kill_poll_attempts = attempts;
        self.kill_poll_interval = interval;
        self
    }

    pub fn with_legendary_program(mut self, program: impl Into<String>) -> Self {
        self.legendary_program = program.into();
        self
    }

    pub fn state(&self) -> &StateManager {
        &self.state
    }

    fn lock_for(&self, platform: Platform) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(platform).or_default())
    }

    /// Switch `platform` to `account`.
    pub async fn switch_to_account(
        &self,
        platform: Platform,
        account: &str,
    ) -> Result<SwitchOutcome, SwitchError> {
        let lock = self.lock_for(platform);
        let _guard = lock.lock().await;

        tracing::info!("Switching {} to \"{}\"", platform, account);
        let started = Instant::now();
        self.state.start_switch(platform, account);

        let mut warnings = Vec::new();
        let result = self.switch_steps(platform, account, &mut warnings).await;
        self.finish(platform, account, started, result, warnings)
    }

    /// Switch to `account` unless it is a "no switch" sentinel, then start the game.
    pub async fn launch_game(
        &self,
        platform: Platform,
        account: &str,
        game_id: &str,
        exe_path: Option<&str>,
    ) -> Result<SwitchOutcome, SwitchError> {
        let lock = self.lock_for(platform);
        let _guard = lock.lock().await;

        tracing::info!("Launching {} game {} as \"{}\"", platform, game_id, account);
        let started = Instant::now();
        self.state.start_switch(platform, account);

        let mut warnings = Vec::new();
        let result = self
            .launch_steps(platform, account, game_id, exe_path, &mut warnings)
            .await;
        self.finish(platform, account, started, result, warnings)
    }

    async fn switch_steps(
        &self,
        platform: Platform,
        account: &str,
        warnings: &mut Vec<String>,
    ) -> Result<String, SwitchError> {
        match platform {
            Platform::Steam => {
                let root = self.swap_steam_user(account, warnings).await?;
                self.relaunch(platform, &self.ops.steam_client(&root))?;
                Ok(format!("Switched to {}", account))
            }
            Platform::Epic | Platform::Riot | Platform::Legendary => {
                self.restore_profile(platform, account, warnings).await?;

                let client = match platform {
                    Platform::Epic => self.ops.epic_client(),
                    _ => None,
                };
                if let Some(request) = client {
                    self.relaunch(platform, &request)?;
                    return Ok(format!("Switched to {}", account));
                }

                Ok(match platform {
                    Platform::Epic => format!("Switched to {}. Please restart Epic Launcher.", account),
                    Platform::Riot => format!("Switched to {}. Please restart Riot Client.", account),
                    _ => format!("Switched to {}", account),
                })
            }
            Platform::Custom | Platform::Torrent => Err(SwitchError::Unsupported(platform)),
        }
    }

    async fn launch_steps(
        &self,
        platform: Platform,
        account: &str,
        game_id: &str,
        exe_path: Option<&str>,
        warnings: &mut Vec<String>,
    ) -> Result<String, SwitchError> {
        // Resolve the target first so an unsupported launch never kills anything.
        let (request, status) = self.game_request(platform, game_id, exe_path)?;

        if needs_switch(platform, account) {
            match platform {
                Platform::Steam => {
                    self.swap_steam_user(account, warnings).await?;
                }
                _ => self.restore_profile(platform, account, warnings).await?,
            }
        }

        self.relaunch(platform, &request)?;
        Ok(status.to_string())
    }

    fn game_request(
        &self,
        platform: Platform,
        game_id: &str,
        exe_path: Option<&str>,
    ) -> Result<(LaunchRequest, &'static str), SwitchError> {
        match platform {
            Platform::Steam => {
                let root = self.steam_root()?;
                Ok((self.ops.steam_game(&root, game_id), "Launched on Steam"))
            }
            Platform::Epic => Ok((
                LaunchRequest::Uri(format!(
                    "com.epicgames.launcher://apps/{}?action=launch&silent=true",
                    game_id
                )),
                "Launched on Epic",
            )),
            Platform::Legendary => Ok((
                LaunchRequest::executable(self.legendary_program.as_str(), &["launch", game_id]),
                "Launched via Legendary",
            )),
            Platform::Riot => self
                .ops
                .riot_product_launch(game_id)
                .map(|request| (request, "Launched on Riot"))
                .ok_or(SwitchError::Unsupported(platform)),
            Platform::Custom | Platform::Torrent => {
                let exe = exe_path
                    .filter(|p| !p.trim().is_empty())
                    .ok_or(SwitchError::Unsupported(platform))?;
                let cwd = Utf8Path::new(exe)
                    .parent()
                    .filter(|p| !p.as_str().is_empty())
                    .map(Utf8Path::to_path_buf);
                Ok((
                    LaunchRequest::Executable {
                        program: exe.to_string(),
                        args: Vec::new(),
                        cwd,
                    },
                    "Launched Game",
                ))
            }
        }
    }

    fn steam_root(&self) -> Result<Utf8PathBuf, SwitchError> {
        self.steam_root
            .clone()
            .ok_or(SwitchError::Unsupported(Platform::Steam))
    }

    fn read_login_users(path: &Utf8Path) -> Result<String, SwitchError> {
        fs::read_to_string(path)
            .map_err(|e| SwitchError::StateSwapFailed(format!("Failed to read {}: {}", path, e)))
    }

    /// Terminating + StateSwapped for Steam. Returns the Steam root for the relaunch.
    async fn swap_steam_user(
        &self,
        username: &str,
        warnings: &mut Vec<String>,
    ) -> Result<Utf8PathBuf, SwitchError> {
        if username.is_empty() || username == UNKNOWN_USERNAME {
            return Err(SwitchError::LoginNotResolved(username.to_string()));
        }
        let root = self.steam_root()?;
        let path = login_users_path(&root);

        // Fail before killing Steam if the account was never logged in here.
        let doc = KeyValueDocument::parse(&Self::read_login_users(&path)?)
            .map_err(|e| SwitchError::StateSwapFailed(e.to_string()))?;
        if find_login_user(&doc, username).is_none() {
            return Err(SwitchError::LoginNotResolved(username.to_string()));
        }

        // Kill before patching: Steam rewrites loginusers.vdf on exit and would undo the patch.
        self.state.advance(Platform::Steam, SwitchPhase::Terminating);
        let target = ProcessTarget::new(
            Platform::Steam,
            self.ops.process_names(Platform::Steam),
            self.kill_poll_attempts,
            self.kill_poll_interval,
        );
        self.stop_client(&target, warnings).await?;

        // Read again: the file on disk is whatever Steam wrote while exiting.
        let text = Self::read_login_users(&path)?;
        let patched = activate_login_user(&text, username, unix_now())?;
        fs::write(&path, patched).map_err(|e| {
            SwitchError::StateSwapFailed(format!("Failed to write {}: {}", path, e))
        })?;

        self.ops
            .write_steam_auto_login(&root, username)
            .map_err(|e| SwitchError::StateSwapFailed(format!("{:#}", e)))?;

        self.state.advance(Platform::Steam, SwitchPhase::StateSwapped);
        tracing::info!("Steam auto-login set to {}", username);
        Ok(root)
    }

    /// Terminating + StateSwapped for the snapshot clients.
    async fn restore_profile(
        &self,
        platform: Platform,
        name: &str,
        warnings: &mut Vec<String>,
    ) -> Result<(), SwitchError> {
        let store = self
            .profiles
            .get(&platform)
            .ok_or(SwitchError::Unsupported(platform))?;

        if store.process_target().is_some() {
            self.state.advance(platform, SwitchPhase::Terminating);
        }
        if store.restore_snapshot(name).await? == Some(StopOutcome::TimedOut) {
            self.kill_timed_out(platform, warnings);
        }

        self.state.advance(platform, SwitchPhase::StateSwapped);
        Ok(())
    }

    async fn stop_client(
        &self,
        target: &ProcessTarget,
        warnings: &mut Vec<String>,
    ) -> Result<(), SwitchError> {
        if target.process_names.is_empty() {
            return Ok(());
        }
        let outcome = self
            .coordinator
            .stop(target)
            .await
            .map_err(SwitchError::ProcessKillFailed)?;
        if outcome == StopOutcome::TimedOut {
            self.kill_timed_out(target.platform, warnings);
        }
        Ok(())
    }

    fn kill_timed_out(&self, platform: Platform, warnings: &mut Vec<String>) {
        let message = format!(
            "{} did not exit in time; its files may still be in use",
            platform.client_name()
        );
        tracing::warn!("{}", message);
        self.metrics.record_kill_timeout();
        self.state.add_warning(message.clone());
        warnings.push(message);
    }

    fn relaunch(&self, platform: Platform, request: &LaunchRequest) -> Result<(), SwitchError> {
        self.state.advance(platform, SwitchPhase::Relaunching);
        self.ops
            .launch(request)
            .map_err(SwitchError::RelaunchFailed)
    }

    fn finish(
        &self,
        platform: Platform,
        account: &str,
        started: Instant,
        result: Result<String, SwitchError>,
        warnings: Vec<String>,
    ) -> Result<SwitchOutcome, SwitchError> {
        self.metrics.record_switch_time(started.elapsed());

        match result {
            Ok(status) => {
                self.state.advance(platform, SwitchPhase::Done);
                self.metrics.record_switch_completed();
                self.state.finish_switch(platform, account, &status, true);
                tracing::info!("{}: {}", platform, status);
                Ok(SwitchOutcome { status, warnings })
            }
            Err(e) => {
                self.state.advance(platform, SwitchPhase::Failed(e.kind()));
                self.metrics.record_switch_failed();
                self.state.finish_switch(platform, account, &e.status(), false);
                tracing::error!("{} request aborted: {}", platform, e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::process::MockProcessTable;
    use crate::services::profile_store::AuthState;
    use crate::state::StateChange;
    use std::process::Command;
    use std::sync::atomic::Ordering;
    use tempfile::TempDir;

    const LOGIN_USERS: &str = "\"users\"\n{\n\t\"76561197960287930\"\n\t{\n\t\t\"AccountName\"\t\t\"alice\"\n\t\t\"MostRecent\"\t\t\"1\"\n\t\t\"Timestamp\"\t\t\"1700000000\"\n\t}\n\t\"76561197960287931\"\n\t{\n\t\t\"AccountName\"\t\t\"bob\"\n\t\t\"PersonaName\"\t\t\"Bob\"\n\t}\n}\n";

    /// Records launches instead of spawning anything.
    #[derive(Default)]
    struct RecordingOps {
        launched: std::sync::Mutex<Vec<LaunchRequest>>,
        auto_login: std::sync::Mutex<Option<String>>,
    }

    impl PlatformOps for RecordingOps {
        fn os_name(&self) -> &'static str {
            "test"
        }
        fn steam_root(&self) -> Option<Utf8PathBuf> {
            None
        }
        fn steam_client(&self, _root: &Utf8Path) -> LaunchRequest {
            LaunchRequest::Uri("steam://open/main".into())
        }
        fn write_steam_auto_login(&self, _root: &Utf8Path, username: &str) -> anyhow::Result<()> {
            *self.auto_login.lock().unwrap() = Some(username.to_string());
            Ok(())
        }
        fn epic_auth_dir(&self) -> Option<Utf8PathBuf> {
            None
        }
        fn epic_manifest_dir(&self) -> Option<Utf8PathBuf> {
            None
        }
        fn epic_client(&self) -> Option<LaunchRequest> {
            None
        }
        fn riot_settings_file(&self) -> Option<Utf8PathBuf> {
            None
        }
        fn riot_installs_file(&self) -> Option<Utf8PathBuf> {
            None
        }
        fn riot_product_launch(&self, _product_id: &str) -> Option<LaunchRequest> {
            None
        }
        fn process_names(&self, platform: Platform) -> Vec<String> {
            match platform {
                Platform::Steam => vec!["steam".to_string()],
                _ => Vec::new(),
            }
        }
        fn open_command(&self, uri: &str) -> Command {
            Command::new(uri)
        }
        fn launch(&self, request: &LaunchRequest) -> Result<(), ProcessError> {
            self.launched.lock().unwrap().push(request.clone());
            Ok(())
        }
    }

    fn idle_coordinator() -> ProcessCoordinator {
        let mut table = MockProcessTable::new();
        table.expect_kill_matching().returning(|_| 0);
        table.expect_any_running().returning(|_| false);
        ProcessCoordinator::new(Arc::new(table))
    }

    fn orchestrator(ops: Arc<RecordingOps>) -> SwitchOrchestrator {
        SwitchOrchestrator::new(
            ops,
            idle_coordinator(),
            StateManager::new(),
            Arc::new(Metrics::new()),
        )
        .with_kill_polling(1, Duration::from_millis(1))
    }

    fn steam_root(dir: &TempDir) -> Utf8PathBuf {
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        fs::create_dir_all(root.join("config")).unwrap();
        fs::write(login_users_path(&root), LOGIN_USERS).unwrap();
        root
    }

    #[test]
    fn test_activate_login_user() {
        let patched = activate_login_user(LOGIN_USERS, "bob", 1_800_000_000).unwrap();
        let doc = KeyValueDocument::parse(&patched).unwrap();

        assert_eq!(doc.lookup("users.76561197960287930.MostRecent").unwrap(), "0");
        assert_eq!(doc.lookup("users.76561197960287931.MostRecent").unwrap(), "1");
        assert_eq!(
            doc.lookup("users.76561197960287931.Timestamp").unwrap(),
            "1800000000"
        );
        assert_eq!(
            doc.lookup("users.76561197960287931.AllowAutoLogin").unwrap(),
            "1"
        );
        // Alice's timestamp is untouched
        assert_eq!(
            doc.lookup("users.76561197960287930.Timestamp").unwrap(),
            "1700000000"
        );
    }

    #[test]
    fn test_activate_unknown_user() {
        assert!(matches!(
            activate_login_user(LOGIN_USERS, "carol", 1),
            Err(SwitchError::LoginNotResolved(_))
        ));
    }

    #[test]
    fn test_needs_switch() {
        assert!(needs_switch(Platform::Epic, "work"));
        assert!(!needs_switch(Platform::Epic, "Main Profile"));
        assert!(!needs_switch(Platform::Legendary, "Active Account"));
        assert!(!needs_switch(Platform::Riot, ""));
        assert!(!needs_switch(Platform::Custom, "anyone"));
    }

    #[test]
    fn test_error_status_lines() {
        assert_eq!(
            SwitchError::LoginNotResolved("UNKNOWN".into()).status(),
            "Error: Login not found."
        );
        assert_eq!(
            SwitchError::Unsupported(Platform::Custom).status(),
            "Platform not supported"
        );
        assert_eq!(
            SwitchError::from(ProfileError::NotFound("x".into())).kind(),
            SwitchFailureKind::StateSwapFailed
        );
    }

    #[tokio::test]
    async fn test_steam_switch_patches_and_relaunches() {
        let dir = TempDir::new().unwrap();
        let root = steam_root(&dir);
        let ops = Arc::new(RecordingOps::default());
        let orchestrator = orchestrator(ops.clone()).with_steam_root(Some(root.clone()));
        let mut rx = orchestrator.state().subscribe();

        let outcome = orchestrator
            .switch_to_account(Platform::Steam, "bob")
            .await
            .unwrap();
        assert_eq!(outcome.status, "Switched to bob");
        assert!(outcome.warnings.is_empty());

        let doc = keyvalue::read_document(&login_users_path(&root)).unwrap();
        assert_eq!(doc.lookup("users.76561197960287931.MostRecent").unwrap(), "1");
        assert_eq!(ops.auto_login.lock().unwrap().as_deref(), Some("bob"));
        assert_eq!(
            ops.launched.lock().unwrap().as_slice(),
            &[LaunchRequest::Uri("steam://open/main".into())]
        );

        let mut phases = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let StateChange::PhaseChanged { phase, .. } = event {
                phases.push(phase);
            }
        }
        assert_eq!(
            phases,
            vec![
                SwitchPhase::Terminating,
                SwitchPhase::StateSwapped,
                SwitchPhase::Relaunching,
                SwitchPhase::Done
            ]
        );
    }

    #[tokio::test]
    async fn test_steam_exit_rewrite_does_not_undo_patch() {
        let dir = TempDir::new().unwrap();
        let root = steam_root(&dir);
        let path = login_users_path(&root);

        // Steam writes its own view of loginusers.vdf while shutting down
        let mut table = MockProcessTable::new();
        let on_exit = path.clone();
        table.expect_kill_matching().times(1).returning(move |_| {
            fs::write(&on_exit, LOGIN_USERS).unwrap();
            1
        });
        table.expect_any_running().returning(|_| false);

        let ops = Arc::new(RecordingOps::default());
        let orchestrator = SwitchOrchestrator::new(
            ops,
            ProcessCoordinator::new(Arc::new(table)),
            StateManager::new(),
            Arc::new(Metrics::new()),
        )
        .with_steam_root(Some(root));

        orchestrator
            .switch_to_account(Platform::Steam, "bob")
            .await
            .unwrap();

        let doc = keyvalue::read_document(&path).unwrap();
        assert_eq!(doc.lookup("users.76561197960287930.MostRecent").unwrap(), "0");
        assert_eq!(doc.lookup("users.76561197960287931.MostRecent").unwrap(), "1");
    }

    #[tokio::test]
    async fn test_unknown_login_fails_without_killing() {
        let dir = TempDir::new().unwrap();
        let root = steam_root(&dir);
        let ops = Arc::new(RecordingOps::default());

        let mut table = MockProcessTable::new();
        table.expect_kill_matching().times(0);
        table.expect_any_running().times(0);
        let metrics = Arc::new(Metrics::new());
        let orchestrator = SwitchOrchestrator::new(
            ops.clone(),
            ProcessCoordinator::new(Arc::new(table)),
            StateManager::new(),
            Arc::clone(&metrics),
        )
        .with_steam_root(Some(root));

        let err = orchestrator
            .switch_to_account(Platform::Steam, UNKNOWN_USERNAME)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), SwitchFailureKind::LoginNotResolved);

        let err = orchestrator
            .switch_to_account(Platform::Steam, "carol")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), SwitchFailureKind::LoginNotResolved);

        assert!(ops.launched.lock().unwrap().is_empty());
        assert_eq!(metrics.switches_failed.load(Ordering::Relaxed), 2);
        assert_eq!(
            orchestrator.state().read(|s| s.phase(Platform::Steam)),
            SwitchPhase::Failed(SwitchFailureKind::LoginNotResolved)
        );
    }

    #[tokio::test]
    async fn test_kill_timeout_is_a_warning() {
        let dir = TempDir::new().unwrap();
        let root = steam_root(&dir);
        let ops = Arc::new(RecordingOps::default());

        let mut table = MockProcessTable::new();
        table.expect_kill_matching().returning(|_| 1);
        table.expect_any_running().times(2).returning(|_| true);
        let metrics = Arc::new(Metrics::new());
        let orchestrator = SwitchOrchestrator::new(
            ops,
            ProcessCoordinator::new(Arc::new(table)),
            StateManager::new(),
            Arc::clone(&metrics),
        )
        .with_steam_root(Some(root))
        .with_kill_polling(2, Duration::from_millis(1));

        let outcome = orchestrator
            .switch_to_account(Platform::Steam, "alice")
            .await
            .unwrap();
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(metrics.kill_timeouts.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_snapshot_switch_without_client_asks_for_restart() {
        let dir = TempDir::new().unwrap();
        let base = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let live = base.join("RiotClientPrivateSettings.yaml");
        fs::write(&live, "token: work").unwrap();

        let store = ProfileStore::new(
            Platform::Riot,
            AuthState::File(live.clone()),
            base.join("riot_accounts"),
            None,
            idle_coordinator(),
        );
        store.save_snapshot("work").unwrap();
        fs::write(&live, "token: home").unwrap();

        let ops = Arc::new(RecordingOps::default());
        let orchestrator = orchestrator(ops.clone()).with_profile_store(store);

        let outcome = orchestrator
            .switch_to_account(Platform::Riot, "work")
            .await
            .unwrap();
        assert_eq!(outcome.status, "Switched to work. Please restart Riot Client.");
        assert_eq!(fs::read_to_string(&live).unwrap(), "token: work");
        assert!(ops.launched.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_snapshot_is_state_swap_failure() {
        let dir = TempDir::new().unwrap();
        let base = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let store = ProfileStore::new(
            Platform::Legendary,
            AuthState::File(base.join("user.json")),
            base.join("legendary_accounts"),
            None,
            idle_coordinator(),
        );
        let orchestrator =
            orchestrator(Arc::new(RecordingOps::default())).with_profile_store(store);

        let err = orchestrator
            .switch_to_account(Platform::Legendary, "ghost")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), SwitchFailureKind::StateSwapFailed);
        assert_eq!(err.status(), "Error: Snapshot not found: ghost");
    }

    #[tokio::test]
    async fn test_launch_with_sentinel_skips_switch() {
        let ops = Arc::new(RecordingOps::default());
        let orchestrator = orchestrator(ops.clone());

        let outcome = orchestrator
            .launch_game(Platform::Epic, "Main Profile", "Fortnite", None)
            .await
            .unwrap();
        assert_eq!(outcome.status, "Launched on Epic");

        let outcome = orchestrator
            .launch_game(Platform::Legendary, "Active Account", "Sugar", None)
            .await
            .unwrap();
        assert_eq!(outcome.status, "Launched via Legendary");

        let launched = ops.launched.lock().unwrap();
        assert_eq!(
            launched[0],
            LaunchRequest::Uri(
                "com.epicgames.launcher://apps/Fortnite?action=launch&silent=true".into()
            )
        );
        assert_eq!(launched[1].describe(), "legendary launch Sugar");
    }

    #[tokio::test]
    async fn test_launch_custom_game() {
        let ops = Arc::new(RecordingOps::default());
        let orchestrator = orchestrator(ops.clone());

        let outcome = orchestrator
            .launch_game(Platform::Custom, "", "custom_1", Some("/games/doom/doom"))
            .await
            .unwrap();
        assert_eq!(outcome.status, "Launched Game");
        assert_eq!(
            ops.launched.lock().unwrap()[0],
            LaunchRequest::Executable {
                program: "/games/doom/doom".into(),
                args: Vec::new(),
                cwd: Some(Utf8PathBuf::from("/games/doom")),
            }
        );

        let err = orchestrator
            .launch_game(Platform::Torrent, "", "torrent_1", None)
            .await
            .unwrap_err();
        assert_eq!(err.status(), "Platform not supported");
    }

    #[tokio::test]
    async fn test_switch_local_platform_unsupported() {
        let orchestrator = orchestrator(Arc::new(RecordingOps::default()));
        let err = orchestrator
            .switch_to_account(Platform::Custom, "x")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), SwitchFailureKind::Unsupported);
    }

    #[tokio::test]
    async fn test_same_platform_requests_are_serialized() {
        let orchestrator = Arc::new(orchestrator(Arc::new(RecordingOps::default())));
        let lock = orchestrator.lock_for(Platform::Epic);
        let guard = lock.lock().await;

        let running = Arc::clone(&orchestrator);
        let task = tokio::spawn(async move {
            running
                .launch_game(Platform::Epic, "", "Fortnite", None)
                .await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!task.is_finished());
        // Another platform is not blocked
        assert!(orchestrator
            .launch_game(Platform::Legendary, "", "Sugar", None)
            .await
            .is_ok());

        drop(guard);
        assert!(task.await.unwrap().is_ok());
    }
}

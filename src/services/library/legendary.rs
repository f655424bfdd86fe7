use super::epic::EPIC_ICON;
use super::{GameScanner, snapshot_accounts};
use crate::models::{AccountProfile, GameRecord, OwnerRef, Platform};
use crate::services::platform_ops::{LaunchRequest, PlatformOps};
use crate::services::process::ProcessError;
use crate::services::profile_store::ProfileStore;
use serde::Deserialize;
use std::io::{self, ErrorKind};
use std::process::Command;
use std::sync::Arc;
use thiserror::Error;

/// Synthetic owner attached to Legendary games: whoever is logged in to the CLI.
pub const ACTIVE_ACCOUNT_ID: &str = "legendary_active";
pub const ACTIVE_ACCOUNT_NAME: &str = "Active Account";

/// What `legendary status` reports when nobody is logged in.
const NOT_LOGGED_IN: &str = "<not logged in>";

#[derive(Error, Debug)]
pub enum LegendaryError {
    #[error("{0} not found. Install Legendary and make sure it is on PATH.")]
    NotInstalled(String),

    #[error("Session ID is empty")]
    EmptySid,

    #[error("{command} exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("Failed to run {command}: {source}")]
    Io {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("Unexpected output from {command}: {source}")]
    Parse {
        command: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Launch(ProcessError),
}

/// Output of a finished CLI call.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CliOutput {
    pub success: bool,
    pub status: String,
    pub stdout: String,
    pub stderr: String,
}

/// Runs a program to completion and captures its output.
#[cfg_attr(test, mockall::automock)]
pub trait CliRunner: Send + Sync {
    fn output(&self, program: &str, args: &[String]) -> io::Result<CliOutput>;
}

/// [`CliRunner`] backed by `std::process::Command`.
pub struct SystemCliRunner;

impl CliRunner for SystemCliRunner {
    fn output(&self, program: &str, args: &[String]) -> io::Result<CliOutput> {
        let output = Command::new(program).args(args).output()?;
        Ok(CliOutput {
            success: output.status.success(),
            status: output.status.to_string(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct LegendaryStatus {
    #[serde(default)]
    account: String,
}

/// The `legendary` CLI: login management, installs and the game list.
///
/// Captured calls go through a [`CliRunner`]; anything interactive or long-running is
/// started detached through [`PlatformOps::launch`].
#[derive(Clone)]
pub struct LegendaryClient {
    program: String,
    ops: Arc<dyn PlatformOps>,
    runner: Arc<dyn CliRunner>,
}

impl LegendaryClient {
    pub fn new(program: impl Into<String>, ops: Arc<dyn PlatformOps>) -> Self {
        Self {
            program: program.into(),
            ops,
            runner: Arc::new(SystemCliRunner),
        }
    }

    pub fn with_runner(mut self, runner: Arc<dyn CliRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn run(&self, args: &[&str]) -> Result<String, LegendaryError> {
        let command = format!("{} {}", self.program, args.join(" "));
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();

        let output = match self.runner.output(&self.program, &args) {
            Ok(output) => output,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(LegendaryError::NotInstalled(self.program.clone()));
            }
            Err(source) => return Err(LegendaryError::Io { command, source }),
        };

        if !output.success {
            return Err(LegendaryError::CommandFailed {
                command,
                status: output.status,
                stderr: output.stderr,
            });
        }
        Ok(output.stdout)
    }

    fn spawn(&self, request: &LaunchRequest) -> Result<(), LegendaryError> {
        self.ops.launch(request).map_err(|e| match e {
            ProcessError::LaunchFailed { ref source, .. } if source.kind() == ErrorKind::NotFound => {
                LegendaryError::NotInstalled(request.describe())
            }
            other => LegendaryError::Launch(other),
        })
    }

    /// `legendary list-games --json`.
    pub fn list_games_json(&self) -> Result<String, LegendaryError> {
        self.run(&["list-games", "--json"])
    }

    /// Open a terminal running `legendary auth` so the user can log in interactively.
    pub fn open_login_terminal(&self) -> Result<(), LegendaryError> {
        let request = self
            .ops
            .terminal_command(&format!("{} auth", self.program));
        self.spawn(&request)?;
        tracing::info!("Opened terminal for {} auth", self.program);
        Ok(())
    }

    /// Log in with an Epic session id copied from the browser.
    pub fn auth(&self, sid: &str) -> Result<(), LegendaryError> {
        let sid = sid.trim();
        if sid.is_empty() {
            return Err(LegendaryError::EmptySid);
        }
        self.run(&["auth", "--sid", sid])?;
        tracing::info!("Legendary login completed");
        Ok(())
    }

    /// Name of the logged-in account, or `None` when logged out.
    pub fn status(&self) -> Result<Option<String>, LegendaryError> {
        let stdout = self.run(&["status", "--json", "--offline"])?;
        let status: LegendaryStatus =
            serde_json::from_str(&stdout).map_err(|source| LegendaryError::Parse {
                command: format!("{} status", self.program),
                source,
            })?;

        let account = status.account.trim();
        Ok((!account.is_empty() && account != NOT_LOGGED_IN).then(|| account.to_string()))
    }

    /// Start installing `app_name` in the background.
    pub fn install(&self, app_name: &str) -> Result<(), LegendaryError> {
        let request =
            LaunchRequest::executable(self.program.as_str(), &["install", app_name, "--yes"]);
        self.spawn(&request)?;
        tracing::info!("Started Legendary install of {}", app_name);
        Ok(())
    }

    /// Forget the stored login (`legendary auth --delete`).
    pub fn logout(&self) -> Result<(), LegendaryError> {
        self.run(&["auth", "--delete"])?;
        tracing::info!("Logged out of Legendary");
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct LegendaryGame {
    app_name: String,
    #[serde(default)]
    app_title: String,
    #[serde(default)]
    is_installed: bool,
    #[serde(default)]
    install_path: Option<String>,
}

/// Map `legendary list-games --json` output to records.
pub fn parse_game_list(json: &str) -> Result<Vec<GameRecord>, serde_json::Error> {
    let games: Vec<LegendaryGame> = serde_json::from_str(json)?;

    Ok(games
        .into_iter()
        .filter(|g| !g.app_name.is_empty())
        .map(|g| {
            let mut game = GameRecord::new(Platform::Legendary, g.app_name, g.app_title);
            game.installed = g.is_installed;
            game.install_path = g.install_path.filter(|p| !p.is_empty());
            game.icon_ref = EPIC_ICON.to_string();
            game.add_owner(OwnerRef::new(
                ACTIVE_ACCOUNT_ID,
                ACTIVE_ACCOUNT_NAME,
                "Legendary User",
            ));
            game
        })
        .collect())
}

/// Games from the Legendary CLI, accounts from saved `user.json` snapshots.
pub struct LegendaryScanner {
    client: LegendaryClient,
    profiles: Option<ProfileStore>,
}

impl LegendaryScanner {
    pub fn new(client: LegendaryClient, profiles: Option<ProfileStore>) -> Self {
        Self { client, profiles }
    }
}

impl GameScanner for LegendaryScanner {
    fn platform(&self) -> Platform {
        Platform::Legendary
    }

    fn scan_games(&self) -> Vec<GameRecord> {
        let json = match self.client.list_games_json() {
            Ok(json) => json,
            Err(LegendaryError::NotInstalled(program)) => {
                tracing::debug!("{} not on PATH, skipping", program);
                return Vec::new();
            }
            Err(e) => {
                tracing::warn!("Skipping Legendary library: {}", e);
                return Vec::new();
            }
        };

        parse_game_list(&json).unwrap_or_else(|e| {
            tracing::warn!("Skipping Legendary library: unparsable game list: {}", e);
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

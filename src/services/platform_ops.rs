//! Host-OS capabilities: where each client keeps its files, which processes it runs, how
//! to relaunch it and how Steam stores its auto-login user.
//!
//! One implementation exists per supported OS. [`detect`] picks the right one once at
//! startup and the result is passed down as `Arc<dyn PlatformOps>`.

use super::keyvalue;
use super::process::ProcessError;
use crate::models::Platform;
use anyhow::{Context, Result, bail};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::process::{Command, Stdio};
use std::sync::Arc;

/// Something to start: a URI handed to the OS opener, or an executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchRequest {
    Uri(String),
    Executable {
        program: String,
        args: Vec<String>,
        cwd: Option<Utf8PathBuf>,
    },
}

impl LaunchRequest {
    pub fn executable(program: impl Into<String>, args: &[&str]) -> Self {
        LaunchRequest::Executable {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
            cwd: None,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            LaunchRequest::Uri(uri) => uri.clone(),
            LaunchRequest::Executable { program, args, .. } if args.is_empty() => program.clone(),
            LaunchRequest::Executable { program, args, .. } => {
                format!("{} {}", program, args.join(" "))
            }
        }
    }
}

/// OS-specific behaviour needed by scanners, the profile store and the orchestrator.
pub trait PlatformOps: Send + Sync {
    fn os_name(&self) -> &'static str;

    /// Default Steam install root, if Steam appears to be installed.
    fn steam_root(&self) -> Option<Utf8PathBuf>;

    /// How to start the Steam client after a switch.
    fn steam_client(&self, root: &Utf8Path) -> LaunchRequest;

    /// How to start a Steam game through the client.
    fn steam_game(&self, _root: &Utf8Path, app_id: &str) -> LaunchRequest {
        LaunchRequest::Uri(format!("steam://run/{}", app_id))
    }

    /// Persist `username` as Steam's auto-login user.
    fn write_steam_auto_login(&self, root: &Utf8Path, username: &str) -> Result<()>;

    fn epic_auth_dir(&self) -> Option<Utf8PathBuf>;

    fn epic_manifest_dir(&self) -> Option<Utf8PathBuf>;

    /// How to start the Epic launcher after a switch, if it can be started directly.
    fn epic_client(&self) -> Option<LaunchRequest>;

    fn riot_settings_file(&self) -> Option<Utf8PathBuf>;

    fn riot_installs_file(&self) -> Option<Utf8PathBuf>;

    /// Launch a Riot product through the Riot client.
    fn riot_product_launch(&self, product_id: &str) -> Option<LaunchRequest>;

    /// Legendary's config directory (holds `user.json`).
    fn legendary_config_dir(&self) -> Option<Utf8PathBuf> {
        std::env::var("LEGENDARY_CONFIG_PATH")
            .ok()
            .map(Utf8PathBuf::from)
            .or_else(|| utf8(dirs::config_dir()?).map(|d| d.join("legendary")))
    }

    /// Process names to kill before touching `platform`'s files.
    fn process_names(&self, platform: Platform) -> Vec<String>;

    /// Command that hands `uri` to the OS.
    fn open_command(&self, uri: &str) -> Command;

    /// Open a terminal window running `command_line`, for interactive CLI logins.
    fn terminal_command(&self, command_line: &str) -> LaunchRequest {
        LaunchRequest::executable("x-terminal-emulator", &["-e", command_line])
    }

    /// Start `request` detached. Does not wait for the child.
    fn launch(&self, request: &LaunchRequest) -> Result<(), ProcessError> {
        let mut command = match request {
            LaunchRequest::Uri(uri) => self.open_command(uri),
            LaunchRequest::Executable { program, args, cwd } => {
                let mut command = Command::new(program);
                command.args(args);
                if let Some(cwd) = cwd {
                    command.current_dir(cwd);
                }
                command
            }
        };

        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map(|_| tracing::info!("Launched {}", request.describe()))
            .map_err(|source| ProcessError::LaunchFailed {
                target: request.describe(),
                source,
            })
    }
}

/// Pick the implementation for the running OS.
pub fn detect() -> Arc<dyn PlatformOps> {
    match std::env::consts::OS {
        "windows" => Arc::new(WindowsOps::from_env()),
        "macos" => Arc::new(MacOps::from_env()),
        _ => Arc::new(LinuxOps::from_env()),
    }
}

fn utf8(path: std::path::PathBuf) -> Option<Utf8PathBuf> {
    Utf8PathBuf::from_path_buf(path).ok()
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Point Steam's text registry at `username` (macOS and Linux).
///
/// Only `AutoLoginUser` and `RememberPassword` inside the `"Steam"` block change.
pub fn patch_registry_vdf(path: &Utf8Path, username: &str) -> Result<()> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Steam registry not found: {}", path))?;

    let text = keyvalue::patch_field(&text, "AutoLoginUser", username, Some("Steam"))
        .with_context(|| format!("No Steam block in {}", path))?;
    let text = keyvalue::patch_field(&text, "RememberPassword", "1", Some("Steam"))
        .with_context(|| format!("No Steam block in {}", path))?;

    fs::write(path, text).with_context(|| format!("Failed to write {}", path))?;
    tracing::debug!("Set AutoLoginUser={} in {}", username, path);
    Ok(())
}

/// Windows: registry for Steam, `%LOCALAPPDATA%` / `%PROGRAMDATA%` for the rest.
#[derive(Debug, Clone)]
pub struct WindowsOps {
    local_app_data: Option<Utf8PathBuf>,
    program_data: Utf8PathBuf,
}

impl WindowsOps {
    pub fn new(local_app_data: Option<Utf8PathBuf>, program_data: Utf8PathBuf) -> Self {
        Self {
            local_app_data,
            program_data,
        }
    }

    pub fn from_env() -> Self {
        let program_data = std::env::var("PROGRAMDATA")
            .map(Utf8PathBuf::from)
            .unwrap_or_else(|_| Utf8PathBuf::from(r"C:\ProgramData"));
        Self::new(dirs::data_local_dir().and_then(utf8), program_data)
    }

    fn reg_add(value: &str, kind: &str, data: &str) -> Result<()> {
        let status = Command::new("reg")
            .args([
                "add",
                r"HKCU\Software\Valve\Steam",
                "/v",
                value,
                "/t",
                kind,
                "/d",
                data,
                "/f",
            ])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .context("Failed to run reg.exe")?;

        if !status.success() {
            bail!("reg add {} exited with {}", value, status);
        }
        Ok(())
    }

    /// `SteamPath` from `HKCU\Software\Valve\Steam`.
    fn registry_steam_path() -> Option<Utf8PathBuf> {
        let output = Command::new("reg")
            .args(["query", r"HKCU\Software\Valve\Steam", "/v", "SteamPath"])
            .output()
            .ok()?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_reg_query_value(&stdout, "SteamPath").map(Utf8PathBuf::from)
    }
}

/// Value column of a `reg query` line such as `    SteamPath    REG_SZ    c:/program files (x86)/steam`.
fn parse_reg_query_value(output: &str, value: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let line = line.trim();
        let rest = line.strip_prefix(value)?.trim_start();
        let (_kind, data) = rest.split_once(char::is_whitespace)?;
        let data = data.trim();
        (!data.is_empty()).then(|| data.to_string())
    })
}

impl PlatformOps for WindowsOps {
    fn os_name(&self) -> &'static str {
        "windows"
    }

    fn steam_root(&self) -> Option<Utf8PathBuf> {
        Self::registry_steam_path()
            .or_else(|| Some(Utf8PathBuf::from(r"C:\Program Files (x86)\Steam")))
            .filter(|p| p.exists())
    }

    fn steam_client(&self, root: &Utf8Path) -> LaunchRequest {
        LaunchRequest::Executable {
            program: root.join("steam.exe").into_string(),
            args: Vec::new(),
            cwd: Some(root.to_path_buf()),
        }
    }

    fn steam_game(&self, root: &Utf8Path, app_id: &str) -> LaunchRequest {
        LaunchRequest::Executable {
            program: root.join("steam.exe").into_string(),
            args: vec!["-applaunch".to_string(), app_id.to_string()],
            cwd: Some(root.to_path_buf()),
        }
    }

    fn write_steam_auto_login(&self, _root: &Utf8Path, username: &str) -> Result<()> {
        Self::reg_add("AutoLoginUser", "REG_SZ", username)?;
        Self::reg_add("RememberPassword", "REG_DWORD", "1")?;
        tracing::debug!("Set registry AutoLoginUser={}", username);
        Ok(())
    }

    fn epic_auth_dir(&self) -> Option<Utf8PathBuf> {
        self.local_app_data
            .as_ref()
            .map(|d| d.join("EpicGamesLauncher").join("Saved").join("Data"))
    }

    fn epic_manifest_dir(&self) -> Option<Utf8PathBuf> {
        Some(
            self.program_data
                .join("Epic")
                .join("EpicGamesLauncher")
                .join("Data")
                .join("Manifests"),
        )
    }

    fn epic_client(&self) -> Option<LaunchRequest> {
        None
    }

    fn riot_settings_file(&self) -> Option<Utf8PathBuf> {
        self.local_app_data.as_ref().map(|d| {
            d.join("Riot Games")
                .join("Riot Client")
                .join("Data")
                .join("RiotClientPrivateSettings.yaml")
        })
    }

    fn riot_installs_file(&self) -> Option<Utf8PathBuf> {
        Some(self.program_data.join("Riot Games").join("RiotClientInstalls.json"))
    }

    fn riot_product_launch(&self, product_id: &str) -> Option<LaunchRequest> {
        let client = Utf8PathBuf::from(r"C:\Riot Games\Riot Client\RiotClientServices.exe");
        client.exists().then(|| {
            LaunchRequest::executable(
                client.as_str(),
                &[
                    &format!("--launch-product={}", product_id),
                    "--launch-patchline=live",
                ],
            )
        })
    }

    fn process_names(&self, platform: Platform) -> Vec<String> {
        match platform {
            Platform::Steam => names(&["steam.exe", "steamwebhelper.exe", "GameOverlayUI.exe"]),
            Platform::Epic => names(&["EpicGamesLauncher.exe", "EpicWebHelper.exe"]),
            Platform::Riot => names(&[
                "RiotClientServices.exe",
                "RiotClientUx.exe",
                "LeagueClient.exe",
                "VALORANT.exe",
            ]),
            Platform::Legendary | Platform::Custom | Platform::Torrent => Vec::new(),
        }
    }

    fn open_command(&self, uri: &str) -> Command {
        let mut command = Command::new("cmd");
        command.args(["/C", "start", "", uri]);
        command
    }

    fn terminal_command(&self, command_line: &str) -> LaunchRequest {
        LaunchRequest::executable("cmd", &["/C", "start", "cmd", "/K", command_line])
    }
}

/// macOS: everything lives under `~/Library/Application Support`.
#[derive(Debug, Clone)]
pub struct MacOps {
    home: Option<Utf8PathBuf>,
}

impl MacOps {
    pub fn new(home: Option<Utf8PathBuf>) -> Self {
        Self { home }
    }

    pub fn from_env() -> Self {
        Self::new(dirs::home_dir().and_then(utf8))
    }

    fn app_support(&self) -> Option<Utf8PathBuf> {
        self.home
            .as_ref()
            .map(|h| h.join("Library").join("Application Support"))
    }
}

impl PlatformOps for MacOps {
    fn os_name(&self) -> &'static str {
        "macos"
    }

    fn steam_root(&self) -> Option<Utf8PathBuf> {
        self.app_support()
            .map(|d| d.join("Steam"))
            .filter(|p| p.exists())
    }

    fn steam_client(&self, _root: &Utf8Path) -> LaunchRequest {
        LaunchRequest::Uri("steam://open/main".to_string())
    }

    fn write_steam_auto_login(&self, root: &Utf8Path, username: &str) -> Result<()> {
        patch_registry_vdf(&root.join("registry.vdf"), username)
    }

    fn epic_auth_dir(&self) -> Option<Utf8PathBuf> {
        self.app_support()
            .map(|d| d.join("Epic").join("EpicGamesLauncher").join("Data"))
    }

    fn epic_manifest_dir(&self) -> Option<Utf8PathBuf> {
        self.epic_auth_dir().map(|d| d.join("Manifests"))
    }

    fn epic_client(&self) -> Option<LaunchRequest> {
        Some(LaunchRequest::executable(
            "open",
            &["/Applications/Epic Games Launcher.app"],
        ))
    }

    fn riot_settings_file(&self) -> Option<Utf8PathBuf> {
        self.app_support().map(|d| {
            d.join("Riot Games")
                .join("Riot Client")
                .join("Data")
                .join("RiotClientPrivateSettings.yaml")
        })
    }

    fn riot_installs_file(&self) -> Option<Utf8PathBuf> {
        Some(Utf8PathBuf::from("/Users/Shared/Riot Games/RiotClientInstalls.json"))
    }

    fn riot_product_launch(&self, product_id: &str) -> Option<LaunchRequest> {
        let app = Utf8Path::new("/Applications/Riot Games/Riot Client.app");
        app.exists().then(|| {
            LaunchRequest::executable(
                "open",
                &[
                    "-a",
                    app.as_str(),
                    "--args",
                    &format!("--launch-product={}", product_id),
                    "--launch-patchline=live",
                ],
            )
        })
    }

    fn process_names(&self, platform: Platform) -> Vec<String> {
        match platform {
            Platform::Steam => names(&["steam_osx", "steamwebhelper"]),
            Platform::Epic => names(&[
                "EpicGamesLauncher",
                "EpicGamesLauncher-Mac-Shipping",
                "EpicWebHelper",
            ]),
            Platform::Riot => names(&[
                "RiotClientServices",
                "RiotClientUx",
                "LeagueClient",
                "VALORANT",
            ]),
            Platform::Legendary | Platform::Custom | Platform::Torrent => Vec::new(),
        }
    }

    fn open_command(&self, uri: &str) -> Command {
        let mut command = Command::new("open");
        command.arg(uri);
        command
    }

    fn terminal_command(&self, command_line: &str) -> LaunchRequest {
        let script = format!(
            r#"tell application "Terminal" to do script "{}""#,
            command_line.replace('\\', "\\\\").replace('"', "\\\"")
        );
        LaunchRequest::executable("osascript", &["-e", script.as_str()])
    }
}

/// Linux: native Steam only. Epic and Riot have no native client.
#[derive(Debug, Clone)]
pub struct LinuxOps {
    home: Option<Utf8PathBuf>,
}

impl LinuxOps {
    pub fn new(home: Option<Utf8PathBuf>) -> Self {
        Self { home }
    }

    pub fn from_env() -> Self {
        Self::new(dirs::home_dir().and_then(utf8))
    }
}

impl PlatformOps for LinuxOps {
    fn os_name(&self) -> &'static str {
        "linux"
    }

    fn steam_root(&self) -> Option<Utf8PathBuf> {
        let home = self.home.as_ref()?;
        [
            home.join(".steam").join("steam"),
            home.join(".local").join("share").join("Steam"),
            home.join(".var/app/com.valvesoftware.Steam/.local/share/Steam"),
        ]
        .into_iter()
        .find(|p| p.join("steamapps").exists())
    }

    fn steam_client(&self, _root: &Utf8Path) -> LaunchRequest {
        LaunchRequest::executable("steam", &[])
    }

    fn write_steam_auto_login(&self, root: &Utf8Path, username: &str) -> Result<()> {
        // Native installs keep registry.vdf one level up in ~/.steam.
        let candidates = [
            self.home.as_ref().map(|h| h.join(".steam").join("registry.vdf")),
            Some(root.join("registry.vdf")),
        ];
        match candidates.into_iter().flatten().find(|p| p.exists()) {
            Some(path) => patch_registry_vdf(&path, username),
            None => bail!("Steam registry.vdf not found"),
        }
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
            Platform::Steam => names(&["steam", "steamwebhelper"]),
            _ => Vec::new(),
        }
    }

    fn open_command(&self, uri: &str) -> Command {
        let mut command = Command::new("xdg-open");
        command.arg(uri);
        command
    }
}

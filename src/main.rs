//! swch - multi-account switcher and unified game library
//!
//! Main entry point for the command-line interface.
//!
//! # Overview
//!
//! The binary is a thin shell over [`Engine`]. It initializes:
//! - Configuration loading ([`ConfigManager`], `swch Config.yaml` plus `SWCH_*` overrides)
//! - Logging infrastructure (daily file rotation, optional console and JSON output)
//! - Tokio async runtime (switch requests poll the process table while they wait)
//! - A state listener task that logs every [`StateChange`]
//!
//! Library and account queries print JSON; everything else prints a single status line,
//! the same line a GUI would show.
//!
//! # Threading
//!
//! - **Main thread**: parses arguments and resolves the library. The remote app-name
//!   catalog is fetched with a blocking HTTP client, so resolution stays off the runtime.
//! - **Tokio workers**: run switch and launch requests and the state listener.

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use swch::logging::{LoggingOptions, setup_logging};
use swch::services::platform_ops;
use swch::{APP_NAME, ConfigManager, Engine, Platform, StateChange, VERSION};
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser)]
#[command(
    name = "swch",
    author,
    version,
    about = "Switch accounts and launch games across Steam, Epic, Legendary and Riot"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true, help = "Directory holding swch Config.yaml")]
    config_dir: Option<Utf8PathBuf>,

    #[arg(short, long, global = true, help = "Log at debug level")]
    debug: bool,

    #[arg(short, long, global = true, help = "Also log to stderr")]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Print the unified game library as JSON")]
    Library,

    #[command(about = "Print local accounts per client as JSON")]
    Accounts,

    #[command(about = "Switch a client to another account")]
    Switch { platform: Platform, account: String },

    #[command(about = "Launch a game, switching accounts first if needed")]
    Launch {
        platform: Platform,
        game_id: String,

        #[arg(long, default_value = "", help = "Account to switch to first")]
        account: String,

        #[arg(long, default_value = "", help = "Executable for Custom/Torrent games")]
        exe: String,
    },

    #[command(about = "Save the current login of a client as a named snapshot")]
    Save { platform: Platform, name: String },

    #[command(about = "List saved snapshots of a client")]
    Snapshots { platform: Platform },

    #[command(about = "Toggle the pin of a game")]
    Pin { game_id: String },

    #[command(about = "Set the note an account keeps for a game")]
    Note {
        platform: Platform,
        username: String,
        game_id: String,
        note: String,
    },

    #[command(about = "Toggle whether a game is hidden for one account")]
    HideGame {
        platform: Platform,
        username: String,
        game_id: String,
    },

    #[command(about = "Set an account's comment and avatar")]
    Comment {
        platform: Platform,
        username: String,
        comment: String,

        #[arg(long, default_value = "")]
        avatar: String,
    },

    #[command(about = "Remove an account from the list (its files are kept)")]
    HideAccount { platform: Platform, username: String },

    #[command(about = "Add an executable to the library")]
    AddGame {
        name: String,
        exe: String,

        #[arg(long, default_value = "Custom", help = "Custom or Torrent")]
        platform: Platform,
    },

    #[command(about = "Remove a Custom/Torrent game from the library")]
    RemoveGame { platform: Platform, game_id: String },

    #[command(about = "Use an image file as the icon of a Custom/Torrent game")]
    SetImage {
        platform: Platform,
        game_id: String,
        image: String,
    },

    #[command(about = "Manage the Legendary (Epic) CLI login")]
    Legendary {
        #[command(subcommand)]
        command: LegendaryCommand,
    },

    #[command(about = "Print the effective configuration")]
    Config {
        #[arg(long, help = "Write it back to swch Config.yaml")]
        write: bool,
    },
}

#[derive(Subcommand)]
enum LegendaryCommand {
    #[command(about = "Open a terminal running `legendary auth`")]
    Login,

    #[command(about = "Log in with an Epic session id")]
    Auth { sid: String },

    #[command(about = "Show which account Legendary is logged in as")]
    Status,

    #[command(about = "Start installing a game in the background")]
    Install { app_name: String },

    #[command(about = "Forget the stored Legendary login")]
    Logout,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_dir = match &cli.config_dir {
        Some(dir) => dir.clone(),
        None => ConfigManager::default_dir()?,
    };
    let config_manager = ConfigManager::new(&config_dir)?;
    let mut config = config_manager.load_user_config()?;
    config.debug_mode |= cli.debug;
    config.console_logging |= cli.verbose;

    let mut logging = LoggingOptions::from_config(&config);
    if logging.log_dir.is_relative() {
        logging.log_dir = config_dir.join(&logging.log_dir);
    }
    let _log_guard = setup_logging(&logging)?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    if let Commands::Config { write } = cli.command {
        if write {
            config_manager.save_user_config(&config)?;
        }
        print!("{}", serde_yaml_ng::to_string(&config).context("Failed to render config")?);
        return Ok(());
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(2)
        .thread_name("swch-worker")
        .build()?;

    let ops = platform_ops::detect();
    tracing::info!("Host platform: {}", ops.os_name());
    let engine = Engine::new(config, ops)?;

    let mut changes = engine.state().subscribe();
    runtime.spawn(async move {
        loop {
            match changes.recv().await {
                Ok(change) => log_change(&change),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("State listener skipped {} events", skipped)
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let result = run(&engine, &runtime, cli.command);

    runtime.shutdown_timeout(std::time::Duration::from_secs(5));
    engine.metrics().log_summary();
    tracing::info!("Shutdown complete");

    result
}

fn run(engine: &Engine, runtime: &tokio::runtime::Runtime, command: Commands) -> Result<()> {
    let status = match command {
        Commands::Library => return print_json(&engine.get_library()),
        Commands::Accounts => return print_json(&engine.get_account_groups()),
        Commands::Snapshots { platform } => return print_json(&engine.list_snapshots(platform)),
        Commands::Switch { platform, account } => {
            runtime.block_on(engine.switch_to_account(&account, platform))
        }
        Commands::Launch {
            platform,
            game_id,
            account,
            exe,
        } => runtime.block_on(engine.launch_game(&account, &game_id, platform, &exe)),
        Commands::Save { platform, name } => engine.save_snapshot(platform, &name),
        Commands::Pin { game_id } => engine.toggle_game_pin(&game_id),
        Commands::Note {
            platform,
            username,
            game_id,
            note,
        } => engine.update_game_note(&username, platform, &game_id, &note),
        Commands::HideGame {
            platform,
            username,
            game_id,
        } => engine.toggle_game_account_hidden(&username, platform, &game_id),
        Commands::Comment {
            platform,
            username,
            comment,
            avatar,
        } => engine.update_account_data(&username, platform, &comment, &avatar),
        Commands::HideAccount { platform, username } => engine.delete_account(&username, platform),
        Commands::AddGame {
            name,
            exe,
            platform,
        } => engine.add_custom_game(&name, &exe, platform),
        Commands::RemoveGame { platform, game_id } => engine.remove_game(&game_id, platform),
        Commands::SetImage {
            platform,
            game_id,
            image,
        } => engine.set_game_image(&game_id, platform, &image),
        Commands::Legendary { command } => match command {
            LegendaryCommand::Login => engine.login_legendary_account(),
            LegendaryCommand::Auth { sid } => engine.legendary_login(&sid),
            LegendaryCommand::Status => engine.legendary_status(),
            LegendaryCommand::Install { app_name } => engine.legendary_install(&app_name),
            LegendaryCommand::Logout => engine.legendary_logout(),
        },
        Commands::Config { .. } => return Ok(()),
    };

    println!("{}", status);
    for warning in engine.state().read(|s| s.warnings.clone()) {
        eprintln!("warning: {}", warning);
    }
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", json);
    Ok(())
}

fn log_change(change: &StateChange) {
    match change {
        StateChange::PhaseChanged { platform, phase } => {
            tracing::debug!("{} phase: {:?}", platform, phase)
        }
        StateChange::WarningRaised { message } => tracing::warn!("{}", message),
        other => tracing::debug!("State change: {:?}", other),
    }
}

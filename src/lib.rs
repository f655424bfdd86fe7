// swch - multi-account switcher and unified game library
//
// This is the library crate containing the switching engine and its data structures.
// The binary crate (main.rs) provides the CLI entry point.

pub mod config;
pub mod engine;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod overlay;
pub mod services;
pub mod state;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use engine::Engine;
pub use metrics::Metrics;
pub use models::{AccountGroup, AccountProfile, GameRecord, Platform, SwitchPhase, UserConfig};
pub use state::{StateChange, StateManager};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

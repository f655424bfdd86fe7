//! Services module - the account-switching engine.
//!
//! Everything here is UI-agnostic: the services take explicit inputs (paths, a
//! [`PlatformOps`] handle, a [`ProcessCoordinator`]) and return typed results, so they can
//! be driven from the CLI, from tests, or from a GUI layer without change.
//!
//! # Components
//!
//! - [`keyvalue`]: Valve KeyValue ("VDF") parser plus the targeted [`patch_field`] primitive
//!   used to edit login state without round-tripping the whole file.
//!
//! - [`process`]: [`ProcessCoordinator`] kills a client and polls the OS process table a
//!   bounded number of times until it is gone ([`StopOutcome::TimedOut`] is a warning, not
//!   an error).
//!
//! - [`platform_ops`]: [`PlatformOps`], one implementation per host OS. Knows where each
//!   client keeps its files, which processes it runs and how to relaunch it.
//!
//! - [`profile_store`]: [`ProfileStore`] saves, lists and restores named snapshots of a
//!   client's auth state (Epic, Riot, Legendary).
//!
//! - [`name_cache`]: [`AppNameCache`], the process-wide Steam app-name lookup, populated at
//!   most once from disk, a remote catalog or a built-in fallback table.
//!
//! - [`library`]: [`LibraryResolver`] and the per-client [`GameScanner`]s that build the
//!   unified, de-duplicated and sorted game catalog.
//!
//! - [`switching`]: [`SwitchOrchestrator`] runs switch and launch requests through the
//!   `Idle → Terminating → StateSwapped → Relaunching → Done` state machine, one request
//!   per platform at a time.
//!
//! # Error Handling
//!
//! Scanning is tolerant: an unreadable or malformed file is logged and skipped so a partial
//! library is still returned. Switching is strict: the first failure aborts the request
//! and is reported as a [`SwitchError`].
//!
//! # Usage Example
//!
//! ```ignore
//! use swch::services::{platform_ops, ProcessCoordinator, SwitchOrchestrator};
//!
//! let ops = platform_ops::detect();
//! let orchestrator = SwitchOrchestrator::new(ops.clone(), ProcessCoordinator::system(), state, metrics)
//!     .with_steam_root(ops.steam_root());
//!
//! let outcome = orchestrator.switch_to_account(Platform::Steam, "alice").await?;
//! println!("{}", outcome.status);
//! ```

pub mod keyvalue;
pub mod library;
pub mod name_cache;
pub mod platform_ops;
pub mod process;
pub mod profile_store;
pub mod switching;

pub use keyvalue::{KeyValueDocument, KeyValueError, KeyValueNode, patch_field};
pub use library::{CustomGameStore, GameScanner, LibraryResolver, sort_catalog};
pub use name_cache::{AppNameCache, CatalogSource, HttpCatalogSource};
pub use platform_ops::{LaunchRequest, PlatformOps};
pub use process::{ProcessCoordinator, ProcessError, ProcessTable, ProcessTarget, StopOutcome};
pub use profile_store::{AuthState, ProfileError, ProfileStore, Snapshot};
pub use switching::{SwitchError, SwitchOrchestrator, SwitchOutcome};

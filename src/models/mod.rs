//! Data models for swch.
//!
//! This module contains the core data structures shared by the services:
//! - [`GameRecord`] / [`OwnerRef`]: one entry of the unified library and the accounts that own it
//! - [`AccountProfile`] / [`AccountGroup`]: locally known identities, grouped per client
//! - [`UserConfig`]: user preferences loaded from `swch Config.yaml`
//! - [`SwitchState`] / [`SwitchPhase`]: progress of switch and launch requests
//!
//! All models derive `Serialize` so the CLI can print them as JSON in the same field
//! names the UI layer expects.

pub mod account;
pub mod config;
pub mod game;
pub mod switch_state;

pub use account::{AccountGroup, AccountProfile, UNKNOWN_USERNAME};
pub use config::UserConfig;
pub use game::{GameRecord, OwnerRef, Platform, placeholder_name};
pub use switch_state::{
    MAX_CONCURRENT_SWITCHES_PER_PLATFORM, MAX_WARNINGS, SwitchFailureKind, SwitchPhase, SwitchState,
};

// State management module
//
// This module provides the StateManager which wraps SwitchState with thread-safe access
// using Arc<RwLock<T>> and emits change events for whoever drives the UI.

use crate::models::{Platform, SwitchPhase, SwitchState};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;

/// Change events emitted when state is modified
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    /// A switch or launch request has taken the platform lock
    SwitchStarted { platform: Platform, account: String },

    /// A request moved to a new phase
    PhaseChanged {
        platform: Platform,
        phase: SwitchPhase,
    },

    /// A request reached `Done` or `Failed`
    SwitchFinished {
        platform: Platform,
        status: String,
        succeeded: bool,
    },

    /// Non-fatal problem worth showing to the user (e.g. a kill timeout)
    WarningRaised { message: String },

    /// The unified library was rebuilt
    LibraryRefreshed { games: usize, accounts: usize },

    /// A snapshot was written
    SnapshotSaved { platform: Platform, name: String },

    /// State has been reset
    StateReset,
}

/// Thread-safe state manager with event emission
///
/// This is the central state component that:
/// - Provides thread-safe access to [`SwitchState`] via `Arc<RwLock<T>>`
/// - Detects state changes and emits [`StateChange`] events
/// - Rejects phase transitions the switch state machine does not allow
/// - Supports subscribing to state changes via tokio broadcast channels
///
/// # Related Types
///
/// - [`crate::models::SwitchState`]: The underlying state structure
/// - [`crate::services::switching::SwitchOrchestrator`]: Drives the phase transitions
pub struct StateManager {
    state: Arc<RwLock<SwitchState>>,

    /// Broadcast channel for emitting state change events
    state_tx: broadcast::Sender<StateChange>,
}

impl StateManager {
    /// Create a new StateManager with a broadcast buffer of 100 events
    pub fn new() -> Self {
        let (state_tx, _) = broadcast::channel(100);
        Self {
            state: Arc::new(RwLock::new(SwitchState::default())),
            state_tx,
        }
    }

    /// Get a clone of the current state
    pub fn snapshot(&self) -> SwitchState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Execute a function with read access to the state
    ///
    /// # Example
    /// ```ignore
    /// let busy = state_manager.read(|state| state.is_busy(Platform::Epic));
    /// ```
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&SwitchState) -> R,
    {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    /// Update the state and emit change events
    ///
    /// Captures the old state, applies `update_fn`, diffs the two and broadcasts
    /// whatever changed. Returns the emitted events.
    pub fn update<F>(&self, update_fn: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut SwitchState),
    {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let old_state = state.clone();

        update_fn(&mut state);

        let changes = Self::detect_changes(&old_state, &state);
        for change in &changes {
            self.emit(change.clone());
        }
        changes
    }

    /// Subscribe to state change events
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    fn emit(&self, change: StateChange) {
        // No subscribers is fine
        let _ = self.state_tx.send(change);
    }

    fn detect_changes(old: &SwitchState, new: &SwitchState) -> Vec<StateChange> {
        let mut changes = Vec::new();

        for platform in Platform::ALL {
            let phase = new.phase(platform);
            if old.phase(platform) != phase {
                changes.push(StateChange::PhaseChanged { platform, phase });
            }
        }

        if old.library_size != new.library_size || old.account_count != new.account_count {
            changes.push(StateChange::LibraryRefreshed {
                games: new.library_size,
                accounts: new.account_count,
            });
        }

        changes
    }

    // Convenience methods for the orchestrator

    /// Mark a request as started. The platform drops back to `Idle` first so the
    /// request begins from a clean phase.
    pub fn start_switch(&self, platform: Platform, account: &str) -> Vec<StateChange> {
        let mut changes = self.update(|state| {
            state.phases.insert(platform, SwitchPhase::Idle);
            state.last_status.remove(&platform);
        });

        let event = StateChange::SwitchStarted {
            platform,
            account: account.to_string(),
        };
        self.emit(event.clone());
        changes.push(event);
        changes
    }

    /// Move `platform` to `next` if the state machine allows it.
    ///
    /// Returns `false` (and leaves the phase alone) for an illegal transition.
    pub fn advance(&self, platform: Platform, next: SwitchPhase) -> bool {
        let current = self.read(|state| state.phase(platform));
        if !current.can_transition_to(next) {
            tracing::warn!(
                "Ignoring {} phase change {:?} -> {:?}",
                platform,
                current,
                next
            );
            return false;
        }

        self.update(|state| {
            state.phases.insert(platform, next);
        });
        true
    }

    /// Record a warning. Only the latest [`crate::models::MAX_WARNINGS`] are kept.
    pub fn add_warning(&self, message: impl Into<String>) -> Vec<StateChange> {
        let message = message.into();
        let mut changes = self.update(|state| state.push_warning(message.clone()));

        let event = StateChange::WarningRaised { message };
        self.emit(event.clone());
        changes.push(event);
        changes
    }

    /// Record the terminal status of a request.
    pub fn finish_switch(
        &self,
        platform: Platform,
        account: &str,
        status: &str,
        succeeded: bool,
    ) -> Vec<StateChange> {
        let mut changes = self.update(|state| {
            state.last_status.insert(platform, status.to_string());
            if succeeded && !account.is_empty() {
                state.active_account.insert(platform, account.to_string());
            }
        });

        let event = StateChange::SwitchFinished {
            platform,
            status: status.to_string(),
            succeeded,
        };
        self.emit(event.clone());
        changes.push(event);
        changes
    }

    pub fn set_library_counts(&self, games: usize, accounts: usize) -> Vec<StateChange> {
        self.update(|state| {
            state.library_size = games;
            state.account_count = accounts;
        })
    }

    pub fn snapshot_saved(&self, platform: Platform, name: &str) -> StateChange {
        let event = StateChange::SnapshotSaved {
            platform,
            name: name.to_string(),
        };
        self.emit(event.clone());
        event
    }

    /// Clear every phase, status and warning.
    pub fn reset(&self) -> Vec<StateChange> {
        let mut changes = self.update(|state| state.reset());
        self.emit(StateChange::StateReset);
        changes.push(StateChange::StateReset);
        changes
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for StateManager {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            state_tx: self.state_tx.clone(),
        }
    }
}

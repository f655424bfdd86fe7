use super::game::Platform;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Maximum number of switch/launch requests running at once for the same platform.
///
/// **IMPORTANT:** This is hardcoded to 1 because two overlapping requests would race to
/// delete and restore the same auth-state directory. The limit is enforced by the
/// per-platform mutex in [`crate::services::switching::SwitchOrchestrator`].
pub const MAX_CONCURRENT_SWITCHES_PER_PLATFORM: usize = 1;

/// Warnings kept in [`SwitchState::warnings`]. Older ones are dropped first.
pub const MAX_WARNINGS: usize = 100;

/// Why a switch or launch request stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SwitchFailureKind {
    LoginNotResolved,
    ProcessKillFailed,
    StateSwapFailed,
    RelaunchFailed,
    Unsupported,
}

impl fmt::Display for SwitchFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SwitchFailureKind::LoginNotResolved => "login not resolved",
            SwitchFailureKind::ProcessKillFailed => "process kill failed",
            SwitchFailureKind::StateSwapFailed => "state swap failed",
            SwitchFailureKind::RelaunchFailed => "relaunch failed",
            SwitchFailureKind::Unsupported => "unsupported",
        };
        f.write_str(s)
    }
}

/// Step of a single switch/launch request.
///
/// `Idle → Terminating → StateSwapped → Relaunching → Done`, with `Failed` reachable
/// from every non-terminal phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub enum SwitchPhase {
    #[default]
    Idle,
    Terminating,
    StateSwapped,
    Relaunching,
    Done,
    Failed(SwitchFailureKind),
}

impl SwitchPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SwitchPhase::Done | SwitchPhase::Failed(_))
    }

    /// Whether moving from `self` to `next` follows the switch state machine.
    pub fn can_transition_to(&self, next: SwitchPhase) -> bool {
        use SwitchPhase::*;
        match (self, next) {
            (_, Failed(_)) => !self.is_terminal(),
            (Idle, Terminating) | (Idle, StateSwapped) | (Idle, Relaunching) => true,
            (Terminating, StateSwapped) | (Terminating, Relaunching) => true,
            (StateSwapped, Relaunching) | (StateSwapped, Done) => true,
            (Relaunching, Done) => true,
            (Done, Idle) | (Failed(_), Idle) => true,
            // A new request may start straight after a finished one.
            (Done, Terminating) | (Failed(_), Terminating) => true,
            (Done, StateSwapped) | (Failed(_), StateSwapped) => true,
            (Done, Relaunching) | (Failed(_), Relaunching) => true,
            _ => false,
        }
    }
}

/// Runtime view of every platform's switching activity.
///
/// Wrapped in `Arc<RwLock<SwitchState>>` by [`crate::state::StateManager`]; mutate it
/// only through the manager so change events are emitted.
#[derive(Clone, Debug, Default)]
pub struct SwitchState {
    pub phases: HashMap<Platform, SwitchPhase>,
    pub active_account: HashMap<Platform, String>,
    pub last_status: HashMap<Platform, String>,
    pub warnings: Vec<String>,

    // Catalog snapshot
    pub library_size: usize,
    pub account_count: usize,
}

impl SwitchState {
    pub fn phase(&self, platform: Platform) -> SwitchPhase {
        self.phases.get(&platform).copied().unwrap_or_default()
    }

    /// True while a request for `platform` has started and not yet finished.
    pub fn is_busy(&self, platform: Platform) -> bool {
        let phase = self.phase(platform);
        phase != SwitchPhase::Idle && !phase.is_terminal()
    }

    /// Append a warning, dropping the oldest ones beyond [`MAX_WARNINGS`].
    pub fn push_warning(&mut self, message: String) {
        self.warnings.push(message);
        if self.warnings.len() > MAX_WARNINGS {
            let excess = self.warnings.len() - MAX_WARNINGS;
            self.warnings.drain(..excess);
        }
    }

    pub fn reset(&mut self) {
        self.phases.clear();
        self.active_account.clear();
        self.last_status.clear();
        self.warnings.clear();
    }
}

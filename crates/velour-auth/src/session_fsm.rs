//! Session lifecycle state machine using rust-fsm.
//!
//! ## State Diagram
//!
//! ```text
//! Uninitialized ──RestoreStarted──► Restoring
//! Restoring ──SessionRestored──► SignedIn
//! Restoring ──NoSession | RestoreFailed──► SignedOut
//!
//! SignedOut ──LoginAttempt──► SigningIn ──LoginSuccess──► SignedIn
//!                             SigningIn ──LoginFailed | LoginCancelled | LoginSuperseded──► SignedOut
//!
//! SignedIn ──RefreshStarted──► RefreshingToken ──RefreshSucceeded | RefreshFailed──► SignedIn
//!
//! SignedIn | SignedOut ──LogoutRequested──► SigningOut ──LogoutComplete──► SignedOut
//!
//! Restoring | SigningIn | SigningOut ──OperationAborted──► SignedOut
//! RefreshingToken ──OperationAborted──► SignedIn
//! ```

use rust_fsm::*;
use serde::{Deserialize, Serialize};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub session_machine(Uninitialized)

    Uninitialized => {
        RestoreStarted => Restoring
    },
    Restoring => {
        SessionRestored => SignedIn,
        NoSession => SignedOut,
        // A failed restore must never leave the machine in Restoring
        RestoreFailed => SignedOut,
        OperationAborted => SignedOut
    },
    SignedOut => {
        LoginAttempt => SigningIn,
        LogoutRequested => SigningOut
    },
    SigningIn => {
        LoginSuccess => SignedIn,
        LoginFailed => SignedOut,
        LoginCancelled => SignedOut,
        // A logout arrived while the interactive step was running
        LoginSuperseded => SignedOut,
        OperationAborted => SignedOut
    },
    SignedIn => {
        RefreshStarted => RefreshingToken,
        LogoutRequested => SigningOut
    },
    RefreshingToken => {
        RefreshSucceeded => SignedIn,
        // Stale token is kept; refresh failure never signs the user out
        RefreshFailed => SignedIn,
        OperationAborted => SignedIn
    },
    SigningOut => {
        LogoutComplete => SignedOut,
        OperationAborted => SignedOut
    }
}

pub use session_machine::Input as SessionInput;
pub use session_machine::State as SessionMachineState;
pub use session_machine::StateMachine as SessionMachine;

/// Externally visible session phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Uninitialized,
    Restoring,
    SignedOut,
    SigningIn,
    SignedIn,
    RefreshingToken,
    SigningOut,
}

impl Phase {
    /// True for the phases in which a user and token are held.
    pub fn holds_session(&self) -> bool {
        matches!(self, Phase::SignedIn | Phase::RefreshingToken)
    }

    /// True while an operation is in progress.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Phase::Restoring | Phase::SigningIn | Phase::RefreshingToken | Phase::SigningOut
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Uninitialized => "uninitialized",
            Phase::Restoring => "restoring",
            Phase::SignedOut => "signed_out",
            Phase::SigningIn => "signing_in",
            Phase::SignedIn => "signed_in",
            Phase::RefreshingToken => "refreshing_token",
            Phase::SigningOut => "signing_out",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&SessionMachineState> for Phase {
    fn from(state: &SessionMachineState) -> Self {
        match state {
            SessionMachineState::Uninitialized => Phase::Uninitialized,
            SessionMachineState::Restoring => Phase::Restoring,
            SessionMachineState::SignedOut => Phase::SignedOut,
            SessionMachineState::SigningIn => Phase::SigningIn,
            SessionMachineState::SignedIn => Phase::SignedIn,
            SessionMachineState::RefreshingToken => Phase::RefreshingToken,
            SessionMachineState::SigningOut => Phase::SigningOut,
        }
    }
}

//! Client-side authentication session management for Velour.
//!
//! This crate provides:
//! - `SessionManager`, the single owner of the signed-in state
//! - An explicit FSM for session phases
//! - A synchronous notification hub for state changes
//! - Identity provider and profile sync contracts, with Auth0 device-flow
//!   and HTTP profile implementations

mod auth0;
mod config;
mod error;
mod gateway;
mod hub;
mod manager;
mod profile;
mod session_fsm;
mod state;

#[cfg(test)]
mod tests;

pub use auth0::{Auth0Gateway, DeviceAuthorization, DevicePrompt};
pub use config::{RefreshConfig, SessionConfig};
pub use error::{AuthError, AuthResult, ErrorKind};
pub use gateway::{IdentityProvider, NoopProfileSync, ProfileSync};
pub use hub::{NotificationHub, Subscription};
pub use manager::SessionManager;
pub use profile::ProfileClient;
pub use session_fsm::session_machine;
pub use session_fsm::{Phase, SessionInput, SessionMachine, SessionMachineState};
pub use state::{AuthState, AuthStateChangedPayload, Credentials, SessionError, UserProfile};

//! Session manager: the single writer of [`AuthState`].
//!
//! Every mutating operation runs as a spawned task behind one async operation
//! lock, so effects on the snapshot never interleave and an operation finishes
//! even if its caller stops waiting. Concurrent calls of the same operation
//! share one in-flight task and resolve to the same result.
//!
//! Snapshots are published synchronously from inside the operation, after the
//! state lock has been released.

use crate::gateway::with_store;
use crate::session_fsm::{Phase, SessionInput, SessionMachine};
use crate::{
    AuthError, AuthResult, AuthState, Credentials, ErrorKind, IdentityProvider, NotificationHub,
    ProfileSync, SessionConfig, SessionError, Subscription, UserProfile,
};
use chrono::Utc;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use velour_storage::{CredentialStore, StorageError, StoredIdentity};

type Pending<T> = Shared<BoxFuture<'static, T>>;
type Slot<T> = Mutex<Option<Pending<T>>>;

struct StateCell {
    machine: SessionMachine,
    state: AuthState,
}

struct Inner {
    cell: Mutex<StateCell>,
    hub: NotificationHub,
    provider: Arc<dyn IdentityProvider>,
    profile_sync: Arc<dyn ProfileSync>,
    store: CredentialStore,
    config: SessionConfig,
    /// Held for the whole of each mutating operation.
    op_lock: tokio::sync::Mutex<()>,
    /// Raised under the logout slot lock when a logout is requested and
    /// lowered under the same lock when that logout task settles. An
    /// in-flight login that sees it discards its credentials.
    logout_pending: AtomicBool,
    init_op: Slot<AuthState>,
    login_op: Slot<AuthState>,
    logout_op: Slot<AuthState>,
    refresh_op: Slot<Option<String>>,
}

fn init_slot(inner: &Inner) -> &Slot<AuthState> {
    &inner.init_op
}

fn login_slot(inner: &Inner) -> &Slot<AuthState> {
    &inner.login_op
}

fn logout_slot(inner: &Inner) -> &Slot<AuthState> {
    &inner.logout_op
}

fn refresh_slot(inner: &Inner) -> &Slot<Option<String>> {
    &inner.refresh_op
}

/// Side effects run while a slot's lock is held: `on_call` for every caller,
/// `on_settle` when the operation task clears the slot.
#[derive(Clone, Copy)]
struct SlotHooks {
    on_call: fn(&Inner),
    on_settle: fn(&Inner),
}

fn no_hook(_: &Inner) {}

fn raise_logout(inner: &Inner) {
    inner.logout_pending.store(true, Ordering::Release);
}

fn lower_logout(inner: &Inner) {
    inner.logout_pending.store(false, Ordering::Release);
}

const NO_HOOKS: SlotHooks = SlotHooks {
    on_call: no_hook,
    on_settle: no_hook,
};

const LOGOUT_HOOKS: SlotHooks = SlotHooks {
    on_call: raise_logout,
    on_settle: lower_logout,
};

async fn with_timeout<T, F>(limit: Duration, fut: F) -> AuthResult<T>
where
    F: Future<Output = AuthResult<T>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| AuthError::Timeout)?
}

/// Owns the authoritative [`AuthState`] and the operations that change it.
///
/// Cheap to clone; clones share state. Operations never fail: errors are
/// folded into [`AuthState::error`] and a phase rollback.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        profile_sync: Arc<dyn ProfileSync>,
        store: CredentialStore,
        config: SessionConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                cell: Mutex::new(StateCell {
                    machine: SessionMachine::new(),
                    state: AuthState::default(),
                }),
                hub: NotificationHub::new(),
                provider,
                profile_sync,
                store,
                config,
                op_lock: tokio::sync::Mutex::new(()),
                logout_pending: AtomicBool::new(false),
                init_op: Mutex::new(None),
                login_op: Mutex::new(None),
                logout_op: Mutex::new(None),
                refresh_op: Mutex::new(None),
            }),
        }
    }

    // ==========================================
    // Read accessors
    // ==========================================

    /// Latest snapshot.
    pub fn snapshot(&self) -> AuthState {
        self.inner.cell.lock().state.clone()
    }

    pub fn phase(&self) -> Phase {
        self.inner.cell.lock().state.phase()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.cell.lock().state.is_authenticated()
    }

    pub fn current_user(&self) -> Option<UserProfile> {
        self.inner.cell.lock().state.user().cloned()
    }

    pub fn access_token(&self) -> Option<String> {
        self.inner.cell.lock().state.access_token().map(str::to_string)
    }

    pub fn id_token(&self) -> Option<String> {
        self.inner.cell.lock().state.id_token().map(str::to_string)
    }

    /// True when signed in with a token that outlives the refresh leeway.
    pub fn is_token_fresh(&self) -> bool {
        self.fresh_token().is_some()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Register for every snapshot published from now on.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&AuthState) + Send + Sync + 'static,
    {
        self.inner.hub.subscribe(callback)
    }

    fn fresh_token(&self) -> Option<String> {
        let cell = self.inner.cell.lock();
        let state = &cell.state;
        if state.phase() != Phase::SignedIn {
            return None;
        }
        state
            .credentials()
            .filter(|c| c.is_fresh(self.inner.config.refresh_leeway, Utc::now()))
            .map(|c| c.access_token.clone())
    }

    // ==========================================
    // Operations
    // ==========================================

    /// Restore the persisted session. Runs once; later calls return the
    /// current snapshot without side effects.
    pub async fn initialize(&self) -> AuthState {
        if self.phase() != Phase::Uninitialized {
            return self.snapshot();
        }
        self.coalesce(
            init_slot,
            NO_HOOKS,
            |m| async move { m.run_initialize().await },
            |m| m.snapshot(),
        )
        .await
    }

    /// Interactive sign-in. Concurrent callers share one attempt.
    pub async fn login(&self) -> AuthState {
        self.coalesce(
            login_slot,
            NO_HOOKS,
            |m| async move { m.run_login().await },
            |m| m.snapshot(),
        )
        .await
    }

    /// Sign out locally and at the provider. Local sign-out always happens.
    pub async fn logout(&self) -> AuthState {
        self.coalesce(
            logout_slot,
            LOGOUT_HOOKS,
            |m| async move { m.run_logout().await },
            |m| m.snapshot(),
        )
        .await
    }

    /// Current access token, refreshed first if it is due.
    ///
    /// `None` means "no token right now, retry later"; it does not imply the
    /// user was signed out.
    pub async fn refresh(&self) -> Option<String> {
        if let Some(token) = self.fresh_token() {
            return Some(token);
        }
        self.coalesce(
            refresh_slot,
            NO_HOOKS,
            |m| async move { m.run_refresh(false).await },
            |_| None,
        )
        .await
    }

    /// Refresh regardless of remaining token lifetime.
    pub async fn force_refresh(&self) -> Option<String> {
        self.coalesce(
            refresh_slot,
            NO_HOOKS,
            |m| async move { m.run_refresh(true).await },
            |_| None,
        )
        .await
    }

    /// Periodically refresh while signed in. Abort the handle to stop.
    pub fn spawn_refresh_loop(&self, interval: Duration) -> JoinHandle<()> {
        let manager = self.clone();
        let interval = interval.max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if manager.phase() != Phase::SignedIn {
                    continue;
                }
                if manager.refresh().await.is_none() {
                    debug!("Background refresh produced no token");
                }
            }
        })
    }

    /// Join the in-flight operation in `slot`, or start `op` as a new task.
    ///
    /// If `op` panics, the phase it left behind is rolled back and `recover`
    /// supplies the result.
    fn coalesce<T, F, Fut>(
        &self,
        slot: fn(&Inner) -> &Slot<T>,
        hooks: SlotHooks,
        op: F,
        recover: fn(&SessionManager) -> T,
    ) -> Pending<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce(SessionManager) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let mut guard = slot(&self.inner).lock();
        (hooks.on_call)(&self.inner);
        if let Some(pending) = guard.as_ref() {
            debug!("Joining in-flight session operation");
            return pending.clone();
        }

        let fut = op(self.clone());
        let task_owner = self.clone();
        let handle = tokio::spawn(async move {
            let outcome = AssertUnwindSafe(fut).catch_unwind().await;
            {
                // Cannot race the insert below: it happens under the same lock
                let mut settled = slot(&task_owner.inner).lock();
                *settled = None;
                (hooks.on_settle)(&task_owner.inner);
            }
            match outcome {
                Ok(value) => value,
                Err(_) => {
                    error!("Session operation panicked");
                    let _op = task_owner.inner.op_lock.lock().await;
                    task_owner.settle_abandoned().await;
                    recover(&task_owner)
                }
            }
        });

        let waiter_owner = self.clone();
        let pending = async move {
            match handle.await {
                Ok(value) => value,
                Err(e) => {
                    error!(error = %e, "Session operation task failed");
                    recover(&waiter_owner)
                }
            }
        }
        .boxed()
        .shared();

        *guard = Some(pending.clone());
        pending
    }

    async fn run_initialize(&self) -> AuthState {
        let _op = self.inner.op_lock.lock().await;
        self.settle_abandoned().await;
        if self.phase() != Phase::Uninitialized {
            return self.snapshot();
        }

        self.transition(SessionInput::RestoreStarted, |s| s.error = None);

        let stored = match self.store_call(|store| store.load_identity()).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %e, "Failed to read persisted identity");
                None
            }
        };
        debug!(
            stored_user = ?stored.as_ref().map(|s| s.id.as_str()),
            "Restoring session"
        );

        let lookup = with_timeout(
            self.inner.config.gateway_timeout,
            self.inner.provider.lookup_session(),
        )
        .await;

        match lookup {
            Ok(Some(credentials)) => {
                let warning = self.persist_identity(&credentials.user).await;
                info!(user_id = %credentials.user.id, "Session restored");
                self.transition(SessionInput::SessionRestored, move |s| {
                    s.credentials = Some(credentials);
                    s.error = warning;
                })
            }
            Ok(None) => {
                let warning = match stored {
                    Some(stale) => {
                        info!(user_id = %stale.id, "Persisted identity has no live session");
                        self.clear_identity().await
                    }
                    None => None,
                };
                info!("No existing session found");
                self.transition(SessionInput::NoSession, move |s| s.error = warning)
            }
            Err(e) => {
                warn!(error = %e, "Session restore failed");
                let failure = SessionError::from(&e);
                self.transition(SessionInput::RestoreFailed, move |s| {
                    s.error = Some(failure)
                })
            }
        }
    }

    async fn run_login(&self) -> AuthState {
        self.initialize().await;
        let _op = self.inner.op_lock.lock().await;
        self.settle_abandoned().await;

        if self.phase() != Phase::SignedOut {
            debug!(phase = %self.phase(), "Login skipped, not signed out");
            return self.snapshot();
        }
        if self.inner.logout_pending.load(Ordering::Acquire) {
            debug!("Login skipped, logout pending");
            return self.snapshot();
        }

        self.transition(SessionInput::LoginAttempt, |s| s.error = None);
        info!("Starting interactive sign-in");

        let result = with_timeout(
            self.inner.config.interactive_timeout,
            self.inner.provider.interactive_login(),
        )
        .await;

        match result {
            Ok(credentials) if self.inner.logout_pending.load(Ordering::Acquire) => {
                info!(user_id = %credentials.user.id, "Sign-in superseded by logout");
                self.transition(SessionInput::LoginSuperseded, |s| s.error = None)
            }
            Ok(credentials) => {
                let warning = self.persist_identity(&credentials.user).await;
                let user = credentials.user.clone();
                let access_token = credentials.access_token.clone();
                info!(user_id = %user.id, "Login successful");

                let state = self.transition(SessionInput::LoginSuccess, move |s| {
                    s.credentials = Some(credentials);
                    s.error = warning;
                });
                self.sync_profile(&user, &access_token).await;
                state
            }
            Err(e) if e.kind() == ErrorKind::UserCancelled => {
                info!("Sign-in cancelled by user");
                self.transition(SessionInput::LoginCancelled, |s| s.error = None)
            }
            Err(e) => {
                warn!(error = %e, "Login failed");
                let failure = SessionError::from(&e);
                self.transition(SessionInput::LoginFailed, move |s| s.error = Some(failure))
            }
        }
    }

    async fn run_logout(&self) -> AuthState {
        self.initialize().await;
        let _op = self.inner.op_lock.lock().await;
        self.settle_abandoned().await;

        let signed_out_user = self.current_user().map(|u| u.id);
        self.transition(SessionInput::LogoutRequested, |s| s.error = None);

        let remote = with_timeout(
            self.inner.config.gateway_timeout,
            self.inner.provider.clear_session(),
        )
        .await;
        let local_warning = self.clear_identity().await;

        let error = match remote {
            Ok(()) => local_warning,
            Err(e) => {
                warn!(error = %e, "Provider sign-out failed, local session cleared anyway");
                Some(SessionError::from(&e))
            }
        };

        info!(user_id = ?signed_out_user, "Logged out");
        self.transition(SessionInput::LogoutComplete, move |s| s.error = error)
    }

    async fn run_refresh(&self, force: bool) -> Option<String> {
        self.initialize().await;
        let _op = self.inner.op_lock.lock().await;
        self.settle_abandoned().await;

        if self.phase() != Phase::SignedIn {
            debug!(phase = %self.phase(), "Refresh skipped, not signed in");
            return None;
        }
        if !force {
            if let Some(token) = self.fresh_token() {
                return Some(token);
            }
        }

        self.transition(SessionInput::RefreshStarted, |s| s.error = None);

        match self.lookup_with_backoff().await {
            Ok(credentials) => {
                let identity_changed = self.current_user().as_ref() != Some(&credentials.user);
                let warning = if identity_changed {
                    self.persist_identity(&credentials.user).await
                } else {
                    None
                };
                let token = credentials.access_token.clone();
                info!(
                    user_id = %credentials.user.id,
                    expires_at = ?credentials.expires_at,
                    "Token refreshed"
                );
                self.transition(SessionInput::RefreshSucceeded, move |s| {
                    s.credentials = Some(credentials);
                    s.error = warning;
                });
                Some(token)
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed, keeping current token");
                let failure = SessionError::from(&e);
                self.transition(SessionInput::RefreshFailed, move |s| {
                    s.error = Some(failure)
                });
                None
            }
        }
    }

    /// Ask the provider for fresh credentials, retrying transient failures.
    async fn lookup_with_backoff(&self) -> AuthResult<Credentials> {
        let policy = &self.inner.config.refresh;
        let attempts = policy.max_retries.max(1);
        let mut attempt = 0;

        loop {
            let result = with_timeout(
                self.inner.config.gateway_timeout,
                self.inner.provider.lookup_session(),
            )
            .await;

            match result {
                Ok(Some(credentials)) => return Ok(credentials),
                Ok(None) => {
                    return Err(AuthError::Provider(
                        "session is no longer valid".to_string(),
                    ))
                }
                Err(e) if e.is_transient() && attempt + 1 < attempts => {
                    let delay = policy.delay_for_attempt(attempt);
                    debug!(
                        attempt = attempt + 1,
                        max_retries = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Refresh failed with transient error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn sync_profile(&self, user: &UserProfile, access_token: &str) {
        let result = with_timeout(
            self.inner.config.gateway_timeout,
            self.inner.profile_sync.sync_identity(user, access_token),
        )
        .await;

        match result {
            Ok(()) => debug!(user_id = %user.id, "Profile synced"),
            Err(e) => warn!(user_id = %user.id, error = %e, "Profile sync failed"),
        }
    }

    // ==========================================
    // Credential store
    // ==========================================

    async fn store_call<T, F>(&self, f: F) -> AuthResult<T>
    where
        F: FnOnce(&CredentialStore) -> Result<T, StorageError> + Send + 'static,
        T: Send + 'static,
    {
        with_store(&self.inner.store, f).await
    }

    async fn persist_identity(&self, user: &UserProfile) -> Option<SessionError> {
        let identity = StoredIdentity::from(user);
        match self.store_call(move |store| store.save_identity(&identity)).await {
            Ok(()) => None,
            Err(e) => {
                warn!(user_id = %user.id, error = %e, "Failed to persist identity");
                Some(SessionError::persistence(&e))
            }
        }
    }

    async fn clear_identity(&self) -> Option<SessionError> {
        match self.store_call(|store| store.clear_identity()).await {
            Ok(()) => None,
            Err(e) => {
                warn!(error = %e, "Failed to clear persisted identity");
                Some(SessionError::persistence(&e))
            }
        }
    }

    // ==========================================
    // Transitions
    // ==========================================

    /// Roll back a transient phase whose operation died without finishing.
    ///
    /// Transient phases are only entered and left under the operation lock,
    /// so one seen by the lock holder was abandoned. Caller holds the lock.
    async fn settle_abandoned(&self) {
        let phase = self.phase();
        if !phase.is_transient() {
            return;
        }
        warn!(phase = %phase, "Rolling back abandoned session operation");
        if phase == Phase::SigningOut {
            // Local sign-out still completes
            self.clear_identity().await;
        }
        let failure = SessionError {
            kind: ErrorKind::Provider,
            message: format!("operation interrupted while {phase}"),
        };
        self.transition(SessionInput::OperationAborted, move |s| {
            s.error = Some(failure)
        });
    }

    /// Apply `input`, let `apply` update the snapshot, then publish it.
    fn transition<F>(&self, input: SessionInput, apply: F) -> AuthState
    where
        F: FnOnce(&mut AuthState),
    {
        match self.try_transition(&input, apply) {
            Ok(state) => state,
            Err(e) => {
                error!(error = %e, "Rejected session transition");
                self.snapshot()
            }
        }
    }

    fn try_transition<F>(&self, input: &SessionInput, apply: F) -> AuthResult<AuthState>
    where
        F: FnOnce(&mut AuthState),
    {
        let snapshot = {
            let mut guard = self.inner.cell.lock();
            let cell = &mut *guard;
            let old_phase = cell.state.phase;

            cell.machine.consume(input).map_err(|_| {
                AuthError::InvalidStateTransition(format!(
                    "Cannot apply {:?} in phase {}",
                    input, old_phase
                ))
            })?;

            let new_phase = Phase::from(cell.machine.state());
            cell.state.phase = new_phase;
            apply(&mut cell.state);
            if !new_phase.holds_session() {
                cell.state.credentials = None;
            }
            debug_assert_eq!(
                cell.state.credentials.is_some(),
                new_phase.holds_session(),
                "credentials must be present exactly in session-holding phases"
            );

            debug!(
                old_phase = %old_phase,
                new_phase = %new_phase,
                payload = ?cell.state.payload(),
                "Session phase transition"
            );
            cell.state.clone()
        };

        self.inner.hub.publish(&snapshot);
        Ok(snapshot)
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("phase", &self.phase())
            .field("hub", &self.inner.hub)
            .finish_non_exhaustive()
    }
}

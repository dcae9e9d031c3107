//! Test harness for session manager tests.
//!
//! Provides:
//! - FakeIdentityProvider: scripted lookup/login/clear replies with call counters
//! - FakeProfileSync: records sync calls, optionally failing
//! - FailingStorage: a credential backend where every call errors
//! - TestHarness: wires a `SessionManager` to the fakes and an in-memory store

use crate::{
    AuthError, AuthResult, AuthState, Credentials, IdentityProvider, Phase, ProfileSync,
    RefreshConfig, SessionConfig, SessionManager, Subscription, UserProfile,
};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use velour_storage::{
    CredentialStore, MemoryStorage, SecureStorage, StorageError, StorageResult, StoredIdentity,
};

/// Scripted outcome of one gateway call.
#[derive(Debug, Clone)]
pub enum Reply<T> {
    Value(T),
    /// Interactive flow abandoned
    Cancelled,
    /// Provider rejected the request
    Rejected(&'static str),
    /// Transport failure
    Offline,
    /// Never completes
    Hang,
    /// Gateway bug: the call panics
    Panic,
}

impl<T> Reply<T> {
    async fn resolve(self) -> AuthResult<T> {
        match self {
            Reply::Value(value) => Ok(value),
            Reply::Cancelled => Err(AuthError::UserCancelled),
            Reply::Rejected(reason) => Err(AuthError::Provider(reason.to_string())),
            Reply::Offline => Err(AuthError::Network("connection refused".to_string())),
            Reply::Hang => std::future::pending().await,
            Reply::Panic => panic!("identity provider bug"),
        }
    }
}

struct Script<T> {
    queued: Mutex<VecDeque<Reply<T>>>,
    fallback: Mutex<Reply<T>>,
}

impl<T: Clone> Script<T> {
    fn new(fallback: Reply<T>) -> Self {
        Self {
            queued: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(fallback),
        }
    }

    fn next(&self) -> Reply<T> {
        match self.queued.lock().pop_front() {
            Some(reply) => reply,
            None => self.fallback.lock().clone(),
        }
    }
}

/// Identity provider whose replies are set by the test.
///
/// Queued replies are used first, then the fallback. With no script at all,
/// lookups find no session, logins are rejected and clears succeed.
pub struct FakeIdentityProvider {
    lookups: Script<Option<Credentials>>,
    logins: Script<Credentials>,
    clears: Script<()>,
    lookup_calls: AtomicUsize,
    login_calls: AtomicUsize,
    clear_calls: AtomicUsize,
    gate_logins: AtomicBool,
    login_gate: Notify,
    login_started: Notify,
}

impl FakeIdentityProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            lookups: Script::new(Reply::Value(None)),
            logins: Script::new(Reply::Rejected("no login scripted")),
            clears: Script::new(Reply::Value(())),
            lookup_calls: AtomicUsize::new(0),
            login_calls: AtomicUsize::new(0),
            clear_calls: AtomicUsize::new(0),
            gate_logins: AtomicBool::new(false),
            login_gate: Notify::new(),
            login_started: Notify::new(),
        })
    }

    /// Existing session the provider can recover on every lookup.
    pub fn with_session(credentials: Credentials) -> Arc<Self> {
        let provider = Self::new();
        provider.set_lookup(Reply::Value(Some(credentials)));
        provider
    }

    pub fn set_lookup(&self, reply: Reply<Option<Credentials>>) {
        *self.lookups.fallback.lock() = reply;
    }

    pub fn queue_lookup(&self, reply: Reply<Option<Credentials>>) {
        self.lookups.queued.lock().push_back(reply);
    }

    pub fn set_login(&self, reply: Reply<Credentials>) {
        *self.logins.fallback.lock() = reply;
    }

    pub fn set_clear(&self, reply: Reply<()>) {
        *self.clears.fallback.lock() = reply;
    }

    /// Hold every interactive login until [`Self::release_login`].
    pub fn gate_logins(&self) {
        self.gate_logins.store(true, Ordering::SeqCst);
    }

    pub fn release_login(&self) {
        self.login_gate.notify_one();
    }

    /// Resolves once a login call has reached the provider.
    pub async fn login_started(&self) {
        self.login_started.notified().await;
    }

    pub fn lookup_calls(&self) -> usize {
        self.lookup_calls.load(Ordering::SeqCst)
    }

    pub fn login_calls(&self) -> usize {
        self.login_calls.load(Ordering::SeqCst)
    }

    pub fn clear_calls(&self) -> usize {
        self.clear_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentityProvider {
    async fn lookup_session(&self) -> AuthResult<Option<Credentials>> {
        self.lookup_calls.fetch_add(1, Ordering::SeqCst);
        self.lookups.next().resolve().await
    }

    async fn interactive_login(&self) -> AuthResult<Credentials> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        self.login_started.notify_one();
        if self.gate_logins.load(Ordering::SeqCst) {
            self.login_gate.notified().await;
        }
        self.logins.next().resolve().await
    }

    async fn clear_session(&self) -> AuthResult<()> {
        self.clear_calls.fetch_add(1, Ordering::SeqCst);
        self.clears.next().resolve().await
    }
}

/// Profile sync that counts calls.
#[derive(Default)]
pub struct FakeProfileSync {
    synced: Mutex<Vec<(String, String)>>,
    fail: AtomicBool,
}

impl FakeProfileSync {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    /// `(user_id, access_token)` of every sync call, in order.
    pub fn synced(&self) -> Vec<(String, String)> {
        self.synced.lock().clone()
    }
}

#[async_trait]
impl ProfileSync for FakeProfileSync {
    async fn sync_identity(&self, user: &UserProfile, access_token: &str) -> AuthResult<()> {
        self.synced
            .lock()
            .push((user.id.clone(), access_token.to_string()));
        if self.fail.load(Ordering::SeqCst) {
            return Err(AuthError::Network("profile service down".to_string()));
        }
        Ok(())
    }
}

/// Backend where every read and write fails.
pub struct FailingStorage;

impl SecureStorage for FailingStorage {
    fn set(&self, _key: &str, _value: &str) -> StorageResult<()> {
        Err(StorageError::Backend("disk full".to_string()))
    }

    fn get(&self, _key: &str) -> StorageResult<Option<String>> {
        Err(StorageError::Backend("store locked".to_string()))
    }

    fn delete(&self, _key: &str) -> StorageResult<bool> {
        Err(StorageError::Backend("store locked".to_string()))
    }
}

/// Credentials for `user_id` expiring in an hour.
pub fn credentials(user_id: &str, access_token: &str) -> Credentials {
    credentials_expiring(user_id, access_token, chrono::Duration::hours(1))
}

pub fn credentials_expiring(
    user_id: &str,
    access_token: &str,
    ttl: chrono::Duration,
) -> Credentials {
    Credentials {
        user: UserProfile {
            email: Some(format!("{user_id}@example.com")),
            ..UserProfile::new(user_id)
        },
        access_token: access_token.to_string(),
        id_token: Some(format!("id-{access_token}")),
        expires_at: Some(Utc::now() + ttl),
    }
}

/// Short timeouts and near-zero backoff.
pub fn test_config() -> SessionConfig {
    SessionConfig {
        gateway_timeout: Duration::from_secs(2),
        interactive_timeout: Duration::from_secs(2),
        refresh_leeway: Duration::from_secs(60),
        refresh: RefreshConfig {
            max_retries: 3,
            initial_delay_ms: 1,
            max_delay_ms: 5,
        },
    }
}

/// Every snapshot a subscriber received, in delivery order.
pub struct Recorder {
    seen: Arc<Mutex<Vec<AuthState>>>,
    pub subscription: Subscription,
}

impl Recorder {
    pub fn attach(manager: &SessionManager) -> Self {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let subscription = manager.subscribe(move |state: &AuthState| sink.lock().push(state.clone()));
        Self { seen, subscription }
    }

    pub fn states(&self) -> Vec<AuthState> {
        self.seen.lock().clone()
    }

    pub fn phases(&self) -> Vec<Phase> {
        self.seen.lock().iter().map(AuthState::phase).collect()
    }
}

/// Session manager wired to fakes.
pub struct TestHarness {
    pub manager: SessionManager,
    pub provider: Arc<FakeIdentityProvider>,
    pub profile: Arc<FakeProfileSync>,
    pub store: CredentialStore,
}

impl TestHarness {
    /// Fresh install: empty store, provider with no session.
    pub fn new() -> Self {
        Self::with_provider(FakeIdentityProvider::new())
    }

    pub fn with_provider(provider: Arc<FakeIdentityProvider>) -> Self {
        let store = CredentialStore::new(Arc::new(MemoryStorage::new()));
        Self::build(provider, store, test_config())
    }

    /// Store already holding `identity`, as left by a previous run.
    pub fn with_persisted(provider: Arc<FakeIdentityProvider>, identity: &UserProfile) -> Self {
        let harness = Self::with_provider(provider);
        harness
            .store
            .save_identity(&StoredIdentity::from(identity))
            .unwrap();
        harness
    }

    pub fn with_config(provider: Arc<FakeIdentityProvider>, config: SessionConfig) -> Self {
        let store = CredentialStore::new(Arc::new(MemoryStorage::new()));
        Self::build(provider, store, config)
    }

    pub fn with_failing_store(provider: Arc<FakeIdentityProvider>) -> Self {
        let store = CredentialStore::new(Arc::new(FailingStorage));
        Self::build(provider, store, test_config())
    }

    pub fn build(
        provider: Arc<FakeIdentityProvider>,
        store: CredentialStore,
        config: SessionConfig,
    ) -> Self {
        let profile = FakeProfileSync::new();
        let manager = SessionManager::new(provider.clone(), profile.clone(), store.clone(), config);
        Self {
            manager,
            provider,
            profile,
            store,
        }
    }

    /// Initialized and signed in as `user_id`.
    pub async fn signed_in(user_id: &str) -> Self {
        let harness =
            Self::with_provider(FakeIdentityProvider::with_session(credentials(user_id, "at-1")));
        let state = harness.manager.initialize().await;
        assert_eq!(state.phase(), Phase::SignedIn);
        harness
    }

    pub fn persisted_user(&self) -> Option<String> {
        self.store.load_identity().unwrap().map(|identity| identity.id)
    }
}

/// Poll until the manager reaches `phase`, failing after two seconds.
pub async fn wait_for_phase(manager: &SessionManager, phase: Phase) {
    let reached = tokio::time::timeout(Duration::from_secs(2), async {
        while manager.phase() != phase {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(reached.is_ok(), "never reached {phase}, stuck in {}", manager.phase());
}

/// Check the user/token pairing on a snapshot.
pub fn assert_consistent(state: &AuthState) {
    assert_eq!(
        state.user().is_some(),
        state.access_token().is_some(),
        "user and token must be present together: {state:?}"
    );
    assert_eq!(
        state.user().is_some(),
        state.phase().holds_session(),
        "session presence must match phase: {state:?}"
    );
}

//! II. Coalescing and Logout Precedence tests.
//!
//! Rules covered:
//! - 12. Concurrent initialize calls share one restore
//! - 13. Concurrent login calls share one interactive flow
//! - 14. Logout requested during a login wins
//! - 15. Concurrent refresh calls share one provider lookup
//! - 16. An operation finishes after its caller stops waiting
//! - 17. Login works again after a superseded attempt
//! - 41. Login works after concurrent logouts settle

use super::harness::{
    credentials, credentials_expiring, wait_for_phase, FakeIdentityProvider, Recorder, Reply,
    TestHarness,
};
use crate::Phase;
use futures_util::poll;

/// Rule 12: Concurrent initialize calls share one restore
#[tokio::test]
async fn rule_12_concurrent_initialize_coalesces() {
    let harness = TestHarness::with_provider(FakeIdentityProvider::with_session(credentials(
        "u1", "at-1",
    )));
    let recorder = Recorder::attach(&harness.manager);

    let (a, b, c) = tokio::join!(
        harness.manager.initialize(),
        harness.manager.initialize(),
        harness.manager.initialize()
    );

    assert_eq!(a, b);
    assert_eq!(b, c);
    assert_eq!(a.phase(), Phase::SignedIn);
    assert_eq!(harness.provider.lookup_calls(), 1);
    assert_eq!(recorder.phases(), vec![Phase::Restoring, Phase::SignedIn]);
}

/// Rule 13: Concurrent login calls share one interactive flow
#[tokio::test]
async fn rule_13_concurrent_login_coalesces() {
    let harness = TestHarness::new();
    harness
        .provider
        .set_login(Reply::Value(credentials("u2", "at-2")));
    harness.provider.gate_logins();
    harness.manager.initialize().await;
    let recorder = Recorder::attach(&harness.manager);

    let provider = harness.provider.clone();
    let release = async move {
        provider.login_started().await;
        provider.release_login();
    };
    let (a, b, ()) = tokio::join!(harness.manager.login(), harness.manager.login(), release);

    assert_eq!(a, b);
    assert_eq!(a.phase(), Phase::SignedIn);
    assert_eq!(harness.provider.login_calls(), 1);
    assert_eq!(harness.profile.synced().len(), 1);
    assert_eq!(recorder.phases(), vec![Phase::SigningIn, Phase::SignedIn]);
}

/// Rule 14: Logout requested during a login wins
#[tokio::test]
async fn rule_14_logout_wins_over_inflight_login() {
    let harness = TestHarness::new();
    harness
        .provider
        .set_login(Reply::Value(credentials("u2", "at-2")));
    harness.provider.gate_logins();
    harness.manager.initialize().await;
    let recorder = Recorder::attach(&harness.manager);

    let manager = harness.manager.clone();
    let login = tokio::spawn(async move { manager.login().await });
    harness.provider.login_started().await;

    let mut logout = Box::pin(harness.manager.logout());
    assert!(poll!(&mut logout).is_pending());
    harness.provider.release_login();

    let login_state = login.await.unwrap();
    let logout_state = logout.await;

    assert_eq!(login_state.phase(), Phase::SignedOut);
    assert!(login_state.user().is_none());
    assert_eq!(logout_state.phase(), Phase::SignedOut);
    assert_eq!(
        recorder.phases(),
        vec![
            Phase::SigningIn,
            Phase::SignedOut,
            Phase::SigningOut,
            Phase::SignedOut
        ]
    );
    assert!(recorder.states().iter().all(|s| s.user().is_none()));
    assert_eq!(harness.persisted_user(), None);
    assert!(harness.profile.synced().is_empty());
    assert_eq!(harness.provider.clear_calls(), 1);
}

/// Rule 15: Concurrent refresh calls share one provider lookup
#[tokio::test]
async fn rule_15_concurrent_refresh_coalesces() {
    let due = credentials_expiring("u1", "at-1", chrono::Duration::seconds(10));
    let harness = TestHarness::with_provider(FakeIdentityProvider::with_session(due));
    harness.manager.initialize().await;
    harness
        .provider
        .queue_lookup(Reply::Value(Some(credentials("u1", "at-2"))));
    let recorder = Recorder::attach(&harness.manager);

    let (a, b) = tokio::join!(harness.manager.refresh(), harness.manager.refresh());

    assert_eq!(a.as_deref(), Some("at-2"));
    assert_eq!(b.as_deref(), Some("at-2"));
    assert_eq!(harness.provider.lookup_calls(), 2);
    assert_eq!(
        recorder.phases(),
        vec![Phase::RefreshingToken, Phase::SignedIn]
    );
}

/// Rule 16: An operation finishes after its caller stops waiting
#[tokio::test]
async fn rule_16_dropped_caller_does_not_cancel_login() {
    let harness = TestHarness::new();
    harness
        .provider
        .set_login(Reply::Value(credentials("u2", "at-2")));
    harness.provider.gate_logins();
    harness.manager.initialize().await;

    {
        let mut login = Box::pin(harness.manager.login());
        assert!(poll!(&mut login).is_pending());
    }
    harness.provider.login_started().await;
    harness.provider.release_login();

    wait_for_phase(&harness.manager, Phase::SignedIn).await;
    assert_eq!(harness.persisted_user().as_deref(), Some("u2"));
    assert_eq!(harness.provider.login_calls(), 1);
}

/// Rule 17: Login works again after a superseded attempt
#[tokio::test]
async fn rule_17_login_after_superseded_attempt() {
    let harness = TestHarness::new();
    harness
        .provider
        .set_login(Reply::Value(credentials("u2", "at-2")));
    harness.provider.gate_logins();
    harness.manager.initialize().await;

    let manager = harness.manager.clone();
    let login = tokio::spawn(async move { manager.login().await });
    harness.provider.login_started().await;
    let mut logout = Box::pin(harness.manager.logout());
    assert!(poll!(&mut logout).is_pending());
    harness.provider.release_login();
    login.await.unwrap();
    logout.await;

    let provider = harness.provider.clone();
    let release = async move {
        provider.login_started().await;
        provider.release_login();
    };
    let (state, ()) = tokio::join!(harness.manager.login(), release);

    assert_eq!(state.phase(), Phase::SignedIn);
    assert_eq!(harness.provider.login_calls(), 2);
}

/// Rule 41: Login works after concurrent logouts settle
#[tokio::test]
async fn rule_41_login_after_coalesced_logouts() {
    let harness = TestHarness::signed_in("u1").await;
    harness
        .provider
        .set_login(Reply::Value(credentials("u2", "at-2")));

    for _ in 0..3 {
        let (a, b) = tokio::join!(harness.manager.logout(), harness.manager.logout());
        assert_eq!(a, b);
        assert_eq!(a.phase(), Phase::SignedOut);

        let state = harness.manager.login().await;
        assert_eq!(state.phase(), Phase::SignedIn);
    }
    assert_eq!(harness.provider.login_calls(), 3);
    assert_eq!(harness.provider.clear_calls(), 3);
}

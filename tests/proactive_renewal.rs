mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{token_expiring_in, FakeRenewalClient, Harness, RecordingChannel, RenewalMode};
use tokio::sync::Notify;

use storefront_session::bridge::HostMessage;
use storefront_session::session::SchedulerState;
use storefront_session::{Config, LogoutReason, SessionError, SessionEvent, Tier};

// Tokens expire 310s out; with the default 300s margin the timer fires at 10s.

#[tokio::test(start_paused = true)]
async fn test_timer_renews_before_expiry() {
    let h = Harness::new(FakeRenewalClient::new());
    let old = token_expiring_in(310);
    h.manager.login(old.clone(), Some("refA".into()), false).unwrap();
    assert_eq!(h.manager.scheduler_state(), SchedulerState::Scheduled);

    tokio::time::sleep(Duration::from_secs(8)).await;
    assert_eq!(h.client.renew_calls(), 0);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(h.client.renew_calls(), 1);

    let new = h.manager.access_token().unwrap();
    assert_ne!(new, old);

    // Replaced in every tier that held the old token, and nowhere else.
    assert_eq!(h.tiers.access_token(Tier::Ephemeral).as_deref(), Some(new.as_str()));
    assert_eq!(h.tiers.access_token(Tier::CookieVisible).as_deref(), Some(new.as_str()));
    assert_eq!(h.tiers.access_token(Tier::Durable), None);

    let record = h.manager.current_session().unwrap();
    assert_eq!(record.refresh_token(), Some("refA-r1"));
    assert!(h
        .events()
        .iter()
        .any(|e| matches!(e, SessionEvent::Refreshed { expires_at } if *expires_at == record.expires_at)));

    // Re-armed for the new token.
    assert_eq!(h.manager.scheduler_state(), SchedulerState::Scheduled);
    assert!(!h.manager.is_renewing());
}

#[tokio::test(start_paused = true)]
async fn test_token_inside_margin_renews_immediately() {
    let h = Harness::new(FakeRenewalClient::new());
    h.manager
        .login(token_expiring_in(-5), Some("refA".into()), true)
        .unwrap();

    tokio::time::sleep(Duration::from_millis(1)).await;

    assert_eq!(h.client.renew_calls(), 1);
    assert!(h.manager.is_authenticated());
    assert_eq!(h.logout_events(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_renewal_ends_session() {
    let h = Harness::new(FakeRenewalClient::rejecting());
    h.manager
        .login(token_expiring_in(310), Some("refA".into()), true)
        .unwrap();

    tokio::time::sleep(Duration::from_secs(11)).await;

    assert_eq!(h.client.renew_calls(), 1);
    assert!(h.tiers.all_empty());
    assert!(!h.manager.is_authenticated());
    assert_eq!(h.manager.scheduler_state(), SchedulerState::Idle);
    assert_eq!(h.logout_events(), 1);
    assert_eq!(
        h.events().last(),
        Some(&SessionEvent::LoggedOut { reason: LogoutReason::RenewalFailed })
    );

    // No further attempts.
    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert_eq!(h.client.renew_calls(), 1);
    assert_eq!(h.logout_events(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_network_failure_ends_session() {
    let h = Harness::new(FakeRenewalClient::new().with_mode(RenewalMode::NetworkFailure));
    h.manager
        .login(token_expiring_in(310), Some("refA".into()), true)
        .unwrap();

    tokio::time::sleep(Duration::from_secs(11)).await;

    assert!(h.tiers.all_empty());
    assert_eq!(
        h.events().last(),
        Some(&SessionEvent::LoggedOut { reason: LogoutReason::RenewalFailed })
    );
}

#[tokio::test(start_paused = true)]
async fn test_unusable_renewed_token_ends_session() {
    for mode in [RenewalMode::Unreadable, RenewalMode::Expired] {
        let h = Harness::new(FakeRenewalClient::new().with_mode(mode));
        h.manager
            .login(token_expiring_in(3600), Some("refA".into()), true)
            .unwrap();

        let err = h.manager.renew().await.unwrap_err();
        assert!(matches!(err, SessionError::RenewalRejected(_)), "{mode:?}: {err:?}");
        assert!(h.tiers.all_empty());
        assert_eq!(h.manager.scheduler_state(), SchedulerState::Idle);
        assert_eq!(h.logout_events(), 1);

        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(h.client.renew_calls(), 1, "{mode:?}");
    }
}

#[tokio::test(start_paused = true)]
async fn test_short_lived_renewed_token_is_not_renewed_back_to_back() {
    let h = Harness::new(FakeRenewalClient::new().with_ttl(60));
    h.manager
        .login(token_expiring_in(310), Some("refA".into()), true)
        .unwrap();

    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(h.client.renew_calls(), 1);

    // 60s tokens sit inside the 300s margin; each is renewed at half its life.
    tokio::time::sleep(Duration::from_secs(25)).await;
    assert_eq!(h.client.renew_calls(), 1);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(h.client.renew_calls(), 2);
    assert!(h.manager.is_authenticated());
    assert_eq!(h.logout_events(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_slow_renewal_times_out() {
    let config = Config {
        renewal_timeout: Duration::from_secs(5),
        ..Config::default()
    };
    let h = Harness::with_config(
        FakeRenewalClient::new().with_delay(Duration::from_secs(60)),
        config,
    );
    h.manager
        .login(token_expiring_in(3600), Some("refA".into()), true)
        .unwrap();

    let err = h.manager.renew().await.unwrap_err();

    assert!(matches!(err, SessionError::RenewalNetworkFailure(_)));
    assert_eq!(h.client.renew_calls(), 1);
    assert!(h.tiers.all_empty());
    assert_eq!(h.logout_events(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_logout_rejects_pending_renewal() {
    let h = Harness::new(FakeRenewalClient::new().with_delay(Duration::from_secs(60)));
    h.manager
        .login(token_expiring_in(3600), Some("refA".into()), true)
        .unwrap();

    let waiter = tokio::spawn({
        let manager = h.manager.clone();
        async move { manager.renew().await }
    });
    while !h.manager.is_renewing() {
        tokio::task::yield_now().await;
    }

    h.manager.logout().await;

    assert_eq!(waiter.await.unwrap().unwrap_err(), SessionError::LoggedOut);
    assert!(!h.manager.is_renewing());
    assert!(h.tiers.all_empty());
    assert_eq!(h.logout_events(), 1);
    assert_eq!(
        h.events().last(),
        Some(&SessionEvent::LoggedOut { reason: LogoutReason::Explicit })
    );

    // The abandoned renewal never writes anything back.
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert!(h.tiers.all_empty());
}

#[tokio::test(start_paused = true)]
async fn test_login_during_renewal_wins() {
    let h = Harness::new(FakeRenewalClient::new().with_delay(Duration::from_secs(30)));
    h.manager
        .login(token_expiring_in(3600), Some("refA".into()), true)
        .unwrap();

    let waiter = tokio::spawn({
        let manager = h.manager.clone();
        async move { manager.renew().await }
    });
    while !h.manager.is_renewing() {
        tokio::task::yield_now().await;
    }

    let fresh = token_expiring_in(7200);
    h.manager.login(fresh.clone(), Some("refB".into()), true).unwrap();

    assert!(waiter.await.unwrap().is_err());
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.manager.access_token().as_deref(), Some(fresh.as_str()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_logout_racing_renewal_response_leaves_nothing() {
    for _ in 0..50 {
        let release = Arc::new(Notify::new());
        let h = Harness::new(FakeRenewalClient::new().held_by(release.clone()));
        h.manager
            .login(token_expiring_in(3600), Some("refA".into()), true)
            .unwrap();

        let waiter = tokio::spawn({
            let manager = h.manager.clone();
            async move { manager.renew().await }
        });
        while h.client.renew_calls() == 0 {
            tokio::task::yield_now().await;
        }

        // The renewal response and the logout land together.
        release.notify_one();
        h.manager.logout().await;
        let _ = waiter.await.unwrap();

        assert!(h.tiers.all_empty());
        assert!(!h.manager.is_authenticated());
        assert_eq!(h.manager.scheduler_state(), SchedulerState::Idle);
        assert_eq!(h.logout_events(), 1);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_login_racing_renewal_response_keeps_new_session() {
    for _ in 0..50 {
        let release = Arc::new(Notify::new());
        let h = Harness::new(FakeRenewalClient::new().held_by(release.clone()));
        h.manager
            .login(token_expiring_in(3600), Some("refA".into()), true)
            .unwrap();

        let waiter = tokio::spawn({
            let manager = h.manager.clone();
            async move { manager.renew().await }
        });
        while h.client.renew_calls() == 0 {
            tokio::task::yield_now().await;
        }

        release.notify_one();
        let fresh = token_expiring_in(7200);
        h.manager.login(fresh.clone(), Some("refB".into()), true).unwrap();
        let _ = waiter.await.unwrap();

        let record = h.manager.current_session().unwrap();
        assert_eq!(record.access_token(), fresh);
        assert_eq!(record.refresh_token(), Some("refB"));
        assert_eq!(h.tiers.access_token(Tier::CookieVisible).as_deref(), Some(fresh.as_str()));
    }
}

#[tokio::test(start_paused = true)]
async fn test_host_sees_refreshed_credentials() {
    let channel = Arc::new(RecordingChannel::default());
    let h = Harness::with_host(FakeRenewalClient::new(), channel.clone());
    h.manager
        .login(token_expiring_in(310), Some("refA".into()), true)
        .unwrap();

    tokio::time::sleep(Duration::from_secs(11)).await;

    let new = h.manager.access_token().unwrap();
    let messages = channel.messages.lock().clone();
    assert!(matches!(messages[0], HostMessage::Login { .. }));
    match &messages[1] {
        HostMessage::Refreshed { credentials } => assert_eq!(credentials.access_token, new),
        other => panic!("expected refreshed, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_later_rejection_ends_renewed_session() {
    let h = Harness::new(FakeRenewalClient::new());
    h.manager
        .login(token_expiring_in(3600), Some("refA".into()), true)
        .unwrap();

    h.manager.renew().await.unwrap();
    h.client.set_mode(RenewalMode::Reject);
    assert!(h.manager.renew().await.unwrap_err().is_terminal());

    assert_eq!(h.client.renew_calls(), 2);
    assert!(!h.manager.is_authenticated());
}

// End-to-end scheduler behavior under the paused clock: the "test" frequency
// fires after one minute, failures extend the reschedule delay, shutdown
// stops everything and leaves the last confirmed state on disk.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use crate::config::types::{Config, RefreshFreq};
use crate::tests::common::{self, ScriptedRefresher};

fn persisted_token(path: &std::path::Path, account: &str) -> Option<String> {
    let raw = std::fs::read_to_string(path).ok()?;
    let config: Config = serde_json::from_str(&raw).ok()?;
    config.accounts.get(account).map(|a| a.token.clone())
}

#[tokio::test(start_paused = true)]
async fn test_frequency_fires_after_one_minute_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    let refresher = ScriptedRefresher::always_succeeding("IGrefreshed");
    let manager = common::test_manager(
        refresher.clone(),
        &path,
        RefreshFreq::Test,
        &[("shop", "IGseed")],
    );

    manager.start_scheduled_refreshes().await;
    assert_eq!(
        manager.lookup_token("shop").await.unwrap(),
        "IGseed",
        "nothing fires before the interval"
    );

    tokio::time::sleep(Duration::from_secs(61)).await;

    let manager_check = Arc::clone(&manager);
    assert!(
        common::wait_until(|| {
            let manager = Arc::clone(&manager_check);
            async move { manager.lookup_token("shop").await.unwrap() == "IGrefreshed" }
        })
        .await,
        "scheduled refresh installs the new token"
    );
    assert!(
        common::wait_until(|| {
            let path = path.clone();
            async move { persisted_token(&path, "shop").as_deref() == Some("IGrefreshed") }
        })
        .await,
        "persisted file reflects the refreshed token"
    );
    assert_eq!(refresher.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_cycle_reschedules_with_extended_delay() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    // First cycle burns all 5 attempts, second cycle succeeds immediately.
    let refresher = ScriptedRefresher::fail_n_then_succeed(5, "IGrecovered");
    let manager = common::test_manager(
        refresher.clone(),
        &path,
        RefreshFreq::Test,
        &[("shop", "IGseed")],
    );

    manager.start_scheduled_refreshes().await;

    // First cycle: fires at 60s, fails through backoffs 1+2+4+8 = 15s.
    tokio::time::sleep(Duration::from_secs(76)).await;
    assert_eq!(refresher.calls(), 5);
    assert_eq!(manager.lookup_token("shop").await.unwrap(), "IGseed");

    // Streak is 5, so the next firing lands (5 + 1) * 60s = 360s later,
    // capped at the 60s test interval -> 60s later.
    tokio::time::sleep(Duration::from_secs(61)).await;
    let manager_check = Arc::clone(&manager);
    assert!(
        common::wait_until(|| {
            let manager = Arc::clone(&manager_check);
            async move { manager.lookup_token("shop").await.unwrap() == "IGrecovered" }
        })
        .await,
        "schedule resumes and the streak clears on the next success"
    );
    assert_eq!(refresher.calls(), 6);
}

#[tokio::test(start_paused = true)]
async fn accounts_refresh_independently_and_overlap() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    let refresher = ScriptedRefresher::slow_succeeding("IGoverlap", Duration::from_secs(5));
    let manager = common::test_manager(
        refresher.clone(),
        &path,
        RefreshFreq::Test,
        &[("first", "IGone"), ("second", "IGtwo")],
    );

    manager.start_scheduled_refreshes().await;
    tokio::time::sleep(Duration::from_secs(66)).await;

    let manager_check = Arc::clone(&manager);
    assert!(
        common::wait_until(|| {
            let manager = Arc::clone(&manager_check);
            async move {
                manager.lookup_token("first").await.unwrap() == "IGoverlap"
                    && manager.lookup_token("second").await.unwrap() == "IGoverlap"
            }
        })
        .await
    );

    // Both exchanges started at the same instant; a serialized pair would
    // have been 5s apart.
    let instants = refresher.call_instants().await;
    assert_eq!(instants.len(), 2);
    assert_eq!(instants[0], instants[1]);
}

#[tokio::test(start_paused = true)]
async fn shutdown_mid_backoff_keeps_last_confirmed_token() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    let refresher = ScriptedRefresher::always_failing();
    let manager = common::test_manager(
        refresher.clone(),
        &path,
        RefreshFreq::Test,
        &[("shop", "IGseed")],
    );

    manager.start_scheduled_refreshes().await;

    // Land inside the first cycle's backoff wait.
    tokio::time::sleep(Duration::from_millis(60_500)).await;
    assert!(refresher.calls() >= 1);

    timeout(Duration::from_secs(30), manager.shutdown())
        .await
        .expect("shutdown finishes within the deadline");

    assert_eq!(
        persisted_token(&path, "shop").as_deref(),
        Some("IGseed"),
        "only the last confirmed token is persisted"
    );

    // Timers are gone: no further attempts however long we wait.
    let attempts_at_shutdown = refresher.calls();
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(refresher.calls(), attempts_at_shutdown);
}

#[tokio::test(start_paused = true)]
async fn rearming_replaces_the_existing_timer() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    let refresher = ScriptedRefresher::always_succeeding("IGrefreshed");
    let manager = common::test_manager(
        refresher.clone(),
        &path,
        RefreshFreq::Test,
        &[("shop", "IGseed")],
    );

    manager.start_scheduled_refreshes().await;
    tokio::time::sleep(Duration::from_secs(30)).await;
    // Re-arm halfway through the interval; the replacement timer restarts
    // the countdown, so only one firing happens by t=95s.
    manager.start_scheduled_refreshes().await;

    tokio::time::sleep(Duration::from_secs(65)).await;
    let manager_check = Arc::clone(&manager);
    assert!(
        common::wait_until(|| {
            let manager = Arc::clone(&manager_check);
            async move { manager.lookup_token("shop").await.unwrap() == "IGrefreshed" }
        })
        .await
    );
    assert_eq!(refresher.calls(), 1, "old timer was cancelled, not doubled");
}

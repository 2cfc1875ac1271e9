//! Target registry, poller and track list working together.

#![cfg(unix)]

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use autosr::Error;
use autosr::track::{Poller, SaveStatus, Shutdown, TrackList};
use tempfile::TempDir;

use common::*;

struct Fixture {
    dir: TempDir,
    shutdown: Shutdown,
    module: Arc<MockModule>,
    registry: Arc<autosr::track::TargetRegistry>,
}

fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let shutdown = Shutdown::new();
    let saver = saver(&dir, &sleeper(dir.path()), shutdown.clone());
    let module = MockModule::new();
    let registry = registry(Arc::clone(&module), saver);
    Fixture {
        dir,
        shutdown,
        module,
        registry,
    }
}

#[tokio::test]
async fn test_add_is_idempotent_and_snipes_live_targets() {
    let f = fixture();
    let ctx = f.shutdown.token();
    let target = MockTarget::live("alice");
    f.module.prepare(target.clone());

    f.registry.add_target(&ctx, &link("alice")).await.unwrap();
    f.registry
        .add_target(&ctx, &format!("  {}  ", link("alice")))
        .await
        .unwrap();

    assert_eq!(f.registry.len(), 1);
    assert_eq!(f.module.adds(), 1);
    assert_eq!(target.checks.load(Ordering::SeqCst), 1);
    assert_eq!(target.begins(), 1);
    assert!(f.registry.saver().is_saving(&link("alice")));

    let info = &f.registry.list()[0];
    assert_eq!(info.name, "alice");
    assert_eq!(info.host, HOST);
    assert_eq!(info.status, SaveStatus::Running);
    assert!(info.started_at.is_some());
    assert!(info.finished_at.is_none());

    f.shutdown.drain(Duration::from_secs(5)).await;
}

#[tokio::test]
async fn test_offline_target_is_tracked_without_saving() {
    let f = fixture();
    let ctx = f.shutdown.token();

    f.registry.add_target(&ctx, &link("bob")).await.unwrap();
    let tracked = f.registry.get(&link("bob")).unwrap();
    assert_eq!(tracked.status(), SaveStatus::Idle);
    assert!(tracked.started_at().is_none());
    assert!(f.registry.saver().tasks().is_empty());
}

#[tokio::test]
async fn test_live_without_url_waits_for_next_check() {
    let f = fixture();
    let ctx = f.shutdown.token();
    let target = MockTarget::new("carol", Check::NoUrl);
    f.module.prepare(target.clone());

    f.registry.add_target(&ctx, &link("carol")).await.unwrap();
    assert!(f.registry.saver().tasks().is_empty());

    target.set_fallback(Check::Live("cdn.example.com/carol.m3u8".into()));
    let tracked = f.registry.get(&link("carol")).unwrap();
    let started = f.registry.snipe(&ctx, &tracked).await.unwrap();
    assert!(started.is_some_and(|s| s.is_started()));

    // Already saving: not checked again.
    let checks = target.checks.load(Ordering::SeqCst);
    assert!(f.registry.snipe(&ctx, &tracked).await.unwrap().is_none());
    assert_eq!(target.checks.load(Ordering::SeqCst), checks);

    f.shutdown.drain(Duration::from_secs(5)).await;
}

#[tokio::test]
async fn test_remove_cancels_recording() {
    let f = fixture();
    let ctx = f.shutdown.token();
    let target = MockTarget::live("dave");
    f.module.prepare(target.clone());

    f.registry.add_target(&ctx, &link("dave")).await.unwrap();
    let tracked = f.registry.get(&link("dave")).unwrap();
    assert_eq!(tracked.status(), SaveStatus::Running);

    f.registry.remove_target(&ctx, &link("dave")).await.unwrap();
    assert!(!f.registry.contains(&link("dave")));

    let canceled = wait_until(Duration::from_secs(5), || {
        tracked.status() == SaveStatus::Canceled
    })
    .await;
    assert!(canceled);
    assert!(f.registry.saver().tasks().is_empty());
    assert_eq!(target.ends(), 1);

    let err = f
        .registry
        .remove_target(&ctx, &link("dave"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotTracked(_)));
}

/// Add a live `name` with slow checks on a background task, returning once
/// its first check is running.
async fn add_while_checking(
    f: &Fixture,
    name: &str,
) -> (Arc<MockTarget>, tokio::task::JoinHandle<autosr::Result<()>>) {
    let target = MockTarget::live(name);
    target.set_delay(Duration::from_millis(300));
    f.module.prepare(target.clone());

    let registry = Arc::clone(&f.registry);
    let ctx = f.shutdown.token();
    let link = link(name);
    let adding = tokio::spawn(async move { registry.add_target(&ctx, &link).await });
    let checking = wait_until(Duration::from_secs(5), || {
        target.checks.load(Ordering::SeqCst) == 1
    })
    .await;
    assert!(checking);
    (target, adding)
}

#[tokio::test]
async fn test_remove_during_check_drops_the_attempt() {
    let f = fixture();
    let ctx = f.shutdown.token();
    let (target, adding) = add_while_checking(&f, "kate").await;

    f.registry.remove_target(&ctx, &link("kate")).await.unwrap();
    adding.await.unwrap().unwrap();

    assert!(!f.registry.contains(&link("kate")));
    assert!(f.registry.saver().tasks().is_empty());
    assert_eq!(target.begins(), 0);
    assert_eq!(f.shutdown.in_flight(), 0);
    assert!(recordings_of(&f, "kate").is_empty());
}

#[tokio::test]
async fn test_cancel_during_check_drops_only_that_attempt() {
    let f = fixture();
    let ctx = f.shutdown.token();
    let (target, adding) = add_while_checking(&f, "leo").await;

    f.registry.cancel_target(&link("leo")).unwrap();
    adding.await.unwrap().unwrap();

    let tracked = f.registry.get(&link("leo")).unwrap();
    assert!(f.registry.saver().tasks().is_empty());
    assert_eq!(tracked.status(), SaveStatus::Idle);
    assert!(tracked.started_at().is_none());
    assert_eq!(target.begins(), 0);

    target.set_delay(Duration::ZERO);
    let started = f.registry.snipe(&ctx, &tracked).await.unwrap();
    assert!(started.is_some_and(|s| s.is_started()));
    assert_eq!(target.begins(), 1);

    f.shutdown.drain(Duration::from_secs(5)).await;
}

#[tokio::test]
async fn test_concurrent_adds_and_polls_check_once() {
    let f = fixture();
    let ctx = f.shutdown.token();
    let (target, adding) = add_while_checking(&f, "mia").await;

    let again = {
        let registry = Arc::clone(&f.registry);
        let ctx = ctx.clone();
        tokio::spawn(async move { registry.add_target(&ctx, &link("mia")).await })
    };
    let poller = Poller::new(Arc::clone(&f.registry), Duration::from_secs(60));
    assert_eq!(poller.poll_once(&ctx), 0);
    let tracked = f.registry.get(&link("mia")).unwrap();
    assert!(f.registry.snipe(&ctx, &tracked).await.unwrap().is_none());

    adding.await.unwrap().unwrap();
    again.await.unwrap().unwrap();
    assert_eq!(f.registry.len(), 1);
    assert_eq!(target.checks.load(Ordering::SeqCst), 1);
    assert_eq!(target.begins(), 1);
    assert!(f.registry.saver().is_saving(&link("mia")));

    f.shutdown.drain(Duration::from_secs(5)).await;
}

fn recordings_of(f: &Fixture, name: &str) -> Vec<std::fs::DirEntry> {
    std::fs::read_dir(f.dir.path().join("recordings").join(name))
        .map(|entries| entries.filter_map(|e| e.ok()).collect())
        .unwrap_or_default()
}

#[tokio::test]
async fn test_remove_reports_module_failure_but_forgets_target() {
    let f = fixture();
    let ctx = f.shutdown.token();
    f.registry.add_target(&ctx, &link("erin")).await.unwrap();
    f.module.fail_remove.store(true, Ordering::SeqCst);

    let err = f
        .registry
        .remove_target(&ctx, &link("erin"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Module { .. }));
    assert!(f.registry.is_empty());
}

#[tokio::test]
async fn test_cancel_keeps_target_tracked() {
    let f = fixture();
    let ctx = f.shutdown.token();
    let target = MockTarget::live("frank");
    f.module.prepare(target.clone());
    f.registry.add_target(&ctx, &link("frank")).await.unwrap();

    f.registry.cancel_target(&link("frank")).unwrap();
    assert!(
        wait_until(Duration::from_secs(5), || f.registry.saver().tasks().is_empty()).await
    );
    assert!(f.registry.contains(&link("frank")));

    // A fresh cancellation token lets the next check record again.
    let tracked = f.registry.get(&link("frank")).unwrap();
    let restarted = f.registry.snipe(&ctx, &tracked).await.unwrap();
    assert!(restarted.is_some_and(|s| s.is_started()));
    assert_eq!(tracked.status(), SaveStatus::Running);
    assert!(tracked.finished_at().is_none());

    assert!(matches!(
        f.registry.cancel_target(&link("nobody")),
        Err(Error::NotTracked(_))
    ));
    f.shutdown.drain(Duration::from_secs(5)).await;
}

#[tokio::test]
async fn test_unknown_host_is_rejected() {
    let f = fixture();
    let ctx = f.shutdown.token();
    let err = f
        .registry
        .add_target(&ctx, "https://elsewhere.org/alice")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NoModuleForHost(_)));
    assert!(f.registry.is_empty());
}

#[tokio::test]
async fn test_poll_starts_targets_that_went_live() {
    let f = fixture();
    let ctx = f.shutdown.token();
    let target = MockTarget::offline("grace");
    f.module.prepare(target.clone());
    f.registry.add_target(&ctx, &link("grace")).await.unwrap();

    target.set_fallback(Check::Live("cdn.example.com/grace.m3u8".into()));
    let poller = Poller::new(Arc::clone(&f.registry), Duration::from_secs(60));
    assert_eq!(poller.poll_once(&ctx), 1);

    let saving = wait_until(Duration::from_secs(5), || {
        f.registry.saver().is_saving(&link("grace"))
    })
    .await;
    assert!(saving);
    assert_eq!(poller.poll_once(&ctx), 0);

    f.shutdown.drain(Duration::from_secs(5)).await;
}

#[tokio::test]
async fn test_track_list_reload_follows_file() {
    let f = fixture();
    let ctx = f.shutdown.token();
    let path = f.dir.path().join("track_list");
    let list = TrackList::new(&path, Arc::clone(&f.registry));

    let summary = list.reload(&ctx).await.unwrap();
    assert_eq!(summary.added.len(), 0);

    std::fs::write(
        &path,
        format!(
            "# followed\n{}\n\n{}\nhttps://elsewhere.org/x\n",
            link("heidi"),
            link("ivan")
        ),
    )
    .unwrap();
    let summary = list.reload(&ctx).await.unwrap();
    assert_eq!(summary.added.len(), 2);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(f.registry.links(), vec![link("heidi"), link("ivan")]);

    std::fs::write(&path, format!("{}\n", link("ivan"))).unwrap();
    let summary = list.reload(&ctx).await.unwrap();
    assert_eq!(summary.removed.len(), 1);
    assert_eq!(f.registry.links(), vec![link("ivan")]);
}

#[tokio::test]
async fn test_track_list_watch_picks_up_edits() {
    let f = fixture();
    let ctx = f.shutdown.token();
    let path = f.dir.path().join("watched_list");
    let list = Arc::new(TrackList::new(&path, Arc::clone(&f.registry)));
    list.ensure_exists().await.unwrap();
    list.watch(ctx.clone()).unwrap();

    std::fs::write(&path, format!("{}\n", link("judy"))).unwrap();
    let added = wait_until(Duration::from_secs(10), || {
        f.registry.contains(&link("judy"))
    })
    .await;
    assert!(added);

    f.shutdown.drain(Duration::from_secs(5)).await;
}

// Tests for IncrementalWatcher driven by a manual change source

use super::support::{eventually, workload, Fixture, ManualSources};
use podsync::sync::{
    BulkTransport, ChangeKind, ExclusionConfig, IncrementalWatcher, SessionState, SyncError,
    WatchHandle, WatchOptions,
};
use std::sync::Arc;
use std::time::Duration;

const DEBOUNCE: Duration = Duration::from_millis(50);

fn watcher(fx: &Fixture, sources: &ManualSources) -> IncrementalWatcher {
    IncrementalWatcher::new(
        BulkTransport::new(fx.executor()),
        Arc::new(sources.clone()),
        WatchOptions { debounce: DEBOUNCE },
    )
}

async fn start(fx: &Fixture, sources: &ManualSources, exclusion: ExclusionConfig) -> WatchHandle {
    watcher(fx, sources)
        .start(&fx.local, workload(), &exclusion)
        .await
        .unwrap()
}

fn exclusion(fx: &Fixture, patterns: &[&str], use_ignore_file: bool) -> ExclusionConfig {
    ExclusionConfig::new(
        &fx.local,
        patterns.iter().map(|p| p.to_string()).collect(),
        use_ignore_file,
    )
}

#[tokio::test]
async fn test_start_runs_initial_sync_and_subscribes() {
    let fx = Fixture::new();
    fx.write("src/main.rs", "fn main() {}");
    fx.write("node_modules/pkg/index.js", "x");
    let sources = ManualSources::default();

    let handle = start(&fx, &sources, exclusion(&fx, &["node_modules/"], false)).await;

    assert_eq!(handle.state(), SessionState::Watching);
    assert_eq!(handle.remote_root(), "/workspace");
    assert!(fx.remote.path("/workspace/src/main.rs").exists());

    let subscribed = sources.subscribed();
    assert!(subscribed.contains(&fx.local));
    assert!(subscribed.contains(&fx.local.join("src")));
    assert!(!subscribed.iter().any(|d| d.starts_with(fx.local.join("node_modules"))));

    handle.stop().await;
}

#[tokio::test]
async fn test_change_round_trip() {
    let fx = Fixture::new();
    fx.write("src/main.rs", "fn main() {}");
    let sources = ManualSources::default();
    let handle = start(&fx, &sources, exclusion(&fx, &[], false)).await;

    let path = fx.write("src/new.rs", "pub struct New;");
    sources.emit(ChangeKind::Created, &path);

    let remote = fx.remote.clone();
    assert!(
        eventually(|| {
            let remote = remote.clone();
            async move { remote.read("/workspace/src/new.rs").as_deref() == Some("pub struct New;") }
        })
        .await
    );
    assert_eq!(fx.remote.copies_into("/workspace/src"), 1);

    handle.stop().await;
}

#[tokio::test]
async fn test_excluded_changes_never_propagate() {
    let fx = Fixture::new();
    fx.write("node_modules/pkg/index.js", "v1");
    fx.write(".gitignore", "*.secret\n");
    let sources = ManualSources::default();
    let handle = start(&fx, &sources, exclusion(&fx, &["node_modules/"], true)).await;

    let excluded = fx.write("node_modules/pkg/index.js", "v2");
    let ignored = fx.write("keys.secret", "hunter2");
    sources.emit(ChangeKind::Written, &excluded);
    sources.emit(ChangeKind::Created, &ignored);
    tokio::time::sleep(DEBOUNCE * 6).await;

    assert!(!fx.remote.path("/workspace/node_modules").exists());
    assert!(!fx.remote.path("/workspace/keys.secret").exists());
    assert!(fx.remote.calls().iter().all(|argv| argv[1] != "-xf"));

    handle.stop().await;
}

#[tokio::test]
async fn test_rapid_writes_coalesce_into_one_copy() {
    let fx = Fixture::new();
    let path = fx.write("notes.md", "draft 0");
    let sources = ManualSources::default();
    let handle = start(&fx, &sources, exclusion(&fx, &[], false)).await;

    for i in 1..=10 {
        std::fs::write(&path, format!("draft {}", i)).unwrap();
        sources.emit(ChangeKind::Written, &path);
    }

    let remote = fx.remote.clone();
    assert!(
        eventually(|| {
            let remote = remote.clone();
            async move { remote.copies_into("/workspace") == 1 }
        })
        .await
    );
    tokio::time::sleep(DEBOUNCE * 4).await;

    assert_eq!(fx.remote.copies_into("/workspace"), 1);
    assert_eq!(fx.remote.read("/workspace/notes.md").as_deref(), Some("draft 10"));

    handle.stop().await;
}

#[tokio::test]
async fn test_non_content_events_are_ignored() {
    let fx = Fixture::new();
    let path = fx.write("a.txt", "a");
    let sources = ManualSources::default();
    let handle = start(&fx, &sources, exclusion(&fx, &[], false)).await;

    sources.emit(ChangeKind::Removed, &path);
    sources.emit(ChangeKind::Other, &path);
    sources.emit_error("queue overflow");
    tokio::time::sleep(DEBOUNCE * 4).await;

    assert_eq!(fx.remote.copies_into("/workspace"), 0);
    assert_eq!(handle.state(), SessionState::Watching);

    handle.stop().await;
}

#[tokio::test]
async fn test_new_directory_is_watched_and_synced() {
    let fx = Fixture::new();
    let sources = ManualSources::default();
    let handle = start(&fx, &sources, exclusion(&fx, &["target/"], false)).await;

    fx.write("pkg/inner/lib.rs", "mod inner;");
    fx.write("pkg/target/out.bin", "binary");
    sources.emit(ChangeKind::Created, fx.local.join("pkg"));

    let remote = fx.remote.clone();
    assert!(
        eventually(|| {
            let remote = remote.clone();
            async move { remote.read("/workspace/pkg/inner/lib.rs").is_some() }
        })
        .await
    );

    let subscribed = sources.subscribed();
    assert!(subscribed.contains(&fx.local.join("pkg")));
    assert!(subscribed.contains(&fx.local.join("pkg/inner")));
    assert!(!subscribed.contains(&fx.local.join("pkg/target")));
    assert!(!fx.remote.path("/workspace/pkg/target").exists());

    handle.stop().await;
}

#[tokio::test]
async fn test_copy_failure_does_not_stop_the_loop() {
    let fx = Fixture::new();
    fx.write("broken/x.txt", "x");
    fx.write("ok/y.txt", "y");
    let sources = ManualSources::default();
    let handle = start(&fx, &sources, exclusion(&fx, &[], false)).await;
    fx.remote.fail_under("/workspace/broken");

    let broken = fx.write("broken/x.txt", "x2");
    let ok = fx.write("ok/y.txt", "y2");
    sources.emit(ChangeKind::Written, &broken);
    sources.emit(ChangeKind::Written, &ok);

    let remote = fx.remote.clone();
    assert!(
        eventually(|| {
            let remote = remote.clone();
            async move { remote.read("/workspace/ok/y.txt").as_deref() == Some("y2") }
        })
        .await
    );
    assert_eq!(fx.remote.read("/workspace/broken/x.txt").as_deref(), Some("x"));
    assert_eq!(handle.state(), SessionState::Watching);

    let later = fx.write("ok/z.txt", "z");
    sources.emit(ChangeKind::Created, &later);
    let remote = fx.remote.clone();
    assert!(
        eventually(|| {
            let remote = remote.clone();
            async move { remote.read("/workspace/ok/z.txt").is_some() }
        })
        .await
    );

    handle.stop().await;
}

#[tokio::test]
async fn test_vanished_file_is_skipped() {
    let fx = Fixture::new();
    let sources = ManualSources::default();
    let handle = start(&fx, &sources, exclusion(&fx, &[], false)).await;

    let path = fx.write("tmp.txt", "short-lived");
    sources.emit(ChangeKind::Created, &path);
    std::fs::remove_file(&path).unwrap();
    tokio::time::sleep(DEBOUNCE * 4).await;

    assert_eq!(fx.remote.copies_into("/workspace"), 0);
    handle.stop().await;
}

#[tokio::test]
async fn test_closed_event_stream_stops_session() {
    let fx = Fixture::new();
    let sources = ManualSources::default();
    let handle = start(&fx, &sources, exclusion(&fx, &[], false)).await;

    sources.close();

    let stopped = eventually(|| {
        let state = handle.state();
        async move { state == SessionState::Stopped }
    })
    .await;
    assert!(stopped);

    handle.stop().await;
}

#[tokio::test]
async fn test_subscription_failure_aborts_start() {
    let fx = Fixture::new();
    fx.write("a.txt", "a");
    let sources = ManualSources::failing();

    let err = watcher(&fx, &sources)
        .start(&fx.local, workload(), &exclusion(&fx, &[], false))
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Subscribe { .. }));
}

#[tokio::test]
async fn test_initial_sync_failure_aborts_start() {
    let fx = Fixture::new();
    fx.write("a.txt", "a");
    fx.remote.fail_under("/workspace");
    let sources = ManualSources::default();

    let err = watcher(&fx, &sources)
        .start(&fx.local, workload(), &exclusion(&fx, &[], false))
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Transfer { .. }));
    assert_eq!(sources.opened(), 0);
}

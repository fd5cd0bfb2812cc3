// Tests for BulkTransport against the fake remote

use super::support::{workload, Fixture};
use podsync::sync::{BulkTransport, ExclusionConfig, SyncError};

#[tokio::test]
async fn test_transfer_mirrors_tree_with_excludes() {
    let fx = Fixture::new();
    fx.write("src/main.rs", "fn main() {}");
    fx.write("src/lib/util.rs", "pub fn util() {}");
    fx.write("node_modules/react/index.js", "module.exports = {}");
    fx.write(".git/HEAD", "ref: refs/heads/main");
    fx.write("build.log", "noise");

    let transport = BulkTransport::new(fx.executor());
    let exclusion = ExclusionConfig::new(
        &fx.local,
        vec!["node_modules/".to_string(), "*.log".to_string()],
        false,
    );
    let stats = transport.transfer(&fx.local, &workload(), &exclusion).await.unwrap();

    assert_eq!(fx.remote.read("/workspace/src/main.rs").as_deref(), Some("fn main() {}"));
    assert_eq!(
        fx.remote.read("/workspace/src/lib/util.rs").as_deref(),
        Some("pub fn util() {}")
    );
    assert!(!fx.remote.path("/workspace/node_modules").exists());
    assert!(!fx.remote.path("/workspace/.git").exists());
    assert!(!fx.remote.path("/workspace/build.log").exists());
    assert_eq!(stats.files, 2);
}

#[tokio::test]
async fn test_transfer_does_not_apply_ignore_file() {
    let fx = Fixture::new();
    fx.write(".gitignore", "secrets.env\n");
    fx.write("secrets.env", "TOKEN=1");
    fx.write("app.py", "print('hi')");

    let transport = BulkTransport::new(fx.executor());
    let exclusion = ExclusionConfig::new(&fx.local, vec![], true);
    transport.transfer(&fx.local, &workload(), &exclusion).await.unwrap();

    assert!(fx.remote.path("/workspace/app.py").exists());
    assert!(fx.remote.path("/workspace/secrets.env").exists());
    assert!(fx.remote.path("/workspace/.gitignore").exists());
}

#[tokio::test]
async fn test_transfer_creates_target_then_extracts() {
    let fx = Fixture::new();
    fx.write("a.txt", "a");

    let transport = BulkTransport::new(fx.executor()).with_workspace_root("/home/dev/project");
    let exclusion = ExclusionConfig::with_defaults(&fx.local);
    transport.transfer(&fx.local, &workload(), &exclusion).await.unwrap();

    let calls = fx.remote.calls();
    assert_eq!(calls[0], vec!["mkdir", "-p", "/home/dev/project"]);
    assert_eq!(calls[1], vec!["tar", "-xzf", "-", "-C", "/home/dev/project"]);
    assert_eq!(fx.remote.read("/home/dev/project/a.txt").as_deref(), Some("a"));
}

#[tokio::test]
async fn test_transfer_missing_root() {
    let fx = Fixture::new();
    let missing = fx.local.join("does-not-exist");

    let transport = BulkTransport::new(fx.executor());
    let err = transport
        .transfer(&missing, &workload(), &ExclusionConfig::with_defaults(&missing))
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::LocalRootNotFound { .. }));
    assert!(fx.remote.calls().is_empty());
}

#[tokio::test]
async fn test_transfer_remote_failure() {
    let fx = Fixture::new();
    fx.write("a.txt", "a");
    fx.remote.fail_under("/workspace");

    let transport = BulkTransport::new(fx.executor());
    let err = transport
        .transfer(&fx.local, &workload(), &ExclusionConfig::with_defaults(&fx.local))
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Transfer { .. }));
    assert!(err.to_string().contains("/workspace"));
}

#[tokio::test]
async fn test_initial_sync_to_custom_path() {
    let fx = Fixture::new();
    fx.write("tools/fmt.sh", "#!/bin/sh");

    let transport = BulkTransport::new(fx.executor());
    let source = fx.local.join("tools");
    transport
        .initial_sync_to_custom_path(
            &source,
            &workload(),
            "/opt/tools",
            &ExclusionConfig::with_defaults(&source),
        )
        .await
        .unwrap();

    assert_eq!(fx.remote.read("/opt/tools/fmt.sh").as_deref(), Some("#!/bin/sh"));
    assert!(!fx.remote.path("/workspace").exists());
}

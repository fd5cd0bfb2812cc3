mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};

use cli::{Cli, Commands, Target};
use podsync::config::Settings;
use podsync::k8s::{K8sClient, RemoteExecutor, Workload};
use podsync::logging::init_logging;
use podsync::sync::{
    BulkTransport, IncrementalWatcher, NotifySourceFactory, SessionRequest, SyncSessionRegistry,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Push { target, path } => {
            let (transport, workload) = connect(&target, &mut settings).await?;
            let root = std::path::absolute(&path)
                .with_context(|| format!("Invalid path {}", path.display()))?;
            transport
                .transfer(&root, &workload, &settings.exclusion(&root))
                .await?;
        }

        Commands::Watch {
            target,
            path,
            name,
            debounce_ms,
            no_custom_dirs,
        } => {
            if let Some(ms) = debounce_ms {
                settings.debounce_ms = ms;
            }
            let (transport, workload) = connect(&target, &mut settings).await?;
            let watcher = IncrementalWatcher::new(
                transport,
                Arc::new(NotifySourceFactory),
                settings.watch_options(),
            );
            let registry = SyncSessionRegistry::new(watcher);

            let root = std::path::absolute(&path)
                .with_context(|| format!("Invalid path {}", path.display()))?;

            if !no_custom_dirs && !settings.custom_dirs.is_empty() {
                let units = settings.custom_units();
                if let Err(e) = registry
                    .sync_custom_dirs(&units, &workload, &settings.exclusion(&root))
                    .await
                {
                    warn!("{}", e);
                }
            }

            let name = name.unwrap_or_else(|| target.pod.clone());
            let request = SessionRequest::new(name, &root, workload)
                .with_exclusion(settings.exclusion(&root));
            let session = registry.start(request).await?;
            info!(
                "Session '{}' watching {} (Ctrl-C to stop)",
                session.name,
                session.local_root.display()
            );

            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl-C")?;
            info!("Shutting down");
            registry.stop_all().await;
        }

        Commands::CustomDirs { target } => {
            let (transport, workload) = connect(&target, &mut settings).await?;
            let registry = SyncSessionRegistry::new(IncrementalWatcher::new(
                transport,
                Arc::new(NotifySourceFactory),
                settings.watch_options(),
            ));

            let base = std::env::current_dir().context("Failed to read current directory")?;
            let report = registry
                .sync_custom_dirs(&settings.custom_units(), &workload, &settings.exclusion(&base))
                .await?;
            info!("{}/{} custom directories synced", report.synced, report.total);
        }
    }

    Ok(())
}

/// Apply command-line overrides and connect to the cluster.
async fn connect(target: &Target, settings: &mut Settings) -> Result<(BulkTransport, Workload)> {
    if let Some(namespace) = &target.namespace {
        settings.namespace = Some(namespace.clone());
    }
    if let Some(container) = &target.container {
        settings.container = Some(container.clone());
    }
    if let Some(root) = &target.workspace_root {
        settings.workspace_root = root.clone();
    }

    let k8s = K8sClient::new().await?;
    let namespace = settings
        .namespace
        .clone()
        .unwrap_or_else(|| k8s.default_namespace().to_string());

    let mut workload = Workload::new(namespace, target.pod.clone());
    if let Some(container) = &settings.container {
        workload = workload.with_container(container.clone());
    }

    let executor: Arc<dyn RemoteExecutor> = Arc::new(k8s.executor());
    let transport = BulkTransport::new(executor).with_workspace_root(settings.workspace_root.clone());
    Ok((transport, workload))
}

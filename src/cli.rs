use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "podsync")]
#[command(about = "Mirror a local working tree into a Kubernetes dev pod", long_about = None)]
pub struct Cli {
    /// Config file (defaults to ~/.config/podsync/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Where to sync to.
#[derive(Args, Debug, Clone)]
pub struct Target {
    /// Pod to sync into
    pub pod: String,

    /// Namespace of the pod (defaults to config, then kubeconfig context)
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// Container inside the pod
    #[arg(short, long)]
    pub container: Option<String>,

    /// Remote workspace directory
    #[arg(long)]
    pub workspace_root: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Copy the local tree to the pod once
    Push {
        #[command(flatten)]
        target: Target,

        /// Local directory to sync
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Copy the local tree, then keep copying changes until Ctrl-C
    Watch {
        #[command(flatten)]
        target: Target,

        /// Local directory to sync
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Session name (defaults to the pod name)
        #[arg(long)]
        name: Option<String>,

        /// Debounce window in milliseconds
        #[arg(long)]
        debounce_ms: Option<u64>,

        /// Skip the configured custom directories
        #[arg(long)]
        no_custom_dirs: bool,
    },

    /// Sync the custom directories declared in the config file
    CustomDirs {
        #[command(flatten)]
        target: Target,
    },
}

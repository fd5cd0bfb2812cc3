pub mod client;
pub mod exec;
pub mod pod;

pub use client::K8sClient;
pub use exec::{ExecOutput, InputStream, RemoteExecutor, Workload};
pub use pod::PodExecutor;

// Library module for podsync
// Re-exports modules for use in integration tests and the binary

pub mod config;
pub mod k8s;
pub mod logging;
pub mod sync;

// Test module entry point for sync tests
// Remote side is simulated by support::FakeRemote


mod bulk_tests;
mod watcher_tests;

use tracing_subscriber::{EnvFilter, fmt};

/// Install a test-friendly subscriber once. Verbosity follows `TEST_LOG`,
/// e.g. `TEST_LOG=kube_fixtures=debug`.
pub fn trace_init() {
    let filter = EnvFilter::try_from_env("TEST_LOG").unwrap_or_else(|_| EnvFilter::new("off"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

#[test]
fn test_log() {
    trace_init();
    tracing::info!(message = "Log works.");
}

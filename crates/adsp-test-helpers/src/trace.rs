//! Test log capture.

use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber that writes through the test harness, so logs
/// only show for failing tests. Filter with `RUST_LOG`; defaults to `warn`.
/// Safe to call from every test.
pub fn init_test_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

//! Shared helpers for bridge integration tests.

use std::sync::Once;

static TRACING: Once = Once::new();

/// Install an env-filtered fmt subscriber once per test binary.
///
/// Set `RUST_LOG=tidepool_bridge=debug` to see worker traffic.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "warn".into()),
            )
            .with_test_writer()
            .try_init();
    });
}

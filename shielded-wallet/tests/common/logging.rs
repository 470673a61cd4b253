use std::sync::Once;

static INIT: Once = Once::new();

/// Route wallet tracing to the test output; `RUST_LOG` picks the level
pub fn init() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

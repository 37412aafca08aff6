//! Diagnostic tracing setup.
//!
//! Diagnostics always go to stderr. The build log (scanner output, provisioning
//! progress) is a separate sink, see `launcher::BuildLog`.
use std::sync::Once;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Install the global subscriber; later calls are ignored.
pub fn init_tracing() {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let fmt_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false);
        // A subscriber installed by an embedding process wins.
        let _ = tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init();
    });
}

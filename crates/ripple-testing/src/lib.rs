#![warn(
    rust_2018_idioms,
    nonstandard_style,
    future_incompatible,
    clippy::mod_module_files,
    clippy::print_stdout,
    clippy::print_stderr
)]

mod recorder;

pub use recorder::*;
use tracing_subscriber::prelude::__tracing_subscriber_SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

static INIT_TEST_LOGGING: std::sync::Once = std::sync::Once::new();

/// Install a test subscriber the first time it is called.
///
/// Every test calls this, directly or through its fixture. `RUST_LOG`
/// overrides the default filter.
pub fn init_test_logging() {
    INIT_TEST_LOGGING.call_once(|| {
        let fmt_layer = tracing_subscriber::fmt::layer().with_test_writer();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("ripple_=trace,info"));

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .with(tracing_error::ErrorLayer::default())
            .try_init()
            .unwrap();
    });
}

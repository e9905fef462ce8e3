//! Tracing setup for binaries and tests

use once_cell::sync::OnceCell;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

static INIT: OnceCell<()> = OnceCell::new();

/// Install the global tracing subscriber. Safe to call more than once; only
/// the first call takes effect. The filter honors `RUST_LOG`, falling back
/// to `default_level`.
pub fn init_logging(default_level: &str) {
    let default_level = default_level.to_string();
    INIT.get_or_init(|| {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| default_level.into()),
            )
            .with(tracing_subscriber::fmt::layer())
            .init();
    });
}

//! Tracing subscriber setup for binaries embedding the scaffold.

use tracing_subscriber::EnvFilter;

pub const DEFAULT_FILTER: &str = "crud_scaffold=info,scaffold_app=info,tower_http=info";

/// Install the global fmt subscriber. `RUST_LOG` overrides [`DEFAULT_FILTER`].
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
        )
        .init();
}

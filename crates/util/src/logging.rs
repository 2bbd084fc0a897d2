// SPDX-License-Identifier: PolyForm-Shield-1.0

use tracing_subscriber::EnvFilter;

/// Install a `tracing-subscriber` fmt layer, honoring `RUST_LOG` and
/// falling back to `info` for every target when it's unset.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}

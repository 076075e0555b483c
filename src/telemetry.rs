//! Process-wide `tracing` setup, mirroring the gateway's `init_tracing`:
//! JSON output, `RUST_LOG` honored, a sane default filter otherwise.

use tracing_subscriber::EnvFilter;

pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,agentctl=debug")),
        )
        .json()
        .init();
}

//! Logging / diagnostics (C10, ambient).
//!
//! Every component emits `tracing` spans/events at a consistent granularity
//! across the request path: `#[instrument]` on `dispatch`,
//! `post`, `call` and the accept loop; `debug!`/`trace!` for payload shapes;
//! `warn!`/`error!` for transport and lifecycle failures. Library code never
//! calls [`init_tracing`] implicitly -- it's offered for embedding binaries and
//! test harnesses that want readable output.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Install a global `tracing` subscriber driven by `RUST_LOG` (default
/// `info`), formatting to stdout. Safe to call more than once; subsequent
/// calls are no-ops if a global subscriber is already set.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::registry().with(filter).with(tracing_subscriber::fmt::layer());
    // A test harness may call this from multiple test threads; ignore the
    // "already set" error rather than panicking.
    let _ = subscriber.try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_tracing_does_not_panic_when_called_repeatedly() {
        init_tracing();
        init_tracing();
    }
}

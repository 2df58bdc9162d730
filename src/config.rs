//! Ambient server configuration (C9).
//!
//! `ServerConfig` carries the tunables the embedding program chooses at
//! construction time. There is intentionally no file/env loader here: SS6
//! states this library has no persisted state and no environment variables --
//! the embedding binary is responsible for building a `ServerConfig` however it
//! likes (hardcoded, `clap`, a config file, whatever -- out of scope for this
//! crate) and handing it to [`crate::server::Server::new`].

use std::net::SocketAddr;
use std::time::Duration;

/// Server-side runtime tunables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: SocketAddr,
    /// Bounded worker-pool capacity (SS5); design target ~10,000 in-flight
    /// requests, enforced with a [`tower::limit::ConcurrencyLimitLayer`].
    pub worker_capacity: usize,
    /// Listener backlog (SS5, design: 1000). Advisory: the in-process
    /// `TcpListener` used here defers to the OS default backlog, so this field
    /// is carried for introspection/documentation rather than enforced
    /// directly -- see `DESIGN.md` for why no socket2-style backlog knob was
    /// added to the dependency stack.
    pub listener_backlog: u32,
    /// Default per-call client-side deadline. `None` means "no default
    /// timeout", matching "the server does not impose a per-method deadline".
    /// Applied when a [`crate::proxy::Client`] is built via
    /// [`crate::server::Server::client`]; a `Client` built directly from
    /// [`crate::proxy::Client::connect`] is unaffected.
    pub call_timeout: Option<Duration>,
    /// Debug flag analogous to a packet-capture toggle: when set, the
    /// dispatcher logs request bodies at `trace!` instead of only their shape.
    pub capture_requests: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_address: "127.0.0.1:0".parse().expect("static address parses"),
            worker_capacity: 10_000,
            listener_backlog: 1_000,
            call_timeout: None,
            capture_requests: false,
        }
    }
}

impl ServerConfig {
    /// Convenience constructor for the common case of "bind to this address,
    /// defaults for everything else".
    pub fn bind_to(address: SocketAddr) -> Self {
        ServerConfig { bind_address: address, ..ServerConfig::default() }
    }
}

//! An HTTP-framed RPC runtime: remote object invocation (RMI) plus a typed,
//! schema-declared message layer, over plain HTTP/1.1 keep-alive connections.
//!
//! A server registers named objects -- dispatch tables of method name to
//! handler closure -- under the [`registry`]. Clients obtain a [`proxy::Proxy`]
//! to a named object and call methods on it; a call returns either a primitive
//! [`codec::Value`], a handle to a newly minted server-side object, or a
//! reraised remote exception. A second, simpler surface ([`proxy::MessageStub`])
//! exposes [`message::Message`] types routed by method name, with no object
//! identity, for fixed request/response shapes that don't need RMI.
//!
//! See `DESIGN.md` for how each module here is grounded in prior art.

pub mod channel;
pub mod codec;
pub mod config;
pub mod dispatcher;
pub mod envelope;
pub mod error;
pub mod logging;
pub mod message;
pub mod proxy;
pub mod registry;
pub mod server;
#[cfg(test)]
mod tests;

pub use channel::Channel;
pub use codec::Value;
pub use config::ServerConfig;
pub use envelope::{ExceptionInfo, ServerErrorResponse, ServerOutcome, ServerRequest, ServerResponse};
pub use error::{CodecError, RpcError, TransportErrorKind};
pub use message::{FieldSpec, Message, Schema};
pub use proxy::{CallOutcome, Client, MessageStub, Proxy};
pub use registry::{DispatchResult, MethodFn, MethodOutcome, MethodTable, ObjectId, ObjectRegistry};
pub use server::{MessageRoute, Server};

/// Internal design target for in-flight requests per server (SS5); enforced
/// via `ConcurrencyLimitLayer` in [`server::Server::new`], not a hard cap in
/// this constant itself.
pub const WORKER_CAPACITY: usize = 10_000;

/// The listener backlog design target (SS5).
pub const LISTENER_BACKLOG: u32 = 1_000;

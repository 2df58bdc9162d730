//! Error types shared across the codec, registry, transport and proxy layers.
//!
//! Every failure mode the runtime can produce is a variant of [`RpcError`] so call
//! sites can match on a single type while `#[error("...")]` messages stay readable
//! in logs. See the error taxonomy for which variants cross the wire and which stay
//! local to the caller.

use std::net::SocketAddr;

use thiserror::Error;

/// Unified error type for the whole runtime.
///
/// `SchemaError` and `LifecycleError` never cross the wire; everything else either
/// originates from, or is translated into, an HTTP status code or an `exc_info`
/// payload by the dispatcher.
#[derive(Debug, Error)]
pub enum RpcError {
    /// A [`crate::message::Message`] field assignment or `validate()` failed.
    #[error("schema error: {0}")]
    Schema(String),

    /// `encode`/`decode` failed, or the value wasn't representable on the wire.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Connect/write/read/timeout/non-200 status talking to a remote endpoint.
    #[error("transport error talking to {endpoint}: {kind}")]
    Transport {
        endpoint: SocketAddr,
        kind: TransportErrorKind,
    },

    /// The registry has no entry for the requested objectid.
    #[error("no such object: {0}")]
    NotFound(String),

    /// A remote method raised; the message quotes the remote traceback, prefixed
    /// with the endpoint it came from.
    #[error("{0}")]
    Remote(String),

    /// Double-start, double-stop, or a call made before the server is listening.
    #[error("lifecycle error: {0}")]
    Lifecycle(String),
}

/// The concrete flavor of [`RpcError::Transport`].
#[derive(Debug, Error)]
pub enum TransportErrorKind {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("write failed: {0}")]
    Write(String),
    #[error("read failed: {0}")]
    Read(String),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("call timed out")]
    Timeout,
}

/// Failures from [`crate::codec`] encode/decode.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CodecError {
    #[error("value could not be serialized: {0}")]
    Encode(String),
    #[error("bytes could not be deserialized: {0}")]
    Decode(String),
    #[error("value nests deeper than the codec's depth guard allows")]
    TooDeep,
    #[error("value is not representable on the wire (e.g. a client-side proxy)")]
    NotSerializable,
}

/// Render a caught panic payload as `exc_info.traceback` text (SS9, "Exception
/// tracebacks"): a `&str`/`String` payload -- the overwhelming majority of
/// `panic!`/`assert!` calls -- is used verbatim; a payload of any other
/// concrete type is already erased to `dyn Any` by the time it reaches here,
/// so there's no static type name left to recover and the fallback says so
/// plainly. Shared by the registry's and dispatcher's panic barriers so both
/// attribute the same text to the same field.
pub fn panic_payload_text(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

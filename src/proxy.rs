//! Client proxy (C8) and typed-message stub (C8').
//!
//! Per SS9's redesign note, the source's dynamic attribute interception
//! (`client.obj.method(args)`) becomes an explicit call site:
//! `client.object("obj").call(method, args, kw)`. `Proxy` is deliberately never
//! `Serialize` -- attempting to pass one through [`crate::codec`] fails at
//! compile time rather than at runtime, which is strictly stronger than the
//! source's runtime guarantee.

use std::collections::BTreeMap;
use std::net::SocketAddr;

use reqwest::StatusCode;

use crate::channel::Channel;
use crate::codec::{self, Value};
use crate::envelope::{ExceptionInfo, ServerOutcome, ServerRequest, ServerResponse};
use crate::error::{RpcError, TransportErrorKind};
use crate::message::{Message, MessageWire, Schema};

/// Render a remote exception the way the original client did: `endpoint:
/// exception: message`, then each line of `traceback` on its own line
/// prefixed with `endpoint --` (SS4.8). Shared by [`Proxy::call`] and
/// [`MessageStub::send`] so both variants quote remote errors identically.
fn format_remote_error(endpoint: SocketAddr, info: &ExceptionInfo) -> String {
    let header = format!("{endpoint}: {}: {}", info.exception, info.message);
    if info.traceback.is_empty() {
        return header;
    }
    let body = info
        .traceback
        .split('\n')
        .map(|line| format!("{endpoint} -- {line}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!("{header}\n{body}")
}

/// What a successful [`Proxy::call`] produces: either the method's primitive
/// return value, or a new handle when the remote method returned a
/// non-primitive.
#[derive(Debug, Clone)]
pub enum CallOutcome {
    Value(Value),
    Handle(Proxy),
}

/// Client-side handle over `(Channel, objectid)`. Not serializable by design.
#[derive(Clone)]
pub struct Proxy {
    channel: Channel,
    objectid: String,
}

impl Proxy {
    pub fn new(channel: Channel, objectid: impl Into<String>) -> Self {
        Proxy { channel, objectid: objectid.into() }
    }

    pub fn objectid(&self) -> &str {
        &self.objectid
    }

    /// Invoke `method` with positional `args` and keyword `kw`, each
    /// independently encoded, per SS4.8:
    /// 1. serialize each arg/kw value,
    /// 2. build and encode a `ServerRequest`,
    /// 3. `POST /rpc/invoke/<objectid>`,
    /// 4. a non-200 status raises `RpcError::Transport`,
    /// 5. apply the one-of rule to the decoded `ServerResponse`.
    #[tracing::instrument(level = "debug", skip(self, args, kw), fields(objectid = %self.objectid, method))]
    pub async fn call(
        &self,
        method: &str,
        args: Vec<Value>,
        kw: BTreeMap<String, Value>,
    ) -> Result<CallOutcome, RpcError> {
        let mut request = ServerRequest::new(method);
        for arg in &args {
            request.args.push(codec::encode(arg)?);
        }
        for (name, value) in &kw {
            request.kw.insert(name.clone(), codec::encode(value)?);
        }

        let body = codec::encode_typed(&request)?;
        let path = format!("/rpc/invoke/{}", self.objectid);
        let (status, body) = self.channel.post(&path, body).await?;

        if status != StatusCode::OK {
            return Err(RpcError::Transport {
                endpoint: self.channel.endpoint(),
                kind: TransportErrorKind::Status(status.as_u16()),
            });
        }

        let response: ServerResponse = codec::decode_typed(&body)?;
        match response.outcome() {
            ServerOutcome::Exception(info) => {
                Err(RpcError::Remote(format_remote_error(self.channel.endpoint(), &info)))
            }
            ServerOutcome::ObjectId(id) => Ok(CallOutcome::Handle(Proxy::new(self.channel.clone(), id))),
            ServerOutcome::Data(value) => Ok(CallOutcome::Value(value)),
        }
    }
}

/// Client entry point: obtains proxies and endpoints for a server.
#[derive(Clone)]
pub struct Client {
    channel: Channel,
}

impl Client {
    pub fn connect(endpoint: SocketAddr) -> Self {
        Client { channel: Channel::new(endpoint) }
    }

    pub fn with_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.channel = self.channel.with_timeout(timeout);
        self
    }

    /// Obtain a proxy to the named server-side object.
    pub fn object(&self, name: impl Into<String>) -> Proxy {
        Proxy::new(self.channel.clone(), name)
    }
}

/// Typed-message stub (C8'): accepts exactly one [`Message`], validates it,
/// POSTs to `/rpc/<method>`, and decodes the response into a [`Message`] of
/// the declared response schema. A `ServerErrorResponse` raises
/// `RpcError::Remote` with the remote traceback prefixed.
pub struct MessageStub {
    channel: Channel,
    method: String,
    response_schema: Schema,
}

impl MessageStub {
    pub fn new(endpoint: SocketAddr, method: impl Into<String>, response_schema: Schema) -> Self {
        MessageStub { channel: Channel::new(endpoint), method: method.into(), response_schema }
    }

    #[tracing::instrument(level = "debug", skip(self, message), fields(method = %self.method))]
    pub async fn send(&self, message: Message) -> Result<Message, RpcError> {
        message.validate()?;

        let body = codec::encode_typed(&message.to_wire())?;
        let path = format!("/rpc/{}", self.method);
        let (status, body) = self.channel.post(&path, body).await?;

        if status != StatusCode::OK {
            return Err(RpcError::Transport {
                endpoint: self.channel.endpoint(),
                kind: TransportErrorKind::Status(status.as_u16()),
            });
        }

        if let Ok(error_response) = codec::decode_typed::<crate::envelope::ServerErrorResponse>(&body) {
            return Err(RpcError::Remote(format_remote_error(self.channel.endpoint(), &error_response.exc_info)));
        }

        let wire: MessageWire = codec::decode_typed(&body)?;
        Message::from_wire(self.response_schema.clone(), wire)
    }
}

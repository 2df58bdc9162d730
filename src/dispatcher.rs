//! Request dispatcher (C6): the axum handlers that decode requests, call the
//! registry, encode responses, and trap exceptions.
//!
//! Status code policy (SS7): dispatcher-internal failures (bad JSON, unknown
//! route) are **500**/**404** with an empty body; a user method raising --
//! including panicking -- is always **200** with `exc_info` populated. The
//! dispatcher's own bugs are the only source of 500.

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::{debug, trace, warn};

use crate::codec;
use crate::envelope::{ExceptionInfo, ServerErrorResponse, ServerOutcome, ServerRequest, ServerResponse};
use crate::message::{Message, MessageWire};
use crate::registry::{DispatchResult, ObjectId};
use crate::server::AppState;

fn empty(status: StatusCode) -> Response {
    status.into_response()
}

fn json_ok(body: Vec<u8>) -> Response {
    (StatusCode::OK, body).into_response()
}

/// `POST /rpc/invoke/<objectid>` (SS4.6).
#[tracing::instrument(level = "debug", skip(state, body), fields(objectid = %objectid))]
pub async fn invoke_handler(
    State(state): State<Arc<AppState>>,
    Path(objectid): Path<String>,
    body: Bytes,
) -> Response {
    let objectid = ObjectId::new(objectid);

    if state.config.capture_requests {
        trace!(body = %String::from_utf8_lossy(&body), "request body");
    }

    if state.registry.lookup(&objectid).is_none() {
        debug!("no such object, returning 404");
        return empty(StatusCode::NOT_FOUND);
    }

    let request: ServerRequest = match codec::decode_typed(&body) {
        Ok(r) => r,
        Err(err) => {
            warn!(%err, "failed to decode ServerRequest body");
            return empty(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    let mut args = Vec::with_capacity(request.args.len());
    for raw in &request.args {
        match codec::decode(raw) {
            Ok(v) => args.push(v),
            Err(err) => {
                warn!(%err, "failed to decode an argument");
                return empty(StatusCode::INTERNAL_SERVER_ERROR);
            }
        }
    }

    let mut kw = BTreeMap::new();
    for (name, raw) in &request.kw {
        match codec::decode(raw) {
            Ok(v) => {
                kw.insert(name.clone(), v);
            }
            Err(err) => {
                warn!(%err, "failed to decode a keyword argument");
                return empty(StatusCode::INTERNAL_SERVER_ERROR);
            }
        }
    }

    let outcome = match state.registry.dispatch(&objectid, &request.method, &args, &kw) {
        DispatchResult::Value(v) => ServerOutcome::Data(v),
        DispatchResult::Handle(id) => ServerOutcome::ObjectId(id.0),
        DispatchResult::Raised(info) => ServerOutcome::Exception(info),
    };

    let response = ServerResponse::from_outcome(outcome);
    match codec::encode_typed(&response) {
        Ok(bytes) => json_ok(bytes),
        Err(err) => {
            warn!(%err, "failed to encode ServerResponse");
            empty(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// `POST /rpc/<method>` (C8', SS4.8): the typed-message variant.
#[tracing::instrument(level = "debug", skip(state, body), fields(method = %method))]
pub async fn message_handler(
    State(state): State<Arc<AppState>>,
    Path(method): Path<String>,
    body: Bytes,
) -> Response {
    if state.config.capture_requests {
        trace!(body = %String::from_utf8_lossy(&body), "request body");
    }

    let route = {
        let routes = state.message_routes.read().expect("message route lock poisoned");
        routes.get(&method).cloned()
    };
    let Some(route) = route else {
        debug!("no such message route, returning 404");
        return empty(StatusCode::NOT_FOUND);
    };

    let wire: MessageWire = match codec::decode_typed(&body) {
        Ok(w) => w,
        Err(err) => {
            warn!(%err, "failed to decode message wire body");
            return empty(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    let message = match Message::from_wire(route.request_schema.clone(), wire) {
        Ok(m) => m,
        Err(err) => {
            warn!(%err, "decoded message failed schema validation");
            return empty(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    if let Err(err) = message.validate() {
        warn!(%err, "message failed validate()");
        return empty(StatusCode::INTERNAL_SERVER_ERROR);
    }

    let handler = route.handler.clone();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(message)));

    let result = match outcome {
        Ok(inner) => inner,
        Err(panic) => {
            let traceback = crate::error::panic_payload_text(panic.as_ref());
            Err(ExceptionInfo::new("PanicError", "handler panicked", traceback))
        }
    };

    match result {
        Ok(response_message) => match codec::encode_typed(&response_message.to_wire()) {
            Ok(bytes) => json_ok(bytes),
            Err(err) => {
                warn!(%err, "failed to encode response message");
                empty(StatusCode::INTERNAL_SERVER_ERROR)
            }
        },
        Err(info) => match codec::encode_typed(&ServerErrorResponse { exc_info: info }) {
            Ok(bytes) => json_ok(bytes),
            Err(err) => {
                warn!(%err, "failed to encode ServerErrorResponse");
                empty(StatusCode::INTERNAL_SERVER_ERROR)
            }
        },
    }
}

/// `GET /status`: a plain-text liveness endpoint, ambient and not part of the
/// RPC protocol proper (SS6).
pub async fn status_handler() -> &'static str {
    "Ok"
}

//! On-wire framing (C3): `ServerRequest`, `ServerResponse`, `ExceptionInfo`,
//! `ServerErrorResponse`. No behavior beyond being structured data, plus the
//! one-of invariant on `ServerResponse`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::codec::Value;

/// A method call as it travels over the wire. Each argument and keyword value is
/// independently encoded (SS3) so that large arguments aren't re-copied by the
/// dispatcher before it needs to touch them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerRequest {
    pub method: String,
    pub args: Vec<Vec<u8>>,
    pub kw: BTreeMap<String, Vec<u8>>,
}

impl ServerRequest {
    pub fn new(method: impl Into<String>) -> Self {
        ServerRequest { method: method.into(), args: Vec::new(), kw: BTreeMap::new() }
    }
}

/// Informational-only remote exception record. No recoverable structure --
/// the receiver's only job is to raise a local error quoting this text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExceptionInfo {
    pub exception: String,
    pub message: String,
    pub traceback: String,
}

impl ExceptionInfo {
    pub fn new(exception: impl Into<String>, message: impl Into<String>, traceback: impl Into<String>) -> Self {
        ExceptionInfo { exception: exception.into(), message: message.into(), traceback: traceback.into() }
    }
}

/// The tagged-enum rendition of SS3's "exactly one of" invariant (per the
/// redesign note in SS9): a value, a handle to a newly minted object, or a
/// reraised remote exception.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerOutcome {
    Data(Value),
    ObjectId(String),
    Exception(ExceptionInfo),
}

/// The wire shape of a response: exactly three optional fields, disciplined by
/// [`ServerResponse::outcome`]/[`ServerResponse::from_outcome`] rather than by
/// convention at every call site. `data: null` with the other two fields absent
/// is admissible -- it signals the method returned the null value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerResponse {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub objectid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub exc_info: Option<ExceptionInfo>,
}

impl ServerResponse {
    pub fn from_outcome(outcome: ServerOutcome) -> Self {
        match outcome {
            ServerOutcome::Data(v) => ServerResponse { objectid: None, data: Some(v), exc_info: None },
            ServerOutcome::ObjectId(id) => ServerResponse { objectid: Some(id), data: None, exc_info: None },
            ServerOutcome::Exception(ei) => ServerResponse { objectid: None, data: None, exc_info: Some(ei) },
        }
    }

    /// Applies the discriminator rule from SS3: `exc_info` wins over `objectid`
    /// wins over `data` (possibly null).
    pub fn outcome(self) -> ServerOutcome {
        if let Some(ei) = self.exc_info {
            ServerOutcome::Exception(ei)
        } else if let Some(id) = self.objectid {
            ServerOutcome::ObjectId(id)
        } else {
            ServerOutcome::Data(self.data.unwrap_or(Value::Null))
        }
    }
}

/// Error envelope for the typed-message variant (C8'): what a `Stub` receives
/// in place of a `ResponseMessage` when the handler raised.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerErrorResponse {
    pub exc_info: ExceptionInfo,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_roundtrips_each_variant() {
        for outcome in [
            ServerOutcome::Data(Value::String("Hi!".into())),
            ServerOutcome::Data(Value::Null),
            ServerOutcome::ObjectId("anonid:abc".into()),
            ServerOutcome::Exception(ExceptionInfo::new("Exception", "Bob", "traceback...")),
        ] {
            let response = ServerResponse::from_outcome(outcome.clone());
            let bytes = serde_json::to_vec(&response).unwrap();
            let back: ServerResponse = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(back.outcome(), outcome);
        }
    }

    #[test]
    fn success_returning_null_is_admissible() {
        let response = ServerResponse { objectid: None, data: None, exc_info: None };
        assert_eq!(response.outcome(), ServerOutcome::Data(Value::Null));
    }
}

//! Server-side object registry (C5): `objectid -> live object` plus anonymous
//! id minting and method dispatch.
//!
//! Rust has no `getattr`-style reflection, so a "live object" here is an explicit
//! dispatch table (SS9, "method dispatch by name"): `register_object` takes a
//! `HashMap<String, MethodFn>` whose closures capture whatever state the object
//! needs, exactly as the source's `Inner` class relies on closures over shared
//! state.

use std::collections::{BTreeMap, HashMap};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

use uuid::Uuid;

use crate::codec::Value;
use crate::envelope::ExceptionInfo;

/// Opaque, printable identifier for a live server-side object, unique within a
/// process lifetime. Reserved: `"self"` names the server's own introspection
/// object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub String);

impl ObjectId {
    pub fn new(name: impl Into<String>) -> Self {
        ObjectId(name.into())
    }

    /// Mint a fresh anonymous id. The opaque suffix is a UUIDv7, chosen because
    /// it's monotonically sortable (useful for log correlation) without a shared
    /// mutable counter beyond what the registry map already synchronizes.
    pub fn new_anon() -> Self {
        ObjectId(format!("anonid:{}", Uuid::now_v7()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a registered method returns once it's run, before the registry has
/// decided whether that's a `Value` response or a minted `Handle`.
pub enum MethodOutcome {
    /// A primitive result (SS3); becomes `ServerResponse.data`.
    Value(Value),
    /// A fresh non-primitive result; the registry mints an `anonid:` for it and
    /// installs `table` under that id before returning `ServerResponse.objectid`.
    Object(MethodTable),
}

/// A method handler. Takes positional args and keyword args already decoded to
/// [`Value`]s, returns a [`MethodOutcome`] or an error message that becomes the
/// `exc_info` the caller sees.
pub type MethodFn = Arc<dyn Fn(&[Value], &BTreeMap<String, Value>) -> Result<MethodOutcome, String> + Send + Sync>;

/// A live object's dispatch table: method name -> handler.
pub type MethodTable = Arc<HashMap<String, MethodFn>>;

/// What dispatching a call against a registered object produces.
pub enum DispatchResult {
    Value(Value),
    Handle(ObjectId),
    Raised(ExceptionInfo),
}

/// `entries: map<ObjectId, MethodTable>` behind a single `RwLock`, guaranteeing
/// `lookup` never observes a half-installed entry: inserts take the write half
/// and never yield while holding it (SS5).
#[derive(Default)]
pub struct ObjectRegistry {
    entries: RwLock<HashMap<ObjectId, MethodTable>>,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        ObjectRegistry { entries: RwLock::new(HashMap::new()) }
    }

    /// Insert `table` under `objectid`. Idempotent: if `objectid` is already
    /// present the existing mapping wins and this is a no-op, which is a
    /// requirement for restart-free tests (SS4.5).
    #[tracing::instrument(level = "debug", skip(self, table))]
    pub fn register(&self, objectid: ObjectId, table: MethodTable) {
        let mut entries = self.entries.write().expect("registry lock poisoned");
        entries.entry(objectid).or_insert(table);
    }

    pub fn lookup(&self, objectid: &ObjectId) -> Option<MethodTable> {
        self.entries.read().expect("registry lock poisoned").get(objectid).cloned()
    }

    /// Mint and install a fresh anonymous id for `table`, returning the id.
    fn mint_anonymous(&self, table: MethodTable) -> ObjectId {
        let id = ObjectId::new_anon();
        let mut entries = self.entries.write().expect("registry lock poisoned");
        entries.insert(id.clone(), table);
        drop(entries);
        id
    }

    /// Look up `objectid`, then `method` on its table, then invoke it.
    ///
    /// An unknown objectid is reported the same way the HTTP layer reports a
    /// routing 404 -- callers of `dispatch` are expected to have already resolved
    /// the object via [`ObjectRegistry::lookup`] (SS4.6 step 1); this method
    /// nonetheless tolerates a miss by raising, so it can be used standalone
    /// (e.g. from tests) without duplicating that resolution step.
    #[tracing::instrument(level = "debug", skip(self, args, kw))]
    pub fn dispatch(
        &self,
        objectid: &ObjectId,
        method: &str,
        args: &[Value],
        kw: &BTreeMap<String, Value>,
    ) -> DispatchResult {
        let Some(table) = self.lookup(objectid) else {
            return DispatchResult::Raised(ExceptionInfo::new(
                "NotFound",
                format!("no such object: {objectid}"),
                String::new(),
            ));
        };

        let Some(handler) = table.get(method) else {
            return DispatchResult::Raised(ExceptionInfo::new(
                "AttributeError",
                format!("object {objectid} has no method `{method}`"),
                String::new(),
            ));
        };

        let handler = handler.clone();
        let args_owned = args.to_vec();
        let kw_owned = kw.clone();

        let result = panic::catch_unwind(AssertUnwindSafe(|| handler(&args_owned, &kw_owned)));

        match result {
            Ok(Ok(MethodOutcome::Value(v))) => DispatchResult::Value(v),
            Ok(Ok(MethodOutcome::Object(table))) => DispatchResult::Handle(self.mint_anonymous(table)),
            // A handler that returns Err(String) has no backtrace to report, unlike
            // a caught panic below -- traceback stays empty, not fabricated.
            Ok(Err(message)) => {
                DispatchResult::Raised(ExceptionInfo::new("Exception", message, String::new()))
            }
            Err(panic) => {
                let traceback = crate::error::panic_payload_text(panic.as_ref());
                DispatchResult::Raised(ExceptionInfo::new("PanicError", "handler panicked", traceback))
            }
        }
    }

    /// The sorted list of registered, non-anonymous object ids, for the `self`
    /// introspection object's `list_objects()`.
    pub fn list_named_objects(&self) -> Vec<String> {
        let entries = self.entries.read().expect("registry lock poisoned");
        let mut names: Vec<String> = entries
            .keys()
            .map(|id| id.0.clone())
            .filter(|name| !name.starts_with("anonid:"))
            .collect();
        names.sort();
        names
    }
}

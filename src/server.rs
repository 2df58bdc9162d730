//! Server runtime (C7) and its ambient configuration (C9).
//!
//! States: `New -> Listening -> Serving -> Stopping -> Stopped`. `start()`
//! transitions `New -> Listening -> Serving`, yielding control once so the
//! accept loop is live before returning; `stop()` transitions to `Stopping`,
//! cancels in-flight workers, joins, closes the listener, transitions to
//! `Stopped`. Double-`start` and double-`stop` are [`RpcError::Lifecycle`]
//! errors.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use axum::routing::{post, MethodRouter};
use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower::limit::ConcurrencyLimitLayer;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::dispatcher::{invoke_handler, message_handler, status_handler};
use crate::error::RpcError;
use crate::message::Schema;
use crate::codec::Value;
use crate::envelope::ExceptionInfo;
use crate::message::Message;
use crate::proxy::Client;
use crate::registry::{MethodOutcome, MethodTable, ObjectId, ObjectRegistry};

/// A registered handler for the typed-message variant (C8').
#[derive(Clone)]
pub struct MessageRoute {
    pub request_schema: Schema,
    pub response_schema: Schema,
    pub handler: Arc<dyn Fn(Message) -> Result<Message, ExceptionInfo> + Send + Sync>,
}

/// Shared state reachable from every axum handler.
pub struct AppState {
    pub registry: ObjectRegistry,
    pub message_routes: RwLock<HashMap<String, MessageRoute>>,
    pub config: ServerConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LifecycleState {
    New,
    Listening,
    Serving,
    Stopping,
    Stopped,
}

/// The accept loop, worker pool, and registration API (C7).
///
/// `start()`/`stop()` may be cycled repeatedly on the same instance --
/// `start(); stop(); start(); stop()` is a supported sequence (SS8) and each
/// `start()` rebuilds the router from the extra routes accumulated via
/// [`Server::register`] plus the fixed RPC routes, so registrations made
/// before the first `start()` survive every subsequent restart.
pub struct Server {
    config: ServerConfig,
    state: Arc<AppState>,
    extra_routes: RwLock<Vec<(String, MethodRouter<()>)>>,
    lifecycle: RwLock<LifecycleState>,
    cancel: RwLock<CancellationToken>,
    local_addr: RwLock<Option<SocketAddr>>,
    accept_task: RwLock<Option<JoinHandle<()>>>,
}

impl Server {
    /// Build a server with an introspection object already registered under
    /// the reserved objectid `"self"` (SS4.6): `ping()` and `list_objects()`.
    pub fn new(config: ServerConfig) -> Self {
        let state = Arc::new(AppState {
            registry: ObjectRegistry::new(),
            message_routes: RwLock::new(HashMap::new()),
            config: config.clone(),
        });

        let server = Server {
            config,
            state,
            extra_routes: RwLock::new(Vec::new()),
            lifecycle: RwLock::new(LifecycleState::New),
            cancel: RwLock::new(CancellationToken::new()),
            local_addr: RwLock::new(None),
            accept_task: RwLock::new(None),
        };
        server.register_self_object();
        server
    }

    /// Assemble the router from the fixed RPC routes plus whatever extra
    /// routes have been registered via [`Server::register`]. Called fresh on
    /// every `start()` so restarts pick up registrations unchanged.
    fn build_router(&self) -> Router {
        let mut router = Router::new()
            .route("/rpc/invoke/{objectid}", post(invoke_handler))
            .route("/rpc/{method}", post(message_handler))
            .route("/status", axum::routing::get(status_handler));

        for (path, handler) in self.extra_routes.read().expect("routes lock poisoned").iter() {
            router = router.route(path, handler.clone());
        }

        router
            .layer(ConcurrencyLimitLayer::new(self.config.worker_capacity))
            .with_state(self.state.clone())
    }

    fn register_self_object(&self) {
        let mut table: HashMap<String, crate::registry::MethodFn> = HashMap::new();
        table.insert("ping".to_string(), Arc::new(|_args, _kw| Ok(MethodOutcome::Value(Value::Bool(true)))));
        let state = self.state.clone();
        table.insert(
            "list_objects".to_string(),
            Arc::new(move |_args, _kw| {
                let names = state.registry.list_named_objects();
                Ok(MethodOutcome::Value(Value::List(names.into_iter().map(Value::String).collect())))
            }),
        );
        self.state.registry.register(ObjectId::new("self"), Arc::new(table));
    }

    /// Register an arbitrary HTTP method handler at `path` (used for static or
    /// templated responses, SS4.7). Can be called at any time; routes take
    /// effect on the next `start()` (including a restart after `stop()`).
    pub fn register(&self, path: &str, handler: MethodRouter<()>) -> Result<(), RpcError> {
        self.extra_routes.write().expect("routes lock poisoned").push((path.to_string(), handler));
        Ok(())
    }

    /// Sugar for installing an object's dispatch table under
    /// `/rpc/invoke/<name>` (SS4.7): `register_object(name, obj)`.
    pub fn register_object(&self, name: impl Into<String>, table: MethodTable) {
        self.state.registry.register(ObjectId::new(name), table);
    }

    /// Install a typed-message handler for `/rpc/<method>` (C8').
    pub fn register_message_handler(
        &self,
        method: impl Into<String>,
        request_schema: Schema,
        response_schema: Schema,
        handler: impl Fn(Message) -> Result<Message, ExceptionInfo> + Send + Sync + 'static,
    ) {
        let mut routes = self.state.message_routes.write().expect("message route lock poisoned");
        routes.insert(
            method.into(),
            MessageRoute { request_schema, response_schema, handler: Arc::new(handler) },
        );
    }

    /// `New -> Listening -> Serving`, or `Stopped -> Listening -> Serving` on
    /// a restart. Binds the listener, spawns the accept loop, and yields once
    /// so it's live before returning.
    pub async fn start(&self) -> Result<(), RpcError> {
        {
            let mut lifecycle = self.lifecycle.write().expect("lifecycle lock poisoned");
            if *lifecycle != LifecycleState::New && *lifecycle != LifecycleState::Stopped {
                return Err(RpcError::Lifecycle(format!("cannot start from state {:?}", *lifecycle)));
            }
            *lifecycle = LifecycleState::Listening;
        }

        let fresh_cancel = CancellationToken::new();
        *self.cancel.write().expect("cancel lock poisoned") = fresh_cancel.clone();

        let router = self.build_router();

        let listener = TcpListener::bind(self.config.bind_address)
            .await
            .map_err(|err| RpcError::Lifecycle(format!("failed to bind {}: {err}", self.config.bind_address)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|err| RpcError::Lifecycle(format!("failed to read local_addr: {err}")))?;
        *self.local_addr.write().expect("addr lock poisoned") = Some(local_addr);

        info!(%local_addr, "server listening");

        let cancel = fresh_cancel;
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, router.into_make_service());
            let graceful = serve.with_graceful_shutdown(async move {
                cancel.cancelled().await;
            });
            if let Err(err) = graceful.await {
                warn!(%err, "accept loop exited with an error");
            }
        });
        *self.accept_task.write().expect("task lock poisoned") = Some(task);

        // Yield once so the accept loop is demonstrably live before we hand
        // control back, per SS4.7's "non-blocking, yields control once".
        tokio::task::yield_now().await;

        *self.lifecycle.write().expect("lifecycle lock poisoned") = LifecycleState::Serving;
        Ok(())
    }

    /// `Serving -> Stopping -> Stopped`. Cancels the accept loop and all
    /// worker tasks, then joins, bounded by a short drain interval before
    /// forcing socket closure.
    pub async fn stop(&self) -> Result<(), RpcError> {
        {
            let mut lifecycle = self.lifecycle.write().expect("lifecycle lock poisoned");
            if *lifecycle != LifecycleState::Serving {
                return Err(RpcError::Lifecycle(format!("cannot stop from state {:?}", *lifecycle)));
            }
            *lifecycle = LifecycleState::Stopping;
        }

        self.cancel.read().expect("cancel lock poisoned").cancel();

        let task = self.accept_task.write().expect("task lock poisoned").take();
        if let Some(task) = task {
            match tokio::time::timeout(Duration::from_secs(5), task).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(%err, "accept task panicked during shutdown"),
                Err(_) => warn!("accept loop did not drain within the shutdown window"),
            }
        }

        *self.lifecycle.write().expect("lifecycle lock poisoned") = LifecycleState::Stopped;
        info!("server stopped");
        Ok(())
    }

    /// The bound local address, available once [`Server::start`] has run.
    /// Useful when `bind_address`'s port was `0` (pick any free port).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.read().expect("addr lock poisoned")
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// A [`Client`] bound to this server's listening address, pre-configured
    /// with `call_timeout` if one was set (SS4.7's "the embedding program
    /// owns its own client instances" -- this is a convenience for the common
    /// case of calling back into the server it just started). Errors if
    /// [`Server::start`] hasn't run yet.
    pub fn client(&self) -> Result<Client, RpcError> {
        let addr = self.local_addr().ok_or_else(|| RpcError::Lifecycle("server is not listening".to_string()))?;
        let client = Client::connect(addr);
        Ok(match self.config.call_timeout {
            Some(timeout) => client.with_timeout(timeout),
            None => client,
        })
    }
}

impl Drop for Server {
    /// Best-effort safety net: signal the accept loop to stop even if the
    /// owner never called [`Server::stop`] (e.g. a test that panicked before
    /// reaching it). This does not join the accept task -- joining requires
    /// `.await`, unavailable in `Drop` -- so it's not a substitute for calling
    /// `stop()` in the ordinary shutdown path.
    fn drop(&mut self) {
        if let Ok(cancel) = self.cancel.read() {
            cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn double_start_is_a_lifecycle_error() {
        let server = Server::new(ServerConfig::default());
        server.start().await.unwrap();
        assert!(server.start().await.is_err());
        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn double_stop_is_a_lifecycle_error() {
        let server = Server::new(ServerConfig::default());
        server.start().await.unwrap();
        server.stop().await.unwrap();
        assert!(server.stop().await.is_err());
    }

    #[tokio::test]
    async fn register_serves_an_arbitrary_http_handler() {
        let server = Server::new(ServerConfig::default());
        server
            .register("/hello", axum::routing::get(|| async { "hi there" }))
            .unwrap();
        server.start().await.unwrap();

        let addr = server.local_addr().unwrap();
        let response = reqwest::get(format!("http://{addr}/hello")).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        assert_eq!(response.text().await.unwrap(), "hi there");

        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn call_timeout_bounds_a_slow_handler() {
        let mut config = ServerConfig::default();
        config.call_timeout = Some(Duration::from_millis(20));
        let server = Server::new(config);

        let mut table: HashMap<String, crate::registry::MethodFn> = HashMap::new();
        table.insert(
            "slow".to_string(),
            Arc::new(|_args, _kw| {
                std::thread::sleep(Duration::from_millis(200));
                Ok(MethodOutcome::Value(Value::Bool(true)))
            }),
        );
        server.register_object("slow_object", Arc::new(table));
        server.start().await.unwrap();

        let client = server.client().unwrap();
        let result = client.object("slow_object").call("slow", vec![], Default::default()).await;

        match result {
            Err(RpcError::Transport { kind: crate::error::TransportErrorKind::Timeout, .. }) => {}
            other => panic!("expected a transport timeout, got {other:?}"),
        }

        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn start_stop_start_stop_leaves_no_listener() {
        let server = Server::new(ServerConfig::default());

        server.start().await.unwrap();
        server.stop().await.unwrap();

        // restarting the same instance must succeed (SS8) and bind a fresh port.
        server.start().await.unwrap();
        let addr = server.local_addr().unwrap();
        server.stop().await.unwrap();

        // the port should be free again: a fresh bind to it should succeed.
        let relisten = TcpListener::bind(addr).await;
        assert!(relisten.is_ok());
    }
}

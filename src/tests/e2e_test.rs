#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;

    use crate::codec::Value;
    use crate::config::ServerConfig;
    use crate::message::{FieldSpec, Message, Schema};
    use crate::proxy::{CallOutcome, Client, MessageStub};
    use crate::registry::{MethodFn, MethodOutcome};
    use crate::server::Server;

    fn test_message_schema() -> Schema {
        Schema::new("TestMessage", vec![("str", FieldSpec::String), ("int", FieldSpec::Int)])
    }

    /// Builds the `mock` object from the original test suite's `MockObject`:
    /// `test_echo`, `test_inner`, `test_exception`.
    fn mock_table() -> std::collections::HashMap<String, MethodFn> {
        let mut table: std::collections::HashMap<String, MethodFn> = std::collections::HashMap::new();

        table.insert(
            "test_echo".to_string(),
            Arc::new(|args, _kw| Ok(MethodOutcome::Value(args[0].clone()))),
        );

        table.insert(
            "test_exception".to_string(),
            Arc::new(|_args, _kw| Err("Bob".to_string())),
        );

        table.insert(
            "test_inner".to_string(),
            Arc::new(|args, _kw| {
                let n = match args.first() {
                    Some(Value::Int(n)) => *n,
                    _ => 0,
                };
                let calls = Arc::new(AtomicI64::new(0));
                let mut inner: std::collections::HashMap<String, MethodFn> = std::collections::HashMap::new();
                inner.insert("foo".to_string(), {
                    let calls = calls.clone();
                    Arc::new(move |_a, _k| {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(MethodOutcome::Value(Value::Int(n)))
                    })
                });
                inner.insert("bar".to_string(), {
                    let calls = calls.clone();
                    Arc::new(move |_a, _k| {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(MethodOutcome::Value(Value::Int(n * 2)))
                    })
                });
                inner.insert("calls".to_string(), {
                    let calls = calls.clone();
                    Arc::new(move |_a, _k| Ok(MethodOutcome::Value(Value::Int(calls.load(Ordering::SeqCst)))))
                });
                Ok(MethodOutcome::Object(Arc::new(inner)))
            }),
        );

        table
    }

    async fn spawn_mock_server() -> (Server, std::net::SocketAddr) {
        let server = Server::new(ServerConfig::default());
        server.register_object("mock", Arc::new(mock_table()));
        server.start().await.expect("server should start");
        let addr = server.local_addr().expect("server should have a local addr after start");
        (server, addr)
    }

    #[tokio::test]
    async fn echo_primitive_roundtrips() {
        let (server, addr) = spawn_mock_server().await;

        let client = Client::connect(addr);
        let proxy = client.object("mock");

        for i in 0..9 {
            let outcome = proxy
                .call("test_echo", vec![Value::Int(i)], BTreeMap::new())
                .await
                .expect("call should succeed");
            match outcome {
                CallOutcome::Value(Value::Int(n)) => assert_eq!(n, i),
                other => panic!("expected Value::Int, got {other:?}"),
            }
        }

        let outcome = proxy
            .call("test_echo", vec![Value::String("Hi!".into())], BTreeMap::new())
            .await
            .unwrap();
        match outcome {
            CallOutcome::Value(Value::String(s)) => assert_eq!(s, "Hi!"),
            other => panic!("expected Value::String, got {other:?}"),
        }

        server.stop().await.expect("server should stop cleanly");
    }

    #[tokio::test]
    async fn anonymous_handle_routes_to_the_same_instance() {
        let (server, addr) = spawn_mock_server().await;

        let client = Client::connect(addr);
        let mock = client.object("mock");

        let inner = match mock.call("test_inner", vec![Value::Int(10)], BTreeMap::new()).await.unwrap() {
            CallOutcome::Handle(proxy) => proxy,
            other => panic!("expected a Handle outcome, got {other:?}"),
        };
        assert!(inner.objectid().starts_with("anonid:"));

        match inner.call("foo", vec![], BTreeMap::new()).await.unwrap() {
            CallOutcome::Value(Value::Int(n)) => assert_eq!(n, 10),
            other => panic!("expected foo() == 10, got {other:?}"),
        }
        match inner.call("bar", vec![], BTreeMap::new()).await.unwrap() {
            CallOutcome::Value(Value::Int(n)) => assert_eq!(n, 20),
            other => panic!("expected bar() == 20, got {other:?}"),
        }

        // both calls must have hit the same server-side instance.
        match inner.call("calls", vec![], BTreeMap::new()).await.unwrap() {
            CallOutcome::Value(Value::Int(n)) => assert_eq!(n, 2),
            other => panic!("expected calls() == 2, got {other:?}"),
        }

        server.stop().await.expect("server should stop cleanly");
    }

    #[tokio::test]
    async fn remote_exception_carries_endpoint_and_message() {
        let (server, addr) = spawn_mock_server().await;

        let client = Client::connect(addr);
        let proxy = client.object("mock");

        let err = proxy.call("test_exception", vec![], BTreeMap::new()).await.unwrap_err();
        let text = err.to_string();
        assert!(text.contains("Bob"), "{text}");
        assert!(text.contains(&addr.to_string()), "{text}");

        server.stop().await.expect("server should stop cleanly");
    }

    #[tokio::test]
    async fn fifty_concurrent_echoes_all_round_trip() {
        let (server, addr) = spawn_mock_server().await;

        let client = Client::connect(addr);
        let mut handles = Vec::new();
        for i in 0..50 {
            let proxy = client.object("mock");
            handles.push(tokio::spawn(async move {
                let payload = format!("Test{i}");
                let outcome = proxy
                    .call("test_echo", vec![Value::String(payload.clone())], BTreeMap::new())
                    .await
                    .expect("call should succeed");
                match outcome {
                    CallOutcome::Value(Value::String(s)) => assert_eq!(s, payload),
                    other => panic!("expected Value::String, got {other:?}"),
                }
            }));
        }
        for handle in handles {
            handle.await.expect("task should not panic");
        }

        // the server should still be healthy afterwards.
        let outcome = client.object("mock").call("test_echo", vec![Value::Int(1)], BTreeMap::new()).await.unwrap();
        assert!(matches!(outcome, CallOutcome::Value(Value::Int(1))));

        server.stop().await.expect("server should stop cleanly");
    }

    #[tokio::test]
    async fn typed_message_roundtrips_and_hashes_equal() {
        let server = Server::new(ServerConfig::default());
        server.register_message_handler("test", test_message_schema(), test_message_schema(), |message| Ok(message));
        server.start().await.expect("server should start");
        let addr = server.local_addr().unwrap();

        let sent = Message::with_fields(
            test_message_schema(),
            vec![("str", Value::String("Hi there!".into())), ("int", Value::Int(0))],
        )
        .unwrap();

        let stub = MessageStub::new(addr, "test", test_message_schema());
        let received = stub.send(sent.clone()).await.expect("typed call should succeed");

        assert_eq!(sent, received);

        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};
        let mut hs = DefaultHasher::new();
        sent.hash(&mut hs);
        let mut hr = DefaultHasher::new();
        received.hash(&mut hr);
        assert_eq!(hs.finish(), hr.finish());

        server.stop().await.expect("server should stop cleanly");
    }

    #[test]
    fn schema_rejects_unknown_fields_and_wrong_shapes() {
        let mut m = Message::new(test_message_schema());
        assert!(m.set("unknown", Value::Int(1)).is_err());
        assert!(m.set("int", Value::String("x".into())).is_err());
        assert!(m.set("int", Value::Int(5)).is_ok());
        assert!(m.validate().is_ok());
    }

    #[tokio::test]
    async fn unknown_objectid_is_a_404() {
        let (server, addr) = spawn_mock_server().await;

        let client = Client::connect(addr);
        let proxy = client.object("does-not-exist");
        let err = proxy.call("anything", vec![], BTreeMap::new()).await.unwrap_err();
        assert!(err.to_string().contains("404"));

        server.stop().await.expect("server should stop cleanly");
    }
}

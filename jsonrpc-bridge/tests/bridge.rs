//! End-to-end tests: a router and a dispatcher talking over an in-process
//! channel with 100ms of latency each way and a 500ms call timeout.

use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

use jsonrpc_bridge::channel::local::{self, LocalEndpoint};
use jsonrpc_bridge::{
    params, Branch, CallRouter, ClientChannel, ClientConfig, Dispatcher, ErrorCode, MethodError,
    Module, Params, RequestIdFactory, Response, RpcError, ServerConfig,
};
use serde_json::Value;
use serde_json::json;

const LATENCY: Duration = Duration::from_millis(100);

struct Instance {
    client: CallRouter,
    server: Dispatcher,
    client_end: LocalEndpoint,
    add_calls: Rc<RefCell<Vec<Params>>>,
}

fn module_a(add_calls: Rc<RefCell<Vec<Params>>>) -> Branch {
    Module::branch().module(
        "foo",
        Module::branch()
            .module(
                "bar",
                Module::branch()
                    .sync_method("add", move |params: Params| {
                        add_calls.borrow_mut().push(params.clone());
                        Ok(params.get::<i64>(0)? + params.get::<i64>(1)?)
                    })
                    .method("addAsync", |params: Params| async move {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Ok::<_, MethodError>(params.get::<i64>(0)? + params.get::<i64>(1)?)
                    }),
            )
            .sync_method("error", |_| Err::<(), _>(MethodError::new("Error")))
            .method("errorAsync", |_| async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Err::<(), _>(MethodError::new("ErrorAsync"))
            }),
    )
}

fn module_b() -> Branch {
    Module::branch()
        .method("timeout", |_| async {
            tokio::time::sleep(Duration::from_millis(600)).await;
            Ok("Timeout")
        })
        .method("timeoutError", |_| async {
            tokio::time::sleep(Duration::from_millis(600)).await;
            Err::<(), _>(MethodError::new("Timeout"))
        })
}

fn new_instance() -> Instance {
    new_instance_with(ClientConfig::from_millis(500).with_debug(true))
}

fn new_instance_with(config: ClientConfig) -> Instance {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();

    let (client_end, server_end) = local::pair(LATENCY);
    let client = CallRouter::new(client_end.clone(), config);
    let server = Dispatcher::new(server_end, ServerConfig::default().with_debug(true));

    let add_calls = Rc::new(RefCell::new(Vec::new()));
    server
        .add_module("moduleA", module_a(Rc::clone(&add_calls)))
        .expect("register moduleA");
    server.add_module("moduleB", module_b()).expect("register moduleB");

    Instance {
        client,
        server,
        client_end,
        add_calls,
    }
}

async fn local<F: Future>(f: F) -> F::Output {
    tokio::task::LocalSet::new().run_until(f).await
}

/// Collect every reply the client endpoint receives.
fn capture_replies(endpoint: &LocalEndpoint) -> Rc<RefCell<Vec<Response>>> {
    let replies = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&replies);
    ClientChannel::set_message_handler(
        endpoint,
        Box::new(move |response: Response| sink.borrow_mut().push(response)),
    );
    replies
}

#[tokio::test(start_paused = true)]
async fn test_server_invalid_method() {
    local(async {
        let instance = new_instance();
        let replies = capture_replies(&instance.client_end);

        let ids = RequestIdFactory::new();
        ClientChannel::send(&instance.client_end, ids.build_request("", params![1, 2]))
            .expect("send");
        tokio::time::sleep(LATENCY * 3).await;

        let replies = replies.borrow();
        assert_eq!(replies.len(), 1);
        let error = replies[0].error.as_ref().expect("error reply");
        assert_eq!(error.code, ErrorCode::InvalidMethod.code());
        assert_eq!(error.message, "Invalid method");
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_call_forms() {
    local(async {
        let Instance {
            client,
            server: _server,
            ..
        } = new_instance();

        let chained = client
            .call()
            .member("moduleA")
            .member("foo")
            .member("bar")
            .member("add")
            .invoke(params![1, 2])
            .await
            .expect("chained call");
        assert_eq!(chained, json!(3));

        let dotted_segment = client
            .call()
            .member("moduleA")
            .member("foo.bar")
            .member("add")
            .invoke(params![1, 2])
            .await
            .expect("dotted segment call");
        assert_eq!(dotted_segment, json!(3));

        let explicit = client
            .call_method("moduleA.foo.bar.addAsync", params![1, 2])
            .await
            .expect("explicit call");
        assert_eq!(explicit, json!(3));

        let single_segment = client
            .call()
            .member("moduleA.foo.bar.addAsync")
            .invoke(params![1, 2])
            .await
            .expect("single segment call");
        assert_eq!(single_segment, json!(3));

        let typed: i64 = client
            .call()
            .member("moduleA")
            .member("foo")
            .member("bar")
            .member("addAsync")
            .invoke(params![1, 2])
            .decode()
            .await
            .expect("typed call");
        assert_eq!(typed, 3);
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_call_failures() {
    local(async {
        let Instance {
            client,
            server: _server,
            ..
        } = new_instance();
        let module_a = client.call().member("moduleA");

        let err = module_a.member("foo").member("error").invoke(Params::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "Error");
        assert_eq!(err.code(), Some(ErrorCode::InternalError.code()));

        let err = module_a
            .member("foo")
            .member("errorAsync")
            .invoke(Params::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "ErrorAsync");

        let err = module_a
            .member("not-exist-method")
            .invoke(params![1, 2])
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid method");

        let err = client.call_method("x.y", Params::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid method");
        assert_eq!(err.code(), Some(-32601));
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_call_timeouts() {
    local(async {
        let Instance {
            client,
            server: _server,
            ..
        } = new_instance();
        let module_b = client.call().member("moduleB");

        let err = module_b.member("timeout").invoke(Params::new()).await.unwrap_err();
        assert!(err.to_string().starts_with("Timeout ["));
        assert!(err.is_timeout());

        let err = module_b.member("timeoutError").invoke(Params::new()).await.unwrap_err();
        assert!(err.to_string().starts_with("Timeout ["));

        // Let the late replies arrive; they must not resurrect anything.
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(client.pending_count(), 0);
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_timeout_message_embeds_request_id() {
    local(async {
        let Instance {
            client,
            server: _server,
            ..
        } = new_instance();

        let reply = client.call_method("moduleB.timeout", Params::new());
        let id = reply.id();
        match reply.await {
            Err(RpcError::Timeout { id: timed_out }) => {
                assert_eq!(timed_out, id);
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_notify() {
    local(async {
        let instance = new_instance();
        let replies = capture_replies(&instance.client_end);

        instance
            .client
            .notify()
            .member("moduleA")
            .member("foo")
            .member("bar")
            .member("add")
            .invoke(params![1, 2])
            .expect("notify");
        tokio::time::sleep(LATENCY + Duration::from_millis(1)).await;

        let calls = instance.add_calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], params![1, 2]);
        drop(calls);

        tokio::time::sleep(LATENCY * 2).await;
        assert!(replies.borrow().is_empty());
        assert_eq!(instance.client.pending_count(), 0);
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_notify_failures_stay_silent() {
    local(async {
        let instance = new_instance();
        let replies = capture_replies(&instance.client_end);

        instance
            .client
            .notify_method("moduleA.foo.error", Params::new())
            .expect("notify error");
        instance
            .client
            .notify_method("missing.method", Params::new())
            .expect("notify missing");
        instance
            .client
            .notify_method("moduleA.foo.errorAsync", Params::new())
            .expect("notify async error");

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(replies.borrow().is_empty());
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_calls_settle_independently() {
    local(async {
        let Instance {
            client,
            server: _server,
            ..
        } = new_instance();

        let slow = client.call_method("moduleA.foo.bar.addAsync", params![10, 20]);
        let fast = client.call_method("moduleA.foo.bar.add", params![1, 1]);
        let failing = client.call_method("moduleA.foo.error", Params::new());
        let timing_out = client.call_method("moduleB.timeout", Params::new());
        assert_eq!(client.pending_count(), 4);

        let (slow, fast, failing, timing_out) = tokio::join!(slow, fast, failing, timing_out);

        assert_eq!(slow.expect("slow"), json!(30));
        assert_eq!(fast.expect("fast"), json!(2));
        assert_eq!(failing.unwrap_err().to_string(), "Error");
        assert!(timing_out.unwrap_err().is_timeout());
        assert_eq!(client.pending_count(), 0);
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_routers_sharing_a_channel() {
    local(async {
        let instance = new_instance();
        let ids = Rc::new(RequestIdFactory::new());
        let first = CallRouter::with_id_factory(
            instance.client_end.clone(),
            ClientConfig::from_millis(500),
            Rc::clone(&ids),
        );
        let second = CallRouter::with_id_factory(
            instance.client_end.clone(),
            ClientConfig::from_millis(500),
            ids,
        );

        let a = first.call_method("moduleA.foo.bar.add", params![1, 2]);
        let b = second.call_method("moduleA.foo.bar.add", params![3, 4]);
        assert_ne!(a.id(), b.id());

        let (a, b) = tokio::join!(a, b);
        assert_eq!(a.expect("first"), json!(3));
        assert_eq!(b.expect("second"), json!(7));
        assert_eq!(first.pending_count(), 0);
        assert_eq!(second.pending_count(), 0);
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_modules_can_be_removed_between_calls() {
    local(async {
        let instance = new_instance();
        let handle = instance
            .server
            .add_module("extra", Module::branch().sync_method("ping", |_| Ok("pong")))
            .expect("register extra");

        let pong = instance.client.call_method("extra.ping", Params::new()).await;
        assert_eq!(pong.expect("ping"), json!("pong"));

        assert!(handle.remove());
        let err = instance
            .client
            .call_method("extra.ping", Params::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid method");
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_closed_channel_rejects_calls() {
    local(async {
        let instance = new_instance();
        instance.client_end.close();

        let err = instance
            .client
            .call_method("moduleA.foo.bar.add", params![1, 2])
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::Channel(_)));
        assert_eq!(instance.client.pending_count(), 0);
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_dispatcher_keeps_serving_after_handle_is_dropped() {
    local(async {
        let (client_end, server_end) = local::pair(LATENCY);
        let client = CallRouter::new(client_end, ClientConfig::from_millis(500));
        {
            let server = Dispatcher::new(server_end, ServerConfig::default());
            server
                .add_module("m", Module::branch().sync_method("add", |params: Params| {
                    Ok(params.get::<i64>(0)? + params.get::<i64>(1)?)
                }))
                .expect("register m");
        }

        let sum = client.call_method("m.add", params![1, 2]).await;
        assert_eq!(sum.expect("served without a live handle"), json!(3));
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_zero_timeout_waits_for_slow_methods() {
    local(async {
        let Instance {
            client,
            server: _server,
            ..
        } = new_instance_with(ClientConfig::from_millis(0));

        let value = client
            .call_method("moduleB.timeout", Params::new())
            .await
            .expect("no timeout configured");
        assert_eq!(value, json!("Timeout"));

        let err = client
            .call_method("moduleB.timeoutError", Params::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Timeout");
        assert!(!err.is_timeout());
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_methods_reach_siblings_through_this() {
    local(async {
        let instance = new_instance();
        instance
            .server
            .add_module(
                "counter",
                Module::branch()
                    .sync_method("step", |params: Params| Ok(params.get::<i64>(0)? + 1))
                    .bound_method("twice", |this: Rc<Branch>, params: Params| async move {
                        let once: Value = this.call("step", params).await?;
                        this.call("step", Params::from(vec![once])).await
                    })
                    .bound_method("lost", |this: Rc<Branch>, params: Params| async move {
                        this.call("nowhere", params).await
                    }),
            )
            .expect("register counter");

        let value = instance
            .client
            .call()
            .member("counter")
            .member("twice")
            .invoke(params![40])
            .await
            .expect("sibling call");
        assert_eq!(value, json!(42));

        let err = instance
            .client
            .call_method("counter.lost", Params::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid method");
        assert_eq!(err.code(), Some(ErrorCode::InvalidMethod.code()));
    })
    .await;
}

//! Bidirectional calls over newline-delimited JSON on an in-memory pipe.

use std::future::Future;

use jsonrpc_bridge::channel::stream::StreamChannel;
use jsonrpc_bridge::{
    params, CallRouter, ClientConfig, Dispatcher, MethodError, Module, Params, ServerConfig,
};
use serde_json::json;

struct Peer {
    router: CallRouter,
    _dispatcher: Dispatcher,
}

fn peer<S>(stream: S, greeting: &'static str) -> Peer
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + 'static,
{
    let (reader, writer) = tokio::io::split(stream);
    let channel = StreamChannel::new(reader, writer);

    let dispatcher = Dispatcher::new(channel.clone(), ServerConfig::default());
    dispatcher
        .add_module(
            "peer",
            Module::branch()
                .sync_method("hello", move |params: Params| {
                    let name: String = params.get(0)?;
                    Ok(format!("{greeting}, {name}"))
                })
                .sync_method("fail", |_| Err::<(), _>(MethodError::new("nope"))),
        )
        .expect("register peer module");

    Peer {
        router: CallRouter::new(channel, ClientConfig::default()),
        _dispatcher: dispatcher,
    }
}

async fn local<F: Future>(f: F) -> F::Output {
    tokio::task::LocalSet::new().run_until(f).await
}

#[tokio::test]
async fn test_both_peers_call_each_other() {
    local(async {
        let (left, right) = tokio::io::duplex(4096);
        let left = peer(left, "hello");
        let right = peer(right, "bonjour");

        let from_left = left
            .router
            .call()
            .member("peer")
            .member("hello")
            .invoke(params!["left"]);
        let from_right = right.router.call_method("peer.hello", params!["right"]);

        let (from_left, from_right) = tokio::join!(from_left, from_right);
        assert_eq!(from_left.expect("left call"), json!("bonjour, left"));
        assert_eq!(from_right.expect("right call"), json!("hello, right"));
    })
    .await;
}

#[tokio::test]
async fn test_errors_cross_the_wire() {
    local(async {
        let (left, right) = tokio::io::duplex(4096);
        let left = peer(left, "hello");
        let _right = peer(right, "bonjour");

        let err = left
            .router
            .call_method("peer.fail", Params::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "nope");

        let err = left
            .router
            .call_method("peer.missing", Params::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid method");

        let err = left
            .router
            .call_method("peer.hello", params![42])
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(-32602));
        assert_eq!(left.router.pending_count(), 0);
    })
    .await;
}

//! Caller side: the call router.
//!
//! A [`CallRouter`] turns method paths into Request envelopes, tracks every
//! call that expects a reply in its pending-call table, and settles the
//! matching [`ReplyFuture`] when a Result or Error envelope arrives or the
//! configured timeout elapses.
//!
//! Method paths can be given in two equivalent ways:
//!
//! ```rust,ignore
//! // Built segment by segment, nothing is sent until `invoke`
//! router.call().member("moduleA").member("foo").member("bar").member("add").invoke(params![1, 2]);
//! // Given as one dotted string
//! router.call_method("moduleA.foo.bar.add", params![1, 2]);
//! // A segment may itself contain dots
//! router.call().member("moduleA.foo.bar.add").invoke(params![1, 2]);
//! ```
//!
//! All three put `"moduleA.foo.bar.add"` on the wire.
//!
//! # Single-Threaded Design
//!
//! Uses `Rc` and `RefCell` (no Send/Sync required). Timeouts are spawned
//! with `tokio::task::spawn_local`, so calls with a timeout must be made
//! inside a `tokio::task::LocalSet`.

mod pending;
mod reply;

use std::fmt;
use std::rc::Rc;

use serde_json::Value;
use tokio::sync::oneshot;

use crate::channel::ClientChannel;
use crate::config::ClientConfig;
use crate::envelope::{build_call, build_notify, RequestIdFactory, Response};
use crate::error::RpcError;
use crate::params::Params;

use pending::{PendingCall, PendingCalls};
pub use reply::ReplyFuture;

/// Caller side of the bridge.
///
/// Cloning yields another handle to the same router.
#[derive(Clone)]
pub struct CallRouter {
    inner: Rc<RouterInner>,
}

struct RouterInner {
    config: ClientConfig,
    channel: Rc<dyn ClientChannel>,
    ids: Rc<RequestIdFactory>,
    pending: PendingCalls,
}

impl CallRouter {
    /// Create a router with its own id sequence and register it as the
    /// channel's reply handler.
    pub fn new(channel: impl ClientChannel + 'static, config: ClientConfig) -> Self {
        Self::with_id_factory(channel, config, Rc::new(RequestIdFactory::new()))
    }

    /// Create a router drawing ids from a shared factory.
    ///
    /// Routers observing the same reply stream must share a factory so that
    /// one router never claims a reply addressed to another.
    pub fn with_id_factory(
        channel: impl ClientChannel + 'static,
        config: ClientConfig,
        ids: Rc<RequestIdFactory>,
    ) -> Self {
        let inner = Rc::new(RouterInner {
            config,
            channel: Rc::new(channel),
            ids,
            pending: PendingCalls::default(),
        });

        let router = Rc::downgrade(&inner);
        inner
            .channel
            .set_message_handler(Box::new(move |response: Response| {
                if let Some(router) = router.upgrade() {
                    router.handle_response(response);
                }
            }));

        Self { inner }
    }

    /// Start building a call path.
    pub fn call(&self) -> CallPath {
        CallPath {
            router: Rc::clone(&self.inner),
            path: MethodPath::new(),
        }
    }

    /// Call a method given as a dotted string.
    ///
    /// With a timeout configured (the default) the timer is a `spawn_local`
    /// task, so this must be called inside a `tokio::task::LocalSet`.
    pub fn call_method(&self, method: impl Into<String>, params: impl Into<Params>) -> ReplyFuture {
        self.inner.call(method.into(), params.into())
    }

    /// Start building a notification path.
    pub fn notify(&self) -> NotifyPath {
        NotifyPath {
            router: Rc::clone(&self.inner),
            path: MethodPath::new(),
        }
    }

    /// Notify a method given as a dotted string. No reply is expected.
    pub fn notify_method(
        &self,
        method: impl Into<String>,
        params: impl Into<Params>,
    ) -> Result<(), RpcError> {
        self.inner.notify(method.into(), params.into())
    }

    /// Feed an inbound reply to the router.
    ///
    /// The channel handler installed at construction calls this; embedders
    /// with their own delivery loop may call it directly.
    pub fn handle_response(&self, response: Response) {
        self.inner.handle_response(response);
    }

    /// Number of calls awaiting settlement.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// The router's configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }
}

impl RouterInner {
    fn call(self: &Rc<Self>, method: String, params: Params) -> ReplyFuture {
        if self.config.debug {
            tracing::debug!(%method, ?params, "Calling [{}]", method);
        }

        let id = self.ids.next();
        let (sender, receiver) = oneshot::channel();
        // Registered before sending: a synchronous channel may deliver the
        // reply from within `send`.
        self.pending
            .register(id, PendingCall::new(method.clone(), sender));

        if let Err(e) = self.channel.send(build_call(id, method, params)) {
            tracing::warn!(%id, error = %e, "Failed to send request");
            self.pending.complete(id, Err(RpcError::Channel(e)));
            return ReplyFuture::new(id, receiver);
        }

        if let Some(timeout) = self.config.effective_timeout() {
            let router = Rc::downgrade(self);
            let timer = tokio::task::spawn_local(async move {
                tokio::time::sleep(timeout).await;
                if let Some(router) = router.upgrade() {
                    router.pending.expire(id);
                }
            });
            self.pending.attach_timer(id, timer);
        }

        ReplyFuture::new(id, receiver)
    }

    fn notify(&self, method: String, params: Params) -> Result<(), RpcError> {
        if self.config.debug {
            tracing::debug!(%method, ?params, "Notify [{}]", method);
        }
        self.channel.send(build_notify(method, params))?;
        Ok(())
    }

    fn handle_response(&self, response: Response) {
        if self.config.debug {
            tracing::debug!(?response, "Received message");
        }

        let Some(id) = response.id else {
            tracing::error!(?response, "Invalid response");
            return;
        };

        let outcome = match response.error {
            Some(error) => Err(RpcError::Remote(error)),
            None => Ok(response.result.unwrap_or(Value::Null)),
        };

        if !self.pending.complete(id, outcome) {
            tracing::warn!(%id, "No handler for response [{}]", id);
        }
    }
}

/// Dotted method path accumulated one segment at a time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MethodPath {
    segments: Vec<String>,
}

impl MethodPath {
    /// Empty path.
    pub fn new() -> Self {
        Self::default()
    }

    /// A new path with `name` appended. `self` is left untouched.
    pub fn member(&self, name: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(name.into());
        Self { segments }
    }

    /// Segments accumulated so far.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The wire method name.
    pub fn to_method(&self) -> String {
        self.segments.join(".")
    }
}

impl fmt::Display for MethodPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_method())
    }
}

/// Call path under construction. Nothing is sent until [`CallPath::invoke`].
#[derive(Clone)]
pub struct CallPath {
    router: Rc<RouterInner>,
    path: MethodPath,
}

impl CallPath {
    /// Address a member of the current path.
    pub fn member(&self, name: impl Into<String>) -> Self {
        let name = name.into();
        if self.path.segments().is_empty() && self.router.config.debug {
            tracing::debug!(module = %name, "Getting remote module [{}]", name);
        }
        Self {
            router: Rc::clone(&self.router),
            path: self.path.member(name),
        }
    }

    /// The path accumulated so far.
    pub fn path(&self) -> &MethodPath {
        &self.path
    }

    /// Send the call. Same `LocalSet` requirement as
    /// [`CallRouter::call_method`].
    pub fn invoke(&self, params: impl Into<Params>) -> ReplyFuture {
        self.router.call(self.path.to_method(), params.into())
    }
}

/// Notification path under construction. Nothing is sent until
/// [`NotifyPath::invoke`].
#[derive(Clone)]
pub struct NotifyPath {
    router: Rc<RouterInner>,
    path: MethodPath,
}

impl NotifyPath {
    /// Address a member of the current path.
    pub fn member(&self, name: impl Into<String>) -> Self {
        Self {
            router: Rc::clone(&self.router),
            path: self.path.member(name),
        }
    }

    /// The path accumulated so far.
    pub fn path(&self) -> &MethodPath {
        &self.path
    }

    /// Send the notification.
    pub fn invoke(&self, params: impl Into<Params>) -> Result<(), RpcError> {
        self.router.notify(self.path.to_method(), params.into())
    }
}

//! In-process channel pair.
//!
//! Each endpoint implements both [`ClientChannel`] and [`ServerChannel`];
//! whatever one endpoint sends is delivered to the other endpoint's
//! handlers. Delivery always happens on a spawned local task, after the
//! configured latency, never inline inside `send`. Must be used within a
//! `tokio::task::LocalSet`.
//!
//! # Example
//!
//! ```rust,ignore
//! let (client_end, server_end) = local::pair(Duration::from_millis(100));
//! let dispatcher = Dispatcher::new(server_end, ServerConfig::default());
//! let router = CallRouter::new(client_end, ClientConfig::default());
//! ```

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use super::{ClientChannel, HandlerSet, MessageHandler, ServerChannel};
use crate::envelope::{Envelope, Request, Response};
use crate::error::ChannelError;

/// One side of an in-process channel.
#[derive(Clone)]
pub struct LocalEndpoint {
    local: Rc<HandlerSet>,
    remote: Rc<HandlerSet>,
    closed: Rc<Cell<bool>>,
    latency: Duration,
}

/// Create two connected endpoints.
///
/// `latency` delays every delivery; `Duration::ZERO` still delivers on a
/// separate task.
pub fn pair(latency: Duration) -> (LocalEndpoint, LocalEndpoint) {
    let a = Rc::new(HandlerSet::default());
    let b = Rc::new(HandlerSet::default());
    let closed = Rc::new(Cell::new(false));

    let left = LocalEndpoint {
        local: Rc::clone(&a),
        remote: Rc::clone(&b),
        closed: Rc::clone(&closed),
        latency,
    };
    let right = LocalEndpoint {
        local: b,
        remote: a,
        closed,
        latency,
    };
    (left, right)
}

impl LocalEndpoint {
    /// Send any envelope to the other endpoint.
    pub fn send_envelope(&self, envelope: Envelope) -> Result<(), ChannelError> {
        if self.closed.get() {
            return Err(ChannelError::Closed);
        }

        let remote = Rc::clone(&self.remote);
        let latency = self.latency;
        tokio::task::spawn_local(async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            remote.dispatch(envelope);
        });
        Ok(())
    }

    /// Close both endpoints. Later sends fail with [`ChannelError::Closed`];
    /// envelopes already in flight are still delivered.
    pub fn close(&self) {
        self.closed.set(true);
    }

    /// Whether the pair has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }
}

impl ClientChannel for LocalEndpoint {
    fn send(&self, request: Request) -> Result<(), ChannelError> {
        self.send_envelope(Envelope::Request(request))
    }

    fn set_message_handler(&self, handler: MessageHandler<Response>) {
        self.local.add_response_handler(handler);
    }
}

impl ServerChannel for LocalEndpoint {
    fn send(&self, response: Response) -> Result<(), ChannelError> {
        self.send_envelope(Envelope::Response(response))
    }

    fn set_message_handler(&self, handler: MessageHandler<Request>) {
        self.local.add_request_handler(handler);
    }
}

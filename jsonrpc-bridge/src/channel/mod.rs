//! Channel contract between the bridge and its transport.
//!
//! The bridge never touches bytes or sockets. An embedder supplies a
//! channel that can enqueue one envelope (`send`, fire-and-forget) and
//! deliver inbound envelopes to a registered handler. Delivery order and
//! reliability are the transport's business; lost envelopes surface as
//! caller-side timeouts.
//!
//! Two implementations ship with the crate:
//!
//! - [`local::pair`]: two in-process endpoints, used by tests and by
//!   embedders bridging tasks within one thread.
//! - [`stream::StreamChannel`]: newline-delimited JSON over any tokio
//!   `AsyncRead`/`AsyncWrite` pair.
//!
//! Both implement [`ClientChannel`] and [`ServerChannel`] on the same
//! endpoint, so one connection can carry calls in both directions.

pub mod local;
pub mod stream;

use std::cell::RefCell;
use std::rc::Rc;

use crate::envelope::{Envelope, Request, Response};
use crate::error::ChannelError;

/// Callback receiving inbound messages.
pub type MessageHandler<M> = Box<dyn Fn(M)>;

/// Caller side of a channel: sends requests, receives replies.
pub trait ClientChannel {
    /// Enqueue a request. Errors only when the channel refuses it outright.
    fn send(&self, request: Request) -> Result<(), ChannelError>;

    /// Register a handler for inbound replies. Registering several handlers
    /// fans every reply out to all of them.
    fn set_message_handler(&self, handler: MessageHandler<Response>);
}

/// Callee side of a channel: receives requests, sends replies.
pub trait ServerChannel {
    /// Enqueue a reply. Errors only when the channel refuses it outright.
    fn send(&self, response: Response) -> Result<(), ChannelError>;

    /// Register a handler for inbound requests. Registering several handlers
    /// fans every request out to all of them.
    fn set_message_handler(&self, handler: MessageHandler<Request>);
}

/// Registered handlers of one endpoint, split by direction.
#[derive(Default)]
pub(crate) struct HandlerSet {
    requests: RefCell<Vec<Rc<dyn Fn(Request)>>>,
    responses: RefCell<Vec<Rc<dyn Fn(Response)>>>,
}

impl HandlerSet {
    pub(crate) fn add_request_handler(&self, handler: MessageHandler<Request>) {
        self.requests.borrow_mut().push(Rc::from(handler));
    }

    pub(crate) fn add_response_handler(&self, handler: MessageHandler<Response>) {
        self.responses.borrow_mut().push(Rc::from(handler));
    }

    pub(crate) fn serves_requests(&self) -> bool {
        !self.requests.borrow().is_empty()
    }

    /// Hand an envelope to every handler of its direction.
    ///
    /// The handler list is cloned first so a handler may register further
    /// handlers without a borrow conflict.
    pub(crate) fn dispatch(&self, envelope: Envelope) {
        match envelope {
            Envelope::Request(request) => {
                let handlers = self.requests.borrow().clone();
                if handlers.is_empty() {
                    tracing::warn!(method = %request.method, "No request handler registered, dropping request");
                }
                for handler in handlers {
                    handler(request.clone());
                }
            }
            Envelope::Response(response) => {
                let handlers = self.responses.borrow().clone();
                if handlers.is_empty() {
                    tracing::warn!(id = ?response.id, "No response handler registered, dropping reply");
                }
                for handler in handlers {
                    handler(response.clone());
                }
            }
        }
    }
}

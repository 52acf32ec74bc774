//! # jsonrpc-bridge
//!
//! Transport-agnostic bidirectional JSON-RPC 2.0.
//!
//! Two peers exchange request, result and error envelopes over a duplex
//! channel supplied by the embedder: a socket, an in-process queue, a worker
//! bridge. Either peer may act as caller, callee, or both.
//!
//! ```text
//! ┌──────────── caller ────────────┐           ┌──────────── callee ────────────┐
//! │ CallRouter                     │  Request  │ Dispatcher                     │
//! │  call().member(..).invoke(..) ─┼──────────▶│  Namespace::resolve(path)      │
//! │  pending-call table            │           │  Method::invoke(params).await  │
//! │  ReplyFuture ◀─ settle ────────┼◀──────────┼─ Result | Error                │
//! └────────────────────────────────┘ Response  └────────────────────────────────┘
//! ```
//!
//! ## Runtime
//!
//! Everything is single-threaded (`Rc`, `RefCell`) and meant to run on a
//! tokio current-thread runtime inside a `tokio::task::LocalSet`. Timeouts,
//! request dispatch and the bundled channels spawn local tasks.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use jsonrpc_bridge::{channel::local, params, CallRouter, ClientConfig, Dispatcher, Module, ServerConfig};
//!
//! let (client_end, server_end) = local::pair(Duration::ZERO);
//!
//! let dispatcher = Dispatcher::new(server_end, ServerConfig::default());
//! dispatcher.add_module(
//!     "math",
//!     Module::branch().sync_method("add", |p| Ok(p.get::<i64>(0)? + p.get::<i64>(1)?)),
//! )?;
//!
//! let router = CallRouter::new(client_end, ClientConfig::default());
//! let sum = router.call().member("math").member("add").invoke(params![1, 2]).await?;
//! assert_eq!(sum, 3);
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

/// Channel contract and bundled transports.
pub mod channel;

/// Caller side: call router and reply futures.
pub mod client;

/// JSON text encoding of envelopes.
pub mod codec;

/// Router and dispatcher configuration.
pub mod config;

/// Envelopes, error codes and id allocation.
pub mod envelope;

/// Error types.
pub mod error;

/// Module namespace and method resolution.
pub mod namespace;

/// Positional call arguments.
pub mod params;

/// Callee side: dispatcher and module registration.
pub mod server;

#[doc(hidden)]
pub use serde_json;

pub use channel::{ClientChannel, MessageHandler, ServerChannel};
pub use client::{CallPath, CallRouter, MethodPath, NotifyPath, ReplyFuture};
pub use config::{ClientConfig, ServerConfig};
pub use envelope::{
    build_call, build_error, build_notify, build_result, Envelope, ErrorCode, ErrorObject,
    Request, RequestId, RequestIdFactory, Response, JSONRPC_VERSION,
};
pub use error::{ChannelError, DecodeError, MethodError, RegistryError, RpcError};
pub use namespace::{Branch, Method, Module, Namespace, Resolved};
pub use params::Params;
pub use server::{Dispatcher, ModuleHandle};

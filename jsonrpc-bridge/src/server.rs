//! Callee side: the dispatcher.
//!
//! A [`Dispatcher`] owns the module namespace. For every inbound request it
//! resolves the method path, invokes the callable, and answers with exactly
//! one Result or Error envelope when the request carried an id:
//!
//! | Outcome | Request with id | Notification |
//! |---------|-----------------|--------------|
//! | path does not resolve | `INVALID_METHOD`, "Invalid method" | silent |
//! | callable returns a value | Result envelope | silent |
//! | callable fails | `INTERNAL_ERROR` / `INVALID_PARAMS` | silent, logged |
//! | callable panics | `INTERNAL_ERROR` with the panic message | silent, logged |
//!
//! Failures never escape the dispatcher; later requests are served as usual.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use serde_json::Value;

use crate::channel::ServerChannel;
use crate::config::ServerConfig;
use crate::envelope::{build_error, build_result, ErrorCode, Request, Response};
use crate::error::{MethodError, RegistryError};
use crate::namespace::{Branch, Method, Module, Namespace};
use crate::params::Params;

/// Callee side of the bridge.
///
/// Cloning yields another handle to the same dispatcher.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Rc<DispatcherInner>,
}

struct DispatcherInner {
    config: ServerConfig,
    channel: Rc<dyn ServerChannel>,
    registry: RefCell<Registry>,
}

/// Namespace plus the registration token of each top-level module.
#[derive(Default)]
struct Registry {
    namespace: Namespace,
    tokens: HashMap<String, u64>,
    next_token: u64,
}

impl Dispatcher {
    /// Create a dispatcher and register it as the channel's request handler.
    ///
    /// The handler keeps the dispatcher alive: it serves requests for as long
    /// as the channel holds the handler, even after every `Dispatcher` handle
    /// has been dropped. Use [`ModuleHandle::remove`] or
    /// [`Dispatcher::remove_module`] to stop exposing a module.
    ///
    /// Each inbound request is processed on its own local task, so the
    /// dispatcher must live inside a `tokio::task::LocalSet`.
    pub fn new(channel: impl ServerChannel + 'static, config: ServerConfig) -> Self {
        let inner = Rc::new(DispatcherInner {
            config,
            channel: Rc::new(channel),
            registry: RefCell::new(Registry::default()),
        });

        let dispatcher = Rc::clone(&inner);
        inner
            .channel
            .set_message_handler(Box::new(move |request: Request| {
                let dispatcher = Rc::clone(&dispatcher);
                tokio::task::spawn_local(async move {
                    dispatcher.serve(request).await;
                });
            }));

        Self { inner }
    }

    /// Register a top-level module.
    ///
    /// Fails without touching the namespace if `name` is already taken.
    pub fn add_module(
        &self,
        name: impl Into<String>,
        module: impl Into<Module>,
    ) -> Result<ModuleHandle, RegistryError> {
        let name = name.into();
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }

        let mut registry = self.inner.registry.borrow_mut();
        if registry.namespace.root().contains(&name) {
            return Err(RegistryError::AlreadyRegistered(name));
        }

        registry.next_token += 1;
        let token = registry.next_token;
        registry.namespace.root_mut().insert(name.clone(), module.into());
        registry.tokens.insert(name.clone(), token);

        if self.inner.config.debug {
            tracing::debug!(module = %name, "Registered module [{}]", name);
        }

        Ok(ModuleHandle {
            dispatcher: Rc::downgrade(&self.inner),
            name,
            token,
        })
    }

    /// Remove a top-level module by name, whoever registered it.
    pub fn remove_module(&self, name: &str) -> bool {
        let mut registry = self.inner.registry.borrow_mut();
        registry.tokens.remove(name);
        registry.namespace.root_mut().remove(name).is_some()
    }

    /// Whether a top-level module is registered under `name`.
    pub fn has_module(&self, name: &str) -> bool {
        self.inner.registry.borrow().namespace.root().contains(name)
    }

    /// Names of the registered top-level modules, sorted.
    pub fn module_names(&self) -> Vec<String> {
        self.inner
            .registry
            .borrow()
            .namespace
            .root()
            .names()
            .map(str::to_string)
            .collect()
    }

    /// Resolve, invoke and build the reply for one request.
    ///
    /// Returns `None` for notifications. Does not touch the channel.
    ///
    /// The callable runs on a `spawn_local` task, so this must be awaited
    /// inside a `tokio::task::LocalSet`.
    pub async fn process(&self, request: Request) -> Option<Response> {
        self.inner.process(request).await
    }

    /// The dispatcher's configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }
}

impl DispatcherInner {
    async fn serve(&self, request: Request) {
        let Some(response) = self.process(request).await else {
            return;
        };
        if let Err(e) = self.channel.send(response) {
            tracing::warn!(error = %e, "Failed to send reply");
        }
    }

    async fn process(&self, request: Request) -> Option<Response> {
        if self.config.debug {
            tracing::debug!(?request, "Received message");
        }

        // The registry borrow ends with this statement, before any await.
        let resolved = self
            .registry
            .borrow()
            .namespace
            .resolve(&request.method)
            .map(|resolved| (resolved.container, resolved.method));

        let Some((container, method)) = resolved else {
            tracing::error!(method = %request.method, id = ?request.id, "Invalid method");
            return request.id.map(|id| {
                build_error(
                    id,
                    ErrorCode::InvalidMethod,
                    ErrorCode::InvalidMethod.message(),
                    None,
                )
            });
        };

        let outcome = invoke_guarded(method, container, request.params).await;
        match (request.id, outcome) {
            (Some(id), Ok(value)) => Some(build_result(id, value)),
            (Some(id), Err(err)) => {
                if self.config.debug {
                    tracing::debug!(%id, method = %request.method, error = %err, "Method failed");
                }
                Some(err.into_response(id))
            }
            (None, Ok(_)) => None,
            (None, Err(err)) => {
                tracing::warn!(method = %request.method, error = %err, "Notification failed");
                None
            }
        }
    }
}

/// Run a callable on its own local task so a panic is reported as a
/// failure instead of tearing down the dispatcher.
async fn invoke_guarded(
    method: Rc<dyn Method>,
    this: Rc<Branch>,
    params: Params,
) -> Result<Value, MethodError> {
    let task = tokio::task::spawn_local(async move { method.invoke(this, params).await });
    match task.await {
        Ok(outcome) => outcome,
        Err(join_error) if join_error.is_panic() => {
            let message = panic_message(join_error.into_panic());
            tracing::error!(%message, "Method panicked");
            Err(MethodError::new(message))
        }
        Err(join_error) => Err(MethodError::new(join_error.to_string())),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "method panicked".to_string()
    }
}

/// Handle to one module registration.
///
/// [`ModuleHandle::remove`] removes exactly the entry this handle created;
/// once it is gone, or replaced by a later registration under the same
/// name, the handle does nothing. Dropping the handle keeps the module.
#[derive(Debug)]
pub struct ModuleHandle {
    dispatcher: Weak<DispatcherInner>,
    name: String,
    token: u64,
}

impl ModuleHandle {
    /// The registered top-level name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Unregister the module. Returns whether anything was removed.
    pub fn remove(&self) -> bool {
        let Some(dispatcher) = self.dispatcher.upgrade() else {
            return false;
        };
        let mut registry = dispatcher.registry.borrow_mut();
        if registry.tokens.get(&self.name) != Some(&self.token) {
            return false;
        }
        registry.tokens.remove(&self.name);
        registry.namespace.root_mut().remove(&self.name).is_some()
    }
}

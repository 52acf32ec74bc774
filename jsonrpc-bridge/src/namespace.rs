//! Module namespace and method resolution.
//!
//! Registered modules form a tree: interior [`Branch`] nodes map names to
//! children, [`Module::Leaf`] nodes hold callables. A dotted method path is
//! resolved by walking one segment per level:
//!
//! ```text
//! "moduleA.foo.bar.add"
//!   root ──moduleA──▶ Branch ──foo──▶ Branch ──bar──▶ Branch ──add──▶ Leaf
//!                                                     └─ container ─┘
//! ```
//!
//! Dots are always path separators. A key that itself contains a dot can be
//! registered but never resolves, because the path is split before lookup.
//!
//! Every callable is invoked with `this`, the branch that immediately holds
//! it, so a callable can reach its siblings through [`Branch::call`].
//! Branches are shared through `Rc`; the dispatcher hands out the container
//! without keeping the namespace borrowed while the call runs.
//!
//! # Example
//!
//! ```rust,ignore
//! let math = Module::branch()
//!     .sync_method("add", |params| Ok(params.get::<i64>(0)? + params.get::<i64>(1)?))
//!     .method("slow_add", |params| async move {
//!         tokio::time::sleep(Duration::from_millis(100)).await;
//!         Ok::<_, MethodError>(params.get::<i64>(0)? + params.get::<i64>(1)?)
//!     })
//!     .bound_method("add_twice", |this, params| async move {
//!         let once = this.call("add", params.clone()).await?;
//!         this.call("add", params![once, params.get::<i64>(1)?]).await
//!     });
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::rc::Rc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::error::MethodError;
use crate::params::Params;

/// A callable registered in the namespace.
///
/// Closures are adapted through [`Branch::method`], [`Branch::sync_method`]
/// and [`Branch::bound_method`]; implement this trait directly for callables
/// that carry their own state.
#[async_trait(?Send)]
pub trait Method {
    /// Run the callable with positional arguments.
    ///
    /// `this` is the branch holding the callable.
    async fn invoke(&self, this: Rc<Branch>, params: Params) -> Result<Value, MethodError>;
}

struct AsyncFn<F, T> {
    f: F,
    _result: PhantomData<fn() -> T>,
}

#[async_trait(?Send)]
impl<F, Fut, T> Method for AsyncFn<F, T>
where
    F: Fn(Params) -> Fut + 'static,
    Fut: Future<Output = Result<T, MethodError>> + 'static,
    T: Serialize + 'static,
{
    async fn invoke(&self, _this: Rc<Branch>, params: Params) -> Result<Value, MethodError> {
        let value = (self.f)(params).await?;
        Ok(serde_json::to_value(value)?)
    }
}

struct SyncFn<F, T> {
    f: F,
    _result: PhantomData<fn() -> T>,
}

#[async_trait(?Send)]
impl<F, T> Method for SyncFn<F, T>
where
    F: Fn(Params) -> Result<T, MethodError> + 'static,
    T: Serialize + 'static,
{
    async fn invoke(&self, _this: Rc<Branch>, params: Params) -> Result<Value, MethodError> {
        let value = (self.f)(params)?;
        Ok(serde_json::to_value(value)?)
    }
}

struct BoundFn<F, T> {
    f: F,
    _result: PhantomData<fn() -> T>,
}

#[async_trait(?Send)]
impl<F, Fut, T> Method for BoundFn<F, T>
where
    F: Fn(Rc<Branch>, Params) -> Fut + 'static,
    Fut: Future<Output = Result<T, MethodError>> + 'static,
    T: Serialize + 'static,
{
    async fn invoke(&self, this: Rc<Branch>, params: Params) -> Result<Value, MethodError> {
        let value = (self.f)(this, params).await?;
        Ok(serde_json::to_value(value)?)
    }
}

/// A node of the namespace tree.
#[derive(Clone)]
pub enum Module {
    /// A callable.
    Leaf(Rc<dyn Method>),
    /// A mapping from member names to nested modules.
    Branch(Rc<Branch>),
}

impl Module {
    /// Start an empty branch.
    pub fn branch() -> Branch {
        Branch::new()
    }

    /// Wrap a callable.
    pub fn leaf<M: Method + 'static>(method: M) -> Self {
        Module::Leaf(Rc::new(method))
    }

    /// Wrap an async closure.
    pub fn from_fn<F, Fut, T>(f: F) -> Self
    where
        F: Fn(Params) -> Fut + 'static,
        Fut: Future<Output = Result<T, MethodError>> + 'static,
        T: Serialize + 'static,
    {
        Module::leaf(AsyncFn {
            f,
            _result: PhantomData,
        })
    }

    /// Wrap a synchronous closure.
    pub fn from_sync_fn<F, T>(f: F) -> Self
    where
        F: Fn(Params) -> Result<T, MethodError> + 'static,
        T: Serialize + 'static,
    {
        Module::leaf(SyncFn {
            f,
            _result: PhantomData,
        })
    }

    /// Wrap an async closure that receives its container as `this`.
    pub fn from_bound_fn<F, Fut, T>(f: F) -> Self
    where
        F: Fn(Rc<Branch>, Params) -> Fut + 'static,
        Fut: Future<Output = Result<T, MethodError>> + 'static,
        T: Serialize + 'static,
    {
        Module::leaf(BoundFn {
            f,
            _result: PhantomData,
        })
    }
}

impl From<Branch> for Module {
    fn from(branch: Branch) -> Self {
        Module::Branch(Rc::new(branch))
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Module::Leaf(_) => f.write_str("Leaf(..)"),
            Module::Branch(branch) => fmt::Debug::fmt(branch, f),
        }
    }
}

/// Interior node: member name to child module.
#[derive(Clone, Default)]
pub struct Branch {
    members: BTreeMap<String, Module>,
}

impl Branch {
    /// Empty branch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an async callable.
    pub fn method<F, Fut, T>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Params) -> Fut + 'static,
        Fut: Future<Output = Result<T, MethodError>> + 'static,
        T: Serialize + 'static,
    {
        self.module(name, Module::from_fn(f))
    }

    /// Add a synchronous callable.
    pub fn sync_method<F, T>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Params) -> Result<T, MethodError> + 'static,
        T: Serialize + 'static,
    {
        self.module(name, Module::from_sync_fn(f))
    }

    /// Add an async callable that receives this branch as `this`.
    pub fn bound_method<F, Fut, T>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Rc<Branch>, Params) -> Fut + 'static,
        Fut: Future<Output = Result<T, MethodError>> + 'static,
        T: Serialize + 'static,
    {
        self.module(name, Module::from_bound_fn(f))
    }

    /// Add a nested module, replacing any member of the same name.
    pub fn module(mut self, name: impl Into<String>, module: impl Into<Module>) -> Self {
        self.members.insert(name.into(), module.into());
        self
    }

    /// Look up a direct member.
    pub fn get(&self, name: &str) -> Option<&Module> {
        self.members.get(name)
    }

    /// Whether a direct member exists.
    pub fn contains(&self, name: &str) -> bool {
        self.members.contains_key(name)
    }

    /// Names of the direct members, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.members.keys().map(String::as_str)
    }

    /// Number of direct members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the branch has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub(crate) fn insert(&mut self, name: String, module: Module) {
        self.members.insert(name, module);
    }

    pub(crate) fn remove(&mut self, name: &str) -> Option<Module> {
        self.members.remove(name)
    }

    /// Resolve a dotted path relative to this branch.
    ///
    /// Returns `None` when a segment is empty or missing, when a non-final
    /// segment names a leaf, or when the final segment names a branch.
    pub fn resolve<'a>(self: &Rc<Self>, path: &'a str) -> Option<Resolved<'a>> {
        let mut container = Rc::clone(self);
        let mut segments = path.split('.').peekable();

        while let Some(name) = segments.next() {
            if name.is_empty() {
                return None;
            }
            let member = container.get(name)?.clone();

            match (member, segments.peek().is_some()) {
                (Module::Branch(branch), true) => container = branch,
                (Module::Leaf(method), false) => {
                    return Some(Resolved {
                        container,
                        name,
                        method,
                    })
                }
                _ => return None,
            }
        }

        None
    }

    /// Invoke a callable by its path relative to this branch.
    ///
    /// A callable given `this` uses it to call its siblings by name.
    pub async fn call(self: &Rc<Self>, path: &str, params: Params) -> Result<Value, MethodError> {
        let Some(Resolved {
            container, method, ..
        }) = self.resolve(path)
        else {
            return Err(MethodError::InvalidMethod(path.to_string()));
        };
        method.invoke(container, params).await
    }
}

impl fmt::Debug for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.members.iter()).finish()
    }
}

/// Outcome of a successful resolution.
pub struct Resolved<'a> {
    /// The branch immediately holding the callable, passed as `this`.
    pub container: Rc<Branch>,
    /// The final path segment.
    pub name: &'a str,
    /// The callable, detached from the tree so the tree can be released
    /// before invocation.
    pub method: Rc<dyn Method>,
}

/// Root of the registered modules.
#[derive(Debug, Default)]
pub struct Namespace {
    root: Rc<Branch>,
}

impl Namespace {
    /// Empty namespace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a dotted method path.
    pub fn resolve<'a>(&self, path: &'a str) -> Option<Resolved<'a>> {
        self.root.resolve(path)
    }

    /// The top-level branch.
    pub fn root(&self) -> &Branch {
        &self.root
    }

    /// Copy-on-write access: calls still running keep the root they
    /// resolved against.
    pub(crate) fn root_mut(&mut self) -> &mut Branch {
        Rc::make_mut(&mut self.root)
    }
}

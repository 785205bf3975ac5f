//! Polymorphic invocation
//!
//! Every invocable thing (plain function, method body, accessor body, cached
//! wrapper, the wrapper factory) implements [`Invoke`]. A [`Callable`] is the
//! shared handle to one of them; its allocation is its identity.

use crate::error::{MemoError, Result};
use crate::memoizer::CacheCore;
use crate::object::Context;
use crate::value::Value;
use std::fmt;
use std::sync::Arc;

/// Capability to run with a receiver and an argument list
pub trait Invoke: Send + Sync {
    /// Call with `receiver` bound as the context
    fn invoke(&self, receiver: &Context, args: &[Value]) -> Result<Value>;

    /// Call as a constructor. Most callables are not constructors.
    fn construct(&self, _args: &[Value]) -> Result<Value> {
        Err(MemoError::UsageError(
            "callable cannot be used as a constructor".to_string(),
        ))
    }
}

struct FnBody<F>(F);

impl<F> Invoke for FnBody<F>
where
    F: Fn(&Context, &[Value]) -> Result<Value> + Send + Sync,
{
    fn invoke(&self, receiver: &Context, args: &[Value]) -> Result<Value> {
        (self.0)(receiver, args)
    }
}

enum Body {
    Plain(Arc<dyn Invoke>),
    Cached(Arc<CacheCore>),
}

struct CallableInner {
    name: String,
    body: Body,
}

/// Shared handle to an invocable body
#[derive(Clone)]
pub struct Callable {
    inner: Arc<CallableInner>,
}

impl Callable {
    /// Wrap any [`Invoke`] implementation
    pub fn new(name: impl Into<String>, body: impl Invoke + 'static) -> Self {
        Self {
            inner: Arc::new(CallableInner {
                name: name.into(),
                body: Body::Plain(Arc::new(body)),
            }),
        }
    }

    /// Wrap a closure taking the receiver and the arguments
    pub fn from_fn<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Context, &[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        Self::new(name, FnBody(f))
    }

    /// Closure without a display name
    pub fn anonymous<F>(f: F) -> Self
    where
        F: Fn(&Context, &[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        Self::from_fn(String::new(), f)
    }

    pub(crate) fn from_cache(name: impl Into<String>, core: Arc<CacheCore>) -> Self {
        Self {
            inner: Arc::new(CallableInner {
                name: name.into(),
                body: Body::Cached(core),
            }),
        }
    }

    /// Display name; empty when anonymous
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Invoke with `receiver` bound as the context
    pub fn call(&self, receiver: &Context, args: &[Value]) -> Result<Value> {
        match &self.inner.body {
            Body::Plain(body) => body.invoke(receiver, args),
            Body::Cached(core) => core.invoke(receiver, args),
        }
    }

    /// Invoke without a receiver
    pub fn call_detached(&self, args: &[Value]) -> Result<Value> {
        self.call(&Context::Detached, args)
    }

    /// Invoke as a constructor
    pub fn construct(&self, args: &[Value]) -> Result<Value> {
        match &self.inner.body {
            Body::Plain(body) => body.construct(args),
            Body::Cached(core) => core.construct(args),
        }
    }

    /// True if this callable is a memoizing wrapper
    pub fn is_cached(&self) -> bool {
        matches!(self.inner.body, Body::Cached(_))
    }

    pub(crate) fn cache_core(&self) -> Option<&Arc<CacheCore>> {
        match &self.inner.body {
            Body::Cached(core) => Some(core),
            Body::Plain(_) => None,
        }
    }

    pub fn ptr_eq(&self, other: &Callable) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn addr(&self) -> usize {
        Arc::as_ptr(&self.inner) as *const () as usize
    }

    pub(crate) fn strong_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = if self.name().is_empty() {
            "<anonymous>"
        } else {
            self.name()
        };
        if self.is_cached() {
            write!(f, "Function(cached {})", name)
        } else {
            write!(f, "Function({})", name)
        }
    }
}

//! # Route handlers.
//!
//! A [`Handler`] produces a fresh future per call. Handlers capture the
//! component handles they need (supervisor, bus, ...) at registration time.
//!
//! ## Example
//! ```rust
//! use neurovisor::{Handler, HandlerError, HandlerFn, Payload, RouteContext};
//!
//! let h = HandlerFn::arc(|payload: Payload, _ctx: RouteContext| async move {
//!     match payload.as_i64() {
//!         Some(n) => Ok(Payload::from(n * 2)),
//!         None => Err(HandlerError::BadRequest("expected a number".into())),
//!     }
//! });
//! # let _ = h;
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::Payload;
use crate::error::HandlerError;

/// Boxed future returned by [`Handler::call`].
pub type BoxHandlerFuture = Pin<Box<dyn Future<Output = Result<Payload, HandlerError>> + Send + 'static>>;

/// Caller-supplied metadata passed through to the handler.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteContext {
    /// Who asked, if known.
    pub caller: Option<String>,
    /// Free-form request metadata.
    pub meta: Payload,
}

impl RouteContext {
    pub fn with_caller(mut self, caller: impl Into<String>) -> Self {
        self.caller = Some(caller.into());
        self
    }

    pub fn with_meta(mut self, meta: Payload) -> Self {
        self.meta = meta;
        self
    }
}

/// Request handler bound to a `(category, key)` route.
pub trait Handler: Send + Sync + 'static {
    /// Creates the future serving one request.
    fn call(&self, payload: Payload, ctx: RouteContext) -> BoxHandlerFuture;
}

/// Closure-backed [`Handler`].
pub struct HandlerFn<F> {
    f: F,
}

impl<F> HandlerFn<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F, Fut> HandlerFn<F>
where
    F: Fn(Payload, RouteContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Payload, HandlerError>> + Send + 'static,
{
    /// Wraps the closure as a shared handler.
    pub fn arc(f: F) -> Arc<dyn Handler> {
        Arc::new(Self::new(f))
    }
}

impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(Payload, RouteContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Payload, HandlerError>> + Send + 'static,
{
    fn call(&self, payload: Payload, ctx: RouteContext) -> BoxHandlerFuture {
        Box::pin((self.f)(payload, ctx))
    }
}

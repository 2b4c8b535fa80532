//! Method actions and the interceptor chain
//!
//! Interceptors run in registration order before a method's action. Each one
//! receives a `Next` continuation; returning without calling `Next::run`
//! short-circuits the rest of the chain and the action.

use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use switchboard_model::{BoxError, Parameters};

/// Future returned by actions and interceptors. `Ok(None)` means "no value".
pub type MethodFuture = Pin<Box<dyn Future<Output = Result<Option<Value>, BoxError>> + Send + 'static>>;

/// Handler bound to a command name.
pub type MethodAction = Arc<dyn Fn(Option<String>, Parameters) -> MethodFuture + Send + Sync>;

/// Middleware step run before an action.
pub type Interceptor = Arc<dyn Fn(Option<String>, Parameters, Next) -> MethodFuture + Send + Sync>;

/// Wrap an async closure as a `MethodAction`.
pub fn action<F, Fut>(f: F) -> MethodAction
where
    F: Fn(Option<String>, Parameters) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<Value>, BoxError>> + Send + 'static,
{
    Arc::new(move |cid, args| Box::pin(f(cid, args)))
}

/// Wrap an async closure as an `Interceptor`.
pub fn interceptor<F, Fut>(f: F) -> Interceptor
where
    F: Fn(Option<String>, Parameters, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<Value>, BoxError>> + Send + 'static,
{
    Arc::new(move |cid, args, next| Box::pin(f(cid, args, next)))
}

/// The remainder of an interceptor chain.
pub struct Next {
    interceptors: Arc<[Interceptor]>,
    index: usize,
    action: MethodAction,
}

impl Next {
    pub fn new(interceptors: Arc<[Interceptor]>, action: MethodAction) -> Self {
        Self {
            interceptors,
            index: 0,
            action,
        }
    }

    /// Advance to the next interceptor, or the action once the chain is done.
    pub fn run(self, correlation_id: Option<String>, args: Parameters) -> MethodFuture {
        match self.interceptors.get(self.index).cloned() {
            Some(step) => {
                let next = Next {
                    index: self.index + 1,
                    ..self
                };
                step(correlation_id, args, next)
            }
            None => (self.action)(correlation_id, args),
        }
    }
}

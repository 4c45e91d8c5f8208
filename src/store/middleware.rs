//! Middleware - Interceptors threaded through every `set_state`.
//!
//! A middleware sees the in-flight patch before it is committed and may
//! replace it. The chain runs strictly in the order the store was given;
//! each middleware observes what the earlier ones did.
//!
//! # Example
//!
//! ```ignore
//! use spark_elements::store::{middleware_fn, Store, StoreInit};
//!
//! let double = middleware_fn("double", |ctx| {
//!     let n = ctx.next_state().get("n").and_then(|v| v.as_i64()).unwrap_or(0);
//!     let mut patch = ctx.next_state().clone();
//!     patch.insert("n".into(), (n * 2).into());
//!     Ok(Some(patch))
//! });
//!
//! let store = Store::new(|_| StoreInit::default(), vec![Box::new(double)]);
//! ```

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use tracing::{error, trace};

use super::{Patch, StateMap, StoreHandle, merge, merge_into};
use crate::error::MiddlewareError;

/// Result of one interception: `Some(patch)` replaces the pending patch,
/// `None` lets it through unchanged.
pub type InterceptResult = Result<Option<StateMap>, MiddlewareError>;

/// An interception point in the store's update pipeline.
pub trait Middleware {
    /// Name used in log events and error reports.
    fn name(&self) -> &str;

    /// Observe and optionally rewrite the pending patch.
    ///
    /// Middlewares that do deferred work (network, timers) return
    /// `Ok(None)` immediately and later call [`StoreHandle::set_state`]
    /// through [`MiddlewareContext::store`] when the work completes.
    fn intercept(&self, ctx: &mut MiddlewareContext<'_>) -> InterceptResult;

    /// Called with the new snapshot after it is committed and before
    /// subscribers are notified. Faults are logged like `intercept` faults.
    fn committed(&self, _state: &StateMap) -> Result<(), MiddlewareError> {
        Ok(())
    }
}

// =============================================================================
// Context
// =============================================================================

/// What a middleware can see and touch during one `set_state`.
pub struct MiddlewareContext<'a> {
    previous: &'a StateMap,
    running: StateMap,
    pending: StateMap,
    store: &'a StoreHandle,
}

impl<'a> MiddlewareContext<'a> {
    pub(crate) fn new(previous: &'a StateMap, pending: StateMap, store: &'a StoreHandle) -> Self {
        Self {
            previous,
            running: previous.clone(),
            pending,
            store,
        }
    }

    /// Running state: the committed state plus every patch earlier
    /// middlewares returned or wrote.
    pub fn get_state(&self) -> &StateMap {
        &self.running
    }

    /// Merge into the running state seen by later middlewares.
    ///
    /// This does not touch the pending patch, so it does not reach the
    /// committed state on its own. Return a patch to change what commits.
    pub fn set_state(&mut self, patch: impl Into<Patch>) {
        if let Some(resolved) = patch.into().resolve(&self.running) {
            merge_into(&mut self.running, &resolved);
        }
    }

    /// The patch that will be committed if nothing later replaces it.
    pub fn next_state(&self) -> &StateMap {
        &self.pending
    }

    /// Committed state from before this update started.
    pub fn previous_state(&self) -> &StateMap {
        self.previous
    }

    /// State that would be committed if the chain ended here.
    pub fn committed_preview(&self) -> StateMap {
        merge(self.previous, &self.pending)
    }

    /// Handle to the owning store, for deferred follow-up updates.
    pub fn store(&self) -> &StoreHandle {
        self.store
    }
}

// =============================================================================
// Closure Middleware
// =============================================================================

/// Middleware backed by a closure.
pub struct FnMiddleware<F> {
    name: String,
    f: F,
}

/// Wrap a closure as a named [`Middleware`].
pub fn middleware_fn<F>(name: impl Into<String>, f: F) -> FnMiddleware<F>
where
    F: Fn(&mut MiddlewareContext<'_>) -> InterceptResult,
{
    FnMiddleware {
        name: name.into(),
        f,
    }
}

impl<F> Middleware for FnMiddleware<F>
where
    F: Fn(&mut MiddlewareContext<'_>) -> InterceptResult,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn intercept(&self, ctx: &mut MiddlewareContext<'_>) -> InterceptResult {
        (self.f)(ctx)
    }
}

// =============================================================================
// Chain
// =============================================================================

/// Thread `patch` through `middlewares` and return the final pending patch.
///
/// A middleware that errors or panics is logged and skipped: the running
/// state and pending patch are restored to what it was handed.
pub(crate) fn run_chain(
    middlewares: &[Box<dyn Middleware>],
    previous: &StateMap,
    patch: StateMap,
    store: &StoreHandle,
) -> StateMap {
    let mut ctx = MiddlewareContext::new(previous, patch, store);

    for middleware in middlewares {
        let saved_running = ctx.running.clone();
        let saved_pending = ctx.pending.clone();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| middleware.intercept(&mut ctx)));

        let fault = match outcome {
            Ok(Ok(Some(replacement))) => {
                trace!(middleware = middleware.name(), "patch replaced");
                merge_into(&mut ctx.running, &replacement);
                ctx.pending = replacement;
                None
            }
            Ok(Ok(None)) => None,
            Ok(Err(err)) => Some(err),
            Err(payload) => Some(MiddlewareError::Panicked {
                middleware: middleware.name().to_string(),
                message: panic_message(&payload),
            }),
        };

        if let Some(err) = fault {
            error!(middleware = middleware.name(), error = %err, "middleware fault, continuing");
            ctx.running = saved_running;
            ctx.pending = saved_pending;
        }
    }

    ctx.pending
}

/// Hand the committed snapshot to every middleware's `committed` hook.
///
/// Chain order is kept. A hook that errors or panics is logged and the
/// rest still run.
pub(crate) fn run_committed(middlewares: &[Box<dyn Middleware>], state: &StateMap) {
    for middleware in middlewares {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| middleware.committed(state)));
        let fault = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(err),
            Err(payload) => Some(MiddlewareError::Panicked {
                middleware: middleware.name().to_string(),
                message: panic_message(&payload),
            }),
        };
        if let Some(err) = fault {
            error!(middleware = middleware.name(), error = %err, "post-commit hook fault, continuing");
        }
    }
}

fn panic_message(payload: &Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

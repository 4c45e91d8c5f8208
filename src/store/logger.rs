//! Logger - Trace every patch as it passes through the chain.

use serde_json::Value;
use tracing::debug;

use super::{InterceptResult, Middleware, MiddlewareContext};

/// Emits one `tracing` event per update with the pending patch and the
/// state it would produce. Never rewrites anything.
#[derive(Debug, Clone)]
pub struct LoggerMiddleware {
    label: String,
    verbose: bool,
}

impl LoggerMiddleware {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            verbose: false,
        }
    }

    /// Also log the full would-be state, not just the patch.
    pub fn verbose(mut self) -> Self {
        self.verbose = true;
        self
    }
}

impl Default for LoggerMiddleware {
    fn default() -> Self {
        Self::new("store")
    }
}

impl Middleware for LoggerMiddleware {
    fn name(&self) -> &str {
        "logger"
    }

    fn intercept(&self, ctx: &mut MiddlewareContext<'_>) -> InterceptResult {
        let patch = Value::Object(ctx.next_state().clone());
        if self.verbose {
            let next = Value::Object(ctx.committed_preview());
            debug!(store = %self.label, %patch, %next, "set_state");
        } else {
            debug!(store = %self.label, %patch, "set_state");
        }
        Ok(None)
    }
}

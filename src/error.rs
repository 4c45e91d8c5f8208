//! Error types.
//!
//! Each concern has its own enum; [`Error`] wraps them for callers that just
//! want one type. Nothing here is fatal: every failure path in the crate logs
//! through `tracing` and continues where it can.

use thiserror::Error;

use crate::types::NodeId;

/// Store-level failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unknown action: {name}")]
    UnknownAction { name: String },

    #[error("store has been dropped")]
    Dropped,
}

/// Failure reported by a single middleware's `intercept`.
///
/// The store catches these, logs them, and carries on with the patch the
/// middleware was handed.
#[derive(Debug, Error)]
pub enum MiddlewareError {
    #[error("middleware `{middleware}` rejected the patch: {reason}")]
    Rejected { middleware: String, reason: String },

    #[error("middleware `{middleware}` panicked: {message}")]
    Panicked { middleware: String, message: String },

    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// Persistence surface failures.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("persisted value under `{key}` is not a JSON object")]
    NotAnObject { key: String },

    #[error("storage write failed for `{key}`: {reason}")]
    Write { key: String, reason: String },
}

/// Component registration failures.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("invalid custom element tag name: {tag:?}")]
    InvalidTagName { tag: String },
}

/// Document / page mounting failures.
#[derive(Debug, Error)]
pub enum MountError {
    #[error("no element matches root selector {selector:?}")]
    RootNotFound { selector: String },

    #[error("node {node} does not exist")]
    UnknownNode { node: NodeId },

    #[error("cannot append {child} to {parent}: would create a cycle")]
    Cycle { parent: NodeId, child: NodeId },

    #[error("node {node} is not an element")]
    NotAnElement { node: NodeId },

    #[error("the body element cannot be released")]
    ReleaseBody,

    #[error("custom element {tag:?} is already defined")]
    AlreadyDefined { tag: String },

    #[error("no page registered for route {path:?}")]
    RouteNotFound { path: String },
}

/// Configuration failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {field} {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Crate-wide error.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Middleware(#[from] MiddlewareError),

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Mount(#[from] MountError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

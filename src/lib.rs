//! # spark-elements
//!
//! Reactive state and custom-element components over an in-memory document.
//!
//! ## Architecture
//!
//! State lives in two kinds of container: [`ReactiveCell`] holds one value
//! and notifies on change, [`Store`] holds a JSON-like map, runs every
//! update through a middleware chain and lets subscribers see the
//! committed snapshot.
//!
//! Components are render functions registered under a tag name. The
//! registry renders each connected host element exactly once, whether it
//! arrives through a connect hook or a later scan:
//!
//! ```text
//! Store / ReactiveCell ──► render fn ──► Document ──► mutation batch ──► scan
//! ```
//!
//! ## Modules
//!
//! - [`reactive`] - Single-value observable cell
//! - [`store`] - Store, middleware chain, logger and persistence
//! - [`dom`] - In-memory element tree with connect hooks, events and mutation batches
//! - [`engine`] - Component registry
//! - [`router`] - Page rendering and path lookup
//! - [`i18n`] - Translator capability and string catalog
//! - [`pipeline`] - Application context and event loop turns
//! - [`config`] - Application settings

pub mod config;
pub mod dom;
pub mod engine;
pub mod error;
pub mod i18n;
pub mod pipeline;
pub mod reactive;
pub mod router;
pub mod store;
pub mod types;

// Re-export commonly used items
pub use types::*;

pub use config::AppConfig;

pub use error::{
    ConfigError, Error, MiddlewareError, MountError, PersistError, RegistryError, Result,
    StoreError,
};

pub use reactive::ReactiveCell;

pub use store::{
    KeyValueStorage, LoggerMiddleware, MemoryStorage, Middleware, MiddlewareContext, Patch,
    PersistMiddleware, State, StateMap, Store, StoreHandle, StoreInit, create_store, hydrate,
    hydrate_or, merge, middleware_fn, state_map,
};

pub use dom::{Document, Event, MutationBatch, MutationRecord, TreeMutationSource};

pub use engine::{ComponentRegistry, Host, RenderFn, RenderResult};

pub use router::{PageRenderer, Routes, page};

pub use i18n::{Catalog, Translator};

pub use pipeline::{App, mount, unmount};

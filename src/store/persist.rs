//! Persistence - Save the committed state under a single storage key.
//!
//! The stored value is the JSON serialization of the whole state mapping.
//! [`PersistMiddleware`] writes it after every commit; [`hydrate`] reads it
//! back when the next store is created.
//!
//! # Example
//!
//! ```ignore
//! use std::rc::Rc;
//! use spark_elements::store::{MemoryStorage, PersistMiddleware, Store, StoreInit, hydrate_or};
//!
//! let storage = Rc::new(MemoryStorage::new());
//! let store = Store::new(
//!     |_| StoreInit::new(hydrate_or(storage.as_ref(), "app-state", Default::default())),
//!     vec![Box::new(PersistMiddleware::new(storage.clone(), "app-state"))],
//! );
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value;
use tracing::{debug, warn};

use super::{InterceptResult, Middleware, MiddlewareContext, StateMap, merge};
use crate::error::{MiddlewareError, PersistError};

// =============================================================================
// Storage Surface
// =============================================================================

/// String key/value storage, shaped like a browser's `localStorage`.
pub trait KeyValueStorage {
    fn get_item(&self, key: &str) -> Option<String>;
    fn set_item(&self, key: &str, value: &str) -> Result<(), PersistError>;
    fn remove_item(&self, key: &str);
}

/// In-process storage. Clones share the same contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    items: Rc<RefCell<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        self.items.borrow().get(key).cloned()
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), PersistError> {
        self.items
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) {
        self.items.borrow_mut().remove(key);
    }
}

// =============================================================================
// Middleware
// =============================================================================

/// Writes every committed snapshot to storage.
///
/// The write happens in the post-commit hook, so the stored value is the
/// committed state wherever the middleware sits in the chain. It never
/// rewrites the patch; a failed write is logged and the update stays
/// committed.
pub struct PersistMiddleware {
    storage: Rc<dyn KeyValueStorage>,
    key: String,
}

impl PersistMiddleware {
    pub fn new(storage: Rc<dyn KeyValueStorage>, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Middleware for PersistMiddleware {
    fn name(&self) -> &str {
        "persist"
    }

    fn intercept(&self, _ctx: &mut MiddlewareContext<'_>) -> InterceptResult {
        Ok(None)
    }

    fn committed(&self, state: &StateMap) -> Result<(), MiddlewareError> {
        let serialized = serde_json::to_string(state).map_err(PersistError::from)?;
        self.storage.set_item(&self.key, &serialized)?;
        debug!(key = %self.key, bytes = serialized.len(), "state persisted");
        Ok(())
    }
}

// =============================================================================
// Hydration
// =============================================================================

/// Load the state persisted under `key`.
///
/// `Ok(None)` when nothing has been stored yet.
pub fn hydrate(storage: &dyn KeyValueStorage, key: &str) -> Result<Option<StateMap>, PersistError> {
    let Some(raw) = storage.get_item(key) else {
        return Ok(None);
    };
    match serde_json::from_str::<Value>(&raw)? {
        Value::Object(map) => Ok(Some(map)),
        _ => Err(PersistError::NotAnObject {
            key: key.to_string(),
        }),
    }
}

/// `defaults` with any persisted state merged over it.
///
/// Unreadable persisted data is logged and ignored.
pub fn hydrate_or(storage: &dyn KeyValueStorage, key: &str, defaults: StateMap) -> StateMap {
    match hydrate(storage, key) {
        Ok(Some(persisted)) => merge(&defaults, &persisted),
        Ok(None) => defaults,
        Err(err) => {
            warn!(key, error = %err, "discarding unreadable persisted state");
            defaults
        }
    }
}

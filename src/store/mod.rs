//! Store - Mapping-valued state with actions, middleware and subscribers.
//!
//! One store is typically created by the application entry point and shared
//! by every component that needs global state.
//!
//! # Update Pipeline
//!
//! ```text
//! set_state(partial)
//!   → resolve (mapping, or function of current state)
//!   → middleware[0] → middleware[1] → ... (each may replace the patch)
//!   → commit merge(previous, final patch)
//!   → middleware `committed` hooks with the new snapshot
//!   → notify subscribers with the new snapshot
//! ```
//!
//! Merges are shallow: a key in the patch replaces the whole value under
//! that key, nested objects included.
//!
//! # Example
//!
//! ```ignore
//! use serde_json::json;
//! use spark_elements::store::{Patch, Store, StoreInit, state_map};
//!
//! let store = Store::new(
//!     |handle| {
//!         let handle = handle.clone();
//!         StoreInit::new(state_map(json!({ "count": 0 })))
//!             .action("increment", move |_| {
//!                 handle.set_state(Patch::update(|s| {
//!                     let n = s["count"].as_i64().unwrap_or(0);
//!                     state_map(json!({ "count": n + 1 }))
//!                 }));
//!             })
//!     },
//!     vec![],
//! );
//!
//! store.dispatch("increment", json!(null))?;
//! ```

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::types::Unsubscribe;

mod logger;
mod middleware;
mod persist;

pub use logger::LoggerMiddleware;
pub use middleware::{FnMiddleware, InterceptResult, Middleware, MiddlewareContext, middleware_fn};
pub use persist::{KeyValueStorage, MemoryStorage, PersistMiddleware, hydrate, hydrate_or};

// =============================================================================
// State Types
// =============================================================================

/// Plain key/value state mapping.
pub type StateMap = serde_json::Map<String, Value>;

/// Committed snapshot. Replaced wholesale on every update, never mutated.
pub type State = Rc<StateMap>;

/// Named operation exposed on the store.
pub type Action = Rc<dyn Fn(Value)>;

type Listener = Rc<dyn Fn(&State)>;

/// Build a [`StateMap`] from a JSON object value.
///
/// Non-object values yield an empty map.
pub fn state_map(value: Value) -> StateMap {
    match value {
        Value::Object(map) => map,
        _ => StateMap::new(),
    }
}

/// Shallow merge: keys in `patch` overwrite keys in `base`.
pub fn merge(base: &StateMap, patch: &StateMap) -> StateMap {
    let mut merged = base.clone();
    merge_into(&mut merged, patch);
    merged
}

pub(crate) fn merge_into(base: &mut StateMap, patch: &StateMap) {
    for (key, value) in patch {
        base.insert(key.clone(), value.clone());
    }
}

// =============================================================================
// Patch
// =============================================================================

/// Argument to `set_state`.
pub enum Patch {
    /// Partial mapping merged onto the current state.
    Map(StateMap),
    /// Function of the current state returning the partial mapping.
    Update(Box<dyn FnOnce(&StateMap) -> StateMap>),
    /// A value that is not a mapping. Logged and dropped.
    Malformed(Value),
}

impl Patch {
    /// Patch computed from the current state.
    pub fn update(f: impl FnOnce(&StateMap) -> StateMap + 'static) -> Self {
        Self::Update(Box::new(f))
    }

    pub(crate) fn resolve(self, current: &StateMap) -> Option<StateMap> {
        match self {
            Self::Map(map) => Some(map),
            Self::Update(f) => Some(f(current)),
            Self::Malformed(value) => {
                warn!(patch = %value, "ignoring non-object state patch");
                None
            }
        }
    }
}

impl From<StateMap> for Patch {
    fn from(map: StateMap) -> Self {
        Self::Map(map)
    }
}

impl From<Value> for Patch {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::Map(map),
            other => Self::Malformed(other),
        }
    }
}

impl fmt::Debug for Patch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Map(map) => f.debug_tuple("Map").field(map).finish(),
            Self::Update(_) => f.write_str("Update(..)"),
            Self::Malformed(value) => f.debug_tuple("Malformed").field(value).finish(),
        }
    }
}

// =============================================================================
// Initializer
// =============================================================================

/// Initial state and actions returned by a store initializer.
#[derive(Default)]
pub struct StoreInit {
    pub state: StateMap,
    pub actions: HashMap<String, Action>,
}

impl StoreInit {
    pub fn new(state: StateMap) -> Self {
        Self {
            state,
            actions: HashMap::new(),
        }
    }

    /// Add a named action.
    pub fn action(mut self, name: impl Into<String>, f: impl Fn(Value) + 'static) -> Self {
        self.actions.insert(name.into(), Rc::new(f));
        self
    }
}

// =============================================================================
// Store
// =============================================================================

struct StoreInner {
    state: RefCell<State>,
    listeners: RefCell<Vec<(usize, Listener)>>,
    next_id: Cell<usize>,
    middlewares: Vec<Box<dyn Middleware>>,
    actions: HashMap<String, Action>,
}

/// Shared handle to a store. Clones refer to the same state.
#[derive(Clone)]
pub struct Store {
    inner: Rc<StoreInner>,
}

/// Weak handle given to initializers, actions and middlewares.
///
/// Holding it does not keep the store alive, so actions stored inside the
/// store do not form a reference cycle.
#[derive(Clone)]
pub struct StoreHandle {
    inner: Weak<StoreInner>,
}

impl Store {
    /// Create a store.
    ///
    /// `initializer` receives a [`StoreHandle`] for its actions to close
    /// over. The handle is not usable until `new` returns; updates issued
    /// from inside the initializer are dropped with a warning.
    pub fn new(
        initializer: impl FnOnce(&StoreHandle) -> StoreInit,
        middlewares: Vec<Box<dyn Middleware>>,
    ) -> Self {
        let inner = Rc::new_cyclic(|weak: &Weak<StoreInner>| {
            let handle = StoreHandle {
                inner: weak.clone(),
            };
            let init = initializer(&handle);
            StoreInner {
                state: RefCell::new(Rc::new(init.state)),
                listeners: RefCell::new(Vec::new()),
                next_id: Cell::new(0),
                middlewares,
                actions: init.actions,
            }
        });
        debug!(
            middlewares = inner.middlewares.len(),
            actions = inner.actions.len(),
            "store created"
        );
        Self { inner }
    }

    /// Weak handle to this store.
    pub fn handle(&self) -> StoreHandle {
        StoreHandle {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Current committed snapshot.
    pub fn get_state(&self) -> State {
        self.inner.state.borrow().clone()
    }

    /// Value under `key` in the committed snapshot.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.state.borrow().get(key).cloned()
    }

    /// Apply a partial update through the middleware chain and commit it.
    pub fn set_state(&self, patch: impl Into<Patch>) {
        let previous = self.get_state();
        let Some(next) = patch.into().resolve(&previous) else {
            return;
        };

        let handle = self.handle();
        let final_patch = middleware::run_chain(&self.inner.middlewares, &previous, next, &handle);

        let committed: State = Rc::new(merge(&previous, &final_patch));
        *self.inner.state.borrow_mut() = committed.clone();
        debug!(keys = final_patch.len(), "state committed");
        middleware::run_committed(&self.inner.middlewares, &committed);

        self.notify(&committed);
    }

    /// Register a full-state listener. The returned function removes it.
    pub fn subscribe(&self, listener: impl Fn(&State) + 'static) -> Unsubscribe {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        self.inner
            .listeners
            .borrow_mut()
            .push((id, Rc::new(listener)));

        let weak = Rc::downgrade(&self.inner);
        Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.listeners.borrow_mut().retain(|(lid, _)| *lid != id);
            }
        })
    }

    /// Run the named action with `payload`.
    pub fn dispatch(&self, name: &str, payload: Value) -> Result<(), StoreError> {
        let Some(action) = self.inner.actions.get(name).cloned() else {
            warn!(action = name, "dispatch of unknown action");
            return Err(StoreError::UnknownAction {
                name: name.to_string(),
            });
        };
        action(payload);
        Ok(())
    }

    /// Look up an action by name.
    pub fn action(&self, name: &str) -> Option<Action> {
        self.inner.actions.get(name).cloned()
    }

    /// Names of every registered action.
    pub fn action_names(&self) -> Vec<&str> {
        self.inner.actions.keys().map(String::as_str).collect()
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.borrow().len()
    }

    fn notify(&self, state: &State) {
        let listeners: Vec<Listener> = self
            .inner
            .listeners
            .borrow()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        for listener in listeners {
            listener(state);
        }
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("state", &self.inner.state.borrow())
            .field("middlewares", &self.inner.middlewares.len())
            .field("listeners", &self.inner.listeners.borrow().len())
            .finish()
    }
}

/// Create a store.
pub fn create_store(
    initializer: impl FnOnce(&StoreHandle) -> StoreInit,
    middlewares: Vec<Box<dyn Middleware>>,
) -> Store {
    Store::new(initializer, middlewares)
}

impl StoreHandle {
    /// Strong handle, if the store still exists.
    pub fn upgrade(&self) -> Option<Store> {
        self.inner.upgrade().map(|inner| Store { inner })
    }

    /// Forward to [`Store::set_state`]. A no-op once the store is gone.
    pub fn set_state(&self, patch: impl Into<Patch>) {
        match self.upgrade() {
            Some(store) => store.set_state(patch),
            None => warn!("set_state on a dropped or uninitialized store"),
        }
    }

    /// Forward to [`Store::get_state`]. Empty once the store is gone.
    pub fn get_state(&self) -> State {
        self.upgrade()
            .map(|store| store.get_state())
            .unwrap_or_default()
    }

    /// Forward to [`Store::dispatch`].
    pub fn dispatch(&self, name: &str, payload: Value) -> Result<(), StoreError> {
        self.upgrade().ok_or(StoreError::Dropped)?.dispatch(name, payload)
    }
}

// =============================================================================
// Tests
// =============================================================================

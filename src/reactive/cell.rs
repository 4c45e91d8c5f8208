//! ReactiveCell - A single value with change notification.
//!
//! # Example
//!
//! ```ignore
//! use spark_elements::reactive::ReactiveCell;
//!
//! let count = ReactiveCell::new(0);
//! let unsubscribe = count.subscribe(|value| println!("count = {value}"));
//!
//! count.set(1); // prints "count = 1"
//! count.set(1); // equal value, nothing printed
//!
//! unsubscribe();
//! ```

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::types::Unsubscribe;

type Listener<T> = Rc<dyn Fn(&T)>;

struct CellInner<T> {
    value: RefCell<T>,
    listeners: RefCell<Vec<(usize, Listener<T>)>>,
    next_id: Cell<usize>,
}

/// A mutable value that notifies its listeners whenever it changes.
///
/// Cloning a cell clones the handle, not the value: every clone reads and
/// writes the same slot. The cell lives as long as any handle does; pending
/// unsubscribe functions only hold a weak reference.
pub struct ReactiveCell<T> {
    inner: Rc<CellInner<T>>,
}

impl<T> Clone for ReactiveCell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for ReactiveCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveCell")
            .field("value", &self.inner.value.borrow())
            .field("listeners", &self.inner.listeners.borrow().len())
            .finish()
    }
}

impl<T: Default + PartialEq + Clone + 'static> Default for ReactiveCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: PartialEq + Clone + 'static> ReactiveCell<T> {
    /// Create a cell holding `value`.
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(CellInner {
                value: RefCell::new(value),
                listeners: RefCell::new(Vec::new()),
                next_id: Cell::new(0),
            }),
        }
    }

    /// Current value.
    pub fn get(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Read the current value without cloning it.
    ///
    /// The value stays borrowed while `f` runs: calling `set` or `update`
    /// on this cell from inside `f` panics. Use [`get`](Self::get) when the
    /// closure needs to write back.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.borrow())
    }

    /// Replace the value.
    ///
    /// Listeners run synchronously, once each, only if `value` differs from
    /// the current value. Writing an equal value is a no-op.
    pub fn set(&self, value: T) {
        {
            let mut current = self.inner.value.borrow_mut();
            if *current == value {
                return;
            }
            *current = value;
        }
        self.notify();
    }

    /// Set the value from a function of the current one.
    ///
    /// `f` runs on a copy of the value, so it may read or write the cell.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let current = self.get();
        let next = f(&current);
        self.set(next);
    }

    /// Register a listener. The returned function removes it.
    ///
    /// A listener added while a notification is running is not called for
    /// that notification.
    pub fn subscribe(&self, listener: impl Fn(&T) + 'static) -> Unsubscribe {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        self.inner
            .listeners
            .borrow_mut()
            .push((id, Rc::new(listener)));

        let weak: Weak<CellInner<T>> = Rc::downgrade(&self.inner);
        Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.listeners.borrow_mut().retain(|(lid, _)| *lid != id);
            }
        })
    }

    /// Number of live listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.borrow().len()
    }

    fn notify(&self) {
        // Snapshot both the value and the listener list so listeners may
        // set, subscribe or unsubscribe freely while the round runs.
        let value = self.get();
        let listeners: Vec<Listener<T>> = self
            .inner
            .listeners
            .borrow()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        for listener in listeners {
            listener(&value);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

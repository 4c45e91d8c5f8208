//! Reactive primitives.
//!
//! [`ReactiveCell`] is the per-component state holder: render functions
//! create one, subscribe a DOM writer to it, and mutate it from event
//! handlers. It has no relation to any [`Store`](crate::store::Store).

mod cell;

pub use cell::ReactiveCell;

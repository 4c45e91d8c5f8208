//! Application Pipeline
//!
//! Connects the document, the component registry and the store into one
//! running application.
//!
//! # Turn Structure
//!
//! ```text
//! DOM write ──► connect hook ──► render (same turn)
//!     │
//!     └──► mutation record queued ──► App::tick ──► batch ──► registry scan
//! ```
//!
//! Batches are never delivered inside the call that produced them, so a
//! render function can append children without re-entering the scan.

pub mod mount;

pub use mount::{App, mount, run, unmount};

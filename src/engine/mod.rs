//! Component Engine - Registration and lifecycle of custom elements.
//!
//! The engine decides when a host element gets its render function run:
//!
//! ```text
//! register(tag, render) ──► Document::define(tag, hook)
//!                                │
//!   element connected ───────────┤──► render_node ──► RENDERED flag set once
//!   mutation batch (added) ──► scan ┘
//! ```
//!
//! The registry knows nothing about stores or cells; render functions
//! capture whatever state they need.

mod registry;

pub use registry::*;

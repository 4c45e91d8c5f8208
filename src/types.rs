//! Core types for spark-elements.
//!
//! These types are shared by the document tree, the component registry and
//! the state containers.

use std::fmt;

// =============================================================================
// Node Identity
// =============================================================================

/// Handle to a node inside a [`Document`](crate::dom::Document).
///
/// An arena slot index plus the slot's generation. Released slots are
/// reused with a bumped generation, so a stale id never aliases the node
/// that took its place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId {
    index: usize,
    generation: u32,
}

impl NodeId {
    pub(crate) const fn new(index: usize, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Arena slot index.
    pub fn index(self) -> usize {
        self.index
    }

    /// Number of times the slot was released before this node took it.
    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.generation == 0 {
            write!(f, "#{}", self.index)
        } else {
            write!(f, "#{}v{}", self.index, self.generation)
        }
    }
}

// =============================================================================
// Node Flags (bitflags)
// =============================================================================

bitflags::bitflags! {
    /// Per-node lifecycle bits.
    ///
    /// `RENDERED` is set exactly once by the component registry and never
    /// cleared, which is what keeps repeated scans from re-initializing a node.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct NodeFlags: u8 {
        const NONE = 0;
        /// Node is reachable from the document root.
        const CONNECTED = 1 << 0;
        /// Node's tag had a custom-element definition when it was attached.
        const DEFINED = 1 << 1;
        /// A component render function has run for this node.
        const RENDERED = 1 << 2;
    }
}

// =============================================================================
// Cleanup
// =============================================================================

/// Unsubscribe function returned by every `subscribe`/`observe` style API.
///
/// Calling it more than once is impossible (it is `FnOnce`); dropping it
/// without calling keeps the subscription alive.
pub type Unsubscribe = Box<dyn FnOnce()>;

//! DOM events - Listener registry entries and the event value.

use std::rc::Rc;

use crate::types::NodeId;

/// Event delivered to listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Event type, e.g. `"click"`.
    pub kind: String,
    /// Node the event was dispatched on.
    pub target: NodeId,
    /// Node whose listener is currently running.
    pub current_target: NodeId,
}

/// Handler attached with `Document::add_event_listener`.
pub type EventHandler = Rc<dyn Fn(&Event)>;

pub(crate) struct ListenerEntry {
    pub id: usize,
    pub kind: String,
    pub handler: EventHandler,
}

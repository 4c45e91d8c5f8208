//! Document - An in-memory element tree standing in for the live DOM.
//!
//! The document owns a node arena, custom-element definitions, event
//! listeners and the mutation-record queue. There is no layout or markup
//! parser. Render functions build content with `create_element`,
//! `append_child` and `set_text_content`.
//!
//! # Lifecycle Hooks
//!
//! A tag defined with [`Document::define`] gets its hook called
//! synchronously every time an element with that tag becomes connected
//! (reachable from `body`). Definitions are permanent, like the platform's
//! custom element registry: defining the same tag twice is an error.
//!
//! # Mutation Delivery
//!
//! Structural changes are queued and delivered to observers only when the
//! host calls [`Document::deliver_mutations`], as one coalesced batch.
//!
//! # Example
//!
//! ```ignore
//! use spark_elements::dom::Document;
//!
//! let doc = Document::new();
//! let app = doc.create_element("main");
//! doc.set_attribute(app, "id", "app");
//! doc.append_child(doc.body(), app)?;
//!
//! assert_eq!(doc.query_selector("#app"), Some(app));
//! ```

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{trace, warn};

use crate::error::MountError;
use crate::types::{NodeFlags, NodeId, Unsubscribe};

mod arena;
mod event;
mod mutation;
mod selector;

pub use event::{Event, EventHandler};
pub use mutation::{MutationBatch, MutationCallback, MutationRecord, TreeMutationSource};
pub use selector::Selector;

use arena::Arena;
use event::ListenerEntry;

/// Hook run when an element of a defined tag is connected.
pub type ConnectedHook = Rc<dyn Fn(&Document, NodeId)>;

// =============================================================================
// Nodes
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum NodeKind {
    Element {
        tag: String,
        attributes: Vec<(String, String)>,
    },
    Text(String),
}

struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    flags: NodeFlags,
    listeners: Vec<ListenerEntry>,
    on_destroy: Vec<Unsubscribe>,
}

impl NodeData {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            parent: None,
            children: Vec::new(),
            flags: NodeFlags::NONE,
            listeners: Vec::new(),
            on_destroy: Vec::new(),
        }
    }

    fn tag(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Element { tag, .. } => Some(tag),
            NodeKind::Text(_) => None,
        }
    }

    fn attribute(&self, name: &str) -> Option<&str> {
        match &self.kind {
            NodeKind::Element { attributes, .. } => attributes
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str()),
            NodeKind::Text(_) => None,
        }
    }
}

// =============================================================================
// Document
// =============================================================================

struct DocumentInner {
    nodes: RefCell<Arena<NodeData>>,
    body: NodeId,
    definitions: RefCell<HashMap<String, ConnectedHook>>,
    pending: RefCell<Vec<MutationRecord>>,
    observers: RefCell<Vec<(usize, MutationCallback)>>,
    next_id: Cell<usize>,
}

/// Shared handle to a document. Clones refer to the same tree.
#[derive(Clone)]
pub struct Document {
    inner: Rc<DocumentInner>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Empty document with a connected `body` element.
    pub fn new() -> Self {
        let mut body = NodeData::new(NodeKind::Element {
            tag: "body".to_string(),
            attributes: Vec::new(),
        });
        body.flags = NodeFlags::CONNECTED;
        let mut nodes = Arena::new();
        let body = nodes.insert(body);

        Self {
            inner: Rc::new(DocumentInner {
                nodes: RefCell::new(nodes),
                body,
                definitions: RefCell::new(HashMap::new()),
                pending: RefCell::new(Vec::new()),
                observers: RefCell::new(Vec::new()),
                next_id: Cell::new(0),
            }),
        }
    }

    /// Root element. Always connected.
    pub fn body(&self) -> NodeId {
        self.inner.body
    }

    /// True if both handles point at the same document.
    pub fn ptr_eq(&self, other: &Document) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    // -------------------------------------------------------------------------
    // Creation
    // -------------------------------------------------------------------------

    /// Create a detached element. The tag is lowercased.
    pub fn create_element(&self, tag: &str) -> NodeId {
        self.push_node(NodeData::new(NodeKind::Element {
            tag: tag.to_ascii_lowercase(),
            attributes: Vec::new(),
        }))
    }

    /// Create a detached text node.
    pub fn create_text(&self, text: &str) -> NodeId {
        self.push_node(NodeData::new(NodeKind::Text(text.to_string())))
    }

    fn push_node(&self, data: NodeData) -> NodeId {
        self.inner.nodes.borrow_mut().insert(data)
    }

    fn check(&self, node: NodeId) -> Result<(), MountError> {
        if self.inner.nodes.borrow().contains(node) {
            Ok(())
        } else {
            Err(MountError::UnknownNode { node })
        }
    }

    // -------------------------------------------------------------------------
    // Structure
    // -------------------------------------------------------------------------

    /// Append `child` as the last child of `parent`, moving it if attached
    /// elsewhere. Connect hooks for newly connected defined elements run
    /// before this returns.
    pub fn append_child(&self, parent: NodeId, child: NodeId) -> Result<(), MountError> {
        self.check(parent)?;
        self.check(child)?;
        if parent == child || self.is_ancestor(child, parent) {
            return Err(MountError::Cycle { parent, child });
        }
        if matches!(self.inner.nodes.borrow()[parent].kind, NodeKind::Text(_)) {
            return Err(MountError::NotAnElement { node: parent });
        }

        let old_parent = self.inner.nodes.borrow()[child].parent;
        if let Some(old_parent) = old_parent {
            self.detach(old_parent, child);
        }

        let connected = {
            let mut nodes = self.inner.nodes.borrow_mut();
            nodes[child].parent = Some(parent);
            nodes[parent].children.push(child);
            nodes[parent].flags.contains(NodeFlags::CONNECTED)
        };
        self.record(MutationRecord::added(parent, vec![child]));

        if connected {
            let newly_connected = self.connect_subtree(child);
            self.run_connected_hooks(newly_connected);
        }
        Ok(())
    }

    /// Detach `child` from `parent`.
    pub fn remove_child(&self, parent: NodeId, child: NodeId) -> Result<(), MountError> {
        self.check(parent)?;
        self.check(child)?;
        if self.inner.nodes.borrow()[child].parent != Some(parent) {
            return Err(MountError::UnknownNode { node: child });
        }
        self.detach(parent, child);
        Ok(())
    }

    /// Detach every child of `node`.
    pub fn clear_children(&self, node: NodeId) -> Result<(), MountError> {
        self.check(node)?;
        let removed = std::mem::take(&mut self.inner.nodes.borrow_mut()[node].children);
        if removed.is_empty() {
            return Ok(());
        }
        for &child in &removed {
            self.inner.nodes.borrow_mut()[child].parent = None;
            self.disconnect_subtree(child);
        }
        self.record(MutationRecord::removed(node, removed));
        Ok(())
    }

    /// Replace the children of `node` with a single text node, or set the
    /// data of a text node.
    ///
    /// A lone text child is updated in place. Any other children are
    /// released.
    pub fn set_text_content(&self, node: NodeId, text: &str) -> Result<(), MountError> {
        self.check(node)?;
        {
            let mut nodes = self.inner.nodes.borrow_mut();
            if let NodeKind::Text(data) = &mut nodes[node].kind {
                *data = text.to_string();
                return Ok(());
            }
            let children = &nodes[node].children;
            let lone = if children.len() == 1 { Some(children[0]) } else { None };
            if let Some(only) = lone.filter(|_| !text.is_empty()) {
                if let NodeKind::Text(data) = &mut nodes[only].kind {
                    *data = text.to_string();
                    return Ok(());
                }
            }
        }
        self.release_children(node)?;
        if !text.is_empty() {
            let text_node = self.create_text(text);
            self.append_child(node, text_node)?;
        }
        Ok(())
    }

    fn detach(&self, parent: NodeId, child: NodeId) {
        {
            let mut nodes = self.inner.nodes.borrow_mut();
            nodes[parent].children.retain(|&c| c != child);
            nodes[child].parent = None;
        }
        self.disconnect_subtree(child);
        self.record(MutationRecord::removed(parent, vec![child]));
    }

    // -------------------------------------------------------------------------
    // Release
    // -------------------------------------------------------------------------

    /// Detach `node` if attached, then free it and its whole subtree.
    ///
    /// Listeners are dropped and destroy callbacks run once the slots are
    /// free. Ids of released nodes stop resolving.
    pub fn release(&self, node: NodeId) -> Result<(), MountError> {
        self.check(node)?;
        if node == self.inner.body {
            return Err(MountError::ReleaseBody);
        }
        if let Some(parent) = self.parent(node) {
            self.detach(parent, node);
        }
        self.free_subtrees(vec![node]);
        Ok(())
    }

    /// Detach and free every child of `node`.
    pub fn release_children(&self, node: NodeId) -> Result<(), MountError> {
        let children = self.children(node);
        self.clear_children(node)?;
        if !children.is_empty() {
            self.free_subtrees(children);
        }
        Ok(())
    }

    /// Run `callback` when `node` is released. Runs immediately if the node
    /// is already gone.
    pub fn on_destroy(&self, node: NodeId, callback: impl FnOnce() + 'static) {
        let callback: Unsubscribe = Box::new(callback);
        let rejected = match self.inner.nodes.borrow_mut().get_mut(node) {
            Some(data) => {
                data.on_destroy.push(callback);
                None
            }
            None => Some(callback),
        };
        if let Some(callback) = rejected {
            trace!(%node, "on_destroy for released node, running now");
            callback();
        }
    }

    /// Live nodes, body included.
    pub fn node_count(&self) -> usize {
        self.inner.nodes.borrow().len()
    }

    /// Arena slots ever allocated, live or free.
    pub fn slot_count(&self) -> usize {
        self.inner.nodes.borrow().capacity()
    }

    fn free_subtrees(&self, roots: Vec<NodeId>) {
        let freed: Vec<NodeData> = {
            let mut nodes = self.inner.nodes.borrow_mut();
            let mut freed = Vec::new();
            let mut stack = roots;
            while let Some(id) = stack.pop() {
                if let Some(data) = nodes.remove(id) {
                    stack.extend(data.children.iter().copied());
                    freed.push(data);
                }
            }
            freed
        };
        trace!(count = freed.len(), "released nodes");

        // Dropped and run outside the arena borrow; callbacks may touch the
        // document.
        let mut callbacks = Vec::new();
        for mut data in freed {
            callbacks.append(&mut data.on_destroy);
        }
        for callback in callbacks {
            callback();
        }
    }

    fn is_ancestor(&self, candidate: NodeId, node: NodeId) -> bool {
        let nodes = self.inner.nodes.borrow();
        let mut current = nodes[node].parent;
        while let Some(id) = current {
            if id == candidate {
                return true;
            }
            current = nodes[id].parent;
        }
        false
    }

    /// Mark `root` and its descendants connected; return the elements that
    /// have a definition, in document order.
    fn connect_subtree(&self, root: NodeId) -> Vec<(NodeId, ConnectedHook)> {
        let definitions = self.inner.definitions.borrow();
        let mut nodes = self.inner.nodes.borrow_mut();
        let mut hooks = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let node = &mut nodes[id];
            node.flags.insert(NodeFlags::CONNECTED);
            if let Some(hook) = node.tag().and_then(|tag| definitions.get(tag)) {
                node.flags.insert(NodeFlags::DEFINED);
                hooks.push((id, hook.clone()));
            }
            stack.extend(node.children.iter().rev().copied());
        }
        hooks
    }

    fn disconnect_subtree(&self, root: NodeId) {
        let mut nodes = self.inner.nodes.borrow_mut();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            nodes[id].flags.remove(NodeFlags::CONNECTED);
            stack.extend(nodes[id].children.iter().copied());
        }
    }

    fn run_connected_hooks(&self, hooks: Vec<(NodeId, ConnectedHook)>) {
        for (node, hook) in hooks {
            // A hook may detach later siblings before they get their turn.
            if self.is_connected(node) {
                trace!(%node, "connected hook");
                hook(self, node);
            }
        }
    }

    // -------------------------------------------------------------------------
    // Custom Element Definitions
    // -------------------------------------------------------------------------

    /// Install a permanent connect hook for `tag`.
    ///
    /// Elements with this tag that are already connected get the hook
    /// immediately, like a platform upgrade.
    pub fn define(&self, tag: &str, hook: ConnectedHook) -> Result<(), MountError> {
        let tag = tag.to_ascii_lowercase();
        {
            let mut definitions = self.inner.definitions.borrow_mut();
            if definitions.contains_key(&tag) {
                return Err(MountError::AlreadyDefined { tag });
            }
            definitions.insert(tag.clone(), hook.clone());
        }

        let upgrades: Vec<(NodeId, ConnectedHook)> = self
            .elements_by_tag(&tag)
            .into_iter()
            .map(|node| {
                self.inner.nodes.borrow_mut()[node]
                    .flags
                    .insert(NodeFlags::DEFINED);
                (node, hook.clone())
            })
            .collect();
        self.run_connected_hooks(upgrades);
        Ok(())
    }

    pub fn is_defined(&self, tag: &str) -> bool {
        self.inner
            .definitions
            .borrow()
            .contains_key(&tag.to_ascii_lowercase())
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.inner.nodes.borrow().get(node).and_then(|n| n.parent)
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.inner
            .nodes
            .borrow()
            .get(node)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    /// Element tag, or `None` for text nodes and unknown ids.
    pub fn tag_name(&self, node: NodeId) -> Option<String> {
        self.inner
            .nodes
            .borrow()
            .get(node)
            .and_then(|n| n.tag().map(str::to_string))
    }

    pub fn is_connected(&self, node: NodeId) -> bool {
        self.flags(node).contains(NodeFlags::CONNECTED)
    }

    pub fn flags(&self, node: NodeId) -> NodeFlags {
        self.inner
            .nodes
            .borrow()
            .get(node)
            .map(|n| n.flags)
            .unwrap_or_default()
    }

    /// Set `flag` on `node`. Returns true if it was not already set.
    pub(crate) fn insert_flag(&self, node: NodeId, flag: NodeFlags) -> bool {
        let mut nodes = self.inner.nodes.borrow_mut();
        match nodes.get_mut(node) {
            Some(data) if !data.flags.contains(flag) => {
                data.flags.insert(flag);
                true
            }
            _ => false,
        }
    }

    /// Concatenated text of `node` and its descendants.
    pub fn text_content(&self, node: NodeId) -> String {
        let nodes = self.inner.nodes.borrow();
        let mut out = String::new();
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            let Some(data) = nodes.get(id) else { continue };
            if let NodeKind::Text(text) = &data.kind {
                out.push_str(text);
            }
            stack.extend(data.children.iter().rev().copied());
        }
        out
    }

    // -------------------------------------------------------------------------
    // Attributes
    // -------------------------------------------------------------------------

    pub fn set_attribute(&self, node: NodeId, name: &str, value: &str) {
        let mut nodes = self.inner.nodes.borrow_mut();
        if let Some(NodeData {
            kind: NodeKind::Element { attributes, .. },
            ..
        }) = nodes.get_mut(node)
        {
            match attributes.iter_mut().find(|(key, _)| key == name) {
                Some((_, existing)) => *existing = value.to_string(),
                None => attributes.push((name.to_string(), value.to_string())),
            }
        }
    }

    pub fn get_attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.inner
            .nodes
            .borrow()
            .get(node)
            .and_then(|n| n.attribute(name).map(str::to_string))
    }

    pub fn remove_attribute(&self, node: NodeId, name: &str) {
        let mut nodes = self.inner.nodes.borrow_mut();
        if let Some(NodeData {
            kind: NodeKind::Element { attributes, .. },
            ..
        }) = nodes.get_mut(node)
        {
            attributes.retain(|(key, _)| key != name);
        }
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    /// Connected elements in document order.
    fn connected_elements(&self) -> Vec<NodeId> {
        let nodes = self.inner.nodes.borrow();
        let mut out = Vec::new();
        let mut stack = vec![self.inner.body];
        while let Some(id) = stack.pop() {
            let data = &nodes[id];
            if data.tag().is_some() {
                out.push(id);
            }
            stack.extend(data.children.iter().rev().copied());
        }
        out
    }

    /// Connected elements with `tag` (case-insensitive), in document order.
    pub fn elements_by_tag(&self, tag: &str) -> Vec<NodeId> {
        let tag = tag.to_ascii_lowercase();
        let elements = self.connected_elements();
        let nodes = self.inner.nodes.borrow();
        elements
            .into_iter()
            .filter(|id| nodes[*id].tag() == Some(tag.as_str()))
            .collect()
    }

    /// Every connected element matching `selector`, in document order.
    pub fn query_selector_all(&self, selector: &str) -> Vec<NodeId> {
        let Some(parsed) = Selector::parse(selector) else {
            warn!(selector, "unsupported selector");
            return Vec::new();
        };
        let elements = self.connected_elements();
        let nodes = self.inner.nodes.borrow();
        elements
            .into_iter()
            .filter(|id| {
                let data = &nodes[*id];
                data.tag().is_some_and(|tag| {
                    parsed.matches(tag, data.attribute("id"), data.attribute("class"))
                })
            })
            .collect()
    }

    /// First connected element matching `selector`.
    pub fn query_selector(&self, selector: &str) -> Option<NodeId> {
        self.query_selector_all(selector).into_iter().next()
    }

    // -------------------------------------------------------------------------
    // Events
    // -------------------------------------------------------------------------

    /// Listen for `kind` events on `node`. The returned function detaches.
    pub fn add_event_listener(
        &self,
        node: NodeId,
        kind: &str,
        handler: impl Fn(&Event) + 'static,
    ) -> Unsubscribe {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        if let Some(data) = self.inner.nodes.borrow_mut().get_mut(node) {
            data.listeners.push(ListenerEntry {
                id,
                kind: kind.to_string(),
                handler: Rc::new(handler),
            });
        }

        let weak: Weak<DocumentInner> = Rc::downgrade(&self.inner);
        Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                if let Some(data) = inner.nodes.borrow_mut().get_mut(node) {
                    data.listeners.retain(|entry| entry.id != id);
                }
            }
        })
    }

    /// Dispatch a bubbling `kind` event at `target`.
    ///
    /// Returns the number of listeners that ran.
    pub fn dispatch_event(&self, target: NodeId, kind: &str) -> usize {
        // Resolve the propagation path and handlers up front so listeners
        // can restructure the tree without affecting this dispatch.
        let path: Vec<(NodeId, Vec<EventHandler>)> = {
            let nodes = self.inner.nodes.borrow();
            let mut path = Vec::new();
            let mut current = nodes.get(target).map(|_| target);
            while let Some(id) = current {
                let data = &nodes[id];
                let handlers = data
                    .listeners
                    .iter()
                    .filter(|entry| entry.kind == kind)
                    .map(|entry| entry.handler.clone())
                    .collect();
                path.push((id, handlers));
                current = data.parent;
            }
            path
        };

        let mut ran = 0;
        for (current_target, handlers) in path {
            let event = Event {
                kind: kind.to_string(),
                target,
                current_target,
            };
            for handler in handlers {
                handler(&event);
                ran += 1;
            }
        }
        ran
    }

    // -------------------------------------------------------------------------
    // Mutation Queue
    // -------------------------------------------------------------------------

    fn record(&self, record: MutationRecord) {
        self.inner.pending.borrow_mut().push(record);
    }

    pub fn has_pending_mutations(&self) -> bool {
        !self.inner.pending.borrow().is_empty()
    }

    /// Deliver every queued record to observers as one batch.
    ///
    /// Returns false if there was nothing to deliver. Records produced by
    /// observers stay queued for the next call.
    pub fn deliver_mutations(&self) -> bool {
        let records = std::mem::take(&mut *self.inner.pending.borrow_mut());
        if records.is_empty() {
            return false;
        }
        let batch = MutationBatch::new(records);
        let observers: Vec<MutationCallback> = self
            .inner
            .observers
            .borrow()
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect();

        trace!(records = batch.records().len(), observers = observers.len(), "delivering mutations");
        for observer in observers {
            observer(&batch);
        }
        true
    }

    // -------------------------------------------------------------------------
    // Serialization
    // -------------------------------------------------------------------------

    /// Markup for `node` and its subtree. Used for debugging and tests.
    pub fn outer_html(&self, node: NodeId) -> String {
        let nodes = self.inner.nodes.borrow();
        let mut out = String::new();
        write_html(&nodes, node, &mut out);
        out
    }

    /// Markup for the children of `node`.
    pub fn inner_html(&self, node: NodeId) -> String {
        let nodes = self.inner.nodes.borrow();
        let mut out = String::new();
        if let Some(data) = nodes.get(node) {
            for &child in &data.children {
                write_html(&nodes, child, &mut out);
            }
        }
        out
    }
}

impl TreeMutationSource for Document {
    fn observe(&self, callback: MutationCallback) -> Unsubscribe {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        self.inner.observers.borrow_mut().push((id, callback));

        let weak: Weak<DocumentInner> = Rc::downgrade(&self.inner);
        Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.observers.borrow_mut().retain(|(oid, _)| *oid != id);
            }
        })
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("nodes", &self.inner.nodes.borrow().len())
            .field("pending", &self.inner.pending.borrow().len())
            .finish()
    }
}

fn write_html(nodes: &Arena<NodeData>, node: NodeId, out: &mut String) {
    let Some(data) = nodes.get(node) else { return };
    match &data.kind {
        NodeKind::Text(text) => escape_into(text, out),
        NodeKind::Element { tag, attributes } => {
            out.push('<');
            out.push_str(tag);
            for (name, value) in attributes {
                out.push(' ');
                out.push_str(name);
                out.push_str("=\"");
                escape_into(value, out);
                out.push('"');
            }
            out.push('>');
            for &child in &data.children {
                write_html(nodes, child, out);
            }
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
        }
    }
}

fn escape_into(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

//! Component Registry - Tag names to render functions.
//!
//! Manages the lifecycle of component hosts:
//! - Tag ↔ render function mapping (last registration wins)
//! - One permanent custom-element definition per tag, indirecting through
//!   the registry so later registrations apply to later renders
//! - Per-node RENDERED flag so a node is initialized at most once
//! - Re-scan of the document when a mutation batch adds nodes
//!
//! # Example
//!
//! ```ignore
//! use spark_elements::engine::ComponentRegistry;
//!
//! let registry = ComponentRegistry::new(document.clone());
//! registry.register("x-greeting", |host| {
//!     host.set_text("hello")
//! })?;
//!
//! registry.scan();
//! ```

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, error, trace, warn};

use crate::dom::{Document, MutationBatch, TreeMutationSource};
use crate::error::{MountError, RegistryError};
use crate::router::PageRenderer;
use crate::types::{NodeFlags, NodeId, Unsubscribe};

// =============================================================================
// Host
// =============================================================================

/// The element a render function is initializing.
#[derive(Clone, Copy)]
pub struct Host<'a> {
    pub document: &'a Document,
    pub node: NodeId,
}

impl<'a> Host<'a> {
    pub fn new(document: &'a Document, node: NodeId) -> Self {
        Self { document, node }
    }

    /// Create an element and append it to the host.
    pub fn append_element(&self, tag: &str) -> Result<NodeId, MountError> {
        let child = self.document.create_element(tag);
        self.document.append_child(self.node, child)?;
        Ok(child)
    }

    /// Replace the host's children with `text`.
    pub fn set_text(&self, text: &str) -> RenderResult {
        self.document.set_text_content(self.node, text)
    }

    pub fn attribute(&self, name: &str) -> Option<String> {
        self.document.get_attribute(self.node, name)
    }

    /// Run `cleanup` when the host is released, e.g. when the page it was
    /// rendered into is replaced. Use it for subscriptions the render
    /// function made.
    pub fn on_destroy(&self, cleanup: impl FnOnce() + 'static) {
        self.document.on_destroy(self.node, cleanup);
    }
}

impl fmt::Debug for Host<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host").field("node", &self.node).finish()
    }
}

/// Outcome of a render function.
pub type RenderResult = Result<(), MountError>;

/// A component's render function.
pub type RenderFn = Rc<dyn Fn(&Host<'_>) -> RenderResult>;

// =============================================================================
// Tag Names
// =============================================================================

/// Lowercase `tag` and check it against `[a-z][a-z0-9-]*`.
///
/// Whitespace is not stripped; `" x-a "` is rejected.
pub fn normalize_tag(tag: &str) -> Result<String, RegistryError> {
    let normalized = tag.to_ascii_lowercase();
    let mut chars = normalized.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if valid {
        Ok(normalized)
    } else {
        Err(RegistryError::InvalidTagName {
            tag: tag.to_string(),
        })
    }
}

// =============================================================================
// Registry
// =============================================================================

struct Entry {
    tag: String,
    render: RenderFn,
}

struct RegistryInner {
    document: Document,
    entries: RefCell<Vec<Entry>>,
    observer: RefCell<Option<Unsubscribe>>,
    renders: Cell<usize>,
    scans: Cell<usize>,
}

impl Drop for RegistryInner {
    fn drop(&mut self) {
        if let Some(stop) = self.observer.get_mut().take() {
            stop();
        }
    }
}

/// Shared handle to a component registry bound to one document.
#[derive(Clone)]
pub struct ComponentRegistry {
    inner: Rc<RegistryInner>,
}

impl ComponentRegistry {
    pub fn new(document: Document) -> Self {
        Self {
            inner: Rc::new(RegistryInner {
                document,
                entries: RefCell::new(Vec::new()),
                observer: RefCell::new(None),
                renders: Cell::new(0),
                scans: Cell::new(0),
            }),
        }
    }

    pub fn document(&self) -> &Document {
        &self.inner.document
    }

    // -------------------------------------------------------------------------
    // Registration
    // -------------------------------------------------------------------------

    /// Register `render` for `tag`.
    ///
    /// Registering a tag again replaces its render function for every node
    /// rendered afterwards. Nodes already rendered are left alone.
    pub fn register(
        &self,
        tag: &str,
        render: impl Fn(&Host<'_>) -> RenderResult + 'static,
    ) -> Result<(), RegistryError> {
        let tag = normalize_tag(tag)?;
        let render: RenderFn = Rc::new(render);

        {
            let mut entries = self.inner.entries.borrow_mut();
            match entries.iter_mut().find(|entry| entry.tag == tag) {
                Some(entry) => {
                    warn!(%tag, "component re-registered, last registration wins");
                    entry.render = render;
                }
                None => {
                    debug!(%tag, "component registered");
                    entries.push(Entry {
                        tag: tag.clone(),
                        render,
                    });
                }
            }
        }

        if !self.inner.document.is_defined(&tag) {
            let weak: Weak<RegistryInner> = Rc::downgrade(&self.inner);
            let hook = Rc::new(move |_doc: &Document, node: NodeId| {
                if let Some(inner) = weak.upgrade() {
                    ComponentRegistry { inner }.render_node(node);
                }
            });
            if let Err(err) = self.inner.document.define(&tag, hook) {
                // Someone else owns the definition; scans still pick it up.
                debug!(%tag, error = %err, "tag already defined elsewhere");
            }
        }
        Ok(())
    }

    pub fn is_registered(&self, tag: &str) -> bool {
        let tag = tag.to_ascii_lowercase();
        self.inner.entries.borrow().iter().any(|entry| entry.tag == tag)
    }

    /// Registered tags in registration order.
    pub fn tags(&self) -> Vec<String> {
        self.inner
            .entries
            .borrow()
            .iter()
            .map(|entry| entry.tag.clone())
            .collect()
    }

    fn render_fn(&self, tag: &str) -> Option<RenderFn> {
        self.inner
            .entries
            .borrow()
            .iter()
            .find(|entry| entry.tag == tag)
            .map(|entry| entry.render.clone())
    }

    // -------------------------------------------------------------------------
    // Rendering
    // -------------------------------------------------------------------------

    /// Render `node` with its tag's current render function, unless it has
    /// been rendered before or is not connected. Returns true if it rendered.
    pub fn render_node(&self, node: NodeId) -> bool {
        let document = &self.inner.document;
        if !document.is_connected(node) {
            return false;
        }
        let Some(tag) = document.tag_name(node) else {
            return false;
        };
        let Some(render) = self.render_fn(&tag) else {
            return false;
        };
        // Flag first: the render function may trigger nested connects.
        if !document.insert_flag(node, NodeFlags::RENDERED) {
            return false;
        }

        trace!(%tag, %node, "render");
        self.inner.renders.set(self.inner.renders.get() + 1);
        if let Err(err) = render(&Host::new(document, node)) {
            error!(%tag, %node, error = %err, "component render failed");
        }
        true
    }

    /// Render every connected, registered, not-yet-rendered element.
    ///
    /// Returns the number of nodes rendered. Scanning again without new
    /// elements renders nothing.
    pub fn scan(&self) -> usize {
        self.inner.scans.set(self.inner.scans.get() + 1);
        let mut rendered = 0;
        for tag in self.tags() {
            for node in self.inner.document.elements_by_tag(&tag) {
                if self.render_node(node) {
                    rendered += 1;
                }
            }
        }
        if rendered > 0 {
            debug!(rendered, "scan");
        }
        rendered
    }

    /// React to a delivered mutation batch: one scan if anything was added.
    pub fn on_tree_mutation(&self, batch: &MutationBatch) -> usize {
        if batch.has_added_nodes() {
            self.scan()
        } else {
            0
        }
    }

    /// Subscribe to `source` so each batch with added nodes triggers a scan.
    ///
    /// Replaces any previous subscription.
    pub fn observe(&self, source: &dyn TreeMutationSource) {
        let weak: Weak<RegistryInner> = Rc::downgrade(&self.inner);
        let stop = source.observe(Rc::new(move |batch: &MutationBatch| {
            if let Some(inner) = weak.upgrade() {
                ComponentRegistry { inner }.on_tree_mutation(batch);
            }
        }));
        if let Some(previous) = self.inner.observer.borrow_mut().replace(stop) {
            previous();
        }
    }

    /// Stop observing the mutation source.
    pub fn disconnect(&self) {
        if let Some(stop) = self.inner.observer.borrow_mut().take() {
            stop();
        }
    }

    /// Release the children of the element matching `root_selector`,
    /// render `page` into it, then scan for components the page inserted.
    ///
    /// Destroy callbacks registered by the old content run before the new
    /// page renders.
    pub fn render_page(&self, root_selector: &str, page: &dyn PageRenderer) -> Result<(), MountError> {
        let document = &self.inner.document;
        let Some(root) = document.query_selector(root_selector) else {
            warn!(selector = root_selector, "render target not found");
            return Err(MountError::RootNotFound {
                selector: root_selector.to_string(),
            });
        };

        document.release_children(root)?;
        if let Err(err) = page.render(&Host::new(document, root)) {
            error!(selector = root_selector, error = %err, "page render failed");
        }
        self.scan();
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Diagnostics
    // -------------------------------------------------------------------------

    pub fn is_rendered(&self, node: NodeId) -> bool {
        self.inner.document.flags(node).contains(NodeFlags::RENDERED)
    }

    /// Total render function invocations.
    pub fn render_count(&self) -> usize {
        self.inner.renders.get()
    }

    /// Total scans performed.
    pub fn scan_count(&self) -> usize {
        self.inner.scans.get()
    }
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("tags", &self.tags())
            .field("renders", &self.render_count())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{MutationRecord, TreeMutationSource};
    use crate::router::page;

    fn setup() -> (Document, ComponentRegistry) {
        let document = Document::new();
        let registry = ComponentRegistry::new(document.clone());
        (document, registry)
    }

    fn counting(calls: &Rc<Cell<usize>>) -> impl Fn(&Host<'_>) -> RenderResult + 'static {
        let calls = calls.clone();
        move |_host| {
            calls.set(calls.get() + 1);
            Ok(())
        }
    }

    #[test]
    fn test_normalize_tag() {
        assert_eq!(normalize_tag("X-Counter").unwrap(), "x-counter");
        assert_eq!(normalize_tag("app2").unwrap(), "app2");
        assert!(normalize_tag("").is_err());
        assert!(normalize_tag("2fast").is_err());
        assert!(normalize_tag("-x").is_err());
        assert!(normalize_tag("x_y").is_err());
        assert!(normalize_tag("x y").is_err());
        assert!(normalize_tag(" x-a ").is_err());
        assert!(normalize_tag("x-a\n").is_err());
    }

    #[test]
    fn test_register_rejects_invalid_tag() {
        let (_doc, registry) = setup();
        let err = registry.register("Not Valid", |_| Ok(())).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidTagName { .. }));
        assert!(registry.tags().is_empty());
    }

    #[test]
    fn test_attach_renders_once() {
        let (doc, registry) = setup();
        let calls = Rc::new(Cell::new(0));
        registry.register("x-box", counting(&calls)).unwrap();

        let el = doc.create_element("x-box");
        assert_eq!(calls.get(), 0);

        doc.append_child(doc.body(), el).unwrap();
        assert_eq!(calls.get(), 1);
        assert!(registry.is_rendered(el));

        // Moving the node reconnects it but must not re-render.
        let wrapper = doc.create_element("div");
        doc.append_child(doc.body(), wrapper).unwrap();
        doc.append_child(wrapper, el).unwrap();
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_scan_idempotent() {
        let (doc, registry) = setup();
        let el = doc.create_element("x-box");
        doc.append_child(doc.body(), el).unwrap();

        // Register with the definition held by a different owner so only
        // scans can render.
        doc.define("x-box", Rc::new(|_doc: &Document, _node: NodeId| {})).unwrap();
        let calls = Rc::new(Cell::new(0));
        registry.register("x-box", counting(&calls)).unwrap();
        assert_eq!(calls.get(), 0);

        assert_eq!(registry.scan(), 1);
        assert_eq!(registry.scan(), 0);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_register_upgrades_connected_elements() {
        let (doc, registry) = setup();
        let a = doc.create_element("x-late");
        let b = doc.create_element("X-LATE");
        doc.append_child(doc.body(), a).unwrap();
        doc.append_child(doc.body(), b).unwrap();

        let calls = Rc::new(Cell::new(0));
        registry.register("X-Late", counting(&calls)).unwrap();
        assert_eq!(calls.get(), 2);
        assert_eq!(registry.scan(), 0);
    }

    #[test]
    fn test_detached_elements_are_not_rendered() {
        let (doc, registry) = setup();
        let calls = Rc::new(Cell::new(0));
        registry.register("x-box", counting(&calls)).unwrap();

        let detached = doc.create_element("x-box");
        assert_eq!(registry.scan(), 0);
        assert!(!registry.render_node(detached));
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_reregistration_applies_to_later_nodes_only() {
        let (doc, registry) = setup();
        let log = Rc::new(RefCell::new(Vec::new()));

        let log_v1 = log.clone();
        registry
            .register("x-ver", move |host| {
                log_v1.borrow_mut().push(("v1", host.node));
                Ok(())
            })
            .unwrap();
        let first = doc.create_element("x-ver");
        doc.append_child(doc.body(), first).unwrap();

        let log_v2 = log.clone();
        registry
            .register("x-ver", move |host| {
                log_v2.borrow_mut().push(("v2", host.node));
                Ok(())
            })
            .unwrap();
        let second = doc.create_element("x-ver");
        doc.append_child(doc.body(), second).unwrap();
        registry.scan();

        assert_eq!(*log.borrow(), vec![("v1", first), ("v2", second)]);
        assert_eq!(registry.tags(), vec!["x-ver".to_string()]);
    }

    #[test]
    fn test_mutation_batch_triggers_single_scan() {
        let (doc, registry) = setup();
        registry.register("x-box", |_| Ok(())).unwrap();
        registry.observe(&doc);

        for _ in 0..5 {
            let el = doc.create_element("span");
            doc.append_child(doc.body(), el).unwrap();
        }
        let before = registry.scan_count();
        assert_eq!(before, 0);

        doc.deliver_mutations();
        assert_eq!(registry.scan_count(), 1);
    }

    #[test]
    fn test_removal_only_batch_does_not_scan() {
        let (_doc, registry) = setup();
        let batch = MutationBatch::new(vec![MutationRecord::removed(NodeId::new(0, 0), vec![NodeId::new(1, 0)])]);
        assert_eq!(registry.on_tree_mutation(&batch), 0);
        assert_eq!(registry.scan_count(), 0);
    }

    #[test]
    fn test_disconnect_stops_scans() {
        let (doc, registry) = setup();
        registry.observe(&doc);
        registry.disconnect();

        let el = doc.create_element("div");
        doc.append_child(doc.body(), el).unwrap();
        doc.deliver_mutations();
        assert_eq!(registry.scan_count(), 0);
    }

    #[test]
    fn test_nested_components_render() {
        let (doc, registry) = setup();
        registry
            .register("x-outer", |host| {
                host.append_element("x-inner")?;
                Ok(())
            })
            .unwrap();
        registry.register("x-inner", |host| host.set_text("inner")).unwrap();

        let outer = doc.create_element("x-outer");
        doc.append_child(doc.body(), outer).unwrap();

        assert_eq!(
            doc.outer_html(outer),
            "<x-outer><x-inner>inner</x-inner></x-outer>"
        );
        assert_eq!(registry.render_count(), 2);
    }

    #[test]
    fn test_render_page() {
        let (doc, registry) = setup();
        let root = doc.create_element("main");
        doc.set_attribute(root, "id", "app");
        doc.append_child(doc.body(), root).unwrap();
        let stale = doc.create_element("p");
        doc.append_child(root, stale).unwrap();

        registry.register("x-card", |host| host.set_text("card")).unwrap();

        let home = page(|host| {
            host.append_element("h1")?;
            host.append_element("x-card")?;
            Ok(())
        });
        registry.render_page("#app", home.as_ref()).unwrap();

        assert_eq!(
            doc.inner_html(root),
            "<h1></h1><x-card>card</x-card>"
        );
        assert!(!doc.is_connected(stale));
    }

    #[test]
    fn test_render_page_missing_root() {
        let (_doc, registry) = setup();
        let empty = page(|_host| Ok(()));
        let err = registry.render_page("#nowhere", empty.as_ref()).unwrap_err();
        assert!(matches!(err, MountError::RootNotFound { selector } if selector == "#nowhere"));
    }

    #[test]
    fn test_render_error_is_contained() {
        let (doc, registry) = setup();
        registry
            .register("x-broken", |host| {
                Err(MountError::UnknownNode { node: host.node })
            })
            .unwrap();

        let el = doc.create_element("x-broken");
        doc.append_child(doc.body(), el).unwrap();
        assert!(registry.is_rendered(el));
        assert_eq!(registry.scan(), 0);
    }

    #[test]
    fn test_observe_through_trait_object() {
        let (doc, registry) = setup();
        let source: &dyn TreeMutationSource = &doc;
        registry.observe(source);
        let el = doc.create_element("div");
        doc.append_child(doc.body(), el).unwrap();
        doc.deliver_mutations();
        assert_eq!(registry.scan_count(), 1);
    }

    #[test]
    fn test_render_page_runs_destroy_callbacks() {
        let (doc, registry) = setup();
        let root = doc.create_element("main");
        doc.set_attribute(root, "id", "app");
        doc.append_child(doc.body(), root).unwrap();

        let live = Rc::new(Cell::new(0));
        let live_clone = live.clone();
        registry
            .register("x-watch", move |host| {
                live_clone.set(live_clone.get() + 1);
                let live = live_clone.clone();
                host.on_destroy(move || live.set(live.get() - 1));
                Ok(())
            })
            .unwrap();

        let home = page(|host| {
            host.append_element("x-watch")?;
            Ok(())
        });
        for _ in 0..50 {
            registry.render_page("#app", home.as_ref()).unwrap();
            assert_eq!(live.get(), 1);
        }
        assert_eq!(registry.render_count(), 50);
        assert_eq!(doc.elements_by_tag("x-watch").len(), 1);
    }

    #[test]
    fn test_render_page_recycles_slots() {
        let (doc, registry) = setup();
        let root = doc.create_element("main");
        doc.set_attribute(root, "id", "app");
        doc.append_child(doc.body(), root).unwrap();
        registry.register("x-card", |host| host.set_text("card")).unwrap();

        let home = page(|host| {
            host.append_element("h1")?;
            host.append_element("x-card")?;
            Ok(())
        });
        registry.render_page("#app", home.as_ref()).unwrap();
        let slots = doc.slot_count();
        let live = doc.node_count();

        for _ in 0..100 {
            registry.render_page("#app", home.as_ref()).unwrap();
        }
        assert_eq!(doc.node_count(), live);
        assert_eq!(doc.slot_count(), slots);
    }
}

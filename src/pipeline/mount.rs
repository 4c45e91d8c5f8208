//! Mount API - Application context and event loop turns.
//!
//! The entry point builds one [`App`] and owns it. The app holds the
//! document, the component registry observing it, the store and the
//! translator. Nothing is global.
//!
//! # Example
//!
//! ```ignore
//! use spark_elements::pipeline::mount;
//!
//! let app = mount::mount(AppConfig::default(), store, translator)?;
//! app.register("x-counter", render_counter)?;
//! app.set_routes(Routes::new().route("/index", home).alias("/", "/index"));
//! app.navigate("/")?;
//!
//! // Deliver deferred mutation batches until nothing is left.
//! app.run_until_idle();
//!
//! app.unmount();
//! ```

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::dom::Document;
use crate::engine::{ComponentRegistry, Host, RenderResult};
use crate::error::{ConfigError, MountError, RegistryError};
use crate::i18n::Translator;
use crate::reactive::ReactiveCell;
use crate::router::{PageRenderer, Routes};
use crate::store::Store;
use crate::types::Unsubscribe;

// =============================================================================
// App
// =============================================================================

struct AppInner {
    config: AppConfig,
    document: Document,
    registry: ComponentRegistry,
    store: Store,
    translator: Rc<dyn Translator>,
    routes: RefCell<Routes>,
    current_route: ReactiveCell<Option<String>>,
    running: Cell<bool>,
    language_watch: RefCell<Option<Unsubscribe>>,
}

impl Drop for AppInner {
    fn drop(&mut self) {
        if let Some(stop) = self.language_watch.get_mut().take() {
            stop();
        }
    }
}

/// Application context. Clones share the same app.
#[derive(Clone)]
pub struct App {
    inner: Rc<AppInner>,
}

impl App {
    /// Build an app on a fresh document.
    ///
    /// A fresh document has no root element unless
    /// [`AppConfig::create_root`] is set.
    pub fn new(
        config: AppConfig,
        store: Store,
        translator: Rc<dyn Translator>,
    ) -> Result<Self, ConfigError> {
        Self::with_document(Document::new(), config, store, translator)
    }

    /// Build an app on an existing document.
    ///
    /// The translator is switched to the configured language first.
    pub fn with_document(
        document: Document,
        config: AppConfig,
        store: Store,
        translator: Rc<dyn Translator>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        if config.create_root {
            ensure_root(&document, &config.root_selector);
        }
        if translator.current_language() != config.language {
            translator.set_language(&config.language);
        }

        let registry = ComponentRegistry::new(document.clone());
        registry.observe(&document);

        let inner = Rc::new_cyclic(|weak: &Weak<AppInner>| {
            let weak = weak.clone();
            let language_watch = translator.on_language_change(Box::new(move |language: &str| {
                if let Some(inner) = weak.upgrade() {
                    debug!(language, "language changed, re-rendering");
                    if let Err(err) = (App { inner }).rerender() {
                        warn!(error = %err, "re-render after language change failed");
                    }
                }
            }));

            AppInner {
                config,
                document,
                registry,
                store,
                translator,
                routes: RefCell::new(Routes::new()),
                current_route: ReactiveCell::new(None),
                running: Cell::new(true),
                language_watch: RefCell::new(Some(language_watch)),
            }
        });

        info!(
            root = %inner.config.root_selector,
            language = %inner.translator.current_language(),
            "app mounted"
        );
        Ok(Self { inner })
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }

    pub fn document(&self) -> &Document {
        &self.inner.document
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.inner.registry
    }

    pub fn store(&self) -> &Store {
        &self.inner.store
    }

    pub fn translator(&self) -> Rc<dyn Translator> {
        self.inner.translator.clone()
    }

    // -------------------------------------------------------------------------
    // Components & Pages
    // -------------------------------------------------------------------------

    pub fn register(
        &self,
        tag: &str,
        render: impl Fn(&Host<'_>) -> RenderResult + 'static,
    ) -> Result<(), RegistryError> {
        self.inner.registry.register(tag, render)
    }

    /// Render `page` into the configured root.
    pub fn render_page(&self, page: &dyn PageRenderer) -> Result<(), MountError> {
        self.inner
            .registry
            .render_page(&self.inner.config.root_selector, page)
    }

    pub fn set_routes(&self, routes: Routes) {
        *self.inner.routes.borrow_mut() = routes;
    }

    /// Resolve `path` and render its page into the root.
    pub fn navigate(&self, path: &str) -> Result<(), MountError> {
        let (canonical, page) = {
            let routes = self.inner.routes.borrow();
            (routes.canonical(path), routes.resolve(path))
        };
        let Some(page) = page else {
            warn!(path, "no page for route");
            return Err(MountError::RouteNotFound {
                path: path.to_string(),
            });
        };

        debug!(path, %canonical, "navigate");
        self.render_page(page.as_ref())?;
        self.inner.current_route.set(Some(canonical));
        Ok(())
    }

    /// Canonical path of the page last navigated to.
    pub fn current_route(&self) -> Option<String> {
        self.inner.current_route.get()
    }

    /// Cell holding the current route, for components that follow it.
    pub fn route_cell(&self) -> &ReactiveCell<Option<String>> {
        &self.inner.current_route
    }

    /// Render the current route again. No-op before the first navigation.
    pub fn rerender(&self) -> Result<(), MountError> {
        match self.current_route() {
            Some(path) => self.navigate(&path),
            None => Ok(()),
        }
    }

    // -------------------------------------------------------------------------
    // Event Loop
    // -------------------------------------------------------------------------

    /// One event loop turn: deliver the queued mutation batch, if any.
    ///
    /// Returns false once there was nothing to do or the app is stopped.
    pub fn tick(&self) -> bool {
        if !self.is_running() {
            return false;
        }
        self.inner.document.deliver_mutations()
    }

    /// Tick until the mutation queue is empty, at most `max_idle_turns`
    /// times. Returns the number of batches delivered.
    pub fn run_until_idle(&self) -> usize {
        let limit = self.inner.config.max_idle_turns;
        let mut turns = 0;
        while turns < limit && self.tick() {
            turns += 1;
        }
        if turns == limit && self.inner.document.has_pending_mutations() {
            warn!(turns, "mutation queue still busy after max idle turns");
        }
        turns
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.get()
    }

    /// Stop ticking. Pending mutations stay queued.
    pub fn stop(&self) {
        self.inner.running.set(false);
    }

    /// Stop the app and detach it from the document and translator.
    pub fn unmount(self) {
        self.stop();
        self.inner.registry.disconnect();
        if let Some(stop) = self.inner.language_watch.borrow_mut().take() {
            stop();
        }
        info!("app unmounted");
    }
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("config", &self.inner.config)
            .field("route", &self.current_route())
            .field("running", &self.is_running())
            .finish()
    }
}

/// Create the root element for an `#id` selector that matches nothing.
fn ensure_root(document: &Document, selector: &str) {
    if document.query_selector(selector).is_some() {
        return;
    }
    let Some(id) = selector.strip_prefix('#') else {
        debug!(selector, "root selector not found, render_page will report it");
        return;
    };
    if id.is_empty() || id.contains(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_')) {
        return;
    }
    warn!(selector, "root element missing, creating <main>");
    let root = document.create_element("main");
    document.set_attribute(root, "id", id);
    if let Err(err) = document.append_child(document.body(), root) {
        warn!(selector, error = %err, "could not create root element");
    }
}

// =============================================================================
// Mount Function
// =============================================================================

/// Build an [`App`] on a fresh document.
pub fn mount(
    config: AppConfig,
    store: Store,
    translator: Rc<dyn Translator>,
) -> Result<App, ConfigError> {
    App::new(config, store, translator)
}

/// Unmount and clean up.
pub fn unmount(app: App) {
    app.unmount();
}

/// Deliver mutation batches until idle.
pub fn run(app: &App) -> usize {
    app.run_until_idle()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{MutationBatch, TreeMutationSource};
    use crate::i18n::Catalog;
    use crate::router::page;
    use crate::store::{StateMap, StoreInit};

    fn empty_store() -> Store {
        Store::new(|_| StoreInit::new(StateMap::new()), Vec::new())
    }

    fn catalog() -> Rc<Catalog> {
        Rc::new(
            Catalog::new("en")
                .with_strings("en", [("title", "Welcome")])
                .with_strings("es", [("title", "Bienvenido")]),
        )
    }

    fn app() -> App {
        let config = AppConfig::default().with_create_root(true);
        App::new(config, empty_store(), catalog()).unwrap()
    }

    fn root_html(app: &App) -> String {
        let root = app.document().query_selector("#app").unwrap();
        app.document().inner_html(root)
    }

    #[test]
    fn test_creates_missing_id_root() {
        let app = app();
        let root = app.document().query_selector("#app").unwrap();
        assert_eq!(app.document().tag_name(root).as_deref(), Some("main"));
        assert_eq!(app.document().parent(root), Some(app.document().body()));
    }

    #[test]
    fn test_missing_root_is_reported_by_default() {
        let config = AppConfig::default().with_root_selector("#ap");
        let app = App::new(config, empty_store(), catalog()).unwrap();
        assert!(app.document().query_selector("#ap").is_none());

        let home = page(|host| host.set_text("home"));
        let err = app.render_page(home.as_ref()).unwrap_err();
        assert!(matches!(err, MountError::RootNotFound { selector } if selector == "#ap"));
    }

    #[test]
    fn test_translator_starts_in_configured_language() {
        let catalog = catalog();
        let config = AppConfig::default().with_language("es");
        let app = App::new(config, empty_store(), catalog.clone()).unwrap();
        assert_eq!(catalog.current_language(), "es");
        assert_eq!(app.translator().translate("title"), "Bienvenido");
    }

    #[test]
    fn test_rerender_releases_old_subscriptions() {
        let catalog = catalog();
        let config = AppConfig::default().with_create_root(true);
        let app = App::new(config, empty_store(), catalog.clone()).unwrap();

        let store = app.store().clone();
        app.register("x-watch", move |host| {
            let document = host.document.clone();
            let node = host.node;
            let unsubscribe = store.subscribe(move |state| {
                let _ = document.set_text_content(node, &format!("{}", state.len()));
            });
            host.on_destroy(unsubscribe);
            Ok(())
        })
        .unwrap();
        app.set_routes(Routes::new().route(
            "/index",
            page(|host| {
                host.append_element("x-watch")?;
                Ok(())
            }),
        ));
        app.navigate("/index").unwrap();
        assert_eq!(app.store().listener_count(), 1);
        let slots = app.document().slot_count();

        for i in 0..100 {
            catalog.set_language(if i % 2 == 0 { "es" } else { "en" });
        }
        assert_eq!(app.registry().render_count(), 101);
        assert_eq!(app.store().listener_count(), 1);
        assert_eq!(app.document().elements_by_tag("x-watch").len(), 1);
        assert_eq!(app.document().slot_count(), slots);
    }

    #[test]
    fn test_reuses_existing_root() {
        let document = Document::new();
        let root = document.create_element("div");
        document.set_attribute(root, "id", "app");
        document.append_child(document.body(), root).unwrap();

        let app = App::with_document(document, AppConfig::default(), empty_store(), catalog()).unwrap();
        assert_eq!(app.document().query_selector_all("#app"), vec![root]);
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = AppConfig {
            max_idle_turns: 0,
            ..AppConfig::default()
        };
        let result = App::new(config, empty_store(), catalog());
        assert!(matches!(result, Err(ConfigError::Invalid { field: "max_idle_turns", .. })));
    }

    #[test]
    fn test_render_page_with_component() {
        let app = app();
        app.register("x-badge", |host| host.set_text("new")).unwrap();

        let home = page(|host| {
            host.append_element("x-badge")?;
            Ok(())
        });
        app.render_page(home.as_ref()).unwrap();
        assert_eq!(root_html(&app), "<x-badge>new</x-badge>");
    }

    #[test]
    fn test_render_page_without_root() {
        let config = AppConfig::default().with_root_selector(".shell");
        let app = App::new(config, empty_store(), catalog()).unwrap();
        let home = page(|_host| Ok(()));
        let err = app.render_page(home.as_ref()).unwrap_err();
        assert!(matches!(err, MountError::RootNotFound { .. }));
    }

    #[test]
    fn test_navigate_through_routes() {
        let app = app();
        app.set_routes(
            Routes::new()
                .route("/index", page(|host| host.set_text("home")))
                .route("/about", page(|host| host.set_text("about")))
                .alias("/", "/index"),
        );

        app.navigate("/").unwrap();
        assert_eq!(root_html(&app), "home");
        assert_eq!(app.current_route().as_deref(), Some("/index"));

        app.navigate("/about/").unwrap();
        assert_eq!(root_html(&app), "about");

        let err = app.navigate("/missing").unwrap_err();
        assert!(matches!(err, MountError::RouteNotFound { path } if path == "/missing"));
        assert_eq!(app.current_route().as_deref(), Some("/about"));
    }

    #[test]
    fn test_language_change_rerenders_current_page() {
        let catalog = catalog();
        let config = AppConfig::default().with_create_root(true);
        let app = App::new(config, empty_store(), catalog.clone()).unwrap();

        let translator = app.translator();
        app.set_routes(Routes::new().route(
            "/index",
            page(move |host| host.set_text(&translator.translate("title"))),
        ));
        app.navigate("/index").unwrap();
        assert_eq!(root_html(&app), "Welcome");

        catalog.set_language("es");
        assert_eq!(root_html(&app), "Bienvenido");
    }

    #[test]
    fn test_tick_delivers_one_batch() {
        let app = app();
        app.register("x-item", |host| host.set_text("item")).unwrap();

        let scans_before = app.registry().scan_count();
        for _ in 0..3 {
            let el = app.document().create_element("p");
            app.document().append_child(app.document().body(), el).unwrap();
        }
        assert!(app.tick());
        assert_eq!(app.registry().scan_count(), scans_before + 1);
        assert!(!app.tick());
    }

    #[test]
    fn test_run_until_idle_is_bounded() {
        let config = AppConfig {
            max_idle_turns: 4,
            ..AppConfig::default()
        };
        let app = App::new(config, empty_store(), catalog()).unwrap();

        // Every batch queues another one.
        let document = app.document().clone();
        let _stop = app.document().observe(Rc::new(move |_batch: &MutationBatch| {
            let el = document.create_element("span");
            let _ = document.append_child(document.body(), el);
        }));

        let el = app.document().create_element("span");
        app.document().append_child(app.document().body(), el).unwrap();

        assert_eq!(app.run_until_idle(), 4);
        assert!(app.document().has_pending_mutations());
    }

    #[test]
    fn test_unmount_stops_everything() {
        let app = app();
        let document = app.document().clone();
        let registry = app.registry().clone();
        app.clone().unmount();

        assert!(!app.is_running());
        let el = document.create_element("p");
        document.append_child(document.body(), el).unwrap();
        assert!(!app.tick());

        document.deliver_mutations();
        assert_eq!(registry.scan_count(), 0);
    }
}

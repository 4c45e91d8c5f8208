//! End-to-end: counter components over a mounted app.

use std::rc::Rc;

use pretty_assertions::assert_eq;
use serde_json::json;

use spark_elements::{
    App, AppConfig, Catalog, Document, Host, KeyValueStorage, MemoryStorage, Middleware,
    MountError, ReactiveCell, RenderResult, Routes, Store, StoreInit, Translator, page, state_map,
    store::Patch,
};

/// `<x-counter>`: local cell, a label and a button.
fn render_counter(host: &Host<'_>) -> RenderResult {
    let document = host.document.clone();
    let count = ReactiveCell::new(0_i64);

    let label = host.append_element("span")?;
    let button = host.append_element("button")?;
    document.set_text_content(button, "+")?;
    document.set_text_content(label, "Count: 0")?;

    let writer = document.clone();
    // The subscription lives as long as the cell.
    let _keep = count.subscribe(move |n: &i64| {
        let _ = writer.set_text_content(label, &format!("Count: {n}"));
    });

    let clicks = count.clone();
    let _detach = document.add_event_listener(button, "click", move |_event| {
        clicks.update(|n| n + 1);
    });
    Ok(())
}

fn config() -> AppConfig {
    AppConfig::default().with_create_root(true)
}

fn counter_app() -> App {
    let store = Store::new(|_| StoreInit::new(state_map(json!({}))), Vec::new());
    let app = App::new(config(), store, Rc::new(Catalog::new("en"))).unwrap();
    app.register("x-counter", render_counter).unwrap();
    app
}

#[test]
fn test_counter_renders_and_counts_clicks() {
    let app = counter_app();
    let home = page(|host| {
        host.append_element("x-counter")?;
        Ok(())
    });
    app.render_page(home.as_ref()).unwrap();

    let document = app.document();
    let counter = document.query_selector("x-counter").unwrap();
    let label = document.query_selector("span").unwrap();
    let button = document.query_selector("button").unwrap();
    assert_eq!(document.text_content(label), "Count: 0");

    document.dispatch_event(button, "click");
    assert_eq!(document.text_content(label), "Count: 1");

    document.dispatch_event(button, "click");
    assert_eq!(document.text_content(label), "Count: 2");

    // Later scans and mutation batches must not duplicate the subtree.
    app.run_until_idle();
    app.registry().scan();
    assert_eq!(document.children(counter).len(), 2);
    assert_eq!(document.query_selector_all("button").len(), 1);
    assert_eq!(app.registry().render_count(), 1);
}

#[test]
fn test_counter_inserted_later_is_rendered() {
    let app = counter_app();
    let document = app.document();
    let root = document.query_selector("#app").unwrap();

    let counter = document.create_element("x-counter");
    document.append_child(root, counter).unwrap();
    app.run_until_idle();

    assert_eq!(
        document.inner_html(counter),
        "<span>Count: 0</span><button>+</button>"
    );
}

#[test]
fn test_store_counter_with_persistence() {
    let storage = MemoryStorage::new();
    let shared: Rc<dyn KeyValueStorage> = Rc::new(storage.clone());

    let config = config().with_persist_key("counter-state");
    let build_store = |storage: &MemoryStorage, shared: Rc<dyn KeyValueStorage>| {
        let initial = config.hydrate_state(storage, state_map(json!({ "count": 0 })));
        let middlewares: Vec<Box<dyn Middleware>> = vec![Box::new(config.persist_middleware(shared))];
        Store::new(
            move |handle| {
                let handle = handle.clone();
                StoreInit::new(initial).action("increment", move |_| {
                    handle.set_state(Patch::update(|state| {
                        let n = state["count"].as_i64().unwrap_or(0);
                        state_map(json!({ "count": n + 1 }))
                    }));
                })
            },
            middlewares,
        )
    };

    let store = build_store(&storage, shared.clone());
    for _ in 0..3 {
        store.dispatch("increment", json!(null)).unwrap();
    }
    assert_eq!(store.get("count"), Some(json!(3)));
    drop(store);

    // A fresh store on the same storage starts from the persisted state.
    let store = build_store(&storage, shared);
    assert_eq!(store.get("count"), Some(json!(3)));

    let app = App::new(config.clone(), store, Rc::new(Catalog::new("en"))).unwrap();
    let store = app.store().clone();
    app.register("x-store-count", move |host| {
        let document = host.document.clone();
        let node = host.node;
        host.set_text(&format!("{}", store.get("count").unwrap_or_default()))?;
        let unsubscribe = store.subscribe(move |state| {
            let _ = document.set_text_content(node, &format!("{}", state["count"]));
        });
        host.on_destroy(unsubscribe);
        Ok(())
    })
    .unwrap();

    app.render_page(
        page(|host| {
            host.append_element("x-store-count")?;
            Ok(())
        })
        .as_ref(),
    )
    .unwrap();

    let node = app.document().query_selector("x-store-count").unwrap();
    assert_eq!(app.document().text_content(node), "3");

    app.store().dispatch("increment", json!(null)).unwrap();
    assert_eq!(app.document().text_content(node), "4");
    assert_eq!(storage.get_item("counter-state").as_deref(), Some(r#"{"count":4}"#));
    assert_eq!(app.store().listener_count(), 1);

    // Replacing the page drops the old component's subscription.
    app.render_page(page(|host| host.set_text("empty")).as_ref()).unwrap();
    assert_eq!(app.store().listener_count(), 0);
}

#[test]
fn test_translated_navigation() {
    let catalog = Rc::new(
        Catalog::new("en")
            .with_strings("en", [("nav.home", "Home"), ("nav.about", "About")])
            .with_strings("es", [("nav.home", "Inicio"), ("nav.about", "Acerca")]),
    );
    let store = Store::new(|_| StoreInit::new(state_map(json!({}))), Vec::new());
    let app = App::new(config(), store, catalog.clone()).unwrap();

    let translator: Rc<dyn Translator> = app.translator();
    let home_t = translator.clone();
    let about_t = translator;
    app.set_routes(
        Routes::new()
            .route("/index", page(move |host| host.set_text(&home_t.translate("nav.home"))))
            .route("/about", page(move |host| host.set_text(&about_t.translate("nav.about"))))
            .alias("/", "/index"),
    );

    let root = app.document().query_selector("#app").unwrap();
    app.navigate("/").unwrap();
    assert_eq!(app.document().text_content(root), "Home");

    app.navigate("/about").unwrap();
    catalog.set_language("es");
    assert_eq!(app.document().text_content(root), "Acerca");
    assert_eq!(app.current_route().as_deref(), Some("/about"));
}

#[test]
fn test_existing_root_and_missing_root() {
    let document = Document::new();
    let shell = document.create_element("div");
    document.set_attribute(shell, "id", "shell");
    document.append_child(document.body(), shell).unwrap();

    let store = Store::new(|_| StoreInit::new(state_map(json!({}))), Vec::new());
    let config = AppConfig::default().with_root_selector("#shell");
    let app = App::with_document(document, config, store, Rc::new(Catalog::new("en"))).unwrap();
    app.register("x-counter", render_counter).unwrap();
    app.render_page(page(|host| host.append_element("x-counter").map(|_| ())).as_ref())
        .unwrap();
    assert_eq!(app.document().text_content(shell), "Count: 0+");

    // Typo in the selector: reported, nothing created.
    let store = Store::new(|_| StoreInit::new(state_map(json!({}))), Vec::new());
    let config = AppConfig::default().with_root_selector("#shel");
    let app = App::new(config, store, Rc::new(Catalog::new("en"))).unwrap();
    let err = app.render_page(page(|_host| Ok(())).as_ref()).unwrap_err();
    assert!(matches!(err, MountError::RootNotFound { .. }));
}

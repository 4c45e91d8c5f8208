//! Counter demo.
//!
//! Mounts an app with a persisted store, a two-language catalog and three
//! routes, clicks the counters a few times and prints the resulting HTML.
//!
//! ```text
//! RUST_LOG=spark_elements=debug cargo run --example counter
//! ```

use std::rc::Rc;

use serde_json::json;
use tracing_subscriber::EnvFilter;

use spark_elements::store::Patch;
use spark_elements::{
    App, AppConfig, Catalog, Host, KeyValueStorage, LoggerMiddleware, MemoryStorage, Middleware,
    ReactiveCell, RenderResult, Routes, Store, StoreInit, Translator, page, state_map,
};

fn local_counter(host: &Host<'_>) -> RenderResult {
    let document = host.document.clone();
    let count = ReactiveCell::new(0_i64);

    let label = host.append_element("span")?;
    let button = host.append_element("button")?;
    document.set_text_content(label, "Count: 0")?;
    document.set_text_content(button, "+")?;

    let writer = document.clone();
    let _keep = count.subscribe(move |n: &i64| {
        let _ = writer.set_text_content(label, &format!("Count: {n}"));
    });
    let clicks = count.clone();
    let _detach = document.add_event_listener(button, "click", move |_event| {
        clicks.update(|n| n + 1);
    });
    Ok(())
}

fn main() -> spark_elements::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let config = AppConfig::from_json(r#"{ "create_root": true, "persist_key": "demo-state" }"#)?;
    let storage = MemoryStorage::new();
    let shared: Rc<dyn KeyValueStorage> = Rc::new(storage.clone());

    let initial = config.hydrate_state(&storage, state_map(json!({ "count": 0 })));
    let middlewares: Vec<Box<dyn Middleware>> = vec![
        Box::new(config.persist_middleware(shared)),
        Box::new(LoggerMiddleware::new("demo")),
    ];
    let store = Store::new(
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
    );

    let catalog = Rc::new(
        Catalog::new(config.language.clone())
            .with_strings("en", [("title", "Counter"), ("about", "About this demo")])
            .with_strings("es", [("title", "Contador"), ("about", "Acerca de la demo")]),
    );

    let app = App::new(config, store, catalog.clone())?;
    app.register("x-counter", local_counter)?;

    let store = app.store().clone();
    app.register("x-global-counter", move |host| {
        let document = host.document.clone();
        let node = host.node;
        host.set_text(&format!("global: {}", store.get("count").unwrap_or_default()))?;
        let unsubscribe = store.subscribe(move |state| {
            let _ = document.set_text_content(node, &format!("global: {}", state["count"]));
        });
        host.on_destroy(unsubscribe);
        Ok(())
    })?;

    let translator: Rc<dyn Translator> = app.translator();
    let home_t = translator.clone();
    app.set_routes(
        Routes::new()
            .route(
                "/index",
                page(move |host| {
                    let heading = host.append_element("h1")?;
                    host.document
                        .set_text_content(heading, &home_t.translate("title"))?;
                    host.append_element("x-counter")?;
                    host.append_element("x-global-counter")?;
                    Ok(())
                }),
            )
            .route("/about", page(move |host| host.set_text(&translator.translate("about"))))
            .alias("/", "/index")
            .fallback(page(|host| host.set_text("404"))),
    );

    app.navigate("/")?;
    app.run_until_idle();

    let document = app.document();
    if let Some(button) = document.query_selector("button") {
        document.dispatch_event(button, "click");
        document.dispatch_event(button, "click");
    }
    app.store().dispatch("increment", json!(null))?;
    app.run_until_idle();
    println!("{}", document.outer_html(document.body()));

    catalog.set_language("es");
    app.run_until_idle();
    println!("{}", document.outer_html(document.body()));

    println!("persisted: {:?}", storage.get_item(&app.config().persist_key));
    app.unmount();
    Ok(())
}

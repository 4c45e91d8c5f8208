//! Router - Path to page lookup.
//!
//! Pages are anything implementing [`PageRenderer`]; closures qualify.
//! The table resolves aliases before lookup, so the host can map `/` and
//! `/index.html` onto the same page.
//!
//! # Example
//!
//! ```ignore
//! use spark_elements::router::{Routes, page};
//!
//! let routes = Routes::new()
//!     .route("/home", page(|host| host.set_text("home")))
//!     .route("/about", page(|host| host.set_text("about")))
//!     .alias("/", "/home");
//!
//! assert!(routes.resolve("/").is_some());
//! ```

use std::collections::HashMap;
use std::rc::Rc;

use tracing::debug;

use crate::engine::{Host, RenderResult};

/// Something that renders a page into a host element.
pub trait PageRenderer {
    fn render(&self, host: &Host<'_>) -> RenderResult;
}

impl<F> PageRenderer for F
where
    F: Fn(&Host<'_>) -> RenderResult,
{
    fn render(&self, host: &Host<'_>) -> RenderResult {
        self(host)
    }
}

/// Box a closure as a shared page.
pub fn page(f: impl Fn(&Host<'_>) -> RenderResult + 'static) -> Rc<dyn PageRenderer> {
    Rc::new(f)
}

/// Route table.
#[derive(Clone, Default)]
pub struct Routes {
    pages: HashMap<String, Rc<dyn PageRenderer>>,
    aliases: HashMap<String, String>,
    not_found: Option<Rc<dyn PageRenderer>>,
}

impl Routes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, path: impl Into<String>, page: Rc<dyn PageRenderer>) -> Self {
        self.pages.insert(normalize_path(&path.into()), page);
        self
    }

    /// Make `from` resolve to the page registered under `to`.
    pub fn alias(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.aliases
            .insert(normalize_path(&from.into()), normalize_path(&to.into()));
        self
    }

    /// Page rendered for unknown paths.
    pub fn fallback(mut self, page: Rc<dyn PageRenderer>) -> Self {
        self.not_found = Some(page);
        self
    }

    /// Canonical path after alias resolution.
    pub fn canonical(&self, path: &str) -> String {
        let path = normalize_path(path);
        self.aliases.get(&path).cloned().unwrap_or(path)
    }

    /// Page for `path`, falling back to the not-found page.
    pub fn resolve(&self, path: &str) -> Option<Rc<dyn PageRenderer>> {
        let canonical = self.canonical(path);
        match self.pages.get(&canonical) {
            Some(page) => Some(page.clone()),
            None => {
                debug!(path, "no route, using fallback");
                self.not_found.clone()
            }
        }
    }

    pub fn paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.pages.keys().map(String::as_str).collect();
        paths.sort_unstable();
        paths
    }
}

/// Strip query/fragment and trailing slashes; empty becomes `/`.
fn normalize_path(path: &str) -> String {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

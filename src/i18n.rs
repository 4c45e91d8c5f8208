//! Translation - Key lookup with a reactive current language.
//!
//! Render functions depend on the [`Translator`] capability only. [`Catalog`]
//! is the in-memory implementation: one string table per language, with the
//! active language held in a [`ReactiveCell`] so components can re-render
//! when it changes.
//!
//! # Example
//!
//! ```ignore
//! use spark_elements::i18n::{Catalog, Translator};
//!
//! let catalog = Catalog::new("en")
//!     .with_strings("en", [("greeting", "Hello, {name}!")])
//!     .with_strings("de", [("greeting", "Hallo, {name}!")]);
//!
//! assert_eq!(catalog.translate_with("greeting", &[("name", "Ada")]), "Hello, Ada!");
//! catalog.set_language("de");
//! assert_eq!(catalog.translate("missing.key"), "missing.key");
//! ```

use std::cell::RefCell;
use std::collections::HashMap;

use tracing::{debug, trace};

use crate::reactive::ReactiveCell;
use crate::types::Unsubscribe;

/// Translation capability consumed by render functions.
pub trait Translator {
    /// String for `key` in the current language, or `key` itself.
    fn translate(&self, key: &str) -> String;

    fn current_language(&self) -> String;

    /// Switch language. Listeners run only if it actually changed.
    fn set_language(&self, language: &str);

    /// Call `callback` with the new language code whenever it changes.
    fn on_language_change(&self, callback: Box<dyn Fn(&str)>) -> Unsubscribe;

    /// [`translate`](Self::translate) with `{name}` placeholders replaced.
    fn translate_with(&self, key: &str, args: &[(&str, &str)]) -> String {
        interpolate(&self.translate(key), args)
    }
}

/// Replace every `{name}` in `template` with its value from `args`.
/// Unknown placeholders are left as they are.
pub fn interpolate(template: &str, args: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (name, value) in args {
        out = out.replace(&format!("{{{name}}}"), value);
    }
    out
}

/// In-memory string tables keyed by language code.
pub struct Catalog {
    tables: RefCell<HashMap<String, HashMap<String, String>>>,
    language: ReactiveCell<String>,
}

impl Catalog {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            tables: RefCell::new(HashMap::new()),
            language: ReactiveCell::new(language.into()),
        }
    }

    /// Builder form of [`add_strings`](Self::add_strings).
    pub fn with_strings<K, V>(self, language: &str, strings: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.add_strings(language, strings);
        self
    }

    /// Merge `strings` into the table for `language`.
    pub fn add_strings<K, V>(&self, language: &str, strings: impl IntoIterator<Item = (K, V)>)
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut tables = self.tables.borrow_mut();
        let table = tables.entry(language.to_string()).or_default();
        for (key, value) in strings {
            table.insert(key.into(), value.into());
        }
    }

    pub fn languages(&self) -> Vec<String> {
        let mut languages: Vec<String> = self.tables.borrow().keys().cloned().collect();
        languages.sort();
        languages
    }

    /// The cell holding the active language code.
    pub fn language_cell(&self) -> &ReactiveCell<String> {
        &self.language
    }
}

impl Translator for Catalog {
    fn translate(&self, key: &str) -> String {
        let language = self.language.get();
        let found = self
            .tables
            .borrow()
            .get(&language)
            .and_then(|table| table.get(key))
            .cloned();
        found.unwrap_or_else(|| {
            trace!(key, %language, "missing translation");
            key.to_string()
        })
    }

    fn current_language(&self) -> String {
        self.language.get()
    }

    fn set_language(&self, language: &str) {
        debug!(language, "language change");
        self.language.set(language.to_string());
    }

    fn on_language_change(&self, callback: Box<dyn Fn(&str)>) -> Unsubscribe {
        self.language.subscribe(move |language: &String| callback(language))
    }
}

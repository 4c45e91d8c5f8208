//! Application configuration.
//!
//! # Example
//!
//! ```ignore
//! use spark_elements::config::AppConfig;
//!
//! let config = AppConfig::from_json(r#"{ "root_selector": "#app", "language": "de" }"#)?;
//! assert_eq!(config.persist_key, "app-state");
//! ```

use std::rc::Rc;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::store::{KeyValueStorage, PersistMiddleware, StateMap, hydrate_or};

/// Settings the entry point hands to [`App::new`](crate::pipeline::App::new).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Selector of the element pages are rendered into.
    pub root_selector: String,
    /// Storage key the persistence middleware writes the committed state to.
    pub persist_key: String,
    /// Language the translator starts in.
    pub language: String,
    /// Upper bound on mutation batches delivered by one `run_until_idle` call.
    pub max_idle_turns: usize,
    /// Append a `<main>` for an `#id` root selector that matches nothing.
    /// Off by default, so a mistyped selector surfaces as `RootNotFound`.
    pub create_root: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            root_selector: "#app".to_string(),
            persist_key: "app-state".to_string(),
            language: "en".to_string(),
            max_idle_turns: 64,
            create_root: false,
        }
    }
}

impl AppConfig {
    /// Parse a config from JSON. Missing fields take their default.
    pub fn from_json(source: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_root_selector(mut self, selector: impl Into<String>) -> Self {
        self.root_selector = selector.into();
        self
    }

    pub fn with_persist_key(mut self, key: impl Into<String>) -> Self {
        self.persist_key = key.into();
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_create_root(mut self, create_root: bool) -> Self {
        self.create_root = create_root;
        self
    }

    /// Persistence middleware writing under `persist_key`.
    pub fn persist_middleware(&self, storage: Rc<dyn KeyValueStorage>) -> PersistMiddleware {
        PersistMiddleware::new(storage, self.persist_key.clone())
    }

    /// `defaults` with the state persisted under `persist_key` merged over it.
    pub fn hydrate_state(&self, storage: &dyn KeyValueStorage, defaults: StateMap) -> StateMap {
        hydrate_or(storage, &self.persist_key, defaults)
    }

    /// Check field invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.root_selector.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "root_selector",
                reason: "must not be empty".to_string(),
            });
        }
        if self.persist_key.is_empty() {
            return Err(ConfigError::Invalid {
                field: "persist_key",
                reason: "must not be empty".to_string(),
            });
        }
        if self.max_idle_turns == 0 {
            return Err(ConfigError::Invalid {
                field: "max_idle_turns",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

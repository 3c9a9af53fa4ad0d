// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The example store: canned response envelopes for operations that no
//! domain handler services.
//!
//! Entries are keyed by `"METHOD /path/pattern"`. A built-in set ships
//! embedded in the binary; a configured directory of `*.json` files
//! (each `{method, path, response}`) is layered on top and wins on
//! conflicts.

use std::collections::HashMap;
use std::path::Path;

use serde_json::Value;

use crate::error::{Error, Result};

/// The embedded examples, keyed by `"METHOD pattern"`.
const EMBEDDED: &str = include_str!("../assets/examples.json");

/// Canned `(method, pattern)` → response envelope lookups.
pub struct ExampleStore {
    entries: HashMap<String, Value>,
}

impl ExampleStore {
    /// Only the embedded examples.
    pub fn embedded() -> ExampleStore {
        let entries: HashMap<String, Value> =
            serde_json::from_str(EMBEDDED).expect("embedded examples are valid JSON");
        ExampleStore { entries }
    }

    /// Embedded examples plus an on-disk overlay.
    pub fn with_overlay(dir: &Path) -> Result<ExampleStore> {
        let mut store = ExampleStore::embedded();
        let listing = std::fs::read_dir(dir)?;
        for entry in listing {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let source = std::fs::read_to_string(&path)?;
            let parsed: Value = serde_json::from_str(&source).map_err(|e| {
                Error::Internal(format!("bad example file {}: {}", path.display(), e))
            })?;
            let method = parsed.get("method").and_then(|m| m.as_str());
            let pattern = parsed.get("path").and_then(|p| p.as_str());
            let response = parsed.get("response");
            match (method, pattern, response) {
                (Some(method), Some(pattern), Some(response)) => {
                    store.entries.insert(
                        format!("{} {}", method.to_uppercase(), pattern),
                        response.clone(),
                    );
                }
                _ => {
                    return Err(Error::Internal(format!(
                        "example file {} must carry method, path, and response",
                        path.display()
                    )))
                }
            }
        }
        Ok(store)
    }

    /// Looks up the canned envelope for a matched operation.
    pub fn lookup(&self, method: &str, pattern: &str) -> Option<&Value> {
        self.entries.get(&format!("{} {}", method, pattern))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_examples_parse_and_resolve() {
        let store = ExampleStore::embedded();
        assert!(!store.is_empty());

        let notes = store
            .lookup("GET", "/2/notes/search/notes_written")
            .expect("notes example ships embedded");
        assert!(notes.get("data").is_some());
    }

    #[test]
    fn lookup_is_method_sensitive() {
        let store = ExampleStore::embedded();
        assert!(store.lookup("DELETE", "/2/notes/search/notes_written").is_none());
    }
}

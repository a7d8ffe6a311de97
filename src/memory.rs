//! Long-term memory store
//!
//! A single JSON file of nested facts about the user (identity,
//! preferences, relationships, emotional state). The classifier emits
//! partial updates which are deep-merged in, and a flattened compact view
//! is injected into the prompt context before each classification.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde_json::{Map, Value};

use crate::Result;

/// JSON-file backed memory store
#[derive(Debug, Clone)]
pub struct MemoryStore {
    path: PathBuf,
}

impl MemoryStore {
    /// Create a store backed by `path`; the file is created on first update
    #[must_use]
    pub const fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Load the full memory object; a missing or unreadable file yields an
    /// empty object
    #[must_use]
    pub fn load(&self) -> Value {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                tracing::warn!(path = %self.path.display(), error = %e, "memory file corrupt, starting fresh");
                Value::Object(Map::new())
            }),
            Err(_) => Value::Object(Map::new()),
        }
    }

    /// Deep-merge a partial update into the stored memory
    ///
    /// Nested objects merge key by key; any other value replaces what was
    /// there.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written.
    pub fn update(&self, partial: &Value) -> Result<()> {
        let mut current = self.load();
        deep_merge(&mut current, partial);

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&current)?)?;
        tracing::debug!(path = %self.path.display(), "memory updated");
        Ok(())
    }

    /// Flatten the memory into the compact key set used in prompts
    ///
    /// `identity.name` becomes `user_name`; favorite preferences keep their
    /// keys; each relationship becomes `{relation}_name`; each emotional
    /// state entry becomes `emotion_{event}`.
    #[must_use]
    pub fn minimal_context(&self) -> BTreeMap<String, String> {
        let memory = self.load();
        let mut out = BTreeMap::new();

        if let Some(name) = memory["identity"]["name"].as_str() {
            if !name.is_empty() {
                out.insert("user_name".to_string(), name.to_string());
            }
        }

        if let Some(prefs) = memory["preferences"].as_object() {
            for key in ["favorite_color", "favorite_food", "favorite_music"] {
                if let Some(value) = prefs.get(key).and_then(Value::as_str) {
                    if !value.is_empty() {
                        out.insert(key.to_string(), value.to_string());
                    }
                }
            }
        }

        if let Some(relationships) = memory["relationships"].as_object() {
            for (relation, info) in relationships {
                let name = info["name"].as_str().or_else(|| info.as_str());
                if let Some(name) = name {
                    if !name.is_empty() {
                        out.insert(format!("{relation}_name"), name.to_string());
                    }
                }
            }
        }

        if let Some(emotions) = memory["emotional_state"].as_object() {
            for (event, feeling) in emotions {
                if let Some(feeling) = feeling.as_str() {
                    if !feeling.is_empty() {
                        out.insert(format!("emotion_{event}"), feeling.to_string());
                    }
                }
            }
        }

        out
    }
}

/// Merge `partial` into `base`, recursing through objects
fn deep_merge(base: &mut Value, partial: &Value) {
    match (base, partial) {
        (Value::Object(base_map), Value::Object(partial_map)) => {
            for (key, value) in partial_map {
                match base_map.get_mut(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base_slot, value) => {
            *base_slot = value.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> (tempfile::TempDir, MemoryStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new(dir.path().join("memory.json"));
        (dir, store)
    }

    #[test]
    fn missing_file_loads_empty() {
        let (_dir, store) = store();
        assert_eq!(store.load(), json!({}));
    }

    #[test]
    fn deep_merge_preserves_siblings() {
        let (_dir, store) = store();
        store
            .update(&json!({"identity": {"name": "Alex"}, "preferences": {"favorite_color": "blue"}}))
            .unwrap();
        store
            .update(&json!({"preferences": {"favorite_food": "ramen"}}))
            .unwrap();

        let memory = store.load();
        assert_eq!(memory["identity"]["name"], "Alex");
        assert_eq!(memory["preferences"]["favorite_color"], "blue");
        assert_eq!(memory["preferences"]["favorite_food"], "ramen");
    }

    #[test]
    fn scalar_update_replaces() {
        let (_dir, store) = store();
        store.update(&json!({"identity": {"name": "Alex"}})).unwrap();
        store.update(&json!({"identity": {"name": "Sam"}})).unwrap();
        assert_eq!(store.load()["identity"]["name"], "Sam");
    }

    #[test]
    fn minimal_context_flattens() {
        let (_dir, store) = store();
        store
            .update(&json!({
                "identity": {"name": "Alex"},
                "preferences": {"favorite_color": "blue", "theme": "dark"},
                "relationships": {"sister": {"name": "Mia"}},
                "emotional_state": {"exam": "nervous"},
            }))
            .unwrap();

        let ctx = store.minimal_context();
        assert_eq!(ctx["user_name"], "Alex");
        assert_eq!(ctx["favorite_color"], "blue");
        assert_eq!(ctx["sister_name"], "Mia");
        assert_eq!(ctx["emotion_exam"], "nervous");
        // Keys outside the compact set stay out of the prompt
        assert!(!ctx.contains_key("theme"));
    }
}

//! Automaton cache keyed by schema structural hash.

use std::sync::Arc;

use dashmap::DashMap;
use janus_core::Result;
use serde_json::Value;

use crate::automaton::ConstraintAutomaton;
use crate::compile::compile;

/// Computes a structural hash of a schema: object keys are sorted
/// recursively so formatting and key order do not affect identity.
#[must_use]
pub fn structural_hash(schema: &Value) -> [u8; 32] {
    let mut canonical = String::new();
    write_canonical(schema, &mut canonical);
    *blake3::hash(canonical.as_bytes()).as_bytes()
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            out.push('{');
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key).unwrap_or_default());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Shared cache of compiled automata.
///
/// Automata are read-only after construction, so a cache hit hands out the
/// same `Arc` to every concurrent session.
#[derive(Default)]
pub struct SchemaCache {
    automata: DashMap<[u8; 32], Arc<ConstraintAutomaton>>,
}

impl SchemaCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the automaton for `schema`, compiling it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`janus_core::Error::UnsupportedSchema`] when compilation
    /// fails; failures are not cached.
    pub fn get_or_compile(&self, schema: &Value) -> Result<Arc<ConstraintAutomaton>> {
        let key = structural_hash(schema);
        if let Some(hit) = self.automata.get(&key) {
            return Ok(Arc::clone(&hit));
        }
        let automaton = Arc::new(compile(schema)?);
        self.automata.insert(key, Arc::clone(&automaton));
        tracing::debug!(states = automaton.state_count(), "Cached constraint automaton");
        Ok(automaton)
    }

    /// Number of cached automata.
    #[must_use]
    pub fn len(&self) -> usize {
        self.automata.len()
    }

    /// Returns `true` if nothing has been cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.automata.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hash_ignores_key_order() {
        let a = json!({"type": "object", "properties": {"x": {"type": "string"}}});
        let b = json!({"properties": {"x": {"type": "string"}}, "type": "object"});
        assert_eq!(structural_hash(&a), structural_hash(&b));

        let c = json!({"type": "object", "properties": {"y": {"type": "string"}}});
        assert_ne!(structural_hash(&a), structural_hash(&c));
    }

    #[test]
    fn repeated_schemas_share_one_automaton() {
        let cache = SchemaCache::new();
        let schema = json!({"type": "object", "properties": {"name": {"type": "string"}}});
        let first = cache.get_or_compile(&schema).unwrap();
        let second = cache.get_or_compile(&schema).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn failed_compiles_are_not_cached() {
        let cache = SchemaCache::new();
        let schema = json!({"$ref": "#"});
        assert!(cache.get_or_compile(&schema).is_err());
        assert!(cache.is_empty());
    }
}

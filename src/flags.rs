//! Document flags - global configuration inputs.
//!
//! Flags are an implicit input to the dependency graph: a state variable that
//! declares a flag dependency is invalidated when `set_flags` changes that
//! flag, exactly as if an upstream variable had changed. Values are arbitrary
//! JSON so embedders can thread feature toggles through without the core
//! enumerating them; the known toggles get typed accessors.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::types::StateValue;

/// Flag names the core itself consults.
pub const FLAG_READ_ONLY: &str = "readOnly";
/// Shown-correctness toggle, consulted by answer-like components.
pub const FLAG_SHOW_CORRECTNESS: &str = "showCorrectness";

/// The document-wide configuration map installed via `set_flags`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentFlags {
    values: IndexMap<String, serde_json::Value>,
}

impl DocumentFlags {
    /// An empty flag set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set one flag, returning self for chaining.
    pub fn with(mut self, name: &str, value: serde_json::Value) -> Self {
        self.values.insert(name.to_string(), value);
        self
    }

    /// Raw JSON value of a flag.
    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.values.get(name)
    }

    /// Flag value as a [`StateValue`] for dependency plumbing.
    ///
    /// Missing flags and non-scalar values resolve to `Boolean(false)`.
    pub fn state_value(&self, name: &str) -> StateValue {
        self.values
            .get(name)
            .and_then(StateValue::from_json)
            .unwrap_or(StateValue::Boolean(false))
    }

    /// Whether the document is read-only (inputs reject actions).
    pub fn read_only(&self) -> bool {
        self.state_value(FLAG_READ_ONLY).to_boolean()
    }

    /// Whether components should surface correctness to the renderer.
    pub fn show_correctness(&self) -> bool {
        self.state_value(FLAG_SHOW_CORRECTNESS).to_boolean()
    }

    /// The set of flag names whose values differ between `self` and `other`.
    ///
    /// Used by `set_flags` to invalidate only the variables subscribed to
    /// flags that actually changed.
    pub fn changed_from(&self, other: &Self) -> Vec<String> {
        let mut changed = Vec::new();
        for (name, value) in &self.values {
            if other.get(name) != Some(value) {
                changed.push(name.clone());
            }
        }
        for name in other.values.keys() {
            if !self.values.contains_key(name) {
                changed.push(name.clone());
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_accessors() {
        let flags = DocumentFlags::new()
            .with(FLAG_READ_ONLY, serde_json::json!(true))
            .with(FLAG_SHOW_CORRECTNESS, serde_json::json!(true));
        assert!(flags.read_only());
        assert!(flags.show_correctness());
        assert!(!DocumentFlags::new().read_only());
        assert!(!DocumentFlags::new().show_correctness());
    }

    #[test]
    fn test_state_value_conversion() {
        let flags = DocumentFlags::new().with("limit", serde_json::json!(3));
        assert_eq!(flags.state_value("limit"), StateValue::Integer(3));
        assert_eq!(flags.state_value("missing"), StateValue::Boolean(false));
    }

    #[test]
    fn test_changed_from() {
        let a = DocumentFlags::new()
            .with("x", serde_json::json!(1))
            .with("y", serde_json::json!(true));
        let b = DocumentFlags::new()
            .with("x", serde_json::json!(2))
            .with("y", serde_json::json!(true));
        assert_eq!(b.changed_from(&a), vec!["x".to_string()]);

        let c = DocumentFlags::new().with("y", serde_json::json!(true));
        let mut changed = c.changed_from(&a);
        changed.sort();
        assert_eq!(changed, vec!["x".to_string()]);
    }
}

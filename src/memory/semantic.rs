//! Semantic memory: a key→fact map for explicit assertions
//! ("user_name = Alice"). Writes are set-or-update; reads are by key or a
//! full listing for prompt assembly.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

/// A single asserted fact.
#[derive(Debug, Clone)]
pub struct SemanticFact {
    pub key: String,
    pub fact: String,
    pub timestamp: DateTime<Utc>,
}

/// Key/value store of asserted facts.
#[derive(Default)]
pub struct SemanticMemory {
    facts: HashMap<String, SemanticFact>,
}

impl SemanticMemory {
    pub fn new() -> Self {
        SemanticMemory { facts: HashMap::new() }
    }

    /// Set or update the fact stored under `key`. Exactly one entry survives per key.
    pub fn set(&mut self, key: impl Into<String>, fact: impl Into<String>, timestamp: DateTime<Utc>) {
        let key = key.into();
        self.facts.insert(
            key.clone(),
            SemanticFact {
                key,
                fact: fact.into(),
                timestamp,
            },
        );
    }

    pub fn get(&self, key: &str) -> Option<&SemanticFact> {
        self.facts.get(key)
    }

    pub fn list(&self) -> Vec<&SemanticFact> {
        let mut facts: Vec<&SemanticFact> = self.facts.values().collect();
        facts.sort_by(|a, b| a.key.cmp(&b.key));
        facts
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setting_same_key_twice_leaves_one_entry_with_latest_value() {
        let mut memory = SemanticMemory::new();
        memory.set("user_name", "Alice", Utc::now());
        memory.set("user_name", "Alicia", Utc::now());

        assert_eq!(memory.len(), 1);
        assert_eq!(memory.get("user_name").unwrap().fact, "Alicia");
    }

    #[test]
    fn list_is_stably_ordered_by_key() {
        let mut memory = SemanticMemory::new();
        memory.set("b_key", "2", Utc::now());
        memory.set("a_key", "1", Utc::now());
        let listed = memory.list();
        assert_eq!(listed[0].key, "a_key");
        assert_eq!(listed[1].key, "b_key");
    }

    #[test]
    fn missing_key_returns_none() {
        let memory = SemanticMemory::new();
        assert!(memory.get("missing").is_none());
    }
}

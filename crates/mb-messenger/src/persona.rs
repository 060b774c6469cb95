//! Registered page personas

use std::sync::Arc;

use dashmap::DashMap;

/// Persona name → persona ID, shared between the setup routine and the
/// message handler.
#[derive(Debug, Clone, Default)]
pub struct PersonaRegistry {
    personas: Arc<DashMap<String, String>>,
}

impl PersonaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: &str, id: &str) {
        self.personas.insert(name.to_string(), id.to_string());
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.personas.get(name).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.personas.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.personas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.personas.is_empty()
    }

    /// Names in alphabetical order, for logging
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.personas.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

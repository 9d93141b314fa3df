//! Trait registry
//!
//! The canonical, insertion-ordered list of characteristic names discovered
//! so far in a run. Names are compared case-insensitively with surrounding
//! whitespace ignored; the stored form is the first-seen spelling.

use indexmap::IndexMap;

/// Normalize a characteristic name for membership checks
pub fn normalize(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraitRegistry {
    // normalized key -> first-seen (trimmed) spelling
    names: IndexMap<String, String>,
}

impl TraitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a registry from a previously recorded snapshot
    pub fn from_snapshot<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut registry = Self::new();
        registry.merge(names);
        registry
    }

    /// Merge candidate names, returning how many were genuinely new
    pub fn merge<I, S>(&mut self, new_names: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut added = 0;
        for name in new_names {
            let trimmed = name.as_ref().trim();
            if trimmed.is_empty() {
                continue;
            }
            let key = normalize(trimmed);
            if !self.names.contains_key(&key) {
                self.names.insert(key, trimmed.to_string());
                added += 1;
            }
        }
        if added > 0 {
            log::debug!("Registry grew by {} to {} names", added, self.names.len());
        }
        added
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains_key(&normalize(name))
    }

    /// Copy of the current contents in insertion order
    pub fn snapshot(&self) -> Vec<String> {
        self.names.values().cloned().collect()
    }

    pub fn size(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

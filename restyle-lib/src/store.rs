//! The modification store: the session-lifetime record of user edits,
//! keyed by selector.
//!
//! Both maps preserve insertion order. Export output must be byte-identical
//! across runs, and the order things are replayed in is the order the user
//! created them; a hash map would shuffle that on every run.

use serde::{Deserialize, Serialize};

/// Reserved property key carrying a text-content edit. There is no CSS
/// property for text, so both serializers filter this key out of style
/// output and route it to node text instead.
pub const TEXT_CONTENT_PROPERTY: &str = "text-content";

/// One normalized edit from a control widget:
/// selector, property, value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditDelta {
    pub selector: String,
    pub property: String,
    pub value: String,
}

/// True when the name can appear as a CSS property identifier. Anything
/// else is the per-property "application failure" case: skipped, never
/// fatal.
pub fn is_css_property_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit())
}

/// Property → value mapping for one selector. Keys are unique; overwriting
/// keeps the key's original position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyRecord {
    entries: Vec<(String, String)>,
}

impl PropertyRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last write wins; no history.
    pub fn set(&mut self, property: &str, value: &str) {
        if let Some(slot) = self.entries.iter_mut().find(|(p, _)| p == property) {
            slot.1 = value.to_string();
        } else {
            self.entries.push((property.to_string(), value.to_string()));
        }
    }

    pub fn get(&self, property: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(p, _)| p == property)
            .map(|(_, v)| v.as_str())
    }

    pub fn remove(&mut self, property: &str) -> Option<String> {
        let index = self.entries.iter().position(|(p, _)| p == property)?;
        Some(self.entries.remove(index).1)
    }

    /// Overlay another record's keys onto this one.
    pub fn merge(&mut self, delta: &PropertyRecord) {
        for (property, value) in delta.iter() {
            self.set(property, value);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(p, v)| (p.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn from_pairs<'a, I: IntoIterator<Item = (&'a str, &'a str)>>(pairs: I) -> Self {
        let mut record = Self::new();
        for (p, v) in pairs {
            record.set(p, v);
        }
        record
    }
}

/// Selector → PropertyRecord mapping for one document.
#[derive(Debug, Clone, Default)]
pub struct SelectorMap {
    entries: Vec<(String, PropertyRecord)>,
}

impl SelectorMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overlays the delta onto the existing record for the selector, or
    /// inserts the delta as the initial record. No rendering side effects;
    /// writes are always accepted.
    pub fn merge(&mut self, selector: &str, delta: &PropertyRecord) {
        if let Some((_, record)) = self.entries.iter_mut().find(|(s, _)| s == selector) {
            record.merge(delta);
        } else {
            self.entries.push((selector.to_string(), delta.clone()));
        }
    }

    pub fn get(&self, selector: &str) -> Option<&PropertyRecord> {
        self.entries
            .iter()
            .find(|(s, _)| s == selector)
            .map(|(_, r)| r)
    }

    /// Clears every entry. The owning document's original source is not
    /// touched by this.
    pub fn reset(&mut self) {
        self.entries.clear();
    }

    /// Selectors and records in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyRecord)> {
        self.entries.iter().map(|(s, r)| (s.as_str(), r))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

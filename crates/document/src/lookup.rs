//! Localization lookup
//!
//! Documents carry opaque localization handles; resolving them to display
//! text needs an external table. The trait keeps that table pluggable so
//! inspection output can run against a real export or a test fixture.

use std::collections::HashMap;

/// Resolves localization handles to display text
pub trait Localization {
    /// Display text for `handle`, if the table knows it
    fn resolve(&self, handle: &str) -> Option<&str>;

    /// Display text, or the handle itself when unknown
    fn resolve_or_handle<'a>(&'a self, handle: &'a str) -> &'a str {
        self.resolve(handle).unwrap_or(handle)
    }
}

/// In-memory handle table
#[derive(Debug, Default, Clone)]
pub struct LocalizationTable {
    entries: HashMap<String, String>,
}

impl LocalizationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, handle: impl Into<String>, text: impl Into<String>) {
        self.entries.insert(handle.into(), text.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Localization for LocalizationTable {
    fn resolve(&self, handle: &str) -> Option<&str> {
        self.entries.get(handle).map(String::as_str)
    }
}

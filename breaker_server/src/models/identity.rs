//! Identity mapping — CI display names to chat handles.
//!
//! The mapping is ordered: the resolver tries members in this order and the
//! first match wins.

use serde::de::Error as _;
use serde::Deserialize;

/// A team member as the CI server knows them, optionally with a chat handle.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum IdentityEntry {
    /// Bare name; the chat handle is the same as the CI name.
    Name(String),
    Mapped { name: String, handle: String },
}

impl IdentityEntry {
    pub fn name(&self) -> &str {
        match self {
            IdentityEntry::Name(name) => name,
            IdentityEntry::Mapped { name, .. } => name,
        }
    }

    pub fn handle(&self) -> &str {
        match self {
            IdentityEntry::Name(name) => name,
            IdentityEntry::Mapped { handle, .. } => handle,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct IdentityMap {
    entries: Vec<IdentityEntry>,
}

impl IdentityMap {
    pub fn new(entries: Vec<IdentityEntry>) -> Self {
        Self { entries }
    }

    /// Build a flat member list where every handle equals the CI name.
    pub fn from_members<I, S>(members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            members
                .into_iter()
                .map(|m| IdentityEntry::Name(m.into()))
                .collect(),
        )
    }

    /// Parse the JSON identity file: an array of names or `{name, handle}` objects.
    ///
    /// Blank names are rejected, since a blank name matches every build cause.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        let map: Self = serde_json::from_str(text)?;
        for (index, entry) in map.entries.iter().enumerate() {
            if entry.name().trim().is_empty() {
                return Err(serde_json::Error::custom(format!("entry {index} has a blank name")));
            }
            if entry.handle().trim().is_empty() {
                return Err(serde_json::Error::custom(format!("entry {index} has a blank handle")));
            }
        }
        Ok(map)
    }

    /// CI-side names in configured order.
    pub fn members(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name().to_string()).collect()
    }

    /// Chat handle for a CI name. Names without a mapping pass through unchanged.
    pub fn handle_for<'a>(&'a self, name: &'a str) -> &'a str {
        self.entries
            .iter()
            .find(|e| e.name() == name)
            .map(IdentityEntry::handle)
            .unwrap_or(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

//! Per-link state, kept in a small table keyed by link handle.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::document::Document;
use crate::flags::FlagSet;

/// Opaque handle for one related remote unit (e.g. `"datanode/3"`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkId(String);

impl LinkId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LinkId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

#[derive(Debug, Clone)]
pub struct PeerLink {
    /// Written locally, read by the remote side.
    published: Document,
    /// The remote side's document as last delivered.
    observed: Document,
    /// Flags scoped to this link.
    pub flags: FlagSet,
    dirty: bool,
}

impl PeerLink {
    fn new(prefix: &str) -> Self {
        Self {
            published: Document::new(),
            observed: Document::new(),
            flags: FlagSet::new(prefix),
            dirty: false,
        }
    }

    pub fn published(&self) -> &Document {
        &self.published
    }

    pub fn observed(&self) -> &Document {
        &self.observed
    }

    pub fn observe(&mut self, document: Document) {
        self.observed = document;
    }

    /// Applies `write` to the published document, remembering whether the
    /// remote side needs a fresh copy.
    pub fn publish<F>(&mut self, write: F)
    where
        F: FnOnce(&mut Document) -> bool,
    {
        if write(&mut self.published) {
            self.dirty = true;
        }
    }
}

#[derive(Debug, Default)]
pub struct LinkTable {
    prefix: String,
    links: BTreeMap<LinkId, PeerLink>,
}

impl LinkTable {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            links: BTreeMap::new(),
        }
    }

    /// Returns the entry for `id`, creating it if needed. The flag reports
    /// whether the link was already known.
    pub fn entry(&mut self, id: &LinkId) -> (&mut PeerLink, bool) {
        let known = self.links.contains_key(id);
        let prefix = &self.prefix;
        let link = self
            .links
            .entry(id.clone())
            .or_insert_with(|| PeerLink::new(prefix));
        (link, known)
    }

    pub fn get(&self, id: &LinkId) -> Option<&PeerLink> {
        self.links.get(id)
    }

    pub fn get_mut(&mut self, id: &LinkId) -> Option<&mut PeerLink> {
        self.links.get_mut(id)
    }

    pub fn remove(&mut self, id: &LinkId) -> Option<PeerLink> {
        self.links.remove(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&LinkId, &PeerLink)> {
        self.links.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&LinkId, &mut PeerLink)> {
        self.links.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Published documents changed since the previous call.
    pub fn take_outgoing(&mut self) -> Vec<(LinkId, Document)> {
        self.links
            .iter_mut()
            .filter(|(_, link)| link.dirty)
            .map(|(id, link)| {
                link.dirty = false;
                (id.clone(), link.published.clone())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::fields;

    #[test]
    fn test_entry_reports_known_links() {
        let mut table = LinkTable::new("hdfs");
        let id = LinkId::from("datanode/0");
        assert!(!table.entry(&id).1);
        assert!(table.entry(&id).1);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_outgoing_only_reports_changes() {
        let mut table = LinkTable::new("hdfs");
        let id = LinkId::from("datanode/0");
        let (link, _) = table.entry(&id);
        link.publish(|doc| doc.set(fields::PORT, "8020"));

        let out = table.take_outgoing();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].1.get(fields::PORT), "8020");
        assert!(table.take_outgoing().is_empty());

        let (link, _) = table.entry(&id);
        link.publish(|doc| doc.set(fields::PORT, "8020"));
        assert!(table.take_outgoing().is_empty());
    }
}

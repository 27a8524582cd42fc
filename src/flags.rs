//! Named boolean flags derived by a reconciliation pass.
//!
//! Flags are stored under `<relation>.<flag>` (e.g. `hdfs.ready`). Every
//! write goes through [`FlagSet::toggle`], so a flag is always moved to the
//! freshly computed value and a cleared flag stays visible as `false`.

use std::collections::BTreeMap;

use log::trace;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlagSet {
    #[serde(skip)]
    prefix: String,
    flags: BTreeMap<String, bool>,
}

impl FlagSet {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            flags: BTreeMap::new(),
        }
    }

    fn key(&self, flag: &str) -> String {
        if self.prefix.is_empty() {
            flag.to_string()
        } else {
            format!("{}.{}", self.prefix, flag)
        }
    }

    /// Moves `flag` to `value`. Returns whether it changed.
    pub fn toggle(&mut self, flag: &str, value: bool) -> bool {
        let key = self.key(flag);
        let previous = self.flags.insert(key.clone(), value).unwrap_or(false);
        if previous != value {
            trace!("flag {} -> {}", key, value);
        }
        previous != value
    }

    pub fn set(&mut self, flag: &str) -> bool {
        self.toggle(flag, true)
    }

    pub fn clear(&mut self, flag: &str) -> bool {
        self.toggle(flag, false)
    }

    pub fn is_set(&self, flag: &str) -> bool {
        self.flags.get(&self.key(flag)).copied().unwrap_or(false)
    }

    /// Lookup by fully qualified name, as downstream consumers see it.
    pub fn get(&self, name: &str) -> bool {
        self.flags.get(name).copied().unwrap_or(false)
    }

    /// Fully qualified names of every flag currently set.
    pub fn active(&self) -> impl Iterator<Item = &str> {
        self.flags
            .iter()
            .filter(|(_, v)| **v)
            .map(|(k, _)| k.as_str())
    }

    /// Folds `other` in so that a flag is set if it is set in either.
    pub fn union_with(&mut self, other: &FlagSet) {
        for (name, value) in &other.flags {
            let entry = self.flags.entry(name.clone()).or_insert(false);
            *entry |= *value;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.flags.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_reports_transitions() {
        let mut flags = FlagSet::new("hdfs");
        assert!(flags.toggle("ready", true));
        assert!(!flags.toggle("ready", true));
        assert!(flags.toggle("ready", false));
        assert!(!flags.is_set("ready"));
        assert!(!flags.get("hdfs.ready"));
    }

    #[test]
    fn test_cleared_flags_remain_visible() {
        let mut flags = FlagSet::new("hdfs");
        flags.set("related");
        flags.clear("related");
        let names: Vec<_> = flags.iter().collect();
        assert_eq!(names, vec![("hdfs.related", false)]);
        assert_eq!(flags.active().count(), 0);
    }

    #[test]
    fn test_union_is_logical_or() {
        let mut a = FlagSet::new("hdfs");
        a.set("datanode.connected");
        let mut b = FlagSet::new("hdfs");
        b.clear("datanode.connected");
        b.set("client.connected");

        let mut all = FlagSet::new("hdfs");
        all.union_with(&b);
        all.union_with(&a);
        assert!(all.is_set("datanode.connected"));
        assert!(all.is_set("client.connected"));
    }

    #[test]
    fn test_serializes_as_plain_map() {
        let mut flags = FlagSet::new("hdfs");
        flags.set("ready");
        let json = serde_json::to_string(&flags).unwrap();
        assert_eq!(json, r#"{"hdfs.ready":true}"#);
    }
}

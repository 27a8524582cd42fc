//! Link documents and the field catalogue they carry.
//!
//! Every value travels as a string. Booleans are the lowercase literals
//! `"true"`/`"false"`, ports are decimal strings and structured values
//! (`spec`, `hosts-map`) are JSON-encoded. An absent field reads as the
//! empty string, which decodes to `false`, `{}` or "no port".

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Field names shared with the remote side. These must not change.
pub mod fields {
    pub const DATANODE: &str = "datanode";
    pub const SECONDARY: &str = "secondary";
    pub const HOSTNAME: &str = "hostname";
    pub const PRIVATE_ADDRESS: &str = "private-address";
    pub const PORT: &str = "port";
    pub const WEBHDFS_PORT: &str = "webhdfs-port";
    pub const SPEC: &str = "spec";
    pub const HDFS_READY: &str = "hdfs-ready";
    pub const HOSTS_MAP: &str = "hosts-map";
    pub const SSH_KEY: &str = "ssh-key";
}

/// One side's published field/value map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(BTreeMap<String, String>);

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw value of `field`, or `""` when absent.
    pub fn get(&self, field: &str) -> &str {
        self.0.get(field).map(String::as_str).unwrap_or("")
    }

    /// Writes `field`, returning whether the stored value changed.
    pub fn set(&mut self, field: &str, value: impl Into<String>) -> bool {
        let value = value.into();
        if self.0.get(field) == Some(&value) {
            return false;
        }
        self.0.insert(field.to_string(), value);
        true
    }

    pub fn set_bool(&mut self, field: &str, value: bool) -> bool {
        self.set(field, if value { "true" } else { "false" })
    }

    pub fn set_json<T: Serialize>(&mut self, field: &str, value: &T) -> Result<bool> {
        Ok(self.set(field, serde_json::to_string(value)?))
    }

    /// Anything other than a case-insensitive `"true"` is false.
    pub fn get_bool(&self, field: &str) -> bool {
        self.get(field).eq_ignore_ascii_case("true")
    }

    /// Decodes a JSON field; absent or empty yields `T::default()`.
    pub fn get_json<T>(&self, field: &'static str) -> Result<T>
    where
        T: DeserializeOwned + Default,
    {
        let raw = self.get(field);
        if raw.is_empty() {
            return Ok(T::default());
        }
        serde_json::from_str(raw).map_err(|e| Error::malformed(field, e))
    }

    pub fn get_port(&self, field: &'static str) -> Result<Option<u16>> {
        let raw = self.get(field).trim();
        if raw.is_empty() {
            return Ok(None);
        }
        raw.parse()
            .map(Some)
            .map_err(|e| Error::malformed(field, format!("{raw:?}: {e}")))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Document {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Cluster-wide configuration fingerprint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Spec(Map<String, Value>);

impl Spec {
    pub fn new(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when every key of `self` has an equal value in `remote`.
    /// Keys only present remotely are ignored.
    pub fn is_satisfied_by(&self, remote: &Spec) -> bool {
        self.0
            .iter()
            .all(|(key, value)| remote.0.get(key) == Some(value))
    }
}

impl From<Value> for Spec {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self::default(),
        }
    }
}

/// Coordinator host table: unit name to registered hostname.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HostsMap(BTreeMap<String, String>);

impl HostsMap {
    pub fn contains_hostname(&self, hostname: &str) -> bool {
        self.0.values().any(|h| h == hostname)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for HostsMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_fields_read_as_defaults() {
        let doc = Document::new();
        assert_eq!(doc.get(fields::HOSTNAME), "");
        assert!(!doc.get_bool(fields::DATANODE));
        assert_eq!(doc.get_json::<Spec>(fields::SPEC).unwrap(), Spec::default());
        assert_eq!(doc.get_port(fields::PORT).unwrap(), None);
    }

    #[test]
    fn test_bool_decoding() {
        let doc: Document = [("a", "true"), ("b", "True"), ("c", "false"), ("d", "yes")]
            .into_iter()
            .collect();
        assert!(doc.get_bool("a"));
        assert!(doc.get_bool("b"));
        assert!(!doc.get_bool("c"));
        assert!(!doc.get_bool("d"));
    }

    #[test]
    fn test_set_reports_change() {
        let mut doc = Document::new();
        assert!(doc.set(fields::PORT, "8020"));
        assert!(!doc.set(fields::PORT, "8020"));
        assert!(doc.set(fields::PORT, "8021"));
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        let doc: Document = [(fields::SPEC, "{not json")].into_iter().collect();
        let err = doc.get_json::<Spec>(fields::SPEC).unwrap_err();
        assert!(matches!(err, Error::MalformedField { field: "spec", .. }));
    }

    #[test]
    fn test_malformed_port_is_an_error() {
        let doc: Document = [(fields::PORT, "http")].into_iter().collect();
        assert!(doc.get_port(fields::PORT).is_err());
    }

    #[test]
    fn test_spec_match_rules() {
        let local = Spec::from(json!({"a": 1, "b": 2}));
        assert!(local.is_satisfied_by(&Spec::from(json!({"a": 1, "b": 2, "c": 9}))));
        assert!(!local.is_satisfied_by(&Spec::from(json!({"a": 1, "b": 3}))));
        assert!(!local.is_satisfied_by(&Spec::from(json!({"a": 1}))));
        assert!(Spec::default().is_satisfied_by(&Spec::from(json!({"a": 1}))));
    }

    #[test]
    fn test_hosts_map_membership() {
        let map: HostsMap = [("storage/3", "storage-3")].into_iter().collect();
        assert!(map.contains_hostname("storage-3"));
        assert!(!HostsMap::default().contains_hostname("storage-3"));
    }
}

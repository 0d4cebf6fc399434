use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::config::{read_document, LoadError};

/// Adresse effective d'une caméra. `Unknown` se sérialise en `null`,
/// jamais en chaîne vide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedAddress {
    Known(String),
    Unknown,
}

impl ResolvedAddress {
    pub fn as_known(&self) -> Option<&str> {
        match self {
            ResolvedAddress::Known(addr) => Some(addr),
            ResolvedAddress::Unknown => None,
        }
    }
}

impl Serialize for ResolvedAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ResolvedAddress::Known(addr) => serializer.serialize_str(addr),
            ResolvedAddress::Unknown => serializer.serialize_none(),
        }
    }
}

/// Table d'indirection identité -> adresse observée (ex: bail DHCP).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct AddressTable(HashMap<String, String>);

impl AddressTable {
    pub fn get(&self, identity: &str) -> Option<&str> {
        self.0
            .get(identity)
            .map(String::as_str)
            .filter(|addr| !addr.trim().is_empty())
    }

    /// Table d'abord, puis adresse déclarée, sinon Unknown.
    pub fn resolve(&self, identity: &str, declared: Option<&str>) -> ResolvedAddress {
        self.get(identity)
            .or(declared.filter(|addr| !addr.trim().is_empty()))
            .map(|addr| ResolvedAddress::Known(addr.to_string()))
            .unwrap_or(ResolvedAddress::Unknown)
    }
}

impl FromIterator<(String, String)> for AddressTable {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Relit la table écrite par un process externe à chaque appel.
#[derive(Debug, Clone)]
pub struct AddressResolver {
    path: PathBuf,
}

impl AddressResolver {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn read_table(&self) -> Result<AddressTable, LoadError> {
        read_document(&self.path)
    }

    pub fn load_table(&self) -> AddressTable {
        match self.read_table() {
            Ok(table) => table,
            Err(e) if e.is_missing() => {
                debug!("[resolver] no address table yet at {}", self.path.display());
                AddressTable::default()
            }
            Err(e) => {
                warn!("[resolver] failed to read address table {}: {e}", self.path.display());
                AddressTable::default()
            }
        }
    }

    #[cfg(test)]
    pub fn resolve(&self, identity: &str, declared: Option<&str>) -> ResolvedAddress {
        self.load_table().resolve(identity, declared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(entries: &[(&str, &str)]) -> AddressTable {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_precedence() {
        let t = table(&[("front", "192.168.1.150")]);
        assert_eq!(
            t.resolve("front", Some("192.168.1.120")),
            ResolvedAddress::Known("192.168.1.150".into())
        );
        assert_eq!(
            t.resolve("garden", Some("192.168.1.121")),
            ResolvedAddress::Known("192.168.1.121".into())
        );
        assert_eq!(t.resolve("garden", None), ResolvedAddress::Unknown);
    }

    #[test]
    fn test_empty_values_are_unknown() {
        let t = table(&[("front", "")]);
        assert_eq!(t.resolve("front", Some("  ")), ResolvedAddress::Unknown);
        assert_eq!(t.resolve("front", Some("10.0.0.2")), ResolvedAddress::Known("10.0.0.2".into()));
    }

    #[test]
    fn test_unknown_serializes_to_null() {
        assert_eq!(serde_json::to_value(ResolvedAddress::Unknown).unwrap(), serde_json::Value::Null);
        assert_eq!(
            serde_json::to_value(ResolvedAddress::Known("10.0.0.2".into())).unwrap(),
            serde_json::json!("10.0.0.2")
        );
    }

    #[test]
    fn test_reads_file_on_every_call() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("camera-ips.json");
        let resolver = AddressResolver::new(&path);

        assert_eq!(resolver.resolve("garden", None), ResolvedAddress::Unknown);

        std::fs::write(&path, r#"{"garden": "192.168.1.77"}"#).unwrap();
        assert_eq!(resolver.resolve("garden", None), ResolvedAddress::Known("192.168.1.77".into()));

        std::fs::write(&path, "garbage").unwrap();
        assert!(resolver.read_table().is_err());
        assert_eq!(resolver.load_table(), AddressTable::default());
    }
}

//! Entry addressing.
//!
//! Every cached entry lives at a distinguished name (DN) of the form
//! `name=<value>,cn=<subdir>,cn=custom,cn=<domain>,cn=sysdb`. A
//! [`Partition`] is the `cn=<subdir>,cn=custom,cn=<domain>,cn=sysdb` part:
//! one entity category inside one identity domain.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Root of every DN in the store.
const SYSDB_ROOT: &str = "cn=sysdb";

/// Container that holds per-category custom subtrees.
const CUSTOM_CONTAINER: &str = "cn=custom";

/// Characters that must be backslash-escaped inside an RDN value.
const SPECIAL: &[char] = &[',', '+', '"', '\\', '<', '>', ';', '=', '#'];

/// A namespaced subtree holding one entity category for one domain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Partition {
    domain: String,
    subdir: String,
}

impl Partition {
    /// Build a partition, rejecting empty components.
    pub fn new(domain: impl Into<String>, subdir: impl Into<String>) -> StoreResult<Self> {
        let domain = domain.into();
        let subdir = subdir.into();
        if domain.is_empty() {
            return Err(StoreError::InvalidArgument(
                "domain must not be empty".into(),
            ));
        }
        if subdir.is_empty() {
            return Err(StoreError::InvalidArgument(
                "partition subdir must not be empty".into(),
            ));
        }
        Ok(Self { domain, subdir })
    }

    /// DN of the partition container itself.
    pub fn base_dn(&self) -> String {
        format!(
            "cn={},{CUSTOM_CONTAINER},cn={},{SYSDB_ROOT}",
            escape_value(&self.subdir),
            escape_value(&self.domain),
        )
    }

    /// Canonical address of the entry called `name` in this partition.
    pub fn entry_dn(&self, name: &str) -> StoreResult<Dn> {
        Dn::custom(self, name)
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base_dn())
    }
}

/// Distinguished name of a single entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dn(String);

impl Dn {
    /// Address of entry `name` under `partition`.
    pub fn custom(partition: &Partition, name: &str) -> StoreResult<Self> {
        if name.is_empty() {
            return Err(StoreError::InvalidArgument(
                "entry name must not be empty".into(),
            ));
        }
        Ok(Self(format!(
            "name={},{}",
            escape_value(name),
            partition.base_dn()
        )))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn from_stored(raw: String) -> Self {
        Self(raw)
    }
}

impl fmt::Display for Dn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Escape an RDN value so it cannot split or extend the DN.
pub fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let last = value.chars().count().saturating_sub(1);
    for (i, c) in value.chars().enumerate() {
        let edge_space = c == ' ' && (i == 0 || i == last);
        if SPECIAL.contains(&c) || edge_space {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_base_dn() {
        let p = Partition::new("testdomain.test", "computers").unwrap();
        assert_eq!(
            p.base_dn(),
            "cn=computers,cn=custom,cn=testdomain.test,cn=sysdb"
        );
    }

    #[test]
    fn entry_dn_layout() {
        let p = Partition::new("testdomain.test", "computers").unwrap();
        let dn = p.entry_dn("HOST1$").unwrap();
        assert_eq!(
            dn.as_str(),
            "name=HOST1$,cn=computers,cn=custom,cn=testdomain.test,cn=sysdb"
        );
    }

    #[test]
    fn special_characters_are_escaped() {
        assert_eq!(escape_value("a,b=c"), "a\\,b\\=c");
        assert_eq!(escape_value(" lead"), "\\ lead");
        assert_eq!(escape_value("trail "), "trail\\ ");
        assert_eq!(escape_value("in side"), "in side");
    }

    #[test]
    fn empty_components_are_rejected() {
        assert!(Partition::new("", "computers").is_err());
        assert!(Partition::new("dom", "").is_err());

        let p = Partition::new("dom", "computers").unwrap();
        assert!(matches!(
            p.entry_dn(""),
            Err(StoreError::InvalidArgument(_))
        ));
    }

    #[test]
    fn escaped_names_do_not_collide() {
        let p = Partition::new("dom", "computers").unwrap();
        let a = p.entry_dn("a,cn=x").unwrap();
        let b = p.entry_dn("a").unwrap();
        assert_ne!(a, b);
    }
}

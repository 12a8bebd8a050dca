//! Attribute-oriented entry types.
//!
//! An [`Entry`] is what the store hands back from a search: a DN plus an
//! ordered map of attribute name to values. [`AttrSet`] is what callers
//! hand to an upsert, [`ModifyRequest`] what they hand to a modify, and
//! [`Filter`] selects entries by exact attribute values.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dn::Dn;
use crate::error::{StoreError, StoreResult};

// ═══════════════════════════════════════════════════════════════════════
//  Entry
// ═══════════════════════════════════════════════════════════════════════

/// A stored entry, possibly projected down to a subset of its attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Address of the entry.
    pub dn: Dn,
    attrs: BTreeMap<String, Vec<String>>,
}

impl Entry {
    pub(crate) fn new(dn: Dn) -> Self {
        Self {
            dn,
            attrs: BTreeMap::new(),
        }
    }

    pub(crate) fn push_value(&mut self, attr: String, value: String) {
        self.attrs.entry(attr).or_default().push(value);
    }

    /// All values of `attr`, in stored order.
    pub fn values(&self, attr: &str) -> Option<&[String]> {
        self.attrs.get(attr).map(Vec::as_slice)
    }

    /// First value of `attr`.
    pub fn first(&self, attr: &str) -> Option<&str> {
        self.values(attr)
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    /// First value of `attr` parsed as an integer.
    pub fn first_i64(&self, attr: &str) -> StoreResult<Option<i64>> {
        self.first(attr)
            .map(|raw| {
                raw.parse().map_err(|_| {
                    StoreError::InvalidState(format!(
                        "attribute {attr} of {} is not an integer: {raw}",
                        self.dn
                    ))
                })
            })
            .transpose()
    }

    /// Whether `attr` holds at least one value.
    pub fn has(&self, attr: &str) -> bool {
        self.attrs.contains_key(attr)
    }

    /// Number of distinct attributes present.
    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  AttrSet
// ═══════════════════════════════════════════════════════════════════════

/// How an upsert treats one attribute of an [`AttrSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrMode {
    /// Drop every stored value and write the new ones. No values removes
    /// the attribute.
    Replace,
    /// Write only when the entry does not hold the attribute yet.
    Initial,
}

/// One attribute of an [`AttrSet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrValues {
    pub name: String,
    pub mode: AttrMode,
    pub values: Vec<String>,
}

/// Ordered set of attributes for an upsert.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttrSet {
    attrs: Vec<AttrValues>,
}

impl AttrSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `value` to `attr`, creating the attribute in replace mode.
    pub fn add_string(&mut self, attr: &str, value: &str) -> StoreResult<()> {
        if value.is_empty() {
            return Err(StoreError::InvalidArgument(format!(
                "empty value for attribute {attr}"
            )));
        }
        self.slot(attr, AttrMode::Replace)?
            .values
            .push(value.to_string());
        Ok(())
    }

    /// Append an integer value to `attr`.
    pub fn add_i64(&mut self, attr: &str, value: i64) -> StoreResult<()> {
        self.add_string(attr, &value.to_string())
    }

    /// Set an integer that is written only if the entry lacks `attr`.
    pub fn add_i64_once(&mut self, attr: &str, value: i64) -> StoreResult<()> {
        let slot = self.slot(attr, AttrMode::Initial)?;
        slot.values.clear();
        slot.values.push(value.to_string());
        Ok(())
    }

    /// Mark `attr` for removal: present in the set, with no values.
    pub fn remove(&mut self, attr: &str) -> StoreResult<()> {
        self.slot(attr, AttrMode::Replace)?.values.clear();
        Ok(())
    }

    /// Look up an attribute in the set.
    pub fn get(&self, attr: &str) -> Option<&AttrValues> {
        self.attrs.iter().find(|a| a.name == attr)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AttrValues> {
        self.attrs.iter()
    }

    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    fn slot(&mut self, attr: &str, mode: AttrMode) -> StoreResult<&mut AttrValues> {
        validate_attr_name(attr)?;
        let idx = match self.attrs.iter().position(|a| a.name == attr) {
            Some(idx) => {
                self.attrs[idx].mode = mode;
                idx
            }
            None => {
                self.attrs.push(AttrValues {
                    name: attr.to_string(),
                    mode,
                    values: Vec::new(),
                });
                self.attrs.len() - 1
            }
        };
        Ok(&mut self.attrs[idx])
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  ModifyRequest
// ═══════════════════════════════════════════════════════════════════════

/// Operation applied by one element of a [`ModifyRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModOp {
    /// Append values; adding a value the attribute already holds fails.
    Add,
    /// Replace every value; no values removes the attribute.
    Replace,
    /// Remove the listed values, or the whole attribute if none are listed.
    Delete,
}

/// One attribute slot of a [`ModifyRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModElement {
    pub op: ModOp,
    pub attr: String,
    pub values: Vec<String>,
}

/// A low-level modification of a single entry.
///
/// Build it by opening a slot with [`ModifyRequest::add_empty`] and
/// filling it with [`ModifyRequest::add_value`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifyRequest {
    dn: Dn,
    elements: Vec<ModElement>,
}

impl ModifyRequest {
    pub fn new(dn: Dn) -> Self {
        Self {
            dn,
            elements: Vec::new(),
        }
    }

    pub fn dn(&self) -> &Dn {
        &self.dn
    }

    pub fn elements(&self) -> &[ModElement] {
        &self.elements
    }

    /// Open a new, empty slot for `attr` with operation `op`.
    pub fn add_empty(&mut self, attr: &str, op: ModOp) -> StoreResult<&mut Self> {
        validate_attr_name(attr)?;
        self.elements.push(ModElement {
            op,
            attr: attr.to_string(),
            values: Vec::new(),
        });
        Ok(self)
    }

    /// Append `value` to the most recent slot opened for `attr`.
    pub fn add_value(&mut self, attr: &str, value: &str) -> StoreResult<&mut Self> {
        if value.is_empty() {
            return Err(StoreError::InvalidArgument(format!(
                "empty value for attribute {attr}"
            )));
        }
        let slot = self
            .elements
            .iter_mut()
            .rev()
            .find(|e| e.attr == attr)
            .ok_or_else(|| {
                StoreError::InvalidArgument(format!("no modify slot open for attribute {attr}"))
            })?;
        slot.values.push(value.to_string());
        Ok(self)
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Filter
// ═══════════════════════════════════════════════════════════════════════

/// Conjunction of exact attribute matches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    clauses: Vec<(String, String)>,
}

impl Filter {
    /// Match entries where `attr` holds `value`.
    pub fn eq(attr: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            clauses: vec![(attr.into(), value.into())],
        }
    }

    /// Additionally require `attr` to hold `value`.
    pub fn and_eq(mut self, attr: impl Into<String>, value: impl Into<String>) -> Self {
        self.clauses.push((attr.into(), value.into()));
        self
    }

    pub fn clauses(&self) -> &[(String, String)] {
        &self.clauses
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.clauses.as_slice() {
            [] => f.write_str("(objectClass=*)"),
            [(attr, value)] => write!(f, "({attr}={})", FilterValue(value)),
            many => {
                f.write_str("(&")?;
                for (attr, value) in many {
                    write!(f, "({attr}={})", FilterValue(value))?;
                }
                f.write_str(")")
            }
        }
    }
}

/// Assertion value with the filter specials hex-escaped.
struct FilterValue<'a>(&'a str);

impl fmt::Display for FilterValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in self.0.chars() {
            match c {
                '*' | '(' | ')' | '\\' | '\0' => write!(f, "\\{:02x}", c as u32)?,
                _ => write!(f, "{c}")?,
            }
        }
        Ok(())
    }
}

fn validate_attr_name(attr: &str) -> StoreResult<()> {
    if attr.is_empty() || !attr.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(StoreError::InvalidArgument(format!(
            "invalid attribute name: {attr:?}"
        )));
    }
    Ok(())
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dn::Partition;

    fn dn() -> Dn {
        Partition::new("dom", "computers")
            .unwrap()
            .entry_dn("HOST1$")
            .unwrap()
    }

    #[test]
    fn attr_set_accumulates_values_in_order() {
        let mut set = AttrSet::new();
        set.add_string("memberOfSIDString", "S-1-5-11").unwrap();
        set.add_string("memberOfSIDString", "S-1-5-32-544").unwrap();

        let attr = set.get("memberOfSIDString").unwrap();
        assert_eq!(attr.mode, AttrMode::Replace);
        assert_eq!(attr.values, vec!["S-1-5-11", "S-1-5-32-544"]);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn attr_set_rejects_bad_input() {
        let mut set = AttrSet::new();
        assert!(set.add_string("name", "").is_err());
        assert!(set.add_string("", "x").is_err());
        assert!(set.add_string("bad name", "x").is_err());
        assert!(set.is_empty());
    }

    #[test]
    fn attr_set_once_and_remove() {
        let mut set = AttrSet::new();
        set.add_i64_once("createTimestamp", 10).unwrap();
        set.add_i64_once("createTimestamp", 20).unwrap();
        set.remove("gPLink").unwrap();

        let created = set.get("createTimestamp").unwrap();
        assert_eq!(created.mode, AttrMode::Initial);
        assert_eq!(created.values, vec!["20"]);
        assert!(set.get("gPLink").unwrap().values.is_empty());
    }

    #[test]
    fn modify_request_needs_a_slot() {
        let mut req = ModifyRequest::new(dn());
        assert!(req.add_value("memberOfSIDString", "S-1-5-11").is_err());

        req.add_empty("memberOfSIDString", ModOp::Add).unwrap();
        req.add_value("memberOfSIDString", "S-1-5-11").unwrap();
        req.add_value("memberOfSIDString", "S-1-5-2").unwrap();

        assert_eq!(req.elements().len(), 1);
        assert_eq!(req.elements()[0].op, ModOp::Add);
        assert_eq!(req.elements()[0].values, vec!["S-1-5-11", "S-1-5-2"]);
    }

    #[test]
    fn filter_display() {
        assert_eq!(Filter::default().to_string(), "(objectClass=*)");
        assert_eq!(Filter::eq("name", "a").to_string(), "(name=a)");
        assert_eq!(
            Filter::eq("name", "a")
                .and_eq("objectClass", "computer")
                .to_string(),
            "(&(name=a)(objectClass=computer))"
        );
    }

    #[test]
    fn filter_display_escapes_specials() {
        assert_eq!(Filter::eq("name", "a)(b").to_string(), "(name=a\\29\\28b)");
        assert_eq!(
            Filter::eq("name", "x*").and_eq("cn", r"a\b").to_string(),
            r"(&(name=x\2a)(cn=a\5cb))"
        );
    }

    #[test]
    fn entry_accessors() {
        let mut entry = Entry::new(dn());
        entry.push_value("dataExpireTimestamp".into(), "5".into());
        entry.push_value("name".into(), "HOST1$".into());
        entry.push_value("objectSIDString".into(), "not-a-number".into());

        assert_eq!(entry.len(), 3);
        assert_eq!(entry.first("name"), Some("HOST1$"));
        assert_eq!(entry.first_i64("dataExpireTimestamp").unwrap(), Some(5));
        assert_eq!(entry.first_i64("missing").unwrap(), None);
        assert!(matches!(
            entry.first_i64("objectSIDString"),
            Err(StoreError::InvalidState(_))
        ));
    }
}

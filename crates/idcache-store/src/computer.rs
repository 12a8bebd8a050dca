//! Cached computer objects.
//!
//! One entry per computer name lives in the `computers` partition of a
//! domain. Writing a computer is a two-step affair:
//!
//! 1. an upsert of the scalar attributes plus the **first** group SID,
//!    which drops every previously stored group SID;
//! 2. only if more SIDs were supplied, a separate transaction that ADDs the
//!    remaining SIDs to the entry and rolls back on any failure.
//!
//! Step 1 is committed before step 2 starts. Another connection reading
//! the database between the two steps sees the entry with its first group
//! SID only. Within one [`Database`] handle both steps run under the same
//! connection lock, so readers sharing the handle never see that state.
//!
//! Policy links (`gPLink`) are replaced on their own, by
//! [`ComputerStore::set_policy_links`].

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::custom;
use crate::db::Database;
use crate::dn::{Dn, Partition};
use crate::entry::{AttrSet, Entry, Filter, ModOp, ModifyRequest};
use crate::error::{StoreError, StoreResult};
use crate::txn::Txn;

/// Partition subdirectory that holds computer entries.
pub const COMPUTERS_SUBDIR: &str = "computers";

/// `objectClass` value of every computer entry.
pub const COMPUTER_CLASS: &str = "computer";

/// Attribute names of a computer entry.
pub mod attr {
    pub const NAME: &str = "name";
    pub const OBJECT_CLASS: &str = "objectClass";
    pub const ORIG_DN: &str = "originalDN";
    pub const SID: &str = "objectSIDString";
    pub const MEMBEROF_SID: &str = "memberOfSIDString";
    pub const GPLINK: &str = "gPLink";
    pub const CREATE_TIME: &str = "createTimestamp";
    pub const CACHE_EXPIRE: &str = "dataExpireTimestamp";
}

// ═══════════════════════════════════════════════════════════════════════
//  Types
// ═══════════════════════════════════════════════════════════════════════

/// A cached computer as returned by [`ComputerStore::get`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputerRecord {
    /// Unique name within the partition, e.g. `HOST1$`.
    pub name: String,
    /// DN of the object in the upstream directory.
    pub origin_dn: Option<String>,
    /// Security identifier of the computer.
    pub sid: Option<String>,
    /// SIDs of the groups the computer belongs to.
    pub member_of_sids: Vec<String>,
    /// Linked group-policy objects.
    pub policy_links: Vec<String>,
    /// Unix timestamp of the first write; 0 if unset.
    pub create_time: i64,
    /// Unix timestamp after which the entry may be reaped; 0 never expires.
    pub cache_expire: i64,
}

impl ComputerRecord {
    /// Whether a reaper running at `now` may drop this entry.
    pub fn is_expired(&self, now: i64) -> bool {
        self.cache_expire != 0 && self.cache_expire <= now
    }
}

impl TryFrom<&Entry> for ComputerRecord {
    type Error = StoreError;

    fn try_from(entry: &Entry) -> StoreResult<Self> {
        let name = entry
            .first(attr::NAME)
            .ok_or_else(|| StoreError::InvalidState(format!("entry {} has no name", entry.dn)))?;
        let values = |a: &str| entry.values(a).map(<[String]>::to_vec).unwrap_or_default();

        Ok(Self {
            name: name.to_string(),
            origin_dn: entry.first(attr::ORIG_DN).map(str::to_string),
            sid: entry.first(attr::SID).map(str::to_string),
            member_of_sids: values(attr::MEMBEROF_SID),
            policy_links: values(attr::GPLINK),
            create_time: entry.first_i64(attr::CREATE_TIME)?.unwrap_or(0),
            cache_expire: entry.first_i64(attr::CACHE_EXPIRE)?.unwrap_or(0),
        })
    }
}

/// Everything [`ComputerStore::set`] writes for one computer.
///
/// `member_sids` entries that are `None` are skipped. A `None` in first
/// position followed by a real SID is rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputerUpdate {
    pub name: String,
    pub origin_dn: String,
    pub sid: String,
    pub member_sids: Vec<Option<String>>,
    /// Seconds until the entry expires; 0 disables timeout expiry.
    pub cache_timeout: u32,
    /// Reference time for `createTimestamp` and the expiry deadline.
    pub now: i64,
}

impl ComputerUpdate {
    pub fn new(
        name: impl Into<String>,
        origin_dn: impl Into<String>,
        sid: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            origin_dn: origin_dn.into(),
            sid: sid.into(),
            member_sids: Vec::new(),
            cache_timeout: 0,
            now: 0,
        }
    }

    pub fn with_member_sids<I, S>(mut self, sids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.member_sids = sids.into_iter().map(|s| Some(s.into())).collect();
        self
    }

    pub fn with_cache_timeout(mut self, seconds: u32) -> Self {
        self.cache_timeout = seconds;
        self
    }

    pub fn at(mut self, now: i64) -> Self {
        self.now = now;
        self
    }

    /// Expiry deadline for this write.
    pub fn cache_expire(&self) -> StoreResult<i64> {
        if self.cache_timeout == 0 {
            return Ok(0);
        }
        self.now
            .checked_add(i64::from(self.cache_timeout))
            .ok_or_else(|| {
                StoreError::InvalidArgument(format!(
                    "cache expiry overflows: {} + {}",
                    self.now, self.cache_timeout
                ))
            })
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Synchronous operations
// ═══════════════════════════════════════════════════════════════════════

/// Look up the computer `name`.
///
/// Returns `Ok(None)` when nothing matches and
/// [`StoreError::DuplicateKey`] when more than one entry does.
pub fn find_by_name(
    conn: &Connection,
    partition: &Partition,
    name: &str,
    projection: Option<&[&str]>,
) -> StoreResult<Option<Entry>> {
    if name.is_empty() {
        return Err(StoreError::InvalidArgument(
            "computer name must not be empty".into(),
        ));
    }

    let filter = Filter::eq(attr::NAME, name).and_eq(attr::OBJECT_CLASS, COMPUTER_CLASS);
    let mut hits = custom::search(conn, partition, &filter, projection)?;
    match hits.len() {
        0 => {
            debug!(name, "no such computer");
            Ok(None)
        }
        1 => Ok(hits.pop()),
        count => Err(StoreError::DuplicateKey {
            name: name.to_string(),
            count,
        }),
    }
}

/// Fetch exactly one computer entry.
pub fn get(
    conn: &Connection,
    partition: &Partition,
    name: &str,
    projection: Option<&[&str]>,
) -> StoreResult<Entry> {
    match find_by_name(conn, partition, name, projection) {
        Ok(Some(entry)) => Ok(entry),
        Ok(None) => Err(StoreError::NotFound {
            entity: "computer",
            id: name.to_string(),
        }),
        Err(StoreError::DuplicateKey { name, count }) => {
            warn!(%name, count, "did not find a single computer");
            Err(StoreError::InvalidState(format!(
                "{count} cached computers are named {name}"
            )))
        }
        Err(err) => Err(err),
    }
}

/// Upsert a computer and replace its group SIDs.
pub fn set(conn: &Connection, partition: &Partition, update: &ComputerUpdate) -> StoreResult<()> {
    let result = (|| -> StoreResult<()> {
        let (attrs, remaining) = build_attrs(update)?;
        let dn = custom::store(conn, partition, &update.name, &attrs)?;
        if !remaining.is_empty() {
            add_remaining_members(conn, &dn, &remaining)?;
        }
        Ok(())
    })();

    match &result {
        Ok(()) => debug!(name = %update.name, groups = update.member_sids.len(), "computer stored"),
        Err(err) => warn!(name = %update.name, %err, "could not store computer"),
    }
    result
}

/// Replace the computer's policy links; an empty list removes them.
pub fn set_policy_links(
    conn: &Connection,
    partition: &Partition,
    name: &str,
    links: &[String],
) -> StoreResult<()> {
    let dn = partition.entry_dn(name)?;
    let mut req = ModifyRequest::new(dn);
    req.add_empty(attr::GPLINK, ModOp::Replace)?;
    for link in links {
        req.add_value(attr::GPLINK, link)?;
    }

    let txn = Txn::begin(conn)?;
    custom::modify(&txn, &req).map_err(|err| match err {
        StoreError::NotFound { entity: "entry", .. } => StoreError::NotFound {
            entity: "computer",
            id: name.to_string(),
        },
        other => other,
    })?;
    txn.commit()?;

    debug!(name, links = links.len(), "policy links replaced");
    Ok(())
}

/// Remove the computer `name`, returning `true` if it was cached.
pub fn delete(conn: &Connection, partition: &Partition, name: &str) -> StoreResult<bool> {
    custom::delete(conn, &partition.entry_dn(name)?)
}

/// Build the upsert attribute set and collect the group SIDs left for the
/// follow-up transaction.
fn build_attrs(update: &ComputerUpdate) -> StoreResult<(AttrSet, Vec<&str>)> {
    for (field, value) in [
        ("name", &update.name),
        ("origin DN", &update.origin_dn),
        ("SID", &update.sid),
    ] {
        if value.is_empty() {
            return Err(StoreError::InvalidArgument(format!(
                "computer {field} must not be empty"
            )));
        }
    }

    let (first, remaining) = split_member_sids(&update.member_sids)?;

    let mut attrs = AttrSet::new();
    attrs.add_string(attr::ORIG_DN, &update.origin_dn)?;
    attrs.add_string(attr::SID, &update.sid)?;
    match first {
        Some(sid) => attrs.add_string(attr::MEMBEROF_SID, sid)?,
        None => attrs.remove(attr::MEMBEROF_SID)?,
    }
    attrs.add_string(attr::OBJECT_CLASS, COMPUTER_CLASS)?;
    attrs.add_string(attr::NAME, &update.name)?;
    attrs.add_i64_once(attr::CREATE_TIME, update.now)?;
    attrs.add_i64(attr::CACHE_EXPIRE, update.cache_expire()?)?;

    Ok((attrs, remaining))
}

fn split_member_sids(sids: &[Option<String>]) -> StoreResult<(Option<&str>, Vec<&str>)> {
    let Some((head, tail)) = sids.split_first() else {
        return Ok((None, Vec::new()));
    };

    let remaining: Vec<&str> = tail.iter().flatten().map(String::as_str).collect();
    if head.is_none() && !remaining.is_empty() {
        return Err(StoreError::InvalidArgument(
            "first group SID is missing while later ones are set".into(),
        ));
    }
    if head.as_deref() == Some("") || remaining.contains(&"") {
        return Err(StoreError::InvalidArgument("empty group SID".into()));
    }
    Ok((head.as_deref(), remaining))
}

fn add_remaining_members(conn: &Connection, dn: &Dn, sids: &[&str]) -> StoreResult<()> {
    let txn = Txn::begin(conn)?;

    let mut req = ModifyRequest::new(dn.clone());
    req.add_empty(attr::MEMBEROF_SID, ModOp::Add)?;
    for sid in sids {
        req.add_value(attr::MEMBEROF_SID, sid)?;
    }
    custom::modify(&txn, &req)?;

    txn.commit()
}

// ═══════════════════════════════════════════════════════════════════════
//  ComputerStore
// ═══════════════════════════════════════════════════════════════════════

/// Async access to the computers partition of one domain.
#[derive(Clone)]
pub struct ComputerStore {
    db: Database,
    partition: Partition,
}

impl ComputerStore {
    /// Create a store for the computers of `domain`, backed by `db`.
    pub fn new(db: Database, domain: &str) -> StoreResult<Self> {
        Ok(Self {
            db,
            partition: Partition::new(domain, COMPUTERS_SUBDIR)?,
        })
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    /// Look up a computer, returning `None` if it is not cached.
    #[instrument(skip(self))]
    pub async fn find_by_name(&self, name: &str) -> StoreResult<Option<ComputerRecord>> {
        let partition = self.partition.clone();
        let name = name.to_string();
        self.db
            .execute(move |conn| {
                find_by_name(conn, &partition, &name, None)?
                    .as_ref()
                    .map(ComputerRecord::try_from)
                    .transpose()
            })
            .await
    }

    /// Fetch a computer with all of its attributes.
    ///
    /// Fails with [`StoreError::NotFound`] if it is not cached and with
    /// [`StoreError::InvalidState`] if the name is not unique.
    #[instrument(skip(self))]
    pub async fn get(&self, name: &str) -> StoreResult<ComputerRecord> {
        let partition = self.partition.clone();
        let name = name.to_string();
        self.db
            .execute(move |conn| {
                let entry = get(conn, &partition, &name, None)?;
                ComputerRecord::try_from(&entry)
            })
            .await
    }

    /// Fetch a computer projected to `attrs`.
    #[instrument(skip(self))]
    pub async fn get_with_attrs(&self, name: &str, attrs: &[&str]) -> StoreResult<Entry> {
        let partition = self.partition.clone();
        let name = name.to_string();
        let attrs: Vec<String> = attrs.iter().map(|a| a.to_string()).collect();
        self.db
            .execute(move |conn| {
                let projection: Vec<&str> = attrs.iter().map(String::as_str).collect();
                get(conn, &partition, &name, Some(&projection))
            })
            .await
    }

    /// Create or overwrite a computer.
    ///
    /// Group SIDs end up exactly as supplied in `update`. See the module
    /// docs for the state other connections can observe mid-write.
    #[instrument(skip(self, update), fields(name = %update.name))]
    pub async fn set(&self, update: ComputerUpdate) -> StoreResult<()> {
        let partition = self.partition.clone();
        self.db
            .execute(move |conn| set(conn, &partition, &update))
            .await
    }

    /// Replace the policy links of an existing computer.
    #[instrument(skip(self, links))]
    pub async fn set_policy_links(&self, name: &str, links: Vec<String>) -> StoreResult<()> {
        let partition = self.partition.clone();
        let name = name.to_string();
        self.db
            .execute(move |conn| set_policy_links(conn, &partition, &name, &links))
            .await
    }

    /// Remove a computer, returning `true` if it existed.
    #[instrument(skip(self))]
    pub async fn delete(&self, name: &str) -> StoreResult<bool> {
        let partition = self.partition.clone();
        let name = name.to_string();
        self.db
            .execute(move |conn| delete(conn, &partition, &name))
            .await
    }
}

// ── tests ────────────────────────────────────────────────────────────

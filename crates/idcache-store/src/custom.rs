//! Store primitives for entries in custom partitions.
//!
//! These are **synchronous** functions on a borrowed connection; async
//! callers run them inside [`Database::execute`](crate::Database::execute).
//!
//! - [`search`]: exact-match filter over one partition, with projection.
//! - [`store`]: upsert of an [`AttrSet`], atomic on its own.
//! - [`modify`]: apply a [`ModifyRequest`] inside a caller's [`Txn`].
//! - [`delete`]: remove one entry and all of its values.

use std::collections::HashSet;

use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, trace};

use crate::dn::{Dn, Partition};
use crate::entry::{AttrMode, AttrSet, Entry, Filter, ModElement, ModOp, ModifyRequest};
use crate::error::{StoreError, StoreResult};
use crate::txn::Txn;

// ═══════════════════════════════════════════════════════════════════════
//  Search
// ═══════════════════════════════════════════════════════════════════════

/// Find every entry of `partition` matching `filter`.
///
/// `projection` limits the returned attributes; `None` returns all of them.
/// Entries come back in insertion order.
pub fn search(
    conn: &Connection,
    partition: &Partition,
    filter: &Filter,
    projection: Option<&[&str]>,
) -> StoreResult<Vec<Entry>> {
    let mut sql = String::from("SELECT e.id, e.dn FROM entries e WHERE e.base_dn = ?1");
    let mut params: Vec<String> = vec![partition.base_dn()];
    for (attr, value) in filter.clauses() {
        let a = params.len() + 1;
        let v = a + 1;
        sql.push_str(&format!(
            " AND EXISTS (SELECT 1 FROM entry_attrs a \
             WHERE a.entry_id = e.id AND a.attr = ?{a} AND a.value = ?{v})"
        ));
        params.push(attr.clone());
        params.push(value.clone());
    }
    sql.push_str(" ORDER BY e.id");

    let heads: Vec<(i64, String)> = {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), |row| {
            Ok((row.get(0)?, row.get(1)?))
        })?;
        rows.collect::<Result<_, _>>()?
    };

    let mut entries = Vec::with_capacity(heads.len());
    for (id, dn) in heads {
        entries.push(load_entry(conn, id, Dn::from_stored(dn), projection)?);
    }

    debug!(
        partition = %partition,
        filter = %filter,
        matches = entries.len(),
        "search finished"
    );
    Ok(entries)
}

// ═══════════════════════════════════════════════════════════════════════
//  Upsert
// ═══════════════════════════════════════════════════════════════════════

/// Create the entry `name` in `partition`, or overwrite it in place.
///
/// Each attribute of `attrs` replaces the stored one according to its
/// [`AttrMode`]; attributes not named in `attrs` are left alone. The whole
/// upsert runs in its own transaction, so it must not be called while a
/// [`Txn`] is open on `conn`.
pub fn store(
    conn: &Connection,
    partition: &Partition,
    name: &str,
    attrs: &AttrSet,
) -> StoreResult<Dn> {
    let dn = partition.entry_dn(name)?;
    let txn = Txn::begin(conn)?;

    let (id, created) = match entry_id(conn, &dn)? {
        Some(id) => (id, false),
        None => {
            conn.execute(
                "INSERT INTO entries (dn, base_dn) VALUES (?1, ?2)",
                rusqlite::params![dn.as_str(), partition.base_dn()],
            )?;
            (conn.last_insert_rowid(), true)
        }
    };

    for attr in attrs.iter() {
        if attr.mode == AttrMode::Initial && !created && has_attr(conn, id, &attr.name)? {
            trace!(attr = %attr.name, "keeping write-once attribute");
            continue;
        }
        write_values(conn, id, &attr.name, &attr.values)?;
    }

    txn.commit()?;
    debug!(dn = %dn, created, attrs = attrs.len(), "entry stored");
    Ok(dn)
}

// ═══════════════════════════════════════════════════════════════════════
//  Modify
// ═══════════════════════════════════════════════════════════════════════

/// Apply `req` to its entry within the open transaction `txn`.
///
/// Elements are applied in order. The first failing element aborts the
/// request; the caller's transaction scope is then responsible for
/// discarding the elements already applied.
pub fn modify(txn: &Txn<'_>, req: &ModifyRequest) -> StoreResult<()> {
    let conn = txn.conn();
    let id = entry_id(conn, req.dn())?.ok_or_else(|| StoreError::NotFound {
        entity: "entry",
        id: req.dn().to_string(),
    })?;

    for element in req.elements() {
        apply_element(conn, id, element)?;
    }

    debug!(dn = %req.dn(), elements = req.elements().len(), "entry modified");
    Ok(())
}

fn apply_element(conn: &Connection, id: i64, element: &ModElement) -> StoreResult<()> {
    let attr = element.attr.as_str();
    match element.op {
        ModOp::Add => {
            if element.values.is_empty() {
                return Err(StoreError::InvalidArgument(format!(
                    "add of attribute {attr} carries no values"
                )));
            }
            let mut held: HashSet<String> = current_values(conn, id, attr)?.into_iter().collect();
            let mut seq = next_seq(conn, id, attr)?;
            for value in &element.values {
                if !held.insert(value.clone()) {
                    return Err(StoreError::AttributeValueExists {
                        attr: attr.to_string(),
                        value: value.clone(),
                    });
                }
                insert_value(conn, id, attr, seq, value)?;
                seq += 1;
            }
        }
        ModOp::Replace => write_values(conn, id, attr, &element.values)?,
        ModOp::Delete if element.values.is_empty() => {
            conn.execute(
                "DELETE FROM entry_attrs WHERE entry_id = ?1 AND attr = ?2",
                rusqlite::params![id, attr],
            )?;
        }
        ModOp::Delete => {
            for value in &element.values {
                let removed = conn.execute(
                    "DELETE FROM entry_attrs WHERE entry_id = ?1 AND attr = ?2 AND value = ?3",
                    rusqlite::params![id, attr, value],
                )?;
                if removed == 0 {
                    return Err(StoreError::NotFound {
                        entity: "attribute value",
                        id: format!("{attr}={value}"),
                    });
                }
            }
        }
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════
//  Delete
// ═══════════════════════════════════════════════════════════════════════

/// Delete the entry at `dn`, returning `true` if it existed.
pub fn delete(conn: &Connection, dn: &Dn) -> StoreResult<bool> {
    let deleted = conn.execute(
        "DELETE FROM entries WHERE dn = ?1",
        rusqlite::params![dn.as_str()],
    )?;
    debug!(dn = %dn, deleted = deleted > 0, "entry delete");
    Ok(deleted > 0)
}

// ── internals ────────────────────────────────────────────────────────

fn entry_id(conn: &Connection, dn: &Dn) -> StoreResult<Option<i64>> {
    let id = conn
        .query_row(
            "SELECT id FROM entries WHERE dn = ?1",
            rusqlite::params![dn.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

fn load_entry(
    conn: &Connection,
    id: i64,
    dn: Dn,
    projection: Option<&[&str]>,
) -> StoreResult<Entry> {
    let mut entry = Entry::new(dn);
    let mut stmt = conn.prepare_cached(
        "SELECT attr, value FROM entry_attrs WHERE entry_id = ?1 ORDER BY attr, seq",
    )?;
    let rows = stmt.query_map(rusqlite::params![id], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    for row in rows {
        let (attr, value) = row?;
        let wanted = projection.is_none_or(|p| p.contains(&attr.as_str()));
        if wanted {
            entry.push_value(attr, value);
        }
    }
    Ok(entry)
}

fn has_attr(conn: &Connection, id: i64, attr: &str) -> StoreResult<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM entry_attrs WHERE entry_id = ?1 AND attr = ?2 LIMIT 1",
            rusqlite::params![id, attr],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

fn current_values(conn: &Connection, id: i64, attr: &str) -> StoreResult<Vec<String>> {
    let mut stmt = conn.prepare_cached(
        "SELECT value FROM entry_attrs WHERE entry_id = ?1 AND attr = ?2 ORDER BY seq",
    )?;
    let values = stmt
        .query_map(rusqlite::params![id, attr], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(values)
}

fn next_seq(conn: &Connection, id: i64, attr: &str) -> StoreResult<i64> {
    let seq: i64 = conn.query_row(
        "SELECT COALESCE(MAX(seq) + 1, 0) FROM entry_attrs WHERE entry_id = ?1 AND attr = ?2",
        rusqlite::params![id, attr],
        |row| row.get(0),
    )?;
    Ok(seq)
}

/// Replace every value of `attr` with `values`; empty removes the attribute.
fn write_values(conn: &Connection, id: i64, attr: &str, values: &[String]) -> StoreResult<()> {
    conn.execute(
        "DELETE FROM entry_attrs WHERE entry_id = ?1 AND attr = ?2",
        rusqlite::params![id, attr],
    )?;

    let mut seen = HashSet::with_capacity(values.len());
    for (seq, value) in values.iter().enumerate() {
        if !seen.insert(value.as_str()) {
            return Err(StoreError::AttributeValueExists {
                attr: attr.to_string(),
                value: value.clone(),
            });
        }
        insert_value(conn, id, attr, seq as i64, value)?;
    }
    Ok(())
}

fn insert_value(conn: &Connection, id: i64, attr: &str, seq: i64, value: &str) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO entry_attrs (entry_id, attr, seq, value) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![id, attr, seq, value],
    )?;
    Ok(())
}

// ── tests ────────────────────────────────────────────────────────────

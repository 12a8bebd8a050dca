//! # idcache-store
//!
//! Storage engine for idcache.
//!
//! Keeps cached identity objects as attribute-oriented entries in SQLite
//! (WAL mode, versioned migrations) and exposes the computer cache on top
//! of them.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  ComputerStore (get / set / gPLink)      │
//! ├─────────────────────────────────────────┤
//! │  custom: search · store · modify · delete│
//! │  Txn (scoped, rollback on drop)          │
//! ├─────────────────────────────────────────┤
//! │  Database (rusqlite, WAL)                │
//! │  Migrations (versioned, transactional)   │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```ignore
//! use idcache_store::{ComputerStore, ComputerUpdate, Database};
//!
//! let db = Database::open_and_migrate("data/idcache.db").await?;
//! let computers = ComputerStore::new(db.clone(), "ad.example.com")?;
//! computers
//!     .set(
//!         ComputerUpdate::new("HOST1$", "CN=HOST1,CN=Computers,DC=ad,DC=example,DC=com", sid)
//!             .with_member_sids(group_sids)
//!             .with_cache_timeout(5400)
//!             .at(now),
//!     )
//!     .await?;
//! let host = computers.get("HOST1$").await?;
//! ```

pub mod computer;
pub mod config;
pub mod custom;
pub mod db;
pub mod dn;
pub mod entry;
pub mod error;
pub mod migration;
pub mod txn;

// ── re-exports ───────────────────────────────────────────────────────

pub use computer::{ComputerRecord, ComputerStore, ComputerUpdate};
pub use config::StoreConfig;
pub use db::Database;
pub use dn::{Dn, Partition};
pub use entry::{AttrSet, Entry, Filter, ModOp, ModifyRequest};
pub use error::{StoreError, StoreResult};
pub use txn::Txn;

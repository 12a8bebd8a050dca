//! CLI argument definitions for idcache.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// idcache -- inspect and maintain the identity cache.
#[derive(Parser)]
#[command(
    name = "idcache",
    version,
    about = "idcache -- identity cache maintenance",
    long_about = "Reads and writes cached computer objects in the idcache SQLite store."
)]
pub struct Cli {
    /// Configuration file (overrides IDCACHE_CONFIG).
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the effective configuration.
    Config,

    /// Show a cached computer.
    Get {
        /// Computer name, e.g. `HOST1$`.
        name: String,

        /// Only print these attributes (repeatable).
        #[arg(long = "attr", short)]
        attrs: Vec<String>,
    },

    /// Create or overwrite a cached computer.
    Set {
        /// Computer name, e.g. `HOST1$`.
        name: String,

        /// DN of the computer in the upstream directory.
        #[arg(long)]
        dn: String,

        /// Security identifier of the computer.
        #[arg(long)]
        sid: String,

        /// SID of a group the computer belongs to (repeatable, ordered).
        #[arg(long = "group-sid", short)]
        group_sids: Vec<String>,

        /// Entry lifetime in seconds; defaults to `store.cache_timeout`.
        #[arg(long)]
        timeout: Option<u32>,

        /// Reference Unix time; defaults to now.
        #[arg(long)]
        now: Option<i64>,
    },

    /// Replace the policy links of a cached computer (none removes them).
    Gplinks {
        /// Computer name.
        name: String,

        /// Policy link values.
        links: Vec<String>,
    },

    /// Delete a cached computer.
    Delete {
        /// Computer name.
        name: String,
    },
}

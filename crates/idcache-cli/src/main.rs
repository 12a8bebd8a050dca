//! CLI entry point for idcache.
//!
//! This binary provides the `idcache` command with subcommands for
//! reading, writing, and deleting cached computer objects.

mod cli;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use idcache_store::{ComputerStore, ComputerUpdate, Database, StoreConfig};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};

/// Config file used when neither `--config` nor `IDCACHE_CONFIG` is set.
const DEFAULT_CONFIG_PATH: &str = "config/idcache.toml";

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing("warn");

    let cli = Cli::parse();
    let config = load_config(cli.config)?;

    match cli.command {
        Commands::Config => cmd_config(&config),
        Commands::Get { name, attrs } => cmd_get(&config, &name, &attrs).await,
        Commands::Set {
            name,
            dn,
            sid,
            group_sids,
            timeout,
            now,
        } => {
            let update = ComputerUpdate::new(name, dn, sid)
                .with_member_sids(group_sids)
                .with_cache_timeout(timeout.unwrap_or(config.cache_timeout))
                .at(now.unwrap_or_else(|| chrono::Utc::now().timestamp()));
            cmd_set(&config, update).await
        }
        Commands::Gplinks { name, links } => cmd_gplinks(&config, &name, links).await,
        Commands::Delete { name } => cmd_delete(&config, &name).await,
    }
}

// ---------------------------------------------------------------------------
// Subcommands
// ---------------------------------------------------------------------------

fn cmd_config(config: &StoreConfig) -> Result<()> {
    println!(
        "database_path = {}\ndomain = {}\ncache_timeout = {}",
        config.database_path.display(),
        config.domain,
        config.cache_timeout
    );
    Ok(())
}

async fn cmd_get(config: &StoreConfig, name: &str, attrs: &[String]) -> Result<()> {
    let store = open_store(config).await?;

    let json = if attrs.is_empty() {
        let record = store
            .get(name)
            .await
            .with_context(|| format!("failed to read computer {name}"))?;
        serde_json::to_string_pretty(&record)?
    } else {
        let attrs: Vec<&str> = attrs.iter().map(String::as_str).collect();
        let entry = store
            .get_with_attrs(name, &attrs)
            .await
            .with_context(|| format!("failed to read computer {name}"))?;
        serde_json::to_string_pretty(&entry)?
    };

    println!("{json}");
    Ok(())
}

async fn cmd_set(config: &StoreConfig, update: ComputerUpdate) -> Result<()> {
    let store = open_store(config).await?;
    let name = update.name.clone();

    store
        .set(update)
        .await
        .with_context(|| format!("failed to store computer {name}"))?;

    info!(%name, "computer stored");
    println!("stored {name}");
    Ok(())
}

async fn cmd_gplinks(config: &StoreConfig, name: &str, links: Vec<String>) -> Result<()> {
    let store = open_store(config).await?;
    let count = links.len();

    store
        .set_policy_links(name, links)
        .await
        .with_context(|| format!("failed to set policy links of {name}"))?;

    if count == 0 {
        println!("removed policy links of {name}");
    } else {
        println!("stored {count} policy link(s) for {name}");
    }
    Ok(())
}

async fn cmd_delete(config: &StoreConfig, name: &str) -> Result<()> {
    let store = open_store(config).await?;

    let deleted = store
        .delete(name)
        .await
        .with_context(|| format!("failed to delete computer {name}"))?;

    if deleted {
        println!("deleted {name}");
    } else {
        println!("{name} is not cached");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Resolve the config path from the flag, the environment, or the default.
fn config_path(flag: Option<PathBuf>) -> PathBuf {
    flag.or_else(|| std::env::var_os("IDCACHE_CONFIG").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

fn load_config(flag: Option<PathBuf>) -> Result<StoreConfig> {
    let path = config_path(flag);
    debug!(path = %path.display(), "loading configuration");
    StoreConfig::load(&path).with_context(|| format!("failed to load {}", path.display()))
}

async fn open_store(config: &StoreConfig) -> Result<ComputerStore> {
    if let Some(parent) = config.database_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let db = Database::open_and_migrate(config.database_path.clone())
        .await
        .context("failed to open database")?;
    let store = ComputerStore::new(db, &config.domain).context("invalid domain")?;
    Ok(store)
}

/// Initialize the tracing subscriber with the given default log level.
fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn set_collects_group_sids_in_order() {
        let cli = Cli::try_parse_from([
            "idcache",
            "set",
            "HOST1$",
            "--dn",
            "CN=HOST1,DC=test",
            "--sid",
            "S-1-5-21-1-2-3-100",
            "-g",
            "S-1-5-11",
            "--group-sid",
            "S-1-5-21-1-2-3-515",
            "--timeout",
            "0",
        ])
        .unwrap();

        match cli.command {
            Commands::Set {
                name,
                group_sids,
                timeout,
                now,
                ..
            } => {
                assert_eq!(name, "HOST1$");
                assert_eq!(group_sids, ["S-1-5-11", "S-1-5-21-1-2-3-515"]);
                assert_eq!(timeout, Some(0));
                assert_eq!(now, None);
            }
            _ => panic!("expected set"),
        }
    }

    #[test]
    fn gplinks_without_links_parses() {
        let cli = Cli::try_parse_from(["idcache", "gplinks", "HOST1$"]).unwrap();
        assert!(matches!(cli.command, Commands::Gplinks { ref links, .. } if links.is_empty()));
    }

    #[test]
    fn explicit_config_flag_wins() {
        let path = config_path(Some(PathBuf::from("/tmp/x.toml")));
        assert_eq!(path, PathBuf::from("/tmp/x.toml"));
    }
}

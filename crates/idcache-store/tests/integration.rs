//! Integration tests for the idcache-store crate.
//!
//! These tests exercise the full database lifecycle including migrations
//! and the computer cache against a real SQLite database on disk
//! (via tempfile).

use idcache_store::computer::attr;
use idcache_store::{ComputerStore, ComputerUpdate, Database, StoreConfig, StoreError};

const HOST: &str = "HOST1$";
const HOST_DN: &str = "CN=HOST1,CN=Computers,DC=testdomain,DC=test";
const HOST_SID: &str = "S-1-5-21-1961322486-2366424238-2351687912-100";
const DOMAIN_COMPUTERS: &str = "S-1-5-21-1961322486-2366424238-2351687912-515";
const AUTHENTICATED_USERS: &str = "S-1-5-11";

async fn open_store(dir: &tempfile::TempDir) -> ComputerStore {
    let db = Database::open_and_migrate(dir.path().join("test.db"))
        .await
        .unwrap();
    ComputerStore::new(db, "testdomain.test").unwrap()
}

fn host() -> ComputerUpdate {
    ComputerUpdate::new(HOST, HOST_DN, HOST_SID)
        .with_member_sids([AUTHENTICATED_USERS, DOMAIN_COMPUTERS])
}

// ═══════════════════════════════════════════════════════════════════════
//  Database lifecycle
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn database_open_and_migrate_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("test.db");

    let db = Database::open_and_migrate(db_path.clone()).await.unwrap();

    let entry_count: i64 = db
        .execute(|conn| {
            let c: i64 = conn.query_row("SELECT count(*) FROM entries", [], |row| row.get(0))?;
            Ok(c)
        })
        .await
        .unwrap();
    assert_eq!(entry_count, 0);
    assert!(db_path.exists());
}

#[tokio::test]
async fn database_open_and_migrate_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("test_idempotent.db");

    let db1 = Database::open_and_migrate(db_path.clone()).await.unwrap();
    drop(db1);

    let db2 = Database::open_and_migrate(db_path).await.unwrap();
    let count: i64 = db2
        .execute(|conn| {
            let c: i64 = conn.query_row("SELECT count(*) FROM entry_attrs", [], |row| row.get(0))?;
            Ok(c)
        })
        .await
        .unwrap();
    assert_eq!(count, 0);
}

// ═══════════════════════════════════════════════════════════════════════
//  Computer cache
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn host_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;

    store.set(host().with_cache_timeout(0).at(0)).await.unwrap();

    let rec = store.get(HOST).await.unwrap();
    assert_eq!(rec.cache_expire, 0);
    assert_eq!(rec.create_time, 0);
    assert_eq!(rec.member_of_sids.len(), 2);
    assert!(rec.member_of_sids.iter().any(|s| s == AUTHENTICATED_USERS));
    assert!(rec.member_of_sids.iter().any(|s| s == DOMAIN_COMPUTERS));
    assert!(rec.policy_links.is_empty());

    let entry = store
        .get_with_attrs(
            HOST,
            &[
                attr::NAME,
                attr::SID,
                attr::MEMBEROF_SID,
                attr::ORIG_DN,
                attr::GPLINK,
                attr::CACHE_EXPIRE,
                attr::CREATE_TIME,
            ],
        )
        .await
        .unwrap();
    // Every requested attribute except gPLink.
    assert_eq!(entry.len(), 6);
    assert!(!entry.has(attr::GPLINK));
}

#[tokio::test]
async fn repeated_sets_keep_a_single_record() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;

    for now in 0..5 {
        store
            .set(host().with_cache_timeout(5).at(now))
            .await
            .unwrap();
        assert_eq!(store.find_by_name(HOST).await.unwrap().unwrap().name, HOST);
    }

    let rec = store.get(HOST).await.unwrap();
    assert_eq!(rec.cache_expire, 9);
    assert_eq!(rec.create_time, 0);
}

#[tokio::test]
async fn modify_computer_groups() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    store.set(host()).await.unwrap();

    let modified = [
        "S-1-5-11",
        "S-1-5-21-1961322486-2366424238-2351687912-516",
        "S-1-5-21-1961322486-2366424238-2351687912-553",
    ];
    store
        .set(
            ComputerUpdate::new(HOST, HOST_DN, HOST_SID)
                .with_member_sids(modified)
                .with_cache_timeout(5)
                .at(0),
        )
        .await
        .unwrap();

    let rec = store.get(HOST).await.unwrap();
    assert_eq!(rec.member_of_sids, modified);
    assert_eq!(rec.cache_expire, 5);

    let now = chrono::Utc::now().timestamp();
    store
        .set(host().with_cache_timeout(5).at(now))
        .await
        .unwrap();

    let rec = store.get(HOST).await.unwrap();
    assert_eq!(rec.member_of_sids, [AUTHENTICATED_USERS, DOMAIN_COMPUTERS]);
    assert_eq!(rec.cache_expire, now + 5);
}

#[tokio::test]
async fn policy_link_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    store.set(host()).await.unwrap();

    let links: Vec<String> = (1..=3)
        .map(|i| format!("cseGUID={{827D319E}},gpoGUID={{GPO-{i}}},cn=gpos,cn=ad,cn=custom"))
        .collect();

    store.set_policy_links(HOST, links.clone()).await.unwrap();
    let once = store.get(HOST).await.unwrap();
    store.set_policy_links(HOST, links.clone()).await.unwrap();
    let twice = store.get(HOST).await.unwrap();
    assert_eq!(once, twice);
    assert_eq!(twice.policy_links, links);

    store.set_policy_links(HOST, Vec::new()).await.unwrap();
    let entry = store.get_with_attrs(HOST, &[attr::GPLINK]).await.unwrap();
    assert!(entry.is_empty());
}

#[tokio::test]
async fn records_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = open_store(&dir).await;
        store.set(host().with_cache_timeout(60).at(1_000)).await.unwrap();
        store
            .set_policy_links(HOST, vec!["gpo-a".into()])
            .await
            .unwrap();
    }

    let store = open_store(&dir).await;
    let rec = store.get(HOST).await.unwrap();
    assert_eq!(rec.cache_expire, 1_060);
    assert_eq!(rec.policy_links, ["gpo-a"]);
    assert!(rec.is_expired(1_060));
}

#[tokio::test]
async fn domains_are_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open_and_migrate(dir.path().join("test.db"))
        .await
        .unwrap();
    let a = ComputerStore::new(db.clone(), "a.test").unwrap();
    let b = ComputerStore::new(db, "b.test").unwrap();

    a.set(host()).await.unwrap();
    assert!(b.find_by_name(HOST).await.unwrap().is_none());
    assert!(matches!(
        b.get(HOST).await,
        Err(StoreError::NotFound { .. })
    ));
}

#[tokio::test]
async fn config_drives_store() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("idcache.toml");
    let db_path = dir.path().join("cache.db");
    std::fs::write(
        &config_path,
        format!(
            "[store]\ndatabase_path = {:?}\ndomain = \"corp.test\"\ncache_timeout = 30\n",
            db_path.display().to_string()
        ),
    )
    .unwrap();

    let config = StoreConfig::load(&config_path).unwrap();
    let db = Database::open_and_migrate(config.database_path.clone())
        .await
        .unwrap();
    let store = ComputerStore::new(db, &config.domain).unwrap();
    store
        .set(host().with_cache_timeout(config.cache_timeout).at(10))
        .await
        .unwrap();

    assert_eq!(store.get(HOST).await.unwrap().cache_expire, 40);
    assert!(db_path.exists());
}

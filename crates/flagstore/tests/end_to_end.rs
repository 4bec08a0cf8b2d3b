//! Data files flowing through the file data source into configured stores.

use std::fs;
use std::time::Duration;

use flagstore::{
    open_store, BackendConfig, CacheConfig, DataSource, FeatureStore, FileDataSource,
    FileDataSourceConfig, MemoryDatabase, ReloadOutcome, StoreConfig, UpsertResult, FEATURES,
    SEGMENTS,
};
use flagstore_testkit::flag;
use tokio::time::timeout;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_files_into_sqlite_visible_to_second_handle() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("flags.yaml");
    fs::write(
        &data,
        "flags:\n  checkout:\n    on: true\n    version: 7\n    variations: [true, false]\nsegments:\n  beta:\n    included: [alice]\n",
    )
    .unwrap();
    let db = dir.path().join("flags.db");

    let writer = open_store(StoreConfig::new(BackendConfig::Sqlite(db.clone()))).unwrap();
    let source = FileDataSource::new(writer, [&data], FileDataSourceConfig::default());
    source.start().await;
    assert!(source.initialized());

    let reader = open_store(
        StoreConfig::new(BackendConfig::Sqlite(db)).with_cache(CacheConfig::disabled()),
    )
    .unwrap();
    assert!(reader.initialized().await.unwrap());
    assert_eq!(reader.get(FEATURES, "checkout").await.unwrap().unwrap().version(), 7);
    assert!(reader.get(SEGMENTS, "beta").await.unwrap().is_some());

    source.close().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_reload_updates_uncached_readers() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("flags.json");
    fs::write(&data, r#"{"flagValues": {"banner": "hello"}}"#).unwrap();

    let db = MemoryDatabase::new();
    let config = StoreConfig::new(BackendConfig::Memory(db))
        .with_prefix("e2e")
        .with_cache(CacheConfig::disabled());
    let writer = open_store(config.clone()).unwrap();
    let reader = open_store(config).unwrap();

    let source = FileDataSource::new(
        writer,
        [&data],
        FileDataSourceConfig::new()
            .with_auto_update(true)
            .with_debounce(Duration::from_millis(100)),
    );
    source.start().await;
    let mut outcomes = source.subscribe();

    let banner = reader.get(FEATURES, "banner").await.unwrap().unwrap();
    assert_eq!(banner.data()["variations"][0], "hello");

    fs::write(&data, r#"{"flagValues": {"banner": "goodbye", "extra": 1}}"#).unwrap();
    let outcome = timeout(Duration::from_secs(5), outcomes.recv())
        .await
        .expect("no reload within timeout")
        .unwrap();
    assert_eq!(outcome, ReloadOutcome::Loaded { items: 2 });

    let banner = reader.get(FEATURES, "banner").await.unwrap().unwrap();
    assert_eq!(banner.data()["variations"][0], "goodbye");
    assert_eq!(reader.all(FEATURES).await.unwrap().len(), 2);

    source.close().await;
}

#[tokio::test]
async fn test_file_versions_lose_to_newer_upserts_until_reload() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("flags.json");
    fs::write(&data, r#"{"flags": {"f": {"version": 3}}}"#).unwrap();

    let store = open_store(StoreConfig::default()).unwrap();
    let source = FileDataSource::new(store.clone(), [&data], FileDataSourceConfig::default());
    source.start().await;

    assert_eq!(
        store.upsert(FEATURES, flag("f", 2)).await.unwrap(),
        UpsertResult::Superseded
    );
    assert_eq!(
        store.upsert(FEATURES, flag("f", 4)).await.unwrap(),
        UpsertResult::Applied
    );

    // A full reload replaces everything, including newer upserts.
    assert!(source.reload().await);
    assert_eq!(store.get(FEATURES, "f").await.unwrap().unwrap().version(), 3);
}

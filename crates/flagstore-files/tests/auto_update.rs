//! End-to-end reload behavior against real files and a live watcher.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use flagstore_core::FEATURES;
use flagstore_files::{DataSource, FileDataSource, FileDataSourceConfig, ReloadOutcome};
use flagstore_store::{FeatureStore, MemoryStore};
use tokio::sync::broadcast;
use tokio::time::timeout;

const DEBOUNCE: Duration = Duration::from_millis(100);
const WAIT: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(750);

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn write(path: &Path, content: &str) {
    fs::write(path, content).unwrap();
}

fn flag_file(dir: &Path, version: u64) -> PathBuf {
    let path = dir.join("flags.json");
    write(
        &path,
        &format!(r#"{{"flags": {{"f1": {{"on": true, "version": {version}}}}}}}"#),
    );
    path
}

async fn next_outcome(rx: &mut broadcast::Receiver<ReloadOutcome>) -> ReloadOutcome {
    timeout(WAIT, rx.recv())
        .await
        .expect("no reload within timeout")
        .unwrap()
}

async fn assert_quiet(rx: &mut broadcast::Receiver<ReloadOutcome>) {
    assert!(
        timeout(QUIET, rx.recv()).await.is_err(),
        "unexpected reload"
    );
}

fn auto_update() -> FileDataSourceConfig {
    FileDataSourceConfig::new()
        .with_auto_update(true)
        .with_debounce(DEBOUNCE)
}

#[tokio::test(flavor = "multi_thread")]
async fn test_duplicate_keys_leave_store_uninitialized() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.json");
    let b = dir.path().join("b.yaml");
    write(&a, r#"{"flags": {"f1": {}}}"#);
    write(&b, "flagValues:\n  f1: true\n");

    let store = Arc::new(MemoryStore::new());
    let source = FileDataSource::new(store.clone(), [&a, &b], FileDataSourceConfig::default());
    source.start().await;

    assert!(!source.initialized());
    assert!(!store.initialized().await.unwrap());
    assert!(store.all(FEATURES).await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_modified_file_is_reloaded_once() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = flag_file(dir.path(), 1);

    let store = Arc::new(MemoryStore::new());
    let source = FileDataSource::new(store.clone(), [&path], auto_update());
    source.start().await;
    assert!(source.initialized());
    let mut outcomes = source.subscribe();

    flag_file(dir.path(), 2);
    assert_eq!(next_outcome(&mut outcomes).await, ReloadOutcome::Loaded { items: 1 });
    assert_quiet(&mut outcomes).await;

    let f1 = store.get(FEATURES, "f1").await.unwrap().unwrap();
    assert_eq!(f1.version(), 2);

    source.close().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unrelated_file_does_not_reload() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = flag_file(dir.path(), 1);

    let store = Arc::new(MemoryStore::new());
    let source = FileDataSource::new(store, [&path], auto_update());
    source.start().await;
    let mut outcomes = source.subscribe();

    write(&dir.path().join("notes.txt"), "not flag data");
    assert_quiet(&mut outcomes).await;

    source.close().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_bad_edit_keeps_last_good_data() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = flag_file(dir.path(), 5);

    let store = Arc::new(MemoryStore::new());
    let source = FileDataSource::new(store.clone(), [&path], auto_update());
    source.start().await;
    let mut outcomes = source.subscribe();

    write(&path, "{ this is not json");
    assert!(matches!(
        next_outcome(&mut outcomes).await,
        ReloadOutcome::Failed { .. }
    ));

    assert!(source.initialized());
    let f1 = store.get(FEATURES, "f1").await.unwrap().unwrap();
    assert_eq!(f1.version(), 5);

    // A later fix is picked up.
    flag_file(dir.path(), 6);
    assert_eq!(next_outcome(&mut outcomes).await, ReloadOutcome::Loaded { items: 1 });
    assert_eq!(store.get(FEATURES, "f1").await.unwrap().unwrap().version(), 6);

    source.close().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_created_file_initializes_store() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("late.yaml");

    let store = Arc::new(MemoryStore::new());
    let source = FileDataSource::new(store.clone(), [&path], auto_update());
    source.start().await;
    assert!(!source.initialized());
    let mut outcomes = source.subscribe();

    write(&path, "flagValues:\n  greeting: hello\n");
    assert_eq!(next_outcome(&mut outcomes).await, ReloadOutcome::Loaded { items: 1 });
    assert!(source.initialized());
    assert!(store.initialized().await.unwrap());

    source.close().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_no_reloads_after_close() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = flag_file(dir.path(), 1);

    let source = FileDataSource::new(Arc::new(MemoryStore::new()), [&path], auto_update());
    source.start().await;
    let mut outcomes = source.subscribe();
    source.close().await;

    flag_file(dir.path(), 2);
    assert!(timeout(QUIET, outcomes.recv()).await.map_or(true, |r| r.is_err()));
}

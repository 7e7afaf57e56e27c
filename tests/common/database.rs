//! Store fixtures backed by a per-test temporary file.

use tempfile::TempDir;

use market_pulse::store::TimeSeriesStore;

/// A file-backed store that disappears with the test.
pub struct TestStore {
    // Held for its Drop; the directory outlives the pool.
    _dir: TempDir,
    pub store: TimeSeriesStore,
}

pub async fn fresh_store() -> TestStore {
    let dir = TempDir::new().expect("create temp dir");
    let path = dir.path().join("pulse_test.db");
    let store = TimeSeriesStore::connect(path.to_str().expect("utf-8 temp path"))
        .await
        .expect("open test store");
    TestStore { _dir: dir, store }
}

pub mod builders;
pub mod fakes;

use std::path::Path;
use std::sync::{Arc, Once};
use std::time::Duration;

use batchdag::config::NodeHardware;
use batchdag::fs::{FileSystem, MockFileSystem};
use batchdag::provenance::{ProjectLayout, ProvenanceStore};
use tracing_subscriber::{EnvFilter, fmt};

static INIT: Once = Once::new();

/// Route `tracing` output through the test harness.
///
/// Output shows up only for failing tests unless run with `--nocapture`.
/// Filter with `RUST_LOG`, e.g. `RUST_LOG=batchdag::reuse=debug`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let _ = fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .try_init();
    });
}

/// Provenance store over an in-memory tree.
///
/// The returned `MockFileSystem` shares that tree, so tests can plant cluster
/// logs or corrupt records and inspect what was written.
pub fn memory_store(root: impl AsRef<Path>, project: &str) -> (MockFileSystem, ProvenanceStore) {
    let fs = MockFileSystem::new();
    let shared: Arc<dyn FileSystem> = Arc::new(fs.clone());
    let store = ProvenanceStore::new(shared, ProjectLayout::new(root.as_ref(), project));
    (fs, store)
}

/// Node with `cores` cores, 192 GB of memory and two hyperthreads per core.
pub fn node(cores: u32) -> NodeHardware {
    NodeHardware {
        cores_per_node: cores,
        memory_per_node_gb: Some(192.0),
        threads_per_core: Some(2),
    }
}

/// Fail the test if `f` has not finished within 5 seconds.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

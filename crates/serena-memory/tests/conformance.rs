//! Store conformance suite against the in-memory store.

use serena_memory::MemoryStore;
use serena_test_utils::StoreTestSuite;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn memory_store_passes_conformance_suite() {
    StoreTestSuite::new(|| async { MemoryStore::new() }).run_all().await;
}

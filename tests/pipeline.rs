//! End-to-end pipeline tests against an in-memory store and stub backends.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result as AnyResult;
use async_trait::async_trait;

use docsmith::backend::{BackendResponse, DocBackend};
use docsmith::cache::{CacheLayer, ManualClock};
use docsmith::config::Config;
use docsmith::error::{BackendError, BackendErrorKind, Error};
use docsmith::kv::{InMemoryKvStore, KvStore};
use docsmith::models::SourceUnit;
use docsmith::pipeline::Pipeline;

/// Build a config without touching the filesystem; callers override fields.
fn test_config() -> Config {
    let mut config: Config =
        toml::from_str("[cache]\ndb_path = \"/tmp/docsmith-test-unused.sqlite\"\n").unwrap();
    config.retry.base_delay_ms = 1; // keep failure tests fast
    config.retry.max_attempts = 3;
    config
}

/// Python source with `n` functions of exactly `lines_each` lines
/// (header + body + trailing blank line).
fn synthetic_source(n: usize, lines_each: usize) -> String {
    assert!(lines_each >= 3);
    let mut src = String::new();
    for i in 0..n {
        src.push_str(&format!("def func_{i}():\n"));
        for j in 0..lines_each - 2 {
            src.push_str(&format!("    v_{j} = {j}\n"));
        }
        src.push('\n');
    }
    src
}

/// Extract the 1-based section index from the orchestrator's chunk context.
fn section_index(context: Option<&str>) -> Option<usize> {
    let context = context?;
    let rest = context.strip_prefix("This is section ")?;
    let end = rest.find(' ')?;
    rest[..end].parse().ok()
}

/// Returns `DOC(n)` for its n-th call.
struct ScriptedBackend {
    calls: AtomicU32,
}

impl ScriptedBackend {
    fn new() -> Self {
        Self {
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl DocBackend for ScriptedBackend {
    async fn generate(
        &self,
        _content: &str,
        _context: Option<&str>,
    ) -> Result<BackendResponse, BackendError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(BackendResponse {
            text: format!("DOC({n})"),
            input_tokens: 1000,
            output_tokens: 100,
        })
    }
}

/// Completes later sections first by sleeping longer for earlier ones.
struct ReorderingBackend {
    total: usize,
}

#[async_trait]
impl DocBackend for ReorderingBackend {
    async fn generate(
        &self,
        _content: &str,
        context: Option<&str>,
    ) -> Result<BackendResponse, BackendError> {
        let section = section_index(context).unwrap_or(1);
        let delay_ms = 10 * (self.total + 1 - section) as u64;
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        Ok(BackendResponse {
            text: format!("CHUNK-MARKER-{section}"),
            input_tokens: 10,
            output_tokens: 10,
        })
    }
}

/// Fails fatally for one section, succeeds for the rest.
struct FailingSectionBackend {
    fail_section: usize,
}

#[async_trait]
impl DocBackend for FailingSectionBackend {
    async fn generate(
        &self,
        _content: &str,
        context: Option<&str>,
    ) -> Result<BackendResponse, BackendError> {
        let section = section_index(context).unwrap_or(0);
        if section == self.fail_section {
            return Err(BackendError::with_status(
                BackendErrorKind::Auth,
                401,
                "bad key",
            ));
        }
        Ok(BackendResponse {
            text: format!("SECTION-OK-{section}"),
            input_tokens: 10,
            output_tokens: 10,
        })
    }
}

/// Always rate-limited; counts attempts.
struct RateLimitedBackend {
    calls: AtomicU32,
}

#[async_trait]
impl DocBackend for RateLimitedBackend {
    async fn generate(
        &self,
        _content: &str,
        _context: Option<&str>,
    ) -> Result<BackendResponse, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(BackendError::with_status(
            BackendErrorKind::RateLimited,
            429,
            "slow down",
        ))
    }
}

/// Key-value store whose every operation fails.
struct BrokenStore;

#[async_trait]
impl KvStore for BrokenStore {
    async fn get(&self, _key: &str) -> AnyResult<Option<Vec<u8>>> {
        anyhow::bail!("store down")
    }
    async fn put(&self, _key: &str, _value: Vec<u8>, _ttl: u64) -> AnyResult<()> {
        anyhow::bail!("store down")
    }
}

#[tokio::test]
async fn test_small_file_idempotent_second_call_cached() {
    let config = test_config();
    let backend = Arc::new(ScriptedBackend::new());
    let store = Arc::new(InMemoryKvStore::new());
    let pipeline = Pipeline::new(&config, backend.clone(), store);

    let src = synthetic_source(3, 5);

    let first = pipeline
        .generate(SourceUnit::new("a.py", src.clone()))
        .await
        .unwrap();
    assert!(!first.was_cached);
    assert!(!first.chunked);
    assert_eq!(first.documentation, "DOC(1)");
    assert!(first.cost > 0.0);

    // Identical content under a different identifier is still a hit.
    let second = pipeline
        .generate(SourceUnit::new("renamed.py", src))
        .await
        .unwrap();
    assert!(second.was_cached);
    assert_eq!(second.documentation, first.documentation);
    assert_eq!(second.cost, 0.0);
    assert_eq!(second.input_tokens, first.input_tokens);
    assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_merge_order_survives_reordered_completion() {
    let mut config = test_config();
    config.chunking.threshold_lines = 50;
    config.chunking.overlap_lines = 5;
    config.processing.max_parallel = 5;

    // 25 functions x 10 lines = 250 lines -> 5 chunks of 50.
    let src = synthetic_source(25, 10);
    let pipeline = Pipeline::new(
        &config,
        Arc::new(ReorderingBackend { total: 5 }),
        Arc::new(InMemoryKvStore::new()),
    );

    let result = pipeline.generate(SourceUnit::new("big.py", src)).await.unwrap();
    assert!(result.chunked);
    let report = result.chunks.as_ref().unwrap();
    assert_eq!(report.total_chunks, 5);

    // Chunk 5 completed first, but markers must appear in sequence order.
    let positions: Vec<usize> = (1..=5)
        .map(|i| {
            result
                .documentation
                .find(&format!("CHUNK-MARKER-{i}"))
                .unwrap_or_else(|| panic!("marker {i} missing"))
        })
        .collect();
    for pair in positions.windows(2) {
        assert!(pair[0] < pair[1], "sections out of order: {positions:?}");
    }
}

#[tokio::test]
async fn test_partial_failure_yields_placeholder_not_error() {
    let mut config = test_config();
    config.chunking.threshold_lines = 50;

    // 15 functions x 10 lines = 150 lines -> 3 chunks.
    let src = synthetic_source(15, 10);
    let pipeline = Pipeline::new(
        &config,
        Arc::new(FailingSectionBackend { fail_section: 2 }),
        Arc::new(InMemoryKvStore::new()),
    );

    let result = pipeline.generate(SourceUnit::new("big.py", src)).await.unwrap();
    assert!(result.chunked);

    let report = result.chunks.as_ref().unwrap();
    assert_eq!(report.total_chunks, 3);
    assert_eq!(report.failed_chunks, 1);

    assert!(result.documentation.contains("SECTION-OK-1"));
    assert!(result.documentation.contains("SECTION-OK-3"));
    assert!(result
        .documentation
        .contains("could not be generated"));
    assert!(result.documentation.contains("<!-- generation failed"));

    // A merge with placeholders is not cached whole-file: rerunning hits
    // the healthy chunks' cache and retries only the failed one.
    let rerun = pipeline
        .generate(SourceUnit::new("big.py", synthetic_source(15, 10)))
        .await
        .unwrap();
    assert!(!rerun.was_cached);
    let rerun_report = rerun.chunks.as_ref().unwrap();
    assert_eq!(rerun_report.cache_hits, 2);
    assert_eq!(rerun_report.failed_chunks, 1);
}

#[tokio::test]
async fn test_large_file_scenario_three_chunks_then_cached() {
    let mut config = test_config();
    config.chunking.threshold_lines = 2000;
    config.chunking.overlap_lines = 50;

    // 45 functions x 100 lines = 4500 lines, evenly distributed -> 3 chunks.
    let src = synthetic_source(45, 100);
    let backend = Arc::new(ScriptedBackend::new());
    let pipeline = Pipeline::new(&config, backend.clone(), Arc::new(InMemoryKvStore::new()));

    let result = pipeline
        .generate(SourceUnit::new("huge.py", src.clone()))
        .await
        .unwrap();
    assert!(result.chunked);
    let report = result.chunks.as_ref().unwrap();
    assert_eq!(report.total_chunks, 3);
    assert_eq!(report.cache_misses, 3);

    let p1 = result.documentation.find("DOC(1)").unwrap();
    let p2 = result.documentation.find("DOC(2)").unwrap();
    let p3 = result.documentation.find("DOC(3)").unwrap();
    assert!(p1 < p2 && p2 < p3);

    // Token/cost totals sum across chunks.
    assert_eq!(result.input_tokens, 3000);
    assert_eq!(result.output_tokens, 300);
    assert!(result.cost > 0.0);

    // Reprocessing identical content is a single whole-file hit.
    let again = pipeline
        .generate(SourceUnit::new("huge.py", src))
        .await
        .unwrap();
    assert!(again.was_cached);
    assert_eq!(again.cost, 0.0);
    assert_eq!(again.documentation, result.documentation);
    assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_changed_tail_reuses_unchanged_chunk_caches() {
    let mut config = test_config();
    config.chunking.threshold_lines = 50;
    config.chunking.overlap_lines = 5;

    let src_a = synthetic_source(15, 10); // 3 chunks
    let mut src_b = synthetic_source(14, 10);
    src_b.push_str("def func_14():\n    return \"changed\"\n\n"); // last function differs

    let backend = Arc::new(ScriptedBackend::new());
    let pipeline = Pipeline::new(&config, backend.clone(), Arc::new(InMemoryKvStore::new()));

    pipeline
        .generate(SourceUnit::new("a.py", src_a))
        .await
        .unwrap();
    assert_eq!(backend.calls.load(Ordering::SeqCst), 3);

    // Only the final chunk's content changed; the first two hit the
    // chunk-level cache even though the whole-file key misses.
    let result = pipeline
        .generate(SourceUnit::new("a.py", src_b))
        .await
        .unwrap();
    assert!(!result.was_cached);
    let report = result.chunks.as_ref().unwrap();
    assert_eq!(report.cache_hits, 2);
    assert_eq!(report.cache_misses, 1);
    assert_eq!(backend.calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_all_chunks_cached_marks_result_cached() {
    let mut config = test_config();
    config.chunking.threshold_lines = 50;

    let src = synthetic_source(10, 10); // 2 chunks
    let backend = Arc::new(ScriptedBackend::new());
    let store = Arc::new(InMemoryKvStore::new());

    let pipeline = Pipeline::new(&config, backend.clone(), store.clone());
    let first = pipeline
        .generate(SourceUnit::new("x.py", src.clone()))
        .await
        .unwrap();
    assert!(first.chunked);

    // A trailing comment gives a new whole-file key while the first
    // chunk's content stays identical, so it hits the chunk cache.
    let mut src_b = src.clone();
    src_b.push_str("# trailing note\n");
    let second = pipeline
        .generate(SourceUnit::new("x.py", src_b))
        .await
        .unwrap();
    let report = second.chunks.as_ref().unwrap();
    assert!(report.cache_hits >= 1);
}

#[tokio::test]
async fn test_small_file_fatal_error_propagates() {
    let config = test_config();
    let pipeline = Pipeline::new(
        &config,
        Arc::new(FailingSectionBackend { fail_section: 0 }),
        Arc::new(InMemoryKvStore::new()),
    );

    // A small file gets context = None, so section_index is 0 -> fatal.
    let err = pipeline
        .generate(SourceUnit::new("a.py", synthetic_source(2, 5)))
        .await
        .unwrap_err();
    match err {
        Error::Backend(e) => assert_eq!(e.kind, BackendErrorKind::Auth),
        other => panic!("expected backend error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_small_file_retry_exhaustion_propagates() {
    let config = test_config();
    let backend = Arc::new(RateLimitedBackend {
        calls: AtomicU32::new(0),
    });
    let pipeline = Pipeline::new(&config, backend.clone(), Arc::new(InMemoryKvStore::new()));

    let err = pipeline
        .generate(SourceUnit::new("a.py", synthetic_source(2, 5)))
        .await
        .unwrap_err();
    match err {
        Error::Backend(e) => assert_eq!(e.kind, BackendErrorKind::RateLimited),
        other => panic!("expected backend error, got {other:?}"),
    }
    assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_invalid_source_rejected_before_backend_call() {
    let mut config = test_config();
    config.chunking.threshold_lines = 2;

    let backend = Arc::new(ScriptedBackend::new());
    let pipeline = Pipeline::new(&config, backend.clone(), Arc::new(InMemoryKvStore::new()));

    let err = pipeline
        .generate(SourceUnit::new(
            "bad.py",
            "def broken(:\n    pass\nx = (\ny = ]\n",
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidSource(_)));
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0, "no backend calls");
}

#[tokio::test]
async fn test_cache_store_outage_degrades_to_generation() {
    let config = test_config();
    let backend = Arc::new(ScriptedBackend::new());
    let pipeline = Pipeline::new(&config, backend.clone(), Arc::new(BrokenStore));

    let src = synthetic_source(3, 5);
    let first = pipeline
        .generate(SourceUnit::new("a.py", src.clone()))
        .await
        .unwrap();
    assert!(!first.was_cached);

    // No cache, so the identical request generates again — but succeeds.
    let second = pipeline
        .generate(SourceUnit::new("a.py", src))
        .await
        .unwrap();
    assert!(!second.was_cached);
    assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_whole_file_cache_expires_with_ttl() {
    let mut config = test_config();
    config.cache.ttl_seconds = 1;

    let backend = Arc::new(ScriptedBackend::new());
    let store: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::new());
    let clock = Arc::new(ManualClock::new(0));
    let cache = CacheLayer::with_clock(store, config.cache.ttl_seconds, clock.clone());
    let pipeline = Pipeline::with_cache(&config, backend.clone(), cache);

    let src = synthetic_source(3, 5);
    pipeline
        .generate(SourceUnit::new("a.py", src.clone()))
        .await
        .unwrap();

    let hit = pipeline
        .generate(SourceUnit::new("a.py", src.clone()))
        .await
        .unwrap();
    assert!(hit.was_cached);

    clock.advance_ms(2000);
    let miss = pipeline
        .generate(SourceUnit::new("a.py", src))
        .await
        .unwrap();
    assert!(!miss.was_cached);
    assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
}

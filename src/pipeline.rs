//! Top-level generation pipeline.
//!
//! Decides the small-file vs. chunked path, applies whole-file caching,
//! and aggregates cost/timing into the final [`GenerationResult`]:
//!
//! 1. Whole-file fingerprint → cache check. Hit: return immediately,
//!    `was_cached = true`, zero cost.
//! 2. Miss, file at or under the chunk threshold: one backend call through
//!    the retry controller. Fatal backend errors propagate — there is no
//!    meaningful partial result for a single unsplit file.
//! 3. Miss, larger: boundary-aware split, then the chunk orchestrator.
//!    The merged result is cached under the whole-file fingerprint in
//!    addition to the per-chunk entries the orchestrator wrote, so an
//!    identical file is one cache hit while a file sharing only some
//!    chunks still gets partial chunk-level hits.

use std::sync::Arc;
use std::time::Instant;

use tracing::info;
use uuid::Uuid;

use crate::backend::DocBackend;
use crate::cache::CacheLayer;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::fingerprint::{fingerprint, short};
use crate::kv::KvStore;
use crate::models::{CostRates, GenerationResult, SourceUnit};
use crate::orchestrator::process_chunks;
use crate::retry::{call_with_retry, RetryPolicy};
use crate::splitter::split;

/// The documentation generation pipeline. One instance serves many
/// requests; all per-request state lives on the stack.
pub struct Pipeline {
    backend: Arc<dyn DocBackend>,
    cache: CacheLayer,
    retry: RetryPolicy,
    rates: CostRates,
    threshold_lines: usize,
    overlap_lines: usize,
    max_parallel: usize,
}

impl Pipeline {
    pub fn new(config: &Config, backend: Arc<dyn DocBackend>, store: Arc<dyn KvStore>) -> Self {
        let cache = CacheLayer::new(store, config.cache.ttl_seconds);
        Self::with_cache(config, backend, cache)
    }

    /// Construct with a prebuilt cache layer (tests inject a manual clock
    /// this way).
    pub fn with_cache(config: &Config, backend: Arc<dyn DocBackend>, cache: CacheLayer) -> Self {
        Self {
            backend,
            cache,
            retry: RetryPolicy::from_config(&config.retry, &config.backend),
            rates: config.pricing.rates(),
            threshold_lines: config.chunking.threshold_lines,
            overlap_lines: config.chunking.overlap_lines,
            max_parallel: config.processing.max_parallel,
        }
    }

    /// Generate documentation for one source unit.
    pub async fn generate(&self, unit: SourceUnit) -> Result<GenerationResult> {
        let started = Instant::now();
        let request_id = Uuid::new_v4().to_string();
        let file_fingerprint = fingerprint(&unit.content);

        info!(
            request_id,
            identifier = %unit.identifier,
            size_lines = unit.size_lines,
            fingerprint = short(&file_fingerprint),
            "generation requested"
        );

        if let Some(entry) = self.cache.get(&file_fingerprint).await {
            info!(request_id, "whole-file cache hit");
            return Ok(GenerationResult {
                request_id,
                identifier: unit.identifier,
                documentation: entry.documentation,
                input_tokens: entry.input_tokens,
                output_tokens: entry.output_tokens,
                cost: 0.0,
                was_cached: true,
                chunked: false,
                chunks: None,
                elapsed_ms: started.elapsed().as_millis() as u64,
            });
        }

        if unit.size_lines <= self.threshold_lines {
            self.generate_whole(unit, file_fingerprint, request_id, started)
                .await
        } else {
            self.generate_chunked(unit, file_fingerprint, request_id, started)
                .await
        }
    }

    async fn generate_whole(
        &self,
        unit: SourceUnit,
        file_fingerprint: String,
        request_id: String,
        started: Instant,
    ) -> Result<GenerationResult> {
        info!(request_id, "small file; single backend call");

        let response =
            call_with_retry(&self.retry, || self.backend.generate(&unit.content, None))
                .await
                .map_err(Error::Backend)?;

        let cost = self.rates.cost(response.input_tokens, response.output_tokens);
        self.cache
            .put(
                &file_fingerprint,
                &response.text,
                response.input_tokens,
                response.output_tokens,
                cost,
            )
            .await;

        Ok(GenerationResult {
            request_id,
            identifier: unit.identifier,
            documentation: response.text,
            input_tokens: response.input_tokens,
            output_tokens: response.output_tokens,
            cost,
            was_cached: false,
            chunked: false,
            chunks: None,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn generate_chunked(
        &self,
        unit: SourceUnit,
        file_fingerprint: String,
        request_id: String,
        started: Instant,
    ) -> Result<GenerationResult> {
        let outcome = split(&unit, self.threshold_lines, self.overlap_lines)?;
        info!(
            request_id,
            chunks = outcome.chunks.len(),
            fallback_single = outcome.fallback_single,
            "large file; chunked path"
        );

        let merged = process_chunks(
            self.backend.as_ref(),
            &self.cache,
            &self.retry,
            &self.rates,
            &unit.identifier,
            outcome.chunks,
            self.max_parallel,
        )
        .await;

        // Dual caching: the merged document under the whole-file key, on
        // top of the per-chunk entries the orchestrator already wrote. A
        // merge containing failure placeholders is never cached here, or
        // the failed sections could not be retried until the TTL lapsed.
        if merged.report.failed_chunks == 0 {
            self.cache
                .put(
                    &file_fingerprint,
                    &merged.documentation,
                    merged.totals.input_tokens,
                    merged.totals.output_tokens,
                    merged.totals.cost,
                )
                .await;
        }

        Ok(GenerationResult {
            request_id,
            identifier: unit.identifier,
            documentation: merged.documentation,
            input_tokens: merged.totals.input_tokens,
            output_tokens: merged.totals.output_tokens,
            cost: merged.totals.cost,
            was_cached: merged.all_cached,
            chunked: true,
            chunks: Some(merged.report),
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }
}

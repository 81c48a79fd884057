//! Bounded-parallel chunk processing and ordered merge.
//!
//! For each chunk, independently: look up the chunk fingerprint in the
//! cache; on a miss, call the backend through the retry controller. At most
//! `max_parallel` backend calls are in flight at once (a bounded pool, not
//! unbounded fan-out), sized to stay under the backend's concurrent-request
//! ceiling.
//!
//! Completion order is irrelevant: results are re-sorted by
//! `sequence_index` before merging, so chunk 0's documentation always
//! precedes chunk 1's even if chunk 3 finishes first. A chunk whose
//! generation fails permanently becomes a clearly marked placeholder
//! section; the merge itself never fails.

use std::collections::HashSet;

use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::backend::DocBackend;
use crate::cache::CacheLayer;
use crate::error::BackendError;
use crate::models::{Chunk, ChunkReport, CostAccumulator, CostRates};
use crate::retry::{call_with_retry, RetryPolicy};

/// Merged output of processing every chunk of one source unit.
#[derive(Debug)]
pub struct MergedOutput {
    pub documentation: String,
    pub totals: CostAccumulator,
    pub report: ChunkReport,
    /// True only if every chunk was an unexpired cache hit.
    pub all_cached: bool,
}

enum ChunkOutcome {
    Generated {
        documentation: String,
        input_tokens: u64,
        output_tokens: u64,
        cost: f64,
        cached: bool,
    },
    Failed {
        error: BackendError,
    },
}

struct ProcessedChunk {
    chunk: Chunk,
    outcome: ChunkOutcome,
}

/// Process all chunks of `identifier` and merge the results in
/// `sequence_index` order.
pub async fn process_chunks(
    backend: &dyn DocBackend,
    cache: &CacheLayer,
    retry: &RetryPolicy,
    rates: &CostRates,
    identifier: &str,
    chunks: Vec<Chunk>,
    max_parallel: usize,
) -> MergedOutput {
    let total_chunks = chunks.len();
    info!(identifier, total_chunks, max_parallel, "processing chunks");

    let mut processed: Vec<ProcessedChunk> =
        stream::iter(chunks.into_iter().map(|chunk| {
            process_single_chunk(backend, cache, retry, rates, identifier, chunk, total_chunks)
        }))
        .buffer_unordered(max_parallel.max(1))
        .collect()
        .await;

    // The one ordering guarantee the whole design depends on: merge order
    // is sequence_index order, independent of completion timing.
    processed.sort_by_key(|p| p.chunk.sequence_index);

    let mut totals = CostAccumulator::default();
    let mut cache_hits = 0usize;
    let mut cache_misses = 0usize;
    let mut failed_chunks = 0usize;

    for p in &processed {
        match &p.outcome {
            ChunkOutcome::Generated {
                input_tokens,
                output_tokens,
                cost,
                cached,
                ..
            } => {
                totals.add(*input_tokens, *output_tokens, *cost);
                if *cached {
                    cache_hits += 1;
                } else {
                    cache_misses += 1;
                }
            }
            ChunkOutcome::Failed { .. } => failed_chunks += 1,
        }
    }

    let all_cached = failed_chunks == 0 && cache_misses == 0 && total_chunks > 0;
    let documentation = merge_documentation(identifier, &processed);

    info!(
        identifier,
        cache_hits,
        cache_misses,
        failed_chunks,
        cost = totals.cost,
        "chunks processed"
    );

    MergedOutput {
        documentation,
        totals,
        report: ChunkReport {
            total_chunks,
            cache_hits,
            cache_misses,
            failed_chunks,
        },
        all_cached,
    }
}

async fn process_single_chunk(
    backend: &dyn DocBackend,
    cache: &CacheLayer,
    retry: &RetryPolicy,
    rates: &CostRates,
    identifier: &str,
    chunk: Chunk,
    total_chunks: usize,
) -> ProcessedChunk {
    if let Some(entry) = cache.get(&chunk.fingerprint).await {
        info!(
            identifier,
            sequence_index = chunk.sequence_index,
            "chunk cache hit"
        );
        return ProcessedChunk {
            outcome: ChunkOutcome::Generated {
                documentation: entry.documentation,
                input_tokens: entry.input_tokens,
                output_tokens: entry.output_tokens,
                cost: 0.0,
                cached: true,
            },
            chunk,
        };
    }

    let context = chunk_context(identifier, &chunk, total_chunks);
    let outcome = match call_with_retry(retry, || backend.generate(&chunk.content, Some(&context)))
        .await
    {
        Ok(response) => {
            let cost = rates.cost(response.input_tokens, response.output_tokens);
            cache
                .put(
                    &chunk.fingerprint,
                    &response.text,
                    response.input_tokens,
                    response.output_tokens,
                    cost,
                )
                .await;
            ChunkOutcome::Generated {
                documentation: response.text,
                input_tokens: response.input_tokens,
                output_tokens: response.output_tokens,
                cost,
                cached: false,
            }
        }
        Err(error) => {
            warn!(
                identifier,
                sequence_index = chunk.sequence_index,
                %error,
                "chunk generation exhausted; emitting placeholder"
            );
            ChunkOutcome::Failed { error }
        }
    };

    ProcessedChunk { chunk, outcome }
}

/// Continuity context handed to the backend alongside a chunk.
fn chunk_context(identifier: &str, chunk: &Chunk, total_chunks: usize) -> String {
    let contains = if chunk.unit_names.is_empty() {
        "code".to_string()
    } else {
        chunk.unit_names.join(", ")
    };
    format!(
        "This is section {} of {} of a larger file ({identifier}), \
         lines {}-{}. It contains: {contains}. Document only this section.",
        chunk.sequence_index + 1,
        total_chunks,
        chunk.start_line,
        chunk.end_line,
    )
}

/// Concatenate chunk documentation in sequence order under one heading,
/// stripping passages that re-describe a unit already covered by a strictly
/// earlier chunk (duplication introduced by the overlap window).
fn merge_documentation(identifier: &str, processed: &[ProcessedChunk]) -> String {
    let mut parts: Vec<String> = Vec::new();
    parts.push(format!("# Documentation: {identifier}"));
    parts.push(String::new());
    parts.push(format!(
        "*This file was processed in {} sections.*",
        processed.len()
    ));
    parts.push(String::new());

    let mut covered: HashSet<String> = HashSet::new();

    for p in processed {
        let chunk = &p.chunk;
        parts.push(format!(
            "## Section {}: lines {}-{}",
            chunk.sequence_index + 1,
            chunk.start_line,
            chunk.end_line
        ));
        parts.push(String::new());
        if !chunk.unit_names.is_empty() {
            parts.push(format!("*Contains: {}*", chunk.unit_names.join(", ")));
            parts.push(String::new());
        }

        match &p.outcome {
            ChunkOutcome::Generated { documentation, .. } => {
                let body = strip_leading_header(documentation);
                let body = strip_covered_sections(body, &covered);
                parts.push(body.trim().to_string());
            }
            ChunkOutcome::Failed { error } => {
                parts.push(format!(
                    "<!-- generation failed for lines {}-{} -->",
                    chunk.start_line, chunk.end_line
                ));
                parts.push(format!(
                    "> Documentation for this section could not be generated: {error}"
                ));
            }
        }

        parts.push(String::new());
        parts.push("---".to_string());
        parts.push(String::new());

        covered.extend(chunk.unit_names.iter().cloned());
    }

    parts.join("\n")
}

/// Drop a top-level `# ` header the model may have added, since the merge
/// supplies its own.
fn strip_leading_header(doc: &str) -> &str {
    let trimmed = doc.trim_start();
    if let Some(rest) = trimmed.strip_prefix("# ") {
        match rest.find('\n') {
            Some(pos) => &rest[pos + 1..],
            None => "",
        }
    } else {
        doc
    }
}

/// Remove heading-delimited blocks whose heading names an already-covered
/// unit. Best-effort string matching on identifier tokens.
fn strip_covered_sections(doc: &str, covered: &HashSet<String>) -> String {
    if covered.is_empty() {
        return doc.to_string();
    }

    let mut kept: Vec<&str> = Vec::new();
    let mut skipping = false;

    for line in doc.split('\n') {
        if line.starts_with('#') {
            skipping = heading_mentions_covered(line, covered);
        }
        if !skipping {
            kept.push(line);
        }
    }

    kept.join("\n")
}

fn heading_mentions_covered(heading: &str, covered: &HashSet<String>) -> bool {
    heading
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .any(|token| !token.is_empty() && covered.contains(token))
}

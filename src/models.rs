//! Core data types that flow through the generation pipeline.

use serde::Serialize;

/// One thing to be documented: a logical identifier plus its raw text.
///
/// The identifier is used for logging, ordering, and section headers only;
/// it does not need to be a real filesystem path.
#[derive(Debug, Clone)]
pub struct SourceUnit {
    pub identifier: String,
    pub content: String,
    pub size_lines: usize,
}

impl SourceUnit {
    pub fn new(identifier: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        let size_lines = content.split('\n').count();
        Self {
            identifier: identifier.into(),
            content,
            size_lines,
        }
    }
}

/// A syntactically bounded slice of a [`SourceUnit`].
///
/// `sequence_index` defines merge order and is never re-sorted by any other
/// key. `content` includes the configured overlap prefix from the previous
/// chunk; `start_line`/`end_line` describe the chunk's own (non-overlap)
/// line range in the original source, 1-indexed inclusive.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub sequence_index: usize,
    pub start_line: usize,
    pub end_line: usize,
    pub content: String,
    /// Names of the top-level units contained in this chunk, in source
    /// order. Used only for merge-time deduplication.
    pub unit_names: Vec<String>,
    /// SHA-256 hex of `content`; the chunk-level cache key.
    pub fingerprint: String,
}

impl Chunk {
    pub fn size_lines(&self) -> usize {
        self.end_line - self.start_line + 1
    }
}

/// Output of documenting one source unit.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationResult {
    pub request_id: String,
    pub identifier: String,
    /// Generated Markdown.
    pub documentation: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Dollars. Always `0.0` when `was_cached` is true; the token counts
    /// still reflect the original generation for reporting purposes.
    pub cost: f64,
    pub was_cached: bool,
    pub chunked: bool,
    pub chunks: Option<ChunkReport>,
    pub elapsed_ms: u64,
}

/// Per-chunk bookkeeping for a chunked generation.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkReport {
    pub total_chunks: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub failed_chunks: usize,
}

/// Token pricing, in dollars per million tokens.
#[derive(Debug, Clone, Copy)]
pub struct CostRates {
    pub input_per_mtok: f64,
    pub output_per_mtok: f64,
}

impl CostRates {
    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 / 1_000_000.0) * self.input_per_mtok
            + (output_tokens as f64 / 1_000_000.0) * self.output_per_mtok
    }
}

/// Explicit cost/token accumulator threaded through the pipeline.
///
/// A value, not a process-wide singleton, so concurrent requests never
/// cross-contaminate totals.
#[derive(Debug, Clone, Copy, Default)]
pub struct CostAccumulator {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: f64,
}

impl CostAccumulator {
    /// Record one generation. Cached results pass `cost = 0.0` but still
    /// contribute their original token counts.
    pub fn add(&mut self, input_tokens: u64, output_tokens: u64, cost: f64) {
        self.input_tokens += input_tokens;
        self.output_tokens += output_tokens;
        self.cost += cost;
    }

    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

//! # docsmith
//!
//! A documentation-generation pipeline for source files, built around an
//! LLM backend. Cost and latency are controlled with content-addressed
//! caching, boundary-aware chunking of oversized inputs, and bounded
//! exponential-backoff retry of rate-limited calls.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌──────────────┐   ┌─────────┐
//! │ Pipeline │──▶│ Splitter  │──▶│ Orchestrator │──▶│  Merge  │
//! │          │   │ (tree-    │   │ (bounded     │   │ (seq.   │
//! │          │   │  sitter)  │   │  pool+retry) │   │  order) │
//! └────┬─────┘   └───────────┘   └──────┬───────┘   └─────────┘
//!      │                                │
//!      ▼                                ▼
//! ┌──────────┐                   ┌──────────────┐
//! │  Cache   │◀──────────────────│   Backend    │
//! │ (SQLite) │                   │ (Anthropic)  │
//! └──────────┘                   └──────────────┘
//! ```
//!
//! Small files take a direct path: whole-file cache check, one backend
//! call through the retry controller. Large files are split at syntactic
//! unit boundaries, processed with bounded parallelism (each chunk cached
//! by its own fingerprint), and merged back in sequence order.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Error taxonomy and retry classification |
//! | [`fingerprint`] | SHA-256 content fingerprinting |
//! | [`splitter`] | Boundary-aware source splitting |
//! | [`backend`] | Documentation backend trait + Anthropic client |
//! | [`retry`] | Exponential-backoff retry controller |
//! | [`kv`] | Key-value store trait + SQLite/in-memory stores |
//! | [`cache`] | TTL cache layer with numeric normalization |
//! | [`orchestrator`] | Bounded-parallel chunk processing and merge |
//! | [`pipeline`] | Top-level generation entry point |

pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod kv;
pub mod models;
pub mod orchestrator;
pub mod pipeline;
pub mod retry;
pub mod splitter;

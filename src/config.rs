use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::models::CostRates;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub cache: CacheConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub processing: ProcessingConfig,
    #[serde(default)]
    pub pricing: PricingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    pub db_path: PathBuf,
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,
}

fn default_ttl_seconds() -> u64 {
    86_400
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Files longer than this are split; no produced chunk targets more
    /// lines than this (a single oversized unit may still exceed it).
    #[serde(default = "default_threshold_lines")]
    pub threshold_lines: usize,
    #[serde(default = "default_overlap_lines")]
    pub overlap_lines: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            threshold_lines: default_threshold_lines(),
            overlap_lines: default_overlap_lines(),
        }
    }
}

fn default_threshold_lines() -> usize {
    2000
}
fn default_overlap_lines() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    /// Per-attempt timeout; an elapsed attempt counts as a retryable failure.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            model: default_model(),
            max_output_tokens: default_max_output_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.anthropic.com/v1/messages".to_string()
}
fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}
fn default_max_output_tokens() -> u32 {
    4096
}
fn default_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}
fn default_base_delay_ms() -> u64 {
    1000
}
fn default_max_delay_ms() -> u64 {
    60_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProcessingConfig {
    /// Maximum concurrent in-flight backend calls during chunk processing.
    /// Sized to stay under the backend's concurrent-request ceiling.
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_parallel: default_max_parallel(),
        }
    }
}

fn default_max_parallel() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct PricingConfig {
    #[serde(default = "default_input_per_mtok")]
    pub input_per_mtok: f64,
    #[serde(default = "default_output_per_mtok")]
    pub output_per_mtok: f64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            input_per_mtok: default_input_per_mtok(),
            output_per_mtok: default_output_per_mtok(),
        }
    }
}

fn default_input_per_mtok() -> f64 {
    3.00
}
fn default_output_per_mtok() -> f64 {
    15.00
}

impl PricingConfig {
    pub fn rates(&self) -> CostRates {
        CostRates {
            input_per_mtok: self.input_per_mtok,
            output_per_mtok: self.output_per_mtok,
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.chunking.threshold_lines == 0 {
        anyhow::bail!("chunking.threshold_lines must be > 0");
    }

    if config.chunking.overlap_lines >= config.chunking.threshold_lines {
        anyhow::bail!("chunking.overlap_lines must be smaller than chunking.threshold_lines");
    }

    if config.retry.max_attempts == 0 {
        anyhow::bail!("retry.max_attempts must be >= 1");
    }

    if config.processing.max_parallel == 0 {
        anyhow::bail!("processing.max_parallel must be >= 1");
    }

    if config.cache.ttl_seconds == 0 {
        anyhow::bail!("cache.ttl_seconds must be > 0");
    }

    if config.pricing.input_per_mtok < 0.0 || config.pricing.output_per_mtok < 0.0 {
        anyhow::bail!("pricing rates must be non-negative");
    }

    Ok(config)
}

//! Configuration for graph construction.

use serde::Deserialize;

/// Construction settings.
///
/// Loaded from the `[build]` section of `insight.toml` or
/// `INSIGHT__BUILD__*` environment variables.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct BuildConfig {
    /// Rows per transaction.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Write entity types concurrently. Relationships still wait for all of
    /// them.
    #[serde(default)]
    pub parallel_entities: bool,

    /// Upper bound on entity types written at once in parallel mode.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_entities: usize,

    /// Replay a failed batch one row per transaction to find the bad rows.
    #[serde(default = "default_true")]
    pub isolate_failed_batches: bool,

    /// Delete every node and relationship before building.
    #[serde(default)]
    pub clear_before_build: bool,

    /// Query graph statistics after the build.
    #[serde(default = "default_true")]
    pub collect_statistics: bool,
}

fn default_batch_size() -> usize {
    1000
}

fn default_max_concurrent() -> usize {
    4
}

fn default_true() -> bool {
    true
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            parallel_entities: false,
            max_concurrent_entities: default_max_concurrent(),
            isolate_failed_batches: true,
            clear_before_build: false,
            collect_statistics: true,
        }
    }
}

impl BuildConfig {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_parallel_entities(mut self, parallel: bool) -> Self {
        self.parallel_entities = parallel;
        self
    }

    pub fn with_clear_before_build(mut self, clear: bool) -> Self {
        self.clear_before_build = clear;
        self
    }

    /// Batch size never drops below one row.
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.max(1)
    }
}

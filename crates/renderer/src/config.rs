//! Configuration settings for flush-time scheduling.
//!
//! Configuration can be loaded from environment variables or constructed
//! programmatically.

use std::env;

/// Default number of recorded ops an incoming op may try to merge with.
const DEFAULT_OP_LOOKBACK: usize = 10;

/// Default byte budget for cached static buffers (8 MiB).
const DEFAULT_STATIC_BUFFER_BUDGET: usize = 8 * 1024 * 1024;

/// Runtime configuration for the renderer core.
///
/// Controls op merging, the static buffer budget of the resource cache, and
/// diagnostic logging of destination reads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RendererConfig {
    /// How many previously recorded ops an incoming op may try to merge with.
    pub op_lookback: usize,
    /// Bytes of static buffers kept before unreferenced entries are purged.
    pub static_buffer_budget: usize,
    /// Whether every scheduled destination read is logged at execution time.
    pub log_dst_reads: bool,
}

impl RendererConfig {
    /// Construct a new `RendererConfig` with explicit values.
    ///
    /// # Arguments
    ///
    /// * `op_lookback` - Merge lookback in ops (minimum 1)
    /// * `static_buffer_budget` - Static buffer budget in bytes
    /// * `log_dst_reads` - Whether to log destination reads
    #[inline]
    #[must_use]
    pub const fn new(op_lookback: usize, static_buffer_budget: usize, log_dst_reads: bool) -> Self {
        let lookback = if op_lookback < 1 { 1 } else { op_lookback };
        Self {
            op_lookback: lookback,
            static_buffer_budget,
            log_dst_reads,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Reads the following environment variables:
    /// - `RENDERER_OP_LOOKBACK`: Merge lookback in ops (default: 10)
    /// - `RENDERER_STATIC_BUFFER_BUDGET`: Static buffer budget in bytes (default: 8 MiB)
    /// - `RENDERER_LOG_DST_READS`: Set to "1" to log destination reads (default: disabled)
    #[inline]
    #[must_use]
    pub fn from_env() -> Self {
        let op_lookback = env::var("RENDERER_OP_LOOKBACK")
            .ok()
            .and_then(|val| val.parse::<usize>().ok())
            .unwrap_or(DEFAULT_OP_LOOKBACK)
            .max(1);
        let static_buffer_budget = env::var("RENDERER_STATIC_BUFFER_BUDGET")
            .ok()
            .and_then(|val| val.parse::<usize>().ok())
            .unwrap_or(DEFAULT_STATIC_BUFFER_BUDGET);
        let log_dst_reads = env::var("RENDERER_LOG_DST_READS").ok().as_deref() == Some("1");
        Self {
            op_lookback,
            static_buffer_budget,
            log_dst_reads,
        }
    }
}

impl Default for RendererConfig {
    #[inline]
    fn default() -> Self {
        Self::new(DEFAULT_OP_LOOKBACK, DEFAULT_STATIC_BUFFER_BUDGET, false)
    }
}

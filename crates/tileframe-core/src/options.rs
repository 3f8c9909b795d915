//! Runtime I/O options for array handles.
//!
//! These are not persisted; two handles on the same array may use different
//! options.

use std::num::NonZeroUsize;

/// Controls how much tile-level parallelism a single read or write uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoOptions {
    /// Maximum number of tiles loaded, decoded or persisted concurrently by
    /// one call.
    pub tile_concurrency: NonZeroUsize,
}

impl IoOptions {
    /// Options with an explicit tile concurrency. Zero is clamped to one.
    pub fn with_tile_concurrency(tile_concurrency: usize) -> Self {
        IoOptions {
            tile_concurrency: NonZeroUsize::new(tile_concurrency).unwrap_or(NonZeroUsize::MIN),
        }
    }

    /// Resolve how many tiles to process concurrently for a call touching
    /// `tile_count` tiles.
    pub fn resolve_tile_concurrency(&self, tile_count: usize) -> usize {
        self.tile_concurrency.get().min(tile_count).max(1)
    }
}

impl Default for IoOptions {
    /// Twice the number of logical CPUs, since tile work mixes file I/O with
    /// decoding.
    fn default() -> Self {
        let logical_threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        IoOptions::with_tile_concurrency(logical_threads.saturating_mul(2))
    }
}

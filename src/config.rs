use std::time::Duration;

pub const PAGE_SIZE: usize = 4096;

/// Tunables for a [`crate::buffer::BufferPoolManager`] + [`crate::index::BPlusTree`]
/// + [`crate::lock::LockManager`] triple. Plain struct with a `Default` impl, the
/// same shape the rest of the crate uses for its small pieces of state — there is
/// no env-driven config layer here, just constructor arguments with sane defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Number of frames in the buffer pool.
    pub pool_size: usize,
    /// `K` for the LRU-K replacer.
    pub replacer_k: usize,
    /// How often the lock manager's background thread scans for cycles.
    pub cycle_detection_interval: Duration,
    /// Max `(key, child)` pairs per internal B+-tree page.
    pub internal_max_size: usize,
    /// The leaf fan-out parameter: a leaf page holds up to
    /// `leaf_max_size - 1` `(key, value)` pairs.
    pub leaf_max_size: usize,
    /// Directory backing the on-disk page store.
    pub storage_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pool_size: 64,
            replacer_k: 2,
            cycle_detection_interval: Duration::from_millis(50),
            internal_max_size: 5,
            leaf_max_size: 5,
            storage_path: "data/pages/".to_string(),
        }
    }
}

impl Config {
    pub fn new(pool_size: usize, replacer_k: usize) -> Self {
        Self {
            pool_size,
            replacer_k,
            ..Default::default()
        }
    }
}

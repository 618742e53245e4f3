//! LRU buffer cache owned by each layer.
//!
//! Buffers are keyed by (channel, region, resolution, delta fingerprint). At most
//! one buffer per key is live, and [`LayerCache::invalidate`] drops every entry
//! when the owning layer's parameters change. Eviction keeps both the entry
//! count and the total bytes within [`CacheLimits`].

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use image::RgbaImage;
use parking_lot::Mutex;

use crate::error::Result;
use crate::geo::{RegionKey, SampleGrid};
use crate::tilemap::Tilemap;

/// Default number of buffers kept per layer.
pub const DEFAULT_CACHE_CAPACITY: usize = 32;

/// Default byte budget per layer (256 MB).
pub const DEFAULT_CACHE_BUDGET_BYTES: usize = 256 * 1024 * 1024;

/// Size limits of one layer's cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheLimits {
    pub max_entries: usize,
    pub max_bytes: usize,
}

impl Default for CacheLimits {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_CACHE_CAPACITY,
            max_bytes: DEFAULT_CACHE_BUDGET_BYTES,
        }
    }
}

/// Which kind of buffer an entry holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferChannel {
    Scalar,
    Color,
}

/// Identity of a cached buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub channel: BufferChannel,
    pub region: RegionKey,
    pub res_x: usize,
    pub res_y: usize,
    /// Fingerprint of the per-call delta, 0 when none.
    pub delta: u64,
}

impl CacheKey {
    pub fn new(channel: BufferChannel, grid: &SampleGrid, delta: u64) -> Self {
        Self {
            channel,
            region: grid.region.key(),
            res_x: grid.resolution.x,
            res_y: grid.resolution.y,
            delta,
        }
    }
}

/// A cached layer buffer. Cloning shares the underlying raster.
#[derive(Clone, Debug)]
pub enum CachedBuffer {
    Scalar(Arc<Tilemap<f32>>),
    Color(Arc<RgbaImage>),
}

impl CachedBuffer {
    fn memory_bytes(&self) -> usize {
        match self {
            CachedBuffer::Scalar(grid) => grid.memory_bytes(),
            CachedBuffer::Color(img) => img.as_raw().len(),
        }
    }
}

/// Cache statistics for monitoring
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits
    pub hits: usize,
    /// Number of misses; every miss is one buffer computation
    pub misses: usize,
    /// Number of LRU evictions
    pub evictions: usize,
    /// Number of whole-cache invalidations
    pub invalidations: usize,
    /// Current number of cached buffers
    pub entries: usize,
    /// Estimated memory usage in bytes
    pub memory_bytes: usize,
}

impl CacheStats {
    /// Calculate hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f32 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f32 / total as f32
        }
    }

    /// Format as human-readable string
    pub fn summary(&self) -> String {
        format!(
            "Hits: {} | Misses: {} | Rate: {:.1}% | Buffers: {} | Mem: {:.1}MB",
            self.hits,
            self.misses,
            self.hit_rate() * 100.0,
            self.entries,
            self.memory_bytes as f32 / (1024.0 * 1024.0)
        )
    }
}

/// LRU cache of layer buffers.
#[derive(Debug)]
pub struct LayerCache {
    entries: HashMap<CacheKey, CachedBuffer>,
    /// LRU order (most recent at back)
    lru_order: VecDeque<CacheKey>,
    max_size: usize,
    max_bytes: usize,
    stats: CacheStats,
}

impl LayerCache {
    /// Entry-limited cache with the default byte budget.
    pub fn new(max_size: usize) -> Self {
        Self::with_limits(CacheLimits {
            max_entries: max_size,
            ..CacheLimits::default()
        })
    }

    pub fn with_limits(limits: CacheLimits) -> Self {
        let max_size = limits.max_entries.max(1);
        Self {
            entries: HashMap::with_capacity(max_size),
            lru_order: VecDeque::with_capacity(max_size),
            max_size,
            max_bytes: limits.max_bytes,
            stats: CacheStats::default(),
        }
    }

    fn touch(&mut self, key: CacheKey) {
        self.lru_order.retain(|k| *k != key);
        self.lru_order.push_back(key);
    }

    fn lookup(&mut self, key: &CacheKey) -> Option<CachedBuffer> {
        let hit = self.entries.get(key).cloned();
        if hit.is_some() {
            self.stats.hits += 1;
            self.touch(*key);
            tracing::debug!(?key, "layer cache hit");
        }
        hit
    }

    fn evict_oldest(&mut self) -> bool {
        let Some(old_key) = self.lru_order.pop_front() else {
            return false;
        };
        if let Some(old) = self.entries.remove(&old_key) {
            self.stats.memory_bytes -= old.memory_bytes();
        }
        self.stats.evictions += 1;
        true
    }

    fn insert(&mut self, key: CacheKey, buffer: CachedBuffer) {
        if let Some(replaced) = self.entries.remove(&key) {
            self.stats.memory_bytes -= replaced.memory_bytes();
            self.lru_order.retain(|k| *k != key);
        }
        let bytes = buffer.memory_bytes();
        if bytes > self.max_bytes {
            // Larger than the whole budget: hand it out uncached.
            tracing::debug!(?key, bytes, budget = self.max_bytes, "buffer exceeds cache budget");
            self.stats.entries = self.entries.len();
            return;
        }
        while self.entries.len() >= self.max_size
            || self.stats.memory_bytes + bytes > self.max_bytes
        {
            if !self.evict_oldest() {
                break;
            }
        }
        self.stats.memory_bytes += bytes;
        self.entries.insert(key, buffer);
        self.lru_order.push_back(key);
        self.stats.entries = self.entries.len();
    }

    pub fn get_scalar(&mut self, key: &CacheKey) -> Option<Arc<Tilemap<f32>>> {
        match self.lookup(key) {
            Some(CachedBuffer::Scalar(grid)) => Some(grid),
            _ => None,
        }
    }

    pub fn get_color(&mut self, key: &CacheKey) -> Option<Arc<RgbaImage>> {
        match self.lookup(key) {
            Some(CachedBuffer::Color(img)) => Some(img),
            _ => None,
        }
    }

    /// Store a freshly computed scalar buffer. Counts as a miss.
    pub fn insert_scalar(&mut self, key: CacheKey, grid: Tilemap<f32>) -> Arc<Tilemap<f32>> {
        self.stats.misses += 1;
        let grid = Arc::new(grid);
        self.insert(key, CachedBuffer::Scalar(Arc::clone(&grid)));
        grid
    }

    /// Store a freshly computed color buffer. Counts as a miss.
    pub fn insert_color(&mut self, key: CacheKey, img: RgbaImage) -> Arc<RgbaImage> {
        self.stats.misses += 1;
        let img = Arc::new(img);
        self.insert(key, CachedBuffer::Color(Arc::clone(&img)));
        img
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Drop every cached buffer.
    pub fn invalidate(&mut self) {
        if !self.entries.is_empty() {
            tracing::debug!(entries = self.entries.len(), "invalidating layer cache");
        }
        self.entries.clear();
        self.lru_order.clear();
        self.stats.invalidations += 1;
        self.stats.entries = 0;
        self.stats.memory_bytes = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}

impl Default for LayerCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

/// A layer's cache behind its own mutex.
///
/// The lock is only held for lookups and inserts, never while a buffer is being
/// computed, so a computation may query other buffers of the same layer.
#[derive(Debug, Default)]
pub struct SharedCache {
    inner: Mutex<LayerCache>,
}

impl SharedCache {
    pub fn new(max_size: usize) -> Self {
        Self {
            inner: Mutex::new(LayerCache::new(max_size)),
        }
    }

    pub fn with_limits(limits: CacheLimits) -> Self {
        Self {
            inner: Mutex::new(LayerCache::with_limits(limits)),
        }
    }

    pub fn scalar<F>(&self, key: CacheKey, compute: F) -> Result<Arc<Tilemap<f32>>>
    where
        F: FnOnce() -> Result<Tilemap<f32>>,
    {
        let hit = self.inner.lock().get_scalar(&key);
        if let Some(grid) = hit {
            return Ok(grid);
        }
        tracing::debug!(?key, "layer cache miss");
        let grid = compute()?;
        Ok(self.inner.lock().insert_scalar(key, grid))
    }

    pub fn color<F>(&self, key: CacheKey, compute: F) -> Result<Arc<RgbaImage>>
    where
        F: FnOnce() -> Result<RgbaImage>,
    {
        let hit = self.inner.lock().get_color(&key);
        if let Some(img) = hit {
            return Ok(img);
        }
        tracing::debug!(?key, "layer cache miss");
        let img = compute()?;
        Ok(self.inner.lock().insert_color(key, img))
    }

    pub fn invalidate(&self) {
        self.inner.lock().invalidate();
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

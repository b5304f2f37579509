//! Thumbnail cache for previews.
//!
//! Decoding and downscaling a full-size photo to a 120px preview is the
//! slowest thing a file list does, and the same previews are requested over
//! and over while a user scrolls. [`ThumbnailCache`] keeps the most recently
//! used previews in memory, bounded both by entry count and by pixel bytes.
//!
//! # Design
//!
//! ## Keys
//!
//! Entries are keyed by `(source_path, max_dimension)`, so the same file can be
//! cached at several preview sizes. Paths are used exactly as given; callers
//! that invalidate must pass the same path form they requested with.
//!
//! ## Eviction
//!
//! Every access stamps the entry with a logical tick from a counter that only
//! grows. A `BTreeMap<tick, key>` reverse index makes the least recently used
//! entry the first key of the map, so eviction is a `pop_first`.
//!
//! A bitmap larger than the whole byte budget is returned to the caller but
//! never inserted.
//!
//! ## Concurrency
//!
//! All bookkeeping sits behind one mutex. Decoding happens outside it, and an
//! entry is only inserted once its bitmap is fully built, so readers never see
//! a partial entry. Two threads missing the same key at once both decode; the
//! later insert replaces the earlier one.
//!
//! A miss records the path's generation before decoding. [`invalidate`] and
//! [`clear`] bump it, and an insert whose generation is stale hands its bitmap
//! back uncached, so a decode racing an invalidation never resurrects the old
//! preview.
//!
//! [`invalidate`]: ThumbnailCache::invalidate
//! [`clear`]: ThumbnailCache::clear

use crate::imaging::operations::thumbnail;
use crate::imaging::{ImageBuffer, ReadError, read_image};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ThumbnailError {
    #[error(transparent)]
    Read(#[from] ReadError),
    #[error("thumbnail size must be at least 1px")]
    ZeroDimension,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ThumbnailKey {
    pub source_path: PathBuf,
    pub max_dimension: u32,
}

#[derive(Debug, Clone)]
pub struct ThumbnailEntry {
    pub key: ThumbnailKey,
    pub bitmap: ImageBuffer,
    /// Logical access tick; larger means more recent.
    pub last_access: u64,
}

/// Counters for one cache's lifetime.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Misses whose bitmap exceeded the byte budget and were not stored.
    pub uncached: u64,
}

impl CacheStats {
    pub fn total(&self) -> u64 {
        self.hits + self.misses
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.total() == 0 {
            return write!(f, "no lookups");
        }
        write!(
            f,
            "{} cached, {} generated ({} total)",
            self.hits,
            self.misses,
            self.total()
        )?;
        if self.evictions > 0 {
            write!(f, ", {} evicted", self.evictions)?;
        }
        if self.uncached > 0 {
            write!(f, ", {} too large to keep", self.uncached)?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<ThumbnailKey, ThumbnailEntry>,
    by_access: BTreeMap<u64, ThumbnailKey>,
    tick: u64,
    total_bytes: usize,
    stats: CacheStats,
    /// Bumped by `clear`.
    epoch: u64,
    /// Per-path invalidation counts.
    invalidations: HashMap<PathBuf, u64>,
}

/// What a miss saw before it started decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Generation {
    epoch: u64,
    invalidations: u64,
}

impl Inner {
    fn generation(&self, path: &Path) -> Generation {
        Generation {
            epoch: self.epoch,
            invalidations: self.invalidations.get(path).copied().unwrap_or(0),
        }
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn remove(&mut self, key: &ThumbnailKey) -> Option<ThumbnailEntry> {
        let entry = self.entries.remove(key)?;
        self.by_access.remove(&entry.last_access);
        self.total_bytes -= entry.bitmap.byte_len();
        Some(entry)
    }

    fn evict_lru(&mut self) -> bool {
        let Some((_, key)) = self.by_access.pop_first() else {
            return false;
        };
        if let Some(entry) = self.entries.remove(&key) {
            self.total_bytes -= entry.bitmap.byte_len();
            self.stats.evictions += 1;
            log::debug!("thumbnail evicted: {}@{}", key.source_path.display(), key.max_dimension);
        }
        true
    }
}

/// Bounded, thread-safe LRU cache of scaled previews.
#[derive(Debug)]
pub struct ThumbnailCache {
    max_entries: usize,
    max_bytes: usize,
    inner: Mutex<Inner>,
}

impl ThumbnailCache {
    pub fn new(max_entries: usize, max_bytes: usize) -> Self {
        Self {
            max_entries,
            max_bytes,
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // The bookkeeping is consistent after every statement, so a panic in
        // another holder leaves nothing half-updated.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_bytes(&self) -> usize {
        self.lock().total_bytes
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats
    }

    pub fn contains(&self, path: &Path, max_dimension: u32) -> bool {
        let key = ThumbnailKey {
            source_path: path.to_path_buf(),
            max_dimension,
        };
        self.lock().entries.contains_key(&key)
    }

    /// Snapshot of the cached entries, least recently used first.
    pub fn entries(&self) -> Vec<ThumbnailEntry> {
        let inner = self.lock();
        inner
            .by_access
            .values()
            .filter_map(|key| inner.entries.get(key).cloned())
            .collect()
    }

    /// Return the preview for `path`, generating and caching it on a miss.
    pub fn get_or_create(&self, path: &Path, max_dimension: u32) -> Result<ImageBuffer, ThumbnailError> {
        if max_dimension == 0 {
            return Err(ThumbnailError::ZeroDimension);
        }
        let key = ThumbnailKey {
            source_path: path.to_path_buf(),
            max_dimension,
        };

        let seen = match self.touch(&key) {
            Ok(hit) => return Ok(hit),
            Err(seen) => seen,
        };

        let source = read_image(path)?;
        let bitmap = thumbnail(&source, max_dimension);
        self.insert(key, bitmap.clone(), seen);
        Ok(bitmap)
    }

    /// The cached bitmap, or the generation a miss must insert under.
    fn touch(&self, key: &ThumbnailKey) -> Result<ImageBuffer, Generation> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let tick = inner.next_tick();
        let Some(entry) = inner.entries.get_mut(key) else {
            inner.stats.misses += 1;
            return Err(inner.generation(&key.source_path));
        };
        let previous = std::mem::replace(&mut entry.last_access, tick);
        let bitmap = entry.bitmap.clone();
        inner.by_access.remove(&previous);
        inner.by_access.insert(tick, key.clone());
        inner.stats.hits += 1;
        log::debug!("thumbnail hit: {}@{}", key.source_path.display(), key.max_dimension);
        Ok(bitmap)
    }

    fn insert(&self, key: ThumbnailKey, bitmap: ImageBuffer, seen: Generation) {
        let size = bitmap.byte_len();
        let mut inner = self.lock();
        if inner.generation(&key.source_path) != seen {
            log::debug!(
                "thumbnail invalidated while decoding, not cached: {}",
                key.source_path.display()
            );
            return;
        }
        if size > self.max_bytes || self.max_entries == 0 {
            inner.stats.uncached += 1;
            log::debug!(
                "thumbnail not cached ({size} bytes > {} budget): {}",
                self.max_bytes,
                key.source_path.display()
            );
            return;
        }
        inner.remove(&key);
        while inner.entries.len() + 1 > self.max_entries || inner.total_bytes + size > self.max_bytes {
            if !inner.evict_lru() {
                break;
            }
        }
        let tick = inner.next_tick();
        inner.by_access.insert(tick, key.clone());
        inner.total_bytes += size;
        inner.entries.insert(
            key.clone(),
            ThumbnailEntry {
                key,
                bitmap,
                last_access: tick,
            },
        );
    }

    /// Drop every cached size of `path`. Returns how many entries were removed.
    pub fn invalidate(&self, path: &Path) -> usize {
        let mut inner = self.lock();
        *inner.invalidations.entry(path.to_path_buf()).or_default() += 1;
        let keys: Vec<ThumbnailKey> = inner
            .entries
            .keys()
            .filter(|k| k.source_path == path)
            .cloned()
            .collect();
        for key in &keys {
            inner.remove(key);
        }
        if !keys.is_empty() {
            log::debug!("thumbnail invalidated {} entries for {}", keys.len(), path.display());
        }
        keys.len()
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.epoch += 1;
        inner.invalidations.clear();
        inner.entries.clear();
        inner.by_access.clear();
        inner.total_bytes = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::write_test_image;
    use tempfile::TempDir;

    /// Bytes of an RGB preview of a 40x30 source at 20px: 20x15x3.
    const PREVIEW_BYTES: usize = 20 * 15 * 3;

    fn sources(dir: &Path, n: usize) -> Vec<PathBuf> {
        (0..n)
            .map(|i| write_test_image(dir, &format!("img{i}.png"), 40, 30))
            .collect()
    }

    // =========================================================================
    // Hits and misses
    // =========================================================================

    #[test]
    fn miss_then_hit() {
        let tmp = TempDir::new().unwrap();
        let paths = sources(tmp.path(), 1);
        let cache = ThumbnailCache::new(10, 1 << 20);

        let first = cache.get_or_create(&paths[0], 20).unwrap();
        assert_eq!(first.dimensions(), (20, 15));
        let second = cache.get_or_create(&paths[0], 20).unwrap();
        assert!(second.shares_pixels_with(&first));

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
        assert_eq!(cache.total_bytes(), PREVIEW_BYTES);
    }

    #[test]
    fn sizes_are_cached_separately() {
        let tmp = TempDir::new().unwrap();
        let paths = sources(tmp.path(), 1);
        let cache = ThumbnailCache::new(10, 1 << 20);
        cache.get_or_create(&paths[0], 20).unwrap();
        cache.get_or_create(&paths[0], 10).unwrap();
        assert_eq!(cache.len(), 2);
        assert!(cache.contains(&paths[0], 10));
    }

    #[test]
    fn never_upscales() {
        let tmp = TempDir::new().unwrap();
        let paths = sources(tmp.path(), 1);
        let cache = ThumbnailCache::new(10, 1 << 20);
        assert_eq!(cache.get_or_create(&paths[0], 500).unwrap().dimensions(), (40, 30));
    }

    #[test]
    fn unreadable_source_errors_and_caches_nothing() {
        let tmp = TempDir::new().unwrap();
        let cache = ThumbnailCache::new(10, 1 << 20);
        let err = cache.get_or_create(&tmp.path().join("gone.png"), 20).unwrap_err();
        assert!(matches!(err, ThumbnailError::Read(_)));
        assert!(cache.is_empty());
        assert!(matches!(
            cache.get_or_create(&tmp.path().join("gone.png"), 0),
            Err(ThumbnailError::ZeroDimension)
        ));
    }

    // =========================================================================
    // Eviction
    // =========================================================================

    #[test]
    fn evicts_least_recently_used_by_count() {
        let tmp = TempDir::new().unwrap();
        let paths = sources(tmp.path(), 3);
        let cache = ThumbnailCache::new(2, 1 << 20);

        cache.get_or_create(&paths[0], 20).unwrap();
        cache.get_or_create(&paths[1], 20).unwrap();
        // Touch 0 so 1 becomes the oldest.
        cache.get_or_create(&paths[0], 20).unwrap();
        cache.get_or_create(&paths[2], 20).unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.contains(&paths[0], 20));
        assert!(!cache.contains(&paths[1], 20));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn evicts_by_bytes() {
        let tmp = TempDir::new().unwrap();
        let paths = sources(tmp.path(), 3);
        let cache = ThumbnailCache::new(100, PREVIEW_BYTES * 2);
        for p in &paths {
            cache.get_or_create(p, 20).unwrap();
        }
        assert_eq!(cache.len(), 2);
        assert!(cache.total_bytes() <= PREVIEW_BYTES * 2);
        assert!(!cache.contains(&paths[0], 20));
    }

    #[test]
    fn oversized_bitmap_returned_but_not_cached() {
        let tmp = TempDir::new().unwrap();
        let paths = sources(tmp.path(), 2);
        let cache = ThumbnailCache::new(10, PREVIEW_BYTES);
        cache.get_or_create(&paths[0], 20).unwrap();

        let big = cache.get_or_create(&paths[1], 40).unwrap();
        assert_eq!(big.dimensions(), (40, 30));
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&paths[0], 20));
        assert_eq!(cache.stats().uncached, 1);
    }

    #[test]
    fn entries_are_ordered_by_access() {
        let tmp = TempDir::new().unwrap();
        let paths = sources(tmp.path(), 2);
        let cache = ThumbnailCache::new(10, 1 << 20);
        cache.get_or_create(&paths[0], 20).unwrap();
        cache.get_or_create(&paths[1], 20).unwrap();
        cache.get_or_create(&paths[0], 20).unwrap();
        let entries = cache.entries();
        assert_eq!(entries[0].key.source_path, paths[1]);
        assert!(entries[0].last_access < entries[1].last_access);
    }

    // =========================================================================
    // Invalidation
    // =========================================================================

    #[test]
    fn invalidate_removes_every_size() {
        let tmp = TempDir::new().unwrap();
        let paths = sources(tmp.path(), 2);
        let cache = ThumbnailCache::new(10, 1 << 20);
        cache.get_or_create(&paths[0], 20).unwrap();
        cache.get_or_create(&paths[0], 10).unwrap();
        cache.get_or_create(&paths[1], 20).unwrap();

        assert_eq!(cache.invalidate(&paths[0]), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.invalidate(&paths[0]), 0);
        assert_eq!(cache.total_bytes(), PREVIEW_BYTES);
    }

    #[test]
    fn decode_racing_invalidate_is_not_cached() {
        let tmp = TempDir::new().unwrap();
        let path = write_test_image(tmp.path(), "edited.png", 300, 150);
        let cache = ThumbnailCache::new(10, 1 << 20);
        let key = ThumbnailKey {
            source_path: path.clone(),
            max_dimension: 100,
        };

        // A miss starts decoding the old file...
        let seen = cache.touch(&key).unwrap_err();
        let stale = thumbnail(&read_image(&path).unwrap(), 100);
        // ...while the file is rewritten and invalidated.
        write_test_image(tmp.path(), "edited.png", 100, 400);
        cache.invalidate(&path);
        cache.insert(key, stale, seen);

        assert!(!cache.contains(&path, 100));
        assert_eq!(cache.get_or_create(&path, 100).unwrap().dimensions(), (25, 100));
    }

    #[test]
    fn decode_racing_clear_is_not_cached() {
        let tmp = TempDir::new().unwrap();
        let paths = sources(tmp.path(), 1);
        let cache = ThumbnailCache::new(10, 1 << 20);
        let key = ThumbnailKey {
            source_path: paths[0].clone(),
            max_dimension: 20,
        };

        let seen = cache.touch(&key).unwrap_err();
        cache.clear();
        cache.insert(key, thumbnail(&read_image(&paths[0]).unwrap(), 20), seen);
        assert!(cache.is_empty());
    }

    #[test]
    fn invalidating_one_path_keeps_other_inserts() {
        let tmp = TempDir::new().unwrap();
        let paths = sources(tmp.path(), 2);
        let cache = ThumbnailCache::new(10, 1 << 20);
        let key = ThumbnailKey {
            source_path: paths[1].clone(),
            max_dimension: 20,
        };

        let seen = cache.touch(&key).unwrap_err();
        cache.invalidate(&paths[0]);
        cache.insert(key, thumbnail(&read_image(&paths[1]).unwrap(), 20), seen);
        assert!(cache.contains(&paths[1], 20));
    }

    #[test]
    fn clear_empties_cache() {
        let tmp = TempDir::new().unwrap();
        let paths = sources(tmp.path(), 1);
        let cache = ThumbnailCache::new(10, 1 << 20);
        cache.get_or_create(&paths[0], 20).unwrap();
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.total_bytes(), 0);
    }

    // =========================================================================
    // Concurrency
    // =========================================================================

    #[test]
    fn concurrent_access_stays_within_budget() {
        use rayon::prelude::*;

        let tmp = TempDir::new().unwrap();
        let paths = sources(tmp.path(), 8);
        let cache = ThumbnailCache::new(3, PREVIEW_BYTES * 3);

        (0..200usize).into_par_iter().for_each(|i| {
            let thumb = cache.get_or_create(&paths[i % paths.len()], 20).unwrap();
            assert_eq!(thumb.dimensions(), (20, 15));
            assert!(cache.len() <= 3);
            assert!(cache.total_bytes() <= PREVIEW_BYTES * 3);
        });

        let stats = cache.stats();
        assert_eq!(stats.total(), 200);
        assert!(stats.misses >= 8);
    }

    // =========================================================================
    // CacheStats
    // =========================================================================

    #[test]
    fn cache_stats_display_with_hits() {
        let s = CacheStats {
            hits: 5,
            misses: 2,
            ..CacheStats::default()
        };
        assert_eq!(format!("{}", s), "5 cached, 2 generated (7 total)");
    }

    #[test]
    fn cache_stats_display_with_evictions() {
        let s = CacheStats {
            hits: 1,
            misses: 4,
            evictions: 2,
            uncached: 1,
        };
        assert_eq!(
            format!("{}", s),
            "1 cached, 4 generated (5 total), 2 evicted, 1 too large to keep"
        );
    }

    #[test]
    fn cache_stats_display_empty() {
        assert_eq!(format!("{}", CacheStats::default()), "no lookups");
    }
}

//! Segmented LRU cache for rendered mirror lists.
//!
//! The byte capacity is split evenly across segments. A key always maps to
//! the same segment, and each segment evicts its least recently used entries
//! until a new entry fits. Expired entries are dropped when they are read.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;

const DEFAULT_SEGMENTS: usize = 16;

struct CacheEntry {
    body: Bytes,
    expires_at: Option<Instant>,
    size: usize,
}

struct Segment {
    entries: LruCache<String, CacheEntry>,
    used: usize,
    capacity: usize,
}

impl Segment {
    fn remove(&mut self, key: &str) {
        if let Some(old) = self.entries.pop(key) {
            self.used -= old.size;
        }
    }

    fn make_room(&mut self, needed: usize) {
        while self.used + needed > self.capacity {
            match self.entries.pop_lru() {
                Some((_, evicted)) => self.used -= evicted.size,
                None => break,
            }
        }
    }
}

/// Counters exposed through the admin API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: u64,
    pub hits: u64,
    pub misses: u64,
    pub lookups: u64,
}

/// Thread-safe response cache with per-entry TTL
pub struct ResponseCache {
    segments: Vec<Mutex<Segment>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResponseCache {
    /// Create a cache holding at most `capacity` bytes
    pub fn new(capacity: usize) -> Self {
        Self::with_segments(capacity, DEFAULT_SEGMENTS)
    }

    pub fn with_segments(capacity: usize, segments: usize) -> Self {
        let segments = segments.max(1);
        let per_segment = capacity / segments;

        Self {
            segments: (0..segments)
                .map(|_| {
                    Mutex::new(Segment {
                        entries: LruCache::unbounded(),
                        used: 0,
                        capacity: per_segment,
                    })
                })
                .collect(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn segment(&self, key: &str) -> &Mutex<Segment> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let index = (hasher.finish() as usize) % self.segments.len();
        &self.segments[index]
    }

    /// Look up a live entry, counting the hit or miss
    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.get_at(key, Instant::now())
    }

    fn get_at(&self, key: &str, now: Instant) -> Option<Bytes> {
        let mut segment = self.segment(key).lock();

        let lookup = segment
            .entries
            .get(key)
            .map(|entry| (entry.body.clone(), entry.expires_at.is_none_or(|at| now < at)));

        let body = match lookup {
            Some((body, true)) => Some(body),
            Some((_, false)) => {
                segment.remove(key);
                None
            }
            None => None,
        };

        if body.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        body
    }

    /// Store an entry. A zero `ttl` never expires. Returns false if the
    /// entry is larger than a segment and was not stored.
    pub fn set(&self, key: &str, body: Bytes, ttl: Duration) -> bool {
        let size = key.len() + body.len();
        let expires_at = if ttl.is_zero() {
            None
        } else {
            Some(Instant::now() + ttl)
        };

        let mut segment = self.segment(key).lock();
        if size > segment.capacity {
            return false;
        }

        segment.remove(key);
        segment.make_room(size);
        segment.used += size;
        segment.entries.put(
            key.to_string(),
            CacheEntry {
                body,
                expires_at,
                size,
            },
        );
        true
    }

    /// Drop every entry. Counters are kept.
    pub fn clear(&self) {
        for segment in &self.segments {
            let mut segment = segment.lock();
            segment.entries.clear();
            segment.used = 0;
        }
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self
            .segments
            .iter()
            .map(|s| s.lock().entries.len() as u64)
            .sum();
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);

        CacheStats {
            entries,
            hits,
            misses,
            lookups: hits + misses,
        }
    }

    /// Bytes currently held across all segments
    pub fn used_bytes(&self) -> usize {
        self.segments.iter().map(|s| s.lock().used).sum()
    }
}

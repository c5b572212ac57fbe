//! Memoized classification results
//!
//! Entries are keyed by file path and validated on every read against two
//! things: the file's current fingerprint (size + mtime) and the current
//! version of its resolving scope. Either mismatch makes the entry stale and
//! the read a miss, so configuration edits invalidate lazily without walking
//! the tree.
//!
//! Capacity is bounded; when full, the least recently used entry (by atomic
//! access stamp) is evicted. Concurrent misses for one path are coalesced
//! through a per-path flight lock so at most one computation runs at a time.

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fs;
use std::hash::{Hash, Hasher};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use crate::classify::Tier;
use crate::resolver::ScopeVersion;

pub const DEFAULT_CACHE_CAPACITY: usize = 4096;

/// Cheap proxy for "have this file's bytes changed": size plus mtime in
/// nanoseconds. When the platform reports no usable mtime, the stamp is a
/// hash of the content instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Fingerprint {
  pub size: u64,
  pub stamp: u128,
}

impl Fingerprint {
  /// Fingerprint `path` from filesystem metadata.
  pub fn of(path: &Path) -> io::Result<Self> {
    let meta = fs::metadata(path)?;
    let mtime_ns = meta
      .modified()
      .ok()
      .and_then(|mtime| mtime.duration_since(UNIX_EPOCH).ok())
      .map(|since_epoch| since_epoch.as_nanos());
    match mtime_ns {
      Some(stamp) => Ok(Self { size: meta.len(), stamp }),
      None => {
        let content = fs::read(path)?;
        Ok(Self::of_content(&content))
      }
    }
  }

  /// Fingerprint from raw content, for platforms without reliable mtimes.
  pub fn of_content(content: &[u8]) -> Self {
    let mut hasher = DefaultHasher::new();
    content.hash(&mut hasher);
    Self { size: content.len() as u64, stamp: u128::from(hasher.finish()) }
  }
}

/// A committed classification result.
///
/// Valid only while the file's fingerprint and its resolving scope's version
/// both still match; entries are written whole after a completed computation
/// and never partially.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheEntry {
  pub path: PathBuf,
  pub fingerprint: Fingerprint,
  pub line_count: u32,
  pub tier: Tier,
  pub resolving_scope: Option<PathBuf>,
  pub resolving_scope_version: ScopeVersion,
}

struct Slot {
  entry: CacheEntry,
  last_access: AtomicU64,
}

pub struct ClassificationCache {
  entries: DashMap<PathBuf, Slot>,
  capacity: usize,
  clock: AtomicU64,
  /// Per-path flight locks for single-flight computation.
  in_flight: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl ClassificationCache {
  pub fn new(capacity: usize) -> Self {
    Self {
      entries: DashMap::new(),
      capacity: capacity.max(1),
      clock: AtomicU64::new(0),
      in_flight: Mutex::new(HashMap::new()),
    }
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Look up `path`, returning the entry only if it is still valid against
  /// the file's current fingerprint and its resolving scope's current
  /// version.
  ///
  /// A stale entry is left in place: removing it here races a single-flight
  /// winner committing a fresh one. The recompute overwrites the same key,
  /// and an entry nobody hits stops being touched and ages out through LRU.
  pub fn get(
    &self,
    path: &Path,
    fingerprint: Fingerprint,
    resolving_scope: Option<&Path>,
    resolving_scope_version: ScopeVersion,
  ) -> Option<CacheEntry> {
    let slot = self.entries.get(path)?;
    let entry = &slot.entry;
    if entry.fingerprint == fingerprint
      && entry.resolving_scope.as_deref() == resolving_scope
      && entry.resolving_scope_version == resolving_scope_version
    {
      slot.last_access.store(self.tick(), Ordering::Relaxed);
      return Some(entry.clone());
    }
    None
  }

  /// Commit a fully-computed entry, evicting down to capacity.
  pub fn insert(&self, entry: CacheEntry) {
    let path = entry.path.clone();
    let slot = Slot { entry, last_access: AtomicU64::new(self.tick()) };
    self.entries.insert(path, slot);
    self.evict_to_capacity();
  }

  pub fn remove(&self, path: &Path) {
    self.entries.remove(path);
  }

  /// Flight lock for `path`: holders serialize computation for one path so
  /// concurrent misses share a single computation's committed result.
  pub fn flight_lock(&self, path: &Path) -> Arc<Mutex<()>> {
    let mut flights = self.in_flight.lock();
    if flights.len() > self.capacity {
      // Drop locks nobody holds; active flights keep their Arc alive.
      flights.retain(|_, lock| Arc::strong_count(lock) > 1);
    }
    Arc::clone(flights.entry(path.to_path_buf()).or_insert_with(|| Arc::new(Mutex::new(()))))
  }

  fn tick(&self) -> u64 {
    self.clock.fetch_add(1, Ordering::Relaxed) + 1
  }

  fn evict_to_capacity(&self) {
    while self.entries.len() > self.capacity {
      let victim = self
        .entries
        .iter()
        .min_by_key(|slot| slot.last_access.load(Ordering::Relaxed))
        .map(|slot| slot.key().clone());
      match victim {
        Some(path) => {
          self.entries.remove(&path);
          tracing::debug!(path = %path.display(), "evicted least recently used cache entry");
        }
        None => break,
      }
    }
  }
}

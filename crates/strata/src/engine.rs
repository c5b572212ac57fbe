//! The engine consumers talk to
//!
//! One [`Strata`] instance per opened workspace set: it wires the resolver
//! and cache together, ingests watcher events, and exposes the read surface
//! (effective settings, per-file classification, whole-tree scans). Teardown
//! is dropping the instance.

use dashmap::DashMap;
use globset::GlobSet;
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use walkdir::WalkDir;

use crate::cache::{CacheEntry, ClassificationCache, Fingerprint, DEFAULT_CACHE_CAPACITY};
use crate::classify::{build_exclude_set, classify, Tier};
use crate::error::ClassifyError;
use crate::events::ChangeEvent;
use crate::fragment::is_fragment_path;
use crate::resolver::{ConfigResolver, EffectiveSettings, ScopeVersion};
use crate::store::SettingsStore;

pub type ScopeVersionListener = Box<dyn Fn(&Path, ScopeVersion) + Send + Sync>;

/// Outcome of classifying one file during a scan.
enum ScanOutcome {
  Classified(CacheEntry),
  Excluded,
  Failed(std::io::Error),
  Cancelled,
}

/// Result of a whole-tree scan.
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct ScanReport {
  pub entries: Vec<CacheEntry>,
  /// Files dropped by exclude patterns; never counted or cached.
  pub excluded: usize,
  /// Per-file failures; these never abort the rest of the scan.
  pub errors: Vec<(PathBuf, String)>,
  /// Files not reached before cancellation. Not errors.
  pub unclassified: Vec<PathBuf>,
}

impl ScanReport {
  pub fn tier_count(&self, tier: Tier) -> usize {
    self.entries.iter().filter(|entry| entry.tier == tier).count()
  }
}

pub struct Strata {
  resolver: ConfigResolver,
  cache: ClassificationCache,
  /// Compiled exclude sets memoized per pattern vector; cleared whenever a
  /// fragment changes.
  exclude_sets: DashMap<Vec<String>, GlobSet>,
  listeners: Mutex<Vec<ScopeVersionListener>>,
}

impl Strata {
  pub fn new(roots: Vec<PathBuf>, store: Arc<dyn SettingsStore>) -> Self {
    Self::with_cache_capacity(roots, store, DEFAULT_CACHE_CAPACITY)
  }

  pub fn with_cache_capacity(
    roots: Vec<PathBuf>,
    store: Arc<dyn SettingsStore>,
    capacity: usize,
  ) -> Self {
    Self {
      resolver: ConfigResolver::new(roots, store),
      cache: ClassificationCache::new(capacity),
      exclude_sets: DashMap::new(),
      listeners: Mutex::new(Vec::new()),
    }
  }

  pub fn resolver(&self) -> &ConfigResolver {
    &self.resolver
  }

  /// Resolved settings for `path`. Warnings from unusable scopes are logged,
  /// not returned; use the resolver directly to inspect them.
  pub fn effective_settings(&self, path: &Path) -> EffectiveSettings {
    let resolution = self.resolver.resolve(path);
    for warning in &resolution.warnings {
      tracing::warn!(scope = %warning.scope.display(), reason = %warning.reason, "unusable fragment skipped");
    }
    resolution.settings
  }

  /// Classification for `path`, computing and caching on miss.
  ///
  /// `Ok(None)` means the file is excluded by the resolved settings and is
  /// dropped from all processing. IO failures are per-file errors; they never
  /// poison the cache or other files.
  pub fn classification(&self, path: &Path) -> Result<Option<CacheEntry>, ClassifyError> {
    match self.classify_one(path, None) {
      ScanOutcome::Classified(entry) => Ok(Some(entry)),
      ScanOutcome::Excluded => Ok(None),
      ScanOutcome::Failed(source) => Err(ClassifyError::io(path, source)),
      // Unreachable without a cancel flag; treat as a retryable miss.
      ScanOutcome::Cancelled => Ok(None),
    }
  }

  fn classify_one(&self, path: &Path, cancel: Option<&AtomicBool>) -> ScanOutcome {
    let settings = self.effective_settings(path);

    if self.is_excluded(path, &settings) {
      // Excluded files must not linger in the cache either.
      self.cache.remove(path);
      return ScanOutcome::Excluded;
    }

    let fingerprint = match Fingerprint::of(path) {
      Ok(fingerprint) => fingerprint,
      Err(e) => return ScanOutcome::Failed(e),
    };

    if let Some(hit) = self.cache.get(
      path,
      fingerprint,
      settings.resolving_scope.as_deref(),
      settings.resolving_scope_version,
    ) {
      return ScanOutcome::Classified(hit);
    }

    // Single-flight: serialize computation for this path. Whoever loses the
    // race re-checks the cache and rides the winner's committed entry.
    let flight = self.cache.flight_lock(path);
    let _guard = flight.lock();

    if let Some(hit) = self.cache.get(
      path,
      fingerprint,
      settings.resolving_scope.as_deref(),
      settings.resolving_scope_version,
    ) {
      return ScanOutcome::Classified(hit);
    }

    if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
      return ScanOutcome::Cancelled;
    }

    let content = match fs::read_to_string(path) {
      Ok(content) => content,
      Err(e) => return ScanOutcome::Failed(e),
    };

    let classification = classify(&content, &settings.thresholds);
    let entry = CacheEntry {
      path: path.to_path_buf(),
      fingerprint,
      line_count: classification.line_count,
      tier: classification.tier,
      resolving_scope: settings.resolving_scope.clone(),
      resolving_scope_version: settings.resolving_scope_version,
    };

    // Discard instead of committing a result nobody will trust.
    if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
      return ScanOutcome::Cancelled;
    }

    self.cache.insert(entry.clone());
    ScanOutcome::Classified(entry)
  }

  /// Match `path` against the resolved exclude set, relative to its owning
  /// root when it has one.
  fn is_excluded(&self, path: &Path, settings: &EffectiveSettings) -> bool {
    if settings.exclude.is_empty() {
      return false;
    }
    let candidate = self
      .resolver
      .owning_root(path)
      .and_then(|root| path.strip_prefix(root).ok())
      .unwrap_or(path);
    // Compile each distinct pattern vector once, not once per file.
    self
      .exclude_sets
      .entry(settings.exclude.clone())
      .or_insert_with(|| build_exclude_set(&settings.exclude))
      .is_match(candidate)
  }

  /// Walk every root and classify all regular files, in parallel workers.
  ///
  /// Cancellation is cooperative: files not reached (or mid-computation when
  /// the flag flips) land in `unclassified`, never as errors, and no partial
  /// cache entry is ever committed.
  pub fn scan(&self, cancel: &AtomicBool) -> ScanReport {
    let mut files = Vec::new();
    for root in self.resolver.roots() {
      for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if entry.file_type().is_file() && !is_fragment_path(entry.path()) {
          files.push(entry.path().to_path_buf());
        }
      }
    }

    let report = Mutex::new(ScanReport::default());
    let cursor = AtomicUsize::new(0);
    let workers = thread::available_parallelism().map(usize::from).unwrap_or(1).min(files.len().max(1));

    thread::scope(|scope| {
      for _ in 0..workers {
        scope.spawn(|| loop {
          let index = cursor.fetch_add(1, Ordering::Relaxed);
          let Some(path) = files.get(index) else { break };
          if cancel.load(Ordering::Relaxed) {
            report.lock().unclassified.push(path.clone());
            continue;
          }
          match self.classify_one(path, Some(cancel)) {
            ScanOutcome::Classified(entry) => report.lock().entries.push(entry),
            ScanOutcome::Excluded => report.lock().excluded += 1,
            ScanOutcome::Failed(source) => {
              tracing::warn!(path = %path.display(), reason = %source, "skipping unreadable file");
              report.lock().errors.push((path.clone(), source.to_string()));
            }
            ScanOutcome::Cancelled => report.lock().unclassified.push(path.clone()),
          }
        });
      }
    });

    report.into_inner()
  }

  /// Register a listener fired after every scope version bump.
  pub fn on_scope_version_changed(
    &self,
    listener: impl Fn(&Path, ScopeVersion) + Send + Sync + 'static,
  ) {
    self.listeners.lock().push(Box::new(listener));
  }

  /// Apply one watcher event.
  ///
  /// Fragment events bump the owning scope's version; dependent cache
  /// entries go stale lazily through the read-time version check. Source
  /// file deletions drop the entry; creates and modifies are covered by the
  /// fingerprint check on the next read.
  pub fn handle_event(&self, event: &ChangeEvent) {
    let path = event.path();
    if is_fragment_path(path) {
      let Some(scope) = path.parent() else {
        return;
      };
      let version = self.resolver.bump_scope(scope);
      // Pattern vectors from the old configuration are dead keys now.
      self.exclude_sets.clear();
      tracing::debug!(scope = %scope.display(), version = version.0, "scope configuration changed");
      for listener in self.listeners.lock().iter() {
        listener(scope, version);
      }
    } else if event.is_deletion() {
      self.cache.remove(path);
    }
  }

  /// Consume watcher events on a background thread until the sender hangs
  /// up. One pump per engine serializes all version bumps.
  pub fn spawn_event_pump(self: &Arc<Self>, events: mpsc::Receiver<ChangeEvent>) -> thread::JoinHandle<()> {
    let engine = Arc::clone(self);
    thread::spawn(move || {
      for event in events {
        engine.handle_event(&event);
      }
    })
  }
}

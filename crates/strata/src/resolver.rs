//! Nearest-ancestor configuration resolution
//!
//! Walks a file's ancestor directories from its owning workspace root down to
//! its containing directory, merging fragments field by field: the nearest
//! scope that sets a threshold wins, excludes accumulate root-first. Each
//! workspace root is an independent resolution domain; a walk never crosses
//! above its root or into another root.
//!
//! The resolver also owns the scope version counters the cache keys validity
//! on. Bumping a scope is the only write path and is atomic per scope.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{FragmentError, ScopeWarning};
use crate::fragment::{ConfigFragment, Thresholds, DEFAULT_THRESHOLDS};
use crate::store::SettingsStore;

/// Version token for a scope's configuration, bumped whenever the scope's
/// fragment is created, updated, or deleted. Monotonically increasing.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ScopeVersion(pub u64);

impl ScopeVersion {
  /// Version reported when no scope contributed anything. Never changes.
  pub const DEFAULT: ScopeVersion = ScopeVersion(0);
}

/// Fully resolved configuration applicable to one file.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveSettings {
  pub thresholds: Thresholds,
  /// Accumulated excludes, outermost scope's patterns first, exact duplicates
  /// dropped keeping the first occurrence.
  pub exclude: Vec<String>,
  /// Nearest scope that contributed at least one field, if any.
  pub resolving_scope: Option<PathBuf>,
  /// Version of the resolving scope at resolution time; the cache's validity
  /// key together with the scope path itself.
  pub resolving_scope_version: ScopeVersion,
}

impl Default for EffectiveSettings {
  fn default() -> Self {
    Self {
      thresholds: DEFAULT_THRESHOLDS,
      exclude: Vec::new(),
      resolving_scope: None,
      resolving_scope_version: ScopeVersion::DEFAULT,
    }
  }
}

/// Resolution result: the settings plus non-fatal per-scope warnings.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
  pub settings: EffectiveSettings,
  pub warnings: Vec<ScopeWarning>,
}

/// A scope's memoized fragment lookup.
#[derive(Debug, Clone)]
enum ScopeFragment {
  Absent,
  /// Fragment exists but cannot be used (malformed or unreadable).
  Unusable(String),
  Present(ConfigFragment),
}

#[derive(Debug, Default)]
struct ScopeState {
  version: u64,
  /// `None` until first lookup; cleared on every bump so the next resolution
  /// reloads from the store.
  loaded: Option<ScopeFragment>,
}

pub struct ConfigResolver {
  roots: Vec<PathBuf>,
  store: Arc<dyn SettingsStore>,
  scopes: DashMap<PathBuf, ScopeState>,
}

impl ConfigResolver {
  pub fn new(roots: Vec<PathBuf>, store: Arc<dyn SettingsStore>) -> Self {
    Self { roots, store, scopes: DashMap::new() }
  }

  pub fn roots(&self) -> &[PathBuf] {
    &self.roots
  }

  /// The workspace root owning `path`, if any. When roots nest, the deepest
  /// (most specific) root wins.
  pub fn owning_root(&self, path: &Path) -> Option<&Path> {
    self
      .roots
      .iter()
      .filter(|root| path.starts_with(root))
      .max_by_key(|root| root.components().count())
      .map(PathBuf::as_path)
  }

  /// Ancestor scopes of `file_path` from its owning root (outermost) down to
  /// its containing directory (nearest). Empty for paths outside every root.
  fn scope_chain(&self, file_path: &Path) -> Vec<PathBuf> {
    let Some(root) = self.owning_root(file_path) else {
      return Vec::new();
    };
    let dir = file_path.parent().unwrap_or(file_path);
    let mut chain: Vec<PathBuf> = dir
      .ancestors()
      .take_while(|ancestor| ancestor.starts_with(root))
      .map(Path::to_path_buf)
      .collect();
    chain.reverse();
    chain
  }

  /// Resolve the effective settings for `file_path`.
  ///
  /// Never fails for a well-formed path: unusable fragments are skipped with
  /// a warning, and a path outside every root resolves to pure defaults.
  pub fn resolve(&self, file_path: &Path) -> Resolution {
    let chain = self.scope_chain(file_path);
    let mut warnings = Vec::new();

    let mut simple = None;
    let mut moderate = None;
    let mut complex = None;
    let mut exclude: Vec<String> = Vec::new();
    let mut resolving: Option<(PathBuf, ScopeVersion)> = None;

    for scope in chain {
      let (version, loaded) = self.load_scope(&scope);
      match loaded {
        ScopeFragment::Absent => {}
        ScopeFragment::Unusable(reason) => {
          warnings.push(ScopeWarning::new(&scope, reason));
        }
        ScopeFragment::Present(fragment) => {
          let mut contributed = false;
          if fragment.thresholds.simple.is_some() {
            simple = fragment.thresholds.simple;
            contributed = true;
          }
          if fragment.thresholds.moderate.is_some() {
            moderate = fragment.thresholds.moderate;
            contributed = true;
          }
          if fragment.thresholds.complex.is_some() {
            complex = fragment.thresholds.complex;
            contributed = true;
          }
          if !fragment.exclude.is_empty() {
            contributed = true;
            for pattern in fragment.exclude {
              if !exclude.contains(&pattern) {
                exclude.push(pattern);
              }
            }
          }
          if contributed {
            resolving = Some((scope, version));
          }
        }
      }
    }

    let (resolving_scope, resolving_scope_version) = match resolving {
      Some((scope, version)) => (Some(scope), version),
      None => (None, ScopeVersion::DEFAULT),
    };

    Resolution {
      settings: EffectiveSettings {
        thresholds: Thresholds {
          simple: simple.unwrap_or(DEFAULT_THRESHOLDS.simple),
          moderate: moderate.unwrap_or(DEFAULT_THRESHOLDS.moderate),
          complex: complex.unwrap_or(DEFAULT_THRESHOLDS.complex),
        },
        exclude,
        resolving_scope,
        resolving_scope_version,
      },
      warnings,
    }
  }

  /// Bump `scope`'s version and drop its memoized fragment.
  ///
  /// Single writer per scope (the invalidation handler); the bump and the
  /// memo clear happen under the scope's map entry, so readers observe
  /// either the old version with the old fragment or the new version.
  pub fn bump_scope(&self, scope: &Path) -> ScopeVersion {
    let mut state = self.scopes.entry(scope.to_path_buf()).or_default();
    state.version += 1;
    state.loaded = None;
    ScopeVersion(state.version)
  }

  /// Current version of `scope`; `DEFAULT` for scopes never bumped.
  pub fn current_version(&self, scope: &Path) -> ScopeVersion {
    self
      .scopes
      .get(scope)
      .map(|state| ScopeVersion(state.version))
      .unwrap_or(ScopeVersion::DEFAULT)
  }

  fn load_scope(&self, scope: &Path) -> (ScopeVersion, ScopeFragment) {
    if let Some(state) = self.scopes.get(scope) {
      if let Some(loaded) = &state.loaded {
        return (ScopeVersion(state.version), loaded.clone());
      }
    }

    let version_before = self.current_version(scope);

    // Load outside any map lock; fragment reads can hit the filesystem.
    let loaded = match self.store.load_fragment(scope) {
      Ok(None) => ScopeFragment::Absent,
      Ok(Some(fragment)) => ScopeFragment::Present(fragment),
      Err(FragmentError::Malformed { reason, .. }) => ScopeFragment::Unusable(reason),
      Err(FragmentError::Io { source, .. }) => ScopeFragment::Unusable(source.to_string()),
    };

    let mut state = self.scopes.entry(scope.to_path_buf()).or_default();
    if state.version != version_before.0 {
      // A bump landed mid-load, so this fragment may predate it. Serve it
      // under the pre-bump version and skip the memo: anything cached
      // against the old version fails the next validity check, and the
      // next resolution reloads from the store.
      return (version_before, loaded);
    }
    if state.loaded.is_none() {
      state.loaded = Some(loaded.clone());
    }
    // A concurrent load may have memoized first; both passed the same
    // version gate, so either result is current for this version.
    let current = state.loaded.clone().unwrap_or(loaded);
    (ScopeVersion(state.version), current)
  }
}

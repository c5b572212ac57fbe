//! Settings stores: where configuration fragments live
//!
//! The resolver only ever talks to the [`SettingsStore`] trait. The default
//! store reads `.strata.json` files straight off the filesystem; the memory
//! store backs tests and embedders that manage fragments themselves.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::FragmentError;
use crate::fragment::{ConfigFragment, FRAGMENT_FILE_NAME};

pub trait SettingsStore: Send + Sync {
  /// Load the fragment owned by `scope`.
  ///
  /// `Ok(None)` means the scope holds no fragment, which is a normal outcome
  /// and never an error. `Err` is reserved for fragments that exist but
  /// cannot be used (unreadable or malformed).
  fn load_fragment(&self, scope: &Path) -> Result<Option<ConfigFragment>, FragmentError>;

  /// Scopes currently holding a fragment.
  fn known_scopes(&self) -> Vec<PathBuf>;
}

/// Reads fragments from `.strata.json` files under the configured roots.
pub struct FsSettingsStore {
  roots: Vec<PathBuf>,
}

impl FsSettingsStore {
  pub fn new(roots: Vec<PathBuf>) -> Self {
    Self { roots }
  }
}

impl SettingsStore for FsSettingsStore {
  fn load_fragment(&self, scope: &Path) -> Result<Option<ConfigFragment>, FragmentError> {
    let path = scope.join(FRAGMENT_FILE_NAME);
    let content = match fs::read_to_string(&path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
      Err(e) => return Err(FragmentError::io(scope, e)),
    };

    let mut fragment: ConfigFragment = serde_json::from_str(&content)
      .map_err(|e| FragmentError::malformed(scope, e.to_string()))?;
    fragment.scope = scope.to_path_buf();
    fragment.validate().map_err(|reason| FragmentError::malformed(scope, reason))?;
    Ok(Some(fragment))
  }

  fn known_scopes(&self) -> Vec<PathBuf> {
    let mut scopes = Vec::new();
    for root in &self.roots {
      for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if entry.file_type().is_file() && entry.file_name() == FRAGMENT_FILE_NAME {
          if let Some(scope) = entry.path().parent() {
            scopes.push(scope.to_path_buf());
          }
        }
      }
    }
    scopes
  }
}

/// In-memory store with mutable fragments, for tests and embedders.
#[derive(Default)]
pub struct MemorySettingsStore {
  fragments: RwLock<HashMap<PathBuf, ConfigFragment>>,
  /// Scopes that report malformed data instead of a fragment.
  malformed: RwLock<HashMap<PathBuf, String>>,
}

impl MemorySettingsStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert(&self, fragment: ConfigFragment) {
    self.malformed.write().remove(&fragment.scope);
    self.fragments.write().insert(fragment.scope.clone(), fragment);
  }

  pub fn remove(&self, scope: &Path) {
    self.fragments.write().remove(scope);
    self.malformed.write().remove(scope);
  }

  /// Make `scope` report a malformed fragment on load.
  pub fn mark_malformed(&self, scope: impl Into<PathBuf>, reason: impl Into<String>) {
    let scope = scope.into();
    self.fragments.write().remove(&scope);
    self.malformed.write().insert(scope, reason.into());
  }
}

impl SettingsStore for MemorySettingsStore {
  fn load_fragment(&self, scope: &Path) -> Result<Option<ConfigFragment>, FragmentError> {
    if let Some(reason) = self.malformed.read().get(scope) {
      return Err(FragmentError::malformed(scope, reason.clone()));
    }
    let fragment = self.fragments.read().get(scope).cloned();
    if let Some(fragment) = &fragment {
      fragment.validate().map_err(|reason| FragmentError::malformed(scope, reason))?;
    }
    Ok(fragment)
  }

  fn known_scopes(&self) -> Vec<PathBuf> {
    self.fragments.read().keys().cloned().collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn test_fs_store_absent_is_none() {
    let temp_dir = TempDir::new().unwrap();
    let store = FsSettingsStore::new(vec![temp_dir.path().to_path_buf()]);

    let fragment = store.load_fragment(temp_dir.path()).unwrap();
    assert!(fragment.is_none());
  }

  #[test]
  fn test_fs_store_loads_fragment() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(
      temp_dir.path().join(FRAGMENT_FILE_NAME),
      r#"{ "thresholds": { "simple": 50, "complex": 400 }, "exclude": ["**/dist/**"] }"#,
    )
    .unwrap();

    let store = FsSettingsStore::new(vec![temp_dir.path().to_path_buf()]);
    let fragment = store.load_fragment(temp_dir.path()).unwrap().unwrap();

    assert_eq!(fragment.scope, temp_dir.path());
    assert_eq!(fragment.thresholds.simple, Some(50));
    assert_eq!(fragment.thresholds.complex, Some(400));
    assert_eq!(fragment.exclude, vec!["**/dist/**".to_string()]);
  }

  #[test]
  fn test_fs_store_malformed_json() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join(FRAGMENT_FILE_NAME), "{ not json }").unwrap();

    let store = FsSettingsStore::new(vec![temp_dir.path().to_path_buf()]);
    let result = store.load_fragment(temp_dir.path());
    assert!(matches!(result, Err(FragmentError::Malformed { .. })));
  }

  #[test]
  fn test_fs_store_invalid_ordering_is_malformed() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(
      temp_dir.path().join(FRAGMENT_FILE_NAME),
      r#"{ "thresholds": { "simple": 500, "complex": 100 } }"#,
    )
    .unwrap();

    let store = FsSettingsStore::new(vec![temp_dir.path().to_path_buf()]);
    let result = store.load_fragment(temp_dir.path());
    assert!(matches!(result, Err(FragmentError::Malformed { .. })));
  }

  #[test]
  fn test_fs_store_known_scopes() {
    let temp_dir = TempDir::new().unwrap();
    let nested = temp_dir.path().join("src/deep");
    fs::create_dir_all(&nested).unwrap();
    fs::write(temp_dir.path().join(FRAGMENT_FILE_NAME), "{}").unwrap();
    fs::write(nested.join(FRAGMENT_FILE_NAME), "{}").unwrap();

    let store = FsSettingsStore::new(vec![temp_dir.path().to_path_buf()]);
    let mut scopes = store.known_scopes();
    scopes.sort();

    assert_eq!(scopes, vec![temp_dir.path().to_path_buf(), nested]);
  }

  #[test]
  fn test_memory_store_insert_and_malformed() {
    let store = MemorySettingsStore::new();
    let scope = PathBuf::from("/project");
    store.insert(ConfigFragment::new(&scope));
    assert!(store.load_fragment(&scope).unwrap().is_some());

    store.mark_malformed(&scope, "broken");
    assert!(matches!(store.load_fragment(&scope), Err(FragmentError::Malformed { .. })));

    store.remove(&scope);
    assert!(store.load_fragment(&scope).unwrap().is_none());
  }
}

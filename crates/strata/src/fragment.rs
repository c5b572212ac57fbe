//! Per-scope configuration fragments
//!
//! A scope is any directory that carries a `.strata.json` file. Fragments
//! only describe that scope's own overrides; resolution against ancestor
//! scopes happens in the resolver.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name a scope's fragment is persisted under.
pub const FRAGMENT_FILE_NAME: &str = ".strata.json";

/// Built-in threshold baseline used when no scope in the chain sets a field.
pub const DEFAULT_THRESHOLDS: Thresholds = Thresholds { simple: 100, moderate: 300, complex: 600 };

/// Fully-resolved thresholds, every field present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
  pub simple: u32,
  pub moderate: u32,
  pub complex: u32,
}

impl Default for Thresholds {
  fn default() -> Self {
    DEFAULT_THRESHOLDS
  }
}

/// A scope's own threshold overrides. Unset fields inherit from the nearest
/// ancestor scope that sets them, falling back to [`DEFAULT_THRESHOLDS`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartialThresholds {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub simple: Option<u32>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub moderate: Option<u32>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub complex: Option<u32>,
}

impl PartialThresholds {
  pub fn is_empty(&self) -> bool {
    self.simple.is_none() && self.moderate.is_none() && self.complex.is_none()
  }
}

/// One scope's own (non-inherited) configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFragment {
  /// Directory that owns this fragment. Stores fill this in from the
  /// fragment's location; a persisted value is overwritten on load.
  #[serde(default)]
  pub scope: PathBuf,
  #[serde(default)]
  pub thresholds: PartialThresholds,
  /// Ordered glob patterns; matching files are dropped from classification.
  #[serde(default)]
  pub exclude: Vec<String>,
}

impl ConfigFragment {
  pub fn new(scope: impl Into<PathBuf>) -> Self {
    Self { scope: scope.into(), ..Self::default() }
  }

  /// Validate the fragment's own invariants.
  ///
  /// Thresholds must be positive, and `simple < complex` whenever both are
  /// set by this fragment. Violations make the whole fragment invalid.
  pub fn validate(&self) -> Result<(), String> {
    let t = &self.thresholds;
    for (name, value) in
      [("simple", t.simple), ("moderate", t.moderate), ("complex", t.complex)]
    {
      if value == Some(0) {
        return Err(format!("thresholds.{name} must be a positive integer"));
      }
    }
    if let (Some(simple), Some(complex)) = (t.simple, t.complex) {
      if simple >= complex {
        return Err(format!(
          "thresholds.simple ({simple}) must be less than thresholds.complex ({complex})"
        ));
      }
    }
    Ok(())
  }
}

/// Whether `path` names a fragment file rather than a source file.
pub fn is_fragment_path(path: &Path) -> bool {
  path.file_name().is_some_and(|name| name == FRAGMENT_FILE_NAME)
}

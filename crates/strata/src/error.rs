//! Error taxonomy for fragment loading and file classification
//!
//! Absence of a fragment is never an error; stores signal it as `Ok(None)`.
//! Everything here degrades gracefully: a bad fragment skips one scope, a bad
//! file skips one file, and neither aborts a batch.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FragmentError {
  #[error("malformed fragment at {scope}: {reason}")]
  Malformed { scope: PathBuf, reason: String },

  #[error("failed to read fragment at {scope}: {source}")]
  Io {
    scope: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

impl FragmentError {
  pub fn malformed(scope: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
    Self::Malformed { scope: scope.into(), reason: reason.into() }
  }

  pub fn io(scope: impl Into<PathBuf>, source: std::io::Error) -> Self {
    Self::Io { scope: scope.into(), source }
  }
}

#[derive(Error, Debug)]
pub enum ClassifyError {
  #[error("failed to read {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

impl ClassifyError {
  pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
    Self::Io { path: path.into(), source }
  }
}

/// Non-fatal diagnostic for a scope whose fragment could not be used.
///
/// Resolution skips the scope (it contributes no fields) and keeps walking,
/// so a single bad fragment never takes down classification for the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeWarning {
  pub scope: PathBuf,
  pub reason: String,
}

impl ScopeWarning {
  pub fn new(scope: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
    Self { scope: scope.into(), reason: reason.into() }
  }
}

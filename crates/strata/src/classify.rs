//! Line counting and tier classification
//!
//! Pure functions: content plus resolved thresholds in, line count plus tier
//! out. Exclusion matching lives here too so every consumer applies the same
//! glob semantics.

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::fragment::Thresholds;

/// Classification outcome for a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
  Simple,
  Moderate,
  Complex,
}

impl Tier {
  pub fn as_str(&self) -> &'static str {
    match self {
      Tier::Simple => "simple",
      Tier::Moderate => "moderate",
      Tier::Complex => "complex",
    }
  }
}

impl fmt::Display for Tier {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Line count plus tier under one set of thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
  pub line_count: u32,
  pub tier: Tier,
}

/// Count the lines of `content`.
///
/// A lone trailing terminator does not produce an extra empty segment, so
/// `"a\nb\n"` and `"a\nb"` both count two lines. Empty content counts zero.
/// CRLF terminators count the same as bare LF.
pub fn count_lines(content: &str) -> u32 {
  content.lines().count() as u32
}

/// Tier for a line count: below `simple` is Simple, below `complex` is
/// Moderate, everything else Complex. `moderate` is carried in configuration
/// but does not gate a boundary.
pub fn tier_for(line_count: u32, thresholds: &Thresholds) -> Tier {
  if line_count < thresholds.simple {
    Tier::Simple
  } else if line_count < thresholds.complex {
    Tier::Moderate
  } else {
    Tier::Complex
  }
}

/// Classify `content` under `thresholds`. Deterministic and side-effect-free.
pub fn classify(content: &str, thresholds: &Thresholds) -> Classification {
  let line_count = count_lines(content);
  Classification { line_count, tier: tier_for(line_count, thresholds) }
}

/// Compile exclude patterns into a matcher.
///
/// Matching is case-sensitive, matches dotfiles like any other name, and
/// supports no negation. Invalid patterns are skipped with a warning rather
/// than failing the whole set.
pub fn build_exclude_set(patterns: &[String]) -> GlobSet {
  let mut builder = GlobSetBuilder::new();
  for pattern in patterns {
    match Glob::new(pattern) {
      Ok(glob) => {
        builder.add(glob);
      }
      Err(e) => {
        tracing::warn!(pattern = %pattern, error = %e, "skipping invalid exclude pattern");
      }
    }
  }
  builder.build().unwrap_or_else(|e| {
    tracing::warn!(error = %e, "failed to build exclude set, excluding nothing");
    GlobSet::empty()
  })
}

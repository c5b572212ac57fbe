//! Tiered file complexity classification with hierarchical configuration
//!
//! Every file in a workspace gets a tier (simple, moderate, complex) from its
//! line count, judged against thresholds resolved through nested `.strata.json`
//! scopes with nearest-ancestor override semantics. Results are cached per
//! file and invalidated lazily by content fingerprint and scope version.

pub mod cache;
pub mod classify;
pub mod engine;
pub mod error;
pub mod events;
pub mod fragment;
pub mod resolver;
pub mod store;

pub use cache::{CacheEntry, ClassificationCache, Fingerprint, DEFAULT_CACHE_CAPACITY};
pub use classify::{classify, count_lines, tier_for, Classification, Tier};
pub use engine::{ScanReport, Strata};
pub use error::{ClassifyError, FragmentError, ScopeWarning};
pub use events::ChangeEvent;
pub use fragment::{
  ConfigFragment, PartialThresholds, Thresholds, DEFAULT_THRESHOLDS, FRAGMENT_FILE_NAME,
};
pub use resolver::{ConfigResolver, EffectiveSettings, Resolution, ScopeVersion};
pub use store::{FsSettingsStore, MemorySettingsStore, SettingsStore};

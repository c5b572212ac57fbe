//! Change events from the external filesystem watcher
//!
//! The watcher mechanism itself lives outside this crate; it is only required
//! to push these events onto a channel. Delivery order and debouncing are the
//! watcher's responsibility.

use std::path::{Path, PathBuf};

/// A create/modify/delete notification for a source file or a configuration
/// fragment file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
  Created(PathBuf),
  Modified(PathBuf),
  Deleted(PathBuf),
}

impl ChangeEvent {
  pub fn path(&self) -> &Path {
    match self {
      ChangeEvent::Created(path) | ChangeEvent::Modified(path) | ChangeEvent::Deleted(path) => {
        path
      }
    }
  }

  pub fn is_deletion(&self) -> bool {
    matches!(self, ChangeEvent::Deleted(_))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_event_path_and_kind() {
    let event = ChangeEvent::Modified(PathBuf::from("/ws/a.rs"));
    assert_eq!(event.path(), Path::new("/ws/a.rs"));
    assert!(!event.is_deletion());
    assert!(ChangeEvent::Deleted(PathBuf::from("/ws/a.rs")).is_deletion());
  }
}

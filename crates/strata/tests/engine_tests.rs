use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;

use strata::{ChangeEvent, FsSettingsStore, Strata, Tier, FRAGMENT_FILE_NAME};
use tempfile::TempDir;

fn write_lines(path: &Path, n: usize) {
  let content: String = (0..n).map(|i| format!("line {i}\n")).collect();
  fs::write(path, content).unwrap();
}

fn write_fragment(scope: &Path, json: &str) {
  fs::write(scope.join(FRAGMENT_FILE_NAME), json).unwrap();
}

fn engine_for(roots: &[&Path]) -> Strata {
  let roots: Vec<PathBuf> = roots.iter().map(|r| r.to_path_buf()).collect();
  let store = Arc::new(FsSettingsStore::new(roots.clone()));
  Strata::new(roots, store)
}

#[test]
fn test_nearest_ancestor_field_inheritance() {
  let temp_dir = TempDir::new().unwrap();
  let root = temp_dir.path();
  let child = root.join("child");
  fs::create_dir_all(&child).unwrap();

  write_fragment(root, r#"{ "thresholds": { "simple": 100, "moderate": 300, "complex": 600 } }"#);
  write_fragment(&child, r#"{ "thresholds": { "simple": 50 } }"#);

  let engine = engine_for(&[root]);
  let settings = engine.effective_settings(&child.join("file.rs"));

  assert_eq!(settings.thresholds.simple, 50);
  assert_eq!(settings.thresholds.moderate, 300);
  assert_eq!(settings.thresholds.complex, 600);
}

#[test]
fn test_boundary_precision() {
  let temp_dir = TempDir::new().unwrap();
  let root = temp_dir.path();
  write_fragment(root, r#"{ "thresholds": { "simple": 100, "moderate": 300, "complex": 600 } }"#);

  let cases =
    [(99, Tier::Simple), (100, Tier::Moderate), (599, Tier::Moderate), (600, Tier::Complex)];

  let engine = engine_for(&[root]);
  for (lines, expected) in cases {
    let path = root.join(format!("file_{lines}.rs"));
    write_lines(&path, lines);
    let entry = engine.classification(&path).unwrap().unwrap();
    assert_eq!(entry.line_count, lines as u32);
    assert_eq!(entry.tier, expected, "{lines} lines");
  }
}

#[test]
fn test_fragment_edit_invalidates_cached_entry() {
  let temp_dir = TempDir::new().unwrap();
  let root = temp_dir.path();
  write_fragment(root, r#"{ "thresholds": { "simple": 100 } }"#);

  let file = root.join("file.rs");
  write_lines(&file, 50);

  let engine = engine_for(&[root]);
  let before = engine.classification(&file).unwrap().unwrap();
  assert_eq!(before.tier, Tier::Simple);

  // Edit the fragment; the file's own fingerprint is untouched.
  write_fragment(root, r#"{ "thresholds": { "simple": 40 } }"#);
  engine.handle_event(&ChangeEvent::Modified(root.join(FRAGMENT_FILE_NAME)));

  let after = engine.classification(&file).unwrap().unwrap();
  assert_eq!(after.fingerprint, before.fingerprint);
  assert_eq!(after.tier, Tier::Moderate);
  assert!(after.resolving_scope_version > before.resolving_scope_version);
}

#[test]
fn test_exclusion_precedence_and_union() {
  let temp_dir = TempDir::new().unwrap();
  let root = temp_dir.path();
  let web = root.join("web");
  fs::create_dir_all(web.join("dist")).unwrap();

  write_fragment(root, r#"{ "exclude": ["**/dist/**"] }"#);
  write_fragment(&web, r#"{ "exclude": ["**/*.min.js"] }"#);

  let bundled = web.join("dist/bundle.js");
  let minified = web.join("app.min.js");
  let kept = web.join("app.js");
  write_lines(&bundled, 5000);
  write_lines(&minified, 5000);
  write_lines(&kept, 10);

  let engine = engine_for(&[root]);

  // Both the inherited and the local pattern exclude, regardless of size.
  assert!(engine.classification(&bundled).unwrap().is_none());
  assert!(engine.classification(&minified).unwrap().is_none());
  assert!(engine.classification(&kept).unwrap().is_some());

  let report = engine.scan(&AtomicBool::new(false));
  assert_eq!(report.excluded, 2);
  assert!(report.entries.iter().all(|entry| entry.path != bundled && entry.path != minified));
}

#[test]
fn test_multi_root_isolation() {
  let temp_a = TempDir::new().unwrap();
  let temp_b = TempDir::new().unwrap();
  write_fragment(temp_a.path(), r#"{ "thresholds": { "simple": 100 } }"#);
  write_fragment(temp_b.path(), r#"{ "thresholds": { "simple": 10 } }"#);

  let file_a = temp_a.path().join("same.rs");
  let file_b = temp_b.path().join("same.rs");
  write_lines(&file_a, 50);
  write_lines(&file_b, 50);

  let engine = engine_for(&[temp_a.path(), temp_b.path()]);
  assert_eq!(engine.classification(&file_a).unwrap().unwrap().tier, Tier::Simple);
  assert_eq!(engine.classification(&file_b).unwrap().unwrap().tier, Tier::Moderate);

  // Outside every root: built-in defaults.
  let elsewhere = TempDir::new().unwrap();
  let settings = engine.effective_settings(&elsewhere.path().join("x.rs"));
  assert_eq!(settings.thresholds.simple, 100);
  assert_eq!(settings.thresholds.moderate, 300);
  assert_eq!(settings.thresholds.complex, 600);
}

#[test]
fn test_malformed_fragment_degrades_to_ancestor() {
  let temp_dir = TempDir::new().unwrap();
  let root = temp_dir.path();
  let bad = root.join("bad");
  fs::create_dir_all(&bad).unwrap();

  write_fragment(root, r#"{ "thresholds": { "simple": 30 } }"#);
  write_fragment(&bad, r#"{ "thresholds": { "simple": 500, "complex": 100 } }"#);

  let file = bad.join("file.rs");
  write_lines(&file, 40);

  let engine = engine_for(&[root]);
  let entry = engine.classification(&file).unwrap().unwrap();
  // The invalid scope contributes nothing; the root's simple=30 applies.
  assert_eq!(entry.tier, Tier::Moderate);
  assert_eq!(entry.resolving_scope.as_deref(), Some(root));
}

#[test]
fn test_concurrent_requests_share_one_result() {
  let temp_dir = TempDir::new().unwrap();
  let root = temp_dir.path();
  let file = root.join("file.rs");
  write_lines(&file, 150);

  let engine = engine_for(&[root]);
  thread::scope(|scope| {
    let handles: Vec<_> = (0..8)
      .map(|_| {
        let engine = &engine;
        let file = &file;
        scope.spawn(move || engine.classification(file).unwrap().unwrap())
      })
      .collect();
    let entries: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for entry in &entries {
      assert_eq!(entry, &entries[0]);
      assert_eq!(entry.line_count, 150);
    }
  });
}

#[test]
fn test_cancelled_scan_reports_unclassified() {
  let temp_dir = TempDir::new().unwrap();
  let root = temp_dir.path();
  for i in 0..5 {
    write_lines(&root.join(format!("f{i}.rs")), 10);
  }

  let engine = engine_for(&[root]);
  let cancel = AtomicBool::new(true);
  let report = engine.scan(&cancel);

  assert!(report.entries.is_empty());
  assert!(report.errors.is_empty());
  assert_eq!(report.unclassified.len(), 5);
}

#[test]
fn test_scan_skips_fragment_files_and_counts_tiers() {
  let temp_dir = TempDir::new().unwrap();
  let root = temp_dir.path();
  write_fragment(root, r#"{ "thresholds": { "simple": 100, "complex": 600 } }"#);
  write_lines(&root.join("small.rs"), 10);
  write_lines(&root.join("big.rs"), 700);

  let engine = engine_for(&[root]);
  let report = engine.scan(&AtomicBool::new(false));

  assert_eq!(report.entries.len(), 2);
  assert_eq!(report.tier_count(Tier::Simple), 1);
  assert_eq!(report.tier_count(Tier::Complex), 1);
  assert!(report.entries.iter().all(|entry| !entry.path.ends_with(FRAGMENT_FILE_NAME)));
}

#[test]
fn test_event_pump_bumps_versions_and_notifies() {
  let temp_dir = TempDir::new().unwrap();
  let root = temp_dir.path().to_path_buf();
  write_fragment(&root, r#"{ "thresholds": { "simple": 100 } }"#);

  let store = Arc::new(FsSettingsStore::new(vec![root.clone()]));
  let engine = Arc::new(Strata::new(vec![root.clone()], store));

  let notified = Arc::new(AtomicU64::new(0));
  let observed = Arc::clone(&notified);
  engine.on_scope_version_changed(move |_scope, version| {
    observed.store(version.0, Ordering::SeqCst);
  });

  let (tx, rx) = mpsc::channel();
  let pump = engine.spawn_event_pump(rx);

  tx.send(ChangeEvent::Modified(root.join(FRAGMENT_FILE_NAME))).unwrap();
  tx.send(ChangeEvent::Modified(root.join(FRAGMENT_FILE_NAME))).unwrap();
  drop(tx);
  pump.join().unwrap();

  assert_eq!(notified.load(Ordering::SeqCst), 2);
  assert_eq!(engine.resolver().current_version(&root).0, 2);
}

#[test]
fn test_deleted_source_file_entry_is_dropped() {
  let temp_dir = TempDir::new().unwrap();
  let root = temp_dir.path();
  let file = root.join("file.rs");
  write_lines(&file, 10);

  let engine = engine_for(&[root]);
  assert!(engine.classification(&file).unwrap().is_some());

  fs::remove_file(&file).unwrap();
  engine.handle_event(&ChangeEvent::Deleted(file.clone()));

  // Recomputing now surfaces the per-file IO error, isolated to this file,
  // with the original error kind intact.
  match engine.classification(&file) {
    Err(strata::ClassifyError::Io { source, .. }) => {
      assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
    }
    other => panic!("expected an IO error, got {other:?}"),
  }
}

#[test]
fn test_exclude_edits_apply_after_fragment_event() {
  let temp_dir = TempDir::new().unwrap();
  let root = temp_dir.path();
  write_fragment(root, r#"{ "thresholds": { "simple": 100 } }"#);

  let minified = root.join("app.min.js");
  let kept = root.join("app.js");
  write_lines(&minified, 10);
  write_lines(&kept, 10);

  let engine = engine_for(&[root]);
  assert!(engine.classification(&minified).unwrap().is_some());

  write_fragment(root, r#"{ "thresholds": { "simple": 100 }, "exclude": ["**/*.min.js"] }"#);
  engine.handle_event(&ChangeEvent::Modified(root.join(FRAGMENT_FILE_NAME)));

  // The new pattern set applies immediately; no stale compiled set lingers.
  assert!(engine.classification(&minified).unwrap().is_none());
  assert!(engine.classification(&kept).unwrap().is_some());
}

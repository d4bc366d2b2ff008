//! Tests for ledger bookkeeping, persistence and reconciliation.

use std::fs;
use std::path::{Path, PathBuf};

use crate::item::{AssetKind, RequiredAsset};
use crate::validator::AssetValidator;

use super::{load, save, Ledger, LedgerStore};

fn assets() -> Vec<RequiredAsset> {
    vec![
        RequiredAsset {
            kind: AssetKind::Primary,
            filename: "a.mp4".to_string(),
        },
        RequiredAsset {
            kind: AssetKind::Metadata,
            filename: "a.json".to_string(),
        },
    ]
}

fn write_valid_item(dir: &Path) {
    fs::create_dir_all(dir).unwrap();
    let mut mp4 = b"\x00\x00\x00\x18ftypisom".to_vec();
    mp4.resize(2048, 7);
    fs::write(dir.join("a.mp4"), mp4).unwrap();
    fs::write(dir.join("a.json"), br#"{"id":"a"}"#).unwrap();
}

#[test]
fn mark_completed_clears_attempt_record() {
    let mut l = Ledger::default();
    let folder = PathBuf::from("/dl/a");
    l.record_failure("a", 3, &folder, &[AssetKind::Primary], 3);
    assert_eq!(l.attempts_for("a"), 1);
    l.mark_completed("a", 3, &folder, assets());
    assert!(l.is_completed("a"));
    assert!(!l.attempts.contains_key("a"));
}

#[test]
fn record_failure_removes_completed_claim() {
    let mut l = Ledger::default();
    let folder = PathBuf::from("/dl/a");
    l.mark_completed("a", 3, &folder, assets());
    l.record_failure("a", 3, &folder, &[AssetKind::Metadata], 3);
    assert!(!l.is_completed("a"));
    assert_eq!(l.attempts["a"].missing, vec![AssetKind::Metadata]);
}

#[test]
fn attempts_take_every_value_once() {
    let mut l = Ledger::default();
    let folder = PathBuf::from("/dl/a");
    let seen: Vec<u32> = (0..4)
        .map(|_| l.record_failure("a", 9, &folder, &[AssetKind::Primary], 4))
        .collect();
    assert_eq!(seen, vec![1, 2, 3, 4]);
}

#[test]
fn attempts_clamp_at_lowered_ceiling() {
    let mut l = Ledger::default();
    let folder = PathBuf::from("/dl/a");
    for _ in 0..3 {
        l.record_failure("a", 9, &folder, &[], 5);
    }
    assert_eq!(l.record_failure("a", 9, &folder, &[], 2), 2);
}

#[test]
fn permanent_failure_moves_record_into_log() {
    let mut l = Ledger::default();
    let folder = PathBuf::from("/dl/a");
    l.record_failure("a", 7, &folder, &[AssetKind::Primary], 2);
    l.record_failure("a", 7, &folder, &[AssetKind::Primary], 2);
    let entry = l
        .record_permanent_failure("a", Some(PathBuf::from("/q/a-1")), None)
        .cloned()
        .unwrap();
    assert_eq!(entry.attempts, 2);
    assert_eq!(entry.missing, vec![AssetKind::Primary]);
    assert!(l.attempts.is_empty());
    assert_eq!(l.failure_log.len(), 1);
    assert!(l.record_permanent_failure("a", None, None).is_none());
}

#[test]
fn escalate_drops_page_records_only() {
    let mut l = Ledger::default();
    l.record_failure("a", 7, Path::new("/dl/a"), &[], 3);
    l.record_failure("b", 7, Path::new("/dl/b"), &[], 3);
    l.record_failure("c", 6, Path::new("/dl/c"), &[], 3);
    l.defer_page(7);
    assert_eq!(l.escalate_to_permanent(7), 2);
    assert!(l.is_permanently_failed(7));
    assert!(!l.deferred_pages.contains(&7));
    assert_eq!(l.attempts.keys().collect::<Vec<_>>(), vec!["c"]);
    l.defer_page(7);
    assert!(l.deferred_pages.is_empty());
}

#[test]
fn save_then_load_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state").join("progress.json");
    let mut l = Ledger::default();
    l.update_cursor(41);
    l.mark_completed("a", 42, Path::new("/dl/a"), assets());
    l.permanently_failed_pages.insert(40);
    save(&l, &path).unwrap();
    assert_eq!(load(&path).unwrap(), l);
}

#[test]
fn missing_file_loads_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let l = load(&dir.path().join("progress.json")).unwrap();
    assert_eq!(l, Ledger::default());
}

#[test]
fn corrupt_file_is_set_aside() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("progress.json");
    fs::write(&path, br#"{"cursor_page": 12, "completed": {"#).unwrap();
    let l = load(&path).unwrap();
    assert_eq!(l, Ledger::default());
    assert!(!path.exists());
    let aside: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with("progress.json.corrupt-"))
        .collect();
    assert_eq!(aside.len(), 1);
}

#[test]
fn interrupted_save_leaves_previous_state_readable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("progress.json");
    let mut l = Ledger::default();
    l.update_cursor(10);
    save(&l, &path).unwrap();

    // A save killed before the rename leaves only a partial temp file behind.
    let mut next = l.clone();
    next.update_cursor(7);
    let full = serde_json::to_vec_pretty(&next).unwrap();
    fs::write(dir.path().join(".tmpKILLED"), &full[..full.len() / 2]).unwrap();

    let loaded = load(&path).unwrap();
    assert_eq!(loaded.cursor_page, Some(10));

    save(&next, &path).unwrap();
    assert_eq!(load(&path).unwrap().cursor_page, Some(7));
}

#[tokio::test]
async fn in_memory_store_never_writes() {
    let mut store = LedgerStore::in_memory(Ledger::default());
    store.ledger_mut().update_cursor(3);
    store.commit().await.unwrap();
    assert!(!store.is_persistent());
    assert!(store.ledger().last_updated > 0);
}

#[tokio::test]
async fn store_commit_persists() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("progress.json");
    let mut store = LedgerStore::open(&path).unwrap();
    store.ledger_mut().update_cursor(5);
    store.commit().await.unwrap();
    let reopened = LedgerStore::open(&path).unwrap();
    assert_eq!(reopened.ledger().cursor_page, Some(5));
}

#[test]
fn reconcile_drops_stale_entries_and_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let good = dir.path().join("good");
    let gone = dir.path().join("gone");
    write_valid_item(&good);
    write_valid_item(&gone);

    let mut l = Ledger::default();
    l.mark_completed("good", 1, &good, assets());
    l.mark_completed("gone", 1, &gone, assets());
    fs::remove_file(gone.join("a.mp4")).unwrap();

    let validator = AssetValidator::default();
    let first = l.reconcile(&validator);
    assert_eq!(first.checked, 2);
    assert_eq!(first.removed, vec!["gone".to_string()]);
    assert!(l.is_completed("good"));
    assert!(!l.is_completed("gone"));

    let second = l.reconcile(&validator);
    assert_eq!(second.checked, 1);
    assert!(second.removed.is_empty());
}

#[test]
fn reconcile_keeps_unverifiable_entries() {
    let dir = tempfile::tempdir().unwrap();
    let not_a_dir = dir.path().join("plain-file");
    fs::write(&not_a_dir, b"x").unwrap();

    let mut l = Ledger::default();
    l.mark_completed("odd", 1, &not_a_dir, assets());
    let report = l.reconcile(&AssetValidator::default());
    assert_eq!(report.unverifiable, 1);
    assert!(report.removed.is_empty());
    assert!(l.is_completed("odd"));
}

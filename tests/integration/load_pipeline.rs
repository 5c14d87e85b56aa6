use super::support::{modify_externally, quiet_config, write_wav};
use std::fs;
use wavmeta::coordinator::Coordinator;
use wavmeta::events::CoordinatorEvent;
use wavmeta::load::CancelFlag;

#[tokio::test]
async fn test_load_walks_nested_directories() {
    let dir = tempfile::tempdir().unwrap();
    let day2 = dir.path().join("day2");
    fs::create_dir(&day2).unwrap();
    write_wav(&dir.path().join("a.wav"), "1", "01");
    write_wav(&day2.join("b.WAV"), "2", "01");
    fs::write(dir.path().join("readme.txt"), b"not audio").unwrap();

    let coordinator = Coordinator::new(quiet_config());
    let summary = coordinator.load(dir.path()).await.unwrap();
    assert_eq!(summary.successes, 2);
    assert!(summary.failures.is_empty());
    assert!(!summary.cancelled);

    let paths: Vec<_> = coordinator.records().into_iter().map(|(p, _)| p).collect();
    assert_eq!(paths, vec![dir.path().join("a.wav"), day2.join("b.WAV")]);
}

#[tokio::test]
async fn test_empty_root_reports_zero_progress() {
    let dir = tempfile::tempdir().unwrap();
    let coordinator = Coordinator::new(quiet_config());
    let mut events = coordinator.subscribe();
    let summary = coordinator.load(dir.path()).await.unwrap();
    assert_eq!(summary.successes, 0);

    assert_eq!(
        events.try_recv().unwrap(),
        CoordinatorEvent::LoadProgress { done: 0, total: 0 }
    );
    assert!(matches!(
        events.try_recv().unwrap(),
        CoordinatorEvent::LoadComplete { successes: 0, .. }
    ));
}

#[tokio::test]
async fn test_cancelled_load_adds_no_records() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..8 {
        write_wav(&dir.path().join(format!("{i}.wav")), "1", "01");
    }
    let cancel = CancelFlag::new();
    cancel.cancel();

    let coordinator = Coordinator::new(quiet_config());
    let summary = coordinator.load_with_cancel(dir.path(), cancel).await.unwrap();
    assert!(summary.cancelled);
    assert_eq!(summary.successes, 0);
    assert!(coordinator.records().is_empty());
}

#[tokio::test]
async fn test_reload_keeps_unsaved_edits() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.wav");
    write_wav(&path, "1", "01");

    let coordinator = Coordinator::new(quiet_config());
    coordinator.load(dir.path()).await.unwrap();
    coordinator.edit_field(&path, "Scene", Some("mine")).unwrap();
    modify_externally(&path, "theirs");

    coordinator.load(dir.path()).await.unwrap();
    assert_eq!(
        coordinator.field(&path, "Scene").unwrap().as_deref(),
        Some("mine")
    );
    assert!(coordinator.is_dirty(&path));
}

#[tokio::test]
async fn test_missing_root_is_reported_as_failure() {
    let dir = tempfile::tempdir().unwrap();
    let coordinator = Coordinator::new(quiet_config());
    let summary = coordinator.load(&dir.path().join("nope")).await.unwrap();
    assert_eq!(summary.successes, 0);
    assert_eq!(summary.failures.len(), 1);
}

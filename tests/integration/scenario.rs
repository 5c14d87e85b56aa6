//! Load a shoot day with one damaged file, retake a field, save, re-read.

use super::support::{quiet_config, wav_bytes, write_wav};
use std::fs;
use wavmeta::coordinator::Coordinator;
use wavmeta::error::ErrorKind;
use wavmeta::events::{CoordinatorEvent, SaveOutcome};
use wavmeta::record::MetadataRecord;
use wavmeta::types::ChunkId;

#[tokio::test]
async fn test_edit_take_save_and_reparse() {
    let dir = tempfile::tempdir().unwrap();
    let good = dir.path().join("5-14D_01.wav");
    write_wav(&good, "5.14D", "01");
    let mut damaged = wav_bytes("5.14D", "02", &[0; 64]);
    damaged.truncate(damaged.len() - 20);
    fs::write(dir.path().join("5-14D_02.wav"), damaged).unwrap();
    let data_before = fs::read(&good).unwrap();

    let coordinator = Coordinator::new(quiet_config());
    let mut events = coordinator.subscribe();

    let summary = coordinator.load(dir.path()).await.unwrap();
    assert_eq!(summary.successes, 1);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].kind, ErrorKind::Parse);
    assert_eq!(
        summary.failures[0].path.as_deref(),
        Some(dir.path().join("5-14D_02.wav").as_path())
    );

    let rows = coordinator.records();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].1.scene.as_deref(), Some("5.14D"));
    assert_eq!(rows[0].1.take.as_deref(), Some("01"));

    coordinator.edit_field(&good, "Take", Some("02")).unwrap();
    assert!(coordinator.is_dirty(&good));

    let reports = coordinator.save_all().await;
    assert_eq!(reports.len(), 1);
    assert!(reports[0].result.is_ok());
    assert!(!coordinator.is_dirty(&good));

    let reparsed = MetadataRecord::load(&good).unwrap();
    assert_eq!(reparsed.get_field("Take").unwrap().as_deref(), Some("02"));
    assert_eq!(reparsed.get_field("Scene").unwrap().as_deref(), Some("5.14D"));
    assert_eq!(
        reparsed.get_field("IXML_VERSION").unwrap().as_deref(),
        Some("1.61")
    );

    let original = MetadataRecord::from_document(
        good.clone(),
        wavmeta::codec::parse(&data_before).unwrap(),
        None,
    );
    let data = |record: &MetadataRecord| {
        record
            .chunks()
            .iter()
            .find(|c| c.id == ChunkId::DATA)
            .map(|c| blake3::hash(&c.payload))
    };
    assert_eq!(data(&reparsed), data(&original));

    let mut saw_complete = false;
    let mut saw_saved = false;
    let mut last_progress = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            CoordinatorEvent::LoadProgress { done, total } => {
                assert!(done >= last_progress);
                assert_eq!(total, 2);
                last_progress = done;
            }
            CoordinatorEvent::LoadComplete { successes, failures } => {
                assert_eq!(successes, 1);
                assert_eq!(failures.len(), 1);
                saw_complete = true;
            }
            CoordinatorEvent::SaveComplete { path, outcome } => {
                assert_eq!(path, good);
                assert_eq!(outcome, SaveOutcome::Saved);
                saw_saved = true;
            }
            _ => {}
        }
    }
    assert_eq!(last_progress, 2);
    assert!(saw_complete);
    assert!(saw_saved);
}

#[tokio::test]
async fn test_unedited_files_are_left_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.wav");
    write_wav(&path, "1", "01");
    let before = fs::read(&path).unwrap();

    let coordinator = Coordinator::new(quiet_config());
    coordinator.load(dir.path()).await.unwrap();
    coordinator.edit_field(&path, "Scene", Some("2")).unwrap();
    coordinator.edit_field(&path, "Scene", Some("1")).unwrap();
    assert!(!coordinator.is_dirty(&path));

    let reports = coordinator.save_all().await;
    assert!(reports.is_empty());
    assert_eq!(fs::read(&path).unwrap(), before);
}

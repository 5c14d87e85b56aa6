//! Multi-member commands through the coordinator, against real files.

use super::support::{quiet_config, write_wav};
use wavmeta::command::Command;
use wavmeta::coordinator::Coordinator;
use wavmeta::error::{ApiError, CommandError};

#[tokio::test]
async fn test_failed_batch_undoes_its_rename_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.wav");
    let b = dir.path().join("b.wav");
    write_wav(&a, "1", "01");

    let coordinator = Coordinator::new(quiet_config());
    coordinator.load(dir.path()).await.unwrap();
    let before = coordinator.record(&a).unwrap();

    let batch = Command::Batch {
        description: "Rename and retake".to_string(),
        members: vec![
            Command::RenameFile {
                path: a.clone(),
                old_name: "a.wav".to_string(),
                new_name: "b.wav".to_string(),
            },
            Command::EditField {
                path: b.clone(),
                field: "Take".to_string(),
                old_value: Some("77".to_string()),
                new_value: Some("02".to_string()),
            },
        ],
    };
    match coordinator.execute(batch) {
        Err(ApiError::Command(CommandError::BatchMemberFailed { index, source })) => {
            assert_eq!(index, 1);
            assert!(matches!(*source, CommandError::StaleValue { .. }));
        }
        other => panic!("expected batch failure, got {other:?}"),
    }

    assert!(a.exists());
    assert!(!b.exists());
    assert!(coordinator.record(&b).is_none());
    assert_eq!(coordinator.record(&a).unwrap(), before);
    assert!(!coordinator.can_undo());
}

#[tokio::test]
async fn test_batch_with_rename_undoes_as_one_step() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.wav");
    let b = dir.path().join("b.wav");
    write_wav(&a, "1", "01");

    let coordinator = Coordinator::new(quiet_config());
    coordinator.load(dir.path()).await.unwrap();

    coordinator
        .execute(Command::Batch {
            description: "Rename and retake".to_string(),
            members: vec![
                Command::RenameFile {
                    path: a.clone(),
                    old_name: "a.wav".to_string(),
                    new_name: "b.wav".to_string(),
                },
                Command::EditField {
                    path: b.clone(),
                    field: "Take".to_string(),
                    old_value: Some("01".to_string()),
                    new_value: Some("02".to_string()),
                },
            ],
        })
        .unwrap();
    assert!(b.exists());
    assert_eq!(coordinator.field(&b, "Take").unwrap().as_deref(), Some("02"));

    assert_eq!(coordinator.undo().unwrap(), "Rename and retake");
    assert!(a.exists());
    assert!(!b.exists());
    assert_eq!(coordinator.field(&a, "Take").unwrap().as_deref(), Some("01"));
    assert!(!coordinator.is_dirty(&a));
}

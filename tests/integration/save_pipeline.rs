use super::support::{leftover_siblings, modify_externally, quiet_config, write_wav};
use std::fs;
use wavmeta::coordinator::{Coordinator, Resolution};
use wavmeta::error::SaveError;
use wavmeta::events::ConflictKind;
use wavmeta::record::MetadataRecord;

#[tokio::test]
async fn test_save_refuses_externally_modified_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.wav");
    write_wav(&path, "1", "01");

    let coordinator = Coordinator::new(quiet_config());
    coordinator.load(dir.path()).await.unwrap();
    coordinator.edit_field(&path, "Scene", Some("mine")).unwrap();
    modify_externally(&path, "theirs");
    let theirs = fs::read(&path).unwrap();

    let reports = coordinator.save_all().await;
    assert!(matches!(reports[0].result, Err(SaveError::Conflict(_))));
    assert_eq!(fs::read(&path).unwrap(), theirs);
    assert!(coordinator.is_dirty(&path));
    assert_eq!(
        coordinator.conflicts(),
        vec![(path.clone(), ConflictKind::ModifiedExternally)]
    );
    assert!(leftover_siblings(dir.path()).is_empty());

    coordinator
        .resolve_conflict(&path, Resolution::KeepMine)
        .unwrap();
    let reports = coordinator.save_all().await;
    assert!(reports[0].result.is_ok());
    let saved = MetadataRecord::load(&path).unwrap();
    assert_eq!(saved.get_field("Scene").unwrap().as_deref(), Some("mine"));
}

#[tokio::test]
async fn test_validation_gate() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.wav");
    write_wav(&path, "1", "01");
    let before = fs::read(&path).unwrap();

    let mut config = quiet_config();
    config.validation.block_save_on_invalid = true;
    let coordinator = Coordinator::new(config);
    coordinator.load(dir.path()).await.unwrap();
    coordinator.edit_field(&path, "Take", Some("one")).unwrap();

    let reports = coordinator.save(&[path.clone()]).await;
    match &reports[0].result {
        Err(SaveError::Invalid { issues, .. }) => {
            assert!(issues.iter().any(|i| i.contains("not numeric")));
        }
        other => panic!("expected validation failure, got {other:?}"),
    }
    assert_eq!(fs::read(&path).unwrap(), before);
    assert!(coordinator.is_dirty(&path));
    assert!(!coordinator.validity(&path).unwrap().is_valid());
}

#[tokio::test]
async fn test_failed_save_leaves_record_dirty_and_original_intact() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.wav");
    write_wav(&path, "1", "01");

    let coordinator = Coordinator::new(quiet_config());
    coordinator.load(dir.path()).await.unwrap();
    coordinator.edit_field(&path, "Scene", Some("2")).unwrap();
    fs::remove_file(&path).unwrap();

    let reports = coordinator.save_all().await;
    assert!(matches!(reports[0].result, Err(SaveError::Conflict(_))));
    assert!(!path.exists());
    assert!(coordinator.is_dirty(&path));
    assert_eq!(coordinator.conflicts(), vec![(path.clone(), ConflictKind::Removed)]);

    coordinator
        .resolve_conflict(&path, Resolution::ReloadTheirs)
        .unwrap();
    assert!(coordinator.record(&path).is_none());
}

#[tokio::test]
async fn test_rename_then_save_writes_new_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.wav");
    write_wav(&path, "1", "01");

    let coordinator = Coordinator::new(quiet_config());
    coordinator.load(dir.path()).await.unwrap();
    coordinator.rename_file(&path, "5-14D_01.wav").unwrap();
    let renamed = dir.path().join("5-14D_01.wav");
    coordinator.edit_field(&renamed, "Scene", Some("5.14D")).unwrap();

    let reports = coordinator.save_all().await;
    assert_eq!(reports[0].path, renamed);
    assert!(reports[0].result.is_ok());
    let saved = MetadataRecord::load(&renamed).unwrap();
    assert_eq!(saved.get_field("Scene").unwrap().as_deref(), Some("5.14D"));
    assert!(!path.exists());
}

use super::support::{leftover_siblings, modify_externally, quiet_config, wait_for, write_wav};
use std::sync::Arc;
use std::time::Duration;
use wavmeta::agent::AgentState;
use wavmeta::config::WavMetaConfig;
use wavmeta::coordinator::Coordinator;
use wavmeta::events::{ConflictKind, CoordinatorEvent};
use wavmeta::record::MetadataRecord;

fn with_agents(autosave: bool, watcher: bool, validation: bool) -> WavMetaConfig {
    let mut config = quiet_config();
    config.autosave.enabled = autosave;
    config.autosave.interval_ms = 2;
    config.watcher.enabled = watcher;
    config.watcher.interval_ms = 5;
    config.watcher.use_notify = false;
    config.validation.enabled = validation;
    config.validation.interval_ms = 5;
    config
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_writer_under_concurrent_autosave_and_edits() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.wav");
    write_wav(&path, "1", "0");

    let coordinator = Arc::new(Coordinator::new(with_agents(true, false, false)));
    coordinator.load(dir.path()).await.unwrap();
    coordinator.start_agents();

    let editor = {
        let coordinator = coordinator.clone();
        let path = path.clone();
        tokio::task::spawn_blocking(move || {
            for take in 1..=200 {
                coordinator
                    .edit_field(&path, "Take", Some(&take.to_string()))
                    .unwrap();
            }
        })
    };
    editor.await.unwrap();

    coordinator.shutdown().await;
    coordinator.save_all().await;

    assert!(!coordinator.is_dirty(&path));
    let on_disk = MetadataRecord::load(&path).unwrap();
    assert_eq!(on_disk.get_field("Take").unwrap().as_deref(), Some("200"));
    assert_eq!(on_disk.get_field("Scene").unwrap().as_deref(), Some("1"));
    assert!(coordinator.conflicts().is_empty());
    assert!(leftover_siblings(dir.path()).is_empty());

    let mut undone = 0;
    while coordinator.can_undo() {
        coordinator.undo().unwrap();
        undone += 1;
    }
    assert_eq!(undone, 50);
    assert_eq!(
        coordinator.field(&path, "Take").unwrap().as_deref(),
        Some("150")
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_watcher_flags_conflict_for_dirty_record() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.wav");
    write_wav(&path, "1", "01");

    let coordinator = Coordinator::new(with_agents(false, true, false));
    coordinator.load(dir.path()).await.unwrap();
    let mut events = coordinator.subscribe();
    coordinator.edit_field(&path, "Scene", Some("mine")).unwrap();
    coordinator.start_agents();
    modify_externally(&path, "theirs");

    wait_for(|| !coordinator.conflicts().is_empty()).await;
    assert_eq!(
        coordinator.conflicts(),
        vec![(path.clone(), ConflictKind::ModifiedExternally)]
    );
    assert_eq!(
        coordinator.field(&path, "Scene").unwrap().as_deref(),
        Some("mine")
    );

    let mut conflict_events = 0;
    tokio::time::sleep(Duration::from_millis(30)).await;
    while let Ok(event) = events.try_recv() {
        if matches!(event, CoordinatorEvent::ConflictDetected { .. }) {
            conflict_events += 1;
        }
    }
    assert_eq!(conflict_events, 1);
    coordinator.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_watcher_reloads_clean_record() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.wav");
    write_wav(&path, "1", "01");

    let coordinator = Coordinator::new(with_agents(false, true, false));
    coordinator.load(dir.path()).await.unwrap();
    coordinator.start_agents();
    modify_externally(&path, "theirs");

    wait_for(|| {
        coordinator.field(&path, "Scene").ok().flatten().as_deref() == Some("theirs")
    })
    .await;
    assert!(!coordinator.is_dirty(&path));
    coordinator.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_completes_in_flight_save() {
    let dir = tempfile::tempdir().unwrap();
    let paths: Vec<_> = (0..6).map(|i| dir.path().join(format!("{i}.wav"))).collect();
    for path in &paths {
        write_wav(path, "1", "01");
    }

    let coordinator = Coordinator::new(with_agents(true, false, false));
    coordinator.load(dir.path()).await.unwrap();
    coordinator.start_agents();
    coordinator
        .batch_edit(&paths, "Note", Some("wild track"))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(3)).await;
    coordinator.shutdown().await;

    assert!(leftover_siblings(dir.path()).is_empty());
    for path in &paths {
        let on_disk = MetadataRecord::load(path).unwrap();
        let note = on_disk.get_field("Note").unwrap();
        assert_eq!(note.is_some(), !coordinator.is_dirty(path));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_validation_agent_publishes_status() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.wav");
    write_wav(&path, "1", "x1");

    let coordinator = Coordinator::new(with_agents(false, false, true));
    coordinator.load(dir.path()).await.unwrap();
    coordinator.start_agents();

    wait_for(|| coordinator.validity(&path).is_some()).await;
    let report = coordinator.validity(&path).unwrap();
    assert!(!report.is_valid());
    assert!(report.issues().iter().any(|i| i.starts_with("Take")));
    assert!(!coordinator.is_dirty(&path));

    coordinator.edit_field(&path, "Take", Some("1")).unwrap();
    wait_for(|| coordinator.validity(&path).map(|r| r.is_valid()).unwrap_or(false)).await;
    coordinator.shutdown().await;

    let states = coordinator.agent_states();
    assert!(states
        .iter()
        .any(|(id, state)| *id == "validation" && *state == AgentState::Stopped));
    assert!(states
        .iter()
        .any(|(id, state)| *id == "autosave" && *state == AgentState::Idle));
}

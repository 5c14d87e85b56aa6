use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};
use wavmeta::codec::{write_riff, ChunkRecord};
use wavmeta::config::WavMetaConfig;
use wavmeta::types::ChunkId;

pub fn wav_bytes(scene: &str, take: &str, data: &[u8]) -> Vec<u8> {
    let ixml = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<BWFXML><IXML_VERSION>1.61</IXML_VERSION><SCENE>{scene}</SCENE><TAKE>{take}</TAKE></BWFXML>"
    );
    write_riff(&[
        ChunkRecord::new(ChunkId::FMT, vec![1, 0, 1, 0, 0x80, 0xbb, 0, 0, 0, 0x77, 1, 0, 2, 0, 16, 0]),
        ChunkRecord::new(ChunkId::IXML, ixml.into_bytes()),
        ChunkRecord::new(ChunkId::DATA, data.to_vec()),
    ])
    .unwrap()
}

pub fn write_wav(path: &Path, scene: &str, take: &str) {
    fs::write(path, wav_bytes(scene, take, &[9; 101])).unwrap();
}

/// Rewrite `path` as another program would, with an mtime no earlier load can match.
pub fn modify_externally(path: &Path, scene: &str) {
    write_wav(path, scene, "99");
    let file = fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(3600))
        .unwrap();
}

/// No agents, no autosave; tests drive everything explicitly.
pub fn quiet_config() -> WavMetaConfig {
    let mut config = WavMetaConfig::default();
    config.load.start_agents = false;
    config.autosave.enabled = false;
    config.watcher.enabled = false;
    config.validation.enabled = false;
    config
}

pub fn leftover_siblings(dir: &Path) -> Vec<String> {
    fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with('.'))
        .collect()
}

pub async fn wait_for(mut check: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached within timeout");
}

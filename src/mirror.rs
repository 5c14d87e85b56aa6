//! Take-review mirror
//!
//! Copies loaded files into `<destination>/DayNN/Takes/` for review. The copy is
//! of the file on disk, so unsaved edits are not part of it. Modification times
//! are carried over.

use crate::error::MirrorError;
use crate::load::CancelFlag;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const TAKES_DIR: &str = "Takes";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorOptions {
    pub destination: PathBuf,
    pub day: u32,
    /// Replace files already present in the mirror.
    pub overwrite: bool,
}

impl MirrorOptions {
    /// `<destination>/DayNN/Takes`.
    pub fn takes_dir(&self) -> PathBuf {
        self.destination
            .join(format!("Day{:02}", self.day))
            .join(TAKES_DIR)
    }
}

#[derive(Debug)]
pub struct MirrorReport {
    pub source: PathBuf,
    pub target: PathBuf,
    pub result: Result<(), MirrorError>,
}

fn io_error<'a>(path: &'a Path, op: &'static str) -> impl FnOnce(std::io::Error) -> MirrorError + 'a {
    move |source| MirrorError::Io {
        path: path.to_path_buf(),
        op,
        source,
    }
}

fn copy_one(source: &Path, target: &Path, overwrite: bool) -> Result<(), MirrorError> {
    if target.exists() && !overwrite {
        return Err(MirrorError::Exists(target.to_path_buf()));
    }
    let modified = fs::metadata(source)
        .and_then(|m| m.modified())
        .map_err(io_error(source, "stat"))?;
    fs::copy(source, target).map_err(io_error(target, "copy"))?;
    fs::File::options()
        .write(true)
        .open(target)
        .and_then(|file| file.set_modified(modified))
        .map_err(io_error(target, "set modified time"))?;
    Ok(())
}

/// Copy `paths` into the options' takes folder, one report per path. Only failing
/// to create the folder fails the whole mirror.
pub fn mirror_takes(
    paths: &[PathBuf],
    options: &MirrorOptions,
    cancel: &CancelFlag,
) -> Result<Vec<MirrorReport>, MirrorError> {
    let dir = options.takes_dir();
    fs::create_dir_all(&dir).map_err(io_error(&dir, "create directory"))?;

    let mut reports = Vec::with_capacity(paths.len());
    for source in paths {
        let name = source.file_name().unwrap_or(source.as_os_str());
        let target = dir.join(name);
        let result = if cancel.is_cancelled() {
            Err(MirrorError::Cancelled(source.clone()))
        } else {
            copy_one(source, &target, options.overwrite)
        };
        match &result {
            Ok(()) => debug!(source = %source.display(), target = %target.display(), "Mirrored file"),
            Err(err) => warn!(source = %source.display(), error = %err, "Mirror copy failed"),
        }
        reports.push(MirrorReport {
            source: source.clone(),
            target,
            result,
        });
    }

    let copied = reports.iter().filter(|r| r.result.is_ok()).count();
    info!(dir = %dir.display(), copied, failed = reports.len() - copied, "Mirror complete");
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};

    fn options(destination: &Path, overwrite: bool) -> MirrorOptions {
        MirrorOptions {
            destination: destination.to_path_buf(),
            day: 3,
            overwrite,
        }
    }

    #[test]
    fn test_copies_into_day_takes_folder() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        let a = src.path().join("a.wav");
        fs::write(&a, b"take a").unwrap();
        let stamp = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        fs::File::options().write(true).open(&a).unwrap().set_modified(stamp).unwrap();

        let reports = mirror_takes(&[a.clone()], &options(dst.path(), false), &CancelFlag::new()).unwrap();
        let target = dst.path().join("Day03").join("Takes").join("a.wav");
        assert_eq!(reports[0].target, target);
        assert!(reports[0].result.is_ok());
        assert_eq!(fs::read(&target).unwrap(), b"take a");
        assert_eq!(fs::metadata(&target).unwrap().modified().unwrap(), stamp);
    }

    #[test]
    fn test_existing_target_needs_overwrite() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        let a = src.path().join("a.wav");
        fs::write(&a, b"new").unwrap();
        let opts = options(dst.path(), false);
        fs::create_dir_all(opts.takes_dir()).unwrap();
        fs::write(opts.takes_dir().join("a.wav"), b"old").unwrap();

        let reports = mirror_takes(&[a.clone()], &opts, &CancelFlag::new()).unwrap();
        assert!(matches!(reports[0].result, Err(MirrorError::Exists(_))));
        assert_eq!(fs::read(opts.takes_dir().join("a.wav")).unwrap(), b"old");

        let reports = mirror_takes(&[a], &options(dst.path(), true), &CancelFlag::new()).unwrap();
        assert!(reports[0].result.is_ok());
        assert_eq!(fs::read(opts.takes_dir().join("a.wav")).unwrap(), b"new");
    }

    #[test]
    fn test_missing_source_and_cancel_report_per_file() {
        let dst = tempfile::tempdir().unwrap();
        let gone = dst.path().join("gone.wav");
        let reports = mirror_takes(&[gone], &options(dst.path(), false), &CancelFlag::new()).unwrap();
        assert!(matches!(reports[0].result, Err(MirrorError::Io { op: "stat", .. })));

        let cancel = CancelFlag::new();
        cancel.cancel();
        let reports =
            mirror_takes(&[dst.path().join("x.wav")], &options(dst.path(), false), &cancel).unwrap();
        assert!(matches!(reports[0].result, Err(MirrorError::Cancelled(_))));
    }
}

//! File lifecycle probe
//!
//! open(O_WRONLY|O_TRUNC|O_CREAT) -> write -> close -> open(O_RDONLY) -> read
//! -> close, optionally with an independent O_RDWR|O_TRUNC|O_CREAT handle held
//! open across the write and read. The payload is opaque bytes: embedded NULs
//! are data, not terminators.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::HarnessError;
use crate::scenario::FileScenario;

const FILE_MODE: u32 = 0o644;

/// Removes the scratch file when dropped unless asked to keep it
struct ScratchFile {
    path: PathBuf,
    keep: bool,
}

impl ScratchFile {
    fn new(path: &Path, keep: bool) -> Self {
        Self {
            path: path.to_path_buf(),
            keep,
        }
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if self.keep {
            debug!(path = %self.path.display(), "keeping scratch file");
            return;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "removed scratch file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to remove scratch file"),
        }
    }
}

fn open_with(path: &Path, options: &OpenOptions, step: &str) -> Result<File, HarnessError> {
    options
        .open(path)
        .map_err(|e| HarnessError::resource(format!("{} {}", step, path.display()), e))
}

/// Run a file scenario
pub fn run(scenario: &FileScenario) -> Result<Option<String>, HarnessError> {
    let payload = scenario.declared_payload()?;
    let path = scenario.path.as_path();

    let mut writer = open_with(
        path,
        OpenOptions::new()
            .write(true)
            .truncate(true)
            .create(true)
            .mode(FILE_MODE),
        "open for writing",
    )?;
    // Armed only once we own the file; a refused open leaves the path alone
    let _scratch = ScratchFile::new(path, scenario.keep);

    let second = if scenario.second_handle {
        Some(open_with(
            path,
            OpenOptions::new()
                .read(true)
                .write(true)
                .truncate(true)
                .create(true)
                .mode(FILE_MODE),
            "open second handle",
        )?)
    } else {
        None
    };

    writer
        .write_all(&payload)
        .map_err(|e| HarnessError::resource(format!("write {}", path.display()), e))?;
    drop(writer);

    let read_back = read_declared(path, payload.len())?;
    compare(&payload, &read_back)?;

    if let Some(handle) = second {
        drop(handle);
        // Closing the second handle must not disturb what the first one wrote
        let after = read_declared(path, payload.len())?;
        compare(&payload, &after).map_err(|e| match e {
            HarnessError::AssertionMismatch(msg) => HarnessError::AssertionMismatch(format!(
                "after closing second handle: {}",
                msg
            )),
            other => other,
        })?;
    }

    Ok(Some(format!(
        "{} bytes round-tripped through {}",
        payload.len(),
        path.display()
    )))
}

/// Reopen read-only and read exactly `len` bytes; the file must hold no more
fn read_declared(path: &Path, len: usize) -> Result<Vec<u8>, HarnessError> {
    let mut reader = open_with(path, OpenOptions::new().read(true), "open for reading")?;

    let on_disk = reader
        .metadata()
        .map_err(|e| HarnessError::resource(format!("stat {}", path.display()), e))?
        .len();
    if on_disk != len as u64 {
        return Err(HarnessError::AssertionMismatch(format!(
            "file holds {} bytes, expected {}",
            on_disk, len
        )));
    }

    let mut buf = vec![0u8; len];
    match reader.read_exact(&mut buf) {
        Ok(()) => Ok(buf),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(
            HarnessError::AssertionMismatch(format!("short read: expected {} bytes", len)),
        ),
        Err(e) => Err(HarnessError::resource(format!("read {}", path.display()), e)),
    }
}

fn compare(written: &[u8], read: &[u8]) -> Result<(), HarnessError> {
    if written == read {
        return Ok(());
    }
    let offset = written
        .iter()
        .zip(read)
        .position(|(a, b)| a != b)
        .unwrap_or(written.len().min(read.len()));
    Err(HarnessError::AssertionMismatch(format!(
        "read-back differs at byte {}: wrote {}, read {}",
        offset,
        hex::encode(written),
        hex::encode(read)
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn scenario_in(dir: &TempDir, bytes: &[u8]) -> FileScenario {
        FileScenario::with_bytes(dir.path().join("payload.bin"), bytes)
    }

    #[test]
    fn test_roundtrip_with_embedded_nul() {
        let dir = TempDir::new().unwrap();
        let scenario = scenario_in(&dir, b"This is some data written to a file\0\xFF");

        let msg = run(&scenario).unwrap().unwrap();

        assert!(msg.starts_with("37 bytes"));
        assert!(!scenario.path.exists(), "scratch file should be removed");
    }

    #[test]
    fn test_declared_length_truncates_payload() {
        let dir = TempDir::new().unwrap();
        let mut scenario = scenario_in(&dir, b"abcdef");
        scenario.length = Some(3);
        scenario.keep = true;

        run(&scenario).unwrap();

        assert_eq!(fs::read(&scenario.path).unwrap(), b"abc");
    }

    #[test]
    fn test_empty_payload() {
        let dir = TempDir::new().unwrap();
        let scenario = scenario_in(&dir, b"");
        assert!(run(&scenario).is_ok());
    }

    #[test]
    fn test_without_second_handle() {
        let dir = TempDir::new().unwrap();
        let mut scenario = scenario_in(&dir, b"single");
        scenario.second_handle = false;
        assert!(run(&scenario).is_ok());
    }

    #[test]
    fn test_missing_directory_is_resource_error() {
        let dir = TempDir::new().unwrap();
        let scenario =
            FileScenario::with_bytes(dir.path().join("missing").join("f.bin"), b"x");

        let err = run(&scenario).unwrap_err();

        assert!(matches!(err, HarnessError::Resource { .. }));
        assert!(err.to_string().contains("open for writing"));
    }

    #[test]
    fn test_compare_reports_offset() {
        let err = compare(b"abcd", b"abXd").unwrap_err();
        assert!(matches!(err, HarnessError::AssertionMismatch(_)));
        assert!(err.to_string().contains("byte 2"));
    }

    #[test]
    fn test_read_declared_detects_length_mismatch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("short.bin");
        fs::write(&path, b"ab").unwrap();

        let err = read_declared(&path, 4).unwrap_err();
        assert!(err.to_string().contains("file holds 2 bytes, expected 4"));
    }

    #[test]
    fn test_scratch_file_guard_removes_on_error_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("guarded.bin");
        {
            let _guard = ScratchFile::new(&path, false);
            fs::write(&path, b"x").unwrap();
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_failed_open_leaves_existing_entry() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("loop");
        std::os::unix::fs::symlink(&path, &path).unwrap();

        let err = run(&FileScenario::with_bytes(&path, b"x")).unwrap_err();

        assert!(err.to_string().contains("open for writing"));
        assert!(fs::symlink_metadata(&path).unwrap().file_type().is_symlink());
    }
}

use std::{
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use tempfile::NamedTempFile;

use crate::error::{Error, Result};

/// Write-then-rename wrapper so readers never observe a half-written artifact.
pub(crate) struct PendingWrite {
    target: PathBuf,
    tmp: NamedTempFile,
}

/// Open a temp file next to `target`, creating the parent directory if needed.
pub(crate) fn open_for_write(target: &Path) -> Result<PendingWrite> {
    let parent = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;

    let tmp = NamedTempFile::new_in(parent).map_err(|e| Error::io(parent, e))?;
    Ok(PendingWrite { target: target.to_path_buf(), tmp })
}

impl Write for PendingWrite {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.tmp.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.tmp.flush()
    }
}

impl PendingWrite {
    /// Flush, fsync and rename the temp file over the target.
    pub(crate) fn finalize(mut self) -> Result<()> {
        self.tmp.flush().map_err(|e| Error::io(&self.target, e))?;
        self.tmp.as_file().sync_all().ok(); // best-effort fsync file
        self.tmp.persist(&self.target).map_err(|e| Error::io(&self.target, e.error))?;
        if let Some(dir) = self.target.parent() {
            let _ = File::open(dir).and_then(|f| f.sync_all());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_appears_only_after_finalize() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested").join("out.json");

        let mut pending = open_for_write(&target).unwrap();
        pending.write_all(b"{}").unwrap();
        assert!(!target.exists());

        pending.finalize().unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "{}");
    }

    #[test]
    fn finalize_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.json");
        fs::write(&target, "old").unwrap();

        let mut pending = open_for_write(&target).unwrap();
        pending.write_all(b"new").unwrap();
        pending.finalize().unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "new");
    }

    #[test]
    fn dropped_write_leaves_no_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.json");
        {
            let mut pending = open_for_write(&target).unwrap();
            pending.write_all(b"partial").unwrap();
        }
        assert!(!target.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}

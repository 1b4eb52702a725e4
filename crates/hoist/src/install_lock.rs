use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::CliError;

/// Exclusive lock held for the whole download-to-`after_install` sequence so
/// two installs never race on the plugins directory.
pub struct InstallLock {
    file: File,
    path: PathBuf,
}

impl InstallLock {
    pub fn acquire(path: &Path) -> Result<Self, CliError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|error| CliError::io("failed to create lock directory", error))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(|error| CliError::io("failed to open install lock", error))?;

        match file.try_lock_exclusive() {
            Ok(()) => {}
            Err(error) if error.kind() == std::io::ErrorKind::WouldBlock => {
                return Err(CliError::AlreadyRunning);
            }
            Err(error) => return Err(CliError::io("failed to acquire install lock", error)),
        }

        file.set_len(0)
            .and_then(|()| file.seek(SeekFrom::Start(0)).map(|_| ()))
            .and_then(|()| writeln!(file, "{}", std::process::id()))
            .map_err(|error| CliError::io("failed to write install lock metadata", error))?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstallLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::InstallLock;
    use crate::error::CliError;

    #[test]
    fn second_acquire_fails_until_first_is_dropped() {
        let temp_dir = tempfile::tempdir().expect("temporary directory should be created");
        let path = temp_dir.path().join("install.lock");

        let first = InstallLock::acquire(&path).expect("first lock should succeed");
        assert_eq!(first.path(), path);
        assert!(matches!(
            InstallLock::acquire(&path),
            Err(CliError::AlreadyRunning)
        ));

        drop(first);
        assert!(InstallLock::acquire(&path).is_ok());
    }
}

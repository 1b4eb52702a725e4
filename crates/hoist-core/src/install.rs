use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::error::UpdateError;

/// What the host installer reports once a package has been copied into place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallResult {
    pub destination: PathBuf,
}

impl InstallResult {
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        Self {
            destination: destination.into(),
        }
    }

    #[must_use]
    pub fn destination_name(&self) -> Option<&str> {
        self.destination.file_name().and_then(|name| name.to_str())
    }
}

/// Remote archives unpack into `<owner>-<repo>-<ref>/`. Return the first
/// child of `extracted` (by name) that holds `manifest_file`, or `extracted`
/// itself when no child does.
#[must_use]
pub fn fix_extracted_path(extracted: &Path, manifest_file: &str) -> PathBuf {
    if !extracted.is_dir() {
        return extracted.to_path_buf();
    }

    let Ok(entries) = std::fs::read_dir(extracted) else {
        warn!("Could not scan {}", extracted.display());
        return extracted.to_path_buf();
    };

    let mut children: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    children.sort();

    if let Some(root) = children
        .into_iter()
        .find(|child| child.join(manifest_file).is_file())
    {
        debug!("Package root is {}", root.display());
        return root;
    }

    extracted.to_path_buf()
}

/// Move `installed` to `expected`, replacing whatever is there. No-op when
/// they are already the same directory.
///
/// # Errors
/// Returns [`UpdateError::FilesystemFatal`] when the old directory cannot be
/// removed or the new one cannot be moved.
pub fn relocate(installed: &Path, expected: &Path) -> Result<PathBuf, UpdateError> {
    if installed == expected {
        return Ok(expected.to_path_buf());
    }
    if !installed.is_dir() {
        return Err(UpdateError::filesystem(
            "installed package is missing",
            installed,
            &std::io::Error::from(std::io::ErrorKind::NotFound),
        ));
    }

    info!(
        "Moving installed package {} to {}",
        installed.display(),
        expected.display()
    );

    if expected.is_dir() {
        std::fs::remove_dir_all(expected).map_err(|error| {
            UpdateError::filesystem("failed to remove previous package", expected, &error)
        })?;
    }

    move_dir(installed, expected)?;
    Ok(expected.to_path_buf())
}

fn move_dir(src: &Path, dest: &Path) -> Result<(), UpdateError> {
    if std::fs::rename(src, dest).is_ok() {
        return Ok(());
    }

    copy_dir_recursive(src, dest)?;
    std::fs::remove_dir_all(src).map_err(|error| {
        UpdateError::filesystem("failed to clean up installed directory", src, &error)
    })?;
    Ok(())
}

fn copy_dir_recursive(src: &Path, dest: &Path) -> Result<(), UpdateError> {
    std::fs::create_dir_all(dest)
        .map_err(|error| UpdateError::filesystem("failed to create directory", dest, &error))?;

    for entry in std::fs::read_dir(src)
        .map_err(|error| UpdateError::filesystem("failed to read directory", src, &error))?
    {
        let entry = entry.map_err(|error| {
            UpdateError::filesystem("failed to read directory entry", src, &error)
        })?;
        let src_path = entry.path();
        let dest_path = dest.join(entry.file_name());

        if src_path.is_dir() {
            copy_dir_recursive(&src_path, &dest_path)?;
        } else {
            std::fs::copy(&src_path, &dest_path).map_err(|error| {
                UpdateError::filesystem("failed to copy package file", &src_path, &error)
            })?;
        }
    }
    Ok(())
}

//! Package download and unpacking for hosts that do not bring their own
//! installer.

use std::io::Read;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

const PACKAGE_FILE_NAME: &str = "package.zip";

#[derive(Debug, Clone)]
pub enum InstallProgress {
    Downloading { downloaded: u64, total: u64 },
    Extracting,
    Installing,
    Complete(PathBuf),
    Failed(String),
}

#[derive(Debug, Error)]
pub enum PackageError {
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{context}: {source}")]
    Http {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{context}: {source}")]
    Zip {
        context: &'static str,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("{0}")]
    Invalid(String),
}

impl PackageError {
    fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }

    fn http(context: &'static str, source: reqwest::Error) -> Self {
        Self::Http { context, source }
    }

    fn zip(context: &'static str, source: zip::result::ZipError) -> Self {
        Self::Zip { context, source }
    }

    fn io_with_path(context: &'static str, path: &Path, source: &std::io::Error) -> Self {
        Self::io(
            context,
            std::io::Error::new(source.kind(), format!("{}: {source}", path.display())),
        )
    }
}

/// A fetched package archive on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedPackage {
    pub path: PathBuf,
    pub size: u64,
    /// Lowercase hex SHA-256 of the bytes as received.
    pub sha256: String,
}

/// Stream `url` into `dir/package.zip`, hashing the body as it arrives.
///
/// # Errors
/// Returns an error when the request fails, the server answers with a
/// non-success status, or the file cannot be written.
pub async fn download_package(
    client: &reqwest::Client,
    url: &str,
    dir: &Path,
    progress: Option<&mpsc::Sender<InstallProgress>>,
) -> Result<DownloadedPackage, PackageError> {
    use futures_util::StreamExt;

    info!("Downloading package from {url}");
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|error| PackageError::http("download request failed", error))?;

    let status = response.status();
    if !status.is_success() {
        return Err(PackageError::Invalid(format!(
            "package download answered HTTP {status}"
        )));
    }

    let path = dir.join(PACKAGE_FILE_NAME);
    let total = response.content_length().unwrap_or(0);
    let mut file = tokio::fs::File::create(&path)
        .await
        .map_err(|error| PackageError::io_with_path("failed to create package file", &path, &error))?;
    let mut hasher = Sha256::new();
    let mut size: u64 = 0;

    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|error| PackageError::http("package body interrupted", error))?;
        hasher.update(&chunk);
        file.write_all(&chunk)
            .await
            .map_err(|error| PackageError::io_with_path("failed to write package", &path, &error))?;
        size += chunk.len() as u64;
        if let Some(progress) = progress {
            let _ = progress
                .send(InstallProgress::Downloading {
                    downloaded: size,
                    total,
                })
                .await;
        }
    }
    file.flush()
        .await
        .map_err(|error| PackageError::io_with_path("failed to write package", &path, &error))?;

    let sha256 = format!("{:x}", hasher.finalize());
    info!("Fetched {size} bytes, sha256 {sha256}");
    Ok(DownloadedPackage { path, size, sha256 })
}

/// Unpack `zip_path` into `dest` and return how many files were written.
/// Entries whose names would land outside `dest` are skipped.
///
/// # Errors
/// Returns an error when the archive is unreadable or empty, or a file
/// cannot be written.
pub fn extract_zip(zip_path: &Path, dest: &Path) -> Result<usize, PackageError> {
    let file = std::fs::File::open(zip_path)
        .map_err(|error| PackageError::io_with_path("failed to open package", zip_path, &error))?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|error| PackageError::zip("package is not a zip archive", error))?;
    if archive.is_empty() {
        return Err(PackageError::Invalid("package archive is empty".to_string()));
    }

    let mut written = 0;
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|error| PackageError::zip("unreadable archive entry", error))?;
        let Some(relative) = entry.enclosed_name() else {
            warn!("Skipping archive entry outside the package: {}", entry.name());
            continue;
        };
        let target = dest.join(relative);

        if entry.is_dir() {
            make_dir(&target)?;
        } else {
            let mode = entry.unix_mode();
            unpack_file(&mut entry, &target, mode)?;
            written += 1;
        }
    }

    debug!("Unpacked {written} files into {}", dest.display());
    Ok(written)
}

fn make_dir(path: &Path) -> Result<(), PackageError> {
    std::fs::create_dir_all(path)
        .map_err(|error| PackageError::io_with_path("failed to create directory", path, &error))
}

fn unpack_file(
    entry: &mut impl Read,
    target: &Path,
    mode: Option<u32>,
) -> Result<(), PackageError> {
    if let Some(parent) = target.parent() {
        make_dir(parent)?;
    }
    let mut out = std::fs::File::create(target)
        .map_err(|error| PackageError::io_with_path("failed to create file", target, &error))?;
    std::io::copy(entry, &mut out)
        .map_err(|error| PackageError::io_with_path("failed to unpack file", target, &error))?;

    #[cfg(unix)]
    if let Some(mode) = mode {
        use std::os::unix::fs::PermissionsExt;
        if let Err(error) = std::fs::set_permissions(target, std::fs::Permissions::from_mode(mode))
        {
            debug!("Keeping default mode for {}: {error}", target.display());
        }
    }
    #[cfg(not(unix))]
    let _ = mode;

    Ok(())
}

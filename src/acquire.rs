#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Fetches submission content for a repository + ref into an ephemeral,
//! isolated workspace.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use uuid::Uuid;

use crate::{
    config,
    error::AcquisitionError,
    github::{GitHubClient, RepoRef},
};

/// An acquired submission workspace.
///
/// The workspace is a scoped resource: dropping it removes the downloaded
/// archive and extraction tree, so cleanup fires on every exit path of a
/// grading call. Removal failures are logged and never escalated.
#[derive(Debug)]
pub struct Workspace {
    /// Unique directory holding the archive and extraction tree.
    root:         PathBuf,
    /// The single folder inside the archive that holds the actual content.
    content_root: PathBuf,
}

impl Workspace {
    /// Returns the directory holding the submission content.
    pub fn content_root(&self) -> &Path {
        &self.content_root
    }

    /// Returns the workspace root (archive + extraction tree).
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.root) {
            tracing::warn!("Could not clean up workspace {}: {e}", self.root.display());
        }
    }
}

/// Downloads and unpacks submission archives.
#[derive(Clone)]
pub struct RepositoryAcquirer {
    /// Hosting API handle used for archive downloads.
    github:            GitHubClient,
    /// Directory under which per-submission workspaces are created.
    staging_dir:       PathBuf,
    /// Deadline for the archive download.
    download_timeout:  Duration,
    /// Ceiling on archive size in bytes.
    max_archive_bytes: u64,
}

impl RepositoryAcquirer {
    /// Creates an acquirer from explicit parts.
    pub fn new(
        github: GitHubClient,
        staging_dir: PathBuf,
        download_timeout: Duration,
        max_archive_bytes: u64,
    ) -> Self {
        Self {
            github,
            staging_dir,
            download_timeout,
            max_archive_bytes,
        }
    }

    /// Creates an acquirer using the global configuration for staging
    /// directory, timeout, and size cap.
    pub fn from_config(github: GitHubClient) -> Self {
        let cfg = config::get();
        Self::new(
            github,
            cfg.staging_dir().clone(),
            cfg.download_timeout(),
            cfg.max_archive_bytes(),
        )
    }

    /// Downloads the archive of `reference` and extracts it into a uniquely
    /// named workspace, returning a guard whose drop removes everything.
    ///
    /// `label` names the workspace directory (a caller identifier such as
    /// the submitter); a UUID suffix keeps concurrent acquisitions apart.
    /// On any mid-operation failure the partially written tree is removed
    /// best-effort before the error propagates.
    pub async fn acquire(
        &self,
        repo: &RepoRef,
        reference: &str,
        label: &str,
    ) -> Result<Workspace, AcquisitionError> {
        let dir_name = format!("{}-{}", sanitize_label(label), Uuid::new_v4());
        let root = self.staging_dir.join(dir_name);
        fs::create_dir_all(&root)?;

        tracing::info!("Acquiring {repo}@{reference} into {}", root.display());

        match self.acquire_into(repo, reference, &root).await {
            Ok(content_root) => Ok(Workspace { root, content_root }),
            Err(e) => {
                if let Err(cleanup) = fs::remove_dir_all(&root) {
                    tracing::warn!(
                        "Could not clean up partial workspace {}: {cleanup}",
                        root.display()
                    );
                }
                Err(e)
            }
        }
    }

    /// Downloads and extracts into an existing workspace root, returning
    /// the content root. Cleanup of `root` on failure is the caller's job.
    async fn acquire_into(
        &self,
        repo: &RepoRef,
        reference: &str,
        root: &Path,
    ) -> Result<PathBuf, AcquisitionError> {
        let archive_path = root.join("archive.zip");
        let written = self
            .github
            .download_archive(
                repo,
                reference,
                &archive_path,
                self.max_archive_bytes,
                self.download_timeout,
            )
            .await?;
        tracing::info!("Downloaded {written} bytes for {repo}@{reference}");

        let extract_dir = root.join("content");
        let reference_owned = reference.to_string();
        let archive_owned = archive_path.clone();
        tokio::task::spawn_blocking(move || {
            extract_archive(&archive_owned, &extract_dir, &reference_owned)
        })
        .await
        .map_err(|e| AcquisitionError::Io(std::io::Error::other(e)))?
    }
}

/// Extracts `archive` into `dest` and locates the single root folder the
/// archive format wraps content in.
///
/// Fails with [`AcquisitionError::EmptyOrMalformedArchive`] when the
/// archive has no entries, more than one top-level entry, or a top-level
/// entry that is not a directory.
pub(crate) fn extract_archive(
    archive: &Path,
    dest: &Path,
    reference: &str,
) -> Result<PathBuf, AcquisitionError> {
    let file = fs::File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file)?;
    fs::create_dir_all(dest)?;
    zip.extract(dest)?;

    let malformed = || AcquisitionError::EmptyOrMalformedArchive {
        reference: reference.to_string(),
    };

    let mut entries = fs::read_dir(dest)?;
    let first = entries.next().ok_or_else(malformed)??;
    if entries.next().is_some() {
        return Err(malformed());
    }
    if !first.file_type()?.is_dir() {
        return Err(malformed());
    }

    Ok(first.path())
}

/// Restricts a workspace label to filesystem-safe characters.
fn sanitize_label(label: &str) -> String {
    let cleaned: String = label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "submission".to_string()
    } else {
        cleaned
    }
}

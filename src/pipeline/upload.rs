//! Ownership of the uploaded receipt image on disk.
//!
//! The upload collaborator writes each image to its own temporary path and
//! hands the pipeline an [`UploadedImage`]. From then on the pipeline owns
//! the file and must delete it exactly once, whatever the outcome.
//!
//! [`TempFileManager::release`] is the single deletion point. It never fails:
//! a cleanup error is logged as `CLEANUP_FAILURE` and swallowed so it cannot
//! mask the invocation's real result. [`UploadGuard`] wraps an image for the
//! duration of an invocation; if the invocation future is dropped before the
//! guard is released (e.g. the caller timed out), `Drop` removes the file
//! synchronously instead.

use crate::error::ErrorCode;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

/// A receipt image staged on local disk for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedImage {
    path: PathBuf,
    original_name: String,
}

impl UploadedImage {
    pub fn new(path: impl Into<PathBuf>, original_name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            original_name: original_name.into(),
        }
    }

    /// Where the staged copy lives.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name the client uploaded, for logs only.
    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    /// `true` when the staged file is present and is a regular file.
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }
}

/// What a release attempt did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    Deleted,
    /// Nothing to delete; an earlier release (or someone else) got there first.
    AlreadyGone,
    /// Deletion failed and was logged.
    Failed,
}

/// Deletes staged uploads.
#[derive(Debug, Clone, Copy, Default)]
pub struct TempFileManager;

impl TempFileManager {
    pub fn new() -> Self {
        Self
    }

    /// Delete the staged file. Idempotent; never returns an error.
    pub async fn release(&self, image: &UploadedImage) -> Release {
        let outcome = tokio::fs::remove_file(image.path()).await;
        log_release(image, outcome)
    }

    /// Blocking variant used from `Drop`, where no runtime can be awaited.
    pub fn release_blocking(&self, image: &UploadedImage) -> Release {
        let outcome = std::fs::remove_file(image.path());
        log_release(image, outcome)
    }
}

fn log_release(image: &UploadedImage, outcome: io::Result<()>) -> Release {
    match outcome {
        Ok(()) => {
            debug!("Deleted temporary file: {}", image.path().display());
            Release::Deleted
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("Temporary file already removed: {}", image.path().display());
            Release::AlreadyGone
        }
        Err(e) => {
            error!(
                code = %ErrorCode::CleanupFailure,
                path = %image.path().display(),
                "Failed to delete temporary file: {e}"
            );
            Release::Failed
        }
    }
}

/// Scoped ownership of an upload for the length of one invocation.
pub(crate) struct UploadGuard<'a> {
    image: UploadedImage,
    files: &'a TempFileManager,
    released: bool,
}

impl<'a> UploadGuard<'a> {
    pub(crate) fn new(image: UploadedImage, files: &'a TempFileManager) -> Self {
        Self {
            image,
            files,
            released: false,
        }
    }

    pub(crate) fn image(&self) -> &UploadedImage {
        &self.image
    }

    /// Run the finalizer. Consumes the guard so it can only happen once.
    pub(crate) async fn release(mut self) -> Release {
        self.released = true;
        self.files.release(&self.image).await
    }
}

impl Drop for UploadGuard<'_> {
    fn drop(&mut self) {
        if !self.released {
            debug!(
                "Invocation abandoned before cleanup; removing {}",
                self.image.path().display()
            );
            self.files.release_blocking(&self.image);
        }
    }
}

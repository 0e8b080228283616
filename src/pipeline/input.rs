//! Upload staging: turn a user-supplied path, URL or byte buffer into an
//! invocation-scoped [`UploadedImage`].
//!
//! The analyzer deletes the image it is given, so we never hand it the
//! caller's original file. Instead the bytes are copied into a fresh temp
//! file named `receipt-XXXXXX.<ext>` by [`tempfile::Builder`], whose random
//! suffix keeps concurrent invocations from ever sharing a path. We check
//! the image magic bytes before staging so a text file or PDF is rejected
//! here rather than surfacing as an opaque OCR failure later.

use crate::error::ReceiptError;
use crate::pipeline::upload::UploadedImage;
use image::ImageFormat;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Stage a local file or HTTP(S) URL as an upload.
pub async fn stage_upload(input: &str, timeout_secs: u64) -> Result<UploadedImage, ReceiptError> {
    let (name, bytes) = if is_url(input) {
        download_url(input, timeout_secs).await?
    } else {
        let path = PathBuf::from(input);
        let bytes = read_local(&path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| input.to_string());
        (name, bytes)
    };

    // tempfile writes through std::fs; keep it off the async workers.
    tokio::task::spawn_blocking(move || stage_bytes(&bytes, &name))
        .await
        .map_err(|e| ReceiptError::StagingFailed {
            path: PathBuf::from(input),
            source: std::io::Error::other(e),
        })?
}

/// Stage an in-memory upload (e.g. a decoded multipart body).
///
/// Blocking: writes the temp file with `std::fs`. From async code call it
/// through [`tokio::task::spawn_blocking`] as [`stage_upload`] does.
pub fn stage_bytes(bytes: &[u8], original_name: &str) -> Result<UploadedImage, ReceiptError> {
    let format = sniff_image(bytes).ok_or_else(|| ReceiptError::NotAnImage {
        path: PathBuf::from(original_name),
    })?;
    let suffix = format!(".{}", extension_for(format));

    let staging_err = |source: std::io::Error| ReceiptError::StagingFailed {
        path: PathBuf::from(original_name),
        source,
    };

    let mut tmp = tempfile::Builder::new()
        .prefix("receipt-")
        .suffix(&suffix)
        .tempfile()
        .map_err(staging_err)?;
    tmp.write_all(bytes).map_err(staging_err)?;
    tmp.flush().map_err(staging_err)?;

    // Ownership passes to the analyzer, which deletes the file itself.
    let (_file, path) = tmp.keep().map_err(|e| staging_err(e.error))?;

    debug!(
        "Staged '{}' ({} bytes) at {}",
        original_name,
        bytes.len(),
        path.display()
    );
    Ok(UploadedImage::new(path, original_name))
}

/// Recognised receipt formats. Only PNG and JPEG are accepted.
fn sniff_image(bytes: &[u8]) -> Option<ImageFormat> {
    match image::guess_format(bytes) {
        Ok(f @ (ImageFormat::Png | ImageFormat::Jpeg)) => Some(f),
        _ => None,
    }
}

fn extension_for(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Jpeg => "jpg",
        _ => "png",
    }
}

async fn read_local(path: &Path) -> Result<Vec<u8>, ReceiptError> {
    if !path.is_file() {
        return Err(ReceiptError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            Err(ReceiptError::PermissionDenied {
                path: path.to_path_buf(),
            })
        }
        Err(_) => Err(ReceiptError::FileNotFound {
            path: path.to_path_buf(),
        }),
    }
}

/// Download a URL and return `(filename, bytes)`.
async fn download_url(url: &str, timeout_secs: u64) -> Result<(String, Vec<u8>), ReceiptError> {
    info!("Downloading receipt image from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ReceiptError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            ReceiptError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            ReceiptError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(ReceiptError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| ReceiptError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    Ok((filename_from_url(url), bytes.to_vec()))
}

/// Last path segment of the URL if it looks like a file name.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "receipt".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
    const JPEG_MAGIC: &[u8] = b"\xff\xd8\xff\xe0\0\x10JFIF\0";

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/r.jpg"));
        assert!(is_url("http://example.com/r.jpg"));
        assert!(!is_url("/tmp/r.jpg"));
        assert!(!is_url(""));
    }

    #[test]
    fn filename_from_url_falls_back() {
        assert_eq!(filename_from_url("https://x.io/a/receipt.jpg"), "receipt.jpg");
        assert_eq!(filename_from_url("https://x.io/a/"), "receipt");
        assert_eq!(filename_from_url("not a url"), "receipt");
    }

    #[test]
    fn stage_bytes_writes_scoped_copy() {
        let a = stage_bytes(PNG_MAGIC, "mart.png").unwrap();
        let b = stage_bytes(JPEG_MAGIC, "mart.jpeg").unwrap();

        assert_ne!(a.path(), b.path());
        assert_eq!(a.original_name(), "mart.png");
        assert!(a.exists() && b.exists());
        assert!(a.path().extension().is_some_and(|e| e == "png"));
        assert!(b.path().extension().is_some_and(|e| e == "jpg"));
        assert!(a
            .path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("receipt-"));

        std::fs::remove_file(a.path()).unwrap();
        std::fs::remove_file(b.path()).unwrap();
    }

    #[test]
    fn stage_bytes_rejects_non_images() {
        let err = stage_bytes(b"%PDF-1.7", "receipt.pdf").unwrap_err();
        assert!(matches!(err, ReceiptError::NotAnImage { .. }));
    }

    #[tokio::test]
    async fn stage_upload_copies_and_leaves_original() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("photo.png");
        std::fs::write(&original, PNG_MAGIC).unwrap();

        let staged = stage_upload(original.to_str().unwrap(), 5).await.unwrap();
        assert_ne!(staged.path(), original.as_path());
        assert_eq!(staged.original_name(), "photo.png");
        assert_eq!(std::fs::read(staged.path()).unwrap(), PNG_MAGIC);
        assert!(original.exists());

        std::fs::remove_file(staged.path()).unwrap();
    }

    #[tokio::test]
    async fn stage_upload_missing_file() {
        let err = stage_upload("/definitely/not/here.png", 5).await.unwrap_err();
        assert!(matches!(err, ReceiptError::FileNotFound { .. }));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn stage_upload_rejects_non_image_off_the_runtime_thread() {
        let dir = tempfile::tempdir().unwrap();
        let notes = dir.path().join("notes.txt");
        std::fs::write(&notes, b"rice 3000").unwrap();

        let err = stage_upload(notes.to_str().unwrap(), 5).await.unwrap_err();
        match err {
            ReceiptError::NotAnImage { path } => assert_eq!(path, PathBuf::from("notes.txt")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

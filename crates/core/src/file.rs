//! Local image files, validated before they are queued

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// An image file that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub path: PathBuf,
    pub name: String,
    pub mime: String,
    pub size: u64,
}

impl UploadFile {
    /// Validate a file against the MIME and size rules.
    ///
    /// Returns `Error::Validation` for non-image files and files larger than
    /// `max_bytes`; such files never enter the queue.
    pub fn open(path: &Path, max_bytes: u64) -> Result<Self> {
        let metadata = std::fs::metadata(path)?;
        if !metadata.is_file() {
            return Err(Error::Validation(format!("{} is not a file", path.display())));
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let mime = guess_image_mime(path)
            .ok_or_else(|| Error::Validation(format!("{} is not an image", name)))?;

        let size = metadata.len();
        if size > max_bytes {
            return Err(Error::Validation(format!(
                "{} exceeds the {}MB limit",
                name,
                max_bytes / (1024 * 1024)
            )));
        }

        Ok(Self {
            path: path.to_path_buf(),
            name,
            mime,
            size,
        })
    }

    /// Read the file contents for one attempt
    pub async fn read(&self) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(&self.path).await?)
    }
}

/// MIME type for the path if it names an image
pub fn guess_image_mime(path: &Path) -> Option<String> {
    mime_guess::from_path(path)
        .iter()
        .find(|m| m.type_() == mime_guess::mime::IMAGE)
        .map(|m| m.essence_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_image_under_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cat.png");
        std::fs::write(&path, vec![0u8; 2048]).unwrap();

        let file = UploadFile::open(&path, 4096).unwrap();
        assert_eq!(file.name, "cat.png");
        assert_eq!(file.mime, "image/png");
        assert_eq!(file.size, 2048);
    }

    #[test]
    fn test_rejects_non_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"hello").unwrap();

        let err = UploadFile::open(&path, 4096).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_rejects_oversized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.jpg");
        std::fs::write(&path, vec![0u8; 1024 * 1024 + 1]).unwrap();

        let err = UploadFile::open(&path, 1024 * 1024).unwrap_err();
        assert!(err.to_string().contains("1MB"));
    }

    #[test]
    fn test_guess_image_mime() {
        assert_eq!(guess_image_mime(Path::new("a.webp")).as_deref(), Some("image/webp"));
        assert_eq!(guess_image_mime(Path::new("a.GIF")).as_deref(), Some("image/gif"));
        assert!(guess_image_mime(Path::new("a.pdf")).is_none());
        assert!(guess_image_mime(Path::new("noext")).is_none());
    }

    #[test]
    fn test_read_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dot.bmp");
        std::fs::write(&path, b"BM..").unwrap();

        let file = UploadFile::open(&path, 1024).unwrap();
        let bytes = tokio_test::block_on(file.read()).unwrap();
        assert_eq!(bytes, b"BM..".to_vec());
    }

    #[test]
    fn test_read_after_removal_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.png");
        std::fs::write(&path, b"png").unwrap();

        let file = UploadFile::open(&path, 1024).unwrap();
        std::fs::remove_file(&path).unwrap();
        let err = tokio_test::block_on(file.read()).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}

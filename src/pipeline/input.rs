//! Input resolution: normalise a user-supplied path or URL to a local file
//! of a known type.
//!
//! ## Why download to a temp file?
//!
//! pdfium opens documents by path. Downloading to a `TempDir` gives it one
//! while cleanup happens automatically when [`ResolvedInput`] is dropped.
//!
//! The type is sniffed from magic bytes, never from the extension: a photo
//! saved as `.pdf` by a phone would otherwise reach pdfium and fail with an
//! opaque error.

use crate::error::Pic2CsvError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

/// File types the extraction service accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Png,
    Jpeg,
    WebP,
    Gif,
    Pdf,
}

impl InputKind {
    /// Identify a file from its first bytes (12 are enough for every kind).
    pub fn sniff(head: &[u8]) -> Option<Self> {
        match head {
            [0x89, b'P', b'N', b'G', ..] => Some(InputKind::Png),
            [0xFF, 0xD8, 0xFF, ..] => Some(InputKind::Jpeg),
            [b'G', b'I', b'F', b'8', ..] => Some(InputKind::Gif),
            [b'%', b'P', b'D', b'F', ..] => Some(InputKind::Pdf),
            [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => {
                Some(InputKind::WebP)
            }
            _ => None,
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            InputKind::Png => "image/png",
            InputKind::Jpeg => "image/jpeg",
            InputKind::WebP => "image/webp",
            InputKind::Gif => "image/gif",
            InputKind::Pdf => "application/pdf",
        }
    }

    pub fn is_pdf(self) -> bool {
        self == InputKind::Pdf
    }
}

enum Location {
    Local(PathBuf),
    /// The `TempDir` is kept alive until processing completes.
    Downloaded { path: PathBuf, _temp_dir: TempDir },
}

/// A local, size-checked, type-sniffed input file.
pub struct ResolvedInput {
    location: Location,
    pub kind: InputKind,
    pub size: u64,
}

impl ResolvedInput {
    /// Path to the file regardless of how it was resolved.
    pub fn path(&self) -> &Path {
        match &self.location {
            Location::Local(p) => p,
            Location::Downloaded { path, .. } => path,
        }
    }

    pub fn was_downloaded(&self) -> bool {
        matches!(self.location, Location::Downloaded { .. })
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to a local file.
///
/// URLs are downloaded to a temporary directory; local paths are checked for
/// existence and read permission. Either way the size limit and type sniff
/// are applied before anything else happens.
pub async fn resolve_input(
    input: &str,
    max_file_bytes: u64,
    timeout_secs: u64,
) -> Result<ResolvedInput, Pic2CsvError> {
    if input.trim().is_empty() {
        return Err(Pic2CsvError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, max_file_bytes, timeout_secs).await
    } else {
        resolve_local(input, max_file_bytes)
    }
}

fn check_size(size: u64, limit: u64) -> Result<(), Pic2CsvError> {
    if size > limit {
        Err(Pic2CsvError::FileTooLarge { size, limit })
    } else {
        Ok(())
    }
}

fn sniff_or_reject(path: &Path, head: &[u8]) -> Result<InputKind, Pic2CsvError> {
    InputKind::sniff(head).ok_or_else(|| Pic2CsvError::UnsupportedFileType {
        path: path.to_path_buf(),
        magic: head.iter().take(4).copied().collect(),
    })
}

fn resolve_local(path_str: &str, max_file_bytes: u64) -> Result<ResolvedInput, Pic2CsvError> {
    let path = PathBuf::from(path_str);

    if !path.exists() {
        return Err(Pic2CsvError::FileNotFound { path });
    }

    let mut file = match std::fs::File::open(&path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(Pic2CsvError::PermissionDenied { path });
        }
        Err(_) => return Err(Pic2CsvError::FileNotFound { path }),
    };

    let size = file
        .metadata()
        .map_err(|e| Pic2CsvError::Internal(format!("stat {}: {e}", path.display())))?
        .len();
    check_size(size, max_file_bytes)?;

    let mut head = Vec::with_capacity(12);
    file.by_ref()
        .take(12)
        .read_to_end(&mut head)
        .map_err(|e| Pic2CsvError::Internal(format!("read {}: {e}", path.display())))?;
    let kind = sniff_or_reject(&path, &head)?;

    debug!("Resolved local {:?}: {} ({} bytes)", kind, path.display(), size);
    Ok(ResolvedInput {
        location: Location::Local(path),
        kind,
        size,
    })
}

async fn download_url(
    url: &str,
    max_file_bytes: u64,
    timeout_secs: u64,
) -> Result<ResolvedInput, Pic2CsvError> {
    info!("Downloading input from: {}", url);
    let failed = |reason: String| Pic2CsvError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            Pic2CsvError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }
    if let Some(len) = response.content_length() {
        check_size(len, max_file_bytes)?;
    }

    let filename = extract_filename(url);
    let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;
    check_size(bytes.len() as u64, max_file_bytes)?;

    let temp_dir = TempDir::new().map_err(|e| Pic2CsvError::Internal(e.to_string()))?;
    let file_path = temp_dir.path().join(&filename);
    let kind = sniff_or_reject(&file_path, &bytes[..bytes.len().min(12)])?;

    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| Pic2CsvError::Internal(format!("Failed to write temp file: {}", e)))?;

    info!("Downloaded {:?} to: {}", kind, file_path.display());
    Ok(ResolvedInput {
        location: Location::Downloaded {
            path: file_path,
            _temp_dir: temp_dir,
        },
        kind,
        size: bytes.len() as u64,
    })
}

/// A file name for the downloaded copy: the URL's last path segment.
fn extract_filename(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }
    "downloaded.bin".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const PNG_HEAD: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    fn temp_file(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(bytes).unwrap();
        f
    }

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/receipt.jpg"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn sniff_known_types() {
        assert_eq!(InputKind::sniff(PNG_HEAD), Some(InputKind::Png));
        assert_eq!(InputKind::sniff(&[0xFF, 0xD8, 0xFF, 0xE0]), Some(InputKind::Jpeg));
        assert_eq!(InputKind::sniff(b"GIF89a"), Some(InputKind::Gif));
        assert_eq!(InputKind::sniff(b"%PDF-1.7"), Some(InputKind::Pdf));
        assert_eq!(InputKind::sniff(b"RIFF\0\0\0\0WEBPVP8 "), Some(InputKind::WebP));
        assert_eq!(InputKind::sniff(b"RIFF\0\0\0\0WAVE"), None);
        assert_eq!(InputKind::sniff(b"PK\x03\x04"), None);
        assert_eq!(InputKind::sniff(b""), None);
    }

    #[test]
    fn extract_filename_from_url() {
        assert_eq!(extract_filename("https://x.org/a/scan.png?x=1"), "scan.png");
        assert_eq!(extract_filename("https://x.org/a/"), "downloaded.bin");
    }

    #[tokio::test]
    async fn local_png_resolves() {
        let f = temp_file(PNG_HEAD);
        let resolved = resolve_input(f.path().to_str().unwrap(), 1024, 5)
            .await
            .unwrap();
        assert_eq!(resolved.kind, InputKind::Png);
        assert_eq!(resolved.size, PNG_HEAD.len() as u64);
        assert!(!resolved.was_downloaded());
    }

    #[tokio::test]
    async fn oversized_file_is_rejected_before_sniffing() {
        let f = temp_file(&[0u8; 64]);
        let err = resolve_input(f.path().to_str().unwrap(), 10, 5)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Pic2CsvError::FileTooLarge { size: 64, limit: 10 }));
    }

    #[tokio::test]
    async fn unknown_type_is_rejected() {
        let f = temp_file(b"hello, world");
        let err = resolve_input(f.path().to_str().unwrap(), 1024, 5)
            .await
            .err()
            .unwrap();
        match err {
            Pic2CsvError::UnsupportedFileType { magic, .. } => assert_eq!(magic, b"hell"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_file_and_blank_input() {
        assert!(matches!(
            resolve_input("/definitely/not/here.png", 1024, 5).await,
            Err(Pic2CsvError::FileNotFound { .. })
        ));
        assert!(matches!(
            resolve_input("  ", 1024, 5).await,
            Err(Pic2CsvError::InvalidInput { .. })
        ));
    }
}

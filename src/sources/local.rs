//! Local file reading.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{AppError, Result};
use crate::html::{extract_body_text, truncate_chars};
use crate::sources::MAX_SOURCE_CHARS;

const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "markdown", "csv", "json", "xml", "html", "htm", "yaml", "yml", "log", "tsv", "rtf",
];

const TEXT_MIME_TYPES: &[&str] = &[
    "application/json",
    "application/xml",
    "application/javascript",
    "application/x-yaml",
    "application/yaml",
    "application/rtf",
];

/// Text read from one local file.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalFileContent {
    pub name: String,
    pub mime_type: String,
    pub size: u64,
    pub content: String,
}

pub fn is_text_like(mime_type: &str, extension: Option<&str>) -> bool {
    mime_type.starts_with("text/")
        || TEXT_MIME_TYPES.contains(&mime_type)
        || extension
            .map(|ext| TEXT_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
}

/// Resolves `path` (relative paths are taken from `root`) and checks that
/// the real location, after following symlinks, sits under `root`.
pub async fn confine_to_root(root: &Path, path: &Path) -> Result<PathBuf> {
    let root = tokio::fs::canonicalize(root).await.map_err(|e| {
        AppError::ConfigError(format!("Local files directory {} is unusable: {}", root.display(), e))
    })?;
    let resolved = tokio::fs::canonicalize(root.join(path))
        .await
        .map_err(|e| AppError::Validation(format!("Cannot open local file {}: {}", path.display(), e)))?;

    if !resolved.starts_with(&root) {
        warn!("Rejected local file outside {}: {}", root.display(), path.display());
        return Err(AppError::Validation(format!(
            "Local file {} is outside the allowed directory",
            path.display()
        )));
    }
    Ok(resolved)
}

/// Reads `path`, decoding only text-like files. Unsupported types and read
/// failures come back as a placeholder string in `content`.
pub async fn read_local_file(path: &Path) -> LocalFileContent {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let mime_type = mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string();
    let extension = path.extension().and_then(|e| e.to_str());

    if !is_text_like(&mime_type, extension) {
        debug!("Skipping non-text file {} ({})", name, mime_type);
        let size = tokio::fs::metadata(path).await.map(|m| m.len()).unwrap_or(0);
        return LocalFileContent {
            content: format!(
                "(Content of {} could not be extracted: unsupported file type {})",
                name, mime_type
            ),
            name,
            mime_type,
            size,
        };
    }

    match tokio::fs::read(path).await {
        Ok(bytes) => {
            let decoded = String::from_utf8_lossy(&bytes);
            let text = if mime_type == "text/html" {
                extract_body_text(&decoded).unwrap_or_else(|| decoded.to_string())
            } else {
                decoded.into_owned()
            };
            LocalFileContent {
                content: truncate_chars(&text, MAX_SOURCE_CHARS).to_string(),
                size: bytes.len() as u64,
                name,
                mime_type,
            }
        }
        Err(e) => {
            warn!("Failed to read {}: {}", path.display(), e);
            LocalFileContent {
                content: format!("(Error reading file {}: {})", name, e),
                name,
                mime_type,
                size: 0,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn text_detection_uses_mime_and_extension() {
        assert!(is_text_like("text/plain", None));
        assert!(is_text_like("application/json", None));
        assert!(is_text_like("application/octet-stream", Some("LOG")));
        assert!(!is_text_like("image/png", Some("png")));
    }

    #[tokio::test]
    async fn reads_text_and_caps_length() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.txt");
        std::fs::write(&path, "x".repeat(MAX_SOURCE_CHARS + 10)).unwrap();

        let file = read_local_file(&path).await;
        assert_eq!(file.name, "big.txt");
        assert_eq!(file.mime_type, "text/plain");
        assert_eq!(file.content.len(), MAX_SOURCE_CHARS);
    }

    #[tokio::test]
    async fn binary_files_get_placeholder() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("photo.png");
        std::fs::write(&path, [0x89, 0x50, 0x4e, 0x47]).unwrap();

        let file = read_local_file(&path).await;
        assert_eq!(
            file.content,
            "(Content of photo.png could not be extracted: unsupported file type image/png)"
        );
        assert_eq!(file.size, 4);
    }

    #[tokio::test]
    async fn html_files_are_reduced_to_body_text() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("page.html");
        std::fs::write(&path, "<html><body><h1>Title</h1><p>Body</p></body></html>").unwrap();

        let file = read_local_file(&path).await;
        assert_eq!(file.content, "Title\nBody");
    }

    #[tokio::test]
    async fn paths_must_resolve_under_root() {
        let outside = TempDir::new().unwrap();
        let secret = outside.path().join("secret.txt");
        std::fs::write(&secret, "key").unwrap();

        let root = TempDir::new().unwrap();
        std::fs::write(root.path().join("notes.txt"), "ok").unwrap();

        let inside = confine_to_root(root.path(), Path::new("notes.txt")).await.unwrap();
        assert!(inside.ends_with("notes.txt"));

        let absolute = confine_to_root(root.path(), &secret).await.unwrap_err();
        assert!(matches!(absolute, AppError::Validation(ref m) if m.contains("outside the allowed directory")));

        let escape = Path::new("..").join(outside.path().file_name().unwrap()).join("secret.txt");
        assert!(matches!(
            confine_to_root(root.path(), &escape).await,
            Err(AppError::Validation(_))
        ));

        assert!(matches!(
            confine_to_root(root.path(), Path::new("missing.txt")).await,
            Err(AppError::Validation(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlinks_out_of_root_are_rejected() {
        let outside = TempDir::new().unwrap();
        let secret = outside.path().join("secret.txt");
        std::fs::write(&secret, "key").unwrap();

        let root = TempDir::new().unwrap();
        std::os::unix::fs::symlink(&secret, root.path().join("link.txt")).unwrap();

        assert!(matches!(
            confine_to_root(root.path(), Path::new("link.txt")).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn missing_files_report_inline_error() {
        let file = read_local_file(Path::new("/nonexistent/notes.txt")).await;
        assert!(file.content.starts_with("(Error reading file notes.txt: "));
    }
}

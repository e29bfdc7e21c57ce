//! Source resolution: turn tool inputs into files pdftk can read

use crate::error::{Error, Result};
use crate::source::{CacheManager, CachedPdf};
use base64::Engine;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::sync::RwLock;

/// A file on disk holding the resolved input
#[derive(Debug)]
pub enum PdfInput {
    /// Caller-supplied path, used in place
    Path(PathBuf),
    /// Decoded upload, deleted on drop
    Temp(NamedTempFile),
    /// Output of an earlier operation
    Cached(Arc<CachedPdf>),
}

impl PdfInput {
    pub fn path(&self) -> &Path {
        match self {
            PdfInput::Path(path) => path,
            PdfInput::Temp(file) => file.path(),
            PdfInput::Cached(entry) => entry.path(),
        }
    }
}

/// Resolved input plus a display name for results
#[derive(Debug)]
pub struct ResolvedPdf {
    pub input: PdfInput,
    pub source_name: String,
}

impl ResolvedPdf {
    pub fn path(&self) -> &Path {
        self.input.path()
    }
}

fn has_pdf_header(data: &[u8]) -> bool {
    data.len() >= 4 && &data[0..4] == b"%PDF"
}

fn write_temp(data: &[u8], suffix: &str) -> Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("pdftk-input-")
        .suffix(suffix)
        .tempfile()?;
    file.write_all(data)?;
    file.flush()?;
    Ok(file)
}

/// Resolve a file path, checking that it exists and starts with a PDF header
pub fn resolve_path<P: AsRef<Path>>(path: P) -> Result<ResolvedPdf> {
    let path = path.as_ref();

    if !path.is_file() {
        return Err(Error::PdfNotFound {
            path: path.display().to_string(),
        });
    }

    let mut header = [0u8; 4];
    let read = std::fs::File::open(path)?.read(&mut header)?;
    if !has_pdf_header(&header[..read]) {
        return Err(Error::InvalidPdf {
            reason: format!("{} is not a PDF file", path.display()),
        });
    }

    Ok(ResolvedPdf {
        input: PdfInput::Path(path.to_path_buf()),
        source_name: path.display().to_string(),
    })
}

/// Decode base64 PDF data into a temporary file
pub fn resolve_base64(base64_data: &str) -> Result<ResolvedPdf> {
    let data = base64::engine::general_purpose::STANDARD.decode(base64_data.trim())?;

    if !has_pdf_header(&data) {
        return Err(Error::InvalidPdf {
            reason: "Decoded data is not a valid PDF file".to_string(),
        });
    }

    Ok(ResolvedPdf {
        input: PdfInput::Temp(write_temp(&data, ".pdf")?),
        source_name: "<base64>".to_string(),
    })
}

/// Resolve a cache key to the cached PDF file
pub async fn resolve_cache(
    cache_key: &str,
    cache: &Arc<RwLock<CacheManager>>,
) -> Result<ResolvedPdf> {
    let entry = cache
        .read()
        .await
        .get(cache_key)
        .ok_or_else(|| Error::CacheKeyNotFound {
            key: cache_key.to_string(),
        })?;

    Ok(ResolvedPdf {
        input: PdfInput::Cached(entry),
        source_name: format!("<cache:{}>", cache_key),
    })
}

/// Write inline FDF/XFDF form data to a temporary file.
///
/// FDF starts with `%FDF`; anything else is treated as XFDF.
pub fn resolve_form_content(content: &[u8]) -> Result<ResolvedPdf> {
    let suffix = if content.starts_with(b"%FDF") {
        ".fdf"
    } else {
        ".xfdf"
    };

    Ok(ResolvedPdf {
        input: PdfInput::Temp(write_temp(content, suffix)?),
        source_name: format!("<inline{}>", suffix),
    })
}

/// Resolve a path to form data (no PDF header check)
pub fn resolve_form_path<P: AsRef<Path>>(path: P) -> Result<ResolvedPdf> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(Error::PdfNotFound {
            path: path.display().to_string(),
        });
    }

    Ok(ResolvedPdf {
        input: PdfInput::Path(path.to_path_buf()),
        source_name: path.display().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_base64_not_pdf() {
        let result = resolve_base64("SGVsbG8gV29ybGQ="); // "Hello World"
        assert!(matches!(result, Err(Error::InvalidPdf { .. })));
    }

    #[test]
    fn test_resolve_base64_invalid_base64() {
        let result = resolve_base64("not valid base64!!!");
        assert!(matches!(result, Err(Error::Base64Decode(_))));
    }

    #[test]
    fn test_resolve_base64_writes_temp_file() {
        let resolved = resolve_base64("JVBERi0xLjQ=").unwrap(); // "%PDF-1.4"
        assert_eq!(resolved.source_name, "<base64>");
        assert_eq!(std::fs::read(resolved.path()).unwrap(), b"%PDF-1.4");

        let path = resolved.path().to_path_buf();
        drop(resolved);
        assert!(!path.exists());
    }

    #[test]
    fn test_resolve_path_not_found() {
        let result = resolve_path("/nonexistent/path/file.pdf");
        assert!(matches!(result, Err(Error::PdfNotFound { .. })));
    }

    #[test]
    fn test_resolve_path_checks_header() {
        let dir = TempDir::new().unwrap();
        let text = dir.path().join("notes.pdf");
        std::fs::write(&text, "just text").unwrap();
        assert!(matches!(resolve_path(&text), Err(Error::InvalidPdf { .. })));

        let pdf = dir.path().join("real.pdf");
        std::fs::write(&pdf, "%PDF-1.7\n").unwrap();
        let resolved = resolve_path(&pdf).unwrap();
        assert_eq!(resolved.path(), pdf.as_path());
    }

    #[test]
    fn test_resolve_form_content_suffix() {
        let fdf = resolve_form_content(b"%FDF-1.2\n").unwrap();
        assert!(fdf.path().to_string_lossy().ends_with(".fdf"));

        let xfdf = resolve_form_content(b"<?xml version=\"1.0\"?><xfdf/>").unwrap();
        assert!(xfdf.path().to_string_lossy().ends_with(".xfdf"));
    }

    #[tokio::test]
    async fn test_resolve_cache_hit_and_miss() {
        let cache = Arc::new(RwLock::new(CacheManager::new(4, 1024)));
        cache
            .write()
            .await
            .put("k".to_string(), b"%PDF-1.4")
            .unwrap();

        let resolved = resolve_cache("k", &cache).await.unwrap();
        assert_eq!(resolved.source_name, "<cache:k>");
        assert_eq!(std::fs::read(resolved.path()).unwrap(), b"%PDF-1.4");

        let missing = resolve_cache("other", &cache).await;
        assert!(matches!(missing, Err(Error::CacheKeyNotFound { .. })));
    }
}

//! MusicXML export: turn a [`ConversionResult`] into a downloadable document.

use crate::error::Sheet2XmlError;
use crate::output::ConversionResult;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::info;

/// Declaration prepended to documents that lack one.
pub const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="no"?>"#;

/// Registered media type for uncompressed MusicXML.
pub const MUSICXML_MEDIA_TYPE: &str = "application/vnd.recordare.musicxml+xml";

/// Filename offered for the exported document.
pub const SUGGESTED_FILENAME: &str = "sheet_music.musicxml";

/// The document text: `xml_content`, with the XML declaration and a newline
/// in front unless it already starts with one.
pub fn to_musicxml_document(result: &ConversionResult) -> String {
    let xml = &result.xml_content;
    if xml.trim_start().starts_with("<?xml") {
        xml.clone()
    } else {
        format!("{XML_DECLARATION}\n{xml}")
    }
}

/// A ready-to-serve download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportArtifact {
    pub filename: &'static str,
    pub media_type: &'static str,
    pub content: String,
}

impl ExportArtifact {
    pub fn from_result(result: &ConversionResult) -> Self {
        Self {
            filename: SUGGESTED_FILENAME,
            media_type: MUSICXML_MEDIA_TYPE,
            content: to_musicxml_document(result),
        }
    }
}

/// Write the exported document to `path`.
///
/// The document goes to a temp file in the target directory which is then
/// persisted over `path`, so readers never see a partial file.
pub async fn write_musicxml(result: &ConversionResult, path: &Path) -> Result<(), Sheet2XmlError> {
    let write_err = |e| Sheet2XmlError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    let parent = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
            parent.to_path_buf()
        }
        None => PathBuf::from("."),
    };

    let document = to_musicxml_document(result);
    let len = document.len();
    let target = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        let mut tmp = NamedTempFile::new_in(&parent)?;
        tmp.write_all(document.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&target).map_err(|e| e.error)?;
        Ok(())
    })
    .await
    .map_err(|e| Sheet2XmlError::Internal(format!("Export task failed: {e}")))?
    .map_err(write_err)?;

    info!("Wrote {} ({} bytes)", path.display(), len);
    Ok(())
}

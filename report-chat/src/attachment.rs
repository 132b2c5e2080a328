use image::ImageFormat;
use std::path::Path;
use tracing::{info, warn};

use crate::error::{ChatError, Result};

const ACCEPTED_FORMATS: &[ImageFormat] = &[ImageFormat::Png, ImageFormat::Jpeg, ImageFormat::WebP];

/// A validated report image ready to be uploaded for analysis.
///
/// Only PNG, JPEG and WebP files can be turned into an `Attachment`, so anything
/// else is rejected before it ever reaches a conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    file_name: String,
    format: ImageFormat,
    bytes: Vec<u8>,
}

impl Attachment {
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let bytes = tokio::fs::read(path).await?;
        info!("Loaded attachment {} ({} bytes)", file_name, bytes.len());

        Self::from_bytes(file_name, bytes)
    }

    /// Validate in-memory image data.
    ///
    /// The format is sniffed from the leading bytes; the file extension is only
    /// consulted when the bytes are not recognized.
    pub fn from_bytes(file_name: impl Into<String>, bytes: Vec<u8>) -> Result<Self> {
        let file_name = file_name.into();

        let format = image::guess_format(&bytes)
            .ok()
            .or_else(|| {
                Path::new(&file_name)
                    .extension()
                    .and_then(ImageFormat::from_extension)
            })
            .filter(|format| ACCEPTED_FORMATS.contains(format));

        match format {
            Some(format) if !bytes.is_empty() => Ok(Self {
                file_name,
                format,
                bytes,
            }),
            _ => {
                warn!("Rejected attachment {}", file_name);
                Err(ChatError::UnsupportedAttachment(file_name))
            }
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn content_type(&self) -> &'static str {
        self.format.to_mime_type()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

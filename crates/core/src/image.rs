//! Images attached to a submission, carried around as data URLs.

use crate::error::TutorError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// A decoded-and-validated `data:<mime>;base64,<payload>` image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    mime_type: String,
    data: String,
}

impl ImageAttachment {
    /// Parses and validates a data URL produced by a file reader.
    pub fn from_data_url(data_url: &str) -> Result<Self, TutorError> {
        let rest = data_url
            .strip_prefix("data:")
            .ok_or_else(|| TutorError::InvalidImage("expected a data URL".to_string()))?;
        let (header, data) = rest
            .split_once(',')
            .ok_or_else(|| TutorError::InvalidImage("missing payload".to_string()))?;
        let mime_type = header
            .strip_suffix(";base64")
            .ok_or_else(|| TutorError::InvalidImage("payload is not base64".to_string()))?;
        if !mime_type.starts_with("image/") {
            return Err(TutorError::InvalidImage(format!(
                "unsupported type '{mime_type}'"
            )));
        }
        let decoded = STANDARD
            .decode(data.trim())
            .map_err(|e| TutorError::InvalidImage(e.to_string()))?;
        if decoded.is_empty() {
            return Err(TutorError::InvalidImage("image is empty".to_string()));
        }
        Ok(Self {
            mime_type: mime_type.to_string(),
            data: data.trim().to_string(),
        })
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// The base64 payload without the data URL header.
    pub fn base64_data(&self) -> &str {
        &self.data
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

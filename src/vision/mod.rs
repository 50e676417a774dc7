mod gemini;

use async_trait::async_trait;
use base64ct::{Base64, Encoding};
use bytes::Bytes;
use thiserror::Error;

use crate::meals::repo_types::NutritionInfo;

pub use gemini::GeminiVisionClient;

#[derive(Debug, Error)]
pub enum VisionError {
    #[error("invalid image payload: {0}")]
    InvalidImage(String),
    #[error("{0}")]
    Upstream(String),
    #[error("failed to parse vision response: {0}")]
    MalformedResponse(String),
}

/// External image-understanding service.
#[async_trait]
pub trait VisionClient: Send + Sync {
    /// Recognize the food in the image and estimate its nutrition facts.
    async fn analyze_food(&self, image: Bytes, mime_type: &str) -> Result<NutritionInfo, VisionError>;

    /// Read a retail barcode from the image. `Ok(None)` when none is visible.
    async fn read_barcode(&self, image: Bytes, mime_type: &str) -> Result<Option<String>, VisionError>;
}

/// A decoded `data:` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub mime_type: String,
    pub bytes: Bytes,
}

const DEFAULT_MIME: &str = "image/jpeg";

/// Strips the `data:<mime>;base64,` prefix and decodes the rest. A bare
/// base64 string without prefix is accepted as JPEG.
pub fn decode_data_url(image: &str) -> Result<ImagePayload, VisionError> {
    let image = image.trim();
    let (mime_type, payload) = match image.split_once(',') {
        Some((prefix, payload)) => {
            let mime = prefix
                .strip_prefix("data:")
                .and_then(|rest| rest.split(';').next())
                .filter(|m| !m.is_empty())
                .unwrap_or(DEFAULT_MIME);
            (mime.to_string(), payload)
        }
        None => (DEFAULT_MIME.to_string(), image),
    };
    if payload.is_empty() {
        return Err(VisionError::InvalidImage("empty image data".into()));
    }
    let bytes = Base64::decode_vec(payload)
        .map_err(|e| VisionError::InvalidImage(format!("base64: {e}")))?;
    Ok(ImagePayload {
        mime_type,
        bytes: Bytes::from(bytes),
    })
}

/// Model replies are sometimes wrapped in a markdown code fence.
pub(crate) fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Parses a model reply; the health score is clamped to the 0-100 scale.
pub(crate) fn parse_nutrition(text: &str) -> Result<NutritionInfo, VisionError> {
    let mut info = serde_json::from_str::<NutritionInfo>(strip_code_fence(text))
        .map_err(|e| VisionError::MalformedResponse(e.to_string()))?;
    info.health_score = if info.health_score.is_finite() {
        info.health_score.clamp(0.0, 100.0)
    } else {
        0.0
    };
    Ok(info)
}

/// Accepts 8 to 13 digit codes (EAN-8 through EAN-13).
pub fn is_valid_barcode(code: &str) -> bool {
    (8..=13).contains(&code.len()) && code.bytes().all(|b| b.is_ascii_digit())
}

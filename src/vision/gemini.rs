use async_trait::async_trait;
use base64ct::{Base64, Encoding};
use bytes::Bytes;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::{is_valid_barcode, parse_nutrition, VisionClient, VisionError};
use crate::meals::repo_types::NutritionInfo;

const FOOD_PROMPT: &str = r#"Analyze this food image and provide detailed nutritional information.

Return a JSON object with the following structure:
{
  "foodName": "Name of the dish",
  "servingSize": "Estimated serving size (e.g., 250g, 1 cup)",
  "calories": number (estimated calories),
  "protein": number (grams),
  "carbs": number (grams),
  "fat": number (grams),
  "fiber": number (grams),
  "sugar": number (grams),
  "healthScore": number (1-100 based on nutritional value),
  "ingredients": ["list", "of", "visible", "ingredients"],
  "healthBenefits": ["list", "of", "health", "benefits"],
  "warnings": ["dietary warnings like allergens"]
}

Be as accurate as possible with nutritional estimates. If multiple items are present, provide combined totals."#;

const BARCODE_PROMPT: &str = "Look at this image and find any barcode or QR code. Extract ONLY the numeric barcode number (usually 8-13 digits). If you find a barcode, respond with ONLY the numbers, nothing else. If no barcode is found, respond with 'NO_BARCODE'.";

#[derive(Debug, Clone)]
pub struct GeminiVisionClient {
    api_key: String,
    model: String,
    base_url: String,
    client: Client,
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    InlineData { inline_data: InlineData },
}

#[derive(Debug, Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

impl GeminiVisionClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            base_url: "https://generativelanguage.googleapis.com/v1beta".into(),
            client: Client::new(),
        }
    }

    async fn generate(&self, prompt: &str, image: Bytes, mime_type: &str) -> Result<String, VisionError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![
                    Part::Text {
                        text: prompt.to_string(),
                    },
                    Part::InlineData {
                        inline_data: InlineData {
                            mime_type: mime_type.to_string(),
                            data: Base64::encode_string(&image),
                        },
                    },
                ],
            }],
        };

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "gemini request failed");
                VisionError::Upstream(format!("vision request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(%status, body = %body, "gemini returned an error");
            return Err(VisionError::Upstream(format!(
                "vision service returned {status}: {body}"
            )));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| VisionError::MalformedResponse(e.to_string()))?;

        let text = parsed
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.clone())
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| VisionError::Upstream("No response from AI".into()))?;
        debug!(chars = text.len(), "gemini replied");
        Ok(text)
    }
}

#[async_trait]
impl VisionClient for GeminiVisionClient {
    async fn analyze_food(&self, image: Bytes, mime_type: &str) -> Result<NutritionInfo, VisionError> {
        let text = self.generate(FOOD_PROMPT, image, mime_type).await?;
        parse_nutrition(&text)
    }

    async fn read_barcode(&self, image: Bytes, mime_type: &str) -> Result<Option<String>, VisionError> {
        let text = self.generate(BARCODE_PROMPT, image, mime_type).await?;
        let code = text.trim();
        if code == "NO_BARCODE" || !is_valid_barcode(code) {
            return Ok(None);
        }
        Ok(Some(code.to_string()))
    }
}

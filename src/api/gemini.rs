use crate::api::{GenerationError, Generator, StringListShape};
use crate::config::Config;
use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::warn;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const TEXT_TIMEOUT: Duration = Duration::from_secs(600);
const IMAGE_TIMEOUT: Duration = Duration::from_secs(300);

/// Thin client over the Gemini text and Imagen image endpoints. Holds no
/// mutable state; concurrent calls are independent.
pub struct GeminiClient {
    client: Client,
    api_key: String,
    text_model: String,
    image_model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(cfg: &Config) -> Result<Self, GenerationError> {
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            api_key: cfg.gemini_api_key.clone(),
            text_model: cfg.text_model.clone(),
            image_model: cfg.image_model.clone(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Point the client at a different host. Used by integration setups that
    /// proxy the service.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        let trimmed = self.base_url.trim_end_matches('/').len();
        self.base_url.truncate(trimmed);
        self
    }

    async fn generate_content(
        &self,
        prompt: &str,
        generation_config: Option<serde_json::Value>,
    ) -> Result<String, GenerationError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.text_model
        );

        let mut body = json!({
            "contents": [
                {"role": "user", "parts": [{"text": prompt}]}
            ],
        });
        if let Some(cfg) = generation_config {
            body["generationConfig"] = cfg;
        }

        let resp = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .timeout(TEXT_TIMEOUT)
            .send()
            .await?;

        let status = resp.status();
        let raw = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            let snippet = raw.chars().take(800).collect::<String>();
            warn!("Gemini HTTP {}: {}", status.as_u16(), snippet);
            return Err(GenerationError::Service {
                status: status.as_u16(),
                message: service_error_message(&raw),
            });
        }

        let root: serde_json::Value = serde_json::from_str(&raw)
            .map_err(|e| GenerationError::MalformedResponse(e.to_string()))?;
        let text = root
            .get("candidates")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .and_then(|c| c.get("content"))
            .and_then(|c| c.get("parts"))
            .and_then(|p| p.as_array())
            .and_then(|p| p.first())
            .and_then(|p| p.get("text"))
            .and_then(|t| t.as_str())
            .ok_or_else(|| {
                GenerationError::MalformedResponse(
                    "missing candidates[0].content.parts[0].text".to_string(),
                )
            })?;

        if text.trim().is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        Ok(text.to_string())
    }
}

fn service_error_message(raw: &str) -> String {
    serde_json::from_str::<serde_json::Value>(raw)
        .ok()
        .and_then(|v| {
            v.get("error")?
                .get("message")?
                .as_str()
                .map(|s| s.to_string())
        })
        .unwrap_or_else(|| raw.chars().take(200).collect())
}

fn string_list_schema(shape: &StringListShape) -> serde_json::Value {
    json!({
        "type": "OBJECT",
        "properties": {
            (shape.field): {
                "type": "ARRAY",
                "description": shape.description,
                "items": {"type": "STRING"}
            }
        },
        "required": [shape.field]
    })
}

#[async_trait]
impl Generator for GeminiClient {
    async fn generate_text(&self, prompt: &str) -> Result<String, GenerationError> {
        self.generate_content(prompt, None).await
    }

    async fn generate_string_list(
        &self,
        prompt: &str,
        shape: &StringListShape,
    ) -> Result<Vec<String>, GenerationError> {
        let cfg = json!({
            "response_mime_type": "application/json",
            "response_schema": string_list_schema(shape),
        });
        let text = self.generate_content(prompt, Some(cfg)).await?;

        let root: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| GenerationError::MalformedResponse(e.to_string()))?;
        let items = root
            .get(shape.field)
            .and_then(|v| v.as_array())
            .ok_or(GenerationError::MissingField(shape.field))?;

        let mut out = Vec::with_capacity(items.len());
        for item in items {
            let s = item.as_str().ok_or_else(|| {
                GenerationError::MalformedResponse(format!(
                    "field '{}' must be an array of strings",
                    shape.field
                ))
            })?;
            out.push(s.to_string());
        }
        Ok(out)
    }

    async fn generate_image(&self, prompt: &str) -> Result<Vec<u8>, GenerationError> {
        let url = format!("{}/v1beta/models/{}:predict", self.base_url, self.image_model);
        let body = json!({
            "instances": [{"prompt": prompt}],
            "parameters": {
                "sampleCount": 1,
                "outputMimeType": "image/jpeg",
                "aspectRatio": "16:9",
            },
        });

        let resp = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .timeout(IMAGE_TIMEOUT)
            .send()
            .await?;

        let status = resp.status();
        let raw = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            let snippet = raw.chars().take(800).collect::<String>();
            warn!("Imagen HTTP {}: {}", status.as_u16(), snippet);
            return Err(GenerationError::Service {
                status: status.as_u16(),
                message: service_error_message(&raw),
            });
        }

        let root: serde_json::Value = serde_json::from_str(&raw)
            .map_err(|e| GenerationError::MalformedResponse(e.to_string()))?;
        let encoded = root
            .get("predictions")
            .and_then(|p| p.as_array())
            .and_then(|p| p.first())
            .and_then(|p| p.get("bytesBase64Encoded"))
            .and_then(|b| b.as_str())
            .ok_or(GenerationError::MissingField("bytesBase64Encoded"))?;

        if encoded.is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| GenerationError::MalformedResponse(format!("invalid image base64: {e}")))
    }
}

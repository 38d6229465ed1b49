use async_trait::async_trait;
use reqwest::Client;

use crate::config::ExtractionConfig;
use crate::error::{ReportError, Result};
use crate::llm::types::*;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini `generateContent` client with a strict JSON response schema.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(config: &ExtractionConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(ReportError::ExtractionConfig(
                "API key is empty".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| {
                ReportError::ExtractionConfig(format!("failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| GEMINI_BASE_URL.to_string()),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl ExtractionBackend for GeminiClient {
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        response_schema: serde_json::Value,
    ) -> std::result::Result<String, BackendError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let payload = GenerateContentRequest {
            contents: vec![Content::user(user_prompt)],
            system_instruction: Some(Content::user(system_prompt)),
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
                response_schema: Some(response_schema),
            },
        };

        let res = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BackendError::Transient(format!("request timed out: {}", e))
                } else {
                    BackendError::Transient(format!("transport error: {}", e))
                }
            })?;

        let status = res.status();
        if !status.is_success() {
            let err_text = res.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                408 | 429 => BackendError::Transient(format!(
                    "API throttled (status {}): {}",
                    status, err_text
                )),
                s if s >= 500 => BackendError::Transient(format!(
                    "API server error (status {}): {}",
                    status, err_text
                )),
                // 401/403/404 and key-rejection 400s: retrying cannot help.
                _ => BackendError::Fatal(format!(
                    "API rejected request (status {}): {}",
                    status, err_text
                )),
            });
        }

        let body: GenerateContentResponse = res
            .json()
            .await
            .map_err(|e| BackendError::Transient(format!("malformed response body: {}", e)))?;

        let part = body
            .candidates
            .and_then(|candidates| candidates.into_iter().next())
            .and_then(|candidate| candidate.content.parts.into_iter().next())
            .ok_or_else(|| {
                BackendError::Transient("response contained no candidates".to_string())
            })?;

        match part {
            Part::Text { text } => Ok(text),
            Part::Other(_) => Err(BackendError::Transient(
                "model returned non-text content".to_string(),
            )),
        }
    }
}

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::{Assistant, AssistantError};
use crate::config::AssistantConfig;

/// Client for the Gemini `generateContent` REST endpoint.
pub struct GeminiClient {
    url: String,
    api_key: String,
    client: Client,
}

impl GeminiClient {
    pub fn new(config: &AssistantConfig, api_key: String) -> Result<Self, AssistantError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(AssistantError::Http)?;
        Ok(Self {
            url: format!(
                "{}/v1beta/models/{}:generateContent",
                config.endpoint.trim_end_matches('/'),
                config.model
            ),
            api_key,
            client,
        })
    }

    #[cfg(test)]
    fn url(&self) -> &str {
        &self.url
    }
}

impl Assistant for GeminiClient {
    async fn generate(&self, system_instruction: &str, prompt: &str) -> Result<String, AssistantError> {
        let body = json!({
            "system_instruction": { "parts": [{ "text": system_instruction }] },
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
        });

        let resp = self
            .client
            .post(&self.url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(AssistantError::Http)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AssistantError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = resp.json().await.map_err(AssistantError::Http)?;
        parsed.text().ok_or(AssistantError::EmptyResponse)
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

impl GenerateResponse {
    /// Text of the first candidate, parts concatenated.
    fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content.parts.iter().filter_map(|p| p.text.as_deref()).collect();
        if text.is_empty() { None } else { Some(text) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_from_config() {
        let config = AssistantConfig {
            endpoint: "https://example.test/".into(),
            ..AssistantConfig::default()
        };
        let client = GeminiClient::new(&config, "k".into()).unwrap();
        assert_eq!(
            client.url(),
            "https://example.test/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }

    #[test]
    fn joins_candidate_parts() {
        let resp: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"Two alerts involve "},{"text":"[Entity-B]."}],"role":"model"}}]}"#,
        )
        .unwrap();
        assert_eq!(resp.text().as_deref(), Some("Two alerts involve [Entity-B]."));
    }

    #[test]
    fn no_candidates_is_empty() {
        let resp: GenerateResponse = serde_json::from_str(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).unwrap();
        assert!(resp.text().is_none());
    }

    #[test]
    fn candidate_without_content_is_empty() {
        let resp: GenerateResponse =
            serde_json::from_str(r#"{"candidates":[{"finishReason":"SAFETY"}]}"#).unwrap();
        assert!(resp.text().is_none());
    }
}

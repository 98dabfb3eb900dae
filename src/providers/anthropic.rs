// src/providers/anthropic.rs

use super::{ProviderInvocationFailed, VisionProvider, VisionRequest, post_json};
use crate::config::ProviderSection;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

const NAME: &str = "claude";
const API_VERSION: &str = "2023-06-01";

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// Anthropic Messages API.
pub struct ClaudeProvider {
    client: Client,
    section: ProviderSection,
}

impl ClaudeProvider {
    pub fn new(client: Client, section: ProviderSection) -> Self {
        Self { client, section }
    }
}

fn request_body(section: &ProviderSection, request: &VisionRequest<'_>) -> Value {
    json!({
        "model": section.model,
        "max_tokens": section.max_tokens,
        "messages": [{
            "role": "user",
            "content": [
                {
                    "type": "image",
                    "source": {
                        "type": "base64",
                        "media_type": request.mime_type,
                        "data": request.image_base64(),
                    }
                },
                { "type": "text", "text": request.prompt }
            ]
        }]
    })
}

fn answer_text(response: MessagesResponse) -> Option<String> {
    response
        .content
        .into_iter()
        .find(|b| b.kind == "text")
        .and_then(|b| b.text)
}

#[async_trait]
impl VisionProvider for ClaudeProvider {
    fn name(&self) -> &str {
        NAME
    }

    async fn invoke(&self, request: &VisionRequest<'_>) -> Result<String, ProviderInvocationFailed> {
        let api_key = self
            .section
            .api_key()
            .map_err(|e| ProviderInvocationFailed::new(NAME, e))?;
        let start = std::time::Instant::now();

        let url = format!("{}/messages", self.section.base_url.trim_end_matches('/'));
        let builder = self
            .client
            .post(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION);
        let response: MessagesResponse =
            post_json(NAME, builder, &request_body(&self.section, request)).await?;

        info!(
            model = %self.section.model,
            elapsed_ms = %start.elapsed().as_millis(),
            "Claude response received"
        );
        answer_text(response).ok_or_else(|| ProviderInvocationFailed::new(NAME, "no text block in response"))
    }
}

// src/providers/openai_compat.rs

use super::{ProviderInvocationFailed, VisionProvider, VisionRequest, post_json};
use crate::config::ProviderSection;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

const NAME: &str = "grok";

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// xAI Grok through its OpenAI-compatible chat completions endpoint.
pub struct GrokProvider {
    client: Client,
    section: ProviderSection,
}

impl GrokProvider {
    pub fn new(client: Client, section: ProviderSection) -> Self {
        Self { client, section }
    }
}

fn request_body(section: &ProviderSection, request: &VisionRequest<'_>) -> Value {
    let data_url = format!("data:{};base64,{}", request.mime_type, request.image_base64());
    json!({
        "model": section.model,
        "max_tokens": section.max_tokens,
        "temperature": 0.0,
        "messages": [{
            "role": "user",
            "content": [
                { "type": "image_url", "image_url": { "url": data_url } },
                { "type": "text", "text": request.prompt }
            ]
        }]
    })
}

fn answer_text(response: ChatResponse) -> Option<String> {
    response.choices.into_iter().next()?.message.content
}

#[async_trait]
impl VisionProvider for GrokProvider {
    fn name(&self) -> &str {
        NAME
    }

    async fn invoke(&self, request: &VisionRequest<'_>) -> Result<String, ProviderInvocationFailed> {
        let api_key = self
            .section
            .api_key()
            .map_err(|e| ProviderInvocationFailed::new(NAME, e))?;
        let start = std::time::Instant::now();

        let url = format!("{}/chat/completions", self.section.base_url.trim_end_matches('/'));
        let builder = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {api_key}"));
        let response: ChatResponse =
            post_json(NAME, builder, &request_body(&self.section, request)).await?;

        info!(
            model = %self.section.model,
            elapsed_ms = %start.elapsed().as_millis(),
            "Grok response received"
        );
        answer_text(response).ok_or_else(|| ProviderInvocationFailed::new(NAME, "Empty response from LLM"))
    }
}

// src/providers/gemini.rs

use super::{ProviderInvocationFailed, VisionProvider, VisionRequest, post_json};
use crate::config::ProviderSection;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

const NAME: &str = "gemini";

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

/// Google Generative Language API. The only adapter that uses the category
/// list: it becomes an enum in the response schema.
pub struct GeminiProvider {
    client: Client,
    section: ProviderSection,
}

impl GeminiProvider {
    pub fn new(client: Client, section: ProviderSection) -> Self {
        Self { client, section }
    }
}

fn response_schema(categories: &[String]) -> Value {
    let mut category = json!({ "type": "STRING" });
    if !categories.is_empty() {
        category["enum"] = json!(categories);
    }
    json!({
        "type": "OBJECT",
        "properties": {
            "date": { "type": "STRING" },
            "total_eur": { "type": "NUMBER" },
            "category": category,
            "payment_method": { "type": "STRING", "nullable": true },
            "notes": { "type": "STRING" },
            "tax_id": { "type": "STRING", "nullable": true },
            "card_last4": { "type": "STRING", "nullable": true }
        },
        "required": ["date", "total_eur", "category"]
    })
}

fn request_body(section: &ProviderSection, request: &VisionRequest<'_>) -> Value {
    json!({
        "contents": [{
            "parts": [
                {
                    "inline_data": {
                        "mime_type": request.mime_type,
                        "data": request.image_base64(),
                    }
                },
                { "text": request.prompt }
            ]
        }],
        "generationConfig": {
            "maxOutputTokens": section.max_tokens,
            "responseMimeType": "application/json",
            "responseSchema": response_schema(request.categories),
        }
    })
}

fn answer_text(response: GenerateResponse) -> Option<String> {
    let parts = response.candidates.into_iter().next()?.content?.parts;
    let text: String = parts.into_iter().filter_map(|p| p.text).collect();
    (!text.is_empty()).then_some(text)
}

#[async_trait]
impl VisionProvider for GeminiProvider {
    fn name(&self) -> &str {
        NAME
    }

    async fn invoke(&self, request: &VisionRequest<'_>) -> Result<String, ProviderInvocationFailed> {
        let api_key = self
            .section
            .api_key()
            .map_err(|e| ProviderInvocationFailed::new(NAME, e))?;
        let start = std::time::Instant::now();

        let url = format!(
            "{}/models/{}:generateContent",
            self.section.base_url.trim_end_matches('/'),
            self.section.model
        );
        let builder = self.client.post(&url).header("x-goog-api-key", api_key);
        let response: GenerateResponse =
            post_json(NAME, builder, &request_body(&self.section, request)).await?;

        info!(
            model = %self.section.model,
            elapsed_ms = %start.elapsed().as_millis(),
            "Gemini response received"
        );
        answer_text(response).ok_or_else(|| ProviderInvocationFailed::new(NAME, "empty candidate list"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VisionConfig;

    #[test]
    fn categories_become_schema_enum() {
        let cats = vec!["Храна".to_string(), "Разни".to_string()];
        let req = VisionRequest {
            image: b"abc",
            mime_type: "image/jpeg",
            prompt: "parse",
            categories: &cats,
        };
        let body = request_body(&VisionConfig::default().gemini, &req);
        let config = &body["generationConfig"];
        assert_eq!(config["responseMimeType"], "application/json");
        assert_eq!(
            config["responseSchema"]["properties"]["category"]["enum"],
            json!(["Храна", "Разни"])
        );
        let parts = &body["contents"][0]["parts"];
        assert_eq!(parts[0]["inline_data"]["data"], "YWJj");
        assert_eq!(parts[1]["text"], "parse");
    }

    #[test]
    fn no_categories_means_no_enum() {
        assert!(response_schema(&[])["properties"]["category"].get("enum").is_none());
    }

    #[test]
    fn text_parts_are_joined() {
        let response: GenerateResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": { "parts": [{ "text": "{\"date\":" }, { "text": "\"x\"}" }] },
                "finishReason": "STOP"
            }]
        }))
        .unwrap();
        assert_eq!(answer_text(response).as_deref(), Some("{\"date\":\"x\"}"));
    }

    #[test]
    fn blocked_prompt_has_no_answer() {
        let response: GenerateResponse =
            serde_json::from_value(json!({ "promptFeedback": { "blockReason": "SAFETY" } })).unwrap();
        assert_eq!(answer_text(response), None);
    }
}

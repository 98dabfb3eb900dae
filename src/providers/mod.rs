// src/providers/mod.rs

mod anthropic;
mod gemini;
mod openai_compat;

#[cfg(test)]
pub(crate) mod mock;

pub use anthropic::ClaudeProvider;
pub use gemini::GeminiProvider;
pub use openai_compat::GrokProvider;

use crate::config::VisionConfig;
use async_trait::async_trait;
use base64::Engine as _;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

/// Everything a vision service needs for one receipt.
#[derive(Debug, Clone, Copy)]
pub struct VisionRequest<'a> {
    pub image: &'a [u8],
    pub mime_type: &'a str,
    pub prompt: &'a str,
    /// Current allowed categories, for services that can constrain output.
    pub categories: &'a [String],
}

impl VisionRequest<'_> {
    pub fn image_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.image)
    }
}

/// Any failure talking to a vision service.
#[derive(Debug, thiserror::Error)]
#[error("{provider} invocation failed: {cause}")]
pub struct ProviderInvocationFailed {
    pub provider: String,
    pub cause: String,
}

impl ProviderInvocationFailed {
    pub fn new(provider: &str, cause: impl ToString) -> Self {
        Self {
            provider: provider.to_string(),
            cause: cause.to_string(),
        }
    }
}

/// One external vision model: image + prompt in, raw answer text out.
#[async_trait]
pub trait VisionProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn invoke(&self, request: &VisionRequest<'_>) -> Result<String, ProviderInvocationFailed>;
}

/// Name-to-adapter mapping, in registration order.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn VisionProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the three built-in services sharing one HTTP client.
    pub fn from_config(cfg: &VisionConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;
        Ok(Self::new()
            .with(ClaudeProvider::new(client.clone(), cfg.claude.clone()))
            .with(GeminiProvider::new(client.clone(), cfg.gemini.clone()))
            .with(GrokProvider::new(client, cfg.grok.clone())))
    }

    pub fn with(mut self, provider: impl VisionProvider + 'static) -> Self {
        self.providers.retain(|p| p.name() != provider.name());
        self.providers.push(Arc::new(provider));
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn VisionProvider>> {
        self.providers.iter().find(|p| p.name() == name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }
}

/// POST a JSON body and decode a JSON answer, folding every failure into
/// `ProviderInvocationFailed`.
pub(crate) async fn post_json<T: serde::de::DeserializeOwned>(
    provider: &str,
    request: reqwest::RequestBuilder,
    body: &serde_json::Value,
) -> Result<T, ProviderInvocationFailed> {
    let response = request
        .json(body)
        .send()
        .await
        .map_err(|e| ProviderInvocationFailed::new(provider, e))?;

    if !response.status().is_success() {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        return Err(ProviderInvocationFailed::new(
            provider,
            format!("API error {status}: {text}"),
        ));
    }

    response
        .json::<T>()
        .await
        .map_err(|e| ProviderInvocationFailed::new(provider, format!("undecodable response: {e}")))
}

// src/providers/mock.rs

use super::{ProviderInvocationFailed, VisionProvider, VisionRequest};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// What a mock was asked: image bytes, MIME type, number of categories.
pub type Call = (Vec<u8>, String, usize);

/// Replays a canned answer and records every invocation.
pub struct MockProvider {
    pub name: &'static str,
    pub answer: Result<String, String>,
    pub seen: Arc<Mutex<Vec<Call>>>,
}

impl MockProvider {
    pub fn answering(name: &'static str, answer: &str) -> Self {
        Self {
            name,
            answer: Ok(answer.to_string()),
            seen: Arc::default(),
        }
    }

    pub fn failing(name: &'static str, cause: &str) -> Self {
        Self {
            name,
            answer: Err(cause.to_string()),
            seen: Arc::default(),
        }
    }
}

#[async_trait]
impl VisionProvider for MockProvider {
    fn name(&self) -> &str {
        self.name
    }

    async fn invoke(&self, request: &VisionRequest<'_>) -> Result<String, ProviderInvocationFailed> {
        self.seen.lock().unwrap().push((
            request.image.to_vec(),
            request.mime_type.to_string(),
            request.categories.len(),
        ));
        self.answer
            .clone()
            .map_err(|e| ProviderInvocationFailed::new(self.name, e))
    }
}

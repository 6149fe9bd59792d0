use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::{ChatTurn, Generator};
use crate::core::config::GenerationConfig;
use crate::core::errors::ApiError;

#[derive(Clone)]
pub struct HttpGenerator {
    base_url: String,
    model: String,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    client: Client,
}

impl HttpGenerator {
    pub fn new(config: GenerationConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            client: Client::new(),
        }
    }
}

#[async_trait]
impl Generator for HttpGenerator {
    fn name(&self) -> &str {
        "http"
    }

    async fn generate(&self, system_prompt: &str, turns: &[ChatTurn]) -> Result<String, ApiError> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let mut messages = vec![json!({"role": "system", "content": system_prompt})];
        for turn in turns {
            messages.push(json!({"role": turn.role, "content": turn.content}));
        }

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "stream": false,
        });
        if let Some(obj) = body.as_object_mut() {
            if let Some(t) = self.temperature {
                obj.insert("temperature".to_string(), json!(t));
            }
            if let Some(t) = self.max_tokens {
                obj.insert("max_tokens".to_string(), json!(t));
            }
        }

        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|err| ApiError::GenerationFailed(err.to_string()))?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::GenerationFailed(format!(
                "generation provider returned {status}: {text}"
            )));
        }

        let payload: Value = res
            .json()
            .await
            .map_err(|err| ApiError::GenerationFailed(err.to_string()))?;

        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();

        if content.is_empty() {
            return Err(ApiError::GenerationFailed(
                "generation provider returned an empty completion".to_string(),
            ));
        }

        Ok(content)
    }
}

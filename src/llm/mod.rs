//! Answer-generation provider.
//!
//! The generation model is an external collaborator reached over an
//! OpenAI-compatible chat-completions API. Only the client interface lives
//! here; the chat session manager decides what goes into the prompt.

pub mod http;

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::config::GenerationConfig;
use crate::core::errors::ApiError;

pub use http::HttpGenerator;

/// One turn of conversation handed to the generator.
#[derive(Debug, Clone)]
pub struct ChatTurn {
    /// "user" or "assistant".
    pub role: String,
    pub content: String,
}

#[async_trait]
pub trait Generator: Send + Sync {
    fn name(&self) -> &str;

    /// Produce an assistant reply for the given system prompt and history.
    async fn generate(&self, system_prompt: &str, turns: &[ChatTurn]) -> Result<String, ApiError>;
}

pub fn build_generator(config: &GenerationConfig) -> Arc<dyn Generator> {
    Arc::new(HttpGenerator::new(config.clone()))
}

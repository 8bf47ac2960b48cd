use crate::llm::client::{LLMClient, TextStream};
use crate::types::{AppError, Result};
use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use ollama_rs::{
    generation::chat::{request::ChatMessageRequest, ChatMessage},
    models::ModelOptions,
    Ollama,
};

const DEFAULT_PORT: u16 = 11434;

pub struct OllamaClient {
    client: Ollama,
    model: String,
}

impl OllamaClient {
    pub fn new(base_url: String, model: String) -> Result<Self> {
        let (host, port) = split_base_url(&base_url);
        let client = Ollama::new(host, port);

        Ok(Self { client, model })
    }

    fn request(&self, prompt: &str, max_tokens: u32) -> ChatMessageRequest {
        let messages = vec![ChatMessage::user(prompt.to_string())];
        let num_predict = i32::try_from(max_tokens).unwrap_or(i32::MAX);

        ChatMessageRequest::new(self.model.clone(), messages)
            .options(ModelOptions::default().num_predict(num_predict))
    }
}

/// Split `scheme://host:port` into the `(scheme://host, port)` pair Ollama expects.
fn split_base_url(base_url: &str) -> (String, u16) {
    let (scheme, rest) = match base_url.split_once("://") {
        Some((scheme, rest)) => (scheme, rest),
        None => ("http", base_url),
    };
    let rest = rest.trim_end_matches('/');

    match rest.rsplit_once(':') {
        Some((host, port)) => (
            format!("{}://{}", scheme, host),
            port.parse().unwrap_or(DEFAULT_PORT),
        ),
        None if rest.is_empty() => (format!("{}://localhost", scheme), DEFAULT_PORT),
        None => (format!("{}://{}", scheme, rest), DEFAULT_PORT),
    }
}

#[async_trait]
impl LLMClient for OllamaClient {
    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        let response = self
            .client
            .send_chat_messages(self.request(prompt, max_tokens))
            .await
            .map_err(|e| AppError::LLM(format!("Ollama error: {}", e)))?;

        Ok(response.message.content)
    }

    async fn stream(&self, prompt: &str, max_tokens: u32) -> Result<TextStream> {
        let mut stream_response = self
            .client
            .send_chat_messages_stream(self.request(prompt, max_tokens))
            .await
            .map_err(|e| AppError::LLM(format!("Ollama stream error: {}", e)))?;

        let output_stream = stream! {
            while let Some(chunk_result) = stream_response.next().await {
                match chunk_result {
                    Ok(chunk) => {
                        let content = chunk.message.content;
                        if !content.is_empty() {
                            yield Ok(content);
                        }
                    }
                    Err(_) => {
                        yield Err(AppError::LLM("Stream chunk error".to_string()));
                        break;
                    }
                }
            }
        };

        Ok(Box::new(Box::pin(output_stream)))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

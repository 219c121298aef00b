//! OpenAI-compatible chat and embeddings client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, instrument};

/// Chat completion and embedding generation, as consumed by the query
/// expander, contextual chunker, and answerer stages.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> anyhow::Result<String>;
    async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// Talks to a vLLM-style OpenAI-compatible chat endpoint and a (possibly
/// different) OpenAI-compatible embeddings endpoint.
#[derive(Debug, Clone)]
pub struct ReqwestLlmClient {
    client: Client,
    model: String,
    embedding_model: String,
    base_url: String,
    embedding_base_url: String,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

impl ReqwestLlmClient {
    pub fn new(
        model: impl Into<String>,
        embedding_model: impl Into<String>,
        base_url: impl Into<String>,
        embedding_base_url: impl Into<String>,
    ) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            model: model.into(),
            embedding_model: embedding_model.into(),
            base_url: base_url.into(),
            embedding_base_url: embedding_base_url.into(),
        })
    }
}

#[async_trait]
impl LlmClient for ReqwestLlmClient {
    #[instrument(skip(self, prompt), fields(prompt_len = prompt.len()))]
    async fn complete(&self, prompt: &str) -> anyhow::Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            stream: false,
            temperature: 0.1,
            max_tokens: 1024,
        };

        let url = format!("{}/chat/completions", self.base_url);
        debug!(url, "dispatching chat completion");

        let response = self
            .client
            .post(&url)
            .json(&json!(request))
            .send()
            .await?
            .error_for_status()?
            .json::<ChatResponse>()
            .await?;

        let content = response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| anyhow::anyhow!("chat completion returned no choices"))?;

        info!(len = content.len(), "chat completion received");
        Ok(content)
    }

    #[instrument(skip(self, texts), fields(count = texts.len()))]
    async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.embedding_base_url);
        let mut embeddings = Vec::with_capacity(texts.len());

        for text in texts {
            let request = EmbeddingRequest {
                model: &self.embedding_model,
                input: text,
            };

            let response = self
                .client
                .post(&url)
                .json(&json!(request))
                .send()
                .await?
                .error_for_status()?
                .json::<EmbeddingResponse>()
                .await?;

            let embedding = response
                .data
                .into_iter()
                .next()
                .map(|d| d.embedding)
                .ok_or_else(|| anyhow::anyhow!("embeddings response had no data"))?;
            embeddings.push(embedding);
        }

        info!(count = embeddings.len(), "embeddings generated");
        Ok(embeddings)
    }
}

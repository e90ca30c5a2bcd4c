//! Ollama HTTP client and provider implementations

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use crate::config::LlmConfig;
use crate::error::{Error, Result};

use super::embedding::EmbeddingProvider;
use super::llm::{EntitySummary, LlmProvider};

/// Ollama API client with bounded retry
pub struct OllamaClient {
    client: Client,
    config: LlmConfig,
    max_retries: u32,
}

#[derive(Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Serialize)]
struct EmbedRequest {
    model: String,
    prompt: String,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

impl OllamaClient {
    pub fn new(config: &LlmConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(5)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            max_retries: config.max_retries,
            config: config.clone(),
        }
    }

    /// Retry a request with exponential backoff
    async fn retry_request<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    last_error = Some(e);
                    if attempt < self.max_retries {
                        let delay = Duration::from_secs(2u64.pow(attempt));
                        tracing::warn!(
                            "Ollama request failed (attempt {}/{}), retrying in {:?}",
                            attempt + 1,
                            self.max_retries + 1,
                            delay
                        );
                        sleep(delay).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| Error::Llm("Unknown error".to_string())))
    }

    /// Check if Ollama is reachable
    pub async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/api/tags", self.config.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    /// Generate an embedding with retry
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.config.base_url);
        let text = text.to_string();
        let model = self.config.embed_model.clone();
        let client = self.client.clone();

        self.retry_request(|| {
            let url = url.clone();
            let text = text.clone();
            let model = model.clone();
            let client = client.clone();

            async move {
                let request = EmbedRequest {
                    model,
                    prompt: text,
                };

                let response = client
                    .post(&url)
                    .json(&request)
                    .send()
                    .await
                    .map_err(|e| Error::embedding(format!("request failed: {}", e)))?;

                if !response.status().is_success() {
                    return Err(Error::embedding(format!("HTTP {}", response.status())));
                }

                let embed_response: EmbedResponse = response
                    .json()
                    .await
                    .map_err(|e| Error::embedding(format!("bad response body: {}", e)))?;

                Ok(embed_response.embedding)
            }
        })
        .await
    }

    /// Run a completion with retry
    pub async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.config.base_url);
        let prompt = prompt.to_string();
        let model = self.config.generate_model.clone();
        let temperature = self.config.temperature;
        let client = self.client.clone();

        self.retry_request(|| {
            let url = url.clone();
            let prompt = prompt.clone();
            let model = model.clone();
            let client = client.clone();

            async move {
                let request = GenerateRequest {
                    model,
                    prompt,
                    stream: false,
                    options: GenerateOptions { temperature },
                };

                let response = client
                    .post(&url)
                    .json(&request)
                    .send()
                    .await
                    .map_err(|e| Error::llm(format!("generation request failed: {}", e)))?;

                if !response.status().is_success() {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    return Err(Error::llm(format!("HTTP {} - {}", status, body)));
                }

                let generate_response: GenerateResponse = response
                    .json()
                    .await
                    .map_err(|e| Error::llm(format!("bad response body: {}", e)))?;

                Ok(generate_response.response)
            }
        })
        .await
    }

    pub fn embed_model(&self) -> &str {
        &self.config.embed_model
    }

    pub fn generate_model(&self) -> &str {
        &self.config.generate_model
    }
}

/// Embeddings via a shared Ollama client
pub struct OllamaEmbedder {
    client: Arc<OllamaClient>,
    dimensions: usize,
}

impl OllamaEmbedder {
    pub fn new(client: Arc<OllamaClient>, dimensions: usize) -> Self {
        Self { client, dimensions }
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embedding = self.client.embed(text).await?;
        if embedding.len() != self.dimensions {
            return Err(Error::embedding(format!(
                "expected {} dimensions, got {}",
                self.dimensions,
                embedding.len()
            )));
        }
        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn health_check(&self) -> Result<bool> {
        self.client.health_check().await
    }

    fn name(&self) -> &str {
        "ollama-embedder"
    }
}

/// Entity summarization via a shared Ollama client
pub struct OllamaLlm {
    client: Arc<OllamaClient>,
}

impl OllamaLlm {
    pub fn new(client: Arc<OllamaClient>) -> Self {
        Self { client }
    }

    fn build_summary_prompt(entity: &str, raw_text: &str) -> String {
        format!(
            "你是贷款业务知识库的整理助手。请根据下面的资料，总结“{entity}”的基本情况，\
             重点包括银行类型、总部、主要业务和与个人/企业贷款相关的信息。\
             只能使用资料中出现的事实，不得编造。\n\n\
             资料：\n{raw_text}\n\n\
             请严格输出JSON，格式：\
             {{\"title\": \"{entity}\", \"body\": \"...\", \"category\": \"bank_info\", \"tags\": [\"...\"]}}"
        )
    }

    /// Pull a JSON object out of a model response that may carry code fences
    /// or leading prose
    fn parse_summary(entity: &str, response: &str) -> Result<EntitySummary> {
        let trimmed = response.trim();
        let json_str = if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
            &trimmed[start..=end]
        } else {
            return Err(Error::llm(format!(
                "summary for '{}' contained no JSON object",
                entity
            )));
        };

        let summary: EntitySummary = serde_json::from_str(json_str)
            .map_err(|e| Error::llm(format!("unparseable summary for '{}': {}", entity, e)))?;

        if summary.body.trim().is_empty() {
            return Err(Error::llm(format!("empty summary body for '{}'", entity)));
        }
        Ok(summary)
    }
}

#[async_trait]
impl LlmProvider for OllamaLlm {
    async fn summarize_entity(&self, entity: &str, raw_text: &str) -> Result<EntitySummary> {
        let prompt = Self::build_summary_prompt(entity, raw_text);
        let response = self.client.generate(&prompt).await?;
        Self::parse_summary(entity, &response)
    }

    async fn health_check(&self) -> Result<bool> {
        self.client.health_check().await
    }

    fn name(&self) -> &str {
        "ollama-llm"
    }

    fn model(&self) -> &str {
        self.client.generate_model()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fenced_summary_json() {
        let response = "好的，以下是总结：\n```json\n{\"title\": \"星展银行\", \"body\": \"新加坡最大的商业银行\", \"category\": \"bank_info\", \"tags\": [\"DBS\", \"外资银行\"]}\n```";
        let summary = OllamaLlm::parse_summary("星展银行", response).unwrap();
        assert_eq!(summary.title, "星展银行");
        assert_eq!(summary.tags, vec!["DBS", "外资银行"]);
    }

    #[test]
    fn rejects_summary_without_json() {
        let err = OllamaLlm::parse_summary("星展银行", "抱歉，资料不足。").unwrap_err();
        assert!(matches!(err, Error::Llm(_)));
    }
}

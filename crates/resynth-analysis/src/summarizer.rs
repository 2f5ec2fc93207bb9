//! Summarizer collaborator (§6: external collaborator).
//!
//! Talks the Ollama `/api/generate` JSON contract directly: one
//! generation task per call, with a long client timeout for slow local
//! inference. The Map phase's "submit all chunk prompts as one batch"
//! requirement (§4.6 step 3b) is realized as concurrent dispatch via
//! `futures`, since Ollama has no native batch-inference endpoint to
//! delegate to.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SummarizeError {
    #[error("could not reach the summarizer: {0}")]
    Connection(#[from] reqwest::Error),
    #[error("summarizer returned an error: {0}")]
    Api(String),
}

#[async_trait::async_trait]
pub trait Summarizer: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, SummarizeError>;

    /// Submits every prompt concurrently and returns results in the same
    /// order as the input — the Map phase's batch requirement.
    async fn generate_batch(&self, prompts: &[String]) -> Result<Vec<String>, SummarizeError> {
        let futures = prompts.iter().map(|p| self.generate(p));
        futures::future::try_join_all(futures).await
    }
}

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: usize,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    #[allow(dead_code)]
    done: bool,
}

pub struct OllamaSummarizer {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    temperature: f32,
    num_predict: usize,
}

impl OllamaSummarizer {
    pub fn new(endpoint: String, model: String, temperature: f32, num_predict: usize) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(300))
                .build()
                .expect("building the summarizer HTTP client with static, valid settings cannot fail"),
            endpoint,
            model,
            temperature,
            num_predict,
        }
    }
}

#[async_trait::async_trait]
impl Summarizer for OllamaSummarizer {
    async fn generate(&self, prompt: &str) -> Result<String, SummarizeError> {
        let request = OllamaRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: OllamaOptions { temperature: self.temperature, num_predict: self.num_predict },
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.endpoint))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SummarizeError::Api(format!("status {}", response.status())));
        }

        let body: OllamaResponse = response.json().await?;
        Ok(body.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoSummarizer;

    #[async_trait::async_trait]
    impl Summarizer for EchoSummarizer {
        async fn generate(&self, prompt: &str) -> Result<String, SummarizeError> {
            Ok(format!("summary-of:{prompt}"))
        }
    }

    #[tokio::test]
    async fn generate_batch_preserves_input_order() {
        let summarizer = EchoSummarizer;
        let prompts = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let results = summarizer.generate_batch(&prompts).await.unwrap();
        assert_eq!(results, vec!["summary-of:a", "summary-of:b", "summary-of:c"]);
    }
}

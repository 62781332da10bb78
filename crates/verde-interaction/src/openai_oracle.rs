//! OpenAI-compatible REST client.
//!
//! Talks to any endpoint exposing `/chat/completions` and `/embeddings`
//! (OpenAI itself in remote mode, LM Studio or llama.cpp servers in local
//! mode).

use crate::oracle::{ChatOracle, OracleError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use verde_core::config::LlmConfig;
use verde_core::error::{Result, VerdeError};
use verde_core::intent::Embedder;

const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

#[derive(Clone)]
pub struct OpenAiCompatibleOracle {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    embedding_model: String,
    timeout: Duration,
    temperature: Option<f32>,
}

impl OpenAiCompatibleOracle {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            timeout,
            temperature: Some(0.2),
        }
    }

    /// Builds a client for the endpoint selected by `config.mode`.
    pub fn from_config(config: &LlmConfig, api_key: Option<String>) -> Self {
        let endpoint = config.endpoint();
        let oracle = Self::new(
            endpoint.base_url.clone(),
            endpoint.model.clone(),
            api_key,
            Duration::from_secs(config.timeout_secs),
        );
        match &endpoint.embedding_model {
            Some(model) => oracle.with_embedding_model(model.clone()),
            None => oracle,
        }
    }

    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> std::result::Result<R, OracleError>
    where
        B: Serialize + Sync,
        R: for<'de> Deserialize<'de>,
    {
        let url = format!("{}/{}", self.base_url, path);
        let mut request = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .header("content-type", "application/json")
            .json(body);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request.send().await.map_err(|err| {
            if err.is_timeout() {
                OracleError::Timeout {
                    secs: self.timeout.as_secs(),
                }
            } else {
                OracleError::Connection(format!("{}: {}", url, err))
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(map_http_error(status, body_text));
        }

        response.json::<R>().await.map_err(|err| {
            if err.is_timeout() {
                OracleError::Timeout {
                    secs: self.timeout.as_secs(),
                }
            } else {
                OracleError::Decode(err.to_string())
            }
        })
    }
}

#[async_trait]
impl ChatOracle for OpenAiCompatibleOracle {
    async fn complete(&self, system: &str, user: &str) -> std::result::Result<String, OracleError> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: self.temperature,
        };
        tracing::debug!("[Oracle] chat completion via {} ({})", self.base_url, self.model);
        let response: ChatCompletionResponse = self.post("chat/completions", &request).await?;
        extract_text_response(response)
    }
}

#[async_trait]
impl Embedder for OpenAiCompatibleOracle {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            model: &self.embedding_model,
            input: texts,
        };
        let response: EmbeddingResponse = self
            .post("embeddings", &request)
            .await
            .map_err(VerdeError::from)?;

        let mut data = response.data;
        data.sort_by_key(|d| d.index);
        if data.len() != texts.len() {
            return Err(VerdeError::oracle_unavailable(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                data.len()
            )));
        }
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

fn extract_text_response(response: ChatCompletionResponse) -> std::result::Result<String, OracleError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or(OracleError::Empty)
}

fn map_http_error(status: StatusCode, body: String) -> OracleError {
    let message = serde_json::from_str::<ErrorResponse>(&body)
        .map(|wrapper| wrapper.error.message)
        .unwrap_or(body);
    OracleError::Status {
        status: status.as_u16(),
        message,
    }
}

//! Groq Batch API client.
//!
//! Submission side: serialize classification requests to JSONL, upload the
//! file with purpose="batch", and create a batch job against it with a 24h
//! completion window. Polling side: retrieve batch status and download the
//! result file content, which the provider invalidates after one read.

use anyhow::{anyhow, Context};
use reqwest::multipart;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::{worker_config::cfg, HttpClient};

use super::{ClassificationAnswer, CATEGORY_SCHEMA};

const BATCHES_ENDPOINT: &str = "https://api.groq.com/openai/v1/batches";
const FILES_ENDPOINT: &str = "https://api.groq.com/openai/v1/files";

const COMPLETION_WINDOW: &str = "24h";
const CHAT_COMPLETIONS_URL: &str = "/v1/chat/completions";

// ============================================================================
// Error Types
// ============================================================================

/// Structured error body from the Groq API
#[derive(Debug, Clone, Deserialize)]
pub struct GroqApiError {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: Option<String>,
    pub code: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct GroqApiErrorEnvelope {
    error: GroqApiError,
}

impl std::fmt::Display for GroqApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref code) = self.code {
            write!(f, " [code: {}]", code)?;
        }
        Ok(())
    }
}

/// Errors that can occur when submitting a batch
#[derive(Debug, Error)]
pub enum SubmitBatchError {
    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(GroqApiError),

    #[error("Authentication failed: {0}")]
    AuthenticationError(GroqApiError),

    #[error("Rate limited: {0}")]
    RateLimited(GroqApiError),

    #[error("Server error: {0}")]
    ServerError(GroqApiError),

    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Failed to serialize requests: {0}")]
    ParseError(#[from] serde_json::Error),
}

fn classify_api_error(status: u16, error_body: String) -> SubmitBatchError {
    if let Ok(envelope) = serde_json::from_str::<GroqApiErrorEnvelope>(&error_body) {
        return match status {
            400 => SubmitBatchError::InvalidRequest(envelope.error),
            401 => SubmitBatchError::AuthenticationError(envelope.error),
            429 => SubmitBatchError::RateLimited(envelope.error),
            500..=599 => SubmitBatchError::ServerError(envelope.error),
            _ => SubmitBatchError::ApiError {
                status,
                message: envelope.error.message,
            },
        };
    }

    SubmitBatchError::ApiError {
        status,
        message: error_body,
    }
}

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub format_type: String,
    pub json_schema: JsonSchemaSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonSchemaSpec {
    pub name: String,
    pub schema: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequestBody {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub response_format: ResponseFormat,
    pub temperature: f64,
}

/// One line of the JSONL request file: a chat-completion call for a single
/// channel, keyed by a fresh uuid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    pub custom_id: String,
    pub method: String,
    pub url: String,
    pub body: ChatRequestBody,
}

impl BatchRequest {
    /// Build a classification request for one channel.
    pub fn for_classification(system_prompt: String, user_content: String) -> Self {
        Self {
            custom_id: Uuid::new_v4().to_string(),
            method: "POST".to_string(),
            url: CHAT_COMPLETIONS_URL.to_string(),
            body: ChatRequestBody {
                model: cfg.model.id.clone(),
                messages: vec![
                    ChatMessage {
                        role: "system".to_string(),
                        content: system_prompt,
                    },
                    ChatMessage {
                        role: "user".to_string(),
                        content: user_content,
                    },
                ],
                response_format: ResponseFormat {
                    format_type: "json_schema".to_string(),
                    json_schema: JsonSchemaSpec {
                        name: "channel_category_analysis".to_string(),
                        schema: CATEGORY_SCHEMA.clone(),
                    },
                },
                temperature: cfg.model.temperature,
            },
        }
    }
}

// ============================================================================
// Response Types
// ============================================================================

/// Provider-side batch status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Validating,
    InProgress,
    Finalizing,
    Completed,
    Failed,
    Expired,
    Cancelling,
    Cancelled,
}

impl BatchStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, BatchStatus::Completed)
    }

    /// Failed or expired batches need resubmission, which is not implemented.
    pub fn is_dead(&self) -> bool {
        matches!(
            self,
            BatchStatus::Failed | BatchStatus::Expired | BatchStatus::Cancelled
        )
    }
}

/// Batch details as returned by the provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub id: String,
    pub status: BatchStatus,
    pub input_file_id: String,
    pub output_file_id: Option<String>,
    pub error_file_id: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub completion_window: Option<String>,
}

/// A single line of the downloaded result file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResultLine {
    pub id: String,
    pub custom_id: String,
    pub response: BatchResultResponse,
    pub error: Option<BatchResultError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResultResponse {
    pub status_code: u16,
    pub body: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResultError {
    pub message: String,
}

/// Identifiers recorded after a successful submission
#[derive(Debug, Clone)]
pub struct SubmittedBatch {
    pub file_id: String,
    pub batch_id: String,
}

// ============================================================================
// API Client Functions
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
struct FileUploadResponse {
    id: String,
}

/// Serialize batch requests to JSONL (in memory)
fn create_jsonl_content(requests: &[BatchRequest]) -> Result<Vec<u8>, serde_json::Error> {
    let mut content = Vec::new();
    for request in requests {
        let line = serde_json::to_string(request)?;
        content.extend_from_slice(line.as_bytes());
        content.push(b'\n');
    }
    Ok(content)
}

/// Groq API client handle. Holds the shared HTTP client and the bearer key,
/// passed explicitly to every call site.
#[derive(Clone)]
pub struct GroqBatchClient {
    http_client: HttpClient,
    api_key: String,
}

impl GroqBatchClient {
    pub fn new(http_client: HttpClient, api_key: String) -> Self {
        Self {
            http_client,
            api_key,
        }
    }

    /// Upload JSONL content to the files endpoint with purpose="batch"
    async fn upload_batch_file(&self, jsonl_content: Vec<u8>) -> Result<String, SubmitBatchError> {
        let file_part = multipart::Part::bytes(jsonl_content)
            .file_name("batch.jsonl")
            .mime_str("application/jsonl")
            .map_err(|e| SubmitBatchError::ApiError {
                status: 0,
                message: format!("Failed to create multipart: {}", e),
            })?;

        let form = multipart::Form::new()
            .text("purpose", "batch")
            .part("file", file_part);

        let resp = self
            .http_client
            .post(FILES_ENDPOINT)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let error_body = resp.text().await.unwrap_or_default();
            return Err(classify_api_error(status, error_body));
        }

        let upload_response: FileUploadResponse = resp.json().await?;
        Ok(upload_response.id)
    }

    /// Upload the request file and create a batch against it. Returns both
    /// provider identifiers; any failure propagates to the caller, which
    /// treats it as the signal to abort the remaining chunks of the run.
    pub async fn submit_batch(
        &self,
        requests: &[BatchRequest],
    ) -> Result<SubmittedBatch, SubmitBatchError> {
        let jsonl_content = create_jsonl_content(requests)?;

        let file_id = self.upload_batch_file(jsonl_content).await?;
        tracing::debug!("Uploaded batch file with id: {}", file_id);

        let resp = self
            .http_client
            .post(BATCHES_ENDPOINT)
            .bearer_auth(&self.api_key)
            .header("Accept", "application/json")
            .json(&json!({
                "input_file_id": file_id,
                "endpoint": CHAT_COMPLETIONS_URL,
                "completion_window": COMPLETION_WINDOW,
            }))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let error_body = resp.text().await.unwrap_or_default();
            return Err(classify_api_error(status, error_body));
        }

        let batch: Batch = resp.json().await?;
        tracing::info!("Created batch {} (status: {:?})", batch.id, batch.status);

        Ok(SubmittedBatch {
            file_id,
            batch_id: batch.id,
        })
    }

    /// Get the current status of a batch
    pub async fn get_batch(&self, batch_id: &str) -> anyhow::Result<Batch> {
        let url = format!("{}/{}", BATCHES_ENDPOINT, batch_id);

        let resp = self
            .http_client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .context("Failed to get batch status")?;

        if !resp.status().is_success() {
            let error_body = resp.text().await.unwrap_or_default();
            return Err(anyhow!("Failed to get batch {}: {}", batch_id, error_body));
        }

        resp.json::<Batch>()
            .await
            .context("Failed to parse batch response")
    }

    /// Download and line-parse a result file. The provider invalidates the
    /// file after one download, so callers get exactly one shot at it.
    /// Malformed lines are discarded with a warning.
    pub async fn download_results(&self, file_id: &str) -> anyhow::Result<Vec<BatchResultLine>> {
        let url = format!("{}/{}/content", FILES_ENDPOINT, file_id);

        let resp = self
            .http_client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .context("Failed to download results file")?;

        if !resp.status().is_success() {
            let error_body = resp.text().await.unwrap_or_default();
            return Err(anyhow!("Failed to download results: {}", error_body));
        }

        let content = resp
            .text()
            .await
            .context("Failed to read results content")?;

        Ok(parse_result_lines(&content))
    }
}

/// Parse JSONL result content, skipping lines that fail to parse.
pub fn parse_result_lines(content: &str) -> Vec<BatchResultLine> {
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .enumerate()
        .filter_map(|(i, line)| {
            serde_json::from_str(line)
                .map_err(|e| {
                    tracing::warn!("Skipping bad result line {}: {:?}", i, e);
                    e
                })
                .ok()
        })
        .collect()
}

/// Extract validated classification answers from result lines. Lines with a
/// request-level error, a non-200 status, or model output failing shape
/// validation are discarded.
pub fn parse_classification_results(results: Vec<BatchResultLine>) -> Vec<ClassificationAnswer> {
    results
        .into_iter()
        .filter_map(|result| {
            if result.error.is_some() || result.response.status_code != 200 {
                tracing::warn!(
                    "Skipping failed result {}: {:?}",
                    result.custom_id,
                    result.error
                );
                return None;
            }

            let body = &result.response.body;
            let choices = body.get("choices")?.as_array()?;
            let choice = choices.first()?;
            let content = choice.get("message")?.get("content")?.as_str()?;

            match super::parse_classification_answer(content) {
                Some(answer) => Some(answer),
                None => {
                    tracing::warn!(
                        "Discarding invalid model output for request {}",
                        result.custom_id
                    );
                    None
                }
            }
        })
        .collect()
}

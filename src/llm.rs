use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MAX_RETRIES: u32 = 2;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("LLM request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("LLM API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("LLM returned no content")]
    EmptyResponse,

    #[error("malformed LLM API response: {message}")]
    MalformedResponse { message: String },

    /// Structured output could not be parsed into the expected type.
    #[error("structured output does not match schema: {message}")]
    SchemaViolation { message: String },

    #[error("LLM client misconfigured: {message}")]
    Config { message: String },
}

/// One prompt sent to one model.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: String,
    pub temperature: f32,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>, temperature: f32) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            temperature,
        }
    }
}

/// A web source the search tool grounded its answer on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub url: String,
    pub title: Option<String>,
}

/// A span of the response text backed by one or more sources.
/// `end_index` is a byte offset into `GroundedResponse::text`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroundingSupport {
    pub end_index: usize,
    pub chunk_indices: Vec<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct GroundedResponse {
    pub text: String,
    pub sources: Vec<SourceDescriptor>,
    pub supports: Vec<GroundingSupport>,
}

/// The model collaborator the research pipeline talks to.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Free-text completion.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError>;

    /// Completion constrained to JSON matching `schema`. Returns the raw JSON text.
    async fn complete_json(
        &self,
        request: &CompletionRequest,
        schema: &Value,
    ) -> Result<String, LlmError>;

    /// Completion grounded on live web search results.
    async fn search(&self, request: &CompletionRequest) -> Result<GroundedResponse, LlmError>;
}

/// Types the model can be asked to produce directly.
pub trait StructuredOutput: DeserializeOwned {
    fn response_schema() -> Value;
}

/// Ask for a `T` and parse it. Anything that does not parse is a `SchemaViolation`.
pub async fn complete_structured<T: StructuredOutput>(
    llm: &dyn LanguageModel,
    request: &CompletionRequest,
) -> Result<T, LlmError> {
    let raw = llm.complete_json(request, &T::response_schema()).await?;
    parse_structured(&raw)
}

pub fn parse_structured<T: DeserializeOwned>(raw: &str) -> Result<T, LlmError> {
    let body = strip_code_fence(raw);
    serde_json::from_str(body).map_err(|e| LlmError::SchemaViolation {
        message: format!(
            "{} (response started with {:?})",
            e,
            body.chars().take(200).collect::<String>()
        ),
    })
}

/// Models sometimes wrap JSON in a ```json fence even when asked not to.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.find('\n').map(|i| &rest[i + 1..]).unwrap_or("");
    let rest = rest.trim_end();
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Gemini REST client.
pub struct LlmClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    max_retries: u32,
    retry_backoff: Duration,
}

impl LlmClient {
    pub fn from_env() -> Result<Self, LlmError> {
        let api_key = dotenv::var("GEMINI_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| LlmError::Config {
                message: "GEMINI_API_KEY is not set".to_string(),
            })?;
        let base_url =
            dotenv::var("GEMINI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());

        Self::new(base_url, api_key)
    }

    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff: Duration::from_millis(500),
        })
    }

    pub fn with_retries(mut self, max_retries: u32, backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_backoff = backoff;
        self
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            model
        )
    }

    /// POST with bounded retries on transport errors, 429 and 5xx.
    async fn generate(&self, model: &str, body: &Value) -> Result<GenerateContentResponse, LlmError> {
        let mut attempt = 0u32;
        loop {
            match self.try_generate(model, body).await {
                Ok(resp) => return Ok(resp),
                Err(e) if attempt < self.max_retries && is_retryable(&e) => {
                    attempt += 1;
                    warn!(model, attempt, error = %e, "LLM request failed, retrying");
                    tokio::time::sleep(self.retry_backoff * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn try_generate(
        &self,
        model: &str,
        body: &Value,
    ) -> Result<GenerateContentResponse, LlmError> {
        let resp = self
            .client
            .post(self.endpoint(model))
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(LlmError::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        debug!(model, response_len = text.len(), "LLM response received");
        serde_json::from_str(&text).map_err(|e| LlmError::MalformedResponse {
            message: e.to_string(),
        })
    }
}

fn is_retryable(err: &LlmError) -> bool {
    match err {
        LlmError::Http(_) => true,
        LlmError::Api { status, .. } => *status == 429 || *status >= 500,
        _ => false,
    }
}

fn request_body(request: &CompletionRequest) -> Value {
    json!({
        "contents": [{
            "role": "user",
            "parts": [{ "text": request.prompt }],
        }],
        "generationConfig": {
            "temperature": request.temperature,
        },
    })
}

#[async_trait]
impl LanguageModel for LlmClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let resp = self.generate(&request.model, &request_body(request)).await?;
        resp.text()
    }

    async fn complete_json(
        &self,
        request: &CompletionRequest,
        schema: &Value,
    ) -> Result<String, LlmError> {
        let mut body = request_body(request);
        body["generationConfig"]["responseMimeType"] = json!("application/json");
        body["generationConfig"]["responseSchema"] = schema.clone();

        let resp = self.generate(&request.model, &body).await?;
        resp.text()
    }

    async fn search(&self, request: &CompletionRequest) -> Result<GroundedResponse, LlmError> {
        let mut body = request_body(request);
        body["tools"] = json!([{ "google_search": {} }]);

        let resp = self.generate(&request.model, &body).await?;
        resp.into_grounded()
    }
}

// Gemini generateContent response, reduced to the fields we read.

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
    #[serde(default)]
    grounding_supports: Vec<RawSupport>,
}

#[derive(Debug, Deserialize)]
struct GroundingChunk {
    web: Option<WebChunk>,
}

#[derive(Debug, Deserialize)]
struct WebChunk {
    #[serde(default)]
    uri: String,
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSupport {
    segment: Option<Segment>,
    #[serde(default)]
    grounding_chunk_indices: Vec<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Segment {
    #[serde(default)]
    end_index: usize,
}

impl GenerateContentResponse {
    fn text(&self) -> Result<String, LlmError> {
        let candidate = self.candidates.first().ok_or(LlmError::EmptyResponse)?;
        let text: String = candidate
            .content
            .iter()
            .flat_map(|c| c.parts.iter())
            .filter_map(|p| p.text.as_deref())
            .collect();

        if text.is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(text)
    }

    fn into_grounded(self) -> Result<GroundedResponse, LlmError> {
        let text = self.text()?;
        let metadata = self
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.grounding_metadata)
            .unwrap_or_default();

        // Non-web chunks are dropped, so support indices are remapped onto `sources`.
        let mut remap = Vec::with_capacity(metadata.grounding_chunks.len());
        let mut sources = Vec::new();
        for chunk in metadata.grounding_chunks {
            match chunk.web {
                Some(web) if !web.uri.is_empty() => {
                    remap.push(Some(sources.len()));
                    sources.push(SourceDescriptor {
                        url: web.uri,
                        title: web.title,
                    });
                }
                _ => remap.push(None),
            }
        }

        let supports = metadata
            .grounding_supports
            .into_iter()
            .filter_map(|s| {
                let end_index = s.segment?.end_index;
                let chunk_indices: Vec<usize> = s
                    .grounding_chunk_indices
                    .iter()
                    .filter_map(|i| remap.get(*i).copied().flatten())
                    .collect();
                (!chunk_indices.is_empty()).then_some(GroundingSupport {
                    end_index,
                    chunk_indices,
                })
            })
            .collect();

        Ok(GroundedResponse {
            text,
            sources,
            supports,
        })
    }
}

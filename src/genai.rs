//! Minimal Gemini client for our use-cases.
//!
//! We call `generateContent` with a declared JSON response schema and `predict`
//! on an image model. Calls are instrumented and log model names, latencies and
//! response sizes (not contents).
//!
//! NOTE: We never log the API key; it travels in the `x-goog-api-key` header.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument};

use crate::error::GenAiError;
use crate::util::trunc_for_log;

/// Remote generative capabilities the quiz relies on. Implemented by [`Gemini`];
/// tests substitute in-process fakes.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
  /// Structured text generation: returns the parsed JSON document the model produced.
  async fn generate_json(
    &self,
    system: &str,
    user: &str,
    schema: &Value,
    temperature: f32,
  ) -> Result<Value, GenAiError>;

  /// Single prompt to single image.
  async fn generate_image(&self, prompt: &str) -> Result<GeneratedImage, GenAiError>;
}

#[derive(Clone, Debug)]
pub struct GeneratedImage {
  pub mime_type: String,
  pub base64: String,
}

impl GeneratedImage {
  pub fn data_url(&self) -> String {
    format!("data:{};base64,{}", self.mime_type, self.base64)
  }
}

#[derive(Clone)]
pub struct Gemini {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub text_model: String,
  pub image_model: String,
  pub live_model: String,
  pub live_url: String,
}

impl Gemini {
  /// Construct the client if we find GEMINI_API_KEY; otherwise return None.
  pub fn from_env() -> Option<Self> {
    let api_key = std::env::var("GEMINI_API_KEY").ok().filter(|k| !k.trim().is_empty())?;
    let base_url = std::env::var("GEMINI_BASE_URL")
      .unwrap_or_else(|_| "https://generativelanguage.googleapis.com/v1beta".into());
    let text_model = std::env::var("GEMINI_TEXT_MODEL").unwrap_or_else(|_| "gemini-2.5-flash".into());
    let image_model =
      std::env::var("GEMINI_IMAGE_MODEL").unwrap_or_else(|_| "imagen-4.0-generate-001".into());
    let live_model = std::env::var("GEMINI_LIVE_MODEL")
      .unwrap_or_else(|_| "gemini-2.5-flash-native-audio-preview-09-2025".into());
    let live_url = std::env::var("GEMINI_LIVE_URL").unwrap_or_else(|_| {
      "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent".into()
    });

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(60))
      .build()
      .ok()?;

    Some(Self { client, api_key, base_url, text_model, image_model, live_model, live_url })
  }

  /// Live session endpoint including the key query parameter.
  pub fn live_endpoint(&self) -> String {
    format!("{}?key={}", self.live_url, self.api_key)
  }

  async fn post<B: Serialize + Sync>(&self, url: &str, body: &B) -> Result<reqwest::Response, GenAiError> {
    let res = self
      .client
      .post(url)
      .header(USER_AGENT, "worldview-quiz-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header("x-goog-api-key", &self.api_key)
      .json(body)
      .send()
      .await?;

    let status = res.status();
    if status.is_success() {
      return Ok(res);
    }
    let body = res.text().await.unwrap_or_default();
    Err(classify_failure(status, &body))
  }
}

#[async_trait]
impl GenerativeModel for Gemini {
  #[instrument(level = "info", skip(self, system, user, schema), fields(model = %self.text_model, user_len = user.len()))]
  async fn generate_json(
    &self,
    system: &str,
    user: &str,
    schema: &Value,
    temperature: f32,
  ) -> Result<Value, GenAiError> {
    let url = format!("{}/models/{}:generateContent", self.base_url, self.text_model);
    let req = GenerateContentRequest {
      system_instruction: Content { role: None, parts: vec![Part { text: system.into() }] },
      contents: vec![Content { role: Some("user".into()), parts: vec![Part { text: user.into() }] }],
      generation_config: GenerationConfig {
        temperature,
        response_mime_type: "application/json".into(),
        response_schema: schema.clone(),
      },
    };

    let start = Instant::now();
    let res = self.post(&url, &req).await?;
    let body: GenerateContentResponse = res.json().await?;
    if let Some(usage) = &body.usage_metadata {
      info!(prompt_tokens = ?usage.prompt_token_count, candidate_tokens = ?usage.candidates_token_count, total_tokens = ?usage.total_token_count, elapsed = ?start.elapsed(), "Gemini usage");
    }

    let text = body
      .candidates
      .first()
      .and_then(|c| c.content.as_ref())
      .map(|c| c.parts.iter().filter_map(|p| p.text.as_deref()).collect::<String>())
      .unwrap_or_default();
    if text.trim().is_empty() {
      return Err(GenAiError::Malformed("empty candidate".into()));
    }

    serde_json::from_str::<Value>(text.trim())
      .map_err(|e| GenAiError::Malformed(format!("JSON parse error: {} in {}", e, trunc_for_log(&text, 120))))
  }

  #[instrument(level = "info", skip(self, prompt), fields(model = %self.image_model, prompt_len = prompt.len()))]
  async fn generate_image(&self, prompt: &str) -> Result<GeneratedImage, GenAiError> {
    let url = format!("{}/models/{}:predict", self.base_url, self.image_model);
    let req = serde_json::json!({
      "instances": [{ "prompt": prompt }],
      "parameters": { "sampleCount": 1, "aspectRatio": "1:1" },
    });

    let start = Instant::now();
    let res = self.post(&url, &req).await?;
    let body: PredictResponse = res.json().await?;
    let pred = body
      .predictions
      .into_iter()
      .find(|p| !p.bytes_base64_encoded.is_empty())
      .ok_or_else(|| GenAiError::Malformed("no image in predictions".into()))?;

    info!(elapsed = ?start.elapsed(), bytes_b64 = pred.bytes_base64_encoded.len(), "Image generated");
    Ok(GeneratedImage {
      mime_type: pred.mime_type.unwrap_or_else(|| "image/png".into()),
      base64: pred.bytes_base64_encoded,
    })
  }
}

/// Map a non-success response onto the error taxonomy. Quota exhaustion is
/// reported either as HTTP 429 or via the RESOURCE_EXHAUSTED status.
fn classify_failure(status: StatusCode, body: &str) -> GenAiError {
  let parsed = extract_gemini_error(body);
  let message = parsed
    .as_ref()
    .map(|e| e.message.clone())
    .unwrap_or_else(|| trunc_for_log(body, 200));
  let exhausted = parsed.as_ref().map(|e| e.status == "RESOURCE_EXHAUSTED").unwrap_or(false);
  if status == StatusCode::TOO_MANY_REQUESTS || exhausted {
    GenAiError::RateLimited(message)
  } else {
    GenAiError::Http { status: status.as_u16(), message }
  }
}

// --- Request/response DTOs ---

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
  system_instruction: Content,
  contents: Vec<Content>,
  generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content {
  #[serde(skip_serializing_if = "Option::is_none")]
  role: Option<String>,
  parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
  text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
  temperature: f32,
  response_mime_type: String,
  response_schema: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
  #[serde(default)] candidates: Vec<Candidate>,
  #[serde(default)] usage_metadata: Option<UsageMetadata>,
}

#[derive(Deserialize)]
struct Candidate {
  #[serde(default)] content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
  #[serde(default)] parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
  #[serde(default)] text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
  #[serde(default)] prompt_token_count: Option<u32>,
  #[serde(default)] candidates_token_count: Option<u32>,
  #[serde(default)] total_token_count: Option<u32>,
}

#[derive(Deserialize)]
struct PredictResponse {
  #[serde(default)] predictions: Vec<Prediction>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Prediction {
  #[serde(default)] bytes_base64_encoded: String,
  #[serde(default)] mime_type: Option<String>,
}

struct GeminiErrorBody {
  message: String,
  status: String,
}

/// Try to extract a clean error message from a Gemini error body.
fn extract_gemini_error(body: &str) -> Option<GeminiErrorBody> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj {
    #[serde(default)] message: String,
    #[serde(default)] status: String,
  }
  serde_json::from_str::<EWrap>(body)
    .ok()
    .map(|w| GeminiErrorBody { message: w.error.message, status: w.error.status })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn quota_status_is_rate_limit_even_without_429() {
    let body = r#"{"error":{"code":400,"message":"Quota exceeded","status":"RESOURCE_EXHAUSTED"}}"#;
    assert!(classify_failure(StatusCode::BAD_REQUEST, body).is_rate_limited());
    assert!(classify_failure(StatusCode::TOO_MANY_REQUESTS, "slow down").is_rate_limited());
  }

  #[test]
  fn other_statuses_keep_message() {
    let body = r#"{"error":{"code":403,"message":"API key invalid","status":"PERMISSION_DENIED"}}"#;
    match classify_failure(StatusCode::FORBIDDEN, body) {
      GenAiError::Http { status, message } => {
        assert_eq!(status, 403);
        assert_eq!(message, "API key invalid");
      }
      other => panic!("unexpected {other:?}"),
    }
  }
}

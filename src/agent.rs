//! LLM agent module for progressive summarization.
//!
//! Sends the article to the Anthropic Messages API and validates the JSON
//! object the model answers with.

use crate::config::AgentConfig;
use crate::summary::SummaryResult;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

const API_VERSION: &str = "2023-06-01";

/// Keys the model must return, in schema order
pub const REQUIRED_KEYS: [&str; 6] = [
    "ultraShort",
    "short",
    "medium",
    "detailed",
    "fluffPercentage",
    "noveltyScore",
];

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("LLM request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("The model returned an unexpected response format. Please try again.")]
    UnexpectedFormat,
    #[error("failed to parse response: {0}")]
    ParseError(String),
    #[error("Missing field \"{0}\" in model response.")]
    MissingField(&'static str),
    #[error("Invalid field \"{field}\" in model response: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Turns article text into a [`SummaryResult`].
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, api_key: &str, text: &str) -> Result<SummaryResult, AgentError>;
}

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ApiMessage>,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

/// One entry of the response content list; only `text` blocks carry text.
#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// Client for the Anthropic Messages API
pub struct AnthropicClient {
    client: Client,
    endpoint: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicClient {
    pub fn new(config: &AgentConfig) -> Self {
        Self {
            client: Client::new(),
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        }
    }
}

#[async_trait]
impl Summarizer for AnthropicClient {
    async fn summarize(&self, api_key: &str, text: &str) -> Result<SummaryResult, AgentError> {
        let request = ApiRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: vec![ApiMessage {
                role: "user",
                content: build_prompt(text),
            }],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            // {"error": {"type": "...", "message": "..."}}
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v["error"]["message"].as_str().map(String::from))
                .unwrap_or(body);
            return Err(AgentError::Api { status, message });
        }

        let body: ApiResponse = response.json().await?;
        debug!(stop_reason = ?body.stop_reason, blocks = body.content.len(), "model responded");

        parse_summary(&response_text(&body.content))
    }
}

/// Concatenate the text blocks of a response, ignoring every other block type
fn response_text(blocks: &[ContentBlock]) -> String {
    blocks
        .iter()
        .filter(|block| block.kind == "text")
        .filter_map(|block| block.text.as_deref())
        .collect()
}

/// Build the single user message sent to the model
pub fn build_prompt(text: &str) -> String {
    format!(
        r#"Analyze the article below and return summaries at four progressively detailed levels, plus two quality metrics.

IMPORTANT: Detect the language of the article and write ALL summaries in that same language.
If the article is in Russian, every summary field must be in Russian; if it is in French, every field must be in French. Match the article's language exactly.

Return ONLY raw JSON: no markdown code fences, no commentary, no extra text. Just the JSON object.

Required JSON schema (use exactly these keys):
{{
  "ultraShort": "2-3 crisp sentences capturing the essential message",
  "short": "One paragraph (5-7 sentences) covering ONLY points not mentioned in ultraShort",
  "medium": "3-4 paragraphs adding ONLY details, arguments and evidence not covered in ultraShort or short",
  "detailed": "A comprehensive continuation covering the remaining significant content, structure and conclusions not yet mentioned; assume the reader has read all previous levels",
  "fluffPercentage": <integer 0-100>,
  "noveltyScore": <integer 0-100>
}}

Progressive summary rules:
- No level may repeat information already stated in a previous level
- Each level continues where the previous one left off, adding depth and new details
- A reader going through all four levels in order gets the complete picture with zero repetition
- ultraShort captures the core message; each later level only expands on it

Scoring rubric:
- fluffPercentage: what percentage of the article is filler, repetition, obvious facts, ads or padding?
  0 = extremely dense, every sentence adds value
  100 = mostly padding, nearly no substance
- noveltyScore: how fresh, unique or insightful is the content?
  0 = generic common knowledge, nothing new
  100 = highly original insights, surprising data or a rare perspective

Article:
---
{text}
---"#
    )
}

/// Validate the model's answer and turn it into a [`SummaryResult`].
///
/// Tolerates prose or code fences around the JSON object. All six keys are
/// required; scores are rounded and clamped into 0-100.
pub fn parse_summary(text: &str) -> Result<SummaryResult, AgentError> {
    let object = find_json_object(text)?;

    for key in REQUIRED_KEYS {
        if object.get(key).map_or(true, Value::is_null) {
            return Err(AgentError::MissingField(key));
        }
    }

    Ok(SummaryResult {
        ultra_short: text_field(&object, "ultraShort")?,
        short: text_field(&object, "short")?,
        medium: text_field(&object, "medium")?,
        detailed: text_field(&object, "detailed")?,
        fluff_percentage: score_field(&object, "fluffPercentage")?,
        novelty_score: score_field(&object, "noveltyScore")?,
    })
}

/// Find the first balanced `{...}` span in `text` that parses as a JSON object.
fn find_json_object(text: &str) -> Result<Map<String, Value>, AgentError> {
    let mut first_error = None;

    for (start, _) in text.match_indices('{') {
        let Some(span) = balanced_object(&text[start..]) else {
            continue;
        };
        match serde_json::from_str::<Value>(span) {
            Ok(Value::Object(object)) => return Ok(object),
            Ok(_) => {}
            Err(e) => {
                first_error.get_or_insert_with(|| AgentError::ParseError(e.to_string()));
            }
        }
    }

    Err(first_error.unwrap_or(AgentError::UnexpectedFormat))
}

/// The prefix of `text` (which starts with `{`) up to its matching `}`.
/// Braces inside JSON strings do not count.
fn balanced_object(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, ch) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&text[..=idx]);
                }
            }
            _ => {}
        }
    }
    None
}

fn text_field(object: &Map<String, Value>, key: &'static str) -> Result<String, AgentError> {
    object[key]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| AgentError::InvalidField {
            field: key,
            reason: "expected a string".to_string(),
        })
}

fn score_field(object: &Map<String, Value>, key: &'static str) -> Result<u8, AgentError> {
    let raw = match &object[key] {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').parse::<f64>().ok(),
        _ => None,
    };
    match raw {
        Some(value) if !value.is_nan() => Ok(clamp_score(value)),
        _ => Err(AgentError::InvalidField {
            field: key,
            reason: format!("expected a number, got {}", object[key]),
        }),
    }
}

/// Round to the nearest integer and clamp into 0-100
pub fn clamp_score(value: f64) -> u8 {
    value.round().clamp(0.0, 100.0) as u8
}

//! Typed request/response contracts between the popup, the orchestrator and the page.

use crate::summary::SummaryResult;
use serde::{Deserialize, Serialize};

/// Sentinel carried by a failed analysis when no API key is available
pub const API_KEY_MISSING: &str = "API_KEY_MISSING";

/// Requests the popup sends to the orchestrator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Request {
    AnalyzePage,
    /// Drop the cached result for the active page, then analyze it
    ReanalyzePage,
    SetApiKey { payload: String },
    GetApiKey,
}

/// Replies from the orchestrator, one per [`Request`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Analysis(AnalysisOutcome),
    Ack {
        success: bool,
    },
    // Last: a missing `apiKey` decodes as None, so this matches any object
    ApiKey {
        #[serde(rename = "apiKey")]
        api_key: Option<String>,
    },
}

/// Result of an analysis, never an exception
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnalysisOutcome {
    Success { data: SummaryResult },
    Failure { error: Failure },
}

/// Why an analysis failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// No API key stored; the popup asks for one
    ApiKeyMissing,
    /// Anything else, shown to the user verbatim
    Message(String),
}

impl Failure {
    pub fn message(&self) -> &str {
        match self {
            Failure::ApiKeyMissing => API_KEY_MISSING,
            Failure::Message(message) => message,
        }
    }
}

impl Serialize for Failure {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.message())
    }
}

impl<'de> Deserialize<'de> for Failure {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let message = String::deserialize(deserializer)?;
        Ok(if message == API_KEY_MISSING {
            Failure::ApiKeyMissing
        } else {
            Failure::Message(message)
        })
    }
}

impl AnalysisOutcome {
    pub fn failure(message: impl Into<String>) -> Self {
        AnalysisOutcome::Failure {
            error: Failure::Message(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AnalysisOutcome::Success { .. })
    }
}

/// Requests the orchestrator sends to the page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PageRequest {
    ExtractText,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageResponse {
    pub text: String,
}

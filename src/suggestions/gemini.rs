//! Gemini API client
//!
//! Calls the non-streaming `generateContent` endpoint of the Google
//! Generative Language API and returns the text of the first candidate.

use std::fmt;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::prompt::{GenerationRequest, SafetySetting};
use super::{ProviderError, SuggestionProvider};

/// Gemini API endpoint
const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

const PROVIDER: &str = "Gemini";
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Gemini API client
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiClient")
            .field("api_key", &"***")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl GeminiClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model,
            base_url: GEMINI_API_URL.to_string(),
        }
    }

    /// Point the client at a different API root
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Returns the stored API key (used in tests)
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Serialize the `generateContent` request body
    ///
    /// The prompt goes in a single user turn; response format, temperature
    /// and safety thresholds go alongside it.
    fn build_request_body(&self, request: &GenerationRequest) -> Result<String, ProviderError> {
        #[derive(Serialize)]
        struct Part<'a> {
            text: &'a str,
        }

        #[derive(Serialize)]
        struct Content<'a> {
            role: &'static str,
            parts: Vec<Part<'a>>,
        }

        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct GenerationConfig {
            response_mime_type: &'static str,
            temperature: f32,
        }

        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct RequestBody<'a> {
            contents: Vec<Content<'a>>,
            generation_config: GenerationConfig,
            safety_settings: &'a [SafetySetting],
        }

        let body = RequestBody {
            contents: vec![Content {
                role: "user",
                parts: vec![Part {
                    text: &request.prompt,
                }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: request.response_mime_type,
                temperature: request.temperature,
            },
            safety_settings: &request.safety_settings,
        };

        serde_json::to_string(&body).map_err(|e| ProviderError::Parse {
            provider: PROVIDER.to_string(),
            message: format!("Failed to serialize request body: {}", e),
        })
    }

    /// `{base_url}/{model}:generateContent`
    ///
    /// The key goes in the `x-goog-api-key` header so it never shows up in
    /// URLs carried by transport errors.
    fn build_url(&self) -> String {
        format!("{}/{}:generateContent", self.base_url, self.model)
    }
}

impl SuggestionProvider for GeminiClient {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, ProviderError> {
        let body = self.build_request_body(request)?;

        let response = self
            .client
            .post(self.build_url())
            .header("Content-Type", "application/json")
            .header(API_KEY_HEADER, &self.api_key)
            .body(body)
            .send()
            .await
            .map_err(|e| ProviderError::Network {
                provider: PROVIDER.to_string(),
                message: e.without_url().to_string(),
            })?;

        if !response.status().is_success() {
            let code = response.status().as_u16();
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ProviderError::Api {
                provider: PROVIDER.to_string(),
                code,
                message,
            });
        }

        let parsed: GenerateResponse = response.json().await.map_err(|e| ProviderError::Parse {
            provider: PROVIDER.to_string(),
            message: e.without_url().to_string(),
        })?;
        extract_text(parsed)
    }
}

/// Concatenated text of the first candidate
fn extract_text(response: GenerateResponse) -> Result<String, ProviderError> {
    let blocked = |reason: String| ProviderError::Blocked {
        provider: PROVIDER.to_string(),
        reason,
    };
    let parse_error = |message: &str| ProviderError::Parse {
        provider: PROVIDER.to_string(),
        message: message.to_string(),
    };

    let Some(candidate) = response.candidates.into_iter().next() else {
        return match response.prompt_feedback.and_then(|f| f.block_reason) {
            Some(reason) => Err(blocked(reason)),
            None => Err(parse_error("response contained no candidates")),
        };
    };

    let text: String = candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return match candidate.finish_reason.as_deref() {
            Some("SAFETY") => Err(blocked("SAFETY".to_string())),
            _ => Err(parse_error("response contained no text")),
        };
    }
    Ok(text)
}

#[cfg(test)]
#[path = "gemini_tests.rs"]
mod gemini_tests;

//! Dish suggestions
//!
//! Asks a generative model for three traditional dishes for a country and
//! meal type, validates the answer, and caches it per normalized pair for the
//! life of the process.

pub mod cache;
pub mod gemini;
pub mod prompt;
pub mod types;

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;

pub use cache::{CacheKey, SuggestionCache};
pub use gemini::GeminiClient;
pub use prompt::{DEFAULT_TEMPERATURE, GenerationRequest};
pub use types::{DishSuggestion, ShapeError, SuggestionSet, parse_suggestion_set};

/// Failures talking to a generative model
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Request never got a response
    #[error("[{provider}] Network error: {message}")]
    Network { provider: String, message: String },

    /// Non-success HTTP status
    #[error("[{provider}] API error ({code}): {message}")]
    Api {
        provider: String,
        code: u16,
        message: String,
    },

    /// Response body could not be understood
    #[error("[{provider}] Parse error: {message}")]
    Parse { provider: String, message: String },

    /// The model refused to answer
    #[error("[{provider}] Response blocked: {reason}")]
    Blocked { provider: String, reason: String },
}

/// Why a suggestion fetch produced nothing
#[derive(Debug, Error)]
pub enum SuggestionError {
    #[error(transparent)]
    ProviderCall(#[from] ProviderError),

    #[error("Invalid suggestion response: {0}")]
    ResponseShape(#[from] ShapeError),
}

/// A generative model that turns a request into raw response text
pub trait SuggestionProvider: Send + Sync {
    /// Provider name for log messages
    fn name(&self) -> &'static str;

    fn generate(
        &self,
        request: &GenerationRequest,
    ) -> impl Future<Output = Result<String, ProviderError>> + Send;
}

/// Cached dish suggestions backed by a provider
#[derive(Debug)]
pub struct SuggestionService<P> {
    provider: P,
    cache: SuggestionCache,
    temperature: f32,
}

impl<P: SuggestionProvider> SuggestionService<P> {
    pub fn new(provider: P, cache: SuggestionCache) -> Self {
        Self {
            provider,
            cache,
            temperature: DEFAULT_TEMPERATURE,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn cache(&self) -> &SuggestionCache {
        &self.cache
    }

    /// Suggestions for `country` and `meal_type`, or `None` on failure
    ///
    /// The pair is lowercased for caching, while the provider sees
    /// the caller's original spelling. Failures are logged and never cached;
    /// concurrent calls for the same pair share one provider request.
    pub async fn fetch_suggestions(
        &self,
        country: &str,
        meal_type: &str,
    ) -> Option<Arc<SuggestionSet>> {
        let key = CacheKey::new(country, meal_type);

        self.cache
            .get_or_fetch(&key, || async {
                match self.request_suggestions(country, meal_type).await {
                    Ok(set) => Some(set),
                    Err(e) => {
                        log::error!(
                            "Error fetching suggestions from {} for {}: {}",
                            self.provider.name(),
                            key,
                            e
                        );
                        None
                    }
                }
            })
            .await
    }

    async fn request_suggestions(
        &self,
        country: &str,
        meal_type: &str,
    ) -> Result<SuggestionSet, SuggestionError> {
        let request = GenerationRequest::dish_suggestions(country, meal_type, self.temperature);
        let text = self.provider.generate(&request).await?;
        Ok(parse_suggestion_set(&text)?)
    }
}

#[cfg(test)]
#[path = "suggestions_tests.rs"]
mod suggestions_tests;

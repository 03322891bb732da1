//! Composition root
//!
//! Builds the single gateway, preference store, provider and suggestion
//! cache from validated settings and holds them for the process lifetime.

use std::sync::Arc;

use futures::future::join_all;

use crate::chain::RpcGateway;
use crate::config::{Config, Settings};
use crate::error::AppError;
use crate::preferences::PreferenceStore;
use crate::suggestions::{GeminiClient, SuggestionCache, SuggestionService, SuggestionSet};

/// Suggestions for one meal type; `None` if the fetch failed
#[derive(Debug, Clone)]
pub struct MealSuggestions {
    pub meal_type: String,
    pub suggestions: Option<Arc<SuggestionSet>>,
}

/// Application services
pub struct App<G = RpcGateway, P = GeminiClient> {
    preferences: PreferenceStore<G>,
    suggestions: SuggestionService<P>,
}

impl App {
    pub fn new(settings: Settings) -> Self {
        log::info!(
            "Using contract {} on chain {} as {}",
            settings.contract.address,
            settings.gateway.chain_id,
            settings.signer.address()
        );

        let gateway = RpcGateway::new(settings.gateway, settings.contract, settings.signer);
        let provider = GeminiClient::new(
            settings.gemini_api_key.expose().to_string(),
            settings.gemini_model,
        );
        let cache = SuggestionCache::with_capacity(settings.cache_capacity);

        Self::with_parts(
            PreferenceStore::new(gateway),
            SuggestionService::new(provider, cache).with_temperature(settings.temperature),
        )
    }

    /// Validate `config` and build the application from it
    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        Ok(Self::new(config.validate()?))
    }
}

impl<G, P> App<G, P>
where
    G: crate::chain::ChainGateway,
    P: crate::suggestions::SuggestionProvider,
{
    pub fn with_parts(preferences: PreferenceStore<G>, suggestions: SuggestionService<P>) -> Self {
        Self {
            preferences,
            suggestions,
        }
    }

    pub fn preferences(&self) -> &PreferenceStore<G> {
        &self.preferences
    }

    pub fn suggestions(&self) -> &SuggestionService<P> {
        &self.suggestions
    }

    /// Fetch suggestions for several meal types of one country concurrently
    ///
    /// Results come back in the order of `meal_types`.
    pub async fn suggest_meals(&self, country: &str, meal_types: &[String]) -> Vec<MealSuggestions> {
        let fetches = meal_types
            .iter()
            .map(|meal_type| self.suggestions.fetch_suggestions(country, meal_type));

        join_all(fetches)
            .await
            .into_iter()
            .zip(meal_types)
            .map(|(suggestions, meal_type)| MealSuggestions {
                meal_type: meal_type.clone(),
                suggestions,
            })
            .collect()
    }
}

//! Generation request construction
//!
//! Builds the deterministic instruction for a country/meal pair together with
//! the response format and safety configuration sent to the model.

use serde::Serialize;

use super::types::SUGGESTION_COUNT;

/// Default sampling temperature
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Response format requested from the model
pub const JSON_MIME_TYPE: &str = "application/json";

/// Content category a safety threshold applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HarmCategory {
    #[serde(rename = "HARM_CATEGORY_HARASSMENT")]
    Harassment,
    #[serde(rename = "HARM_CATEGORY_HATE_SPEECH")]
    HateSpeech,
}

/// Probability at which content gets blocked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HarmBlockThreshold {
    #[serde(rename = "BLOCK_MEDIUM_AND_ABOVE")]
    BlockMediumAndAbove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SafetySetting {
    pub category: HarmCategory,
    pub threshold: HarmBlockThreshold,
}

/// Everything a provider needs to produce one suggestion set
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub response_mime_type: &'static str,
    pub temperature: f32,
    pub safety_settings: Vec<SafetySetting>,
}

impl GenerationRequest {
    /// Request for traditional dishes of `country` suitable for `meal_type`
    pub fn dish_suggestions(country: &str, meal_type: &str, temperature: f32) -> Self {
        Self {
            prompt: build_prompt(country, meal_type),
            response_mime_type: JSON_MIME_TYPE,
            temperature,
            safety_settings: vec![
                SafetySetting {
                    category: HarmCategory::Harassment,
                    threshold: HarmBlockThreshold::BlockMediumAndAbove,
                },
                SafetySetting {
                    category: HarmCategory::HateSpeech,
                    threshold: HarmBlockThreshold::BlockMediumAndAbove,
                },
            ],
        }
    }
}

/// Build the instruction text
///
/// Output depends only on the arguments as the caller spelled them. Case
/// variants share one cache entry but not one prompt; the first request for a
/// key decides which prompt fills it.
pub fn build_prompt(country: &str, meal_type: &str) -> String {
    let mut prompt = String::new();

    prompt.push_str("You are an expert culinary guide.\n");
    prompt.push_str(&format!(
        "Suggest exactly {} traditional dishes for the country and meal type below.\n\n",
        SUGGESTION_COUNT
    ));

    prompt.push_str("## Output Rules\n");
    prompt.push_str("- Respond with a single valid JSON object and nothing else.\n");
    prompt.push_str("- The root object has exactly one key: \"suggestions\".\n");
    prompt.push_str(&format!(
        "- \"suggestions\" is an array of exactly {} dish objects.\n",
        SUGGESTION_COUNT
    ));
    prompt.push_str("- Each dish object has these keys:\n");
    prompt.push_str("  - \"dishName\" (string)\n");
    prompt.push_str("  - \"preparationTime\" (string, e.g. \"Approx. 45 minutes\")\n");
    prompt.push_str("  - \"keyIngredients\" (array of strings)\n");
    prompt.push_str(
        "  - \"youtubeSearchQuery\" (string, a short query that finds a recipe video on YouTube)\n\n",
    );

    prompt.push_str(&format!("Country: {}\n", country));
    prompt.push_str(&format!("Meal Type: {}\n", meal_type));

    prompt
}

#[cfg(test)]
#[path = "prompt_tests.rs"]
mod prompt_tests;

//! Dish suggestion types and response validation
//!
//! The model is asked for a JSON object of the form:
//! ```text
//! {
//!   "suggestions": [
//!     {
//!       "dishName": "Risotto alla Milanese",
//!       "preparationTime": "Approx. 40 minutes",
//!       "keyIngredients": ["arborio rice", "saffron", "parmesan"],
//!       "youtubeSearchQuery": "risotto alla milanese recipe"
//!     },
//!     ...
//!   ]
//! }
//! ```
//! A set is only valid with exactly [`SUGGESTION_COUNT`] entries.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of dishes every valid set contains
pub const SUGGESTION_COUNT: usize = 3;

/// A single suggested dish
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DishSuggestion {
    pub dish_name: String,
    /// Free-form duration, e.g. "Approx. 45 minutes"
    pub preparation_time: String,
    pub key_ingredients: Vec<String>,
    /// Query for finding a recipe video
    pub youtube_search_query: String,
}

/// Exactly [`SUGGESTION_COUNT`] dish suggestions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawSuggestionSet")]
pub struct SuggestionSet {
    suggestions: Vec<DishSuggestion>,
}

#[derive(Debug, Deserialize)]
struct RawSuggestionSet {
    suggestions: Vec<DishSuggestion>,
}

/// Why a model response was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeError {
    #[error("response is not valid suggestion JSON: {0}")]
    Json(String),

    #[error("expected exactly {expected} suggestions, got {got}")]
    WrongCount { expected: usize, got: usize },
}

impl SuggestionSet {
    pub fn new(suggestions: Vec<DishSuggestion>) -> Result<Self, ShapeError> {
        if suggestions.len() != SUGGESTION_COUNT {
            return Err(ShapeError::WrongCount {
                expected: SUGGESTION_COUNT,
                got: suggestions.len(),
            });
        }
        Ok(Self { suggestions })
    }

    pub fn suggestions(&self) -> &[DishSuggestion] {
        &self.suggestions
    }
}

impl TryFrom<RawSuggestionSet> for SuggestionSet {
    type Error = ShapeError;

    fn try_from(raw: RawSuggestionSet) -> Result<Self, Self::Error> {
        SuggestionSet::new(raw.suggestions)
    }
}

/// Parse and validate raw model text
///
/// Every dish must carry all four fields; unknown fields are ignored.
pub fn parse_suggestion_set(text: &str) -> Result<SuggestionSet, ShapeError> {
    let raw: RawSuggestionSet =
        serde_json::from_str(text.trim()).map_err(|e| ShapeError::Json(e.to_string()))?;
    SuggestionSet::try_from(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_helpers::suggestions_json;

    #[test]
    fn test_parse_valid_response() {
        let set = parse_suggestion_set(&suggestions_json(3)).unwrap();

        assert_eq!(set.suggestions().len(), 3);
        assert_eq!(set.suggestions()[0].dish_name, "Dish 1");
        assert_eq!(set.suggestions()[2].key_ingredients, vec!["salt", "water"]);
    }

    #[test]
    fn test_parse_rejects_wrong_counts() {
        for count in [0, 2, 4] {
            assert_eq!(
                parse_suggestion_set(&suggestions_json(count)),
                Err(ShapeError::WrongCount {
                    expected: 3,
                    got: count
                })
            );
        }
    }

    #[test]
    fn test_parse_rejects_malformed_json() {
        assert!(matches!(
            parse_suggestion_set("{\"suggestions\": [ {\"dishName\": "),
            Err(ShapeError::Json(_))
        ));
        assert!(matches!(
            parse_suggestion_set("Here are three dishes!"),
            Err(ShapeError::Json(_))
        ));
    }

    #[test]
    fn test_parse_rejects_missing_fields() {
        let text = r#"{"suggestions": [
            {"dishName": "A", "preparationTime": "1h", "keyIngredients": [], "youtubeSearchQuery": "a"},
            {"dishName": "B", "preparationTime": "1h", "keyIngredients": []},
            {"dishName": "C", "preparationTime": "1h", "keyIngredients": [], "youtubeSearchQuery": "c"}
        ]}"#;
        assert!(matches!(
            parse_suggestion_set(text),
            Err(ShapeError::Json(msg)) if msg.contains("youtubeSearchQuery")
        ));
    }

    #[test]
    fn test_parse_rejects_missing_suggestions_key() {
        assert!(matches!(
            parse_suggestion_set(r#"{"dishes": []}"#),
            Err(ShapeError::Json(_))
        ));
    }

    #[test]
    fn test_parse_tolerates_whitespace_and_extra_fields() {
        let text = format!(
            "\n  {}  \n",
            suggestions_json(3).replacen("{\"suggestions\"", "{\"cuisine\": \"x\", \"suggestions\"", 1)
        );
        assert!(parse_suggestion_set(&text).is_ok());
    }

    #[test]
    fn test_deserialize_enforces_count() {
        let result: Result<SuggestionSet, _> = serde_json::from_str(&suggestions_json(2));
        assert!(result.is_err());
    }

    #[test]
    fn test_serializes_camel_case() {
        let set = parse_suggestion_set(&suggestions_json(3)).unwrap();
        let value = serde_json::to_value(&set).unwrap();
        assert!(value["suggestions"][0]["dishName"].is_string());
        assert!(value["suggestions"][0]["youtubeSearchQuery"].is_string());
    }
}

//! plateprefs library - On-chain food preferences and AI dish suggestions
//!
//! Preferences per fid live in a smart contract reached through a
//! [`chain::ChainGateway`]; dish suggestions come from a generative model and
//! are cached per normalized country and meal type.

pub mod app;
pub mod chain;
pub mod config;
pub mod error;
pub mod preferences;
pub mod suggestions;

#[cfg(test)]
pub mod test_utils;

// Re-export commonly used types for convenience
pub use app::{App, MealSuggestions};
pub use config::Config;
pub use error::AppError;
pub use preferences::{PreferenceError, PreferenceRecord, PreferenceStore, PreferenceUpdate, WatchHandle};
pub use suggestions::{DishSuggestion, SuggestionService, SuggestionSet};

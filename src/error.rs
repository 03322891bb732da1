use thiserror::Error;

use crate::config::ConfigError;
use crate::preferences::PreferenceError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Preferences(#[from] PreferenceError),

    #[error("No suggestions available for {country} ({meal_type})")]
    NoSuggestions { country: String, meal_type: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

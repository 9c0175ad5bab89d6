//! Application configuration options

use crate::forge::cli::WebTriggerOptions;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Deployment environment label (development, staging, production, ...)
    pub environment: String,

    /// Print intended actions without deploying or calling any API
    pub dry_run: bool,

    /// Web trigger lookup behavior
    pub webtrigger: WebTriggerOptions,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            dry_run: false,
            webtrigger: WebTriggerOptions::default(),
        }
    }
}

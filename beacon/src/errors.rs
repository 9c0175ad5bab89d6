//! Error types for the beacon notifier

use thiserror::Error;

/// Main error type for the beacon notifier
#[derive(Error, Debug)]
pub enum BeaconError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Discovery error: {0}")]
    Discovery(String),

    #[error("Verification failed: {0}")]
    Verification(String),

    #[error("Event source setup failed for installation(s): {0}")]
    NotifySetup(String),

    #[error("Notification delivery failed for installation(s): {0}")]
    NotifySend(String),

    #[error("Deploy error: {0}")]
    Deploy(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("GraphQL error: {0}")]
    Graphql(String),
}

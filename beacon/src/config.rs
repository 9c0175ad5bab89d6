//! Credential configuration

use secrecy::{ExposeSecret, SecretString};

use crate::errors::BeaconError;

/// Environment variable holding the Atlassian account email
pub const EMAIL_ENV_VAR: &str = "ATLASSIAN_USER_EMAIL";

/// Environment variable holding the Atlassian API token
pub const API_KEY_ENV_VAR: &str = "ATLASSIAN_USER_API_KEY";

/// Credentials for all outbound Compass calls
///
/// Constructed once at startup and passed to every component that issues
/// network requests; the token never appears in logs.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    api_token: SecretString,
}

impl Credentials {
    pub fn new(email: String, api_token: String) -> Self {
        Self {
            email,
            api_token: SecretString::from(api_token),
        }
    }

    /// Load credentials from the environment
    ///
    /// Absence of either variable is a fatal configuration error before
    /// any deployment phase begins.
    pub fn from_env() -> Result<Self, BeaconError> {
        let email = std::env::var(EMAIL_ENV_VAR).ok().filter(|v| !v.is_empty());
        let api_token = std::env::var(API_KEY_ENV_VAR).ok().filter(|v| !v.is_empty());

        match (email, api_token) {
            (Some(email), Some(api_token)) => Ok(Self::new(email, api_token)),
            (email, api_token) => {
                let mut missing = Vec::new();
                if email.is_none() {
                    missing.push(EMAIL_ENV_VAR);
                }
                if api_token.is_none() {
                    missing.push(API_KEY_ENV_VAR);
                }
                Err(BeaconError::Config(format!(
                    "Missing required environment variable(s): {}. \
                     Set your Atlassian account email and API token before deploying.",
                    missing.join(", ")
                )))
            }
        }
    }

    /// Expose the API token for request authentication
    pub fn api_token(&self) -> &str {
        self.api_token.expose_secret()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_not_in_debug_output() {
        let credentials = Credentials::new("dev@example.com".to_string(), "top-secret".to_string());
        let debug = format!("{:?}", credentials);

        assert!(debug.contains("dev@example.com"));
        assert!(!debug.contains("top-secret"));
    }

    #[test]
    fn test_api_token_exposed_on_request() {
        let credentials = Credentials::new("dev@example.com".to_string(), "token-123".to_string());
        assert_eq!(credentials.api_token(), "token-123");
    }
}

//! Forge CLI collaborator interface

use async_trait::async_trait;

use crate::errors::BeaconError;
use crate::models::run::DiscoveredInstallation;

pub mod cli;

pub use cli::ForgeCli;

/// Identity of the logged-in Forge user
#[derive(Debug, Clone)]
pub struct ForgeUser {
    /// Raw identity line, e.g. `Dana Deploy (dana@example.com)`
    pub user: String,

    /// Atlassian account id
    pub account_id: String,
}

impl ForgeUser {
    /// Prefer the display name over the email for operator-facing lines
    pub fn preferred_name(&self) -> String {
        if let Some((name, rest)) = self.user.split_once('(') {
            let name = name.trim();
            if !name.is_empty() {
                return name.to_string();
            }
            if let Some(email) = rest.split(')').next() {
                let email = email.trim();
                if !email.is_empty() {
                    return email.to_string();
                }
            }
        }
        self.user.clone()
    }
}

/// Local Forge CLI operations the pipeline depends on
///
/// A trait seam so the orchestrator is testable without subprocesses.
#[async_trait]
pub trait ForgeDriver: Send + Sync {
    /// Discover installations of the app, with resolved cloud ids
    ///
    /// Discovery problems yield an empty list, never an error; a
    /// deployment must not be blocked by absent monitoring.
    async fn list_installations(&self) -> Result<Vec<DiscoveredInstallation>, BeaconError>;

    /// Identity of the logged-in user
    async fn whoami(&self) -> Result<ForgeUser, BeaconError>;

    /// Run the deployment, returning the deployed version when it can be
    /// extracted from the output
    async fn deploy(&self, environment: &str) -> Result<Option<String>, BeaconError>;

    /// Locate a web trigger URL for a site, retrying while the trigger
    /// propagates after a deploy; None when it never appears
    async fn webtrigger_url(
        &self,
        trigger_key: &str,
        site_url: &str,
        environment: &str,
    ) -> Result<Option<String>, BeaconError>;
}

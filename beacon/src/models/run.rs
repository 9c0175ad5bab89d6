//! Deployment run and installation models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::notify::sequence::RunSequence;

/// Environment category recognized by the tracking service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnvironmentCategory {
    Production,
    Staging,
    Testing,
    Development,
    Unmapped,
}

impl EnvironmentCategory {
    /// Map a free-text environment label to a category
    ///
    /// Unrecognized labels map to `Unmapped` rather than failing.
    pub fn from_label(label: &str) -> Self {
        match label.to_uppercase().as_str() {
            "PRODUCTION" => EnvironmentCategory::Production,
            "STAGING" => EnvironmentCategory::Staging,
            "TESTING" => EnvironmentCategory::Testing,
            "DEVELOPMENT" => EnvironmentCategory::Development,
            _ => EnvironmentCategory::Unmapped,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EnvironmentCategory::Production => "PRODUCTION",
            EnvironmentCategory::Staging => "STAGING",
            EnvironmentCategory::Testing => "TESTING",
            EnvironmentCategory::Development => "DEVELOPMENT",
            EnvironmentCategory::Unmapped => "UNMAPPED",
        }
    }
}

impl std::fmt::Display for EnvironmentCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One invocation of the deployment pipeline
///
/// Created once at process start and threaded through the pipeline;
/// `deployed_version` and `schema_version` are filled in as the matching
/// phases complete. Never persisted.
#[derive(Debug, Clone)]
pub struct DeploymentRun {
    /// Idempotency anchor for every event of this run
    pub sequence: RunSequence,

    /// When the run started; fixed for the lifetime of the run
    pub started_at: DateTime<Utc>,

    /// Environment label as given by the operator
    pub environment_label: String,

    /// Category the label maps to
    pub environment_category: EnvironmentCategory,

    /// Component slug the events are for
    pub component_slug: String,

    /// Short commit hash of the deployed tree
    pub commit: String,

    /// Deployment link used at both the event and pipeline level
    pub deployment_url: String,

    /// Version reported by the deploy step, once known
    pub deployed_version: Option<String>,

    /// Schema version reported by the migration step, once known
    pub schema_version: Option<String>,
}

impl DeploymentRun {
    pub fn run_id(&self) -> &str {
        self.sequence.run_id()
    }

    pub fn run_sequence_number(&self) -> i64 {
        self.sequence.run_sequence_number()
    }
}

/// Installation reported by discovery, before verification
#[derive(Debug, Clone)]
pub struct DiscoveredInstallation {
    /// Site URL of the installation
    pub site_url: String,

    /// Tenant cloud id resolved for the site
    pub cloud_id: String,

    /// Forge environment the app is installed into
    pub environment: String,
}

/// Installation verified to host the target component
///
/// The component id only exists on this type: holding a
/// `VerifiedInstallation` means verification resolved it.
#[derive(Debug, Clone)]
pub struct VerifiedInstallation {
    pub site_url: String,
    pub cloud_id: String,
    pub component_id: String,
    pub environment: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_category_mapping() {
        assert_eq!(EnvironmentCategory::from_label("production"), EnvironmentCategory::Production);
        assert_eq!(EnvironmentCategory::from_label("Staging"), EnvironmentCategory::Staging);
        assert_eq!(EnvironmentCategory::from_label("TESTING"), EnvironmentCategory::Testing);
        assert_eq!(EnvironmentCategory::from_label("development"), EnvironmentCategory::Development);
        assert_eq!(EnvironmentCategory::from_label("qa"), EnvironmentCategory::Unmapped);
    }
}

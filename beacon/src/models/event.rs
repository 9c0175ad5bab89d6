//! Deployment event wire format
//!
//! Payload structure of the Compass events API. The service treats a
//! submission as an update of an existing timeline entry when the event
//! source, pipeline id, environment, and `deploymentProperties.sequenceNumber`
//! all match and the event-level `updateSequenceNumber` is higher.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::run::EnvironmentCategory;

/// Deployment state reported to the tracking service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeploymentState {
    InProgress,
    Successful,
    Failed,
    Cancelled,
}

impl DeploymentState {
    /// Terminal states carry a completion timestamp
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DeploymentState::InProgress)
    }
}

impl std::fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DeploymentState::InProgress => "IN_PROGRESS",
            DeploymentState::Successful => "SUCCESSFUL",
            DeploymentState::Failed => "FAILED",
            DeploymentState::Cancelled => "CANCELLED",
        };
        write!(f, "{}", s)
    }
}

/// Top-level event submission envelope
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    /// Tenant the event is addressed to
    pub cloud_id: String,

    /// Component the event is associated with
    pub component_id: String,

    pub event: EventBody,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventBody {
    pub deployment: DeploymentEvent,
}

/// Event-level deployment fields
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentEvent {
    /// Must strictly increase across updates of the same timeline entry,
    /// otherwise the service ignores the submission as stale
    pub update_sequence_number: i64,

    pub display_name: String,

    /// Human summary, at most 255 characters
    pub description: String,

    pub url: String,

    pub last_updated: DateTime<Utc>,

    /// Identifier of the event source the submission originates from
    pub external_event_source_id: String,

    pub deployment_properties: DeploymentProperties,
}

/// Deployment-specific event properties
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentProperties {
    /// Constant across every state of one deployment run
    pub sequence_number: i64,

    pub state: DeploymentState,

    pub pipeline: PipelineReference,

    pub environment: EnvironmentReference,

    pub started_at: DateTime<Utc>,

    /// Present only for terminal states
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Pipeline the deployment belongs to; links events into one timeline entry
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineReference {
    pub pipeline_id: String,
    pub url: String,
    pub display_name: String,
}

/// Environment the deployment targets
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentReference {
    pub display_name: String,
    pub environment_id: String,
    pub category: EnvironmentCategory,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_serializes_screaming_snake() {
        assert_eq!(serde_json::to_string(&DeploymentState::InProgress).unwrap(), "\"IN_PROGRESS\"");
        assert_eq!(serde_json::to_string(&DeploymentState::Successful).unwrap(), "\"SUCCESSFUL\"");
    }

    #[test]
    fn test_terminal_states() {
        assert!(!DeploymentState::InProgress.is_terminal());
        assert!(DeploymentState::Successful.is_terminal());
        assert!(DeploymentState::Failed.is_terminal());
        assert!(DeploymentState::Cancelled.is_terminal());
    }
}

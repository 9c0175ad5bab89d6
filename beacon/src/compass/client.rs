//! Compass HTTP client
//!
//! Production implementation of [`CompassApi`]: deployment events go to
//! the Compass events REST endpoint, component lookup and event source
//! provisioning go through the site's GraphQL gateway.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, error, warn};

use crate::compass::{CompassApi, SubmitOutcome, TriggerResponse};
use crate::config::{Credentials, API_KEY_ENV_VAR, EMAIL_ENV_VAR};
use crate::errors::BeaconError;
use crate::models::event::EventEnvelope;
use crate::utils::clean_site_url;

/// Compass events REST endpoint
pub const EVENTS_API_URL: &str = "https://api.atlassian.com/compass/v1/events";

/// Error type the events API returns when the event source is missing
const EVENT_SOURCE_NOT_FOUND: &str = "CREATE_EVENT_SOURCE_NOT_FOUND";

const COMPONENTS_BY_REFERENCES_QUERY: &str = "
query getComponentsByReferences($references: [ComponentReferenceInput!]!) {
  compass {
    componentsByReferences(references: $references) {
      __typename
      ... on CompassComponent {
        id
        name
        typeId
        slug
      }
    }
  }
}
";

const CREATE_EVENT_SOURCE_MUTATION: &str = "
mutation createEventSource($input: CreateEventSourceInput!) {
  compass {
    createEventSource(input: $input) {
      success
      eventSource {
        id
      }
      errors {
        message
      }
    }
  }
}
";

const ATTACH_EVENT_SOURCE_MUTATION: &str = "
mutation attachEventSource($input: AttachEventSourceInput!) {
  compass {
    attachEventSource(input: $input) {
      success
      errors {
        message
      }
    }
  }
}
";

/// HTTP client for the Compass tracking service
pub struct CompassClient {
    client: Client,
    credentials: Credentials,
    events_url: String,
}

impl CompassClient {
    /// Create a new client with the standard request timeout
    pub fn new(credentials: Credentials) -> Result<Self, BeaconError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            credentials,
            events_url: EVENTS_API_URL.to_string(),
        })
    }

    /// Override the events endpoint (staging or test targets)
    pub fn with_events_url(mut self, events_url: &str) -> Self {
        self.events_url = events_url.to_string();
        self
    }

    /// Make an authenticated GraphQL request to a site's gateway
    async fn graphql(
        &self,
        site_url: &str,
        query: &str,
        variables: Value,
    ) -> Result<Value, BeaconError> {
        let endpoint = format!("https://{}/gateway/api/graphql", clean_site_url(site_url));
        debug!("POST {} (graphql)", endpoint);

        let payload = json!({ "query": query, "variables": variables });
        let response = self
            .client
            .post(&endpoint)
            .basic_auth(&self.credentials.email, Some(self.credentials.api_token()))
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status == StatusCode::UNAUTHORIZED {
                error!(
                    "Authentication failed (401) for {}. Check {} and {}.",
                    endpoint, EMAIL_ENV_VAR, API_KEY_ENV_VAR
                );
            } else {
                error!("GraphQL request to {} failed: {} - {}", endpoint, status, body);
            }
            return Err(BeaconError::Graphql(format!("{}: {}", status, body)));
        }

        let body = response.json().await?;
        Ok(body)
    }
}

#[async_trait]
impl CompassApi for CompassClient {
    async fn submit_event(&self, envelope: &EventEnvelope) -> Result<SubmitOutcome, BeaconError> {
        debug!("POST {} (deployment event)", self.events_url);

        let response = self
            .client
            .post(&self.events_url)
            .basic_auth(&self.credentials.email, Some(self.credentials.api_token()))
            .json(envelope)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(SubmitOutcome::Accepted);
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::NOT_FOUND && is_source_not_found(&body) {
            return Ok(SubmitOutcome::SourceNotFound);
        }

        error!("Event submission failed: {} - {}", status, body);
        Ok(SubmitOutcome::Rejected {
            status: status.as_u16(),
            body,
        })
    }

    async fn lookup_component(
        &self,
        site_url: &str,
        cloud_id: &str,
        slug: &str,
    ) -> Result<Option<String>, BeaconError> {
        let variables = json!({
            "references": [
                { "slug": { "slug": slug, "cloudId": cloud_id } }
            ]
        });

        let data = self
            .graphql(site_url, COMPONENTS_BY_REFERENCES_QUERY, variables)
            .await?;

        let components = data
            .pointer("/data/compass/componentsByReferences")
            .and_then(Value::as_array);

        let Some(component) = components.and_then(|c| c.first()) else {
            return Ok(None);
        };

        if component.get("__typename").and_then(Value::as_str) != Some("CompassComponent") {
            warn!(
                "Component query returned unexpected type: {:?}",
                component.get("__typename")
            );
            return Ok(None);
        }

        Ok(component
            .get("id")
            .and_then(Value::as_str)
            .map(String::from))
    }

    async fn create_event_source(
        &self,
        site_url: &str,
        cloud_id: &str,
        external_source_id: &str,
    ) -> Result<String, BeaconError> {
        let variables = json!({
            "input": {
                "cloudId": cloud_id,
                "eventType": "DEPLOYMENT",
                "externalEventSourceId": external_source_id,
            }
        });

        let data = self
            .graphql(site_url, CREATE_EVENT_SOURCE_MUTATION, variables)
            .await?;

        let result = data
            .pointer("/data/compass/createEventSource")
            .cloned()
            .unwrap_or(Value::Null);

        if let Some(messages) = mutation_errors(&result) {
            return Err(BeaconError::Graphql(format!(
                "createEventSource failed: {}",
                messages
            )));
        }

        result
            .pointer("/eventSource/id")
            .and_then(Value::as_str)
            .filter(|_| result.get("success").and_then(Value::as_bool) == Some(true))
            .map(String::from)
            .ok_or_else(|| BeaconError::Graphql("createEventSource returned no event source".to_string()))
    }

    async fn attach_event_source(
        &self,
        site_url: &str,
        event_source_id: &str,
        component_id: &str,
    ) -> Result<(), BeaconError> {
        let variables = json!({
            "input": {
                "eventSourceId": event_source_id,
                "componentId": component_id,
            }
        });

        let data = self
            .graphql(site_url, ATTACH_EVENT_SOURCE_MUTATION, variables)
            .await?;

        let result = data
            .pointer("/data/compass/attachEventSource")
            .cloned()
            .unwrap_or(Value::Null);

        if let Some(messages) = mutation_errors(&result) {
            return Err(BeaconError::Graphql(format!(
                "attachEventSource failed: {}",
                messages
            )));
        }

        if result.get("success").and_then(Value::as_bool) != Some(true) {
            return Err(BeaconError::Graphql(
                "attachEventSource did not report success".to_string(),
            ));
        }

        Ok(())
    }

    async fn trigger_migration(&self, trigger_url: &str) -> Result<TriggerResponse, BeaconError> {
        debug!("POST {} (migration trigger)", trigger_url);

        let response = self
            .client
            .post(trigger_url)
            .json(&json!({}))
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();

        Ok(TriggerResponse { status, body })
    }
}

/// Extract joined error messages from a GraphQL mutation result, if any
fn mutation_errors(result: &Value) -> Option<String> {
    let errors = result.get("errors").and_then(Value::as_array)?;
    if errors.is_empty() {
        return None;
    }
    Some(
        errors
            .iter()
            .filter_map(|e| e.get("message").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("; "),
    )
}

/// Whether an error body carries the missing-event-source signal
fn is_source_not_found(body: &str) -> bool {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return false;
    };
    value
        .get("errors")
        .and_then(Value::as_array)
        .map(|errors| {
            errors
                .iter()
                .any(|e| e.get("type").and_then(Value::as_str) == Some(EVENT_SOURCE_NOT_FOUND))
        })
        .unwrap_or(false)
}

//! Compass API capability interface

use async_trait::async_trait;

use crate::errors::BeaconError;
use crate::models::event::EventEnvelope;

pub mod client;

pub use client::CompassClient;

/// Outcome of one event submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Accepted by the events API
    Accepted,

    /// The event source for this origin does not exist yet; the caller
    /// may provision one and resubmit
    SourceNotFound,

    /// Rejected with any other status
    Rejected { status: u16, body: String },
}

/// Raw response from a migration web trigger
#[derive(Debug, Clone)]
pub struct TriggerResponse {
    pub status: u16,
    pub body: String,
}

/// Remote operations against the Compass tracking service
///
/// The dispatcher and orchestrator only ever talk to this trait, so they
/// are testable without network access.
#[async_trait]
pub trait CompassApi: Send + Sync {
    /// Submit a deployment event
    async fn submit_event(&self, envelope: &EventEnvelope) -> Result<SubmitOutcome, BeaconError>;

    /// Resolve a component slug to its component id; absence is not an error
    async fn lookup_component(
        &self,
        site_url: &str,
        cloud_id: &str,
        slug: &str,
    ) -> Result<Option<String>, BeaconError>;

    /// Create a deployment event source, returning its id
    async fn create_event_source(
        &self,
        site_url: &str,
        cloud_id: &str,
        external_source_id: &str,
    ) -> Result<String, BeaconError>;

    /// Attach an event source to a component
    async fn attach_event_source(
        &self,
        site_url: &str,
        event_source_id: &str,
        component_id: &str,
    ) -> Result<(), BeaconError>;

    /// POST to a migration web trigger and return the raw response
    async fn trigger_migration(&self, trigger_url: &str) -> Result<TriggerResponse, BeaconError>;
}

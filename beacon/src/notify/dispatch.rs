//! Notification dispatch
//!
//! Sends deployment events to installations one at a time. The initial
//! IN_PROGRESS phase is all-or-nothing: if any installation cannot be
//! notified, every installation that already accepted IN_PROGRESS gets a
//! best-effort FAILED event so the remote timeline never shows a run
//! stuck in progress, and the run aborts. Terminal phases are
//! best-effort, collecting per-installation failures into a summary.

use chrono::Utc;
use tracing::{error, info, warn};

use crate::compass::{CompassApi, SubmitOutcome};
use crate::errors::BeaconError;
use crate::models::event::{DeploymentState, EventEnvelope};
use crate::models::run::{DeploymentRun, VerifiedInstallation};
use crate::notify::payload::{build_event, EXTERNAL_EVENT_SOURCE_ID};
use crate::utils::component_url;

/// Outcome of sending one event to one installation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Event accepted by the installation
    Sent,

    /// The event source could not be provisioned; a permanent
    /// configuration gap until someone intervenes
    SetupFailed { reason: String },

    /// Submission rejected or transport failed; likely transient
    SendFailed { reason: String },
}

/// Per-installation failure recorded during a best-effort phase
#[derive(Debug, Clone)]
pub struct DeliveryFailure {
    pub site_url: String,
    pub reason: String,
}

/// Sends deployment events through a [`CompassApi`]
pub struct Dispatcher<'a> {
    api: &'a dyn CompassApi,
}

impl<'a> Dispatcher<'a> {
    pub fn new(api: &'a dyn CompassApi) -> Self {
        Self { api }
    }

    /// Submit one event, provisioning the event source when it is missing
    pub async fn send_one(
        &self,
        installation: &VerifiedInstallation,
        run: &DeploymentRun,
        state: DeploymentState,
        description: &str,
    ) -> DispatchOutcome {
        let envelope = build_event(run, installation, state, description, Utc::now());

        let outcome = match self.api.submit_event(&envelope).await {
            Ok(outcome) => outcome,
            Err(e) => {
                return DispatchOutcome::SendFailed {
                    reason: e.to_string(),
                }
            }
        };

        match outcome {
            SubmitOutcome::Accepted => DispatchOutcome::Sent,
            SubmitOutcome::Rejected { status, body } => DispatchOutcome::SendFailed {
                reason: format!("HTTP {}: {}", status, body),
            },
            SubmitOutcome::SourceNotFound => self.provision_and_resend(installation, &envelope).await,
        }
    }

    /// Create and attach the event source, then resubmit the original
    /// payload exactly once
    ///
    /// Resubmitting the identical envelope is safe: every idempotency key
    /// field is recomputed identically on the remote side.
    async fn provision_and_resend(
        &self,
        installation: &VerifiedInstallation,
        envelope: &EventEnvelope,
    ) -> DispatchOutcome {
        warn!(
            "Event source not found for {} - attempting automatic creation...",
            installation.site_url
        );

        let source_id = match self
            .api
            .create_event_source(
                &installation.site_url,
                &installation.cloud_id,
                EXTERNAL_EVENT_SOURCE_ID,
            )
            .await
        {
            Ok(id) => id,
            Err(e) => {
                return DispatchOutcome::SetupFailed {
                    reason: format!("event source creation failed: {}", e),
                }
            }
        };

        if let Err(e) = self
            .api
            .attach_event_source(&installation.site_url, &source_id, &installation.component_id)
            .await
        {
            return DispatchOutcome::SetupFailed {
                reason: format!("event source attach failed: {}", e),
            };
        }

        info!(
            "Created and attached event source {} for {}",
            source_id, installation.site_url
        );

        match self.api.submit_event(envelope).await {
            Ok(SubmitOutcome::Accepted) => DispatchOutcome::Sent,
            Ok(SubmitOutcome::SourceNotFound) => DispatchOutcome::SendFailed {
                reason: "event source still missing after creation".to_string(),
            },
            Ok(SubmitOutcome::Rejected { status, body }) => DispatchOutcome::SendFailed {
                reason: format!("retry after provisioning failed, HTTP {}: {}", status, body),
            },
            Err(e) => DispatchOutcome::SendFailed {
                reason: e.to_string(),
            },
        }
    }

    /// All-or-nothing IN_PROGRESS phase
    ///
    /// Returns Err when any installation could not be notified, after
    /// compensating the installations that already accepted IN_PROGRESS.
    /// Setup failures and send failures surface as distinct errors so the
    /// operator can tell a configuration gap from a transient problem.
    pub async fn send_in_progress(
        &self,
        installations: &[VerifiedInstallation],
        run: &DeploymentRun,
        description: &str,
    ) -> Result<(), BeaconError> {
        let mut sent: Vec<&VerifiedInstallation> = Vec::new();
        let mut setup_failures: Vec<String> = Vec::new();
        let mut send_failures: Vec<String> = Vec::new();

        for installation in installations {
            match self
                .send_one(installation, run, DeploymentState::InProgress, description)
                .await
            {
                DispatchOutcome::Sent => {
                    info!("IN_PROGRESS event sent to {}", installation.site_url);
                    sent.push(installation);
                }
                DispatchOutcome::SetupFailed { reason } => {
                    error!(
                        "Event source setup failed for {}: {}",
                        installation.site_url, reason
                    );
                    setup_failures.push(installation.site_url.clone());
                }
                DispatchOutcome::SendFailed { reason } => {
                    error!(
                        "Failed to send IN_PROGRESS event to {}: {}",
                        installation.site_url, reason
                    );
                    send_failures.push(installation.site_url.clone());
                }
            }
        }

        if setup_failures.is_empty() && send_failures.is_empty() {
            return Ok(());
        }

        if !sent.is_empty() {
            error!(
                "{} notification(s) failed; sending FAILED events to {} installation(s) that already accepted IN_PROGRESS",
                setup_failures.len() + send_failures.len(),
                sent.len()
            );
            for installation in &sent {
                match self
                    .send_one(installation, run, DeploymentState::Failed, description)
                    .await
                {
                    DispatchOutcome::Sent => {
                        info!("FAILED event sent to {}", installation.site_url);
                    }
                    DispatchOutcome::SetupFailed { reason }
                    | DispatchOutcome::SendFailed { reason } => {
                        error!(
                            "Failed to send FAILED event to {}: {}",
                            installation.site_url, reason
                        );
                    }
                }
            }
        }

        if !setup_failures.is_empty() {
            Err(BeaconError::NotifySetup(setup_failures.join(", ")))
        } else {
            Err(BeaconError::NotifySend(send_failures.join(", ")))
        }
    }

    /// Best-effort terminal phase
    ///
    /// The deployment outcome is already fixed by this point, so failures
    /// are collected per installation instead of aborting the run.
    pub async fn send_terminal(
        &self,
        installations: &[VerifiedInstallation],
        run: &DeploymentRun,
        state: DeploymentState,
        description: &str,
    ) -> Vec<DeliveryFailure> {
        let mut failures = Vec::new();

        for installation in installations {
            match self.send_one(installation, run, state, description).await {
                DispatchOutcome::Sent => {
                    info!(
                        "{} event sent to {} - {}",
                        state,
                        installation.site_url,
                        component_url(&installation.site_url, &run.component_slug)
                    );
                }
                DispatchOutcome::SetupFailed { reason }
                | DispatchOutcome::SendFailed { reason } => {
                    error!(
                        "Failed to send {} event to {}: {}",
                        state, installation.site_url, reason
                    );
                    failures.push(DeliveryFailure {
                        site_url: installation.site_url.clone(),
                        reason,
                    });
                }
            }
        }

        failures
    }
}

//! Event payload assembly

use chrono::{DateTime, Utc};

use crate::models::event::{
    DeploymentEvent, DeploymentProperties, DeploymentState, EnvironmentReference, EventBody,
    EventEnvelope, PipelineReference,
};
use crate::models::run::{DeploymentRun, VerifiedInstallation};

/// Event source identifier representing the origin of our events
pub const EXTERNAL_EVENT_SOURCE_ID: &str = "forge_cli";

/// Assemble the wire envelope for one event
///
/// The same deployment URL goes into both the event-level link and the
/// nested pipeline link; together with the constant pipeline id and run
/// sequence number this is what lets the service recognize repeated
/// submissions as updates of one timeline entry.
pub fn build_event(
    run: &DeploymentRun,
    installation: &VerifiedInstallation,
    state: DeploymentState,
    description: &str,
    now: DateTime<Utc>,
) -> EventEnvelope {
    let update_sequence_number = if state == DeploymentState::InProgress {
        run.sequence.initial_update_sequence()
    } else {
        run.sequence.terminal_update_sequence_at(now.timestamp_millis())
    };

    let completed_at = state.is_terminal().then_some(now);

    EventEnvelope {
        cloud_id: installation.cloud_id.clone(),
        component_id: installation.component_id.clone(),
        event: EventBody {
            deployment: DeploymentEvent {
                update_sequence_number,
                display_name: format!("{} deployment", run.component_slug),
                description: description.to_string(),
                url: run.deployment_url.clone(),
                last_updated: now,
                external_event_source_id: EXTERNAL_EVENT_SOURCE_ID.to_string(),
                deployment_properties: DeploymentProperties {
                    sequence_number: run.run_sequence_number(),
                    state,
                    pipeline: PipelineReference {
                        pipeline_id: run.run_id().to_string(),
                        url: run.deployment_url.clone(),
                        display_name: format!("Local Forge Deployment - {}", run.commit),
                    },
                    environment: EnvironmentReference {
                        display_name: run.environment_label.clone(),
                        environment_id: run.environment_category.as_str().to_string(),
                        category: run.environment_category,
                    },
                    started_at: run.started_at,
                    completed_at,
                },
            },
        },
    }
}

/// Deployment link for a run
///
/// A commit URL pointing at the exact deployed revision when the GitHub
/// repository is known, otherwise a synthesized local identifier.
pub fn deployment_url(
    github_repo: Option<&str>,
    commit_full: Option<&str>,
    slug: &str,
    run_id: &str,
) -> String {
    match (github_repo, commit_full) {
        (Some(repo), Some(commit)) => format!("https://github.com/{}/commit/{}", repo, commit),
        _ => format!("https://localhost/{}/{}", slug, run_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::run::EnvironmentCategory;
    use crate::notify::sequence::RunSequence;
    use chrono::TimeZone;

    fn run() -> DeploymentRun {
        DeploymentRun {
            sequence: RunSequence::from_millis(1_700_000_000_000),
            started_at: Utc.timestamp_millis_opt(1_700_000_000_000).unwrap(),
            environment_label: "staging".to_string(),
            environment_category: EnvironmentCategory::Staging,
            component_slug: "my-app".to_string(),
            commit: "ab12cd3".to_string(),
            deployment_url: "https://github.com/acme/my-app/commit/ab12cd3ef".to_string(),
            deployed_version: None,
            schema_version: None,
        }
    }

    fn installation() -> VerifiedInstallation {
        VerifiedInstallation {
            site_url: "https://example.atlassian.net/".to_string(),
            cloud_id: "cloud-1".to_string(),
            component_id: "ari:component/1".to_string(),
            environment: "staging".to_string(),
        }
    }

    #[test]
    fn test_pipeline_id_equals_run_id() {
        let run = run();
        let envelope = build_event(
            &run,
            &installation(),
            DeploymentState::InProgress,
            "desc",
            Utc::now(),
        );

        let deployment = &envelope.event.deployment;
        assert_eq!(deployment.deployment_properties.pipeline.pipeline_id, run.run_id());
        assert_eq!(deployment.url, deployment.deployment_properties.pipeline.url);
    }

    #[test]
    fn test_completed_at_only_for_terminal_states() {
        let run = run();
        let now = Utc::now();

        let in_progress = build_event(&run, &installation(), DeploymentState::InProgress, "d", now);
        assert!(in_progress.event.deployment.deployment_properties.completed_at.is_none());

        let failed = build_event(&run, &installation(), DeploymentState::Failed, "d", now);
        assert_eq!(failed.event.deployment.deployment_properties.completed_at, Some(now));
    }

    #[test]
    fn test_run_sequence_number_constant_across_states() {
        let run = run();
        let now = Utc.timestamp_millis_opt(1_700_000_000_500).unwrap();

        let first = build_event(&run, &installation(), DeploymentState::InProgress, "d", now);
        let last = build_event(&run, &installation(), DeploymentState::Successful, "d", now);

        assert_eq!(
            first.event.deployment.deployment_properties.sequence_number,
            last.event.deployment.deployment_properties.sequence_number,
        );
    }

    #[test]
    fn test_terminal_update_sequence_exceeds_initial() {
        let run = run();
        // Frozen clock: now equals the base reading
        let now = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();

        let first = build_event(&run, &installation(), DeploymentState::InProgress, "d", now);
        let last = build_event(&run, &installation(), DeploymentState::Failed, "d", now);

        assert!(
            last.event.deployment.update_sequence_number
                > first.event.deployment.update_sequence_number
        );
    }

    #[test]
    fn test_deployment_url_prefers_commit_link() {
        assert_eq!(
            deployment_url(Some("acme/my-app"), Some("ab12cd3ef456"), "my-app", "deploy-1"),
            "https://github.com/acme/my-app/commit/ab12cd3ef456"
        );
        assert_eq!(
            deployment_url(None, Some("ab12cd3ef456"), "my-app", "deploy-1"),
            "https://localhost/my-app/deploy-1"
        );
        assert_eq!(
            deployment_url(Some("acme/my-app"), None, "my-app", "deploy-1"),
            "https://localhost/my-app/deploy-1"
        );
    }
}

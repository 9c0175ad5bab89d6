//! End-to-end pipeline scenarios against recording fakes

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use beacon::catalog::ComponentMetadata;
use beacon::compass::{CompassApi, SubmitOutcome, TriggerResponse};
use beacon::deploy::pipeline::{execute, RunContext};
use beacon::errors::BeaconError;
use beacon::forge::{ForgeDriver, ForgeUser};
use beacon::git::GitInfo;
use beacon::models::event::{DeploymentState, EventEnvelope};
use beacon::models::run::{DiscoveredInstallation, EnvironmentCategory};

const SITE_ONE: &str = "https://one.atlassian.net";
const SITE_TWO: &str = "https://two.atlassian.net";

/// Compass fake that records every submission attempt
struct FakeCompass {
    events: Mutex<Vec<EventEnvelope>>,
    created_sources: Mutex<Vec<String>>,
    source_missing: Mutex<HashSet<String>>,
    provisioning_fails: bool,
    components: HashMap<String, String>,
    reject: Option<(String, DeploymentState)>,
    migration: TriggerResponse,
}

impl FakeCompass {
    fn new(components: &[(&str, &str)]) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            created_sources: Mutex::new(Vec::new()),
            source_missing: Mutex::new(HashSet::new()),
            provisioning_fails: false,
            components: components
                .iter()
                .map(|(cloud, component)| (cloud.to_string(), component.to_string()))
                .collect(),
            reject: None,
            migration: TriggerResponse {
                status: 204,
                body: String::new(),
            },
        }
    }

    fn missing_source(self, cloud_id: &str) -> Self {
        self.source_missing
            .lock()
            .unwrap()
            .insert(cloud_id.to_string());
        self
    }

    fn failing_provisioning(mut self) -> Self {
        self.provisioning_fails = true;
        self
    }

    fn rejecting(mut self, cloud_id: &str, state: DeploymentState) -> Self {
        self.reject = Some((cloud_id.to_string(), state));
        self
    }

    fn with_migration(mut self, status: u16, body: &str) -> Self {
        self.migration = TriggerResponse {
            status,
            body: body.to_string(),
        };
        self
    }

    fn submissions(&self, cloud_id: &str, state: DeploymentState) -> Vec<EventEnvelope> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| {
                e.cloud_id == cloud_id && e.event.deployment.deployment_properties.state == state
            })
            .cloned()
            .collect()
    }

    fn count(&self, state: DeploymentState) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.event.deployment.deployment_properties.state == state)
            .count()
    }
}

#[async_trait]
impl CompassApi for FakeCompass {
    async fn submit_event(&self, envelope: &EventEnvelope) -> Result<SubmitOutcome, BeaconError> {
        self.events.lock().unwrap().push(envelope.clone());

        if let Some((cloud_id, state)) = &self.reject {
            if envelope.cloud_id == *cloud_id
                && envelope.event.deployment.deployment_properties.state == *state
            {
                return Ok(SubmitOutcome::Rejected {
                    status: 500,
                    body: "internal error".to_string(),
                });
            }
        }

        if self.source_missing.lock().unwrap().contains(&envelope.cloud_id) {
            return Ok(SubmitOutcome::SourceNotFound);
        }

        Ok(SubmitOutcome::Accepted)
    }

    async fn lookup_component(
        &self,
        _site_url: &str,
        cloud_id: &str,
        _slug: &str,
    ) -> Result<Option<String>, BeaconError> {
        Ok(self.components.get(cloud_id).cloned())
    }

    async fn create_event_source(
        &self,
        _site_url: &str,
        cloud_id: &str,
        _external_source_id: &str,
    ) -> Result<String, BeaconError> {
        if self.provisioning_fails {
            return Err(BeaconError::Graphql("createEventSource failed: denied".to_string()));
        }
        self.source_missing.lock().unwrap().remove(cloud_id);
        let source_id = format!("source-for-{}", cloud_id);
        self.created_sources.lock().unwrap().push(source_id.clone());
        Ok(source_id)
    }

    async fn attach_event_source(
        &self,
        _site_url: &str,
        _event_source_id: &str,
        _component_id: &str,
    ) -> Result<(), BeaconError> {
        Ok(())
    }

    async fn trigger_migration(&self, _trigger_url: &str) -> Result<TriggerResponse, BeaconError> {
        Ok(self.migration.clone())
    }
}

/// Forge driver fake with scripted results
struct FakeForge {
    installations: Vec<DiscoveredInstallation>,
    deploy_fails: bool,
    deployed_version: Option<String>,
    webtrigger: Option<String>,
}

impl FakeForge {
    fn new(installations: Vec<DiscoveredInstallation>) -> Self {
        Self {
            installations,
            deploy_fails: false,
            deployed_version: Some("1.2.3".to_string()),
            webtrigger: Some("https://one.atlassian.net/x/trigger/abc".to_string()),
        }
    }

    fn failing_deploy(mut self) -> Self {
        self.deploy_fails = true;
        self
    }
}

#[async_trait]
impl ForgeDriver for FakeForge {
    async fn list_installations(&self) -> Result<Vec<DiscoveredInstallation>, BeaconError> {
        Ok(self.installations.clone())
    }

    async fn whoami(&self) -> Result<ForgeUser, BeaconError> {
        Ok(ForgeUser {
            user: "Dana Deploy (dana@example.com)".to_string(),
            account_id: "abc123".to_string(),
        })
    }

    async fn deploy(&self, _environment: &str) -> Result<Option<String>, BeaconError> {
        if self.deploy_fails {
            return Err(BeaconError::Deploy("forge deploy command failed".to_string()));
        }
        Ok(self.deployed_version.clone())
    }

    async fn webtrigger_url(
        &self,
        _trigger_key: &str,
        _site_url: &str,
        _environment: &str,
    ) -> Result<Option<String>, BeaconError> {
        Ok(self.webtrigger.clone())
    }
}

fn installation(site: &str, cloud: &str) -> DiscoveredInstallation {
    DiscoveredInstallation {
        site_url: site.to_string(),
        cloud_id: cloud.to_string(),
        environment: "development".to_string(),
    }
}

fn two_installations() -> Vec<DiscoveredInstallation> {
    vec![
        installation(SITE_ONE, "cloud-1"),
        installation(SITE_TWO, "cloud-2"),
    ]
}

fn context() -> RunContext {
    RunContext {
        environment: "development".to_string(),
        category: EnvironmentCategory::Development,
        metadata: ComponentMetadata {
            slug: "my-app".to_string(),
            github_repo: Some("acme/my-app".to_string()),
        },
        git: GitInfo {
            branch: "main".to_string(),
            commit: "ab12cd3".to_string(),
            commit_full: Some("ab12cd3ef4567890".to_string()),
        },
        uncommitted: None,
        user: "Dana Deploy".to_string(),
        dry_run: false,
    }
}

const MIGRATION_OK_BODY: &str = r#"{
    "success": true,
    "status": "SUCCESS",
    "pendingMigrations": 0,
    "completedMigrations": 15,
    "totalMigrations": 15,
    "message": "[SQL-MIGRATION] All migrations applied | Schema versions: v001-v015"
}"#;

// Scenario A: both installations accept IN_PROGRESS, deploy and migration
// succeed; both receive SUCCESSFUL sharing one timeline identity.
#[tokio::test]
async fn successful_run_notifies_all_installations() {
    let api = FakeCompass::new(&[("cloud-1", "c-1"), ("cloud-2", "c-2")])
        .with_migration(200, MIGRATION_OK_BODY);
    let forge = FakeForge::new(two_installations());

    let summary = execute(&api, &forge, context()).await.unwrap();

    assert_eq!(summary.installations, 2);
    assert_eq!(summary.deployed_version.as_deref(), Some("1.2.3"));
    assert_eq!(summary.schema_version.as_deref(), Some("v001-v015"));
    assert!(summary.delivery_failures.is_empty());

    assert_eq!(api.count(DeploymentState::InProgress), 2);
    assert_eq!(api.count(DeploymentState::Successful), 2);
    assert_eq!(api.count(DeploymentState::Failed), 0);

    // One timeline identity across every event of the run
    let events = api.events.lock().unwrap();
    let first = &events[0].event.deployment;
    for envelope in events.iter() {
        let deployment = &envelope.event.deployment;
        assert_eq!(
            deployment.deployment_properties.sequence_number,
            first.deployment_properties.sequence_number
        );
        assert_eq!(
            deployment.deployment_properties.pipeline.pipeline_id,
            first.deployment_properties.pipeline.pipeline_id
        );
        assert_eq!(deployment.url, deployment.deployment_properties.pipeline.url);
    }
    drop(events);

    // Terminal events supersede the initial ones
    for cloud in ["cloud-1", "cloud-2"] {
        let initial = api.submissions(cloud, DeploymentState::InProgress);
        let terminal = api.submissions(cloud, DeploymentState::Successful);
        assert!(
            terminal[0].event.deployment.update_sequence_number
                > initial[0].event.deployment.update_sequence_number
        );
        assert!(terminal[0]
            .event
            .deployment
            .description
            .contains("Version: 1.2.3"));
    }
}

// Scenario B: installation #2 reports a missing event source and
// provisioning fails. Installation #1 is compensated with FAILED;
// installation #2 never receives one; the run aborts naming #2 as a
// setup failure.
#[tokio::test]
async fn setup_failure_compensates_only_sent_installations() {
    let api = FakeCompass::new(&[("cloud-1", "c-1"), ("cloud-2", "c-2")])
        .missing_source("cloud-2")
        .failing_provisioning();
    let forge = FakeForge::new(two_installations());

    let err = execute(&api, &forge, context()).await.unwrap_err();

    match err {
        BeaconError::NotifySetup(sites) => assert!(sites.contains(SITE_TWO)),
        other => panic!("expected NotifySetup, got {:?}", other),
    }

    assert_eq!(api.submissions("cloud-1", DeploymentState::InProgress).len(), 1);
    assert_eq!(api.submissions("cloud-1", DeploymentState::Failed).len(), 1);
    assert_eq!(api.submissions("cloud-2", DeploymentState::InProgress).len(), 1);
    assert!(api.submissions("cloud-2", DeploymentState::Failed).is_empty());
}

// Scenario C: deploy fails after IN_PROGRESS succeeded everywhere; both
// installations receive FAILED.
#[tokio::test]
async fn deploy_failure_sends_failed_everywhere() {
    let api = FakeCompass::new(&[("cloud-1", "c-1"), ("cloud-2", "c-2")]);
    let forge = FakeForge::new(two_installations()).failing_deploy();

    let err = execute(&api, &forge, context()).await.unwrap_err();
    assert!(matches!(err, BeaconError::Deploy(_)));

    assert_eq!(api.count(DeploymentState::InProgress), 2);
    assert_eq!(api.count(DeploymentState::Failed), 2);
    assert_eq!(api.count(DeploymentState::Successful), 0);
}

// Scenario D: migration trigger returns a server error after a
// successful deploy; the timeline still ends FAILED everywhere.
#[tokio::test]
async fn migration_server_error_sends_failed_despite_deploy_success() {
    let api = FakeCompass::new(&[("cloud-1", "c-1"), ("cloud-2", "c-2")])
        .with_migration(500, "migration exploded");
    let forge = FakeForge::new(two_installations());

    let err = execute(&api, &forge, context()).await.unwrap_err();
    assert!(matches!(err, BeaconError::Migration(_)));

    assert_eq!(api.count(DeploymentState::InProgress), 2);
    assert_eq!(api.count(DeploymentState::Failed), 2);
    assert_eq!(api.count(DeploymentState::Successful), 0);
}

// Scenario E: zero installations discovered; the run proceeds without
// any notification attempts and completes.
#[tokio::test]
async fn empty_discovery_runs_without_notifications() {
    let api = FakeCompass::new(&[]);
    let forge = FakeForge::new(Vec::new());

    let summary = execute(&api, &forge, context()).await.unwrap();

    assert_eq!(summary.installations, 0);
    assert!(summary.delivery_failures.is_empty());
    assert!(api.events.lock().unwrap().is_empty());
}

// Discovered installations that all fail verification abort the run.
#[tokio::test]
async fn discovered_but_unverified_aborts() {
    let api = FakeCompass::new(&[]);
    let forge = FakeForge::new(two_installations());

    let err = execute(&api, &forge, context()).await.unwrap_err();
    assert!(matches!(err, BeaconError::Verification(_)));
    assert!(api.events.lock().unwrap().is_empty());
}

// A missing event source that provisions cleanly resubmits the identical
// payload once and the run completes.
#[tokio::test]
async fn provisioning_recovers_and_resubmits_once() {
    let api = FakeCompass::new(&[("cloud-1", "c-1"), ("cloud-2", "c-2")])
        .missing_source("cloud-2")
        .with_migration(200, MIGRATION_OK_BODY);
    let forge = FakeForge::new(two_installations());

    let summary = execute(&api, &forge, context()).await.unwrap();
    assert!(summary.delivery_failures.is_empty());

    // First attempt signalled the missing source, the retry was accepted
    let attempts = api.submissions("cloud-2", DeploymentState::InProgress);
    assert_eq!(attempts.len(), 2);
    assert_eq!(
        attempts[0].event.deployment.update_sequence_number,
        attempts[1].event.deployment.update_sequence_number
    );
    assert_eq!(
        api.created_sources.lock().unwrap().as_slice(),
        ["source-for-cloud-2"]
    );

    assert_eq!(api.count(DeploymentState::Successful), 2);
    assert_eq!(api.count(DeploymentState::Failed), 0);
}

// A failed terminal SUCCESS delivery never becomes a FAILED event; it is
// surfaced as a per-installation warning instead.
#[tokio::test]
async fn terminal_delivery_failure_is_reported_not_compensated() {
    let api = FakeCompass::new(&[("cloud-1", "c-1"), ("cloud-2", "c-2")])
        .with_migration(200, MIGRATION_OK_BODY)
        .rejecting("cloud-2", DeploymentState::Successful);
    let forge = FakeForge::new(two_installations());

    let summary = execute(&api, &forge, context()).await.unwrap();

    assert_eq!(summary.delivery_failures.len(), 1);
    assert_eq!(summary.delivery_failures[0].site_url, SITE_TWO);
    assert_eq!(api.count(DeploymentState::Failed), 0);
}

// Duplicate cloud ids from discovery collapse to one notification target.
#[tokio::test]
async fn duplicate_cloud_ids_notify_once() {
    let api = FakeCompass::new(&[("cloud-1", "c-1")]).with_migration(200, MIGRATION_OK_BODY);
    let forge = FakeForge::new(vec![
        installation(SITE_ONE, "cloud-1"),
        installation("https://mirror.atlassian.net", "cloud-1"),
    ]);

    let summary = execute(&api, &forge, context()).await.unwrap();

    assert_eq!(summary.installations, 1);
    assert_eq!(api.count(DeploymentState::InProgress), 1);
    assert_eq!(api.count(DeploymentState::Successful), 1);
}

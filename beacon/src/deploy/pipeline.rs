//! Deployment pipeline orchestration
//!
//! Drives one run end to end: verify installations, notify IN_PROGRESS,
//! run the deploy, trigger the migration, notify the terminal state. Each
//! failure point decides its own compensation: once any installation has
//! acknowledged IN_PROGRESS and until a terminal state is sent, failures
//! emit best-effort FAILED events so no remote timeline is left stuck. A
//! failed SUCCESS delivery is never compensated with FAILED; the
//! deployment genuinely succeeded, and overwriting that would
//! misrepresent reality.

use chrono::Utc;
use tracing::{error, info};

use crate::catalog::ComponentMetadata;
use crate::compass::CompassApi;
use crate::deploy::migrate::{self, MigrationOutcome};
use crate::deploy::phase::{PhaseEvent, PhaseMachine};
use crate::deploy::verify::verify_installations;
use crate::errors::BeaconError;
use crate::forge::ForgeDriver;
use crate::git::{GitInfo, UncommittedChanges};
use crate::models::event::DeploymentState;
use crate::models::run::{DeploymentRun, EnvironmentCategory, VerifiedInstallation};
use crate::notify::describe::{compose, DescriptionContext};
use crate::notify::dispatch::{DeliveryFailure, Dispatcher};
use crate::notify::payload::{build_event, deployment_url};
use crate::notify::sequence::RunSequence;

/// Context assembled before the pipeline starts
#[derive(Debug, Clone)]
pub struct RunContext {
    pub environment: String,
    pub category: EnvironmentCategory,
    pub metadata: ComponentMetadata,
    pub git: GitInfo,
    pub uncommitted: Option<UncommittedChanges>,
    pub user: String,
    pub dry_run: bool,
}

/// Result of a completed run
#[derive(Debug)]
pub struct RunSummary {
    pub run_id: String,
    pub installations: usize,
    pub deployed_version: Option<String>,
    pub schema_version: Option<String>,
    pub delivery_failures: Vec<DeliveryFailure>,
}

/// Execute one deployment run
pub async fn execute(
    api: &dyn CompassApi,
    forge: &dyn ForgeDriver,
    ctx: RunContext,
) -> Result<RunSummary, BeaconError> {
    let sequence = RunSequence::new();
    let mut run = DeploymentRun {
        started_at: Utc::now(),
        environment_label: ctx.environment.clone(),
        environment_category: ctx.category,
        component_slug: ctx.metadata.slug.clone(),
        commit: ctx.git.commit.clone(),
        deployment_url: deployment_url(
            ctx.metadata.github_repo.as_deref(),
            ctx.git.commit_full.as_deref(),
            &ctx.metadata.slug,
            sequence.run_id(),
        ),
        deployed_version: None,
        schema_version: None,
        sequence,
    };
    let mut machine = PhaseMachine::new();
    let dispatcher = Dispatcher::new(api);

    // Verification
    let discovered = forge.list_installations().await?;
    let installations = match verify_installations(api, discovered, &ctx.metadata.slug).await {
        Ok(installations) => installations,
        Err(e) => {
            let _ = machine.process(PhaseEvent::Abort);
            return Err(e);
        }
    };
    machine.process(PhaseEvent::Verify).map_err(BeaconError::Deploy)?;

    // IN_PROGRESS notifications: all-or-nothing
    if installations.is_empty() {
        info!("No installations available - skipping deployment event notifications");
    } else if ctx.dry_run {
        print_dry_run_events(&run, &installations, DeploymentState::InProgress, &ctx)?;
    } else {
        let description = description_for(&ctx, &run, DeploymentState::InProgress);
        if let Err(e) = dispatcher
            .send_in_progress(&installations, &run, &description)
            .await
        {
            // Compensation already happened inside the dispatcher
            let _ = machine.process(PhaseEvent::Abort);
            return Err(e);
        }
    }
    machine
        .process(PhaseEvent::NotifyInProgress)
        .map_err(BeaconError::Deploy)?;

    // External deploy step
    if ctx.dry_run {
        println!(
            "DRY RUN: Would run 'forge deploy --environment {}'",
            ctx.environment
        );
    } else {
        match forge.deploy(&ctx.environment).await {
            Ok(version) => run.deployed_version = version,
            Err(e) => {
                abort_with_compensation(&dispatcher, &mut machine, &installations, &run, &ctx).await;
                return Err(e);
            }
        }
    }
    machine.process(PhaseEvent::Deploy).map_err(BeaconError::Deploy)?;

    // Post-deploy migration
    if ctx.dry_run {
        println!("DRY RUN: Would trigger SQL migration via web trigger");
    } else {
        match migrate::run_migration(api, forge, &installations, &ctx.environment).await {
            Ok(MigrationOutcome::Completed { schema_version }) => {
                run.schema_version = schema_version;
            }
            Ok(MigrationOutcome::Skipped { .. }) => {}
            Err(e) => {
                // Migration is part of the overall success criterion, so
                // the timeline shows FAILED even though the deploy itself
                // succeeded
                abort_with_compensation(&dispatcher, &mut machine, &installations, &run, &ctx).await;
                return Err(e);
            }
        }
    }
    machine.process(PhaseEvent::Migrate).map_err(BeaconError::Deploy)?;

    // Terminal notifications: best-effort
    let delivery_failures = if installations.is_empty() {
        Vec::new()
    } else if ctx.dry_run {
        print_dry_run_events(&run, &installations, DeploymentState::Successful, &ctx)?;
        Vec::new()
    } else {
        let description = description_for(&ctx, &run, DeploymentState::Successful);
        dispatcher
            .send_terminal(&installations, &run, DeploymentState::Successful, &description)
            .await
    };
    machine
        .process(PhaseEvent::NotifyFinal)
        .map_err(BeaconError::Deploy)?;
    machine.process(PhaseEvent::Finish).map_err(BeaconError::Deploy)?;

    report_delivery_failures(&delivery_failures);

    Ok(RunSummary {
        run_id: run.run_id().to_string(),
        installations: installations.len(),
        deployed_version: run.deployed_version.clone(),
        schema_version: run.schema_version.clone(),
        delivery_failures,
    })
}

/// Send best-effort FAILED events and abort the phase machine
async fn abort_with_compensation(
    dispatcher: &Dispatcher<'_>,
    machine: &mut PhaseMachine,
    installations: &[VerifiedInstallation],
    run: &DeploymentRun,
    ctx: &RunContext,
) {
    if machine.compensation_required() && !installations.is_empty() {
        error!(
            "Sending FAILED events to {} installation(s) so the timeline does not stay IN_PROGRESS",
            installations.len()
        );
        let description = description_for(ctx, run, DeploymentState::Failed);
        let _ = dispatcher
            .send_terminal(installations, run, DeploymentState::Failed, &description)
            .await;
    }
    let _ = machine.process(PhaseEvent::Abort);
}

fn description_for(ctx: &RunContext, run: &DeploymentRun, state: DeploymentState) -> String {
    compose(&DescriptionContext {
        state,
        version: run.deployed_version.clone(),
        schema_version: run.schema_version.clone(),
        branch: ctx.git.branch.clone(),
        commit: ctx.git.commit.clone(),
        uncommitted: ctx.uncommitted.clone(),
        user: ctx.user.clone(),
    })
}

/// Print the payloads a real run would submit
fn print_dry_run_events(
    run: &DeploymentRun,
    installations: &[VerifiedInstallation],
    state: DeploymentState,
    ctx: &RunContext,
) -> Result<(), BeaconError> {
    println!(
        "DRY RUN: Would send {} event to {} installation(s)",
        state,
        installations.len()
    );
    let description = description_for(ctx, run, state);
    for installation in installations {
        let envelope = build_event(run, installation, state, &description, Utc::now());
        println!(
            "  - {}: {}",
            installation.site_url,
            serde_json::to_string_pretty(&envelope)?
        );
    }
    Ok(())
}

fn report_delivery_failures(failures: &[DeliveryFailure]) {
    if failures.is_empty() {
        return;
    }

    error!(
        "Failed to send deployment notifications to {} installation(s):",
        failures.len()
    );
    for failure in failures {
        error!("  - {}: {}", failure.site_url, failure.reason);
    }
    error!(
        "Deployments may appear stuck IN_PROGRESS in Compass. Check API credentials and network \
         connectivity."
    );
}

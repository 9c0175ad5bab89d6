//! Top-level run assembly

use tracing::info;

use crate::app::options::AppOptions;
use crate::catalog;
use crate::compass::CompassClient;
use crate::config::Credentials;
use crate::deploy::pipeline::{self, RunContext, RunSummary};
use crate::errors::BeaconError;
use crate::forge::cli::ForgeCli;
use crate::forge::ForgeDriver;
use crate::git;
use crate::models::run::EnvironmentCategory;

/// How a completed run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Deployment succeeded and every notification was delivered
    Success,

    /// Deployment succeeded, but terminal notifications failed for at
    /// least one installation
    NotificationWarnings,
}

/// Run the notifier end to end
pub async fn run(options: &AppOptions) -> Result<RunStatus, BeaconError> {
    // Credentials are validated before any phase begins, dry-run included
    let credentials = Credentials::from_env()?;

    let cwd = std::env::current_dir()?;
    let metadata = catalog::load(&cwd)?;
    let category = EnvironmentCategory::from_label(&options.environment);

    println!("Component: {}", metadata.slug);
    println!("Environment: {} ({})", options.environment, category);
    if let Some(repo) = &metadata.github_repo {
        println!("GitHub repository: {}", repo);
    }
    if options.dry_run {
        println!("DRY RUN MODE - no deployment or API calls will be made");
    }

    let forge = ForgeCli::with_options(options.webtrigger.clone())?;
    let user = forge.whoami().await?;
    info!("Deploying as {}", user.preferred_name());

    let git_info = git::collect().await;
    let uncommitted = git::uncommitted_changes().await;

    let api = CompassClient::new(credentials)?;
    let ctx = RunContext {
        environment: options.environment.clone(),
        category,
        metadata,
        git: git_info,
        uncommitted,
        user: user.preferred_name(),
        dry_run: options.dry_run,
    };

    let summary = pipeline::execute(&api, &forge, ctx).await?;
    print_summary(&summary);

    if summary.delivery_failures.is_empty() {
        Ok(RunStatus::Success)
    } else {
        Ok(RunStatus::NotificationWarnings)
    }
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!("[SUCCESS] Deployment completed");
    println!("  Run ID: {}", summary.run_id);
    if let Some(version) = &summary.deployed_version {
        println!("  Version: {}", version);
    }
    if let Some(schema) = &summary.schema_version {
        println!("  Schema: {}", schema);
    }
    println!("  Installations notified: {}", summary.installations);

    if !summary.delivery_failures.is_empty() {
        println!();
        println!(
            "[WARNING] {} deployment notification(s) failed to send.",
            summary.delivery_failures.len()
        );
        for failure in &summary.delivery_failures {
            println!("  - {}: {}", failure.site_url, failure.reason);
        }
    }
}

//! Post-deploy SQL migration trigger
//!
//! After a successful deploy the app's migration web trigger is invoked
//! on the installation matching the deployment environment. Status-code
//! contract: 2xx responses are validated when they carry a JSON body,
//! 3xx/4xx degrade to warnings and the run continues, 5xx aborts the run
//! because a server error means the migrations themselves failed.

use serde::Deserialize;
use tracing::{info, warn};

use crate::compass::{CompassApi, TriggerResponse};
use crate::errors::BeaconError;
use crate::forge::ForgeDriver;
use crate::models::run::VerifiedInstallation;

/// Web trigger key registered in the app manifest
pub const MIGRATION_TRIGGER_KEY: &str = "sql-migrate";

/// Structured body returned by the migration web trigger
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    #[serde(default)]
    pub success: bool,

    #[serde(default = "default_status")]
    pub status: String,

    #[serde(default = "default_pending")]
    pub pending_migrations: i64,

    #[serde(default)]
    pub completed_migrations: i64,

    #[serde(default)]
    pub total_migrations: i64,

    #[serde(default)]
    pub message: Option<String>,

    #[serde(default)]
    pub error: Option<String>,
}

fn default_status() -> String {
    "UNKNOWN".to_string()
}

fn default_pending() -> i64 {
    -1
}

/// Outcome of the migration phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// Migrations ran; schema version when the trigger reported one
    Completed { schema_version: Option<String> },

    /// Trigger unavailable or inconclusive; the run continues
    Skipped { reason: String },
}

/// Trigger the post-deploy migration for the matching installation
pub async fn run_migration(
    api: &dyn CompassApi,
    forge: &dyn ForgeDriver,
    installations: &[VerifiedInstallation],
    environment: &str,
) -> Result<MigrationOutcome, BeaconError> {
    if installations.is_empty() {
        info!("No installations available - skipping SQL migration trigger");
        return Ok(MigrationOutcome::Skipped {
            reason: "no installations".to_string(),
        });
    }

    let Some(target) = find_matching_installation(installations, environment) else {
        info!(
            "No installation found for environment '{}' - skipping SQL migration trigger",
            environment
        );
        return Ok(MigrationOutcome::Skipped {
            reason: format!("no installation for environment '{}'", environment),
        });
    };

    let trigger_url = match forge
        .webtrigger_url(MIGRATION_TRIGGER_KEY, &target.site_url, environment)
        .await?
    {
        Some(url) => url,
        None => {
            return Ok(MigrationOutcome::Skipped {
                reason: "web trigger not found".to_string(),
            })
        }
    };

    info!("Triggering SQL migration via web trigger...");
    let response = match api.trigger_migration(&trigger_url).await {
        Ok(response) => response,
        Err(e) => {
            warn!(
                "Failed to trigger SQL migration: {}. Deployment will continue, but migrations \
                 were not triggered.",
                e
            );
            return Ok(MigrationOutcome::Skipped {
                reason: e.to_string(),
            });
        }
    };

    classify_trigger_response(&response)
}

/// Apply the status-code contract to a trigger response
pub fn classify_trigger_response(
    response: &TriggerResponse,
) -> Result<MigrationOutcome, BeaconError> {
    match response.status {
        500..=599 => Err(BeaconError::Migration(format!(
            "migration trigger returned server error {}: {}",
            response.status, response.body
        ))),
        400..=499 => {
            warn!(
                "SQL migration trigger returned client error {}: {}. This may indicate endpoint \
                 misconfiguration; deployment will continue. Check the migration status manually.",
                response.status, response.body
            );
            Ok(MigrationOutcome::Skipped {
                reason: format!("client error {}", response.status),
            })
        }
        300..=399 => {
            warn!(
                "SQL migration trigger returned redirect {}. Deployment will continue; verify the \
                 endpoint URL.",
                response.status
            );
            Ok(MigrationOutcome::Skipped {
                reason: format!("redirect {}", response.status),
            })
        }
        200..=299 => match serde_json::from_str::<MigrationReport>(&response.body) {
            Ok(report) => validate_report(&report),
            // Some 2xx responses (204 No Content) have no body
            Err(_) => {
                info!("SQL migration triggered successfully (response not in JSON format)");
                Ok(MigrationOutcome::Completed {
                    schema_version: None,
                })
            }
        },
        other => Err(BeaconError::Migration(format!(
            "migration trigger returned unexpected status {}",
            other
        ))),
    }
}

fn validate_report(report: &MigrationReport) -> Result<MigrationOutcome, BeaconError> {
    if !report.success {
        return Err(BeaconError::Migration(format!(
            "{}. Status: {}, Pending: {}",
            report.error.as_deref().unwrap_or("Unknown error"),
            report.status,
            report.pending_migrations
        )));
    }

    if report.status != "SUCCESS" {
        return Err(BeaconError::Migration(format!(
            "migrations did not complete successfully. Status: {}, Pending: {}, Message: {}",
            report.status,
            report.pending_migrations,
            report.message.as_deref().unwrap_or("No message")
        )));
    }

    if report.pending_migrations > 0 {
        return Err(BeaconError::Migration(format!(
            "migrations incomplete. Completed: {}/{}, Pending: {}",
            report.completed_migrations, report.total_migrations, report.pending_migrations
        )));
    }

    match report.message.as_deref() {
        Some(message) => info!("{}", message),
        None => info!(
            "SQL migrations completed successfully - Completed: {}/{}",
            report.completed_migrations, report.total_migrations
        ),
    }

    Ok(MigrationOutcome::Completed {
        schema_version: report.message.as_deref().and_then(extract_schema_version),
    })
}

/// Pull the schema version range out of a trigger message
///
/// Message format: `[SQL-MIGRATION] ... | Schema versions: v001-v015`
fn extract_schema_version(message: &str) -> Option<String> {
    let marker = "Schema versions:";
    let idx = message.find(marker)?;
    let rest = message[idx + marker.len()..].trim_start();
    let token: String = rest
        .chars()
        .take_while(|c| !c.is_whitespace() && *c != '|')
        .collect();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

/// Find the installation whose Forge environment matches the deployment
fn find_matching_installation<'a>(
    installations: &'a [VerifiedInstallation],
    environment: &str,
) -> Option<&'a VerifiedInstallation> {
    installations
        .iter()
        .find(|installation| installation.environment.eq_ignore_ascii_case(environment))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, body: &str) -> TriggerResponse {
        TriggerResponse {
            status,
            body: body.to_string(),
        }
    }

    #[test]
    fn test_server_error_is_fatal() {
        let result = classify_trigger_response(&response(500, "boom"));
        assert!(matches!(result, Err(BeaconError::Migration(_))));
    }

    #[test]
    fn test_client_error_degrades_to_skip() {
        let result = classify_trigger_response(&response(404, "missing")).unwrap();
        assert!(matches!(result, MigrationOutcome::Skipped { .. }));
    }

    #[test]
    fn test_redirect_degrades_to_skip() {
        let result = classify_trigger_response(&response(302, "")).unwrap();
        assert!(matches!(result, MigrationOutcome::Skipped { .. }));
    }

    #[test]
    fn test_success_with_schema_version() {
        let body = r#"{
            "success": true,
            "status": "SUCCESS",
            "pendingMigrations": 0,
            "completedMigrations": 15,
            "totalMigrations": 15,
            "message": "[SQL-MIGRATION] All migrations applied | Schema versions: v001-v015"
        }"#;

        let outcome = classify_trigger_response(&response(200, body)).unwrap();
        assert_eq!(
            outcome,
            MigrationOutcome::Completed {
                schema_version: Some("v001-v015".to_string())
            }
        );
    }

    #[test]
    fn test_success_without_json_body() {
        let outcome = classify_trigger_response(&response(204, "")).unwrap();
        assert_eq!(
            outcome,
            MigrationOutcome::Completed {
                schema_version: None
            }
        );
    }

    #[test]
    fn test_reported_failure_is_fatal() {
        let body = r#"{"success": false, "error": "migration 12 failed", "status": "FAILED"}"#;
        let result = classify_trigger_response(&response(200, body));
        assert!(matches!(result, Err(BeaconError::Migration(_))));
    }

    #[test]
    fn test_pending_migrations_are_fatal() {
        let body = r#"{"success": true, "status": "SUCCESS", "pendingMigrations": 3}"#;
        let result = classify_trigger_response(&response(200, body));
        assert!(matches!(result, Err(BeaconError::Migration(_))));
    }

    #[test]
    fn test_extract_schema_version() {
        assert_eq!(
            extract_schema_version("done | Schema versions: v001-v015"),
            Some("v001-v015".to_string())
        );
        assert_eq!(
            extract_schema_version("Schema versions: v002 | elapsed 3s"),
            Some("v002".to_string())
        );
        assert_eq!(extract_schema_version("no marker here"), None);
    }

    #[test]
    fn test_environment_matching() {
        let installations = vec![
            VerifiedInstallation {
                site_url: "https://prod.atlassian.net".to_string(),
                cloud_id: "cloud-1".to_string(),
                component_id: "c-1".to_string(),
                environment: "production".to_string(),
            },
            VerifiedInstallation {
                site_url: "https://dev.atlassian.net".to_string(),
                cloud_id: "cloud-2".to_string(),
                component_id: "c-2".to_string(),
                environment: "development".to_string(),
            },
        ];

        let target = find_matching_installation(&installations, "Development").unwrap();
        assert_eq!(target.site_url, "https://dev.atlassian.net");
        assert!(find_matching_installation(&installations, "staging").is_none());
    }
}

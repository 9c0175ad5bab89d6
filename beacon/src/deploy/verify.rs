//! Installation verification

use std::collections::HashSet;

use tracing::{info, warn};

use crate::compass::CompassApi;
use crate::errors::BeaconError;
use crate::models::run::{DiscoveredInstallation, VerifiedInstallation};

/// Verify which discovered installations can receive notifications
///
/// Installations are deduplicated by cloud id, then each one is checked
/// for the target component. Zero discovered installations is fine (the
/// deployment proceeds silently); discovered-but-none-verified aborts the
/// run, because notifications were expected and none can be delivered.
pub async fn verify_installations(
    api: &dyn CompassApi,
    discovered: Vec<DiscoveredInstallation>,
    slug: &str,
) -> Result<Vec<VerifiedInstallation>, BeaconError> {
    if discovered.is_empty() {
        warn!("No installations found. Deployment will proceed without sending notifications.");
        return Ok(Vec::new());
    }

    let unique = dedupe_by_cloud_id(discovered);
    let mut verified = Vec::new();

    for installation in &unique {
        match api
            .lookup_component(&installation.site_url, &installation.cloud_id, slug)
            .await
        {
            Ok(Some(component_id)) => {
                info!("Component '{}' found in {}", slug, installation.site_url);
                verified.push(VerifiedInstallation {
                    site_url: installation.site_url.clone(),
                    cloud_id: installation.cloud_id.clone(),
                    component_id,
                    environment: installation.environment.clone(),
                });
            }
            Ok(None) => {
                warn!("Component '{}' not found in {}", slug, installation.site_url);
            }
            Err(e) => {
                warn!(
                    "Failed to verify component in {}: {}",
                    installation.site_url, e
                );
            }
        }
    }

    if verified.is_empty() {
        return Err(BeaconError::Verification(format!(
            "Found {} installation(s), but component '{}' could not be verified in any of them. \
             Cannot proceed: notifications cannot be sent to existing installations.",
            unique.len(),
            slug
        )));
    }

    Ok(verified)
}

/// Drop duplicate cloud ids, keeping the first occurrence
fn dedupe_by_cloud_id(installations: Vec<DiscoveredInstallation>) -> Vec<DiscoveredInstallation> {
    let mut seen = HashSet::new();
    installations
        .into_iter()
        .filter(|installation| seen.insert(installation.cloud_id.clone()))
        .collect()
}

//! Forge CLI subprocess driver

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::errors::BeaconError;
use crate::forge::{ForgeDriver, ForgeUser};
use crate::models::run::DiscoveredInstallation;
use crate::utils::{calc_linear_backoff, clean_site_url, ensure_https_base};

/// Options for the web trigger lookup retry loop
///
/// Web triggers can take a moment to propagate after a deploy, so the
/// lookup retries with linearly growing waits before giving up.
#[derive(Debug, Clone)]
pub struct WebTriggerOptions {
    pub max_attempts: u32,
    pub backoff_step: Duration,
}

impl Default for WebTriggerOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_step: Duration::from_secs(2),
        }
    }
}

/// Entry from `forge install list --json`
#[derive(Debug, Deserialize)]
struct InstallEntry {
    site: String,
    #[serde(default)]
    environment: Option<String>,
}

struct CommandOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

/// Drives the local `forge` binary and tenant-info lookups
pub struct ForgeCli {
    tenant_client: Client,
    webtrigger: WebTriggerOptions,
}

impl ForgeCli {
    pub fn new() -> Result<Self, BeaconError> {
        Self::with_options(WebTriggerOptions::default())
    }

    pub fn with_options(webtrigger: WebTriggerOptions) -> Result<Self, BeaconError> {
        let tenant_client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            tenant_client,
            webtrigger,
        })
    }

    async fn run_forge(&self, args: &[&str]) -> Result<CommandOutput, BeaconError> {
        debug!("Running forge {}", args.join(" "));

        let output = Command::new("forge").args(args).output().await.map_err(|e| {
            BeaconError::Deploy(format!("Failed to run forge {}: {}", args.join(" "), e))
        })?;

        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }

    /// Resolve the tenant cloud id for a site
    async fn cloud_id(&self, site_url: &str) -> Result<String, BeaconError> {
        let tenant_info_url = format!("{}_edge/tenant_info", ensure_https_base(site_url));
        debug!("GET {}", tenant_info_url);

        let response = self.tenant_client.get(&tenant_info_url).send().await?;
        if !response.status().is_success() {
            return Err(BeaconError::Discovery(format!(
                "tenant info request to {} returned {}",
                tenant_info_url,
                response.status()
            )));
        }

        let body: Value = response.json().await?;
        body.get("cloudId")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| {
                BeaconError::Discovery(format!("no cloudId in response from {}", tenant_info_url))
            })
    }
}

#[async_trait]
impl ForgeDriver for ForgeCli {
    async fn list_installations(&self) -> Result<Vec<DiscoveredInstallation>, BeaconError> {
        let output = match self.run_forge(&["install", "list", "--json"]).await {
            Ok(output) => output,
            Err(e) => {
                warn!("Failed to list forge installations: {}", e);
                return Ok(Vec::new());
            }
        };
        if !output.success {
            warn!("Failed to list forge installations: {}", output.stderr);
            return Ok(Vec::new());
        }

        let entries: Vec<InstallEntry> = match serde_json::from_str(&output.stdout) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to parse forge installations JSON: {}", e);
                return Ok(Vec::new());
            }
        };

        let mut installations = Vec::new();
        for entry in entries {
            match self.cloud_id(&entry.site).await {
                Ok(cloud_id) => installations.push(DiscoveredInstallation {
                    site_url: entry.site,
                    cloud_id,
                    environment: entry.environment.unwrap_or_else(|| "unknown".to_string()),
                }),
                Err(e) => warn!("Error fetching cloud id for {}: {}", entry.site, e),
            }
        }

        Ok(installations)
    }

    async fn whoami(&self) -> Result<ForgeUser, BeaconError> {
        let output = self.run_forge(&["whoami"]).await.map_err(|_| {
            BeaconError::Config(
                "Failed to execute \"forge whoami\". Ensure the Forge CLI is installed and run \
                 \"forge login\" to authenticate."
                    .to_string(),
            )
        })?;
        if !output.success {
            return Err(BeaconError::Config(
                "Failed to execute \"forge whoami\". Ensure the Forge CLI is installed and run \
                 \"forge login\" to authenticate."
                    .to_string(),
            ));
        }

        let mut user = String::new();
        let mut account_id = String::new();
        for line in output.stdout.lines() {
            if let Some(rest) = line.strip_prefix("Logged in as:") {
                user = rest.trim().to_string();
            } else if let Some(rest) = line.strip_prefix("Logged in as ") {
                user = rest.trim().to_string();
            } else if let Some(rest) = line.strip_prefix("Account ID:") {
                account_id = rest.trim().to_string();
            }
        }

        if user.is_empty() || account_id.is_empty() {
            return Err(BeaconError::Config(
                "Unable to get valid user information from the Forge CLI. Run \"forge login\" to \
                 authenticate."
                    .to_string(),
            ));
        }

        Ok(ForgeUser { user, account_id })
    }

    async fn deploy(&self, environment: &str) -> Result<Option<String>, BeaconError> {
        info!("Running forge deploy...");

        let output = self
            .run_forge(&["deploy", "--environment", environment])
            .await?;

        if !output.stdout.is_empty() {
            println!("{}", output.stdout);
        }
        if !output.stderr.is_empty() {
            eprintln!("{}", output.stderr);
        }

        let combined = format!("{}\n{}", output.stdout, output.stderr);
        let version = extract_version(&combined);
        match &version {
            Some(v) => info!("Detected deployed version: {}", v),
            None => warn!("Could not extract version from forge deploy output"),
        }

        if !output.success {
            return Err(BeaconError::Deploy("forge deploy command failed".to_string()));
        }

        Ok(version)
    }

    async fn webtrigger_url(
        &self,
        trigger_key: &str,
        site_url: &str,
        environment: &str,
    ) -> Result<Option<String>, BeaconError> {
        let clean_site = clean_site_url(site_url);

        for attempt in 0..self.webtrigger.max_attempts {
            if attempt > 0 {
                let wait = calc_linear_backoff(self.webtrigger.backoff_step, attempt);
                info!(
                    "Retrying web trigger lookup in {:?} (attempt {}/{})",
                    wait,
                    attempt + 1,
                    self.webtrigger.max_attempts
                );
                tokio::time::sleep(wait).await;
            }

            let output = match self
                .run_forge(&[
                    "webtrigger", "list", "-f", trigger_key, "-e", environment, "-s", &clean_site,
                    "-p", "Compass",
                ])
                .await
            {
                Ok(output) => output,
                Err(e) => {
                    debug!("forge webtrigger list failed: {}", e);
                    continue;
                }
            };

            if !output.success {
                debug!("forge webtrigger list failed: {}", output.stderr);
                continue;
            }
            if output.stdout.contains("No webtrigger URLs created") {
                continue;
            }

            if let Some(url) = extract_https_url(&output.stdout) {
                if attempt > 0 {
                    info!("Found web trigger URL on attempt {}: {}", attempt + 1, url);
                }
                return Ok(Some(url));
            }
        }

        warn!(
            "Web trigger {} not found - it may not be deployed yet",
            trigger_key
        );
        Ok(None)
    }
}

/// Scrape the deployed version from forge deploy output
///
/// The CLI reports it in messages like
/// `The version of your app [23.27.0] that was just deployed`.
fn extract_version(output: &str) -> Option<String> {
    let mut rest = output;
    while let Some(start) = rest.find('[') {
        let tail = &rest[start + 1..];
        let Some(end) = tail.find(']') else {
            break;
        };
        let candidate = &tail[..end];
        if is_version(candidate) {
            return Some(candidate.to_string());
        }
        rest = &tail[end + 1..];
    }
    None
}

fn is_version(s: &str) -> bool {
    let parts: Vec<&str> = s.split('.').collect();
    parts.len() == 3
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()))
}

/// First https URL found in table-ish CLI output
fn extract_https_url(output: &str) -> Option<String> {
    for line in output.lines() {
        if let Some(idx) = line.find("https://") {
            if let Some(url) = line[idx..].split_whitespace().next() {
                return Some(url.to_string());
            }
        }
    }
    None
}

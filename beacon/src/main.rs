//! Beacon - Entry Point
//!
//! Wraps a local Forge deployment and keeps Compass informed through
//! idempotent deployment state-transition events.

use std::collections::HashMap;
use std::env;

use tracing::error;

use beacon::app::options::AppOptions;
use beacon::app::run::{run, RunStatus};
use beacon::logs::{init_logging, LogOptions};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut flags: HashMap<String, String> = HashMap::new();
    let mut positional: Vec<String> = Vec::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            flags.insert(key.trim_start_matches('-').to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --dry-run
            flags.insert(arg.trim_start_matches('-').to_string(), "true".to_string());
        } else {
            positional.push(arg.clone());
        }
    }

    if flags.contains_key("version") {
        println!("beacon {}", env!("CARGO_PKG_VERSION"));
        return;
    }
    if flags.contains_key("help") {
        print_usage();
        return;
    }

    let Some(environment) = positional.first().cloned() else {
        print_usage();
        std::process::exit(1);
    };

    // Initialize logging
    let log_level = flags
        .get("log-level")
        .and_then(|value| value.parse().ok())
        .unwrap_or_default();
    if let Err(e) = init_logging(LogOptions { log_level }) {
        println!("Failed to initialize logging: {e}");
    }

    let options = AppOptions {
        environment,
        dry_run: flags.contains_key("dry-run"),
        ..Default::default()
    };

    match run(&options).await {
        Ok(RunStatus::Success) => {}
        Ok(RunStatus::NotificationWarnings) => {
            // The deployment itself succeeded; exit distinct from a
            // deployment failure so callers can tell them apart
            std::process::exit(2);
        }
        Err(e) => {
            error!("Deployment failed: {e}");
            eprintln!("\n[ERROR] Deployment failed: {e}");
            std::process::exit(1);
        }
    }
}

fn print_usage() {
    println!("beacon - local deployment notifier for Atlassian Compass");
    println!();
    println!("Usage: beacon <environment> [--dry-run] [--log-level=<level>]");
    println!();
    println!("  <environment>        development, staging, production, ...");
    println!("  --dry-run            print intended actions without deploying");
    println!("  --log-level=<level>  trace, debug, info, warn, error");
    println!("  --version            print version and exit");
    println!();
    println!("Required environment variables:");
    println!("  ATLASSIAN_USER_EMAIL    Atlassian account email");
    println!("  ATLASSIAN_USER_API_KEY  Atlassian API token");
}

//! Fleetcheck - Entry Point
//!
//! Runs a catalog of state checks against an inventory of network devices
//! and prints the aggregated results as JSON.

use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use std::time::Duration;

use fleetcheck::checks::{self, Check};
use fleetcheck::inventory::Inventory;
use fleetcheck::logs::{init_logging, LogOptions};
use fleetcheck::report::ResultStore;
use fleetcheck::runner::{Runner, RunnerSettings};

use tracing::error;

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    if cli_args.contains_key("version") {
        println!("fleetcheck {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    // Initialize logging
    let log_options = LogOptions {
        log_level: cli_args
            .get("log-level")
            .and_then(|v| v.parse().ok())
            .unwrap_or_default(),
        json_format: cli_args.contains_key("log-json"),
        ..Default::default()
    };
    if let Err(e) = init_logging(log_options) {
        println!("Failed to initialize logging: {e}");
    }

    // Load the inventory
    let Some(inventory_path) = cli_args.get("inventory") else {
        error!("Usage: fleetcheck --inventory=<path> [--tags=a,b] [--established-only] [--timeout-secs=N] [--nested]");
        std::process::exit(2);
    };
    let devices = match Inventory::load(inventory_path).and_then(Inventory::into_devices) {
        Ok(devices) => devices,
        Err(e) => {
            error!("Unable to load inventory: {}", e);
            std::process::exit(2);
        }
    };

    // Build the check catalog
    let mut catalog: Vec<Arc<dyn Check>> = checks::default_catalog();
    if let Some(minimum) = cli_args.get("min-uptime-secs").and_then(|v| v.parse().ok()) {
        match checks::system::VerifyUptime::new(minimum) {
            Ok(check) => catalog.push(Arc::new(check)),
            Err(e) => {
                error!("Invalid --min-uptime-secs: {}", e);
                std::process::exit(2);
            }
        }
    }
    if let Some(versions) = cli_args.get("expect-version") {
        let versions = versions.split(',').map(str::to_string).collect();
        match checks::software::VerifyEosVersion::new(versions) {
            Ok(check) => catalog.push(Arc::new(check)),
            Err(e) => {
                error!("Invalid --expect-version: {}", e);
                std::process::exit(2);
            }
        }
    }

    let settings = RunnerSettings {
        established_only: cli_args.contains_key("established-only"),
        tags: cli_args
            .get("tags")
            .map(|tags| tags.split(',').map(str::to_string).collect()),
        overall_timeout: cli_args
            .get("timeout-secs")
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs),
        ..Default::default()
    };

    // Run the catalog and print the report
    let store = Arc::new(ResultStore::new());
    let runner = Runner::new(settings);
    if let Err(e) = runner.run(devices, catalog, Arc::clone(&store)).await {
        error!("Run failed: {}", e);
        std::process::exit(1);
    }

    let report = if cli_args.contains_key("nested") {
        store.nested()
    } else {
        serde_json::json!({
            "results": store.flat(),
            "devices": store.device_summary(),
            "checks": store.check_summary(),
        })
    };
    match serde_json::to_string_pretty(&report) {
        Ok(rendered) => println!("{}", rendered),
        Err(e) => error!("Unable to render report: {}", e),
    }
}

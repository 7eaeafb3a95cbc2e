use anyhow::Result;

use crate::config::WorkerConfig;
use crate::core::container::DockerCli;
use crate::core::store::SiloStore;
use crate::core::terminal::{print_error, print_info, print_success};
use crate::core::workflow::EngineEndpoint;

/// Check what the worker needs before it can run connectors. Returns `true`
/// when every check passed.
pub async fn run_doctor(config: &WorkerConfig) -> Result<bool> {
    print_info("Checking worker dependencies...");
    println!();
    let mut healthy = true;

    match DockerCli::connect(config.container.clone()).await {
        Ok(_) => print_success(&format!(
            "Container runtime '{}' is reachable",
            config.container.runtime_binary
        )),
        Err(e) => {
            print_error(&format!("Container runtime unavailable: {}", e));
            healthy = false;
        }
    }

    match SiloStore::open(config.store_path()).await {
        Ok(store) => {
            let silos = store.count_silo_definitions().await.unwrap_or(0);
            print_success(&format!(
                "Store at {} is writable ({} silo definitions)",
                config.store_path().display(),
                silos
            ));
        }
        Err(e) => {
            print_error(&format!("Store unavailable: {}", e));
            healthy = false;
        }
    }

    match EngineEndpoint::parse(&config.engine_endpoint()) {
        Ok(endpoint) => print_success(&format!("Workflow engine endpoint: {:?}", endpoint)),
        Err(e) => {
            print_error(&e.to_string());
            healthy = false;
        }
    }

    println!();
    if healthy {
        print_success("All checks passed.");
    } else {
        print_error("Some checks failed; the worker will not be able to run connectors.");
    }
    Ok(healthy)
}

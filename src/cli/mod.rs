mod doctor;
mod silo;
mod worker;

use anyhow::{Result, bail};
use console::style;
use std::path::PathBuf;

use crate::config::WorkerConfig;
use crate::core::review::{EntityKind, ReviewResult};
use crate::core::terminal::{self, GuideSection, print_error};
use crate::platform::{NativePlatform, Platform};

fn print_help() {
    terminal::print_banner();

    GuideSection::new("Worker")
        .command("worker", "Run the worker: HTTP control port and workflow engine")
        .command("doctor", "Check the container runtime, store and engine endpoint")
        .print();

    GuideSection::new("One-shot")
        .command("validate", "Check a connector configuration")
        .command("discover", "Detect the data sources of a saved silo")
        .command("review", "Approve or reject tentative properties or data sources")
        .print();

    GuideSection::new("Options")
        .status("worker", "--host <addr> --port <n>")
        .status("validate", "--image <image> --config <file.json> [--workspace <id>]")
        .status("discover", "--silo <id> --workspace <id>")
        .status(
            "review",
            "--kind property|data-source --ids a,b --result approve|reject",
        )
        .print();

    println!(
        "\n {} {} <command> [options]\n",
        style("Usage:").bold(),
        style(NativePlatform::binary_name()).green()
    );
}

/// Value following `args[i]`, if there is one.
fn flag_value(args: &[String], i: usize) -> Option<String> {
    args.get(i + 1).cloned()
}

pub(crate) fn parse_worker_flags(
    args: &[String],
    start: usize,
    mut host: String,
    mut port: u16,
) -> Result<(String, u16)> {
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--port" | "-p" => {
                if let Some(value) = flag_value(args, i) {
                    port = match value.parse() {
                        Ok(port) => port,
                        Err(_) => bail!("--port expects a port number, got '{}'", value),
                    };
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--host" => {
                if let Some(value) = flag_value(args, i) {
                    host = value;
                    i += 2;
                } else {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    Ok((host, port))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ValidateArgs {
    pub image: String,
    pub config_file: PathBuf,
    pub workspace: String,
}

pub(crate) fn parse_validate_flags(args: &[String], start: usize) -> Result<ValidateArgs> {
    let mut image = None;
    let mut config_file = None;
    let mut workspace = "default".to_string();
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--image" | "-i" => {
                if let Some(value) = flag_value(args, i) {
                    image = Some(value);
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--config" | "-c" => {
                if let Some(value) = flag_value(args, i) {
                    config_file = Some(PathBuf::from(value));
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--workspace" | "-w" => {
                if let Some(value) = flag_value(args, i) {
                    workspace = value;
                    i += 2;
                } else {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    match (image, config_file) {
        (Some(image), Some(config_file)) => Ok(ValidateArgs {
            image,
            config_file,
            workspace,
        }),
        _ => bail!("validate needs --image <image> and --config <file.json>"),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DiscoverArgs {
    pub silo: String,
    pub workspace: String,
}

pub(crate) fn parse_discover_flags(args: &[String], start: usize) -> Result<DiscoverArgs> {
    let mut silo = None;
    let mut workspace = None;
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--silo" | "-s" => {
                if let Some(value) = flag_value(args, i) {
                    silo = Some(value);
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--workspace" | "-w" => {
                if let Some(value) = flag_value(args, i) {
                    workspace = Some(value);
                    i += 2;
                } else {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    match (silo, workspace) {
        (Some(silo), Some(workspace)) => Ok(DiscoverArgs { silo, workspace }),
        _ => bail!("discover needs --silo <id> and --workspace <id>"),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ReviewArgs {
    pub kind: EntityKind,
    pub ids: Vec<String>,
    pub result: ReviewResult,
}

pub(crate) fn parse_review_flags(args: &[String], start: usize) -> Result<ReviewArgs> {
    let mut kind = None;
    let mut ids = Vec::new();
    let mut result = None;
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--kind" | "-k" => {
                if let Some(value) = flag_value(args, i) {
                    kind = match EntityKind::from_status(&value) {
                        Some(kind) => Some(kind),
                        None => bail!("unknown --kind '{}', expected property or data-source", value),
                    };
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--ids" => {
                if let Some(value) = flag_value(args, i) {
                    ids.extend(
                        value
                            .split(',')
                            .map(str::trim)
                            .filter(|id| !id.is_empty())
                            .map(str::to_string),
                    );
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--result" | "-r" => {
                if let Some(value) = flag_value(args, i) {
                    result = match ReviewResult::from_status(&value) {
                        Some(result) => Some(result),
                        None => bail!("unknown --result '{}', expected approve or reject", value),
                    };
                    i += 2;
                } else {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    match (kind, result) {
        (Some(kind), Some(result)) if !ids.is_empty() => Ok(ReviewArgs { kind, ids, result }),
        _ => bail!("review needs --kind, --ids and --result"),
    }
}

pub async fn run_main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let Some(cmd) = args.get(1).map(String::as_str) else {
        print_help();
        return Ok(());
    };

    match cmd {
        "worker" => {
            let log_tx = crate::logging::init(false);
            let mut config = WorkerConfig::load().await?;
            (config.server.host, config.server.port) =
                parse_worker_flags(&args, 2, config.server.host.clone(), config.server.port)?;
            worker::run_worker(config, log_tx).await
        }
        "validate" => {
            let parsed = parse_validate_flags(&args, 2)?;
            crate::logging::init(true);
            let config = WorkerConfig::load().await?;
            silo::run_validate(&config, &parsed).await
        }
        "discover" => {
            let parsed = parse_discover_flags(&args, 2)?;
            crate::logging::init(true);
            let config = WorkerConfig::load().await?;
            silo::run_discover(&config, &parsed).await
        }
        "review" => {
            let parsed = parse_review_flags(&args, 2)?;
            crate::logging::init(true);
            let config = WorkerConfig::load().await?;
            silo::run_review(&config, &parsed).await
        }
        "doctor" => {
            crate::logging::init(true);
            let config = WorkerConfig::load().await?;
            if !doctor::run_doctor(&config).await? {
                bail!("doctor found problems");
            }
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_help();
            Ok(())
        }
        _ => {
            print_error(&format!("Unknown command: {}", cmd));
            print_help();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn parse_worker_flags_reads_host_and_port() {
        let args = argv(&["silo-runner", "worker", "--host", "127.0.0.1", "--port", "9090"]);
        let (host, port) = parse_worker_flags(&args, 2, "0.0.0.0".to_string(), 8080).unwrap();
        assert_eq!(host, "127.0.0.1");
        assert_eq!(port, 9090);
    }

    #[test]
    fn parse_worker_flags_keeps_defaults_and_rejects_bad_port() {
        let args = argv(&["silo-runner", "worker"]);
        let (host, port) = parse_worker_flags(&args, 2, "0.0.0.0".to_string(), 8080).unwrap();
        assert_eq!((host.as_str(), port), ("0.0.0.0", 8080));

        let args = argv(&["silo-runner", "worker", "--port", "http"]);
        assert!(parse_worker_flags(&args, 2, "0.0.0.0".to_string(), 8080).is_err());
    }

    #[test]
    fn parse_validate_flags_requires_image_and_config() {
        let args = argv(&[
            "silo-runner",
            "validate",
            "--image",
            "connectors/pg:1.2",
            "--config",
            "pg.json",
        ]);
        let parsed = parse_validate_flags(&args, 2).unwrap();
        assert_eq!(parsed.image, "connectors/pg:1.2");
        assert_eq!(parsed.config_file, PathBuf::from("pg.json"));
        assert_eq!(parsed.workspace, "default");

        let args = argv(&["silo-runner", "validate", "--image", "connectors/pg"]);
        assert!(parse_validate_flags(&args, 2).is_err());
    }

    #[test]
    fn parse_discover_flags_reads_silo_and_workspace() {
        let args = argv(&["silo-runner", "discover", "-s", "silo-1", "--workspace", "ws1"]);
        let parsed = parse_discover_flags(&args, 2).unwrap();
        assert_eq!(
            parsed,
            DiscoverArgs {
                silo: "silo-1".to_string(),
                workspace: "ws1".to_string()
            }
        );
    }

    #[test]
    fn parse_review_flags_splits_ids() {
        let args = argv(&[
            "silo-runner",
            "review",
            "--kind",
            "data-source",
            "--ids",
            "a, b,,c",
            "--result",
            "reject",
        ]);
        let parsed = parse_review_flags(&args, 2).unwrap();
        assert_eq!(parsed.kind, EntityKind::DataSource);
        assert_eq!(parsed.ids, vec!["a", "b", "c"]);
        assert_eq!(parsed.result, ReviewResult::Reject);
    }

    #[test]
    fn parse_review_flags_rejects_unknown_values() {
        let args = argv(&[
            "silo-runner",
            "review",
            "--kind",
            "table",
            "--ids",
            "a",
            "--result",
            "approve",
        ]);
        assert!(parse_review_flags(&args, 2).is_err());

        let args = argv(&["silo-runner", "review", "--kind", "property", "--result", "approve"]);
        assert!(parse_review_flags(&args, 2).is_err());
    }
}

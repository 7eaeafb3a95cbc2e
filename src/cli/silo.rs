use anyhow::{Context, Result, bail};
use console::style;
use std::path::Path;

use crate::config::WorkerConfig;
use crate::core::activity::DiscoveredSchema;
use crate::core::review::{EntityKind, ReviewResult};
use crate::core::terminal::{GuideSection, print_error, print_success, print_warn};

use super::worker::build_service;
use super::{DiscoverArgs, ReviewArgs, ValidateArgs};

async fn read_config_file(path: &Path) -> Result<serde_json::Value> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read connector config {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Connector config {} is not valid JSON", path.display()))
}

pub async fn run_validate(config: &WorkerConfig, args: &ValidateArgs) -> Result<()> {
    let connector_config = read_config_file(&args.config_file).await?;
    let service = build_service(config).await?;
    let result = service
        .validate(&args.workspace, &args.image, &connector_config)
        .await?;
    service.engine().shutdown().await;

    let message = result.message.clone().unwrap_or_default();
    if result.is_success() {
        print_success(&format!("{} accepted the configuration", args.image));
        if !message.is_empty() {
            println!("  {}", style(message).dim());
        }
        Ok(())
    } else {
        print_error(&format!("{} rejected the configuration", args.image));
        bail!("{}", message)
    }
}

pub async fn run_discover(config: &WorkerConfig, args: &DiscoverArgs) -> Result<()> {
    let service = build_service(config).await?;
    let started = service
        .detect_silo_sources(&args.workspace, &args.silo)
        .await?;
    println!(
        "  Job {} started ({})",
        style(&started.job.id).bold(),
        started.workflow.workflow_id
    );
    let value = service.engine().result(&started.workflow.workflow_id).await;
    service.engine().shutdown().await;
    let discovered: DiscoveredSchema = serde_json::from_value(value?)?;

    let changes = discovered.changes;
    GuideSection::new("Discovery")
        .status("Schemas", &discovered.schemas.len().to_string())
        .status(
            "Data sources",
            &format!(
                "{} new, {} gone, {} back, {} removed",
                changes.data_sources.created,
                changes.data_sources.deleted,
                changes.data_sources.restored,
                changes.data_sources.removed
            ),
        )
        .status(
            "Properties",
            &format!(
                "{} new, {} gone, {} back, {} removed",
                changes.properties.created,
                changes.properties.deleted,
                changes.properties.restored,
                changes.properties.removed
            ),
        )
        .print();
    println!();
    if changes.is_empty() {
        print_warn("Nothing changed since the last discovery.");
    } else {
        print_success("Changes are waiting for review.");
    }
    Ok(())
}

pub async fn run_review(config: &WorkerConfig, args: &ReviewArgs) -> Result<()> {
    let service = build_service(config).await?;
    let plan = service.review(args.kind, &args.ids, args.result).await;
    service.engine().shutdown().await;
    let plan = plan?;
    print_success(&format!(
        "{} {}: {} committed, {} deleted",
        review_verb(args.result),
        kind_label(args.kind, args.ids.len()),
        plan.commit.len(),
        plan.delete.len()
    ));
    Ok(())
}

fn review_verb(result: ReviewResult) -> &'static str {
    match result {
        ReviewResult::Approve => "Approved",
        ReviewResult::Reject => "Rejected",
    }
}

fn kind_label(kind: EntityKind, n: usize) -> String {
    let noun = match (kind, n) {
        (EntityKind::Property, 1) => "property",
        (EntityKind::Property, _) => "properties",
        (EntityKind::DataSource, 1) => "data source",
        (EntityKind::DataSource, _) => "data sources",
    };
    format!("{} {}", n, noun)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_pluralize() {
        assert_eq!(kind_label(EntityKind::Property, 1), "1 property");
        assert_eq!(kind_label(EntityKind::DataSource, 3), "3 data sources");
    }

    #[tokio::test]
    async fn config_file_must_be_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "host = db").unwrap();
        assert!(read_config_file(&path).await.is_err());

        std::fs::write(&path, r#"{"host": "db"}"#).unwrap();
        let value = read_config_file(&path).await.unwrap();
        assert_eq!(value["host"], "db");
    }
}

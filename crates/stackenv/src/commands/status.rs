//! Status command implementation
//!
//! Shows, per provider, which resources a push would create, update or delete.

use anyhow::{bail, Result};
use console::style;
use stackenv_core::context::{ExecutionInfo, RunContext};
use stackenv_core::meta::{FileMetaStore, MetaStore};
use stackenv_core::status::{FileProject, ProjectFacade, ResourceDefinition, ResourceRef};
use stackenv_core::IndexMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Status command arguments
#[derive(Debug, Clone)]
pub struct StatusArgs {
    pub project_dir: PathBuf,
    /// Limit the report to one configured provider
    pub provider: Option<String>,
    /// Print JSON instead of a table
    pub json: bool,
}

/// Execute the status command
#[instrument(skip_all, fields(project = %args.project_dir.display()))]
pub async fn execute_status(args: StatusArgs) -> Result<()> {
    let ctx = RunContext::load(&args.project_dir, ExecutionInfo::default())?;

    let providers: Vec<String> = match &args.provider {
        Some(provider) if ctx.providers().contains(provider) => vec![provider.clone()],
        Some(provider) => bail!(
            "Provider '{}' is not configured for this project (configured: {})",
            provider,
            ctx.providers().join(", ")
        ),
        None => ctx.providers().to_vec(),
    };

    let meta_store: Arc<dyn MetaStore> = Arc::new(FileMetaStore::new(&args.project_dir));
    let project = FileProject::new(meta_store);

    let mut report: IndexMap<String, ResourceDefinition> = IndexMap::new();
    for provider in providers {
        let definition = project.resource_status(&ctx, &provider).await?;
        debug!(
            "Provider '{}': {} resource(s), changes pending: {}",
            provider,
            definition.all_resources.len(),
            definition.has_changes()
        );
        report.insert(provider, definition);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_text(&ctx.env_name, &report));
    }
    Ok(())
}

fn render_text(env_name: &str, report: &IndexMap<String, ResourceDefinition>) -> String {
    let mut out = format!("Current environment: {}\n", env_name);
    for (provider, definition) in report {
        out.push_str(&format!("\nProvider: {}\n", style(provider).bold()));
        let rows = operation_rows(definition);
        if rows.is_empty() {
            out.push_str("  No resources\n");
            continue;
        }
        out.push_str(&format!(
            "  {:<12} {:<20} {:<24} {}\n",
            "Category", "Resource", "Operation", "Service"
        ));
        for (operation, resource) in rows {
            out.push_str(&format!(
                "  {:<12} {:<20} {:<24} {}\n",
                resource.category,
                resource.resource_name,
                operation,
                resource.service.as_deref().unwrap_or("-")
            ));
        }
    }
    out
}

fn operation_rows(definition: &ResourceDefinition) -> Vec<(&'static str, &ResourceRef)> {
    let groups: [(&'static str, &Vec<ResourceRef>); 4] = [
        ("Create", &definition.resources_to_be_created),
        ("Update", &definition.resources_to_be_updated),
        ("Delete", &definition.resources_to_be_deleted),
        ("No Change", &definition.resources_no_change),
    ];
    groups
        .into_iter()
        .flat_map(|(operation, resources)| resources.iter().map(move |r| (operation, r)))
        .collect()
}

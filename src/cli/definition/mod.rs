//! Definition commands - validate or publish workflow definition files

use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};
use tracing::{info, warn};

use crate::domain::definition::{
    lint_definition, parse_definition, DefinitionFormat, DefinitionWarning, WorkflowDefinition,
};
use crate::infrastructure::services::CreateVersionRequest;

#[derive(Subcommand, Debug)]
pub enum DefinitionCommand {
    /// Parse, validate and lint a definition file without storing it
    Validate(ValidateArgs),

    /// Append a definition file as a new version of its workflow
    Publish(PublishArgs),
}

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// YAML, TOML or JSON file; format follows the extension
    pub path: PathBuf,
}

#[derive(Args, Debug)]
pub struct PublishArgs {
    pub path: PathBuf,

    /// Make the new version the active one
    #[arg(long)]
    pub activate: bool,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(long)]
    pub created_by: Option<String>,
}

pub async fn run(command: DefinitionCommand) -> anyhow::Result<()> {
    let config = super::load_config();
    super::init_command_logging(&config);

    match command {
        DefinitionCommand::Validate(args) => {
            let (source, format) = read_source(&args.path).await?;
            let (definition, warnings) = check(&source, format)?;

            report_warnings(&warnings);
            println!(
                "{}: {} stages, {} transitions, {} warning(s)",
                definition.id(),
                definition.stages.len(),
                definition.transitions.len(),
                warnings.len()
            );
        }
        DefinitionCommand::Publish(args) => {
            let (source, format) = read_source(&args.path).await?;
            let services = crate::create_services(&config).await?;

            let published = services
                .versions
                .create_version(CreateVersionRequest {
                    source,
                    format,
                    activate: args.activate,
                    title: args.title,
                    created_by: args.created_by,
                    ..Default::default()
                })
                .await?;

            report_warnings(&published.warnings);
            info!(
                version_id = %published.version.id,
                workflow_id = %published.version.workflow_id,
                version = published.version.version,
                active = published.version.is_active,
                "Published workflow version"
            );
            println!("{}", serde_json::to_string_pretty(&published)?);
        }
    }

    Ok(())
}

async fn read_source(path: &Path) -> anyhow::Result<(String, DefinitionFormat)> {
    let source = tokio::fs::read_to_string(path).await?;
    let format = DefinitionFormat::from_path(&path.to_string_lossy());
    Ok((source, format))
}

fn check(
    source: &str,
    format: DefinitionFormat,
) -> anyhow::Result<(WorkflowDefinition, Vec<DefinitionWarning>)> {
    let definition = parse_definition(source, format)?;
    let warnings = lint_definition(&definition);
    Ok((definition, warnings))
}

fn report_warnings(warnings: &[DefinitionWarning]) {
    for warning in warnings {
        warn!(code = warning.code, from = %warning.from, "{}", warning.message);
    }
}

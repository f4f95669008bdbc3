use anyhow::{Context, Result};
use case_engine::actormodel::services::EngineServices;
use case_engine::actormodel::types::{ActorId, ActorType};
use case_engine::cmmn::repository::{DefinitionProvider, FileDefinitions, InMemoryDefinitions};
use case_engine::journal::file_store::FileJournal;
use case_engine::logging::init_tracing;
use case_engine::serialization::ManifestWrapper;
use case_engine::{CaseSystem, EngineConfig};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;

#[derive(Parser)]
#[command(name = "case-engine")]
#[command(about = "Event-sourced case management engine")]
#[command(version)]
#[command(arg_required_else_help = true)]
struct Cli {
    /// Engine configuration (YAML). Defaults to the embedded configuration.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Journal directory, overriding the configuration
    #[arg(long, global = true)]
    journal: Option<PathBuf>,

    /// Case definition directory, overriding the configuration
    #[arg(long, global = true)]
    definitions: Option<PathBuf>,

    /// Log as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Feed a JSONL file of wrapped commands through the engine and print
    /// one response per line
    Run {
        /// Input file, `-` for stdin
        input: PathBuf,
    },
    /// Recover one actor from the journal and print its state
    Replay {
        /// Actor family: case, tenant, consent_group, timer_service, board, process_task
        actor_type: String,
        actor_id: String,
    },
    /// Print the effective configuration
    Config,
}

fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default_config(),
    };
    if let Some(journal) = &cli.journal {
        config.journal.directory = Some(journal.clone());
    }
    if let Some(definitions) = &cli.definitions {
        config.definitions.directory = Some(definitions.clone());
    }
    config.validate()?;
    Ok(config)
}

async fn start_system(config: EngineConfig) -> Result<CaseSystem> {
    let journal_dir = config.journal_dir()?;
    let definitions: Arc<dyn DefinitionProvider> = match &config.definitions.directory {
        Some(dir) => Arc::new(FileDefinitions::new(dir)),
        None => Arc::new(InMemoryDefinitions::new()),
    };
    let services = EngineServices::new(config).with_definitions(definitions);
    tracing::info!(journal = %journal_dir.display(), "Starting case engine");
    let system = CaseSystem::start(services, Arc::new(FileJournal::new(journal_dir)))
        .await
        .context("Failed to start the case system")?;
    Ok(system)
}

async fn run_commands(system: &CaseSystem, input: &Path) -> Result<()> {
    let reader: Box<dyn tokio::io::AsyncRead + Unpin> = if input == Path::new("-") {
        Box::new(tokio::io::stdin())
    } else {
        Box::new(
            tokio::fs::File::open(input)
                .await
                .with_context(|| format!("Failed to open command file: {}", input.display()))?,
        )
    };
    let mut lines = tokio::io::BufReader::new(reader).lines();
    let mut line_number = 0usize;
    while let Some(line) = lines.next_line().await? {
        line_number += 1;
        if line.trim().is_empty() {
            continue;
        }
        let message: ManifestWrapper = serde_json::from_str(&line)
            .with_context(|| format!("Line {} is not a wrapped message", line_number))?;
        let response = system
            .ask(message)
            .await
            .with_context(|| format!("Line {} could not be delivered", line_number))?;
        println!("{}", serde_json::to_string(&response)?);
    }
    Ok(())
}

async fn replay(system: &CaseSystem, actor_type: &str, actor_id: &str) -> Result<()> {
    let actor_type: ActorType = serde_json::from_value(serde_json::Value::String(actor_type.to_string()))
        .with_context(|| format!("Unknown actor type '{}'", actor_type))?;
    let inspection = system.inspect(actor_type, &ActorId::from(actor_id)).await?;
    let report = serde_json::json!({
        "actor_id": inspection.actor_id.as_str(),
        "actor_type": inspection.actor_type,
        "sequence": inspection.sequence,
        "broken": inspection.broken,
        "pending_requests": inspection.pending_requests,
        "state": inspection.state.to_json(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_tracing(&config.logging.filter, cli.json_logs);

    match &cli.command {
        Command::Config => {
            print!("{}", serde_yaml::to_string(&config)?);
            Ok(())
        }
        Command::Run { input } => {
            let system = start_system(config).await?;
            let outcome = run_commands(&system, input).await;
            system.shutdown().await;
            outcome
        }
        Command::Replay { actor_type, actor_id } => {
            let system = start_system(config).await?;
            let outcome = replay(&system, actor_type, actor_id).await;
            system.shutdown().await;
            outcome
        }
    }
}

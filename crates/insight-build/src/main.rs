//! CLI entry point for the insight schema inference and graph builder.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{fmt, EnvFilter};

use insight_core::{GraphMappingModel, Table, ValidatedModel};
use insight_graph::{GraphClient, GraphConfig, GraphMutator, MemoryGraph};
use insight_infer::SchemaInference;

use insight_build::{load_tables, BuildConfig, CancellationHandle, ConstructionExecutor};

#[derive(Parser)]
#[command(name = "insight")]
#[command(about = "Infer a graph schema from tables and build the knowledge graph")]
struct Cli {
    /// Config file prefix (default: insight).
    #[arg(short, long, default_value = "insight", global = true)]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print column profiles and role assignments as JSON.
    Profile {
        /// CSV files, one table each.
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Infer a graph mapping and write it out.
    Infer {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        #[arg(long, value_enum, default_value_t = Format::Json)]
        format: Format,

        /// Write to this file instead of stdout.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Validate a mapping and construct the graph.
    Build {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Mapping file (JSON or YAML). Inferred from the input when omitted.
        #[arg(short, long)]
        mapping: Option<PathBuf>,

        /// Build into an in-memory graph instead of Neo4j.
        #[arg(long)]
        dry_run: bool,

        /// Delete the existing graph first.
        #[arg(long)]
        clear: bool,

        #[arg(long)]
        batch_size: Option<usize>,

        /// Write entity types concurrently.
        #[arg(long)]
        parallel: bool,
    },

    /// Print node and relationship counts from Neo4j.
    Stats,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Yaml,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();
    let cfg = insight_core::config::load(&cli.config)?;

    match cli.command {
        Command::Profile { files } => {
            let tables = load_tables(&files)?;
            let inference = SchemaInference::from_config(&cfg)?;
            let profiles = inference.profile(&tables);
            let classification = inference.classify_tables(&profiles, &tables);
            let output = serde_json::json!({
                "profiles": profiles,
                "classification": classification,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Command::Infer { files, format, out } => {
            let tables = load_tables(&files)?;
            let outcome = SchemaInference::from_config(&cfg)?.run(&tables);
            for unmapped in &outcome.unmapped_tables {
                tracing::warn!(
                    table = %unmapped.table,
                    reason = %unmapped.reason,
                    "Table not mapped"
                );
            }
            for key in &outcome.unresolved_keys {
                tracing::warn!(
                    table = %key.table,
                    column = %key.column,
                    reason = %key.reason,
                    "Relationship key not linked"
                );
            }

            let rendered = match format {
                Format::Json => outcome.model.to_json()?,
                Format::Yaml => outcome.model.to_yaml()?,
            };
            match out {
                Some(path) => {
                    std::fs::write(&path, rendered)?;
                    tracing::info!(path = %path.display(), "Mapping written");
                }
                None => println!("{rendered}"),
            }
        }
        Command::Build {
            files,
            mapping,
            dry_run,
            clear,
            batch_size,
            parallel,
        } => {
            let tables = load_tables(&files)?;
            let model = match mapping {
                Some(path) => read_mapping(&path)?,
                None => SchemaInference::from_config(&cfg)?.run(&tables).model,
            };
            let model = ValidatedModel::try_from(model)?;

            let mut build_config: BuildConfig = insight_core::config::section(&cfg, "build")?;
            let clear = clear || build_config.clear_before_build;
            let parallel = parallel || build_config.parallel_entities;
            build_config = build_config
                .with_clear_before_build(clear)
                .with_parallel_entities(parallel);
            if let Some(size) = batch_size {
                build_config = build_config.with_batch_size(size);
            }

            if dry_run {
                let graph = MemoryGraph::new();
                run_build(&graph, build_config, &model, &tables).await?;
            } else {
                let graph_config: GraphConfig = insight_core::config::section(&cfg, "neo4j")?;
                let graph = GraphClient::connect(&graph_config).await?;
                tracing::info!("Connected to Neo4j");
                run_build(&graph, build_config, &model, &tables).await?;
            }
        }
        Command::Stats => {
            let graph_config: GraphConfig = insight_core::config::section(&cfg, "neo4j")?;
            let graph = GraphClient::connect(&graph_config).await?;
            let stats = graph.graph_statistics().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }

    Ok(())
}

async fn run_build(
    graph: &dyn GraphMutator,
    config: BuildConfig,
    model: &ValidatedModel,
    tables: &[Table],
) -> anyhow::Result<()> {
    let (handle, cancel_rx) = CancellationHandle::new();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current batch");
            handle.cancel();
        }
    });

    let executor = ConstructionExecutor::new(graph, config).with_cancellation(cancel_rx);
    match executor.execute(model, tables).await {
        Ok(outcome) => {
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        }
        Err(e) => {
            if let Some(report) = e.report() {
                println!("{}", serde_json::to_string_pretty(report)?);
            }
            Err(e.into())
        }
    }
}

fn read_mapping(path: &Path) -> anyhow::Result<GraphMappingModel> {
    let contents = std::fs::read_to_string(path)?;
    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml" | "yml")
    );
    let model = if is_yaml {
        GraphMappingModel::from_yaml(&contents)?
    } else {
        GraphMappingModel::from_json(&contents)?
    };
    Ok(model)
}

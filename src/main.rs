use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::mpsc;

use agentflow_rs::agents::WorkflowError;
use agentflow_rs::flow::config::FlowConfig;
use agentflow_rs::flow::graph::{FlowGraph, PipelineExecutor, RunEvent};
use agentflow_rs::flow::loader::{PipelineDefinition, PipelineLoader};
use agentflow_rs::flow::server::{self, AppState};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the execution order of a pipeline file
    Order {
        /// Path to the pipeline file
        #[arg(short, long)]
        file: String,
    },
    /// Run a pipeline file against the agent service
    Run {
        /// Path to the pipeline file
        #[arg(short, long)]
        file: String,

        /// Input to the first step
        #[arg(short, long)]
        input: String,
    },
    /// Serve the graph, catalog and run API
    Serve {
        /// Port to listen on (defaults to AGENTFLOW_PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// Pipeline file to seed the catalog and graph from
        #[arg(short, long)]
        file: Option<String>,
    },
}

fn load(file: &str) -> anyhow::Result<(PipelineDefinition, FlowGraph)> {
    let def = PipelineLoader::new()
        .load_pipeline(file)
        .with_context(|| format!("loading pipeline {}", file))?;
    let graph = def.build_graph()?;
    log::info!(
        "Loaded pipeline '{}' with {} agents and {} edges",
        def.name,
        def.agents.len(),
        graph.edges().len()
    );
    Ok((def, graph))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    let config = FlowConfig::from_env()?;

    match args.command {
        Commands::Order { file } => {
            let (def, graph) = load(&file)?;
            let catalog = def.build_catalog().await?;
            let agents = catalog.snapshot().await;

            for id in graph.execution_order()? {
                match agents.get(id) {
                    Some(agent) => println!("{}\t{}\t{}", id, agent.kind.label(), agent.name),
                    None => println!("{}\t-\t(no agent)", id),
                }
            }
        }
        Commands::Run { file, input } => {
            let (def, graph) = load(&file)?;
            let agents = def.build_catalog().await?.snapshot().await;
            let steps = graph.ordered_agents(|id| agents.get(id).cloned())?;
            if steps.is_empty() {
                return Err(WorkflowError::EmptyPipeline.into());
            }

            let executor = PipelineExecutor::new(Arc::new(config.invoker()?));
            let (tx, rx) = mpsc::channel(config.event_buffer);
            let printer = tokio::spawn(print_events(rx));

            println!("Running pipeline: {}", def.name);
            let result = executor.run_stream(&steps, input, tx).await;
            printer.await?;

            match result {
                Ok(run) => {
                    println!("Output: {}", run.output.unwrap_or_default());
                }
                Err(failure) => {
                    for step in &failure.partial.results {
                        eprintln!("[partial] {}: {}", step.id, step.content);
                    }
                    return Err(failure.into());
                }
            }
        }
        Commands::Serve { port, file } => {
            let subscriber = tracing_subscriber::fmt().with_target(false).finish();
            if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
                log::warn!("Failed to install tracing subscriber: {}", e);
            }

            let (catalog, graph) = match file {
                Some(file) => {
                    let (def, graph) = load(&file)?;
                    (def.build_catalog().await?, graph)
                }
                None => (Default::default(), FlowGraph::new()),
            };

            let state = AppState::new(
                catalog,
                graph,
                Arc::new(config.invoker()?),
                config.event_buffer,
            );
            server::serve(state, port.unwrap_or(config.port)).await?;
        }
    }

    Ok(())
}

/// Print streamed step output as it arrives
async fn print_events(mut rx: mpsc::Receiver<RunEvent>) {
    let mut printed = 0;
    let mut stdout = std::io::stdout();

    while let Some(event) = rx.recv().await {
        match event {
            RunEvent::StepStarted { index, id, name } => {
                printed = 0;
                println!("\n[{}] {} ({})", index + 1, name, id);
            }
            RunEvent::StepDelta { content, .. } => {
                print!("{}", &content[printed..]);
                let _ = stdout.flush();
                printed = content.len();
            }
            RunEvent::StepCompleted { .. } => println!(),
            RunEvent::RunFailed { id, error } => eprintln!("\nStep {} failed: {}", id, error),
            RunEvent::RunStarted { .. } | RunEvent::RunCompleted { .. } => {}
        }
    }
}

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use serde_json::Value;
use tokenflow::base::broadcast::{LifecycleEvent, LifecycleEventType};
use tokenflow::base::instance::Payload;
use tokenflow::flow::config::EngineConfig;
use tokenflow::flow::definition::{AppLoader, CompiledFlow};
use tokenflow::flow::kernel::Kernel;

use std::time::Duration;
use tokio::sync::broadcast;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Engine config file (YAML)
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check an app definition and print its flows
    Validate {
        /// Path to the app file
        #[arg(short, long)]
        file: String,
    },
    /// Deploy an app and run one flow instance to completion
    Run {
        /// Path to the app file
        #[arg(short, long)]
        file: String,

        /// Flow to start
        #[arg(long)]
        flow: String,

        /// Input data as a JSON object
        #[arg(short, long)]
        input: Option<String>,

        /// Give up waiting after this many seconds
        #[arg(short, long, default_value_t = 30)]
        timeout_secs: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => EngineConfig::from_yaml_file(path)?,
        None => EngineConfig::default(),
    }
    .apply_env()?;

    match args.command {
        Commands::Validate { file } => {
            let app = AppLoader::new().load_app(&file)?;
            let compiled = CompiledFlow::compile_app(&app)?;
            println!("App '{}' is valid", app.id());
            for flow in compiled {
                println!(
                    "  {} ({}, starts at '{}', {} route edges)",
                    flow.metadata.flow_id,
                    flow.metadata.flow_type,
                    flow.start_id,
                    flow.edges.len()
                );
            }
        }
        Commands::Run {
            file,
            flow,
            input,
            timeout_secs,
        } => {
            if !config.publish_lifecycle_events {
                log::warn!("Lifecycle events are switched off; the outcome cannot be observed");
            }

            let app = AppLoader::new().load_app(&file)?;
            let input = input.as_deref().map(parse_input).transpose()?;

            let kernel = Kernel::builder().config(config).spawn().await?;
            let mut events = kernel.subscribe();
            kernel.deploy_app(&app).await?;

            println!("Running flow: {}", flow);
            let instance_id = kernel.start(app.id(), &flow, input).await?;

            let outcome = tokio::time::timeout(
                Duration::from_secs(timeout_secs),
                wait_for_outcome(&mut events),
            )
            .await
            .with_context(|| format!("No outcome after {}s", timeout_secs))??;

            match outcome.event_type {
                LifecycleEventType::Complete => println!("Completed"),
                _ => println!(
                    "Failed: {}",
                    outcome.cause.as_deref().unwrap_or("unknown cause")
                ),
            }

            if let Some(id) = instance_id {
                println!("Token trail of instance {}:", id);
                for vertex in kernel.token_trail(id).await? {
                    println!(
                        "  {:>4}  {:<24} {}",
                        vertex.id, vertex.flow_object_id, vertex.status
                    );
                }
            }
            kernel.shutdown();
        }
    }

    Ok(())
}

fn parse_input(raw: &str) -> anyhow::Result<Payload> {
    match serde_json::from_str::<Value>(raw).context("Input is not valid JSON")? {
        Value::Object(map) => Ok(map),
        other => Err(anyhow!("Input must be a JSON object, got {}", other)),
    }
}

/// First complete or fail event of a top-level instance
async fn wait_for_outcome(
    events: &mut broadcast::Receiver<LifecycleEvent>,
) -> anyhow::Result<LifecycleEvent> {
    loop {
        match events.recv().await {
            Ok(event)
                if event.is_top_level()
                    && matches!(
                        event.event_type,
                        LifecycleEventType::Complete | LifecycleEventType::Fail
                    ) =>
            {
                return Ok(event)
            }
            Ok(_) => continue,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                log::warn!("Missed {} lifecycle events", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => bail!("Lifecycle channel closed"),
        }
    }
}

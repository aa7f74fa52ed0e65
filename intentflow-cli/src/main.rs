//! IntentFlow CLI - route requests through the workflow engine

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use intentflow_core::prelude::*;

#[derive(Parser)]
#[command(name = "intentflow")]
#[command(about = "Intent routing for multi-step agent workflows", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to intentflow.toml plus INTENTFLOW_* env vars)
    #[arg(short, long, global = true, env = "INTENTFLOW_CONFIG_PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify a request and run the matching workflow
    Ask {
        /// Request text
        text: String,

        /// Session id attached to the request and its log lines. History is
        /// not kept between invocations.
        #[arg(short, long)]
        session: Option<String>,

        /// File whose contents are attached as `data` metadata
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Knowledge files; each blank-line separated paragraph is a passage
        #[arg(short, long)]
        knowledge: Vec<PathBuf>,

        /// Print the full response as JSON
        #[arg(long)]
        json: bool,
    },
    /// List intents, their executors and registered tools
    Intents,
    /// Handle a function-handler event from a file, or stdin with `-`
    Event {
        /// Event JSON file
        input: String,

        /// Knowledge files; each blank-line separated paragraph is a passage
        #[arg(short, long)]
        knowledge: Vec<PathBuf>,
    },
    /// Version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Version => {
            println!("intentflow {}", env!("CARGO_PKG_VERSION"));
            println!("intentflow-core {}", intentflow_core::VERSION);
        }
        Commands::Intents => {
            let config = load_config(cli.config.as_deref())?;
            let dispatcher = build_dispatcher(&config, &[])?;

            println!("classifier: {}", dispatcher.classifier_name());
            for (intent, executor) in dispatcher.routes().entries() {
                println!("\n{} - {}", intent, intent.description());
                println!("  executor: {}", executor.name());
                println!("  steps:    {}", executor.step_names().join(" -> "));
            }
            println!("\ntools:");
            for tool in dispatcher.services().tools.summaries() {
                println!("  {:<20} {}", tool.name, tool.description);
            }
        }
        Commands::Ask {
            text,
            session,
            data,
            knowledge,
            json,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let dispatcher = build_dispatcher(&config, &knowledge)?;

            let mut request = Request::new(text);
            if let Some(session) = session {
                request = request.with_session(session);
            }
            if let Some(path) = data {
                let contents = std::fs::read_to_string(&path)
                    .with_context(|| format!("reading data file {}", path.display()))?;
                let data = serde_json::from_str(&contents)
                    .unwrap_or(serde_json::Value::String(contents));
                request = request.with_metadata("data", data);
            }

            let response = dispatcher.dispatch(&request).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                print_response(&response);
            }
            if !response.is_success() {
                std::process::exit(1);
            }
        }
        Commands::Event { input, knowledge } => {
            let config = load_config(cli.config.as_deref())?;
            let dispatcher = build_dispatcher(&config, &knowledge)?;

            let raw = if input == "-" {
                let mut raw = String::new();
                std::io::stdin()
                    .read_to_string(&mut raw)
                    .context("reading event from stdin")?;
                raw
            } else {
                std::fs::read_to_string(&input)
                    .with_context(|| format!("reading event file {}", input))?
            };
            let event = serde_json::from_str(&raw).context("event is not valid JSON")?;

            let response = EventHandler::new(Arc::new(dispatcher))
                .handle_event(event)
                .await;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<IntentFlowConfig> {
    let config = match path {
        Some(path) => IntentFlowConfig::from_file(path)?,
        None => IntentFlowConfig::load()?,
    };
    Ok(config)
}

fn build_dispatcher(config: &IntentFlowConfig, knowledge: &[PathBuf]) -> Result<Dispatcher> {
    let model = ModelProviderFactory::from_config(config)?;

    let mut builder = Dispatcher::builder()
        .config(config)
        .model(model.clone())
        .tools(standard_tools(model, &config.tools)?)
        .routes(standard_routes()?);

    if config.model.provider.is_none() {
        tracing::info!("No model provider configured; classifying by keyword");
        builder = builder.classifier(KeywordIntentClassifier::standard());
    }

    if !knowledge.is_empty() {
        builder = builder.retriever(Arc::new(load_knowledge(knowledge)?));
    }

    Ok(builder.build()?)
}

fn load_knowledge(paths: &[PathBuf]) -> Result<InMemoryRetriever> {
    let mut passages = Vec::new();
    for path in paths {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading knowledge file {}", path.display()))?;
        let source = path.display().to_string();
        passages.extend(
            contents
                .split("\n\n")
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(|p| (p.to_string(), Some(source.clone()))),
        );
    }
    tracing::info!(passages = passages.len(), "Loaded knowledge passages");
    Ok(InMemoryRetriever::from_passages(passages))
}

fn print_response(response: &FinalResponse) {
    match (&response.payload, &response.reason) {
        (Some(Payload::Structured(value)), _) => {
            let pretty = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
            println!("{}", pretty);
        }
        (Some(payload), _) => println!("{}", payload.as_text()),
        (None, Some(reason)) => {
            eprintln!("[{}] {}", response.intent, reason);
            if let Some(step) = &response.failed_step {
                eprintln!("failed step: {}", step);
            }
            if response.retryable {
                eprintln!("the failure is transient; retrying may succeed");
            }
        }
        (None, None) => eprintln!("[{}] no result", response.intent),
    }
}

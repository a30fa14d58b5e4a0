// src/main.rs
use anyhow::Context;
use clap::Parser;
use log::{error, info, warn};
use statute_parser::utils::document_processor::{DocumentProcessor, OutputFormat};
use statute_parser::AppConfig;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "statute-parser")]
#[command(about = "Parse rendered statute documents into a hierarchical legal tree")]
#[command(version)]
struct CliArgs {
    /// Config file (default: $STATUTE_PARSER_CONFIG, then ./statute_parser.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Output file; stdout when omitted
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    #[arg(short, long, value_enum, default_value_t = OutputFormat::Xml)]
    format: OutputFormat,

    /// Documents parsed concurrently (overrides pipeline.max_concurrent_documents)
    #[arg(long)]
    concurrency: Option<usize>,

    /// Remote rendering worker HOST:PORT, repeatable (overrides workers.addresses)
    #[arg(long = "worker", value_name = "HOST:PORT")]
    workers: Vec<String>,

    /// .docx files or directories containing them
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = CliArgs::parse();

    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(concurrency) = args.concurrency {
        config.pipeline.max_concurrent_documents = concurrency;
    }
    if !args.workers.is_empty() {
        config.workers.addresses = args.workers.clone();
    }
    config.validate()?;

    let inputs = DocumentProcessor::collect_inputs(&args.inputs)?;
    if inputs.is_empty() {
        anyhow::bail!("no .docx documents found in the given inputs");
    }

    let processor = DocumentProcessor::new(config, args.format)?;
    let token = CancellationToken::new();

    let interrupt = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling run");
            interrupt.cancel();
        }
    });

    let output = args.output.clone();
    let run_token = token.clone();
    let result = tokio::task::spawn_blocking(move || {
        processor.process_documents(&inputs, output.as_deref(), &run_token)
    })
    .await
    .context("pipeline task panicked")?;

    match result {
        Ok(tree) => {
            info!(
                "✅ {} documents, {} nodes",
                tree.documents.len(),
                tree.iter().count()
            );
            Ok(())
        }
        Err(e) => {
            error!("❌ {:#}", e);
            Err(e)
        }
    }
}

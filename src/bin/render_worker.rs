use clap::Parser;
use log::{info, warn};
use statute_parser::worker_server;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "render-worker", about = "Render .docx documents into paragraph records over TCP")]
struct CliArgs {
    /// Address to listen on
    #[arg(long, short, env = "RENDER_WORKER_ADDR", default_value = "127.0.0.1:7070")]
    listen: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = CliArgs::parse();
    let listener = TcpListener::bind(&args.listen).await?;

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            warn!("Failed to install Ctrl+C handler");
            return;
        }
        info!("Shutdown signal received");
        signal.cancel();
    });

    worker_server::serve(listener, shutdown).await?;
    Ok(())
}

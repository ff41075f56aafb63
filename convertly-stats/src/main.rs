use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use convertly_stats::{consumer, http, Aggregator, Settings};

#[derive(Parser, Debug)]
#[command(name = "convertly-stats")]
#[command(about = "Aggregates conversion telemetry and serves the metrics rollup")]
struct Args {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// AMQP broker URL (overrides config)
    #[arg(long)]
    amqp_url: Option<String>,

    /// HTTP listen address (overrides config)
    #[arg(long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut settings = Settings::load(args.config.as_deref())?;
    if let Some(url) = args.amqp_url {
        settings.amqp_url = url;
    }
    if let Some(listen) = args.listen {
        settings.listen = listen;
    }

    let aggregator = Arc::new(Aggregator::new());

    // One shutdown signal for both the consumer loop and the HTTP server
    let (stop_tx, stop_rx) = watch::channel(false);
    let consumer_task = consumer::spawn(settings.consumer(), aggregator.clone(), stop_rx);

    let app = http::router(aggregator);
    let listener = tokio::net::TcpListener::bind(&settings.listen).await?;
    info!(addr = %settings.listen, amqp = %settings.amqp_url, "convertly-stats started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(stop_tx))
        .await?;

    // The consumer observed the same signal; wait for it to close cleanly
    let _ = consumer_task.await;
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal(stop_tx: watch::Sender<bool>) {
    let _ = tokio::signal::ctrl_c().await;
    info!("ctrl-c received, shutting down");
    let _ = stop_tx.send(true);
}

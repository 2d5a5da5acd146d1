use anyhow::{Context, Result};
use blocklist::{BlocklistMetrics, List, Poller};
use clap::Parser;
use config::Config;
use prometheus::Registry;
use std::sync::Arc;
use storage::{create_object_store, BackendReader};
use tokio::sync::broadcast;
use tracing::info;

mod http;
mod report;

/// Tenant blocklist poller
#[derive(Parser, Debug)]
#[command(name = "tempo-blocklist")]
#[command(about = "Keeps an in-memory blocklist of every tenant's blocks", long_about = None)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Poll the backend once, print a per-tenant summary and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Set RUST_LOG to control the log level, e.g. RUST_LOG=blocklist=debug
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
                .add_directive("hyper_util=error".parse()?),
        )
        .init();

    let args = Args::parse();

    let app_config = Config::load(args.config.as_deref())?;
    app_config.validate().context("Invalid configuration")?;

    info!(
        endpoint = %app_config.s3.endpoint,
        bucket = %app_config.s3.bucket,
        prefix = %app_config.s3.prefix,
        poll_interval_secs = app_config.blocklist.poll_interval_secs,
        replay_depth = app_config.blocklist.replay_depth,
        poll_concurrency = app_config.blocklist.poll_concurrency,
        "Loaded configuration"
    );

    let object_store = create_object_store(&app_config.s3)?;
    let reader = BackendReader::new(object_store, &app_config.s3.prefix);

    let registry = Registry::new();
    let metrics = BlocklistMetrics::new(&registry)?;
    let poller = Poller::new(reader, &app_config.blocklist).with_metrics(metrics);
    let list = Arc::new(List::with_replay_depth(app_config.blocklist.replay_depth));

    if args.once {
        poller
            .poll_and_apply(&list)
            .await
            .context("Failed to poll blocklist")?;
        println!("{}", report::render_table(&report::summarize(&list)));
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let poller_task = {
        let list = Arc::clone(&list);
        let interval = app_config.blocklist.poll_interval();
        tokio::spawn(async move { poller.run(list, interval, shutdown_rx).await })
    };

    let addr = app_config.server.listen_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(address = %addr, "HTTP server started");

    axum::serve(listener, http::create_router(Arc::clone(&list), registry))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await
        .context("HTTP server error")?;

    let _ = shutdown_tx.send(());
    poller_task.await.context("Poller task panicked")?;

    info!("tempo-blocklist stopped");
    Ok(())
}

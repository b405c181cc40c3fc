use activity_stream::config::Config;
use activity_stream::coordination::kv::RedisKvStore;
use activity_stream::coordination::{lock, KvStore};
use activity_stream::ingest::engine::IngestionEngine;
use activity_stream::metrics::Metrics;
use activity_stream::metrics_sampler::{MetricsSampler, METRICS_INTERVAL};
use activity_stream::search::gateway::SearchGateway;
use activity_stream::supervisor::{self, DEFAULT_SCHEDULE};
use activity_stream::{api, http_client};

use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Leader lock TTL. Must be >= 2x the renewal interval (§5, "Leader
/// uniqueness") — the renewer re-sets at `ttl / 2`, so this bounds the
/// double-leadership window to one renewal period.
const LOCK_TTL: Duration = Duration::from_secs(30);

#[derive(Parser, Debug)]
#[command(version, about = "Activity-stream ingestion and search service")]
struct Cli {
    /// Optional TOML file overlaid on top of the process environment.
    #[arg(long)]
    config: Option<String>,

    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default_directive = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = Config::load(cli.config.as_deref())?;
    let listen_addr: SocketAddr = config.listen_addr;

    let client = http_client::build_client()?;
    let kv: Arc<dyn KvStore> = Arc::new(RedisKvStore::connect(&config.redis_uri).await?);
    let gateway = Arc::new(SearchGateway::new(client.clone(), config.elasticsearch.clone()));
    let metrics = Arc::new(Metrics::new());

    let cancel = CancellationToken::new();

    let engine = Arc::new(IngestionEngine::new(
        gateway.clone(),
        kv.clone(),
        client.clone(),
        metrics.clone(),
        config.feeds.clone(),
    ));

    let lock_cancel = cancel.clone();
    let lock_kv = kv.clone();
    let leadership_handle = tokio::spawn(async move {
        let handle = lock::acquire_and_keep(lock_kv, LOCK_TTL, DEFAULT_SCHEDULE, lock_cancel).await;
        handle
    });

    let api_state = api::ApiState {
        incoming: Arc::new(config.incoming.clone()),
        kv: kv.clone(),
        gateway: gateway.clone(),
        metrics: metrics.clone(),
    };
    let app = api::router(api_state).into_make_service_with_connect_info::<SocketAddr>();

    let server_cancel = cancel.clone();
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    info!(%listen_addr, "read facade listening");
    let server_handle = tokio::spawn(async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            server_cancel.cancelled().await;
        });
        if let Err(e) = server.await {
            error!(error = %e, "http server exited with error");
        }
    });

    let lock_handle = leadership_handle.await?;
    info!("acquired leadership; starting ingestion engine and metrics sampler");

    if let Err(e) = engine.startup_gc().await {
        error!(error = %e, "startup garbage collection failed");
    }
    let ingest_handles = engine.clone().spawn(cancel.clone());

    let sampler = Arc::new(MetricsSampler::new(
        gateway.clone(),
        kv.clone(),
        metrics.clone(),
        config.feeds.clone(),
    ));
    let sampler_cancel = cancel.clone();
    let sampler_handle = tokio::spawn(async move {
        supervisor::repeat_until_cancelled("metrics-sampler", DEFAULT_SCHEDULE, sampler_cancel, move || {
            let sampler = sampler.clone();
            async move {
                sampler.sample_once().await?;
                tokio::time::sleep(METRICS_INTERVAL).await;
                Ok::<(), activity_stream::search::gateway::SearchError>(())
            }
        })
        .await;
    });

    shutdown_signal().await;
    info!("shutdown signal received, cancelling supervised tasks");
    cancel.cancel();

    for handle in ingest_handles {
        let _ = handle.await;
    }
    let _ = sampler_handle.await;
    let _ = server_handle.await;
    lock_handle.stop_renewing();

    // Quiescence window for in-flight I/O to settle before process exit (§5).
    tokio::time::sleep(Duration::from_millis(250)).await;

    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
        tokio::select! {
            _ = sigterm.recv() => {}
            _ = sigint.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

//! AsideCache Daemon - product service with a cache-aside layer over Redis

mod config;
mod handler;

use std::sync::Arc;

use anyhow::{Context, Result};
use asidecache::{AsideCache, CacheBackend, MemoryBackend, RedisBackend};
use clap::Parser;
use recordstore::{MemoryStore, Record};
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn};

use crate::config::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    // Health check
    if args.health {
        let target = args.bind.replace("0.0.0.0", "127.0.0.1");
        match TcpStream::connect(&target).await {
            Ok(_) => {
                println!("OK");
                std::process::exit(0);
            }
            Err(_) => {
                eprintln!("FAILED");
                std::process::exit(1);
            }
        }
    }

    info!("Starting AsideCache Daemon v{}", env!("CARGO_PKG_VERSION"));

    let store = Arc::new(open_store(&args)?);
    info!("Store ready with {} records", store.len());

    let config = args.cache_config();
    config.validate().context("invalid cache configuration")?;
    info!(
        ttl_secs = config.entry_ttl.as_secs(),
        popular_threshold = config.popular_threshold,
        sweep_interval_secs = config.sweep_interval.as_secs(),
        timeout_ms = config.backend_timeout.as_millis() as u64,
        prefix = %config.keys.prefix(),
        "Cache policy configured"
    );

    let backend: Arc<dyn CacheBackend> = if args.in_memory_cache {
        warn!("Using the in-process cache backend; cache is not shared between instances");
        Arc::new(MemoryBackend::new())
    } else {
        let url = args.redis_url();
        let redis = RedisBackend::connect(&url, config.backend_timeout)
            .await
            .with_context(|| format!("could not connect to Redis at {}", url))?;
        Arc::new(redis)
    };

    let cache = Arc::new(AsideCache::new(store, backend, config)?);

    let sweeper = cache.sweeper().spawn();

    let listener = TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("could not bind {}", args.bind))?;
    info!("Listening on {}", args.bind);

    let served = axum::serve(listener, handler::router(cache))
        .with_graceful_shutdown(shutdown_signal())
        .await;

    // Stop the sweeper even if the server failed
    sweeper.shutdown().await;
    served.context("HTTP server error")?;

    info!("Shutdown complete");
    Ok(())
}

fn open_store(args: &Args) -> Result<MemoryStore> {
    match &args.seed {
        Some(path) => MemoryStore::load_json(path)
            .with_context(|| format!("could not load seed file {}", path.display())),
        None => Ok(MemoryStore::with_records(default_records())?),
    }
}

/// Fixture catalogue used when no seed file is given
fn default_records() -> Vec<Record> {
    [(1, "Apple", 100), (2, "Banana", 50), (3, "Cherry", 200)]
        .into_iter()
        .map(|(id, name, price)| {
            Record::new(id)
                .with_attribute("name", name)
                .with_attribute("price", price)
        })
        .collect()
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Could not listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Could not listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Ctrl-C received, shutting down"),
        _ = terminate => info!("SIGTERM received, shutting down"),
    }
}

// Sluice server
// Decision: the queue is closed before the listener stops, so late requests
// get 503 instead of a dropped connection while the drain is in progress.

mod api;
mod config;

use std::time::Duration;

use anyhow::{Context, Result};
use sluice_core::{Service, WorkerPool};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api::AppState;
use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "sluice_server=info,sluice_core=info,tower_http=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env();
    tracing::info!(
        addr = %config.addr,
        workers = config.workers,
        queue_size = config.queue_size,
        backoff_base = ?config.backoff.base,
        backoff_cap = ?config.backoff.cap,
        "sluice-server starting"
    );

    let mut pool = WorkerPool::new(config.pool_config());
    if let Some(seed) = config.rng_seed {
        pool = pool.with_seed(seed);
    }
    let service = Service::start(config.queue_size, pool);

    let state = AppState {
        queue: service.queue().clone(),
        store: service.store().clone(),
    };
    let app = api::routes(state);

    let listener = TcpListener::bind(&config.addr)
        .await
        .with_context(|| format!("failed to bind {}", config.addr))?;
    tracing::info!(addr = %config.addr, "http server listening");

    let queue = service.queue().clone();
    let (signalled_tx, signalled_rx) = oneshot::channel();
    let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_signal().await;
        queue.close();
        tracing::info!("queue closed: rejecting new enqueues");
        let _ = signalled_tx.send(Instant::now());
    });

    // one deadline, counted from the signal, covers both the HTTP and the worker drain
    let (served, deadline) =
        serve_until_deadline(serve.into_future(), signalled_rx, config.shutdown_timeout).await;
    match &served {
        Some(Ok(())) => tracing::info!("http server shutdown complete"),
        Some(Err(e)) => tracing::error!(error = %e, "http server error"),
        None => tracing::warn!("http drain hit the shutdown deadline, dropping open connections"),
    }

    let remaining = deadline.saturating_duration_since(Instant::now());
    match service.shutdown(remaining).await {
        Ok(()) => tracing::info!("workers drained and stopped"),
        Err(e) => tracing::warn!(error = %e, "incomplete drain, workers stopped forcibly"),
    }

    tracing::info!("bye");
    match served {
        Some(result) => result.context("http server failed"),
        None => Ok(()),
    }
}

/// Drive `serve` to completion, but give up `timeout` after `signalled` fires.
///
/// Returns the server's output (`None` when the deadline cut it short) and the
/// shared shutdown deadline.
async fn serve_until_deadline<F: Future>(
    serve: F,
    signalled: oneshot::Receiver<Instant>,
    timeout: Duration,
) -> (Option<F::Output>, Instant) {
    let mut serve = std::pin::pin!(serve);
    tokio::select! {
        served = &mut serve => (Some(served), Instant::now() + timeout),
        Ok(at) = signalled => {
            let deadline = at + timeout;
            (tokio::time::timeout_at(deadline, &mut serve).await.ok(), deadline)
        }
    }
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl+C), initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}

//! Server lifecycle: bind, serve, and shut down in order
//!
//! On SIGINT or SIGTERM the listener stops accepting, in-flight requests get
//! `shutdown_timeout` to finish, tracked background tasks get
//! `drain_timeout`, and the rate limiter's sweeper is stopped last.

use std::{
    future::{Future, IntoFuture},
    io,
    net::SocketAddr,
    time::Duration,
};

use axum::Router;
use thiserror::Error;
use tokio::{net::TcpListener, signal, sync::watch};

use crate::state::AppState;

#[derive(Debug, Error)]
pub enum ShutdownSignalError {
    #[error("failed to install Ctrl+C handler: {0}")]
    CtrlC(#[source] io::Error),

    #[cfg(unix)]
    #[error("failed to install SIGTERM handler: {0}")]
    SigTerm(#[source] io::Error),
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("server error: {0}")]
    Io(#[from] io::Error),

    #[error("in-flight requests did not complete within {0:?}")]
    ShutdownTimeout(Duration),
}

/// Wait for SIGINT or SIGTERM and return the name of the signal received
pub async fn shutdown_signal() -> Result<&'static str, ShutdownSignalError> {
    let ctrl_c = async {
        signal::ctrl_c().await.map_err(ShutdownSignalError::CtrlC)?;
        Ok::<_, ShutdownSignalError>("SIGINT")
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .map_err(ShutdownSignalError::SigTerm)?
            .recv()
            .await;
        Ok::<_, ShutdownSignalError>("SIGTERM")
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Result<&'static str, ShutdownSignalError>>();

    tokio::select! {
        result = ctrl_c => result,
        result = terminate => result,
    }
}

/// Resolve once `signal` reports a shutdown signal.
///
/// If the handlers could not be installed the error is logged and the future
/// never resolves, leaving the server running until the process is killed.
pub async fn announce_shutdown<F>(signal: F)
where
    F: Future<Output = Result<&'static str, ShutdownSignalError>>,
{
    match signal.await {
        Ok(name) => tracing::info!(signal = name, "shutting down server"),
        Err(e) => {
            tracing::error!(error = %e, "signal handler unavailable, graceful shutdown disabled");
            std::future::pending::<()>().await;
        }
    }
}

/// Bind the configured address and serve until a shutdown signal arrives
pub async fn serve(state: AppState, router: Router) -> Result<(), ServerError> {
    let addr = state.config.bind_address.clone();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;

    serve_with_shutdown(listener, state, router, announce_shutdown(shutdown_signal())).await
}

/// Serve on `listener` until `signal` resolves, then shut down in order
pub async fn serve_with_shutdown<F>(
    listener: TcpListener,
    state: AppState,
    router: Router,
    signal: F,
) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send,
{
    let addr = listener.local_addr()?;
    let shutdown_timeout = state.config.shutdown_timeout;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = state.rate_limiter.spawn_sweeper(shutdown_rx.clone());

    let mut stop_accepting = shutdown_rx;
    let server = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = stop_accepting.wait_for(|stop| *stop).await;
    });
    let mut server = std::pin::pin!(server.into_future());

    tracing::info!(%addr, environment = %state.config.environment, "starting server");

    let served = tokio::select! {
        result = &mut server => result.map_err(ServerError::from),
        () = signal => {
            let _ = shutdown_tx.send(true);
            match tokio::time::timeout(shutdown_timeout, &mut server).await {
                Ok(result) => result.map_err(ServerError::from),
                Err(_) => Err(ServerError::ShutdownTimeout(shutdown_timeout)),
            }
        }
    };
    let _ = shutdown_tx.send(true);

    if let Err(e) = served {
        tracing::error!(error = %e, "server did not shut down cleanly");
        return Err(e);
    }

    tracing::info!(
        %addr,
        tasks = state.background.running(),
        "completing background tasks"
    );
    if let Err(abandoned) = state.background.drain(state.config.drain_timeout).await {
        tracing::warn!(
            abandoned,
            limit = ?state.config.drain_timeout,
            "abandoning background tasks that did not finish in time"
        );
    }

    if let Err(e) = sweeper.await {
        tracing::warn!(error = %e, "rate limiter sweeper ended abnormally");
    }

    tracing::info!(%addr, "stopped server");
    Ok(())
}

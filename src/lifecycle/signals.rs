//! OS signal handling.
//!
//! # Responsibilities
//! - Register handlers for SIGINT, SIGTERM, SIGQUIT and SIGHUP
//! - Resolve with the name of the first signal received
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - SIGHUP stops the process like the others; there is no reload
//! - A handler that fails to register is logged and skipped

/// Wait for the first termination signal.
#[cfg(unix)]
pub async fn terminate() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    let kinds = [
        (SignalKind::interrupt(), "SIGINT"),
        (SignalKind::terminate(), "SIGTERM"),
        (SignalKind::quit(), "SIGQUIT"),
        (SignalKind::hangup(), "SIGHUP"),
    ];

    let mut streams = Vec::with_capacity(kinds.len());
    for (kind, name) in kinds {
        match signal(kind) {
            Ok(stream) => streams.push((stream, name)),
            Err(e) => tracing::warn!(signal = name, error = %e, "Failed to install signal handler"),
        }
    }

    if streams.is_empty() {
        return ctrl_c().await;
    }

    let waits = streams.iter_mut().map(|(stream, name)| {
        Box::pin(async move {
            stream.recv().await;
            *name
        })
    });

    let (name, _, _) = futures::future::select_all(waits).await;
    tracing::info!(signal = name, "Termination signal received");
    name
}

/// Wait for Ctrl+C.
#[cfg(not(unix))]
pub async fn terminate() -> &'static str {
    ctrl_c().await
}

async fn ctrl_c() -> &'static str {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!(signal = "SIGINT", "Termination signal received");
            "SIGINT"
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending().await
        }
    }
}

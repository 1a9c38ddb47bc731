use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Cancels `cancellation` once the process is asked to stop. Returns early when something else
/// cancelled it first.
///
/// On Windows detached processes can't detect signals sent to them, so there only Ctrl-C works.
pub async fn detect_shutdown(cancellation: CancellationToken) {
    select! {
        _ = interrupt() => {
            info!("Received Ctrl-C, shutting down");
        },
        _ = terminate() => {
            info!("Received SIGTERM, shutting down");
        },
        _ = cancellation.cancelled() => return,
    };
    cancellation.cancel();
}

async fn interrupt() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Can't listen for Ctrl-C {e:?}");
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(e) => {
            error!("Can't listen for SIGTERM {e:?}");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}

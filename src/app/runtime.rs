use super::{ShutdownReason, SitefenceApp};
use crate::error::{Result, SitefenceError};
use std::future::Future;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::{oneshot, Mutex};
use tracing::{error, info};

impl SitefenceApp {
    /// Run until SIGINT or SIGTERM, then shut down gracefully
    pub async fn run(&mut self) -> Result<i32> {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Run until `work` completes or a shutdown signal arrives, whichever is first
    pub async fn run_until<F>(&mut self, work: F) -> Result<i32>
    where
        F: Future<Output = ()>,
    {
        info!("Sitefence is running");

        let shutdown_sender = self
            .shutdown_sender
            .take()
            .ok_or_else(|| SitefenceError::system("Shutdown sender already taken"))?;

        let shutdown_receiver = self
            .shutdown_receiver
            .take()
            .ok_or_else(|| SitefenceError::system("Shutdown receiver already taken"))?;

        self.setup_signal_handlers(shutdown_sender);

        let shutdown_reason = tokio::select! {
            reason = shutdown_receiver => reason
                .map_err(|_| SitefenceError::system("Shutdown channel closed unexpectedly"))?,
            _ = work => ShutdownReason::WorkFinished,
        };

        info!("Shutdown initiated: {:?}", shutdown_reason);
        let exit_code = self.shutdown().await?;

        info!("Sitefence shutdown complete");
        Ok(exit_code)
    }

    fn setup_signal_handlers(&self, shutdown_sender: oneshot::Sender<ShutdownReason>) {
        let shutdown_sender = Arc::new(Mutex::new(Some(shutdown_sender)));

        // SIGTERM (service manager stop) is Unix only
        #[cfg(unix)]
        {
            let shutdown_sender_sigterm = Arc::clone(&shutdown_sender);
            let cancel = self.cancellation_token.clone();
            tokio::spawn(async move {
                let mut sigterm =
                    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                        Ok(sigterm) => sigterm,
                        Err(e) => {
                            error!("Failed to register SIGTERM handler: {}", e);
                            return;
                        }
                    };

                tokio::select! {
                    _ = cancel.cancelled() => {}
                    Some(()) = sigterm.recv() => {
                        info!("Received SIGTERM signal");
                        if let Some(sender) = shutdown_sender_sigterm.lock().await.take() {
                            let _ = sender.send(ShutdownReason::Signal("SIGTERM".to_string()));
                        }
                    }
                }
            });
        }

        let shutdown_sender_sigint = Arc::clone(&shutdown_sender);
        let cancel = self.cancellation_token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                Ok(()) = signal::ctrl_c() => {
                    info!("Received SIGINT signal (Ctrl+C)");
                    if let Some(sender) = shutdown_sender_sigint.lock().await.take() {
                        let _ = sender.send(ShutdownReason::Signal("SIGINT".to_string()));
                    }
                }
            }
        });
    }
}

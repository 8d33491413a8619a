//! Periodic announcement of the service identity.
//!
//! The loop fires immediately, then once per period. Each tick spawns its
//! announce call so a slow directory never holds back the next tick.
//! Failures are logged and otherwise ignored.
//!
//! Shutting down stops the ticker, aborts announce calls still in flight and
//! waits for all of them to be gone. Dropping the [`AnnounceTask`] without
//! calling [`AnnounceTask::shutdown`] also ends the loop, just without the
//! wait.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;

use crate::directory::DirectoryClient;
use crate::error::Result;
use crate::server::ServiceIdentity;

/// Handle to a running announce loop.
pub(crate) struct AnnounceTask {
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl AnnounceTask {
    /// Spawn the loop. `period` must be non-zero.
    pub(crate) fn spawn(
        directory: Arc<dyn DirectoryClient>,
        identity: ServiceIdentity,
        period: Duration,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run(directory, identity, period, shutdown_rx));
        Self { shutdown_tx, task }
    }

    /// Stop the loop and wait until no announce call is left running.
    pub(crate) async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.task.await {
            tracing::error!("Announce loop ended abnormally: {}", e);
        }
    }
}

async fn run(
    directory: Arc<dyn DirectoryClient>,
    identity: ServiceIdentity,
    period: Duration,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut in_flight: JoinSet<Result<()>> = JoinSet::new();

    loop {
        tokio::select! {
            biased;

            // Fires on an explicit shutdown and when the handle is dropped
            _ = &mut shutdown_rx => break,

            _ = ticker.tick() => {
                let directory = directory.clone();
                let identity = identity.clone();
                in_flight.spawn(async move {
                    directory.announce(identity.service(), identity.port()).await
                });
            }

            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                log_outcome(&identity, joined);
            }
        }
    }

    in_flight.shutdown().await;
    tracing::debug!(
        service = identity.service(),
        port = identity.port(),
        "Announce loop stopped"
    );
}

fn log_outcome(
    identity: &ServiceIdentity,
    joined: std::result::Result<Result<()>, tokio::task::JoinError>,
) {
    match joined {
        Ok(Ok(())) => {
            tracing::debug!(
                service = identity.service(),
                port = identity.port(),
                "Announced"
            );
        }
        Ok(Err(e)) => {
            tracing::warn!(
                service = identity.service(),
                port = identity.port(),
                "Announce failed: {}",
                e
            );
        }
        Err(e) => {
            tracing::warn!(
                service = identity.service(),
                port = identity.port(),
                "Announce call aborted: {}",
                e
            );
        }
    }
}

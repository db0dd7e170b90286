//! Sync worker - applies queued writes to the durable store off the hot path
//!
//! The desk enqueues writes via [`SyncSender`] and never waits for them.
//! Each message is applied once; a failure is logged, counted and
//! published as a [`SyncFailure`] so a supervisor can alert or retry. Nothing
//! already applied (in memory or durably) is rolled back.

use crate::infra::metrics::Metrics;
use crate::io::remote::RemoteStore;
use crate::io::sync_channel::{create_sync_channel, SyncMessage, SyncQueues, SyncSender};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

pub use crate::io::sync_channel::SyncFailure;

pub struct SyncWorker {
    remote: Arc<dyn RemoteStore>,
    queues: SyncQueues,
    failures: mpsc::Sender<SyncFailure>,
    metrics: Arc<Metrics>,
}

impl SyncWorker {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        queues: SyncQueues,
        failures: mpsc::Sender<SyncFailure>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self { remote, queues, failures, metrics }
    }

    /// Run the worker, applying messages until every sender is dropped
    ///
    /// Record writes are taken ahead of package chunks whenever both wait.
    pub async fn run(mut self) {
        info!("sync_worker_started");

        let mut records_open = true;
        let mut bulk_open = true;

        while records_open || bulk_open {
            let msg = tokio::select! {
                biased;

                msg = self.queues.records.recv(), if records_open => match msg {
                    Some(msg) => msg,
                    None => {
                        records_open = false;
                        continue;
                    }
                },

                msg = self.queues.bulk.recv(), if bulk_open => match msg {
                    Some(msg) => msg,
                    None => {
                        bulk_open = false;
                        continue;
                    }
                },
            };
            self.apply(msg).await;
        }

        info!("sync_worker_stopped");
    }

    /// Apply one message; returns how many durable operations failed
    pub async fn apply(&self, msg: SyncMessage) -> usize {
        let start = Instant::now();
        let kind = msg.kind();
        let subject = msg.subject();

        let results: Vec<(&'static str, Option<String>, anyhow::Result<()>)> = match msg {
            SyncMessage::UpsertPackages { entries, .. } => {
                vec![(kind, subject, self.remote.upsert_packages(&entries).await)]
            }
            SyncMessage::ClearPackages => vec![(kind, None, self.remote.clear_packages().await)],
            SyncMessage::InsertScan(record) => {
                vec![(kind, subject, self.remote.insert_scan(&record).await)]
            }
            SyncMessage::SaveRoute(route) => {
                vec![(kind, subject, self.remote.save_route(&route).await)]
            }
            SyncMessage::DeleteRoute(id) => vec![(kind, subject, self.remote.delete_route(&id).await)],
            SyncMessage::SaveUser(user) => vec![(kind, subject, self.remote.save_user(&user).await)],
            SyncMessage::DeleteUser(id) => vec![(kind, subject, self.remote.delete_user(&id).await)],
            SyncMessage::ClearShift => {
                // Each table is cleared independently
                vec![
                    ("clear_scans", None, self.remote.clear_scans().await),
                    ("reset_route_completion", None, self.remote.reset_route_completion().await),
                ]
            }
        };

        let mut failed = 0;
        for (operation, subject, result) in results {
            match result {
                Ok(()) => self.metrics.record_sync_applied(),
                Err(e) => {
                    failed += 1;
                    self.report_failure(operation, subject, &e);
                }
            }
        }

        debug!(kind = %kind, failed = %failed, elapsed_us = %start.elapsed().as_micros(), "sync_applied");
        failed
    }

    fn report_failure(&self, operation: &'static str, subject: Option<String>, e: &anyhow::Error) {
        self.metrics.record_sync_failure();
        let error = format!("{:#}", e);
        error!(
            operation = %operation,
            subject = %subject.as_deref().unwrap_or("-"),
            error = %error,
            "sync_failed"
        );

        let failure = SyncFailure { operation, subject, error, at: Utc::now() };
        if self.failures.try_send(failure).is_err() {
            warn!(operation = %operation, "sync_failure_not_delivered");
        }
    }
}

/// Create the sync queues, worker and failure stream
///
/// Returns the sender (for the store), the worker (to be spawned) and the
/// receiver of failure events (for the supervising layer). Messages the
/// sender drops on a full queue arrive on the same failure stream.
pub fn create_sync_worker(
    remote: Arc<dyn RemoteStore>,
    metrics: Arc<Metrics>,
    buffer_size: usize,
) -> (SyncSender, SyncWorker, mpsc::Receiver<SyncFailure>) {
    let (sender, queues, failure_rx) = create_sync_channel(buffer_size, metrics.clone());
    let worker = SyncWorker::new(remote, queues, sender.failure_sender(), metrics);
    (sender, worker, failure_rx)
}

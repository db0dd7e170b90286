//! Typed channels for trailing durable writes
//!
//! The desk never waits on the durable store. Mutations are queued here
//! and applied by the sync worker. Package chunks travel on their own bulk
//! queue so a large import cannot crowd out scan records. A full queue
//! drops the message, counts it and publishes a [`SyncFailure`].

use crate::domain::scan::ScanRecord;
use crate::domain::types::{PackageEntry, Route, User};
use crate::infra::metrics::Metrics;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

/// Buffer for failure events awaiting a supervisor
const FAILURE_BUFFER: usize = 256;

/// Error text for messages that never reached the worker
pub const QUEUE_FULL: &str = "sync queue full";

/// A durable write that did not land
#[derive(Debug, Clone)]
pub struct SyncFailure {
    /// Which write failed (see [`SyncMessage::kind`])
    pub operation: &'static str,
    /// Record id, route/user id or chunk number, when there is one
    pub subject: Option<String>,
    pub error: String,
    pub at: DateTime<Utc>,
}

/// Writes queued for the durable store
#[derive(Debug, Clone, PartialEq)]
pub enum SyncMessage {
    /// One chunk of a package import
    UpsertPackages { chunk_no: usize, entries: Vec<PackageEntry> },
    /// End-of-shift package cleanup, ordered with the chunks
    ClearPackages,
    InsertScan(ScanRecord),
    SaveRoute(Route),
    DeleteRoute(String),
    SaveUser(User),
    DeleteUser(String),
    /// End-of-shift scan cleanup and route reopening
    ClearShift,
}

impl SyncMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            SyncMessage::UpsertPackages { .. } => "upsert_packages",
            SyncMessage::ClearPackages => "clear_packages",
            SyncMessage::InsertScan(_) => "insert_scan",
            SyncMessage::SaveRoute(_) => "save_route",
            SyncMessage::DeleteRoute(_) => "delete_route",
            SyncMessage::SaveUser(_) => "save_user",
            SyncMessage::DeleteUser(_) => "delete_user",
            SyncMessage::ClearShift => "clear_shift",
        }
    }

    /// What the write is about, for failure reports
    pub fn subject(&self) -> Option<String> {
        match self {
            SyncMessage::UpsertPackages { chunk_no, entries } => {
                Some(format!("chunk {} ({} packages)", chunk_no, entries.len()))
            }
            SyncMessage::InsertScan(record) => Some(record.id.clone()),
            SyncMessage::SaveRoute(route) => Some(route.id.clone()),
            SyncMessage::SaveUser(user) => Some(user.id.clone()),
            SyncMessage::DeleteRoute(id) | SyncMessage::DeleteUser(id) => Some(id.clone()),
            SyncMessage::ClearPackages | SyncMessage::ClearShift => None,
        }
    }

    /// Package traffic goes on the bulk queue
    fn is_bulk(&self) -> bool {
        matches!(self, SyncMessage::UpsertPackages { .. } | SyncMessage::ClearPackages)
    }
}

/// Receiving ends drained by the sync worker
pub struct SyncQueues {
    /// Scans, routes, users and shift cleanup
    pub records: mpsc::Receiver<SyncMessage>,
    /// Package chunks and package cleanup
    pub bulk: mpsc::Receiver<SyncMessage>,
}

impl SyncQueues {
    /// Take whatever is queued right now, records first
    pub fn drain_ready(&mut self) -> Vec<SyncMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = self.records.try_recv() {
            out.push(msg);
        }
        while let Ok(msg) = self.bulk.try_recv() {
            out.push(msg);
        }
        out
    }
}

/// Sender handle for sync messages
///
/// Clone this to share across producers. Non-blocking.
#[derive(Clone)]
pub struct SyncSender {
    records: mpsc::Sender<SyncMessage>,
    bulk: mpsc::Sender<SyncMessage>,
    failures: mpsc::Sender<SyncFailure>,
    metrics: Arc<Metrics>,
}

impl SyncSender {
    /// Queue a message; returns false if it was dropped
    pub fn send(&self, msg: SyncMessage) -> bool {
        let tx = if msg.is_bulk() { &self.bulk } else { &self.records };
        let kind = msg.kind();
        match tx.try_send(msg) {
            Ok(()) => true,
            Err(e) => {
                let (error, msg) = match e {
                    mpsc::error::TrySendError::Full(msg) => (QUEUE_FULL, msg),
                    mpsc::error::TrySendError::Closed(msg) => ("sync worker stopped", msg),
                };
                self.metrics.record_sync_dropped();
                warn!(kind = %kind, error = %error, "sync_message_dropped");
                self.report(SyncFailure {
                    operation: kind,
                    subject: msg.subject(),
                    error: error.to_string(),
                    at: Utc::now(),
                });
                false
            }
        }
    }

    /// Publish a failure for the supervising layer
    pub fn report(&self, failure: SyncFailure) {
        let operation = failure.operation;
        if self.failures.try_send(failure).is_err() {
            warn!(operation = %operation, "sync_failure_not_delivered");
        }
    }

    /// A handle for publishing failures without holding the queues open
    pub fn failure_sender(&self) -> mpsc::Sender<SyncFailure> {
        self.failures.clone()
    }

    /// Queue a package batch split into chunks; returns chunks queued
    pub fn upsert_packages(&self, batch: &[PackageEntry], chunk_size: usize) -> usize {
        let mut queued = 0;
        for (chunk_no, chunk) in batch.chunks(chunk_size.max(1)).enumerate() {
            if self.send(SyncMessage::UpsertPackages { chunk_no, entries: chunk.to_vec() }) {
                queued += 1;
            }
        }
        queued
    }

    pub fn insert_scan(&self, record: ScanRecord) -> bool {
        self.send(SyncMessage::InsertScan(record))
    }

    pub fn save_route(&self, route: Route) -> bool {
        self.send(SyncMessage::SaveRoute(route))
    }

    pub fn delete_route(&self, id: &str) -> bool {
        self.send(SyncMessage::DeleteRoute(id.to_string()))
    }

    pub fn save_user(&self, user: User) -> bool {
        self.send(SyncMessage::SaveUser(user))
    }

    pub fn delete_user(&self, id: &str) -> bool {
        self.send(SyncMessage::DeleteUser(id.to_string()))
    }

    /// End-of-shift cleanup on both queues; true if both were queued
    pub fn clear_daily(&self) -> bool {
        let shift = self.send(SyncMessage::ClearShift);
        let packages = self.send(SyncMessage::ClearPackages);
        shift && packages
    }
}

/// Create the sync queues and the failure stream
///
/// Both queues get `buffer_size` slots. The failure receiver also gets
/// failures reported by the worker when it is built from this sender.
pub fn create_sync_channel(
    buffer_size: usize,
    metrics: Arc<Metrics>,
) -> (SyncSender, SyncQueues, mpsc::Receiver<SyncFailure>) {
    let (records_tx, records_rx) = mpsc::channel(buffer_size.max(1));
    let (bulk_tx, bulk_rx) = mpsc::channel(buffer_size.max(1));
    let (failure_tx, failure_rx) = mpsc::channel(FAILURE_BUFFER);
    let sender = SyncSender { records: records_tx, bulk: bulk_tx, failures: failure_tx, metrics };
    (sender, SyncQueues { records: records_rx, bulk: bulk_rx }, failure_rx)
}

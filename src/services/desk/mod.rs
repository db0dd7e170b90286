//! Desk - the single-writer event loop around the scan store
//!
//! Everything that touches desk state goes through one task:
//! - Commands from the console (scans, imports, route and user edits)
//! - Records pushed by the durable store's realtime feed
//! - Failure events from the sync worker
//! - A periodic metrics tick

mod handlers;

use crate::domain::scan::ScanRecord;
use crate::domain::types::{Operator, PackageEntry, Route, User};
use crate::infra::metrics::Metrics;
use crate::services::error::{DeskError, StoreError};
use crate::services::evaluator::Verdict;
use crate::services::stats::{DashboardStats, OperatorStats, RouteProgress};
use crate::services::store::{ImportSummary, ScanStore};
use crate::services::sync_worker::SyncFailure;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{interval_at, Duration, Instant};
use tracing::{info, warn};

/// Sync failures kept for the `failures` view
const RECENT_FAILURES_CAP: usize = 50;

type Reply<T> = oneshot::Sender<T>;

/// Requests handled by the desk loop; each carries its reply channel
#[derive(Debug)]
pub enum DeskCommand {
    SignIn { operator: Operator, reply: Reply<()> },
    SignOut { reply: Reply<()> },
    Scan { code: String, route_id: Option<String>, manual: bool, reply: Reply<Result<Verdict, StoreError>> },
    AssignRoute { operator_id: String, route_id: Option<String>, reply: Reply<Result<(), StoreError>> },
    ImportPackages { entries: Vec<PackageEntry>, reply: Reply<ImportSummary> },
    ImportRoutes { routes: Vec<Route>, reply: Reply<Vec<Route>> },
    AddRoute { route: Route, reply: Reply<Result<Route, StoreError>> },
    UpdateRoute { route: Route, reply: Reply<Result<Route, StoreError>> },
    RemoveRoute { route_id: String, reply: Reply<Result<Route, StoreError>> },
    SetRouteCompleted { route_id: String, completed: bool, reply: Reply<Result<Route, StoreError>> },
    AddUser { user: User, reply: Reply<Result<(), StoreError>> },
    UpdateUser { user: User, reply: Reply<Result<(), StoreError>> },
    RemoveUser { user_id: String, reply: Reply<Result<User, StoreError>> },
    ClearDaily { reply: Reply<()> },
    Routes { reply: Reply<Vec<Route>> },
    Users { reply: Reply<Vec<User>> },
    RecentScans { limit: usize, reply: Reply<Vec<ScanRecord>> },
    Progress { reply: Reply<Vec<RouteProgress>> },
    Dashboard { reply: Reply<DashboardStats> },
    Operators { reply: Reply<Vec<OperatorStats>> },
    RouteReport { route_id: String, reply: Reply<Result<String, StoreError>> },
    RecentFailures { reply: Reply<Vec<SyncFailure>> },
}

pub struct Desk {
    pub(crate) store: ScanStore,
    pub(crate) metrics: Arc<Metrics>,
    /// Newest last
    pub(crate) recent_failures: VecDeque<SyncFailure>,
    metrics_interval: Duration,
}

impl Desk {
    pub fn new(store: ScanStore, metrics: Arc<Metrics>, metrics_interval_secs: u64) -> Self {
        Self {
            store,
            metrics,
            recent_failures: VecDeque::with_capacity(RECENT_FAILURES_CAP),
            metrics_interval: Duration::from_secs(metrics_interval_secs.max(1)),
        }
    }

    /// Run until every command sender is dropped
    pub async fn run(
        &mut self,
        mut cmd_rx: mpsc::Receiver<DeskCommand>,
        mut feed_rx: broadcast::Receiver<ScanRecord>,
        mut failure_rx: mpsc::Receiver<SyncFailure>,
    ) {
        let mut metrics_tick = interval_at(Instant::now() + self.metrics_interval, self.metrics_interval);
        let mut feed_open = true;
        let mut failures_open = true;

        info!("desk_started");
        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(cmd) => self.handle_command(cmd),
                        None => break,
                    }
                }
                pushed = feed_rx.recv(), if feed_open => {
                    match pushed {
                        Ok(record) => {
                            self.store.merge_remote_scan(record);
                        }
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            warn!(missed = %missed, "scan_feed_lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            warn!("scan_feed_closed");
                            feed_open = false;
                        }
                    }
                }
                failure = failure_rx.recv(), if failures_open => {
                    match failure {
                        Some(failure) => self.handle_sync_failure(failure),
                        None => failures_open = false,
                    }
                }
                _ = metrics_tick.tick() => {
                    self.metrics.report().log();
                }
            }
        }
        info!(scans = %self.store.log().len(), "desk_stopped");
    }

    pub fn store(&self) -> &ScanStore {
        &self.store
    }

    /// Recent sync failures, oldest first
    pub fn recent_failures(&self) -> impl Iterator<Item = &SyncFailure> {
        self.recent_failures.iter()
    }
}

/// Create a desk command channel
pub fn create_desk_channel(buffer_size: usize) -> (DeskHandle, mpsc::Receiver<DeskCommand>) {
    let (tx, rx) = mpsc::channel(buffer_size.max(1));
    (DeskHandle { tx }, rx)
}

/// Cloneable client for the desk loop
#[derive(Clone)]
pub struct DeskHandle {
    tx: mpsc::Sender<DeskCommand>,
}

impl DeskHandle {
    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> DeskCommand) -> Result<T, DeskError> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(make(reply)).await.map_err(|_| DeskError::Closed)?;
        rx.await.map_err(|_| DeskError::Closed)
    }

    pub async fn sign_in(&self, operator: Operator) -> Result<(), DeskError> {
        self.request(|reply| DeskCommand::SignIn { operator, reply }).await
    }

    pub async fn sign_out(&self) -> Result<(), DeskError> {
        self.request(|reply| DeskCommand::SignOut { reply }).await
    }

    pub async fn scan(&self, code: &str, route_id: Option<&str>, manual: bool) -> Result<Verdict, DeskError> {
        let code = code.to_string();
        let route_id = route_id.map(str::to_string);
        Ok(self.request(|reply| DeskCommand::Scan { code, route_id, manual, reply }).await??)
    }

    pub async fn assign_route(&self, operator_id: &str, route_id: Option<&str>) -> Result<(), DeskError> {
        let operator_id = operator_id.to_string();
        let route_id = route_id.map(str::to_string);
        Ok(self.request(|reply| DeskCommand::AssignRoute { operator_id, route_id, reply }).await??)
    }

    pub async fn import_packages(&self, entries: Vec<PackageEntry>) -> Result<ImportSummary, DeskError> {
        self.request(|reply| DeskCommand::ImportPackages { entries, reply }).await
    }

    pub async fn import_routes(&self, routes: Vec<Route>) -> Result<Vec<Route>, DeskError> {
        self.request(|reply| DeskCommand::ImportRoutes { routes, reply }).await
    }

    pub async fn add_route(&self, route: Route) -> Result<Route, DeskError> {
        Ok(self.request(|reply| DeskCommand::AddRoute { route, reply }).await??)
    }

    pub async fn update_route(&self, route: Route) -> Result<Route, DeskError> {
        Ok(self.request(|reply| DeskCommand::UpdateRoute { route, reply }).await??)
    }

    pub async fn remove_route(&self, route_id: &str) -> Result<Route, DeskError> {
        let route_id = route_id.to_string();
        Ok(self.request(|reply| DeskCommand::RemoveRoute { route_id, reply }).await??)
    }

    pub async fn set_route_completed(&self, route_id: &str, completed: bool) -> Result<Route, DeskError> {
        let route_id = route_id.to_string();
        Ok(self.request(|reply| DeskCommand::SetRouteCompleted { route_id, completed, reply }).await??)
    }

    pub async fn add_user(&self, user: User) -> Result<(), DeskError> {
        Ok(self.request(|reply| DeskCommand::AddUser { user, reply }).await??)
    }

    pub async fn update_user(&self, user: User) -> Result<(), DeskError> {
        Ok(self.request(|reply| DeskCommand::UpdateUser { user, reply }).await??)
    }

    pub async fn remove_user(&self, user_id: &str) -> Result<User, DeskError> {
        let user_id = user_id.to_string();
        Ok(self.request(|reply| DeskCommand::RemoveUser { user_id, reply }).await??)
    }

    pub async fn clear_daily(&self) -> Result<(), DeskError> {
        self.request(|reply| DeskCommand::ClearDaily { reply }).await
    }

    pub async fn routes(&self) -> Result<Vec<Route>, DeskError> {
        self.request(|reply| DeskCommand::Routes { reply }).await
    }

    pub async fn users(&self) -> Result<Vec<User>, DeskError> {
        self.request(|reply| DeskCommand::Users { reply }).await
    }

    pub async fn recent_scans(&self, limit: usize) -> Result<Vec<ScanRecord>, DeskError> {
        self.request(|reply| DeskCommand::RecentScans { limit, reply }).await
    }

    pub async fn progress(&self) -> Result<Vec<RouteProgress>, DeskError> {
        self.request(|reply| DeskCommand::Progress { reply }).await
    }

    pub async fn dashboard(&self) -> Result<DashboardStats, DeskError> {
        self.request(|reply| DeskCommand::Dashboard { reply }).await
    }

    pub async fn operators(&self) -> Result<Vec<OperatorStats>, DeskError> {
        self.request(|reply| DeskCommand::Operators { reply }).await
    }

    pub async fn route_report(&self, route_id: &str) -> Result<String, DeskError> {
        let route_id = route_id.to_string();
        Ok(self.request(|reply| DeskCommand::RouteReport { route_id, reply }).await??)
    }

    pub async fn recent_failures(&self) -> Result<Vec<SyncFailure>, DeskError> {
        self.request(|reply| DeskCommand::RecentFailures { reply }).await
    }
}

//! Durable store boundary
//!
//! The scan store trusts its in-memory state; the durable store only
//! trails behind it. Implementations must publish every inserted scan on
//! the feed returned by [`RemoteStore::subscribe_scans`], including scans
//! written by this process.

use crate::domain::scan::ScanRecord;
use crate::domain::types::{PackageEntry, Route, User};
use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveTime, Utc};
use tokio::sync::broadcast;
use tracing::{info, warn};

#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn load_users(&self) -> anyhow::Result<Vec<User>>;
    async fn save_user(&self, user: &User) -> anyhow::Result<()>;
    async fn delete_user(&self, id: &str) -> anyhow::Result<()>;

    async fn load_routes(&self) -> anyhow::Result<Vec<Route>>;
    /// Insert or replace by id
    async fn save_route(&self, route: &Route) -> anyhow::Result<()>;
    async fn delete_route(&self, id: &str) -> anyhow::Result<()>;
    async fn reset_route_completion(&self) -> anyhow::Result<()>;

    async fn load_packages(&self) -> anyhow::Result<Vec<PackageEntry>>;
    /// Upsert by tracking code
    async fn upsert_packages(&self, chunk: &[PackageEntry]) -> anyhow::Result<()>;
    async fn clear_packages(&self) -> anyhow::Result<()>;

    async fn insert_scan(&self, record: &ScanRecord) -> anyhow::Result<()>;
    async fn load_scans_since(&self, since: DateTime<Utc>) -> anyhow::Result<Vec<ScanRecord>>;
    async fn clear_scans(&self) -> anyhow::Result<()>;

    /// Push feed of inserted scans from any writer
    fn subscribe_scans(&self) -> broadcast::Receiver<ScanRecord>;
}

/// Everything the desk needs at startup
#[derive(Debug, Default)]
pub struct Snapshot {
    pub users: Vec<User>,
    pub routes: Vec<Route>,
    pub packages: Vec<PackageEntry>,
    pub scans: Vec<ScanRecord>,
}

/// Local midnight of the given instant, in UTC
pub fn start_of_local_day(now: DateTime<Local>) -> DateTime<Utc> {
    now.date_naive()
        .and_time(NaiveTime::MIN)
        .and_local_timezone(Local)
        .earliest()
        .map(|midnight| midnight.with_timezone(&Utc))
        // Midnight skipped by a DST jump; fall back to 24h ago
        .unwrap_or_else(|| (now - chrono::Duration::hours(24)).with_timezone(&Utc))
}

/// Load users, routes, packages and today's scans
///
/// A failing table is logged and left empty so the rest still loads.
pub async fn load_snapshot(remote: &dyn RemoteStore) -> Snapshot {
    let mut snapshot = Snapshot::default();

    match remote.load_users().await {
        Ok(users) => snapshot.users = users,
        Err(e) => warn!(error = %format!("{:#}", e), "load_users_failed"),
    }
    match remote.load_routes().await {
        Ok(routes) => snapshot.routes = routes,
        Err(e) => warn!(error = %format!("{:#}", e), "load_routes_failed"),
    }
    match remote.load_packages().await {
        Ok(packages) => snapshot.packages = packages,
        Err(e) => warn!(error = %format!("{:#}", e), "load_packages_failed"),
    }
    match remote.load_scans_since(start_of_local_day(Local::now())).await {
        Ok(scans) => snapshot.scans = scans,
        Err(e) => warn!(error = %format!("{:#}", e), "load_scans_failed"),
    }

    info!(
        users = %snapshot.users.len(),
        routes = %snapshot.routes.len(),
        packages = %snapshot.packages.len(),
        scans = %snapshot.scans.len(),
        "snapshot_loaded"
    );
    snapshot
}

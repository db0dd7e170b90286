//! In-memory durable store
//!
//! Used when `store.backend = "memory"` and by tests. Writes can be made to
//! fail on demand to exercise the trailing-sync failure path.

use crate::domain::scan::ScanRecord;
use crate::domain::types::{PackageEntry, Route, User};
use crate::io::remote::RemoteStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;

/// Capacity of the scan feed before slow subscribers start lagging
pub const SCAN_FEED_CAPACITY: usize = 1024;

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    routes: Vec<Route>,
    packages: FxHashMap<String, String>,
    scans: Vec<ScanRecord>,
}

pub struct MemoryStore {
    tables: Mutex<Tables>,
    feed: broadcast::Sender<ScanRecord>,
    fail_writes: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (feed, _) = broadcast::channel(SCAN_FEED_CAPACITY);
        Self { tables: Mutex::new(Tables::default()), feed, fail_writes: AtomicBool::new(false) }
    }

    /// Make every subsequent write fail (or succeed again)
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    pub fn package_count(&self) -> usize {
        self.tables.lock().packages.len()
    }

    pub fn postal_code(&self, tracking_code: &str) -> Option<String> {
        self.tables.lock().packages.get(tracking_code).cloned()
    }

    pub fn scan_count(&self) -> usize {
        self.tables.lock().scans.len()
    }

    pub fn routes(&self) -> Vec<Route> {
        self.tables.lock().routes.clone()
    }

    pub fn users(&self) -> Vec<User> {
        self.tables.lock().users.clone()
    }

    /// Insert a scan as if another session wrote it
    pub fn insert_external_scan(&self, record: ScanRecord) {
        self.tables.lock().scans.push(record.clone());
        let _ = self.feed.send(record);
    }

    fn check_writable(&self) -> anyhow::Result<()> {
        if self.fail_writes.load(Ordering::Relaxed) {
            anyhow::bail!("memory store rejecting writes");
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn load_users(&self) -> anyhow::Result<Vec<User>> {
        Ok(self.tables.lock().users.clone())
    }

    async fn save_user(&self, user: &User) -> anyhow::Result<()> {
        self.check_writable()?;
        let mut tables = self.tables.lock();
        match tables.users.iter_mut().find(|u| u.id == user.id) {
            Some(slot) => *slot = user.clone(),
            None => tables.users.push(user.clone()),
        }
        Ok(())
    }

    async fn delete_user(&self, id: &str) -> anyhow::Result<()> {
        self.check_writable()?;
        self.tables.lock().users.retain(|u| u.id != id);
        Ok(())
    }

    async fn load_routes(&self) -> anyhow::Result<Vec<Route>> {
        Ok(self.tables.lock().routes.clone())
    }

    async fn save_route(&self, route: &Route) -> anyhow::Result<()> {
        self.check_writable()?;
        let mut tables = self.tables.lock();
        match tables.routes.iter_mut().find(|r| r.id == route.id) {
            Some(slot) => *slot = route.clone(),
            None => tables.routes.push(route.clone()),
        }
        Ok(())
    }

    async fn delete_route(&self, id: &str) -> anyhow::Result<()> {
        self.check_writable()?;
        self.tables.lock().routes.retain(|r| r.id != id);
        Ok(())
    }

    async fn reset_route_completion(&self) -> anyhow::Result<()> {
        self.check_writable()?;
        for route in &mut self.tables.lock().routes {
            route.completed = false;
        }
        Ok(())
    }

    async fn load_packages(&self) -> anyhow::Result<Vec<PackageEntry>> {
        Ok(self
            .tables
            .lock()
            .packages
            .iter()
            .map(|(code, cep)| PackageEntry::new(code, cep))
            .collect())
    }

    async fn upsert_packages(&self, chunk: &[PackageEntry]) -> anyhow::Result<()> {
        self.check_writable()?;
        let mut tables = self.tables.lock();
        for entry in chunk {
            tables.packages.insert(entry.tracking_code.clone(), entry.postal_code.clone());
        }
        Ok(())
    }

    async fn clear_packages(&self) -> anyhow::Result<()> {
        self.check_writable()?;
        self.tables.lock().packages.clear();
        Ok(())
    }

    async fn insert_scan(&self, record: &ScanRecord) -> anyhow::Result<()> {
        self.check_writable()?;
        self.tables.lock().scans.push(record.clone());
        let _ = self.feed.send(record.clone());
        Ok(())
    }

    async fn load_scans_since(&self, since: DateTime<Utc>) -> anyhow::Result<Vec<ScanRecord>> {
        Ok(self.tables.lock().scans.iter().filter(|s| s.created_at >= since).cloned().collect())
    }

    async fn clear_scans(&self) -> anyhow::Result<()> {
        self.check_writable()?;
        self.tables.lock().scans.clear();
        Ok(())
    }

    fn subscribe_scans(&self) -> broadcast::Receiver<ScanRecord> {
        self.feed.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{Operator, ScanStatus};

    fn route(id: &str) -> Route {
        Route {
            id: id.to_string(),
            name: id.to_string(),
            category: "A".to_string(),
            prefixes: vec![],
            completed: true,
        }
    }

    #[tokio::test]
    async fn test_upsert_packages_last_write_wins() {
        let store = MemoryStore::new();
        store.upsert_packages(&[PackageEntry::new("BR1", "111")]).await.unwrap();
        store.upsert_packages(&[PackageEntry::new("BR1", "222")]).await.unwrap();

        assert_eq!(store.package_count(), 1);
        assert_eq!(store.postal_code("BR1").as_deref(), Some("222"));
    }

    #[tokio::test]
    async fn test_failing_writes() {
        let store = MemoryStore::new();
        store.set_fail_writes(true);
        assert!(store.upsert_packages(&[PackageEntry::new("BR1", "111")]).await.is_err());
        assert_eq!(store.package_count(), 0);

        store.set_fail_writes(false);
        assert!(store.upsert_packages(&[PackageEntry::new("BR1", "111")]).await.is_ok());
    }

    #[tokio::test]
    async fn test_insert_scan_publishes_to_feed() {
        let store = MemoryStore::new();
        let mut feed = store.subscribe_scans();

        let record = ScanRecord::new(
            &Operator::new("op", "Op"),
            &route("r1"),
            "BR1",
            ScanStatus::Success,
            "success",
        );
        store.insert_scan(&record).await.unwrap();

        assert_eq!(feed.recv().await.unwrap(), record);
        assert_eq!(store.scan_count(), 1);
    }

    #[tokio::test]
    async fn test_route_upsert_and_reset() {
        let store = MemoryStore::new();
        store.save_route(&route("r1")).await.unwrap();
        store.save_route(&route("r1")).await.unwrap();
        store.save_route(&route("r2")).await.unwrap();
        store.reset_route_completion().await.unwrap();

        let routes = store.load_routes().await.unwrap();
        assert_eq!(routes.len(), 2);
        assert!(routes.iter().all(|r| !r.completed));

        store.delete_route("r1").await.unwrap();
        assert_eq!(store.routes().len(), 1);
    }
}

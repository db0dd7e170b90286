//! File-backed durable store
//!
//! Layout under the store directory:
//! - `packages.jsonl` - upserts appended one JSON object per line; the last
//!   line for a tracking code wins on load
//! - `scans.jsonl` - append-only scan log
//! - `routes.json`, `users.json` - whole-table JSON arrays, rewritten on change

use crate::domain::scan::ScanRecord;
use crate::domain::types::{PackageEntry, Route, User};
use crate::io::memory_store::SCAN_FEED_CAPACITY;
use crate::io::remote::RemoteStore;
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

const PACKAGES_FILE: &str = "packages.jsonl";
const SCANS_FILE: &str = "scans.jsonl";
const ROUTES_FILE: &str = "routes.json";
const USERS_FILE: &str = "users.json";

pub struct JsonlStore {
    dir: PathBuf,
    /// Serializes file writes between the sync worker and loaders
    write_lock: Mutex<()>,
    feed: broadcast::Sender<ScanRecord>,
}

impl JsonlStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> anyhow::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create store directory {}", dir.display()))?;
        info!(dir = %dir.display(), "jsonl_store_opened");
        let (feed, _) = broadcast::channel(SCAN_FEED_CAPACITY);
        Ok(Self { dir, write_lock: Mutex::new(()), feed })
    }

    fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    fn load_table<T: DeserializeOwned>(&self, file: &str) -> anyhow::Result<Vec<T>> {
        let _guard = self.write_lock.lock();
        read_json_array(&self.path(file))
    }

    /// Read-modify-write of a whole-table file
    fn update_table<T, F>(&self, file: &str, update: F) -> anyhow::Result<()>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&mut Vec<T>),
    {
        let path = self.path(file);
        let _guard = self.write_lock.lock();
        let mut rows: Vec<T> = read_json_array(&path)?;
        update(&mut rows);
        write_json_array(&path, &rows)
    }
}

/// Read a JSON array file; a missing file is an empty table
fn read_json_array<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Write through a temp file so a crash never leaves a half-written table
fn write_json_array<T: Serialize>(path: &Path, rows: &[T]) -> anyhow::Result<()> {
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string_pretty(rows)?;
    fs::write(&tmp, json).with_context(|| format!("Failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

/// Read a JSONL file, skipping lines that fail to parse
fn read_json_lines<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;

    let mut rows = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(row) => rows.push(row),
            Err(e) => warn!(
                file = %path.display(),
                line = %(line_no + 1),
                error = %e,
                "jsonl_line_skipped"
            ),
        }
    }
    Ok(rows)
}

fn append_json_lines<T: Serialize>(path: &Path, rows: &[T]) -> anyhow::Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    for row in rows {
        serde_json::to_writer(&mut writer, row)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    debug!(file = %path.display(), rows = %rows.len(), "jsonl_appended");
    Ok(())
}

fn truncate(path: &Path) -> anyhow::Result<()> {
    fs::write(path, b"").with_context(|| format!("Failed to truncate {}", path.display()))
}

#[async_trait]
impl RemoteStore for JsonlStore {
    async fn load_users(&self) -> anyhow::Result<Vec<User>> {
        self.load_table(USERS_FILE)
    }

    async fn save_user(&self, user: &User) -> anyhow::Result<()> {
        self.update_table(USERS_FILE, |users: &mut Vec<User>| {
            match users.iter_mut().find(|u| u.id == user.id) {
                Some(slot) => *slot = user.clone(),
                None => users.push(user.clone()),
            }
        })
    }

    async fn delete_user(&self, id: &str) -> anyhow::Result<()> {
        self.update_table(USERS_FILE, |users: &mut Vec<User>| users.retain(|u| u.id != id))
    }

    async fn load_routes(&self) -> anyhow::Result<Vec<Route>> {
        self.load_table(ROUTES_FILE)
    }

    async fn save_route(&self, route: &Route) -> anyhow::Result<()> {
        self.update_table(ROUTES_FILE, |routes: &mut Vec<Route>| {
            match routes.iter_mut().find(|r| r.id == route.id) {
                Some(slot) => *slot = route.clone(),
                None => routes.push(route.clone()),
            }
        })
    }

    async fn delete_route(&self, id: &str) -> anyhow::Result<()> {
        self.update_table(ROUTES_FILE, |routes: &mut Vec<Route>| routes.retain(|r| r.id != id))
    }

    async fn reset_route_completion(&self) -> anyhow::Result<()> {
        self.update_table(ROUTES_FILE, |routes: &mut Vec<Route>| {
            for route in routes.iter_mut() {
                route.completed = false;
            }
        })
    }

    async fn load_packages(&self) -> anyhow::Result<Vec<PackageEntry>> {
        let rows: Vec<PackageEntry> = {
            let _guard = self.write_lock.lock();
            read_json_lines(&self.path(PACKAGES_FILE))?
        };

        // Fold upserts, keeping first-seen order
        let mut positions: FxHashMap<String, usize> = FxHashMap::default();
        let mut packages: Vec<PackageEntry> = Vec::with_capacity(rows.len());
        for row in rows {
            match positions.get(&row.tracking_code) {
                Some(&idx) => packages[idx] = row,
                None => {
                    positions.insert(row.tracking_code.clone(), packages.len());
                    packages.push(row);
                }
            }
        }
        Ok(packages)
    }

    async fn upsert_packages(&self, chunk: &[PackageEntry]) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock();
        append_json_lines(&self.path(PACKAGES_FILE), chunk)
    }

    async fn clear_packages(&self) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock();
        truncate(&self.path(PACKAGES_FILE))
    }

    async fn insert_scan(&self, record: &ScanRecord) -> anyhow::Result<()> {
        {
            let _guard = self.write_lock.lock();
            append_json_lines(&self.path(SCANS_FILE), std::slice::from_ref(record))?;
        }
        let _ = self.feed.send(record.clone());
        Ok(())
    }

    async fn load_scans_since(&self, since: DateTime<Utc>) -> anyhow::Result<Vec<ScanRecord>> {
        let _guard = self.write_lock.lock();
        let mut scans: Vec<ScanRecord> = read_json_lines(&self.path(SCANS_FILE))?;
        scans.retain(|s| s.created_at >= since);
        Ok(scans)
    }

    async fn clear_scans(&self) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock();
        truncate(&self.path(SCANS_FILE))
    }

    fn subscribe_scans(&self) -> broadcast::Receiver<ScanRecord> {
        self.feed.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{Operator, Role, ScanStatus};
    use chrono::Duration;
    use tempfile::tempdir;

    fn route(id: &str, completed: bool) -> Route {
        Route {
            id: id.to_string(),
            name: format!("Route {}", id),
            category: "A".to_string(),
            prefixes: vec!["369".to_string()],
            completed,
        }
    }

    #[tokio::test]
    async fn test_creates_store_directory() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("nested").join("store");
        let _store = JsonlStore::new(&nested).unwrap();
        assert!(nested.exists());
    }

    #[tokio::test]
    async fn test_empty_store_loads_empty_tables() {
        let dir = tempdir().unwrap();
        let store = JsonlStore::new(dir.path()).unwrap();

        assert!(store.load_users().await.unwrap().is_empty());
        assert!(store.load_routes().await.unwrap().is_empty());
        assert!(store.load_packages().await.unwrap().is_empty());
        assert!(store.load_scans_since(Utc::now() - Duration::days(1)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_package_upserts_fold_on_load() {
        let dir = tempdir().unwrap();
        let store = JsonlStore::new(dir.path()).unwrap();

        store
            .upsert_packages(&[PackageEntry::new("BR1", "111"), PackageEntry::new("BR2", "222")])
            .await
            .unwrap();
        store.upsert_packages(&[PackageEntry::new("BR1", "333")]).await.unwrap();

        let packages = store.load_packages().await.unwrap();
        assert_eq!(
            packages,
            vec![PackageEntry::new("BR1", "333"), PackageEntry::new("BR2", "222")]
        );

        store.clear_packages().await.unwrap();
        assert!(store.load_packages().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_lines_are_skipped() {
        let dir = tempdir().unwrap();
        let store = JsonlStore::new(dir.path()).unwrap();
        fs::write(
            dir.path().join(PACKAGES_FILE),
            "{\"tracking_code\":\"BR1\",\"postal_code\":\"111\"}\nnot json\n\n",
        )
        .unwrap();

        let packages = store.load_packages().await.unwrap();
        assert_eq!(packages, vec![PackageEntry::new("BR1", "111")]);
    }

    #[tokio::test]
    async fn test_routes_table() {
        let dir = tempdir().unwrap();
        let store = JsonlStore::new(dir.path()).unwrap();

        store.save_route(&route("r1", true)).await.unwrap();
        store.save_route(&route("r2", true)).await.unwrap();
        let mut edited = route("r1", true);
        edited.name = "Centro".to_string();
        store.save_route(&edited).await.unwrap();

        store.reset_route_completion().await.unwrap();
        let routes = store.load_routes().await.unwrap();
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].name, "Centro");
        assert!(routes.iter().all(|r| !r.completed));

        store.delete_route("r2").await.unwrap();
        assert_eq!(store.load_routes().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_users_table() {
        let dir = tempdir().unwrap();
        let store = JsonlStore::new(dir.path()).unwrap();
        let user = User {
            id: "u1".to_string(),
            name: "Ana".to_string(),
            login: "ana".to_string(),
            role: Role::Operator,
            active: true,
        };

        store.save_user(&user).await.unwrap();
        assert_eq!(store.load_users().await.unwrap(), vec![user]);

        store.delete_user("u1").await.unwrap();
        assert!(store.load_users().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_scans_filtered_by_time_and_published() {
        let dir = tempdir().unwrap();
        let store = JsonlStore::new(dir.path()).unwrap();
        let mut feed = store.subscribe_scans();
        let op = Operator::new("op", "Op");
        let r = route("r1", false);

        let old = ScanRecord::at(
            Utc::now() - Duration::days(2),
            &op,
            &r,
            "BR_OLD",
            ScanStatus::Success,
            "success",
        );
        let fresh = ScanRecord::new(&op, &r, "BR_NEW", ScanStatus::Success, "success");
        store.insert_scan(&old).await.unwrap();
        store.insert_scan(&fresh).await.unwrap();

        assert_eq!(feed.recv().await.unwrap().id, old.id);
        assert_eq!(feed.recv().await.unwrap().id, fresh.id);

        let today = store.load_scans_since(Utc::now() - Duration::days(1)).await.unwrap();
        assert_eq!(today, vec![fresh]);

        store.clear_scans().await.unwrap();
        assert!(store.load_scans_since(Utc::now() - Duration::days(7)).await.unwrap().is_empty());
    }
}

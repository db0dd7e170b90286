//! Scan store - the single owner of desk state
//!
//! Holds the reference index, route catalog, staff directory, scan log,
//! route assignments and the signed-in operator. Every mutation is applied
//! in memory first and then queued for the durable store; the queue is
//! never awaited.

use crate::domain::scan::ScanRecord;
use crate::domain::types::{Operator, PackageEntry, Route, User};
use crate::infra::metrics::Metrics;
use crate::io::feedback::Feedback;
use crate::io::remote::Snapshot;
use crate::io::sync_channel::SyncSender;
use crate::io::text_import::route_report_csv;
use crate::services::assignments::OperatorAssignments;
use crate::services::error::StoreError;
use crate::services::evaluator::{evaluate, ScanContext, ScanRequest, Verdict};
use crate::services::reference_index::ReferenceIndex;
use crate::services::route_catalog::RouteCatalog;
use crate::services::scan_log::ScanLog;
use crate::services::stats::{self, DashboardStats, OperatorStats, RouteProgress};
use crate::services::user_directory::UserDirectory;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Result of a package import
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    /// Rows in the batch
    pub rows: usize,
    /// Codes that were not in the index before
    pub added: usize,
    /// Chunks queued for the durable store
    pub chunks: usize,
}

pub struct ScanStore {
    pub(crate) index: ReferenceIndex,
    pub(crate) routes: RouteCatalog,
    pub(crate) users: UserDirectory,
    pub(crate) log: ScanLog,
    pub(crate) assignments: OperatorAssignments,
    pub(crate) operator: Option<Operator>,
    sync: SyncSender,
    feedback: Box<dyn Feedback>,
    metrics: Arc<Metrics>,
    chunk_size: usize,
}

impl ScanStore {
    pub fn new(
        sync: SyncSender,
        feedback: Box<dyn Feedback>,
        metrics: Arc<Metrics>,
        chunk_size: usize,
    ) -> Self {
        Self {
            index: ReferenceIndex::new(),
            routes: RouteCatalog::new(),
            users: UserDirectory::new(),
            log: ScanLog::new(),
            assignments: OperatorAssignments::new(),
            operator: None,
            sync,
            feedback,
            metrics,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Replace all state with a snapshot from the durable store
    pub fn hydrate(&mut self, snapshot: Snapshot) {
        self.users.replace_all(snapshot.users);
        self.routes.replace_all(snapshot.routes);
        self.index.reset();
        self.index.bulk_load(&snapshot.packages);
        self.log.replace_all(snapshot.scans);
        info!(
            users = %self.users.all().len(),
            routes = %self.routes.len(),
            packages = %self.index.len(),
            scans = %self.log.len(),
            "store_hydrated"
        );
    }

    // ---- Session ----

    pub fn sign_in(&mut self, operator: Operator) {
        info!(operator_id = %operator.id, name = %operator.name, "operator_signed_in");
        self.operator = Some(operator);
    }

    pub fn sign_out(&mut self) {
        if let Some(op) = self.operator.take() {
            info!(operator_id = %op.id, "operator_signed_out");
        }
    }

    pub fn operator(&self) -> Option<&Operator> {
        self.operator.as_ref()
    }

    // ---- Scanning ----

    /// Validate, evaluate and record one scanned code
    ///
    /// Blank input or a missing route selection is rejected before
    /// evaluation and leaves no trace in the log.
    pub fn process_scan(
        &mut self,
        raw_code: &str,
        route_id: Option<&str>,
        manual: bool,
    ) -> Result<Verdict, StoreError> {
        let code = raw_code.trim();
        if code.is_empty() {
            self.metrics.record_input_rejected();
            return Err(StoreError::EmptyCode);
        }
        let Some(route_id) = route_id.filter(|id| !id.is_empty()) else {
            self.metrics.record_input_rejected();
            return Err(StoreError::NoRouteSelected);
        };

        let start = Instant::now();
        let ctx = ScanContext {
            operator: self.operator.as_ref(),
            routes: &self.routes,
            index: &self.index,
            log: &self.log,
        };
        let verdict = evaluate(&ctx, ScanRequest { tracking_code: code, route_id, manual });

        if let Some(cue) = verdict.cue {
            self.feedback.cue(cue);
        }
        if let Some(record) = &verdict.record {
            self.log.append_local(record.clone());
            self.sync.insert_scan(record.clone());
        }

        let latency_us = start.elapsed().as_micros() as u64;
        self.metrics.record_scan(verdict.status, latency_us);
        info!(
            code = %code,
            route_id = %route_id,
            manual = %manual,
            status = %verdict.status,
            logged = %verdict.record.is_some(),
            latency_us = %latency_us,
            "scan_evaluated"
        );
        Ok(verdict)
    }

    /// Merge a record pushed by the durable store; false if already present
    pub fn merge_remote_scan(&mut self, record: ScanRecord) -> bool {
        let id = record.id.clone();
        let merged = self.log.merge_remote(record);
        self.metrics.record_remote_merge(merged);
        debug!(scan_id = %id, merged = %merged, "remote_scan_received");
        merged
    }

    // ---- Reference data ----

    /// Upsert packages locally, then queue them for the durable store in chunks
    pub fn import_packages(&mut self, batch: &[PackageEntry]) -> ImportSummary {
        let added = self.index.bulk_load(batch);
        self.metrics.record_packages_imported(batch.len() as u64);
        let chunks = self.sync.upsert_packages(batch, self.chunk_size);
        info!(rows = %batch.len(), added = %added, chunks = %chunks, "packages_imported");
        ImportSummary { rows: batch.len(), added, chunks }
    }

    /// End-of-shift cleanup
    ///
    /// Empties the index, the log and the assignments and reopens every
    /// route. Route definitions and users are kept.
    pub fn clear_daily_data(&mut self) {
        let packages = self.index.len();
        let scans = self.log.len();
        self.index.reset();
        self.log.clear();
        self.assignments.clear();
        self.routes.reset_completion();
        self.sync.clear_daily();
        info!(packages = %packages, scans = %scans, "daily_data_cleared");
    }

    // ---- Routes ----

    pub fn add_route(&mut self, route: Route) -> Result<Route, StoreError> {
        let route = self.routes.add(route)?.clone();
        self.sync.save_route(route.clone());
        Ok(route)
    }

    /// Append routes whose id is new; returns the routes added
    pub fn import_routes(&mut self, routes: Vec<Route>) -> Vec<Route> {
        let imported = self.routes.import(routes);
        for route in &imported {
            self.sync.save_route(route.clone());
        }
        imported
    }

    pub fn update_route(&mut self, route: Route) -> Result<Route, StoreError> {
        let route = self.routes.update(route)?.clone();
        self.sync.save_route(route.clone());
        Ok(route)
    }

    pub fn remove_route(&mut self, id: &str) -> Result<Route, StoreError> {
        let removed = self.routes.remove(id)?;
        self.assignments.release_route(id);
        self.sync.delete_route(id);
        Ok(removed)
    }

    /// Completing a route also releases every operator assigned to it
    pub fn set_route_completed(&mut self, id: &str, completed: bool) -> Result<Route, StoreError> {
        let route = self.routes.set_completed(id, completed)?.clone();
        if completed {
            self.assignments.release_route(id);
        }
        self.sync.save_route(route.clone());
        Ok(route)
    }

    /// Point an operator at an open route, or clear the assignment with `None`
    pub fn assign_route(&mut self, operator_id: &str, route_id: Option<&str>) -> Result<(), StoreError> {
        if let Some(id) = route_id {
            if self.routes.open_routes().all(|r| r.id != id) {
                return Err(match self.routes.get(id) {
                    Some(route) => StoreError::RouteCompleted(route.name.clone()),
                    None => StoreError::RouteNotFound(id.to_string()),
                });
            }
        }
        self.assignments.assign(operator_id, route_id);
        Ok(())
    }

    // ---- Users ----

    pub fn add_user(&mut self, user: User) -> Result<(), StoreError> {
        self.users.add(user.clone())?;
        self.sync.save_user(user);
        Ok(())
    }

    pub fn update_user(&mut self, user: User) -> Result<(), StoreError> {
        self.users.update(user.clone())?;
        self.sync.save_user(user);
        Ok(())
    }

    pub fn remove_user(&mut self, id: &str) -> Result<User, StoreError> {
        let removed = self.users.remove(id)?;
        self.sync.delete_user(id);
        Ok(removed)
    }

    // ---- Read side ----

    pub fn routes(&self) -> &RouteCatalog {
        &self.routes
    }

    pub fn users(&self) -> &UserDirectory {
        &self.users
    }

    pub fn log(&self) -> &ScanLog {
        &self.log
    }

    pub fn index(&self) -> &ReferenceIndex {
        &self.index
    }

    pub fn assignments(&self) -> &OperatorAssignments {
        &self.assignments
    }

    pub fn route_progress(&self, route_id: &str) -> Result<RouteProgress, StoreError> {
        let route = self
            .routes
            .get(route_id)
            .ok_or_else(|| StoreError::RouteNotFound(route_id.to_string()))?;
        Ok(stats::route_progress(route, &self.index, &self.log))
    }

    /// Progress for every route in catalog order
    pub fn all_route_progress(&self) -> Vec<RouteProgress> {
        self.routes.all().iter().map(|r| stats::route_progress(r, &self.index, &self.log)).collect()
    }

    pub fn dashboard(&self, now: DateTime<Utc>) -> DashboardStats {
        stats::dashboard(&self.log, &self.index, now)
    }

    pub fn operator_stats(&self, now: DateTime<Utc>) -> Vec<OperatorStats> {
        stats::operator_stats(&self.users, &self.log, &self.assignments, &self.routes, now)
    }

    /// CSV of the accepted scans on a route, newest first
    pub fn route_report(&self, route_id: &str) -> Result<String, StoreError> {
        if self.routes.get(route_id).is_none() {
            return Err(StoreError::RouteNotFound(route_id.to_string()));
        }
        route_report_csv(self.log.accepted_for_route(route_id))
            .map_err(|e| StoreError::Report(format!("{:#}", e)))
    }
}

//! Derived statistics for supervisors: route progress, dashboard, operators

use crate::domain::types::{Route, ScanStatus};
use crate::services::assignments::OperatorAssignments;
use crate::services::reference_index::ReferenceIndex;
use crate::services::route_catalog::RouteCatalog;
use crate::services::scan_log::ScanLog;
use crate::services::user_directory::UserDirectory;
use chrono::{DateTime, Duration, Local, Timelike, Utc};
use rustc_hash::FxHashSet;
use serde::Serialize;

/// Operators count as online if they scanned within this many minutes
const ONLINE_WINDOW_MINUTES: i64 = 5;

/// Window used for the scans-per-minute figure
const SPEED_WINDOW_MINUTES: i64 = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteProgress {
    pub route_id: String,
    pub route_name: String,
    pub category: String,
    pub completed: bool,
    /// Accepted scans recorded against the route
    pub scanned: usize,
    /// Packages in the reference index that belong to the route
    pub expected: usize,
}

pub fn route_progress(route: &Route, index: &ReferenceIndex, log: &ScanLog) -> RouteProgress {
    RouteProgress {
        route_id: route.id.clone(),
        route_name: route.name.clone(),
        category: route.category.clone(),
        completed: route.completed,
        scanned: log.accepted_for_route(&route.id).count(),
        expected: index.count_matching(&route.prefixes),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardStats {
    pub total: usize,
    pub accepted: usize,
    pub errors: usize,
    pub manual: usize,
    pub operators_online: usize,
    /// Scan counts per local hour of day
    pub scans_by_hour: [usize; 24],
    /// Accepted scans as a percentage of the reference index
    pub completion_pct: f64,
}

pub fn dashboard(log: &ScanLog, index: &ReferenceIndex, now: DateTime<Utc>) -> DashboardStats {
    let mut stats = DashboardStats {
        total: log.len(),
        accepted: 0,
        errors: 0,
        manual: 0,
        operators_online: 0,
        scans_by_hour: [0; 24],
        completion_pct: 0.0,
    };
    let mut online = FxHashSet::default();
    let online_window = Duration::minutes(ONLINE_WINDOW_MINUTES);

    for record in log.iter() {
        if record.is_accepted() {
            stats.accepted += 1;
        } else {
            stats.errors += 1;
        }
        if record.status == ScanStatus::Manual {
            stats.manual += 1;
        }
        if now - record.created_at < online_window {
            online.insert(record.operator_id.as_str());
        }
        let hour = record.created_at.with_timezone(&Local).hour() as usize;
        stats.scans_by_hour[hour] += 1;
    }

    stats.operators_online = online.len();
    if !index.is_empty() {
        stats.completion_pct = stats.accepted as f64 / index.len() as f64 * 100.0;
    }
    stats
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperatorStats {
    pub operator_id: String,
    pub name: String,
    /// Name of the route the operator is scanning, if any
    pub current_route: Option<String>,
    pub total_scans: usize,
    pub successful_scans: usize,
    pub scans_per_minute: u64,
    pub last_active: Option<DateTime<Utc>>,
}

/// Stats for every active operator, busiest first
pub fn operator_stats(
    users: &UserDirectory,
    log: &ScanLog,
    assignments: &OperatorAssignments,
    routes: &RouteCatalog,
    now: DateTime<Utc>,
) -> Vec<OperatorStats> {
    let speed_window = Duration::minutes(SPEED_WINDOW_MINUTES);

    let mut stats: Vec<OperatorStats> = users
        .active_operators()
        .map(|user| {
            let mut total = 0;
            let mut success = 0;
            let mut recent = 0u64;
            let mut last_active = None;

            // Newest first, so the first hit is the latest activity
            for record in log.iter().filter(|r| r.operator_id == user.id) {
                if last_active.is_none() {
                    last_active = Some(record.created_at);
                }
                total += 1;
                if record.is_accepted() {
                    success += 1;
                }
                if now - record.created_at < speed_window {
                    recent += 1;
                }
            }

            let current_route = assignments
                .route_for(&user.id)
                .and_then(|route_id| routes.get(route_id))
                .map(|route| route.name.clone());

            OperatorStats {
                operator_id: user.id.clone(),
                name: user.name.clone(),
                current_route,
                total_scans: total,
                successful_scans: success,
                scans_per_minute: (recent as f64 / SPEED_WINDOW_MINUTES as f64).round() as u64,
                last_active,
            }
        })
        .collect();

    stats.sort_by(|a, b| b.total_scans.cmp(&a.total_scans));
    stats
}

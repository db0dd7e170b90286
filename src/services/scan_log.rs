//! Append-only scan log, newest first
//!
//! Besides the records themselves the log keeps two indexes:
//! - record ids, so pushed records are merged at most once
//! - tracking codes with an accepted record, for duplicate detection
//!
//! Both are derived from the full history and give the same answers a
//! linear scan of every record would.

use crate::domain::scan::ScanRecord;
use rustc_hash::FxHashSet;
use std::collections::VecDeque;
use tracing::debug;

#[derive(Debug, Default)]
pub struct ScanLog {
    /// Newest first
    records: VecDeque<ScanRecord>,
    ids: FxHashSet<String>,
    accepted_codes: FxHashSet<String>,
}

impl ScanLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the log with a loaded history (any order)
    pub fn replace_all(&mut self, mut records: Vec<ScanRecord>) {
        self.clear();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        for record in records {
            if self.ids.contains(&record.id) {
                continue;
            }
            self.index(&record);
            self.records.push_back(record);
        }
    }

    /// Prepend a record produced by this session
    pub fn append_local(&mut self, record: ScanRecord) {
        self.index(&record);
        self.records.push_front(record);
    }

    /// Merge a record pushed by the durable store
    ///
    /// Returns false when a record with the same id is already present.
    /// Records are placed by creation time so the log stays newest first.
    pub fn merge_remote(&mut self, record: ScanRecord) -> bool {
        if self.contains_id(&record.id) {
            debug!(scan_id = %record.id, "remote_scan_already_present");
            return false;
        }
        self.index(&record);
        let pos = self
            .records
            .iter()
            .position(|r| r.created_at <= record.created_at)
            .unwrap_or(self.records.len());
        self.records.insert(pos, record);
        true
    }

    /// True when the exact code was accepted on any route
    #[inline]
    pub fn has_accepted(&self, tracking_code: &str) -> bool {
        self.accepted_codes.contains(tracking_code)
    }

    #[inline]
    pub fn contains_id(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Records, newest first
    pub fn iter(&self) -> impl Iterator<Item = &ScanRecord> {
        self.records.iter()
    }

    pub fn newest(&self) -> Option<&ScanRecord> {
        self.records.front()
    }

    /// Accepted records for a route, newest first
    pub fn accepted_for_route<'a>(&'a self, route_id: &'a str) -> impl Iterator<Item = &'a ScanRecord> {
        self.records.iter().filter(move |r| r.route_id == route_id && r.is_accepted())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.ids.clear();
        self.accepted_codes.clear();
    }

    fn index(&mut self, record: &ScanRecord) {
        self.ids.insert(record.id.clone());
        if record.is_accepted() {
            self.accepted_codes.insert(record.tracking_code.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{Operator, Route, ScanStatus};
    use chrono::{Duration, Utc};

    fn route(id: &str) -> Route {
        Route {
            id: id.to_string(),
            name: format!("Route {}", id),
            category: "A".to_string(),
            prefixes: vec![],
            completed: false,
        }
    }

    fn record(code: &str, route_id: &str, status: ScanStatus, age_secs: i64) -> ScanRecord {
        let op = Operator::new("op-1", "Ana");
        ScanRecord::at(
            Utc::now() - Duration::seconds(age_secs),
            &op,
            &route(route_id),
            code,
            status,
            status.as_str(),
        )
    }

    #[test]
    fn test_append_local_is_newest_first() {
        let mut log = ScanLog::new();
        log.append_local(record("BR1", "r1", ScanStatus::Success, 10));
        log.append_local(record("BR2", "r1", ScanStatus::Success, 0));

        let codes: Vec<_> = log.iter().map(|r| r.tracking_code.as_str()).collect();
        assert_eq!(codes, vec!["BR2", "BR1"]);
        assert_eq!(log.newest().unwrap().tracking_code, "BR2");
    }

    #[test]
    fn test_only_accepted_codes_are_duplicates() {
        let mut log = ScanLog::new();
        log.append_local(record("BR1", "r1", ScanStatus::ErrorRoute, 0));
        log.append_local(record("BR2", "r1", ScanStatus::ErrorNotFound, 0));
        log.append_local(record("BR3", "r1", ScanStatus::ErrorDuplicate, 0));
        assert!(!log.has_accepted("BR1"));
        assert!(!log.has_accepted("BR2"));
        assert!(!log.has_accepted("BR3"));

        log.append_local(record("BR4", "r1", ScanStatus::Manual, 0));
        log.append_local(record("BR5", "r2", ScanStatus::Success, 0));
        assert!(log.has_accepted("BR4"));
        assert!(log.has_accepted("BR5"));
        assert!(!log.has_accepted("br5"));
    }

    #[test]
    fn test_merge_remote_is_idempotent() {
        let mut log = ScanLog::new();
        let local = record("BR1", "r1", ScanStatus::Success, 0);
        log.append_local(local.clone());

        // Echo of our own optimistic append
        assert!(!log.merge_remote(local));
        assert_eq!(log.len(), 1);

        let other = record("BR2", "r1", ScanStatus::Success, 0);
        assert!(log.merge_remote(other.clone()));
        assert!(!log.merge_remote(other));
        assert_eq!(log.len(), 2);
        assert!(log.has_accepted("BR2"));
    }

    #[test]
    fn test_merge_remote_keeps_time_order() {
        let mut log = ScanLog::new();
        log.append_local(record("BR_OLD", "r1", ScanStatus::Success, 60));
        log.append_local(record("BR_NEW", "r1", ScanStatus::Success, 0));

        log.merge_remote(record("BR_MID", "r1", ScanStatus::Success, 30));
        log.merge_remote(record("BR_ANCIENT", "r1", ScanStatus::Success, 600));

        let codes: Vec<_> = log.iter().map(|r| r.tracking_code.as_str()).collect();
        assert_eq!(codes, vec!["BR_NEW", "BR_MID", "BR_OLD", "BR_ANCIENT"]);
    }

    #[test]
    fn test_replace_all_sorts_and_indexes() {
        let mut log = ScanLog::new();
        log.append_local(record("BR_GONE", "r1", ScanStatus::Success, 0));

        let a = record("BR1", "r1", ScanStatus::Success, 50);
        let b = record("BR2", "r2", ScanStatus::ErrorRoute, 5);
        log.replace_all(vec![a.clone(), b, a]);

        assert_eq!(log.len(), 2);
        assert_eq!(log.newest().unwrap().tracking_code, "BR2");
        assert!(log.has_accepted("BR1"));
        assert!(!log.has_accepted("BR_GONE"));
    }

    #[test]
    fn test_accepted_for_route() {
        let mut log = ScanLog::new();
        log.append_local(record("BR1", "r1", ScanStatus::Success, 0));
        log.append_local(record("BR2", "r1", ScanStatus::ErrorRoute, 0));
        log.append_local(record("BR3", "r1", ScanStatus::Manual, 0));
        log.append_local(record("BR4", "r2", ScanStatus::Success, 0));

        assert_eq!(log.accepted_for_route("r1").count(), 2);
        assert_eq!(log.accepted_for_route("r2").count(), 1);
        assert_eq!(log.accepted_for_route("r3").count(), 0);
    }

    #[test]
    fn test_clear() {
        let mut log = ScanLog::new();
        let r = record("BR1", "r1", ScanStatus::Success, 0);
        log.append_local(r.clone());
        log.clear();

        assert!(log.is_empty());
        assert!(!log.has_accepted("BR1"));
        assert!(!log.contains_id(&r.id));
    }
}

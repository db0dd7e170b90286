//! Scan record - the immutable audit entry produced by each logged scan

use crate::domain::types::{Operator, Route, ScanStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generate a new UUIDv7 (time-sortable)
pub fn new_uuid_v7() -> String {
    Uuid::now_v7().to_string()
}

/// Audit entry for one evaluated scan
///
/// Operator and route names are copied at write time so history keeps
/// displaying the names that were current when the package was scanned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub operator_id: String,
    pub operator_name: String,
    pub route_id: String,
    pub route_name: String,
    pub tracking_code: String,
    pub status: ScanStatus,
    #[serde(default)]
    pub message: String,
}

impl ScanRecord {
    pub fn new(
        operator: &Operator,
        route: &Route,
        tracking_code: &str,
        status: ScanStatus,
        message: &str,
    ) -> Self {
        Self::at(Utc::now(), operator, route, tracking_code, status, message)
    }

    /// Build a record with an explicit creation time
    pub fn at(
        created_at: DateTime<Utc>,
        operator: &Operator,
        route: &Route,
        tracking_code: &str,
        status: ScanStatus,
        message: &str,
    ) -> Self {
        Self {
            id: new_uuid_v7(),
            created_at,
            operator_id: operator.id.clone(),
            operator_name: operator.name.clone(),
            route_id: route.id.clone(),
            route_name: route.name.clone(),
            tracking_code: tracking_code.to_string(),
            status,
            message: message.to_string(),
        }
    }

    #[inline]
    pub fn is_accepted(&self) -> bool {
        self.status.is_accepted()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route() -> Route {
        Route {
            id: "r1".to_string(),
            name: "Centro".to_string(),
            category: "A".to_string(),
            prefixes: vec!["369".to_string()],
            completed: false,
        }
    }

    #[test]
    fn test_record_denormalizes_names() {
        let op = Operator::new("op-1", "Ana");
        let record = ScanRecord::new(&op, &route(), "BR123", ScanStatus::Success, "success");

        assert_eq!(record.operator_id, "op-1");
        assert_eq!(record.operator_name, "Ana");
        assert_eq!(record.route_id, "r1");
        assert_eq!(record.route_name, "Centro");
        assert!(record.is_accepted());
    }

    #[test]
    fn test_record_ids_are_unique() {
        let op = Operator::new("op-1", "Ana");
        let a = ScanRecord::new(&op, &route(), "BR1", ScanStatus::ErrorRoute, "x");
        let b = ScanRecord::new(&op, &route(), "BR1", ScanStatus::ErrorRoute, "x");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_json_uses_wire_status_names() {
        let op = Operator::new("op-1", "Ana");
        let record = ScanRecord::new(&op, &route(), "BR1", ScanStatus::ErrorNotFound, "not found");
        let json = serde_json::to_string(&record).unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["status"], "ERROR_NOT_FOUND");
        assert_eq!(parsed["tracking_code"], "BR1");

        let back: ScanRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}

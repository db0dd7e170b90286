//! Session-scoped operator -> route assignments (never persisted)

use rustc_hash::FxHashMap;
use tracing::debug;

#[derive(Debug, Default)]
pub struct OperatorAssignments {
    routes: FxHashMap<String, String>,
}

impl OperatorAssignments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a route, or unassign with `None`; last write wins
    pub fn assign(&mut self, operator_id: &str, route_id: Option<&str>) {
        match route_id {
            Some(route_id) => {
                debug!(operator_id = %operator_id, route_id = %route_id, "operator_route_assigned");
                self.routes.insert(operator_id.to_string(), route_id.to_string());
            }
            None => {
                debug!(operator_id = %operator_id, "operator_route_unassigned");
                self.routes.remove(operator_id);
            }
        }
    }

    pub fn route_for(&self, operator_id: &str) -> Option<&str> {
        self.routes.get(operator_id).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Unassign every operator on a route; returns how many were released
    pub fn release_route(&mut self, route_id: &str) -> usize {
        let before = self.routes.len();
        self.routes.retain(|_, assigned| assigned != route_id);
        let released = before - self.routes.len();
        if released > 0 {
            debug!(route_id = %route_id, released = %released, "operator_route_released");
        }
        released
    }

    pub fn clear(&mut self) {
        self.routes.clear();
    }
}

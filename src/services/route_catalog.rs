//! Route catalog - supervisor-managed route definitions
//!
//! Routes keep insertion order so listings stay stable between refreshes.

use crate::domain::types::{normalize_category, Route};
use crate::services::error::StoreError;
use tracing::info;

#[derive(Debug, Default)]
pub struct RouteCatalog {
    routes: Vec<Route>,
}

impl RouteCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole catalog (initial load)
    pub fn replace_all(&mut self, routes: Vec<Route>) {
        self.routes = routes.into_iter().map(sanitize).collect();
    }

    pub fn get(&self, id: &str) -> Option<&Route> {
        self.routes.iter().find(|r| r.id == id)
    }

    pub fn all(&self) -> &[Route] {
        &self.routes
    }

    /// Routes still available for scanning
    pub fn open_routes(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter().filter(|r| !r.completed)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn add(&mut self, route: Route) -> Result<&Route, StoreError> {
        if self.get(&route.id).is_some() {
            return Err(StoreError::DuplicateRoute(route.id));
        }
        info!(route_id = %route.id, name = %route.name, prefixes = %route.prefixes.len(), "route_added");
        self.routes.push(sanitize(route));
        Ok(&self.routes[self.routes.len() - 1])
    }

    /// Append a batch; routes whose id already exists are skipped
    pub fn import(&mut self, routes: Vec<Route>) -> Vec<Route> {
        let mut imported = Vec::with_capacity(routes.len());
        for route in routes {
            if self.get(&route.id).is_some() {
                continue;
            }
            let route = sanitize(route);
            self.routes.push(route.clone());
            imported.push(route);
        }
        info!(imported = %imported.len(), total = %self.routes.len(), "routes_imported");
        imported
    }

    pub fn update(&mut self, route: Route) -> Result<&Route, StoreError> {
        let idx = self.position(&route.id)?;
        self.routes[idx] = sanitize(route);
        Ok(&self.routes[idx])
    }

    pub fn remove(&mut self, id: &str) -> Result<Route, StoreError> {
        let idx = self.position(id)?;
        let removed = self.routes.remove(idx);
        info!(route_id = %id, name = %removed.name, "route_removed");
        Ok(removed)
    }

    pub fn set_completed(&mut self, id: &str, completed: bool) -> Result<&Route, StoreError> {
        let idx = self.position(id)?;
        self.routes[idx].completed = completed;
        info!(route_id = %id, completed = %completed, "route_completion_changed");
        Ok(&self.routes[idx])
    }

    /// Reopen every route; definitions are kept
    pub fn reset_completion(&mut self) {
        for route in &mut self.routes {
            route.completed = false;
        }
    }

    fn position(&self, id: &str) -> Result<usize, StoreError> {
        self.routes
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| StoreError::RouteNotFound(id.to_string()))
    }
}

fn sanitize(mut route: Route) -> Route {
    route.category = normalize_category(Some(&route.category));
    route
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(id: &str, name: &str) -> Route {
        Route {
            id: id.to_string(),
            name: name.to_string(),
            category: "A".to_string(),
            prefixes: vec![],
            completed: false,
        }
    }

    #[test]
    fn test_add_and_get() {
        let mut catalog = RouteCatalog::new();
        catalog.add(route("r1", "Centro")).unwrap();

        assert_eq!(catalog.get("r1").unwrap().name, "Centro");
        assert!(catalog.get("r2").is_none());
        assert_eq!(
            catalog.add(route("r1", "Outro")).unwrap_err(),
            StoreError::DuplicateRoute("r1".to_string())
        );
    }

    #[test]
    fn test_blank_category_is_defaulted() {
        let mut catalog = RouteCatalog::new();
        let mut r = route("r1", "Centro");
        r.category = String::new();
        assert_eq!(catalog.add(r).unwrap().category, "A");
    }

    #[test]
    fn test_update_and_remove() {
        let mut catalog = RouteCatalog::new();
        catalog.add(route("r1", "Centro")).unwrap();

        let mut edited = route("r1", "Centro Novo");
        edited.prefixes = vec!["369".to_string()];
        catalog.update(edited).unwrap();
        assert_eq!(catalog.get("r1").unwrap().name, "Centro Novo");

        assert!(catalog.update(route("r9", "x")).is_err());

        let removed = catalog.remove("r1").unwrap();
        assert_eq!(removed.name, "Centro Novo");
        assert!(catalog.is_empty());
        assert_eq!(catalog.remove("r1").unwrap_err(), StoreError::RouteNotFound("r1".to_string()));
    }

    #[test]
    fn test_import_skips_existing_ids() {
        let mut catalog = RouteCatalog::new();
        catalog.add(route("r1", "Centro")).unwrap();

        let imported = catalog.import(vec![route("r1", "Dup"), route("r2", "Norte")]);
        assert_eq!(imported.len(), 1);
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get("r1").unwrap().name, "Centro");
    }

    #[test]
    fn test_completion_and_open_routes() {
        let mut catalog = RouteCatalog::new();
        catalog.add(route("r1", "Centro")).unwrap();
        catalog.add(route("r2", "Norte")).unwrap();

        catalog.set_completed("r1", true).unwrap();
        let open: Vec<_> = catalog.open_routes().map(|r| r.id.as_str()).collect();
        assert_eq!(open, vec!["r2"]);

        catalog.reset_completion();
        assert_eq!(catalog.open_routes().count(), 2);
        assert_eq!(catalog.len(), 2);
    }
}

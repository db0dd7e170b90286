//! Typed rejections raised by the scan store

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("route not found: {0}")]
    RouteNotFound(String),

    #[error("route {0} is completed")]
    RouteCompleted(String),

    #[error("route already exists: {0}")]
    DuplicateRoute(String),

    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("user already exists: {0}")]
    DuplicateUser(String),

    #[error("scanned code is empty")]
    EmptyCode,

    #[error("no route selected")]
    NoRouteSelected,

    #[error("failed to build report: {0}")]
    Report(String),
}

/// Failure to reach the desk or a rejection it returned
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeskError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("desk is not running")]
    Closed,
}

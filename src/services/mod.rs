//! Services - business logic and state management
//!
//! - `desk` - Single-writer event loop and its client handle
//! - `store` - Owner of all desk state
//! - `evaluator` - Scan classification rules
//! - `reference_index` - Tracking code to CEP map
//! - `route_catalog` - Route definitions and completion flags
//! - `user_directory` - Staff records
//! - `scan_log` - Newest-first audit log with duplicate index
//! - `assignments` - Operator to route assignment
//! - `stats` - Progress, dashboard and operator statistics
//! - `sync_worker` - Applies queued writes to the durable store

pub mod assignments;
pub mod desk;
pub mod error;
pub mod evaluator;
pub mod reference_index;
pub mod route_catalog;
pub mod scan_log;
pub mod stats;
pub mod store;
pub mod sync_worker;
pub mod user_directory;

// Re-export commonly used types
pub use desk::{create_desk_channel, Desk, DeskCommand, DeskHandle};
pub use error::{DeskError, StoreError};
pub use store::{ImportSummary, ScanStore};
pub use sync_worker::{create_sync_worker, SyncFailure, SyncWorker};

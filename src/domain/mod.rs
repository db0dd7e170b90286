//! Domain models - core business types
//!
//! - `types` - routes, packages, users and scan statuses
//! - `scan` - the immutable scan record
//! - `route_match` - CEP prefix matching rule

pub mod route_match;
pub mod scan;
pub mod types;

pub use scan::ScanRecord;
pub use types::{FeedbackCue, Operator, PackageEntry, Role, Route, ScanStatus, User};

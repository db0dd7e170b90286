//! Shared types for route scanning

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Category assigned to routes that arrive without one
pub const DEFAULT_CATEGORY: &str = "A";

/// Classification of a single scan attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanStatus {
    Success,
    Manual,
    ErrorRoute,
    ErrorNotFound,
    ErrorDuplicate,
    ErrorInvalid,
}

/// Every status, in metrics slot order
pub const ALL_STATUSES: [ScanStatus; 6] = [
    ScanStatus::Success,
    ScanStatus::Manual,
    ScanStatus::ErrorRoute,
    ScanStatus::ErrorNotFound,
    ScanStatus::ErrorDuplicate,
    ScanStatus::ErrorInvalid,
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown scan status: {0}")]
pub struct UnknownStatus(pub String);

impl ScanStatus {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Success => "SUCCESS",
            ScanStatus::Manual => "MANUAL",
            ScanStatus::ErrorRoute => "ERROR_ROUTE",
            ScanStatus::ErrorNotFound => "ERROR_NOT_FOUND",
            ScanStatus::ErrorDuplicate => "ERROR_DUPLICATE",
            ScanStatus::ErrorInvalid => "ERROR_INVALID",
        }
    }

    /// Accepted scans count towards duplicates and route progress
    #[inline]
    pub fn is_accepted(&self) -> bool {
        matches!(self, ScanStatus::Success | ScanStatus::Manual)
    }

    /// Slot used by lock-free per-status counters
    #[inline]
    pub fn index(&self) -> usize {
        match self {
            ScanStatus::Success => 0,
            ScanStatus::Manual => 1,
            ScanStatus::ErrorRoute => 2,
            ScanStatus::ErrorNotFound => 3,
            ScanStatus::ErrorDuplicate => 4,
            ScanStatus::ErrorInvalid => 5,
        }
    }
}

impl std::str::FromStr for ScanStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL_STATUSES
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

impl std::fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Short audible/visual cue played after a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackCue {
    Success,
    Error,
    Warning,
}

impl FeedbackCue {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackCue::Success => "success",
            FeedbackCue::Error => "error",
            FeedbackCue::Warning => "warning",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Supervisor,
    Operator,
}

/// Staff member known to the directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub login: String,
    pub role: Role,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Identity of the signed-in operator, copied into every scan record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operator {
    pub id: String,
    pub name: String,
}

impl Operator {
    pub fn new(id: &str, name: &str) -> Self {
        Self { id: id.to_string(), name: name.to_string() }
    }
}

impl From<&User> for Operator {
    fn from(user: &User) -> Self {
        Self { id: user.id.clone(), name: user.name.clone() }
    }
}

/// One row of the reference index: tracking code and destination CEP
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageEntry {
    pub tracking_code: String,
    #[serde(alias = "cep")]
    pub postal_code: String,
}

impl PackageEntry {
    pub fn new(tracking_code: &str, postal_code: &str) -> Self {
        Self { tracking_code: tracking_code.to_string(), postal_code: postal_code.to_string() }
    }
}

/// A named bundle of CEP prefixes; an empty prefix list matches every package
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub id: String,
    pub name: String,
    #[serde(default = "default_category", deserialize_with = "deserialize_category")]
    pub category: String,
    #[serde(default, alias = "ceps")]
    pub prefixes: Vec<String>,
    #[serde(default)]
    pub completed: bool,
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

/// Null or blank categories fall back to the default
fn deserialize_category<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(normalize_category(raw.as_deref()))
}

/// Trim a category and substitute the default when absent
pub fn normalize_category(raw: Option<&str>) -> String {
    match raw.map(str::trim) {
        Some(c) if !c.is_empty() => c.to_string(),
        _ => default_category(),
    }
}

impl Route {
    /// Create an open route with a fresh id
    pub fn new(name: &str, prefixes: Vec<String>, category: Option<&str>) -> Self {
        Self {
            id: crate::domain::scan::new_uuid_v7(),
            name: name.to_string(),
            category: normalize_category(category),
            prefixes,
            completed: false,
        }
    }

    #[inline]
    pub fn is_wildcard(&self) -> bool {
        self.prefixes.is_empty()
    }
}

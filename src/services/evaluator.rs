//! Scan evaluation - classifies one scan attempt
//!
//! Checks run in a fixed order and the first failing check decides the
//! outcome:
//! 1. signed-in operator
//! 2. known route
//! 3. `BR` prefix (case-insensitive)
//! 4. duplicate of an accepted scan on any route
//! 5. reference lookup + route match, or manual acceptance
//!
//! Rejections from checks 1-3 are not written to the audit log. Every
//! outcome from checks 4-5 carries a fresh [`ScanRecord`].

use crate::domain::route_match::route_matches;
use crate::domain::scan::ScanRecord;
use crate::domain::types::{FeedbackCue, Operator, ScanStatus};
use crate::services::reference_index::ReferenceIndex;
use crate::services::route_catalog::RouteCatalog;
use crate::services::scan_log::ScanLog;

/// Tracking codes must start with this, ignoring case
pub const REQUIRED_PREFIX: &str = "BR";

pub const MSG_NOT_LOGGED_IN: &str = "not logged in";
pub const MSG_INVALID_ROUTE: &str = "invalid route";
pub const MSG_BAD_PREFIX: &str = "code must start with BR";
pub const MSG_DUPLICATE: &str = "duplicate package";
pub const MSG_SUCCESS: &str = "success";
pub const MSG_WRONG_ROUTE: &str = "invalid postal code for route";
pub const MSG_MANUAL: &str = "added manually";
pub const MSG_NOT_FOUND: &str = "not found";

/// Read-only view of the state a scan is judged against
pub struct ScanContext<'a> {
    pub operator: Option<&'a Operator>,
    pub routes: &'a RouteCatalog,
    pub index: &'a ReferenceIndex,
    pub log: &'a ScanLog,
}

/// A single submission from the scanner
#[derive(Debug, Clone, Copy)]
pub struct ScanRequest<'a> {
    pub tracking_code: &'a str,
    pub route_id: &'a str,
    pub manual: bool,
}

/// Result of evaluating one scan
#[derive(Debug, Clone)]
pub struct Verdict {
    pub status: ScanStatus,
    pub message: &'static str,
    pub cue: Option<FeedbackCue>,
    /// Present for every outcome that belongs in the audit log
    pub record: Option<ScanRecord>,
}

impl Verdict {
    fn rejected(message: &'static str, cue: Option<FeedbackCue>) -> Self {
        Self { status: ScanStatus::ErrorInvalid, message, cue, record: None }
    }
}

#[inline]
fn has_required_prefix(code: &str) -> bool {
    code.get(..REQUIRED_PREFIX.len())
        .map(|head| head.eq_ignore_ascii_case(REQUIRED_PREFIX))
        .unwrap_or(false)
}

/// Classify a scan and build its audit record
pub fn evaluate(ctx: &ScanContext<'_>, req: ScanRequest<'_>) -> Verdict {
    let Some(operator) = ctx.operator else {
        return Verdict::rejected(MSG_NOT_LOGGED_IN, None);
    };

    let Some(route) = ctx.routes.get(req.route_id) else {
        return Verdict::rejected(MSG_INVALID_ROUTE, None);
    };

    if !has_required_prefix(req.tracking_code) {
        return Verdict::rejected(MSG_BAD_PREFIX, Some(FeedbackCue::Error));
    }

    let (status, message, cue) = if ctx.log.has_accepted(req.tracking_code) {
        (ScanStatus::ErrorDuplicate, MSG_DUPLICATE, FeedbackCue::Warning)
    } else {
        // A code stored without a CEP counts as unknown
        match ctx.index.lookup(req.tracking_code).filter(|cep| !cep.is_empty()) {
            Some(cep) if route_matches(cep, &route.prefixes) => {
                (ScanStatus::Success, MSG_SUCCESS, FeedbackCue::Success)
            }
            Some(_) => (ScanStatus::ErrorRoute, MSG_WRONG_ROUTE, FeedbackCue::Error),
            None if req.manual => (ScanStatus::Manual, MSG_MANUAL, FeedbackCue::Success),
            None => (ScanStatus::ErrorNotFound, MSG_NOT_FOUND, FeedbackCue::Error),
        }
    };

    let record = ScanRecord::new(operator, route, req.tracking_code, status, message);
    Verdict { status, message, cue: Some(cue), record: Some(record) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{PackageEntry, Route};

    struct Fixture {
        operator: Operator,
        routes: RouteCatalog,
        index: ReferenceIndex,
        log: ScanLog,
    }

    impl Fixture {
        fn new() -> Self {
            let mut routes = RouteCatalog::new();
            routes
                .add(Route {
                    id: "r369".to_string(),
                    name: "Mutum".to_string(),
                    category: "A".to_string(),
                    prefixes: vec!["369".to_string()],
                    completed: false,
                })
                .unwrap();
            routes
                .add(Route {
                    id: "rall".to_string(),
                    name: "Todos".to_string(),
                    category: "B".to_string(),
                    prefixes: vec![],
                    completed: false,
                })
                .unwrap();

            let mut index = ReferenceIndex::new();
            index.bulk_load(&[
                PackageEntry::new("BR100", "36900000"),
                PackageEntry::new("BR200", "40000000"),
            ]);

            Self { operator: Operator::new("op-1", "Ana"), routes, index, log: ScanLog::new() }
        }

        fn ctx(&self) -> ScanContext<'_> {
            ScanContext {
                operator: Some(&self.operator),
                routes: &self.routes,
                index: &self.index,
                log: &self.log,
            }
        }

        /// Evaluate and append the record, as the store does
        fn scan(&mut self, code: &str, route_id: &str, manual: bool) -> Verdict {
            let verdict =
                evaluate(&self.ctx(), ScanRequest { tracking_code: code, route_id, manual });
            if let Some(record) = verdict.record.clone() {
                self.log.append_local(record);
            }
            verdict
        }
    }

    #[test]
    fn test_not_logged_in_short_circuits() {
        let fx = Fixture::new();
        let ctx = ScanContext { operator: None, ..fx.ctx() };
        let verdict =
            evaluate(&ctx, ScanRequest { tracking_code: "nope", route_id: "missing", manual: false });

        assert_eq!(verdict.status, ScanStatus::ErrorInvalid);
        assert_eq!(verdict.message, MSG_NOT_LOGGED_IN);
        assert!(verdict.cue.is_none());
        assert!(verdict.record.is_none());
    }

    #[test]
    fn test_unknown_route_is_invalid() {
        let mut fx = Fixture::new();
        let verdict = fx.scan("BR100", "missing", false);

        assert_eq!(verdict.status, ScanStatus::ErrorInvalid);
        assert_eq!(verdict.message, MSG_INVALID_ROUTE);
        assert!(verdict.cue.is_none());
        assert!(fx.log.is_empty());
    }

    #[test]
    fn test_bad_prefix_is_not_logged() {
        let mut fx = Fixture::new();
        for code in ["XX100", "B", "", "1BR", "ÇBR"] {
            let verdict = fx.scan(code, "r369", true);
            assert_eq!(verdict.status, ScanStatus::ErrorInvalid, "code {:?}", code);
            assert_eq!(verdict.message, MSG_BAD_PREFIX);
            assert_eq!(verdict.cue, Some(FeedbackCue::Error));
        }
        assert!(fx.log.is_empty());
    }

    #[test]
    fn test_prefix_check_ignores_case() {
        let mut fx = Fixture::new();
        let verdict = fx.scan("br999", "r369", false);
        assert_eq!(verdict.status, ScanStatus::ErrorNotFound);
    }

    #[test]
    fn test_matching_cep_succeeds() {
        let mut fx = Fixture::new();
        let verdict = fx.scan("BR100", "r369", false);

        assert_eq!(verdict.status, ScanStatus::Success);
        assert_eq!(verdict.message, MSG_SUCCESS);
        assert_eq!(verdict.cue, Some(FeedbackCue::Success));

        let record = verdict.record.unwrap();
        assert_eq!(record.operator_name, "Ana");
        assert_eq!(record.route_name, "Mutum");
        assert_eq!(record.status, ScanStatus::Success);
        assert_eq!(record.message, MSG_SUCCESS);
    }

    #[test]
    fn test_wrong_route_is_logged() {
        let mut fx = Fixture::new();
        let verdict = fx.scan("BR200", "r369", false);

        assert_eq!(verdict.status, ScanStatus::ErrorRoute);
        assert_eq!(verdict.message, MSG_WRONG_ROUTE);
        assert_eq!(verdict.cue, Some(FeedbackCue::Error));
        assert_eq!(fx.log.len(), 1);
    }

    #[test]
    fn test_wildcard_route_accepts_any_known_package() {
        let mut fx = Fixture::new();
        assert_eq!(fx.scan("BR200", "rall", false).status, ScanStatus::Success);
    }

    #[test]
    fn test_empty_cep_counts_as_not_found() {
        let mut fx = Fixture::new();
        fx.index.bulk_load(&[PackageEntry::new("BR300", "")]);

        assert_eq!(fx.scan("BR300", "rall", false).status, ScanStatus::ErrorNotFound);
        assert_eq!(fx.scan("BR300", "rall", true).status, ScanStatus::Manual);
    }

    #[test]
    fn test_not_found_then_manual_then_duplicate() {
        let mut fx = Fixture::new();

        let verdict = fx.scan("BR777", "r369", false);
        assert_eq!(verdict.status, ScanStatus::ErrorNotFound);
        assert_eq!(verdict.message, MSG_NOT_FOUND);

        let verdict = fx.scan("BR777", "r369", true);
        assert_eq!(verdict.status, ScanStatus::Manual);
        assert_eq!(verdict.message, MSG_MANUAL);
        assert_eq!(verdict.cue, Some(FeedbackCue::Success));

        assert_eq!(fx.scan("BR777", "r369", false).status, ScanStatus::ErrorDuplicate);
        assert_eq!(fx.scan("BR777", "r369", true).status, ScanStatus::ErrorDuplicate);
        assert_eq!(fx.log.len(), 4);
    }

    #[test]
    fn test_duplicate_spans_routes_and_is_logged() {
        let mut fx = Fixture::new();
        fx.scan("BR100", "r369", false);

        let verdict = fx.scan("BR100", "rall", false);
        assert_eq!(verdict.status, ScanStatus::ErrorDuplicate);
        assert_eq!(verdict.message, MSG_DUPLICATE);
        assert_eq!(verdict.cue, Some(FeedbackCue::Warning));

        let record = verdict.record.unwrap();
        assert_eq!(record.status, ScanStatus::ErrorDuplicate);
        assert_eq!(record.route_id, "rall");
        assert_eq!(fx.log.len(), 2);
    }

    #[test]
    fn test_rejected_scans_do_not_block_retry() {
        let mut fx = Fixture::new();
        assert_eq!(fx.scan("BR200", "r369", false).status, ScanStatus::ErrorRoute);
        assert_eq!(fx.scan("BR200", "rall", false).status, ScanStatus::Success);
    }

    #[test]
    fn test_duplicate_check_is_exact_match() {
        let mut fx = Fixture::new();
        fx.scan("BR777", "r369", true);
        // Different case is a different code
        assert_eq!(fx.scan("br777", "r369", true).status, ScanStatus::Manual);
    }

    #[test]
    fn test_duplicate_wins_over_route_mismatch() {
        let mut fx = Fixture::new();
        fx.scan("BR200", "rall", false);
        assert_eq!(fx.scan("BR200", "r369", false).status, ScanStatus::ErrorDuplicate);
    }
}

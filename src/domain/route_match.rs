//! CEP prefix matching between packages and routes

/// Keep only ASCII digits ("36.900-000" -> "36900000")
pub fn digits_only(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// First route prefix the postal code starts with, after normalization
///
/// Returns `None` for a wildcard route; use [`route_matches`] for the
/// full rule.
pub fn matching_prefix<'a>(postal_code: &str, prefixes: &'a [String]) -> Option<&'a str> {
    let candidate = digits_only(postal_code);
    prefixes
        .iter()
        .find(|prefix| candidate.starts_with(digits_only(prefix).as_str()))
        .map(|prefix| prefix.as_str())
}

/// A route matches when it has no prefixes or the CEP starts with one of them
#[inline]
pub fn route_matches(postal_code: &str, prefixes: &[String]) -> bool {
    prefixes.is_empty() || matching_prefix(postal_code, prefixes).is_some()
}

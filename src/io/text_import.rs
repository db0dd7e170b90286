//! Delimited text import and CSV report export
//!
//! Package lines: `code, cep` separated by any run of `,` TAB or `;`.
//! Route lines: `name;prefixes;category` separated by `;` or TAB, with the
//! prefixes themselves separated by commas.

use crate::domain::scan::ScanRecord;
use crate::domain::types::{PackageEntry, Route};
use anyhow::Context;
use chrono::Local;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ImportError {
    #[error("no valid rows found; expected lines like `code, cep`")]
    NoPackages,

    #[error("no valid rows found; expected lines like `name;prefixes;category`")]
    NoRoutes,
}

#[inline]
fn is_package_separator(c: char) -> bool {
    matches!(c, ',' | '\t' | ';')
}

/// Parse package rows; lines without a code and a CEP are skipped
pub fn parse_packages(text: &str) -> Result<Vec<PackageEntry>, ImportError> {
    let mut entries = Vec::new();
    for line in text.lines() {
        // Runs of separators count as one, so empty fields only appear at the edges
        let mut fields = line.split(is_package_separator).map(str::trim).filter(|f| !f.is_empty());
        if let (Some(code), Some(cep)) = (fields.next(), fields.next()) {
            entries.push(PackageEntry::new(code, cep));
        }
    }

    if entries.is_empty() {
        return Err(ImportError::NoPackages);
    }
    Ok(entries)
}

/// Split a comma-separated prefix list, dropping empty items
pub fn parse_prefixes(text: &str) -> Vec<String> {
    text.split(',').map(str::trim).filter(|p| !p.is_empty()).map(str::to_string).collect()
}

/// Parse route rows into new open routes
pub fn parse_routes(text: &str) -> Result<Vec<Route>, ImportError> {
    let mut routes = Vec::new();
    for line in text.lines() {
        let mut fields = line.split(|c| c == ';' || c == '\t').map(str::trim);
        let name = match fields.next() {
            Some(name) if !name.is_empty() => name,
            _ => continue,
        };
        let prefixes = fields.next().map(parse_prefixes).unwrap_or_default();
        let category = fields.next().filter(|c| !c.is_empty());
        routes.push(Route::new(name, prefixes, category));
    }

    if routes.is_empty() {
        return Err(ImportError::NoRoutes);
    }
    Ok(routes)
}

/// CSV report of a route's accepted scans, in the order given
pub fn route_report_csv<'a>(records: impl IntoIterator<Item = &'a ScanRecord>) -> anyhow::Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["Data Hora", "Operador", "Codigo Rastreio", "Status"])?;
    for record in records {
        let when = record.created_at.with_timezone(&Local).format("%d/%m/%Y %H:%M:%S").to_string();
        writer.write_record([
            when.as_str(),
            record.operator_name.as_str(),
            record.tracking_code.as_str(),
            record.status.as_str(),
        ])?;
    }
    let bytes = writer.into_inner().context("flushing report")?;
    Ok(String::from_utf8(bytes)?)
}

/// File name for a route report: whitespace runs become underscores
pub fn route_report_file_name(route_name: &str) -> String {
    format!("relatorio_rota_{}.csv", route_name.split_whitespace().collect::<Vec<_>>().join("_"))
}

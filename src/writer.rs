// src/writer.rs

use crate::error::Result;
use crate::model::{ProviderDetails, Report};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// `{provider}-contributors-{date}.json`
pub fn report_file_name(report: &Report) -> String {
    format!("{}-contributors-{}.json", report.provider.slug(), report.date)
}

/// Serialize the report into `dir`, replacing any report of the same day
pub fn write_report(report: &Report, dir: &Path) -> Result<PathBuf> {
    let path = dir.join(report_file_name(report));
    let json = serde_json::to_string_pretty(report)?;
    fs::write(&path, json)?;
    info!("Report written to {}", path.display());
    Ok(path)
}

pub fn log_summary(report: &Report) {
    info!(
        "{} repositories scanned on {}",
        report.total_repository_count, report.provider
    );
    if let ProviderDetails::GitHub {
        organization,
        org_members,
        org_contributors_count,
        all_contributors,
        ..
    } = &report.details
    {
        info!("Organization {organization} has {} members", org_members.len());
        info!(
            "{} unique authors, {} of them organization members",
            all_contributors.len(),
            org_contributors_count
        );
    }
    info!(
        "Total unique contributors in the last {} days: {}",
        report.number_of_days_history, report.total_contributor_count
    );
}

// src/model.rs

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// The source-control host a report was built against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    GitHub,
    GitLab,
    Bitbucket,
    AzureDevOps,
}

impl Provider {
    /// Prefix used for report file names
    pub fn slug(self) -> &'static str {
        match self {
            Provider::GitHub => "github",
            Provider::GitLab => "gitlab",
            Provider::Bitbucket => "bitbucket",
            Provider::AzureDevOps => "azure-devops",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Provider::GitHub => "GitHub",
            Provider::GitLab => "GitLab",
            Provider::Bitbucket => "Bitbucket",
            Provider::AzureDevOps => "Azure DevOps",
        };
        f.write_str(name)
    }
}

/// A repository discovered while enumerating a provider.
///
/// `id` is whatever the provider needs to address the repository again:
/// the full path on GitHub and Bitbucket, the numeric id on GitLab and
/// Azure DevOps. `name` is what repository filters match against and what
/// ends up in the report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    pub id: String,
    pub name: String,
    /// Owner login, group path, workspace or Azure DevOps project id
    pub namespace: String,
}

/// A normalized contributor key. Only comparable within one provider.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ContributorIdentity(String);

impl ContributorIdentity {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContributorIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What survives of a commit payload once the provider adapter is done with it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub author: Option<ContributorIdentity>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// The trailing time range commits are counted in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub number_of_days: u32,
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
}

impl Window {
    pub fn ending_now(number_of_days: u32) -> Self {
        Self::ending_at(Utc::now(), number_of_days)
    }

    /// Windows reaching past the earliest representable instant start there
    pub fn ending_at(until: DateTime<Utc>, number_of_days: u32) -> Self {
        let since = until
            .checked_sub_signed(Duration::days(i64::from(number_of_days)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        Self {
            number_of_days,
            since,
            until,
        }
    }

    pub fn since_rfc3339(&self) -> String {
        self.since.to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    pub fn until_rfc3339(&self) -> String {
        self.until.to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    /// True when `timestamp` falls before the start of the window
    pub fn predates(&self, timestamp: DateTime<Utc>) -> bool {
        timestamp < self.since
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryStats {
    pub name: String,
    pub contributor_count: usize,
    pub contributors: Vec<ContributorIdentity>,
}

impl RepositoryStats {
    pub fn new(name: impl Into<String>, contributors: BTreeSet<ContributorIdentity>) -> Self {
        Self {
            name: name.into(),
            contributor_count: contributors.len(),
            contributors: contributors.into_iter().collect(),
        }
    }
}

/// Fields only some providers report, flattened into the top-level JSON object
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ProviderDetails {
    GitHub {
        organization: String,
        org_members: Vec<String>,
        org_contributors: Vec<String>,
        org_contributors_count: usize,
        all_contributors: Vec<String>,
    },
    GitLab {
        all_contributors: Vec<String>,
    },
    Bitbucket {
        workspace: String,
        all_contributors: Vec<String>,
    },
    AzureDevOps {
        organization: String,
        all_contributor_emails: Vec<String>,
    },
}

/// The outcome of one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    #[serde(skip)]
    pub provider: Provider,
    pub date: String,
    pub number_of_days_history: u32,
    pub total_contributor_count: usize,
    pub total_repository_count: usize,
    pub repository_stats: Vec<RepositoryStats>,
    #[serde(flatten)]
    pub details: ProviderDetails,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn window_spans_the_requested_days() {
        let until = Utc.with_ymd_and_hms(2024, 3, 31, 12, 0, 0).unwrap();
        let window = Window::ending_at(until, 30);
        assert_eq!(window.since_rfc3339(), "2024-03-01T12:00:00Z");
        assert_eq!(window.until_rfc3339(), "2024-03-31T12:00:00Z");
        assert!(window.predates(Utc.with_ymd_and_hms(2024, 3, 1, 11, 59, 59).unwrap()));
        assert!(!window.predates(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()));
    }

    #[test]
    fn zero_day_window_is_empty() {
        let until = Utc.with_ymd_and_hms(2024, 3, 31, 12, 0, 0).unwrap();
        let window = Window::ending_at(until, 0);
        assert_eq!(window.since, window.until);
        assert!(window.predates(until - Duration::seconds(1)));
    }

    #[test]
    fn oversized_window_starts_at_the_earliest_instant() {
        let until = Utc.with_ymd_and_hms(2024, 3, 31, 12, 0, 0).unwrap();
        let window = Window::ending_at(until, 200_000_000);
        assert_eq!(window.since, DateTime::<Utc>::MIN_UTC);
        assert!(!window.predates(Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap()));

        let window = Window::ending_now(u32::MAX);
        assert_eq!(window.number_of_days, u32::MAX);
    }

    #[test]
    fn stats_are_sorted_and_counted() {
        let contributors: BTreeSet<_> = ["zoe", "adam", "mia"]
            .into_iter()
            .map(ContributorIdentity::new)
            .collect();
        let stats = RepositoryStats::new("repo", contributors);
        assert_eq!(stats.contributor_count, 3);
        assert_eq!(stats.contributors[0].as_str(), "adam");
        assert_eq!(stats.contributors[2].as_str(), "zoe");
    }

    #[test]
    fn report_flattens_provider_fields() {
        let report = Report {
            provider: Provider::Bitbucket,
            date: "2024-03-31".to_string(),
            number_of_days_history: 30,
            total_contributor_count: 1,
            total_repository_count: 1,
            repository_stats: vec![RepositoryStats::new(
                "api",
                BTreeSet::from([ContributorIdentity::new("Ada Lovelace")]),
            )],
            details: ProviderDetails::Bitbucket {
                workspace: "acme".to_string(),
                all_contributors: vec!["Ada Lovelace".to_string()],
            },
        };

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["workspace"], "acme");
        assert_eq!(value["all_contributors"][0], "Ada Lovelace");
        assert_eq!(value["repository_stats"][0]["contributor_count"], 1);
        assert_eq!(value["repository_stats"][0]["contributors"][0], "Ada Lovelace");
        assert!(value.get("provider").is_none());
        assert!(value.get("details").is_none());
    }
}

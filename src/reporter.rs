// src/reporter.rs

use crate::config::ReportConfig;
use crate::error::Result;
use crate::model::{
    ContributorIdentity, Provider, ProviderDetails, Report, Repository, RepositoryStats, Window,
};
use crate::providers::ProviderClient;
use indicatif::{ParallelProgressIterator, ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, info, warn};

/// Turns one provider's repositories and commits into a [`Report`]
pub struct ContributorReporter<P> {
    client: P,
    config: ReportConfig,
}

impl<P: ProviderClient> ContributorReporter<P> {
    pub fn new(client: P, config: ReportConfig) -> Self {
        Self { client, config }
    }

    pub fn report(&self) -> Result<Report> {
        self.report_for(&Window::ending_now(self.config.number_of_days))
    }

    pub fn report_for(&self, window: &Window) -> Result<Report> {
        let provider = self.client.provider();
        info!(
            %provider,
            target = self.client.target(),
            since = %window.since_rfc3339(),
            "Creating contributors report"
        );

        // 1. Organization members first, so an unreachable organization fails fast
        let members = self.client.org_members()?;

        // 2. Enumerate and filter before any commit is requested
        let repositories = self.select_repositories()?;
        info!("Scanning {} repositories", repositories.len());

        // 3. Scan each repository's commits in the window
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.concurrency.max(1))
            .build()?;
        let bar = ProgressBar::new(repositories.len() as u64);
        if let Ok(style) = ProgressStyle::with_template("{msg} [{bar:40}] {pos}/{len} ({eta})") {
            bar.set_style(style);
        }
        bar.set_message("Scanning repositories");

        let repository_stats: Vec<RepositoryStats> = pool.install(|| {
            repositories
                .par_iter()
                .progress_with(bar.clone())
                .filter_map(|repository| self.scan(repository, window))
                .collect()
        });
        bar.finish_and_clear();

        // 4. Merge the per-repository sets
        let all_contributors: BTreeSet<&ContributorIdentity> = repository_stats
            .iter()
            .flat_map(|stats| stats.contributors.iter())
            .collect();
        let all_contributors: Vec<String> = all_contributors
            .into_iter()
            .map(|identity| identity.as_str().to_string())
            .collect();

        let (total_contributor_count, details) =
            self.details(provider, all_contributors, members);

        Ok(Report {
            provider,
            date: window.until.format("%Y-%m-%d").to_string(),
            number_of_days_history: window.number_of_days,
            total_contributor_count,
            total_repository_count: repository_stats.len(),
            repository_stats,
            details,
        })
    }

    fn select_repositories(&self) -> Result<Vec<Repository>> {
        let filter = &self.config.repository_filter;
        let mut seen = HashSet::new();
        let mut selected = Vec::new();

        for repository in self.client.repositories()? {
            if !filter.allows(&repository.name) {
                debug!(repository = %repository.name, "Skipping repository");
                continue;
            }
            if !seen.insert(repository.id.clone()) {
                continue;
            }
            selected.push(repository);
        }

        if !filter.is_empty() && selected.len() < filter.len() {
            warn!(
                requested = filter.len(),
                found = selected.len(),
                "Some filtered repositories were not found"
            );
        }
        Ok(selected)
    }

    /// Contributors of one repository, or `None` when its commits could not be listed
    fn scan(&self, repository: &Repository, window: &Window) -> Option<RepositoryStats> {
        debug!(repository = %repository.name, "Processing repository");
        let mut commits = self.client.commits(repository, window);
        let mut contributors = BTreeSet::new();
        let mut commit_count = 0usize;

        for commit in commits.by_ref() {
            commit_count += 1;
            if let Some(author) = commit.author {
                contributors.insert(author);
            }
        }

        if commits.failed() {
            warn!(repository = %repository.name, "Skipping repository: commits could not be listed");
            return None;
        }

        debug!(
            repository = %repository.name,
            commits = commit_count,
            pages = commits.pages_fetched(),
            "Listed commits"
        );
        info!(
            "Repository: {} - Contributors: {}",
            repository.name,
            contributors.len()
        );
        Some(RepositoryStats::new(repository.name.as_str(), contributors))
    }

    /// Headline count and provider-specific fields
    fn details(
        &self,
        provider: Provider,
        all_contributors: Vec<String>,
        members: Option<BTreeSet<String>>,
    ) -> (usize, ProviderDetails) {
        let target = self.client.target().to_string();
        match provider {
            Provider::GitHub => {
                let members = members.unwrap_or_default();
                let org_contributors: Vec<String> = all_contributors
                    .iter()
                    .filter(|identity| members.contains(identity.as_str()))
                    .cloned()
                    .collect();
                let count = org_contributors.len();
                (
                    count,
                    ProviderDetails::GitHub {
                        organization: target,
                        org_members: members.into_iter().collect(),
                        org_contributors,
                        org_contributors_count: count,
                        all_contributors,
                    },
                )
            }
            Provider::GitLab => (
                all_contributors.len(),
                ProviderDetails::GitLab { all_contributors },
            ),
            Provider::Bitbucket => (
                all_contributors.len(),
                ProviderDetails::Bitbucket {
                    workspace: target,
                    all_contributors,
                },
            ),
            Provider::AzureDevOps => (
                all_contributors.len(),
                ProviderDetails::AzureDevOps {
                    organization: target,
                    all_contributor_emails: all_contributors,
                },
            ),
        }
    }
}

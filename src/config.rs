// src/config.rs

use crate::cli::{Args, Command, CommonArgs};
use crate::error::{Error, Result};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
pub const DEFAULT_GITLAB_HOSTNAME: &str = "gitlab.com";
/// A century of history
pub const MAX_NUMBER_OF_DAYS: u32 = 36_500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitHubConfig {
    pub api_key: String,
    pub org_name: String,
    pub api_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitLabConfig {
    pub api_key: String,
    pub hostname: String,
    /// Full path of one group; every visible group when absent
    pub group: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitbucketConfig {
    pub api_key: String,
    pub workspace: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AzureDevOpsConfig {
    pub api_key: String,
    pub organization: String,
    /// Send the key as a personal access token over HTTP Basic
    pub basic_auth: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderConfig {
    GitHub(GitHubConfig),
    GitLab(GitLabConfig),
    Bitbucket(BitbucketConfig),
    AzureDevOps(AzureDevOpsConfig),
}

/// Allow-list of repository names. Empty means every repository.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepositoryFilter(BTreeSet<String>);

impl RepositoryFilter {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            names
                .into_iter()
                .map(|name| name.as_ref().trim().to_string())
                .filter(|name| !name.is_empty())
                .collect(),
        )
    }

    /// Union of a comma-separated list and a newline-delimited file
    pub fn from_sources(list: Option<&str>, file: Option<&Path>) -> Result<Self> {
        let mut names: Vec<String> = list
            .map(|list| list.split(',').map(str::to_string).collect())
            .unwrap_or_default();

        if let Some(path) = file {
            let contents = fs::read_to_string(path).map_err(|e| {
                Error::Config(format!("Repository file {} could not be read: {e}", path.display()))
            })?;
            names.extend(contents.lines().map(str::to_string));
        }

        Ok(Self::new(names))
    }

    pub fn allows(&self, repository: &str) -> bool {
        self.0.is_empty() || self.0.contains(repository)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportConfig {
    pub number_of_days: u32,
    pub repository_filter: RepositoryFilter,
    /// Worker threads scanning repositories; 1 scans them one after another
    pub concurrency: usize,
}

/// Everything one invocation needs, validated before any request is sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub provider: ProviderConfig,
    pub report: ReportConfig,
    pub output_dir: Option<PathBuf>,
}

impl RunConfig {
    pub fn from_args(args: Args) -> Result<Self> {
        let (provider, common) = match args.command {
            Command::Github(github) => (
                ProviderConfig::GitHub(GitHubConfig {
                    api_key: require_key(github.api_key, "GitHub", "GITHUB_API_KEY")?,
                    org_name: github.org_name,
                    api_url: github.api_url,
                }),
                github.common,
            ),
            Command::Gitlab(gitlab) => (
                ProviderConfig::GitLab(GitLabConfig {
                    api_key: require_key(gitlab.api_key, "GitLab", "GITLAB_API_KEY")?,
                    hostname: gitlab.hostname,
                    group: gitlab.group.filter(|group| !group.trim().is_empty()),
                }),
                gitlab.common,
            ),
            Command::Bitbucket(bitbucket) => (
                ProviderConfig::Bitbucket(BitbucketConfig {
                    api_key: require_key(bitbucket.api_key, "Bitbucket", "BITBUCKET_API_KEY")?,
                    workspace: bitbucket.workspace,
                }),
                bitbucket.common,
            ),
            Command::AzureDevops(azure) => (
                ProviderConfig::AzureDevOps(AzureDevOpsConfig {
                    api_key: require_key(azure.api_key, "Azure DevOps", "AZURE_DEVOPS_API_KEY")?,
                    organization: azure.organization,
                    basic_auth: azure.basic_auth,
                }),
                azure.common,
            ),
        };

        let CommonArgs {
            number_of_days,
            output_dir,
            repo_file,
            repositories,
            concurrency,
        } = common;

        if let Some(dir) = &output_dir {
            if !dir.is_dir() {
                return Err(Error::Config(format!(
                    "Output directory {} does not exist",
                    dir.display()
                )));
            }
        }

        let repository_filter =
            RepositoryFilter::from_sources(repositories.as_deref(), repo_file.as_deref())?;

        Ok(Self {
            provider,
            report: ReportConfig {
                number_of_days,
                repository_filter,
                concurrency: concurrency.max(1),
            },
            output_dir,
        })
    }
}

fn require_key(key: Option<String>, provider: &str, env_var: &str) -> Result<String> {
    match key.map(|key| key.trim().to_string()) {
        Some(key) if !key.is_empty() => Ok(key),
        _ => Err(Error::Config(format!(
            "{provider} API key missing: pass --api-key or set {env_var}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn missing_api_key_is_a_config_error() {
        let args = parse(&["repo-contributors", "bitbucket", "--workspace", "acme", "--api-key", " "]);
        let err = RunConfig::from_args(args).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("BITBUCKET_API_KEY"));
    }

    #[test]
    fn builds_github_config_with_defaults() {
        let args = parse(&["repo-contributors", "github", "--api-key", "t0k3n", "--org-name", "acme"]);
        let config = RunConfig::from_args(args).unwrap();
        assert_eq!(
            config.provider,
            ProviderConfig::GitHub(GitHubConfig {
                api_key: "t0k3n".to_string(),
                org_name: "acme".to_string(),
                api_url: DEFAULT_GITHUB_API_URL.to_string(),
            })
        );
        assert_eq!(config.report.number_of_days, 30);
        assert!(config.report.repository_filter.is_empty());
        assert_eq!(config.output_dir, None);
    }

    #[test]
    fn filter_is_the_union_of_list_and_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "api\n\n  web  \nshared").unwrap();

        let filter =
            RepositoryFilter::from_sources(Some("web, cli ,"), Some(file.path())).unwrap();

        assert_eq!(filter.len(), 4);
        for name in ["api", "web", "cli", "shared"] {
            assert!(filter.allows(name), "{name} should be allowed");
        }
        assert!(!filter.allows("docs"));
    }

    #[test]
    fn empty_filter_allows_everything() {
        let filter = RepositoryFilter::from_sources(None, None).unwrap();
        assert!(filter.allows("anything"));
    }

    #[test]
    fn unreadable_repo_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("repos.txt");
        let err = RepositoryFilter::from_sources(None, Some(&missing)).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn output_dir_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let args = parse(&[
            "repo-contributors",
            "gitlab",
            "--api-key",
            "t0k3n",
            "--output-dir",
            missing.to_str().unwrap(),
        ]);
        assert!(matches!(RunConfig::from_args(args), Err(Error::Config(_))));
    }

    #[test]
    fn gitlab_blank_group_means_all_groups() {
        let args = parse(&["repo-contributors", "gitlab", "--api-key", "k", "--group", ""]);
        match RunConfig::from_args(args).unwrap().provider {
            ProviderConfig::GitLab(gitlab) => {
                assert_eq!(gitlab.group, None);
                assert_eq!(gitlab.hostname, DEFAULT_GITLAB_HOSTNAME);
            }
            other => panic!("unexpected provider: {other:?}"),
        }
    }
}

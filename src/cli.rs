// src/cli.rs

use crate::config::{DEFAULT_GITHUB_API_URL, DEFAULT_GITLAB_HOSTNAME, MAX_NUMBER_OF_DAYS};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Count unique commit authors across an organization's repositories
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Contributors to a GitHub organization
    Github(GithubArgs),
    /// Contributors to GitLab groups
    Gitlab(GitlabArgs),
    /// Contributors to a Bitbucket workspace
    Bitbucket(BitbucketArgs),
    /// Contributors to an Azure DevOps organization
    AzureDevops(AzureDevopsArgs),
}

#[derive(clap::Args, Debug)]
pub struct CommonArgs {
    /// Number of days of history to count contributors over
    #[arg(
        long,
        default_value_t = 30,
        value_parser = clap::value_parser!(u32).range(0..=i64::from(MAX_NUMBER_OF_DAYS))
    )]
    pub number_of_days: u32,

    /// Directory to write the JSON report to
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// File with repository names to filter by, one per line
    #[arg(long)]
    pub repo_file: Option<PathBuf>,

    /// Comma separated repository names to filter by
    #[arg(long)]
    pub repositories: Option<String>,

    /// Repositories scanned at the same time
    #[arg(long, default_value_t = 4)]
    pub concurrency: usize,
}

#[derive(clap::Args, Debug)]
pub struct GithubArgs {
    /// GitHub API key
    #[arg(long, env = "GITHUB_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Name of the organization to get contributors for
    #[arg(long, env = "GITHUB_ORG_NAME")]
    pub org_name: String,

    /// Base URL of the GitHub API, for GitHub Enterprise Server
    #[arg(long, default_value = DEFAULT_GITHUB_API_URL)]
    pub api_url: String,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(clap::Args, Debug)]
pub struct GitlabArgs {
    /// GitLab API key
    #[arg(long, env = "GITLAB_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Hostname of the GitLab instance
    #[arg(long, default_value = DEFAULT_GITLAB_HOSTNAME)]
    pub hostname: String,

    /// Full path of the group to get contributors for; every visible group when omitted
    #[arg(long, env = "GITLAB_GROUP")]
    pub group: Option<String>,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(clap::Args, Debug)]
pub struct BitbucketArgs {
    /// Bitbucket API key
    #[arg(long, env = "BITBUCKET_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Bitbucket workspace
    #[arg(long, env = "BITBUCKET_WORKSPACE")]
    pub workspace: String,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(clap::Args, Debug)]
pub struct AzureDevopsArgs {
    /// Azure DevOps API key
    #[arg(long, env = "AZURE_DEVOPS_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Azure DevOps organization
    #[arg(long, env = "AZURE_DEVOPS_ORGANIZATION")]
    pub organization: String,

    /// Send the API key as a personal access token using HTTP Basic auth
    #[arg(long)]
    pub basic_auth: bool,

    #[command(flatten)]
    pub common: CommonArgs,
}

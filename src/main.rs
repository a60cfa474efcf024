// src/main.rs

mod cli;
mod config;
mod error;
mod http;
mod model;
mod pages;
mod providers;
mod reporter;
mod writer;

use clap::Parser;
use cli::Args;
use config::{ProviderConfig, ReportConfig, RunConfig};
use error::Result;
use model::Report;
use providers::{AzureDevOpsClient, BitbucketClient, GitHubClient, GitLabClient, ProviderClient};
use reporter::ContributorReporter;
use std::process::ExitCode;
use std::time::Instant;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let args = Args::parse();

    let default_level = if args.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let start_time = Instant::now();
    match run(args) {
        Ok(()) => {
            info!("Finished in {:.2?}", start_time.elapsed());
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    // all validation happens here, before any client is built
    let RunConfig {
        provider,
        report,
        output_dir,
    } = RunConfig::from_args(args)?;

    let report = match provider {
        ProviderConfig::GitHub(config) => report_with(GitHubClient::new(&config)?, report)?,
        ProviderConfig::GitLab(config) => report_with(GitLabClient::new(&config)?, report)?,
        ProviderConfig::Bitbucket(config) => report_with(BitbucketClient::new(&config)?, report)?,
        ProviderConfig::AzureDevOps(config) => {
            report_with(AzureDevOpsClient::new(&config)?, report)?
        }
    };

    if let Some(dir) = output_dir {
        writer::write_report(&report, &dir)?;
    }
    writer::log_summary(&report);
    Ok(())
}

fn report_with<P: ProviderClient>(client: P, config: ReportConfig) -> Result<Report> {
    ContributorReporter::new(client, config).report()
}

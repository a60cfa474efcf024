// src/providers/azure_devops.rs

use super::{credential_header, decode_items, page_items, ProviderClient};
use crate::config::AzureDevOpsConfig;
use crate::error::Result;
use crate::http::{ApiClient, Reply, RetryPolicy};
use crate::model::{Commit, ContributorIdentity, Provider, Repository, Window};
use crate::pages::{Page, Pages};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, AUTHORIZATION};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

const API_VERSION: &str = "7.1";
const PAGE_SIZE: usize = 100;
const CONTINUATION_HEADER: &str = "x-ms-continuationtoken";

#[derive(Debug, Deserialize)]
struct AdoProject {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct AdoRepository {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct AdoCommitAuthor {
    email: Option<String>,
    date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct AdoCommit {
    author: AdoCommitAuthor,
}

impl From<AdoCommit> for Commit {
    /// Lower-cased author email; commits without one carry no identity
    fn from(commit: AdoCommit) -> Self {
        Commit {
            author: commit
                .author
                .email
                .map(|email| email.trim().to_lowercase())
                .filter(|email| !email.is_empty())
                .map(ContributorIdentity::new),
            timestamp: commit.author.date,
        }
    }
}

/// `Authorization` value for a personal access token sent over HTTP Basic
pub fn basic_auth(token: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!(":{token}")))
}

pub struct AzureDevOpsClient {
    api: ApiClient,
    organization: String,
}

impl AzureDevOpsClient {
    pub fn new(config: &AzureDevOpsConfig) -> Result<Self> {
        let authorization = if config.basic_auth {
            basic_auth(&config.api_key)
        } else {
            format!("Bearer {}", config.api_key)
        };
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, credential_header(&authorization)?);

        let api = ApiClient::new(
            format!("https://dev.azure.com/{}", config.organization),
            headers,
            RetryPolicy::default(),
        )?;
        Ok(Self::with_api(api, &config.organization))
    }

    pub fn with_api(api: ApiClient, organization: &str) -> Self {
        Self {
            api,
            organization: organization.to_string(),
        }
    }

    fn projects(&self) -> Result<Pages<'_, AdoProject>> {
        let mut continuation: Option<String> = None;
        let mut started = false;

        Pages::new(format!("projects of organization {}", self.organization), move || {
            if started && continuation.is_none() {
                return Page::End;
            }
            started = true;

            let mut params = vec![
                ("api-version", API_VERSION.to_string()),
                ("$top", PAGE_SIZE.to_string()),
                ("stateFilter", "wellFormed".to_string()),
            ];
            if let Some(token) = continuation.take() {
                params.push(("continuationToken", token));
            }

            match self.api.get("/_apis/projects", &params) {
                Reply::Ok { body, headers } => {
                    continuation = body
                        .get("continuationToken")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .or_else(|| {
                            headers
                                .get(CONTINUATION_HEADER)
                                .and_then(|value| value.to_str().ok())
                                .map(str::to_string)
                        })
                        .filter(|token| !token.is_empty());
                    match page_items(body, Some("value")) {
                        Some(items) => Page::Items {
                            items: decode_items(items, "project"),
                            more: continuation.is_some(),
                        },
                        None => Page::Failed,
                    }
                }
                Reply::NotFound { .. } => Page::End,
                Reply::Failed { .. } => Page::Failed,
            }
        })
        .require_first_page(Provider::AzureDevOps)
    }

    /// Repositories of one project; the endpoint is not paged
    fn project_repositories(&self, project: &AdoProject) -> Pages<'_, Repository> {
        let label = format!("repositories of project {}", project.name);
        let items = match self.api.get(
            &format!("/{}/_apis/git/repositories", project.id),
            &[("api-version", API_VERSION.to_string())],
        ) {
            Reply::Ok { body, .. } => page_items(body, Some("value")),
            Reply::NotFound { .. } => Some(Vec::new()),
            Reply::Failed { .. } => None,
        };

        let Some(items) = items else {
            warn!(project = %project.name, "skipping project whose repositories could not be listed");
            return Pages::single(label, Vec::new());
        };

        let repositories = decode_items::<AdoRepository>(items, "repository")
            .into_iter()
            .map(|repo| Repository {
                id: repo.id,
                name: repo.name,
                namespace: project.id.clone(),
            })
            .collect();
        Pages::single(label, repositories)
    }
}

impl ProviderClient for AzureDevOpsClient {
    fn provider(&self) -> Provider {
        Provider::AzureDevOps
    }

    fn target(&self) -> &str {
        &self.organization
    }

    fn repositories(&self) -> Result<Box<dyn Iterator<Item = Repository> + '_>> {
        let projects = self.projects()?;
        Ok(Box::new(
            projects.flat_map(move |project| self.project_repositories(&project)),
        ))
    }

    /// `commitsbatch` pages by `$skip` until a page comes back short
    fn commits<'a>(&'a self, repository: &Repository, window: &Window) -> Pages<'a, Commit> {
        let path = format!(
            "/{}/_apis/git/repositories/{}/commitsbatch",
            repository.namespace, repository.id
        );
        let body = json!({ "fromDate": window.since_rfc3339() });
        let mut skip = 0usize;

        Pages::new(format!("commits of {}", repository.name), move || {
            let mut params = vec![
                ("api-version", API_VERSION.to_string()),
                ("$top", PAGE_SIZE.to_string()),
            ];
            if skip > 0 {
                params.push(("$skip", skip.to_string()));
            }

            match self.api.request(Method::POST, &path, &params, Some(&body)) {
                Reply::Ok { body, .. } => match page_items(body, Some("value")) {
                    Some(items) => {
                        let more = items.len() >= PAGE_SIZE;
                        skip += PAGE_SIZE;
                        Page::Items {
                            items: decode_items::<AdoCommit>(items, "commit")
                                .into_iter()
                                .map(Commit::from)
                                .collect(),
                            more,
                        }
                    }
                    None => Page::Failed,
                },
                Reply::NotFound { .. } => Page::End,
                Reply::Failed { .. } => Page::Failed,
            }
        })
    }
}

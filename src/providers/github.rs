// src/providers/github.rs

use super::{credential_header, decode_items, page_items, ProviderClient};
use crate::config::GitHubConfig;
use crate::error::Result;
use crate::http::{ApiClient, Reply, RetryPolicy};
use crate::model::{Commit, ContributorIdentity, Provider, Repository, Window};
use crate::pages::{Page, Pages};
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, LINK};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::warn;

#[derive(Debug, Deserialize)]
struct GhOwner {
    login: String,
}

#[derive(Debug, Deserialize)]
struct GhRepository {
    name: String,
    full_name: String,
    owner: GhOwner,
}

#[derive(Debug, Deserialize)]
struct GhMember {
    login: String,
}

/// The git-level author recorded in the commit object
#[derive(Debug, Deserialize)]
struct GhGitAuthor {
    name: Option<String>,
    date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct GhCommitDetail {
    author: Option<GhGitAuthor>,
}

/// The GitHub account linked to the commit, when GitHub could match one
#[derive(Debug, Deserialize)]
struct GhAuthor {
    login: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GhCommit {
    commit: GhCommitDetail,
    author: Option<GhAuthor>,
}

impl GhCommit {
    /// Account login when linked, otherwise the git author name
    fn identity(&self) -> Option<ContributorIdentity> {
        let login = self.author.as_ref().and_then(|a| a.login.as_deref());
        let name = self.commit.author.as_ref().and_then(|a| a.name.as_deref());
        login
            .filter(|login| !login.is_empty())
            .or(name.filter(|name| !name.is_empty()))
            .map(ContributorIdentity::new)
    }

    fn into_commit(self) -> Commit {
        Commit {
            author: self.identity(),
            timestamp: self.commit.author.and_then(|a| a.date),
        }
    }
}

/// Target of the `rel="next"` entry of an RFC 5988 `Link` header
pub fn next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|entry| {
        let mut parts = entry.split(';');
        let target = parts.next()?.trim();
        let is_next = parts.any(|param| {
            let param = param.trim();
            param == r#"rel="next""# || param == "rel=next"
        });
        if !is_next {
            return None;
        }
        target
            .strip_prefix('<')
            .and_then(|t| t.strip_suffix('>'))
            .map(str::to_string)
    })
}

pub struct GitHubClient {
    api: ApiClient,
    org_name: String,
}

impl GitHubClient {
    pub fn new(config: &GitHubConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, credential_header(&format!("Bearer {}", config.api_key))?);
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("x-github-api-version", HeaderValue::from_static("2022-11-28"));

        let api = ApiClient::new(&config.api_url, headers, RetryPolicy::default())?;
        Ok(Self::with_api(api, &config.org_name))
    }

    pub fn with_api(api: ApiClient, org_name: &str) -> Self {
        Self {
            api,
            org_name: org_name.to_string(),
        }
    }

    /// Follow `Link: rel="next"` until it disappears
    fn linked_pages<'a, T: 'a>(
        &'a self,
        label: String,
        path: String,
        params: Vec<(&'static str, String)>,
        convert: impl Fn(Vec<Value>) -> Vec<T> + 'a,
    ) -> Pages<'a, T> {
        let mut next = Some(path);
        let mut params = params;

        Pages::new(label, move || {
            let Some(url) = next.take() else {
                return Page::End;
            };
            let reply = self.api.get(&url, &params);
            // next links already carry the query string
            params.clear();

            match reply {
                Reply::Ok { body, headers } => {
                    next = headers
                        .get(LINK)
                        .and_then(|value| value.to_str().ok())
                        .and_then(next_link);
                    match page_items(body, None) {
                        Some(items) => Page::Items {
                            items: convert(items),
                            more: next.is_some(),
                        },
                        None => {
                            warn!(%url, "expected a list in the response");
                            Page::Failed
                        }
                    }
                }
                Reply::NotFound { .. } => Page::End,
                // GitHub answers 409 for repositories without any commits
                Reply::Failed { status: Some(status), .. } if status == StatusCode::CONFLICT => {
                    Page::End
                }
                Reply::Failed { .. } => Page::Failed,
            }
        })
    }
}

impl ProviderClient for GitHubClient {
    fn provider(&self) -> Provider {
        Provider::GitHub
    }

    fn target(&self) -> &str {
        &self.org_name
    }

    fn repositories(&self) -> Result<Box<dyn Iterator<Item = Repository> + '_>> {
        let pages = self
            .linked_pages(
                format!("repositories of organization {}", self.org_name),
                format!("/orgs/{}/repos", self.org_name),
                vec![("per_page", "100".to_string())],
                |items| {
                    decode_items::<GhRepository>(items, "repository")
                        .into_iter()
                        .map(|repo| Repository {
                            id: repo.full_name,
                            name: repo.name,
                            namespace: repo.owner.login,
                        })
                        .collect()
                },
            )
            .require_first_page(Provider::GitHub)?;
        Ok(Box::new(pages))
    }

    fn commits<'a>(&'a self, repository: &Repository, window: &Window) -> Pages<'a, Commit> {
        self.linked_pages(
            format!("commits of {}", repository.id),
            format!("/repos/{}/commits", repository.id),
            vec![
                ("since", window.since_rfc3339()),
                ("until", window.until_rfc3339()),
                ("per_page", "100".to_string()),
            ],
            |items| {
                decode_items::<GhCommit>(items, "commit")
                    .into_iter()
                    .map(GhCommit::into_commit)
                    .collect()
            },
        )
    }

    fn org_members(&self) -> Result<Option<BTreeSet<String>>> {
        let members = self
            .linked_pages(
                format!("members of organization {}", self.org_name),
                format!("/orgs/{}/members", self.org_name),
                vec![("per_page", "100".to_string())],
                |items| {
                    decode_items::<GhMember>(items, "member")
                        .into_iter()
                        .map(|member| member.login)
                        .filter(|login| !login.is_empty())
                        .collect()
                },
            )
            .require_first_page(Provider::GitHub)?;
        Ok(Some(members.collect()))
    }
}

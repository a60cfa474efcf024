// src/providers/bitbucket.rs

use super::{credential_header, decode_items, page_items, ProviderClient};
use crate::config::BitbucketConfig;
use crate::error::Result;
use crate::http::{ApiClient, Reply, RetryPolicy};
use crate::model::{Commit, ContributorIdentity, Provider, Repository, Window};
use crate::pages::{Page, Pages};
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, AUTHORIZATION};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

const API_URL: &str = "https://api.bitbucket.org/2.0";

#[derive(Debug, Deserialize)]
struct BbRepository {
    name: String,
    full_name: String,
}

#[derive(Debug, Deserialize)]
struct BbUser {
    display_name: String,
}

#[derive(Debug, Deserialize)]
struct BbAuthor {
    raw: String,
    user: Option<BbUser>,
}

#[derive(Debug, Deserialize)]
struct BbCommit {
    #[serde(default)]
    hash: String,
    date: String,
    author: BbAuthor,
}

impl BbCommit {
    /// Linked account display name, otherwise the raw `Name <email>` string
    fn identity(&self) -> ContributorIdentity {
        match &self.author.user {
            Some(user) => ContributorIdentity::new(user.display_name.as_str()),
            None => ContributorIdentity::new(self.author.raw.as_str()),
        }
    }

    fn into_commit(self) -> Option<Commit> {
        match DateTime::parse_from_rfc3339(&self.date) {
            Ok(date) => Some(Commit {
                author: Some(self.identity()),
                timestamp: Some(date.with_timezone(&Utc)),
            }),
            Err(e) => {
                warn!(hash = %self.hash, date = %self.date, error = %e, "skipping commit with unreadable date");
                None
            }
        }
    }
}

pub struct BitbucketClient {
    api: ApiClient,
    workspace: String,
}

impl BitbucketClient {
    pub fn new(config: &BitbucketConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, credential_header(&format!("Bearer {}", config.api_key))?);

        let api = ApiClient::new(API_URL, headers, RetryPolicy::default())?;
        Ok(Self::with_api(api, &config.workspace))
    }

    pub fn with_api(api: ApiClient, workspace: &str) -> Self {
        Self {
            api,
            workspace: workspace.to_string(),
        }
    }

    /// Follow the `next` URL embedded in each page body
    fn next_url_pages<'a, T: 'a>(
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
            params.clear();

            match reply {
                Reply::Ok { body, .. } => {
                    next = body
                        .get("next")
                        .and_then(Value::as_str)
                        .map(str::to_string);
                    match page_items(body, Some("values")) {
                        Some(items) => Page::Items {
                            items: convert(items),
                            more: next.is_some(),
                        },
                        None => {
                            warn!(%url, "expected a paged object in the response");
                            Page::Failed
                        }
                    }
                }
                Reply::NotFound { .. } => Page::End,
                Reply::Failed { .. } => Page::Failed,
            }
        })
    }
}

impl ProviderClient for BitbucketClient {
    fn provider(&self) -> Provider {
        Provider::Bitbucket
    }

    fn target(&self) -> &str {
        &self.workspace
    }

    fn repositories(&self) -> Result<Box<dyn Iterator<Item = Repository> + '_>> {
        let workspace = self.workspace.clone();
        let pages = self
            .next_url_pages(
                format!("repositories of workspace {}", self.workspace),
                format!("/repositories/{}", self.workspace),
                vec![("pagelen", "100".to_string())],
                move |items| {
                    decode_items::<BbRepository>(items, "repository")
                        .into_iter()
                        .map(|repo| Repository {
                            id: repo.full_name,
                            name: repo.name,
                            namespace: workspace.clone(),
                        })
                        .collect()
                },
            )
            .require_first_page(Provider::Bitbucket)?;
        Ok(Box::new(pages))
    }

    /// Bitbucket cannot filter commits by date, so the newest-first stream is
    /// cut off at the first commit older than the window.
    fn commits<'a>(&'a self, repository: &Repository, window: &Window) -> Pages<'a, Commit> {
        let window = *window;
        self.next_url_pages(
            format!("commits of {}", repository.id),
            format!("/repositories/{}/commits", repository.id),
            vec![("pagelen", "100".to_string())],
            |items| {
                decode_items::<BbCommit>(items, "commit")
                    .into_iter()
                    .filter_map(BbCommit::into_commit)
                    .collect()
            },
        )
        .stop_at(move |commit| commit.timestamp.is_some_and(|ts| window.predates(ts)))
    }
}

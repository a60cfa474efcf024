// src/providers/gitlab.rs

use super::{credential_header, decode_items, page_items, ProviderClient};
use crate::config::GitLabConfig;
use crate::error::{Error, Result};
use crate::http::{ApiClient, Reply, RetryPolicy};
use crate::model::{Commit, ContributorIdentity, Provider, Repository, Window};
use crate::pages::{Page, Pages};
use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

const PER_PAGE: &str = "100";

#[derive(Debug, Deserialize)]
struct GlGroup {
    id: u64,
    full_path: String,
}

#[derive(Debug, Deserialize)]
struct GlProject {
    id: u64,
    path_with_namespace: String,
}

impl From<GlProject> for Repository {
    fn from(project: GlProject) -> Self {
        let namespace = project
            .path_with_namespace
            .rsplit_once('/')
            .map(|(namespace, _)| namespace.to_string())
            .unwrap_or_default();
        Repository {
            id: project.id.to_string(),
            name: project.path_with_namespace,
            namespace,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GlCommit {
    author_name: String,
    authored_date: Option<DateTime<Utc>>,
}

impl From<GlCommit> for Commit {
    fn from(commit: GlCommit) -> Self {
        Commit {
            author: Some(commit.author_name)
                .filter(|name| !name.is_empty())
                .map(ContributorIdentity::new),
            timestamp: commit.authored_date,
        }
    }
}

pub struct GitLabClient {
    api: ApiClient,
    hostname: String,
    group: Option<String>,
}

impl GitLabClient {
    pub fn new(config: &GitLabConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert("private-token", credential_header(&config.api_key)?);

        let api = ApiClient::new(
            format!("https://{}/api/v4", config.hostname),
            headers,
            RetryPolicy::default(),
        )?;
        Ok(Self::with_api(api, &config.hostname, config.group.as_deref()))
    }

    pub fn with_api(api: ApiClient, hostname: &str, group: Option<&str>) -> Self {
        Self {
            api,
            hostname: hostname.to_string(),
            group: group.map(str::to_string),
        }
    }

    /// Bump `page` until the provider returns an empty list
    fn numbered_pages<'a, T: 'a>(
        &'a self,
        label: String,
        path: String,
        params: Vec<(&'static str, String)>,
        convert: impl Fn(Vec<Value>) -> Vec<T> + 'a,
    ) -> Pages<'a, T> {
        let mut page = 1u32;

        Pages::new(label, move || {
            let mut query = params.clone();
            query.push(("page", page.to_string()));
            query.push(("per_page", PER_PAGE.to_string()));

            match self.api.get(&path, &query) {
                Reply::Ok { body, .. } => match page_items(body, None) {
                    Some(items) if items.is_empty() => Page::End,
                    Some(items) => {
                        page += 1;
                        Page::Items {
                            items: convert(items),
                            more: true,
                        }
                    }
                    None => {
                        warn!(%path, page, "expected a list in the response");
                        Page::Failed
                    }
                },
                Reply::NotFound { .. } => Page::End,
                Reply::Failed { .. } => Page::Failed,
            }
        })
    }

    fn group(&self, full_path: &str) -> Result<GlGroup> {
        let path = format!("/groups/{}", urlencoding::encode(full_path));
        let (body, _) = self.api.get(&path, &[]).into_parts();
        body.and_then(|body| serde_json::from_value::<GlGroup>(body).ok())
            .ok_or_else(|| Error::enumeration(Provider::GitLab, format!("group {full_path}")))
    }

    fn groups(&self) -> Result<Pages<'_, GlGroup>> {
        self.numbered_pages(
            format!("groups on {}", self.hostname),
            "/groups".to_string(),
            Vec::new(),
            |items| decode_items(items, "group"),
        )
        .require_first_page(Provider::GitLab)
    }

    fn projects(&self, group: &GlGroup, include_subgroups: bool) -> Pages<'_, Repository> {
        let mut params = Vec::new();
        if include_subgroups {
            params.push(("include_subgroups", "true".to_string()));
        }
        self.numbered_pages(
            format!("projects of group {}", group.full_path),
            format!("/groups/{}/projects", group.id),
            params,
            |items| {
                decode_items::<GlProject>(items, "project")
                    .into_iter()
                    .map(Repository::from)
                    .collect()
            },
        )
    }
}

impl ProviderClient for GitLabClient {
    fn provider(&self) -> Provider {
        Provider::GitLab
    }

    fn target(&self) -> &str {
        self.group.as_deref().unwrap_or(&self.hostname)
    }

    fn repositories(&self) -> Result<Box<dyn Iterator<Item = Repository> + '_>> {
        match &self.group {
            Some(full_path) => {
                let group = self.group(full_path)?;
                info!(group = %group.full_path, "listing projects of group and its subgroups");
                Ok(Box::new(self.projects(&group, true)))
            }
            None => {
                // every visible group is listed, subgroups included, so each
                // group only contributes its direct projects
                let groups = self.groups()?;
                Ok(Box::new(groups.flat_map(move |group| self.projects(&group, false))))
            }
        }
    }

    fn commits<'a>(&'a self, repository: &Repository, window: &Window) -> Pages<'a, Commit> {
        self.numbered_pages(
            format!("commits of {}", repository.name),
            format!("/projects/{}/repository/commits", repository.id),
            vec![("since", window.since_rfc3339())],
            |items| {
                decode_items::<GlCommit>(items, "commit")
                    .into_iter()
                    .map(Commit::from)
                    .collect()
            },
        )
    }
}

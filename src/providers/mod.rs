// src/providers/mod.rs

//! Thin adapters that hide each provider's REST dialect behind [`ProviderClient`].

pub mod azure_devops;
pub mod bitbucket;
pub mod github;
pub mod gitlab;

use crate::error::{Error, Result};
use crate::model::{Commit, Provider, Repository, Window};
use crate::pages::Pages;
use reqwest::header::HeaderValue;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::warn;

pub use azure_devops::AzureDevOpsClient;
pub use bitbucket::BitbucketClient;
pub use github::GitHubClient;
pub use gitlab::GitLabClient;

/// Everything the reporter needs from a provider.
///
/// Listings are lazy: nothing beyond the first page of a top-level listing
/// is requested until the caller pulls on the iterator.
pub trait ProviderClient: Sync {
    fn provider(&self) -> Provider;

    /// Organization, group, workspace or host the client is scoped to
    fn target(&self) -> &str;

    /// Every repository visible to the client. Fails when the top-level
    /// container itself cannot be listed.
    fn repositories(&self) -> Result<Box<dyn Iterator<Item = Repository> + '_>>;

    /// Commits of `repository` inside `window`, newest first where the
    /// provider has no server-side date filter.
    fn commits<'a>(&'a self, repository: &Repository, window: &Window) -> Pages<'a, Commit>;

    /// Logins of organization members, for providers that scope counts to members
    fn org_members(&self) -> Result<Option<BTreeSet<String>>> {
        Ok(None)
    }
}

/// Header value carrying a credential, kept out of debug output
pub(crate) fn credential_header(value: &str) -> Result<HeaderValue> {
    let mut header = HeaderValue::from_str(value)
        .map_err(|_| Error::Config("API key contains characters not allowed in an HTTP header".to_string()))?;
    header.set_sensitive(true);
    Ok(header)
}

/// Deserialize each element of a page, dropping the ones that do not fit
pub(crate) fn decode_items<T: DeserializeOwned>(items: Vec<Value>, kind: &str) -> Vec<T> {
    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<T>(item) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                warn!(kind, error = %e, "skipping item that failed validation");
                None
            }
        })
        .collect()
}

/// Pull the item array out of a page body, either the body itself or one of its fields
pub(crate) fn page_items(body: Value, field: Option<&str>) -> Option<Vec<Value>> {
    let list = match field {
        Some(field) => match body {
            Value::Object(mut map) => map.remove(field).unwrap_or(Value::Array(Vec::new())),
            _ => return None,
        },
        None => body,
    };
    match list {
        Value::Array(items) => Some(items),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Named {
        name: String,
    }

    #[test]
    fn invalid_items_are_dropped() {
        let items = vec![json!({"name": "ok"}), json!({"nom": "bad"}), json!({"name": "fine"})];
        let decoded: Vec<Named> = decode_items(items, "thing");
        assert_eq!(
            decoded,
            vec![
                Named { name: "ok".into() },
                Named { name: "fine".into() }
            ]
        );
    }

    #[test]
    fn page_items_reads_bare_arrays_and_fields() {
        assert_eq!(page_items(json!([1, 2]), None), Some(vec![json!(1), json!(2)]));
        assert_eq!(
            page_items(json!({"values": [3], "next": "x"}), Some("values")),
            Some(vec![json!(3)])
        );
        assert_eq!(page_items(json!({"next": "x"}), Some("values")), Some(vec![]));
        assert_eq!(page_items(json!({"message": "nope"}), None), None);
    }
}

// src/error.rs

use crate::model::Provider;
use thiserror::Error;

/// Result type alias using the crate error
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Missing credentials or unusable flags; raised before any request is sent
    #[error("Configuration error: {0}")]
    Config(String),

    /// The HTTP stack could not complete a request
    #[error("Transport error: {0}")]
    Transport(String),

    /// A top-level listing (organization, workspace, group, projects) came back empty-handed
    #[error("Could not enumerate {target} on {provider}")]
    Enumeration { provider: Provider, target: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl Error {
    pub fn enumeration(provider: Provider, target: impl Into<String>) -> Self {
        Self::Enumeration {
            provider,
            target: target.into(),
        }
    }
}

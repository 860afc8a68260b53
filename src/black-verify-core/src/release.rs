//! GitHub release API client and release-backed asset source.
//!
//! Lists a repository's releases, selects the one whose tag matches, and
//! downloads its assets through the API's `application/octet-stream`
//! endpoint so private repositories work with a token.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::error::VerifyError;
use crate::source::AssetSource;

/// Releases requested per page.
const PER_PAGE: usize = 100;

/// Upper bound on listing pages.
const MAX_PAGES: usize = 10;

/// One published asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseAsset {
    /// File name.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// API URL of the asset.
    pub url: String,
    /// Public download URL.
    #[serde(default)]
    pub browser_download_url: String,
    /// Content hash computed by GitHub (`sha256:<hex>`), when available.
    #[serde(default)]
    pub digest: Option<String>,
}

/// A release as returned by the list endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    /// Release id.
    pub id: u64,
    /// Git tag.
    pub tag_name: String,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Draft flag.
    #[serde(default)]
    pub draft: bool,
    /// Pre-release flag.
    #[serde(default)]
    pub prerelease: bool,
    /// Attached assets.
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

/// Pick the single release tagged `tag`.
///
/// # Errors
///
/// Returns [`VerifyError::NotFound`] when no release or more than one
/// release carries the tag.
pub fn select_release(releases: Vec<Release>, tag: &str) -> Result<Release, VerifyError> {
    let mut matching: Vec<Release> = releases.into_iter().filter(|r| r.tag_name == tag).collect();
    match matching.len() {
        1 => Ok(matching.remove(0)),
        0 => Err(VerifyError::not_found(format!("no release tagged '{tag}'"))),
        n => Err(VerifyError::not_found(format!(
            "{n} releases are tagged '{tag}'; expected exactly one"
        ))),
    }
}

/// Release API client.
#[derive(Debug, Clone)]
pub struct ReleaseClient {
    /// HTTP client.
    client: Client,
    /// API base URL.
    api_url: String,
    /// Optional bearer token.
    token: Option<String>,
}

impl ReleaseClient {
    /// Create a new client.
    ///
    /// # Arguments
    ///
    /// * `api_url` - API base URL (e.g. `https://api.github.com`)
    /// * `token` - Optional bearer token
    /// * `timeout` - Per-request timeout
    pub fn new(api_url: &str, token: Option<String>, timeout: Duration) -> Result<Self, VerifyError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .user_agent(format!("black/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                VerifyError::configuration(format!("Failed to create release client: {e}"))
            })?;

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.header(AUTHORIZATION, format!("Bearer {token}")),
            None => request,
        }
    }

    /// List every release of `repository` (up to the page cap).
    #[instrument(skip_all, fields(repository = %repository))]
    pub async fn list_releases(&self, repository: &str) -> Result<Vec<Release>, VerifyError> {
        let mut releases = Vec::new();
        for page in 1..=MAX_PAGES {
            let url = format!(
                "{}/repos/{repository}/releases?per_page={PER_PAGE}&page={page}",
                self.api_url
            );
            debug!("Fetching releases from {}", url);

            let response = self
                .authorized(self.client.get(&url))
                .header(ACCEPT, "application/vnd.github+json")
                .send()
                .await
                .map_err(|e| VerifyError::retrieval(format!("Release listing failed: {e}")))?;

            if response.status() == StatusCode::NOT_FOUND {
                return Err(VerifyError::not_found(format!(
                    "repository '{repository}' does not exist or is not visible"
                )));
            }
            if !response.status().is_success() {
                return Err(VerifyError::retrieval(format!(
                    "Release API HTTP error: {}",
                    response.status()
                )));
            }

            let batch = response.json::<Vec<Release>>().await.map_err(|e| {
                VerifyError::retrieval(format!("Failed to parse release listing: {e}"))
            })?;
            let last = batch.len() < PER_PAGE;
            releases.extend(batch);
            if last {
                break;
            }
        }

        info!(count = releases.len(), "Fetched release listing");
        Ok(releases)
    }

    /// Resolve the release tagged `tag`.
    pub async fn find_release(&self, repository: &str, tag: &str) -> Result<Release, VerifyError> {
        select_release(self.list_releases(repository).await?, tag)
    }

    /// Download one asset. `Ok(None)` when the asset is gone.
    #[instrument(skip(self, asset), fields(asset = %asset.name))]
    pub async fn download(&self, asset: &ReleaseAsset) -> Result<Option<Vec<u8>>, VerifyError> {
        let response = self
            .authorized(self.client.get(&asset.url))
            .header(ACCEPT, "application/octet-stream")
            .send()
            .await
            .map_err(|e| VerifyError::retrieval(format!("Asset download failed: {e}")))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(VerifyError::retrieval(format!(
                "Asset download HTTP error: {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| VerifyError::retrieval(format!("Asset download interrupted: {e}")))?;
        debug!(size = bytes.len(), "Downloaded asset");
        Ok(Some(bytes.to_vec()))
    }
}

/// Assets of one resolved release.
#[derive(Debug, Clone)]
pub struct ReleaseSource {
    client: ReleaseClient,
    repository: String,
    tag: String,
    assets: HashMap<String, ReleaseAsset>,
}

impl ReleaseSource {
    /// Wrap a resolved release.
    pub fn new(client: ReleaseClient, repository: &str, release: &Release) -> Self {
        Self {
            client,
            repository: repository.to_string(),
            tag: release.tag_name.clone(),
            assets: release
                .assets
                .iter()
                .map(|a| (a.name.clone(), a.clone()))
                .collect(),
        }
    }
}

#[async_trait]
impl AssetSource for ReleaseSource {
    fn describe(&self) -> String {
        format!("{}@{}", self.repository, self.tag)
    }

    async fn fetch(&self, name: &str) -> Result<Option<Vec<u8>>, VerifyError> {
        match self.assets.get(name) {
            Some(asset) => self.client.download(asset).await,
            None => Ok(None),
        }
    }
}

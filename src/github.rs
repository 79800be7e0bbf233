#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Client for the source-control hosting API: archive download by ref,
//! branch listing, and comment/review posting.

use std::{path::Path, time::Duration};

use anyhow::{Context, Result, bail};
use futures::StreamExt;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tabled::Tabled;
use tokio::io::AsyncWriteExt;

use crate::{config, error::AcquisitionError};

/// User agent sent with every hosting API request.
const USER_AGENT: &str = concat!("gavel/", env!("CARGO_PKG_VERSION"));

/// An `owner/repo` pair parsed from a repository URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    /// Repository owner (user or organization).
    pub owner: String,
    /// Repository name.
    pub repo:  String,
}

impl RepoRef {
    /// Returns the canonical `owner/repo` key used for deduplication and
    /// persistence.
    pub fn key(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

impl std::fmt::Display for RepoRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// Parses an `owner/repo` pair out of a repository URL.
///
/// Accepts `http(s)://github.com/{owner}/{repo}` with an optional `www.`
/// prefix, a trailing `.git`, and trailing path segments. Anything else is
/// an [`AcquisitionError::InvalidUrl`].
pub fn parse_repo_url(url: &str) -> Result<RepoRef, AcquisitionError> {
    let invalid = || AcquisitionError::InvalidUrl(url.to_string());

    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .ok_or_else(invalid)?;
    let rest = rest.strip_prefix("www.").unwrap_or(rest);
    let rest = rest.strip_prefix("github.com/").ok_or_else(invalid)?;

    let mut segments = rest.split('/').filter(|s| !s.is_empty());
    let owner = segments.next().ok_or_else(invalid)?;
    let repo = segments.next().ok_or_else(invalid)?;
    let repo = repo.strip_suffix(".git").unwrap_or(repo);

    if owner.is_empty() || repo.is_empty() {
        return Err(invalid());
    }

    Ok(RepoRef {
        owner: owner.to_string(),
        repo:  repo.to_string(),
    })
}

/// Parses an `owner/repo` pair and pull-request number out of a PR URL of
/// the form `https://github.com/{owner}/{repo}/pull/{number}`.
pub fn parse_pull_url(url: &str) -> Option<(RepoRef, u64)> {
    let repo = parse_repo_url(url).ok()?;
    let marker = format!("/{}/{}/pull/", repo.owner, repo.repo);
    let tail = url.split_once(&marker)?.1;
    let number = tail
        .split(['/', '?', '#'])
        .next()?
        .parse::<u64>()
        .ok()?;
    Some((repo, number))
}

/// A branch as reported by the hosting API.
#[derive(Debug, Clone, Deserialize, Tabled)]
pub struct Branch {
    /// Branch name.
    #[tabled(rename = "Branch")]
    pub name:      String,
    /// Whether the branch is protected.
    #[tabled(rename = "Protected")]
    #[serde(default)]
    pub protected: bool,
}

/// Handle to the source-control hosting API.
///
/// Constructed once and injected into the components that need it, so tests
/// can substitute their own instance instead of reaching for a process-wide
/// client.
#[derive(Clone)]
pub struct GitHubClient {
    /// Shared HTTP client.
    http:     Client,
    /// API base URL, `https://api.github.com` in production.
    api_base: String,
    /// Bearer token; `None` restricts access to public repositories.
    token:    Option<String>,
}

impl GitHubClient {
    /// Creates a client from explicit parts.
    pub fn new(http: Client, api_base: impl Into<String>, token: Option<String>) -> Self {
        Self {
            http,
            api_base: api_base.into(),
            token,
        }
    }

    /// Creates a client from the global configuration.
    pub fn from_config() -> Self {
        let cfg = config::get();
        Self::new(
            cfg.http_client(),
            cfg.github_api_base().to_string(),
            cfg.github_token().map(str::to_owned),
        )
    }

    /// Returns whether a hosting API credential is configured.
    pub fn authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// Builds a GET request with the standard hosting API headers.
    fn get(&self, path: &str) -> RequestBuilder {
        self.decorate(self.http.get(format!("{}{}", self.api_base, path)))
    }

    /// Builds a POST request with the standard hosting API headers.
    fn post(&self, path: &str) -> RequestBuilder {
        self.decorate(self.http.post(format!("{}{}", self.api_base, path)))
    }

    /// Applies user agent, accept, and authorization headers.
    fn decorate(&self, builder: RequestBuilder) -> RequestBuilder {
        let builder = builder
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/vnd.github+json");
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Downloads the zipball archive of `reference` into `dest`.
    ///
    /// The download is bounded by `timeout` and by `limit_bytes` (enforced
    /// on the advertised length and again while streaming, since the
    /// hosting API does not always send one). Returns the number of bytes
    /// written.
    pub async fn download_archive(
        &self,
        repo: &RepoRef,
        reference: &str,
        dest: &Path,
        limit_bytes: u64,
        timeout: Duration,
    ) -> Result<u64, AcquisitionError> {
        let path = format!("/repos/{}/{}/zipball/{}", repo.owner, repo.repo, reference);
        let response = self
            .get(&path)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify_network_error(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AcquisitionError::HttpStatus {
                status:    status.as_u16(),
                reference: reference.to_string(),
            });
        }

        if let Some(length) = response.content_length() {
            if length > limit_bytes {
                return Err(AcquisitionError::ArchiveTooLarge { limit_bytes });
            }
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| classify_network_error(e, timeout))?;
            written += chunk.len() as u64;
            if written > limit_bytes {
                return Err(AcquisitionError::ArchiveTooLarge { limit_bytes });
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        Ok(written)
    }

    /// Lists the branches of a repository.
    pub async fn list_branches(&self, repo: &RepoRef) -> Result<Vec<Branch>> {
        let path = format!("/repos/{}/{}/branches?per_page=100", repo.owner, repo.repo);
        let response = self
            .get(&path)
            .send()
            .await
            .with_context(|| format!("Failed to list branches for {repo}"))?;

        let status = response.status();
        if !status.is_success() {
            bail!("Branch listing for {repo} failed with HTTP {status}");
        }

        response
            .json::<Vec<Branch>>()
            .await
            .context("Could not parse the branch listing response")
    }

    /// Posts a plain comment on a pull request.
    pub async fn post_issue_comment(&self, repo: &RepoRef, number: u64, body: &str) -> Result<()> {
        let path = format!("/repos/{}/{}/issues/{}/comments", repo.owner, repo.repo, number);
        let response = self
            .post(&path)
            .json(&json!({ "body": body }))
            .send()
            .await
            .with_context(|| format!("Failed to post comment on {repo}#{number}"))?;

        let status = response.status();
        if !status.is_success() {
            bail!("Comment on {repo}#{number} rejected with HTTP {status}");
        }
        Ok(())
    }

    /// Posts a change-request review on a pull request.
    ///
    /// The hosting API refuses this for some callers (self-review, missing
    /// permissions); those rejections surface as errors so the caller can
    /// fall back to [`Self::post_issue_comment`].
    pub async fn post_change_request(&self, repo: &RepoRef, number: u64, body: &str) -> Result<()> {
        let path = format!("/repos/{}/{}/pulls/{}/reviews", repo.owner, repo.repo, number);
        let response = self
            .post(&path)
            .json(&json!({ "body": body, "event": "REQUEST_CHANGES" }))
            .send()
            .await
            .with_context(|| format!("Failed to post review on {repo}#{number}"))?;

        let status = response.status();
        if status == StatusCode::UNPROCESSABLE_ENTITY {
            bail!("Change-request review on {repo}#{number} was rejected by the hosting API");
        }
        if !status.is_success() {
            bail!("Review on {repo}#{number} rejected with HTTP {status}");
        }
        Ok(())
    }
}

/// Maps a reqwest failure onto the acquisition taxonomy, distinguishing
/// deadline expiry from other transport errors.
fn classify_network_error(err: reqwest::Error, timeout: Duration) -> AcquisitionError {
    if err.is_timeout() {
        AcquisitionError::Timeout(timeout)
    } else {
        AcquisitionError::Network(err)
    }
}

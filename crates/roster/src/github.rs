use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{ConfigError, SystemConfig};
use crate::document::ListDocument;
use crate::store::{ConcurrencyToken, DocumentStore, Snapshot, StoreError};

#[derive(Clone, Debug)]
pub struct GithubStoreConfig {
    pub api_url: String,
    pub owner: String,
    pub repo: String,
    pub path: String,
    pub branch: String,
    pub token: String,
    pub timeout_ms: u64,
    pub user_agent: String,
}

impl GithubStoreConfig {
    pub fn from_system_config(config: &SystemConfig) -> Result<Self, ConfigError> {
        let full_name = config.get_string("github.repo");
        let (owner, repo) = full_name
            .trim()
            .split_once('/')
            .filter(|(owner, repo)| !owner.is_empty() && !repo.is_empty() && !repo.contains('/'))
            .ok_or_else(|| {
                ConfigError::Invalid(format!("github.repo must be owner/name, got {full_name:?}"))
            })?;
        let path = config.get_string("github.path");
        let path = path.trim().trim_start_matches('/');
        if path.is_empty() {
            return Err(ConfigError::Invalid("github.path must not be empty".to_string()));
        }
        let timeout_ms = config.get_number("github.timeout_ms");
        Ok(Self {
            api_url: config.get_string("github.api_url"),
            owner: owner.to_string(),
            repo: repo.to_string(),
            path: path.to_string(),
            branch: config.get_string("github.branch"),
            token: config.get_string("github.token"),
            timeout_ms: if timeout_ms <= 0 { 10_000 } else { timeout_ms as u64 },
            user_agent: config.get_string("github.user_agent"),
        })
    }
}

#[derive(Deserialize)]
struct ContentsResponse {
    sha: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
}

#[derive(Serialize)]
struct PutContentsRequest<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(Deserialize)]
struct PutContentsResponse {
    content: PutContent,
}

#[derive(Deserialize)]
struct PutContent {
    sha: String,
}

/// Document store backed by one file in a GitHub repository, using the
/// file's blob sha as the concurrency token.
#[derive(Clone)]
pub struct GithubDocumentStore {
    client: reqwest::Client,
    config: GithubStoreConfig,
}

impl GithubDocumentStore {
    pub fn new(config: GithubStoreConfig) -> Self {
        let timeout = Duration::from_millis(config.timeout_ms.max(1));
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, config }
    }

    pub fn config(&self) -> &GithubStoreConfig {
        &self.config
    }

    fn contents_url(&self) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.config.api_url.trim_end_matches('/'),
            self.config.owner,
            self.config.repo,
            self.config.path
        )
    }

    fn request(&self, method: Method) -> RequestBuilder {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("x-github-api-version", HeaderValue::from_static("2022-11-28"));
        if let Ok(value) = HeaderValue::from_str(&self.config.user_agent) {
            headers.insert(USER_AGENT, value);
        }
        let token = self.config.token.trim();
        if !token.is_empty() {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {token}")) {
                headers.insert(AUTHORIZATION, value);
            }
        }
        self.client.request(method, self.contents_url()).headers(headers)
    }

    async fn put_contents(
        &self,
        bytes: &[u8],
        token: Option<&ConcurrencyToken>,
        message: &str,
    ) -> Result<ConcurrencyToken, StoreError> {
        let payload = PutContentsRequest {
            message,
            content: STANDARD.encode(bytes),
            branch: &self.config.branch,
            sha: token.map(ConcurrencyToken::as_str),
        };
        let response = self
            .request(Method::PUT)
            .json(&payload)
            .send()
            .await
            .map_err(|err| StoreError::Transport(err.to_string()))?;

        let status = response.status();
        if status == StatusCode::CONFLICT || status == StatusCode::UNPROCESSABLE_ENTITY {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Conflict(format!("{} rejected write: {body}", self.config.path)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Transport(format!(
                "PUT {} returned {status}: {body}",
                self.config.path
            )));
        }

        let parsed: PutContentsResponse = response
            .json()
            .await
            .map_err(|err| StoreError::Transport(err.to_string()))?;
        Ok(ConcurrencyToken::new(parsed.content.sha))
    }
}

#[async_trait]
impl DocumentStore for GithubDocumentStore {
    async fn read(&self) -> Result<Snapshot, StoreError> {
        let response = self
            .request(Method::GET)
            .query(&[("ref", self.config.branch.as_str())])
            .send()
            .await
            .map_err(|err| StoreError::Transport(err.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            info!(path = %self.config.path, "document not found, treating as empty");
            return Ok(Snapshot::default());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Transport(format!(
                "GET {} returned {status}: {body}",
                self.config.path
            )));
        }

        let contents: ContentsResponse = response
            .json()
            .await
            .map_err(|err| StoreError::Transport(err.to_string()))?;
        let encoded = match (contents.content, contents.encoding.as_deref()) {
            (Some(content), None | Some("base64")) => content,
            (_, encoding) => {
                return Err(StoreError::Transport(format!(
                    "{} returned unsupported encoding {encoding:?}",
                    self.config.path
                )))
            }
        };
        let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        let bytes = STANDARD
            .decode(compact)
            .map_err(|err| StoreError::Serialization(err.to_string()))?;
        let document = ListDocument::from_slice(&bytes)?;
        debug!(records = document.len(), sha = %contents.sha, "document read");
        Ok(Snapshot {
            document,
            token: Some(ConcurrencyToken::new(contents.sha)),
        })
    }

    async fn write(
        &self,
        document: &ListDocument,
        token: Option<&ConcurrencyToken>,
        message: &str,
    ) -> Result<ConcurrencyToken, StoreError> {
        let bytes = document.to_bytes()?;
        let token = match token {
            Some(token) => token.clone(),
            None => {
                info!(path = %self.config.path, "creating document");
                let empty = ListDocument::default().to_bytes()?;
                self.put_contents(&empty, None, "Create whitelist file").await?
            }
        };
        self.put_contents(&bytes, Some(&token), message).await
    }
}

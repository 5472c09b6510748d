use crate::config::Config;
use crate::error::{AppError, FetchError};
use crate::store::{DocumentStore, RawDocument};
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Reads every document of one CouchDB collection through `_all_docs`.
pub struct CouchDbStore {
    client: reqwest::Client,
    endpoint: String,
    username: Option<String>,
    password: Option<String>,
}

impl CouchDbStore {
    pub fn new(
        endpoint: impl Into<String>,
        username: Option<String>,
        password: Option<String>,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        // Built once so connections are pooled across cycles
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(AppError::HttpClient)?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            username,
            password,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        Self::new(
            config.store_endpoint(),
            config.store.username.clone(),
            config.store.password.clone(),
            config.store_timeout(),
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl fmt::Debug for CouchDbStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CouchDbStore")
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .field("has_password", &self.password.is_some())
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct AllDocsResponse {
    rows: Vec<AllDocsRow>,
}

#[derive(Debug, Deserialize)]
struct AllDocsRow {
    id: String,
    #[serde(default)]
    doc: Option<serde_json::Value>,
}

#[async_trait]
impl DocumentStore for CouchDbStore {
    async fn fetch_all(&self) -> Result<Vec<RawDocument>, FetchError> {
        let mut request = self
            .client
            .get(&self.endpoint)
            .query(&[("include_docs", "true")]);
        if let Some(username) = &self.username {
            request = request.basic_auth(username, self.password.as_deref());
        }

        let response = request.send().await.map_err(FetchError::Transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(FetchError::Transport)?;
        parse_all_docs(&body)
    }
}

fn parse_all_docs(body: &[u8]) -> Result<Vec<RawDocument>, FetchError> {
    let parsed: AllDocsResponse = serde_json::from_slice(body)
        .map_err(|err| FetchError::MalformedResponse(err.to_string()))?;

    let total = parsed.rows.len();
    let documents: Vec<RawDocument> = parsed
        .rows
        .into_iter()
        .filter_map(|row| {
            let id = row.id;
            row.doc.and_then(|doc| RawDocument::from_value(id, doc))
        })
        .collect();

    if documents.len() < total {
        debug!(
            rows = total,
            skipped = total - documents.len(),
            "Skipped rows without an inline document"
        );
    }
    Ok(documents)
}

//! GitHub GraphQL fetcher
//!
//! This module handles all HTTP traffic with the API, including:
//! - Building the HTTP client with a proper user agent
//! - Bearer authentication with a swappable token
//! - Mapping HTTP statuses and GraphQL errors onto `FetchError`
//! - Retrying transient failures with the configured policy

use crate::fetch::queries::{connection_query, entity_query, rate_limit_query, selector_field};
use crate::fetch::{with_retry, FetchError, Fetcher, Page, Record, Relation, RetryPolicy};
use crate::state::EntityKind;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::sync::RwLock;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Public GitHub GraphQL endpoint
pub const DEFAULT_ENDPOINT: &str = "https://api.github.com/graphql";

/// GraphQL error types worth another attempt
const TRANSIENT_ERROR_TYPES: &[&str] = &["RATE_LIMITED"];

/// Builds an HTTP client with proper configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client() -> Result<Client, reqwest::Error> {
    let user_agent = format!("ghgraph/{}", env!("CARGO_PKG_VERSION"));

    Client::builder()
        .user_agent(user_agent)
        .timeout(Duration::from_secs(60))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
    #[serde(rename = "type")]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawConnection {
    total_count: u64,
    page_info: RawPageInfo,
    #[serde(default)]
    nodes: Vec<Value>,
    #[serde(default)]
    edges: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPageInfo {
    end_cursor: Option<String>,
    has_next_page: bool,
}

#[derive(Debug, Deserialize)]
struct RawRateLimit {
    remaining: u32,
}

/// Fetcher backed by the GitHub GraphQL API
pub struct GitHubFetcher {
    client: Client,
    endpoint: Url,
    token: RwLock<String>,
    retry: RetryPolicy,
    page_size: u32,
}

impl GitHubFetcher {
    pub fn new(
        client: Client,
        endpoint: Url,
        token: impl Into<String>,
        retry: RetryPolicy,
        page_size: u32,
    ) -> Self {
        Self {
            client,
            endpoint,
            token: RwLock::new(token.into()),
            retry,
            page_size,
        }
    }

    fn current_token(&self) -> String {
        match self.token.read() {
            Ok(token) => token.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Sends one query with retries and returns its `data` member
    async fn query(&self, query: &str, operation: &str) -> Result<Value, FetchError> {
        with_retry(&self.retry, operation, || self.send_once(query)).await
    }

    async fn send_once(&self, query: &str) -> Result<Value, FetchError> {
        let token = self.current_token();

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(token)
            .json(&serde_json::json!({ "query": query }))
            .send()
            .await
            .map_err(classify_request_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, body));
        }

        let body: GraphQlResponse = response
            .json()
            .await
            .map_err(|e| FetchError::Malformed(e.to_string()))?;

        if !body.errors.is_empty() {
            return Err(classify_graphql_errors(&body.errors));
        }

        body.data
            .ok_or_else(|| FetchError::Malformed("response without data".to_string()))
    }
}

fn classify_request_error(error: reqwest::Error) -> FetchError {
    if error.is_timeout() || error.is_connect() || error.is_request() {
        FetchError::Transient(error.to_string())
    } else {
        FetchError::Http {
            status: error.status().map(|s| s.as_u16()).unwrap_or(0),
            message: error.to_string(),
        }
    }
}

/// Maps a non-success HTTP status to a fetch error
///
/// | Status | Error |
/// |--------|-------|
/// | 429, 403 (secondary rate limit) | Transient |
/// | 5xx | Transient |
/// | anything else | Http |
fn classify_status(status: StatusCode, body: String) -> FetchError {
    if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::FORBIDDEN
        || status.is_server_error()
    {
        FetchError::Transient(format!("HTTP {}", status.as_u16()))
    } else {
        FetchError::Http {
            status: status.as_u16(),
            message: body,
        }
    }
}

fn classify_graphql_errors(errors: &[GraphQlError]) -> FetchError {
    let messages = errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ");

    let transient = errors.iter().any(|e| {
        e.kind
            .as_deref()
            .map(|kind| TRANSIENT_ERROR_TYPES.contains(&kind))
            .unwrap_or(false)
    });

    if transient {
        FetchError::Transient(messages)
    } else {
        FetchError::Api(messages)
    }
}

/// Extracts the selected entity from `data`
fn selected<'a>(data: &'a Value, id_or_url: &str) -> Result<&'a Value, FetchError> {
    match data.get(selector_field(id_or_url)) {
        Some(Value::Null) | None => Err(FetchError::Api(format!(
            "could not resolve '{}'",
            id_or_url
        ))),
        Some(entity) => Ok(entity),
    }
}

fn parse_page(data: &Value, parent: &str, relation: Relation) -> Result<Page, FetchError> {
    let connection = selected(data, parent)?
        .get(relation.field())
        .cloned()
        .ok_or_else(|| {
            FetchError::Malformed(format!("'{}' missing from response for {}", relation, parent))
        })?;

    let raw: RawConnection = serde_json::from_value(connection)
        .map_err(|e| FetchError::Malformed(format!("{}: {}", relation, e)))?;

    let items = if raw.edges.is_empty() {
        raw.nodes
    } else {
        raw.edges
    };

    let records = items
        .iter()
        .filter(|item| !item.is_null())
        .map(Record::from_json)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Page {
        records,
        total_count: raw.total_count,
        end_cursor: raw.page_info.end_cursor,
        has_next_page: raw.page_info.has_next_page,
    })
}

#[async_trait]
impl Fetcher for GitHubFetcher {
    async fn fetch_page(
        &self,
        parent: &str,
        relation: Relation,
        cursor: Option<&str>,
    ) -> Result<Page, FetchError> {
        let query = connection_query(parent, relation, self.page_size, cursor);
        let operation = format!("{} of {}", relation, parent);

        let data = self.query(&query, &operation).await?;
        let page = parse_page(&data, parent, relation)?;

        debug!(
            "{}: {} records (total {}, more: {})",
            operation,
            page.records.len(),
            page.total_count,
            page.has_next_page
        );
        Ok(page)
    }

    async fn fetch_entity(&self, kind: EntityKind, id_or_url: &str) -> Result<Record, FetchError> {
        let query = entity_query(kind, id_or_url);
        let data = self.query(&query, &format!("{} {}", kind, id_or_url)).await?;
        Record::from_json(selected(&data, id_or_url)?)
    }

    async fn remaining_quota(&self) -> Result<u32, FetchError> {
        let data = self.query(rate_limit_query(), "rate limit").await?;
        let rate_limit = data
            .get("rateLimit")
            .cloned()
            .ok_or_else(|| FetchError::Malformed("response without rateLimit".to_string()))?;

        let parsed: RawRateLimit =
            serde_json::from_value(rate_limit).map_err(|e| FetchError::Malformed(e.to_string()))?;
        Ok(parsed.remaining)
    }

    fn switch_credential(&self, token: &str) {
        let mut guard = match self.token.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = token.to_string();
        info!("Switched API credential");
    }
}

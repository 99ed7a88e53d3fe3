use arxiv_sync_common::{Result, SyncError};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use super::{BulkItem, BulkOutcome, SearchConfig, SearchIndex};

/// How many rejected items are logged per batch
const FAILURE_LOG_LIMIT: usize = 5;

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<Value>,
}

/// OpenSearch (or Elasticsearch) over its REST API
pub struct OpenSearchIndex {
    client: reqwest::Client,
    endpoint: String,
    username: Option<String>,
    password: Option<String>,
}

fn search_error(context: &str, err: impl std::fmt::Display) -> SyncError {
    SyncError::Search(format!("{}: {}", context, err))
}

/// Status line plus the start of the error body, or why the body could not be read
async fn describe_rejection(response: reqwest::Response) -> String {
    let status = response.status();
    match response.text().await {
        Ok(text) => format!("{}: {}", status, text.chars().take(200).collect::<String>()),
        Err(err) => format!("{} (error body unreadable: {})", status, err),
    }
}

impl OpenSearchIndex {
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| SyncError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let request = self
            .client
            .request(method, format!("{}/{}", self.endpoint, path.trim_start_matches('/')));
        match &self.username {
            Some(username) => request.basic_auth(username, self.password.as_deref()),
            None => request,
        }
    }
}

/// Render `items` as a `_bulk` NDJSON body
pub fn bulk_body(index: &str, items: &[BulkItem]) -> Result<String> {
    let mut body = String::new();
    for item in items {
        let action = json!({ "index": { "_index": index, "_id": item.id } });
        body.push_str(&serde_json::to_string(&action)?);
        body.push('\n');
        body.push_str(&serde_json::to_string(&item.document)?);
        body.push('\n');
    }
    Ok(body)
}

/// Count per-item results of a `_bulk` response
fn tally(items: &[Value]) -> BulkOutcome {
    let mut outcome = BulkOutcome::default();

    for item in items {
        let Some(result) = item.as_object().and_then(|o| o.values().next()) else {
            outcome.record_failure("", "unrecognized bulk item");
            continue;
        };

        let id = result["_id"].as_str().unwrap_or_default();
        let status = result["status"].as_u64().unwrap_or(0);

        if (200..300).contains(&status) && result.get("error").is_none() {
            outcome.succeeded += 1;
        } else {
            let reason = result
                .get("error")
                .and_then(|e| e.get("reason").or(Some(e)))
                .map(|r| match r {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .unwrap_or_else(|| format!("status {}", status));
            outcome.record_failure(id, reason);
        }
    }

    outcome
}

#[async_trait]
impl SearchIndex for OpenSearchIndex {
    #[instrument(skip(self, items), fields(count = items.len()))]
    async fn bulk_upsert(&self, index: &str, items: &[BulkItem]) -> Result<BulkOutcome> {
        if items.is_empty() {
            return Ok(BulkOutcome::default());
        }

        let body = bulk_body(index, items)?;

        let response = self
            .request(reqwest::Method::POST, "_bulk")
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await
            .map_err(|e| search_error("Bulk request failed", e))?;

        if !response.status().is_success() {
            return Err(search_error(
                "Bulk request rejected",
                describe_rejection(response).await,
            ));
        }

        let parsed: BulkResponse = response
            .json()
            .await
            .map_err(|e| search_error("Bulk response is malformed", e))?;

        let mut outcome = tally(&parsed.items);

        // Items missing from the response were not written.
        if parsed.items.len() < items.len() {
            for item in &items[parsed.items.len()..] {
                outcome.record_failure(item.id.clone(), "missing from bulk response");
            }
        }

        if parsed.errors || outcome.failed > 0 {
            for (id, reason) in outcome.failures.iter().take(FAILURE_LOG_LIMIT) {
                warn!(id = %id, reason = %reason, "Document rejected");
            }
        }

        debug!(succeeded = outcome.succeeded, failed = outcome.failed, "Bulk request finished");
        Ok(outcome)
    }

    #[instrument(skip(self, mapping))]
    async fn ensure_index(&self, index: &str, mapping: &Value, recreate: bool) -> Result<bool> {
        let exists = self
            .request(reqwest::Method::HEAD, index)
            .send()
            .await
            .map_err(|e| search_error("Index lookup failed", e))?;

        match exists.status() {
            StatusCode::OK if !recreate => {
                info!("Index {} already exists", index);
                return Ok(false);
            }
            StatusCode::OK => {
                let deleted = self
                    .request(reqwest::Method::DELETE, index)
                    .send()
                    .await
                    .map_err(|e| search_error("Index delete failed", e))?;
                if !deleted.status().is_success() {
                    return Err(search_error("Index delete rejected", deleted.status()));
                }
                info!("Deleted existing index {}", index);
            }
            StatusCode::NOT_FOUND => {}
            other => return Err(search_error("Index lookup rejected", other)),
        }

        let created = self
            .request(reqwest::Method::PUT, index)
            .json(mapping)
            .send()
            .await
            .map_err(|e| search_error("Index create failed", e))?;

        if !created.status().is_success() {
            return Err(search_error(
                "Index create rejected",
                describe_rejection(created).await,
            ));
        }

        info!("Created index {}", index);
        Ok(true)
    }
}

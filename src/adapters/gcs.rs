use crate::core::download::MAX_OBJECTS_PER_COMPOSE;
use crate::domain::model::{ListPage, ListRequest, ObjectEntry};
use crate::domain::ports::ObjectStore;
use crate::utils::error::{DatafluxError, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use std::time::{Duration, Instant};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://storage.googleapis.com";

/// Environment variable holding an OAuth bearer token. Optional; requests go
/// out unauthenticated when it is absent (public buckets, local fakes).
pub const AUTH_TOKEN_ENV: &str = "GCS_AUTH_TOKEN";

const LIST_FIELDS: &str = "items(name,size),nextPageToken";

/// Backoff schedule for transient storage failures: retry until an overall
/// deadline, sleeping initial * multiplier^n capped at max between attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub deadline: Duration,
    pub initial_backoff: Duration,
    pub multiplier: f64,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(300),
            initial_backoff: Duration::from_secs(1),
            multiplier: 1.2,
            max_backoff: Duration::from_secs(45),
        }
    }
}

/// Client for the object store's JSON API, scoped to a single bucket.
#[derive(Debug, Clone)]
pub struct GcsClient {
    client: Client,
    base_url: Url,
    bucket: String,
    auth_token: Option<String>,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct RawObject {
    name: String,
    // The JSON API serializes object sizes as decimal strings.
    #[serde(default)]
    size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    items: Vec<RawObject>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, serde::Serialize)]
struct ComposeSource<'a> {
    name: &'a str,
}

impl RawObject {
    fn into_entry(self) -> ObjectEntry {
        let size = self
            .size
            .as_deref()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(0);
        ObjectEntry::new(self.name, size)
    }
}

impl GcsClient {
    pub fn new(bucket: impl Into<String>) -> Result<Self> {
        Self::with_base_url(bucket, DEFAULT_BASE_URL)
    }

    /// Points the client at a different API endpoint. Used by tests and by
    /// deployments running against a storage emulator.
    pub fn with_base_url(bucket: impl Into<String>, base_url: &str) -> Result<Self> {
        Ok(Self {
            client: Client::new(),
            base_url: Url::parse(base_url)?,
            bucket: bucket.into(),
            auth_token: None,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn auth_token_from_env() -> Option<String> {
        std::env::var(AUTH_TOKEN_ENV).ok()
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut parts = url
                .path_segments_mut()
                .map_err(|_| DatafluxError::ConfigError {
                    message: format!("base URL cannot be a base: {}", self.base_url),
                })?;
            for segment in segments {
                parts.push(segment);
            }
        }
        Ok(url)
    }

    fn list_url(&self) -> Result<Url> {
        self.url(&["storage", "v1", "b", &self.bucket, "o"])
    }

    fn object_url(&self, object_name: &str) -> Result<Url> {
        self.url(&["storage", "v1", "b", &self.bucket, "o", object_name])
    }

    fn download_url(&self, object_name: &str) -> Result<Url> {
        self.url(&[
            "download", "storage", "v1", "b", &self.bucket, "o", object_name,
        ])
    }

    fn compose_url(&self, destination: &str) -> Result<Url> {
        self.url(&[
            "storage",
            "v1",
            "b",
            &self.bucket,
            "o",
            destination,
            "compose",
        ])
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send_with_retry<F>(&self, operation: &str, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let started = Instant::now();
        let mut backoff = self.retry.initial_backoff;

        loop {
            let attempt = self.authorize(build()).send().await;
            let retry_allowed = |wait: Duration| started.elapsed() + wait < self.retry.deadline;

            match attempt {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }

                    let transient =
                        matches!(status.as_u16(), 408 | 429) || status.is_server_error();
                    if !transient || !retry_allowed(backoff) {
                        let message = response.text().await.unwrap_or_default();
                        return Err(DatafluxError::StorageError {
                            status: status.as_u16(),
                            message: truncate_message(&message),
                        });
                    }
                    tracing::warn!(
                        "{} returned {}, retrying in {:.1}s",
                        operation,
                        status,
                        backoff.as_secs_f64()
                    );
                }
                Err(err) => {
                    let transient = err.is_timeout() || err.is_connect();
                    if !transient || !retry_allowed(backoff) {
                        return Err(err.into());
                    }
                    tracing::warn!(
                        "{} transport error ({}), retrying in {:.1}s",
                        operation,
                        err,
                        backoff.as_secs_f64()
                    );
                }
            }

            tokio::time::sleep(backoff).await;
            let next = backoff.as_secs_f64() * self.retry.multiplier;
            backoff = Duration::from_secs_f64(next.min(self.retry.max_backoff.as_secs_f64()));
        }
    }
}

fn truncate_message(message: &str) -> String {
    const MAX_LEN: usize = 512;
    if message.len() <= MAX_LEN {
        message.to_string()
    } else {
        let mut end = MAX_LEN;
        while !message.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &message[..end])
    }
}

#[async_trait]
impl ObjectStore for GcsClient {
    async fn list_page(&self, request: &ListRequest) -> Result<ListPage> {
        let url = self.list_url()?;
        let response = self
            .send_with_retry("list", || {
                let mut builder = self
                    .client
                    .get(url.clone())
                    .query(&[("fields", LIST_FIELDS)]);
                if !request.prefix.is_empty() {
                    builder = builder.query(&[("prefix", request.prefix.as_str())]);
                }
                if let Some(start) = &request.start_offset {
                    builder = builder.query(&[("startOffset", start.as_str())]);
                }
                if let Some(end) = &request.end_offset {
                    builder = builder.query(&[("endOffset", end.as_str())]);
                }
                if let Some(token) = &request.page_token {
                    builder = builder.query(&[("pageToken", token.as_str())]);
                }
                if let Some(max) = request.max_results {
                    builder = builder.query(&[("maxResults", max.to_string())]);
                }
                builder
            })
            .await?;

        let body: ListResponse = response.json().await?;
        Ok(ListPage {
            items: body.items.into_iter().map(RawObject::into_entry).collect(),
            next_page_token: body.next_page_token,
        })
    }

    async fn download(&self, object_name: &str) -> Result<Vec<u8>> {
        let url = self.download_url(object_name)?;
        let response = self
            .send_with_retry("download", || {
                self.client.get(url.clone()).query(&[("alt", "media")])
            })
            .await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn compose(&self, destination: &str, sources: &[ObjectEntry]) -> Result<ObjectEntry> {
        if sources.is_empty() {
            return Err(DatafluxError::ComposeError {
                message: "cannot compose zero objects".to_string(),
            });
        }
        if sources.len() > MAX_OBJECTS_PER_COMPOSE {
            return Err(DatafluxError::ComposeError {
                message: format!(
                    "{} objects allowed to compose, received {} objects",
                    MAX_OBJECTS_PER_COMPOSE,
                    sources.len()
                ),
            });
        }

        let url = self.compose_url(destination)?;
        let body = serde_json::json!({
            "sourceObjects": sources
                .iter()
                .map(|entry| ComposeSource { name: &entry.name })
                .collect::<Vec<_>>(),
            "destination": { "contentType": "application/octet-stream" },
        });

        let response = self
            .send_with_retry("compose", || self.client.post(url.clone()).json(&body))
            .await?;
        let raw: RawObject = response.json().await?;
        Ok(raw.into_entry())
    }

    async fn delete(&self, object_name: &str) -> Result<()> {
        let url = self.object_url(object_name)?;
        self.send_with_retry("delete", || self.client.delete(url.clone()))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn test_client(server: &MockServer) -> GcsClient {
        GcsClient::with_base_url("test-bucket", &server.base_url())
            .unwrap()
            .with_retry_policy(RetryPolicy {
                deadline: Duration::from_millis(200),
                initial_backoff: Duration::from_millis(10),
                multiplier: 1.2,
                max_backoff: Duration::from_millis(50),
            })
    }

    #[tokio::test]
    async fn list_page_parses_string_sizes_and_token() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/storage/v1/b/test-bucket/o")
                .query_param("prefix", "data/")
                .query_param("startOffset", "data/a")
                .query_param("endOffset", "data/m");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(serde_json::json!({
                    "items": [
                        {"name": "data/a-001", "size": "1024"},
                        {"name": "data/b-002", "size": "2048"}
                    ],
                    "nextPageToken": "tok-1"
                }));
        });

        let client = test_client(&server);
        let page = client
            .list_page(&ListRequest {
                prefix: "data/".to_string(),
                start_offset: Some("data/a".to_string()),
                end_offset: Some("data/m".to_string()),
                page_token: None,
                max_results: None,
            })
            .await
            .unwrap();

        mock.assert();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0], ObjectEntry::new("data/a-001", 1024));
        assert_eq!(page.items[1], ObjectEntry::new("data/b-002", 2048));
        assert_eq!(page.next_page_token.as_deref(), Some("tok-1"));
    }

    #[tokio::test]
    async fn list_page_handles_empty_result() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/storage/v1/b/test-bucket/o");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(serde_json::json!({}));
        });

        let client = test_client(&server);
        let page = client.list_page(&ListRequest::default()).await.unwrap();

        assert!(page.items.is_empty());
        assert!(page.next_page_token.is_none());
    }

    #[tokio::test]
    async fn download_uses_media_endpoint() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/download/storage/v1/b/test-bucket/o/file-1")
                .query_param("alt", "media");
            then.status(200).body("hello bytes");
        });

        let client = test_client(&server);
        let bytes = client.download("file-1").await.unwrap();

        mock.assert();
        assert_eq!(bytes, b"hello bytes");
    }

    #[tokio::test]
    async fn compose_posts_source_names_in_order() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/storage/v1/b/test-bucket/o/staged/compose")
                .json_body_partial(
                    r#"{"sourceObjects": [{"name": "a"}, {"name": "b"}]}"#,
                );
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(serde_json::json!({"name": "staged", "size": "30"}));
        });

        let client = test_client(&server);
        let entry = client
            .compose(
                "staged",
                &[ObjectEntry::new("a", 10), ObjectEntry::new("b", 20)],
            )
            .await
            .unwrap();

        mock.assert();
        assert_eq!(entry, ObjectEntry::new("staged", 30));
    }

    #[tokio::test]
    async fn compose_rejects_too_many_sources() {
        let server = MockServer::start();
        let client = test_client(&server);

        let sources: Vec<ObjectEntry> = (0..MAX_OBJECTS_PER_COMPOSE + 1)
            .map(|i| ObjectEntry::new(format!("obj-{}", i), 1))
            .collect();

        let err = client.compose("staged", &sources).await.unwrap_err();
        assert!(matches!(err, DatafluxError::ComposeError { .. }));
    }

    #[tokio::test]
    async fn transient_errors_are_retried_until_deadline() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/storage/v1/b/test-bucket/o");
            then.status(503).body("backend unavailable");
        });

        let client = test_client(&server);
        let err = client.list_page(&ListRequest::default()).await.unwrap_err();

        match err {
            DatafluxError::StorageError { status, .. } => assert_eq!(status, 503),
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(mock.hits() >= 2, "expected at least one retry");
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/download/storage/v1/b/test-bucket/o/missing");
            then.status(404).body("no such object");
        });

        let client = test_client(&server);
        let err = client.download("missing").await.unwrap_err();

        match err {
            DatafluxError::StorageError { status, message } => {
                assert_eq!(status, 404);
                assert!(message.contains("no such object"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(mock.hits(), 1);
    }

    #[tokio::test]
    async fn bearer_token_is_attached_when_configured() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/storage/v1/b/test-bucket/o")
                .header("authorization", "Bearer secret-token");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(serde_json::json!({"items": []}));
        });

        let client = test_client(&server).with_auth_token("secret-token");
        client.list_page(&ListRequest::default()).await.unwrap();

        mock.assert();
    }
}

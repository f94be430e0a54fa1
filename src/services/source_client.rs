//! src/services/source_client.rs
//!
//! Client for the sequence store API: read set metadata, tags, sequence
//! store metadata and read set listings. `MetadataSource` is the seam the
//! assembler and enumerator depend on; `HttpMetadataSource` is the JSON/HTTP
//! implementation used by the binary.

use crate::{
    models::source::{ReadSetMetadata, ReadSetPage, SequenceStore, TagList},
    services::retry::{RetryPolicy, Retryable},
};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::{collections::BTreeMap, time::Duration};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("{0} not found")]
    NotFound(String),
    /// The read set metadata lookup itself came back not found.
    #[error("{0} no longer exists")]
    ReadSetGone(String),
    #[error("request throttled: {0}")]
    Throttled(String),
    #[error("transient failure: {0}")]
    Transient(String),
    #[error("not authorized: {0}")]
    Unauthorized(String),
    #[error("request rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("invalid source configuration: {0}")]
    Configuration(String),
}

impl Retryable for SourceError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Throttled(_) | Self::Transient(_))
    }
}

pub type SourceResult<T> = Result<T, SourceError>;

/// Read access to the sequence store.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn get_read_set_metadata(
        &self,
        read_set_id: &str,
        store_id: &str,
    ) -> SourceResult<ReadSetMetadata>;

    async fn list_tags(&self, resource_arn: &str) -> SourceResult<BTreeMap<String, String>>;

    async fn get_sequence_store(&self, store_id: &str) -> SourceResult<SequenceStore>;

    /// One page of read sets. `next_token` of the returned page is `None`
    /// on the last page.
    async fn list_read_sets(
        &self,
        store_id: &str,
        next_token: Option<&str>,
        max_results: usize,
    ) -> SourceResult<ReadSetPage>;
}

/// Connection settings for [`HttpMetadataSource`].
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub endpoint: String,
    pub region: String,
    pub profile: Option<String>,
    pub auth_token: Option<String>,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

impl SourceConfig {
    pub fn default_endpoint(region: &str) -> String {
        format!("https://omics.{}.amazonaws.com", region)
    }
}

/// JSON/HTTP client for the sequence store API.
///
/// Every call goes through the configured [`RetryPolicy`]; throttling,
/// 5xx responses and connection failures are retried, everything else is
/// returned on the first attempt.
#[derive(Clone, Debug)]
pub struct HttpMetadataSource {
    client: Client,
    endpoint: Url,
    auth_token: Option<String>,
    retry: RetryPolicy,
}

impl HttpMetadataSource {
    pub fn new(config: &SourceConfig) -> SourceResult<Self> {
        let endpoint = Url::parse(&config.endpoint).map_err(|err| {
            SourceError::Configuration(format!("endpoint `{}`: {}", config.endpoint, err))
        })?;
        if endpoint.cannot_be_a_base() {
            return Err(SourceError::Configuration(format!(
                "endpoint `{}` cannot carry a path",
                config.endpoint
            )));
        }

        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| SourceError::Configuration(format!("building HTTP client: {}", err)))?;

        Ok(Self {
            client,
            endpoint,
            auth_token: config.auth_token.clone(),
            retry: config.retry.clone(),
        })
    }

    /// Build `endpoint/segment/segment/...`, percent-encoding each segment
    /// so ARNs survive as a single path component.
    fn url(&self, segments: &[&str]) -> SourceResult<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| SourceError::Configuration("endpoint cannot carry a path".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        what: &str,
    ) -> SourceResult<T> {
        self.retry
            .run(what, || {
                let method = method.clone();
                let url = url.clone();
                async move { self.send_once(method, url, what).await }
            })
            .await
    }

    async fn send_once<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        what: &str,
    ) -> SourceResult<T> {
        debug!(%method, %url, "sequence store request");

        let mut request = self.client.request(method.clone(), url);
        if let Some(token) = self.auth_token.as_deref() {
            request = request.bearer_auth(token);
        }
        if method == Method::POST {
            request = request.json(&serde_json::json!({}));
        }

        let response = request.send().await.map_err(|err| {
            if err.is_builder() {
                SourceError::Configuration(err.to_string())
            } else {
                SourceError::Transient(err.to_string())
            }
        })?;

        let status = response.status();
        if status.is_success() {
            let bytes = response
                .bytes()
                .await
                .map_err(|err| SourceError::Transient(err.to_string()))?;
            return serde_json::from_slice(&bytes)
                .map_err(|err| SourceError::Malformed(format!("{}: {}", what, err)));
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, what, body))
    }
}

/// Map a non-success HTTP status onto the error taxonomy.
fn classify_status(status: StatusCode, what: &str, body: String) -> SourceError {
    match status {
        StatusCode::NOT_FOUND => SourceError::NotFound(what.to_string()),
        StatusCode::TOO_MANY_REQUESTS => SourceError::Throttled(format!("{}: {}", what, body)),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            SourceError::Unauthorized(format!("{}: {}", what, body))
        }
        StatusCode::REQUEST_TIMEOUT => SourceError::Transient(format!("{}: {}", what, body)),
        s if s.is_server_error() => SourceError::Transient(format!("{} ({}): {}", what, s, body)),
        s => SourceError::Rejected {
            status: s.as_u16(),
            message: body,
        },
    }
}

#[async_trait]
impl MetadataSource for HttpMetadataSource {
    async fn get_read_set_metadata(
        &self,
        read_set_id: &str,
        store_id: &str,
    ) -> SourceResult<ReadSetMetadata> {
        let url = self.url(&["sequencestore", store_id, "readset", read_set_id, "metadata"])?;
        let what = format!("read set `{}` in sequence store `{}`", read_set_id, store_id);
        self.send(Method::GET, url, &what).await
    }

    async fn list_tags(&self, resource_arn: &str) -> SourceResult<BTreeMap<String, String>> {
        let url = self.url(&["tags", resource_arn])?;
        let what = format!("tags for `{}`", resource_arn);
        let tags: TagList = self.send(Method::GET, url, &what).await?;
        Ok(tags.tags)
    }

    async fn get_sequence_store(&self, store_id: &str) -> SourceResult<SequenceStore> {
        let url = self.url(&["sequencestore", store_id])?;
        let what = format!("sequence store `{}`", store_id);
        self.send(Method::GET, url, &what).await
    }

    async fn list_read_sets(
        &self,
        store_id: &str,
        next_token: Option<&str>,
        max_results: usize,
    ) -> SourceResult<ReadSetPage> {
        let mut url = self.url(&["sequencestore", store_id, "readsets"])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("maxResults", &max_results.to_string());
            if let Some(token) = next_token {
                query.append_pair("nextToken", token);
            }
        }
        let what = format!("read sets of sequence store `{}`", store_id);
        self.send(Method::POST, url, &what).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{header, method, path, query_param},
    };

    fn config(endpoint: String) -> SourceConfig {
        SourceConfig {
            endpoint,
            region: "us-east-1".into(),
            profile: None,
            auth_token: Some("secret".into()),
            request_timeout: Duration::from_secs(5),
            retry: RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(2),
            },
        }
    }

    #[tokio::test]
    async fn fetches_read_set_metadata() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sequencestore/store-1/readset/rs-1/metadata"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "rs-1",
                "arn": "arn:aws:omics:us-east-1:123:sequenceStore/store-1/readSet/rs-1",
                "status": "ACTIVE",
                "fileType": "FASTQ",
                "files": {
                    "source1": {
                        "contentLength": 42,
                        "partSize": 10,
                        "totalParts": 5,
                        "s3Access": {"s3Uri": "s3://ap/store-1/rs-1/r1.fastq.gz"}
                    },
                    "source2": null
                },
                "etag": {"algorithm": "FASTQ_MD5up", "source1": "abc"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let source = HttpMetadataSource::new(&config(server.uri())).unwrap();
        let metadata = source.get_read_set_metadata("rs-1", "store-1").await.unwrap();

        assert_eq!(metadata.id, "rs-1");
        assert_eq!(metadata.file_type.as_deref(), Some("FASTQ"));
        assert_eq!(metadata.files.len(), 2);
        assert!(metadata.files["source2"].is_none());
        assert_eq!(metadata.etag["source1"], "abc");
    }

    #[tokio::test]
    async fn lists_read_sets_with_pagination_parameters() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sequencestore/store-1/readsets"))
            .and(query_param("maxResults", "100"))
            .and(query_param("nextToken", "page-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "readSets": [{"id": "rs-101", "status": "ACTIVE"}]
            })))
            .mount(&server)
            .await;

        let source = HttpMetadataSource::new(&config(server.uri())).unwrap();
        let page = source
            .list_read_sets("store-1", Some("page-2"), 100)
            .await
            .unwrap();

        assert_eq!(page.read_sets.len(), 1);
        assert_eq!(page.read_sets[0].id, "rs-101");
        assert!(page.next_token.is_none());
    }

    #[tokio::test]
    async fn encodes_arn_as_single_path_segment() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tags/arn:aws:omics:us-east-1:123:sequenceStore%2Fstore-1%2FreadSet%2Frs-1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"tags": {"k": "v"}})),
            )
            .mount(&server)
            .await;

        let source = HttpMetadataSource::new(&config(server.uri())).unwrap();
        let tags = source
            .list_tags("arn:aws:omics:us-east-1:123:sequenceStore/store-1/readSet/rs-1")
            .await
            .unwrap();

        assert_eq!(tags.get("k").map(String::as_str), Some("v"));
    }

    #[tokio::test]
    async fn maps_missing_read_set_to_not_found_without_retrying() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sequencestore/store-1/readset/gone/metadata"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let source = HttpMetadataSource::new(&config(server.uri())).unwrap();
        let err = source
            .get_read_set_metadata("gone", "store-1")
            .await
            .unwrap_err();

        assert!(matches!(err, SourceError::NotFound(_)));
    }

    #[tokio::test]
    async fn retries_throttling_up_to_the_attempt_budget() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sequencestore/store-1"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .expect(3)
            .mount(&server)
            .await;

        let source = HttpMetadataSource::new(&config(server.uri())).unwrap();
        let err = source.get_sequence_store("store-1").await.unwrap_err();

        assert!(matches!(err, SourceError::Throttled(_)));
    }

    #[tokio::test]
    async fn unauthorized_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sequencestore/store-1"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&server)
            .await;

        let source = HttpMetadataSource::new(&config(server.uri())).unwrap();
        let err = source.get_sequence_store("store-1").await.unwrap_err();

        assert!(matches!(err, SourceError::Unauthorized(_)));
    }

    #[test]
    fn rejects_unusable_endpoint() {
        let err = HttpMetadataSource::new(&config("not a url".into())).unwrap_err();
        assert!(matches!(err, SourceError::Configuration(_)));
    }
}

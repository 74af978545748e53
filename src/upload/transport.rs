//! Trait abstraction for the collector's HTTP endpoints to enable testing

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, trace, warn};

const DEFAULT_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Default request timeout
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Transport-level failure (connection, timeout, unreadable body)
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("failed to create HTTP client: {0}")]
    Client(String),

    #[error("request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },
}

/// One file of a multipart form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    pub field: String,
    pub file_name: String,
    pub content: Bytes,
}

/// Status line and body of a POST answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub reason: String,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Trait for the two requests an upload pass makes
#[async_trait]
pub trait UploadTransport: Send + Sync {
    /// POST a `multipart/form-data` body made of text fields and files.
    /// Any HTTP status is returned as a response, not an error.
    async fn post_multipart(
        &self,
        url: &str,
        fields: &[(String, String)],
        files: Vec<FilePart>,
    ) -> Result<HttpResponse, TransportError>;

    /// GET a text document; non-2xx statuses are errors
    async fn get_text(&self, url: &str) -> Result<String, TransportError>;
}

/// reqwest-backed transport
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        Self::with_timeout(DEFAULT_TIMEOUT_SECS)
    }

    pub fn with_timeout(timeout_secs: u64) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(DEFAULT_USER_AGENT)
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;
        Ok(Self { client })
    }
}

fn request_error(url: &str, e: reqwest::Error) -> TransportError {
    warn!(
        url = url,
        error = %e,
        is_connect = e.is_connect(),
        is_timeout = e.is_timeout(),
        "HTTP request failed"
    );
    TransportError::Request {
        url: url.to_string(),
        reason: e.to_string(),
    }
}

#[async_trait]
impl UploadTransport for ReqwestTransport {
    async fn post_multipart(
        &self,
        url: &str,
        fields: &[(String, String)],
        files: Vec<FilePart>,
    ) -> Result<HttpResponse, TransportError> {
        let mut form = reqwest::multipart::Form::new();
        for (name, value) in fields {
            form = form.text(name.clone(), value.clone());
        }
        for file in files {
            trace!(url = url, file = %file.file_name, bytes = file.content.len(), "Adding file part");
            let part = reqwest::multipart::Part::bytes(file.content.to_vec())
                .file_name(file.file_name)
                .mime_str("text/xml")
                .map_err(|e| request_error(url, e))?;
            form = form.part(file.field, part);
        }

        let response = self
            .client
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| request_error(url, e))?;

        let status = response.status();
        let reason = status.canonical_reason().unwrap_or_default().to_string();
        let body = response.text().await.map_err(|e| request_error(url, e))?;
        debug!(url = url, status = status.as_u16(), "Upload response received");

        Ok(HttpResponse {
            status: status.as_u16(),
            reason,
            body,
        })
    }

    async fn get_text(&self, url: &str) -> Result<String, TransportError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| request_error(url, e))?;

        if !response.status().is_success() {
            warn!(url = url, status = response.status().as_u16(), "HTTP error status");
            return Err(TransportError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        response.text().await.map_err(|e| request_error(url, e))
    }
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// A POST the mock received
    #[derive(Debug, Clone)]
    pub struct RecordedPost {
        pub url: String,
        pub fields: Vec<(String, String)>,
        pub files: Vec<FilePart>,
    }

    /// Mock transport answering from scripted queues
    #[derive(Clone, Default)]
    pub struct MockTransport {
        pub version_document: Arc<Mutex<Option<Result<String, TransportError>>>>,
        pub responses: Arc<Mutex<VecDeque<Result<HttpResponse, TransportError>>>>,
        pub posts: Arc<Mutex<Vec<RecordedPost>>>,
        pub gets: Arc<Mutex<Vec<String>>>,
    }

    impl MockTransport {
        /// Mock whose version document announces `version`
        pub fn with_version(version: &str) -> Self {
            let mock = Self::default();
            *mock.version_document.lock().unwrap() =
                Some(Ok(format!("Some=thing\nMappingManagerVersion={}\n", version)));
            mock
        }

        pub fn set_version_error(&self, error: TransportError) {
            *self.version_document.lock().unwrap() = Some(Err(error));
        }

        pub fn push_body(&self, status: u16, body: &str) {
            self.responses.lock().unwrap().push_back(Ok(HttpResponse {
                status,
                reason: String::new(),
                body: body.to_string(),
            }));
        }

        pub fn push_error(&self, reason: &str) {
            self.responses.lock().unwrap().push_back(Err(TransportError::Request {
                url: "mock".to_string(),
                reason: reason.to_string(),
            }));
        }

        pub fn get_posts(&self) -> Vec<RecordedPost> {
            self.posts.lock().unwrap().clone()
        }

        pub fn get_count(&self) -> usize {
            self.gets.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl UploadTransport for MockTransport {
        async fn post_multipart(
            &self,
            url: &str,
            fields: &[(String, String)],
            files: Vec<FilePart>,
        ) -> Result<HttpResponse, TransportError> {
            self.posts.lock().unwrap().push(RecordedPost {
                url: url.to_string(),
                fields: fields.to_vec(),
                files,
            });
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Request {
                    url: url.to_string(),
                    reason: "no scripted response".to_string(),
                }))
        }

        async fn get_text(&self, url: &str) -> Result<String, TransportError> {
            self.gets.lock().unwrap().push(url.to_string());
            self.version_document
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| Err(TransportError::Status { url: url.to_string(), status: 404 }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_response_success_range() {
        let mut response = HttpResponse { status: 200, reason: "OK".to_string(), body: String::new() };
        assert!(response.is_success());
        response.status = 299;
        assert!(response.is_success());
        response.status = 500;
        assert!(!response.is_success());
    }

    #[test]
    fn test_reqwest_transport_builds() {
        assert!(ReqwestTransport::new().is_ok());
        assert!(ReqwestTransport::with_timeout(5).is_ok());
    }

    #[tokio::test]
    async fn test_mock_records_posts() {
        let mock = mocks::MockTransport::with_version("2");
        mock.push_body(200, "Stored in x");

        let response = mock
            .post_multipart(
                "http://collector/upload",
                &[("openBmap_login".to_string(), "me".to_string())],
                vec![FilePart {
                    field: "file".to_string(),
                    file_name: "a.xml".to_string(),
                    content: Bytes::from_static(b"<logfile/>"),
                }],
            )
            .await
            .unwrap();

        assert_eq!(response.body, "Stored in x");
        let posts = mock.get_posts();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].files[0].file_name, "a.xml");
        assert!(mock.get_text("http://collector/version").await.unwrap().contains("MappingManagerVersion=2"));
    }
}

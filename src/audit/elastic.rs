//! Elasticsearch-style document sink
//!
//! Indexes audit events into a document store over plain HTTP. Request
//! documents are keyed by their correlation id; every write is spawned off
//! the request path and failures are logged and dropped.

use crate::audit::events::{AuditEvent, RequestRecord, ResponseRecord};
use crate::audit::sink::AuditSink;
use crate::config::AuditSettings;
use crate::proxy::types::{CorrelationId, ProxyError, ProxyResult, TargetUrl};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use bytes::Bytes;
use chrono::Utc;
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::{Method, Request};
use http_body_util::Full;
use nutype::nutype;
use std::time::Duration;
use tracing::warn;

/// Name of the index audit documents land in
#[nutype(
    derive(Clone, Debug, Display, Deserialize, Serialize, TryFrom, AsRef),
    validate(predicate = |s: &str| !s.is_empty() && !s.contains('/')),
)]
pub struct IndexName(String);

/// Bound on background index writes so a stuck store cannot pile up tasks
const SINK_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

const CONTENT_TYPE_JSON: &str = "application/json";

type SinkHttpClient = hyper_util::client::legacy::Client<
    hyper_util::client::legacy::connect::HttpConnector,
    Full<Bytes>,
>;

/// HTTP document-store sink
pub struct ElasticDocSink {
    client: SinkHttpClient,
    base_url: TargetUrl,
    index: IndexName,
    auth: Option<String>,
}

impl ElasticDocSink {
    pub fn new(settings: &AuditSettings) -> ProxyResult<Self> {
        let base_url = TargetUrl::try_new(settings.url.clone())
            .map_err(|e| ProxyError::InvalidTargetUrl(format!("audit url: {e}")))?;
        let index = IndexName::try_new(settings.index.clone())
            .map_err(|e| ProxyError::Internal(format!("invalid audit index name: {e}")))?;

        let client =
            hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
                .build_http();

        Ok(Self {
            client,
            base_url,
            index,
            auth: auth_header(settings),
        })
    }

    /// Serialize and index one event. Documents with an id are PUT so a
    /// replayed write stays idempotent; the rest are POSTed.
    fn index_document(&self, doc_id: Option<&CorrelationId>, event: &AuditEvent) {
        let payload: Bytes = match serde_json::to_vec(event) {
            Ok(bytes) => bytes.into(),
            Err(e) => {
                warn!(error = %e, "failed to serialize audit document");
                return;
            }
        };

        let base = self.base_url.as_ref().trim_end_matches('/');
        let (method, uri) = match doc_id {
            Some(id) => (Method::PUT, format!("{base}/{}/_doc/{id}", self.index)),
            None => (Method::POST, format!("{base}/{}/_doc", self.index)),
        };

        let mut builder = Request::builder()
            .method(method)
            .uri(&uri)
            .header(CONTENT_TYPE, CONTENT_TYPE_JSON);
        if let Some(auth) = &self.auth {
            builder = builder.header(AUTHORIZATION, auth);
        }

        let request = match builder.body(Full::new(payload)) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "failed to build audit index request");
                return;
            }
        };

        let client = self.client.clone();
        tokio::spawn(async move {
            match tokio::time::timeout(SINK_WRITE_TIMEOUT, client.request(request)).await {
                Ok(Ok(response)) if response.status().is_success() => {}
                Ok(Ok(response)) => {
                    warn!(status = %response.status(), "audit store rejected document");
                }
                Ok(Err(e)) => warn!(error = %e, "audit store write failed"),
                Err(_) => warn!("audit store write timed out"),
            }
        });
    }
}

impl AuditSink for ElasticDocSink {
    fn record_request(&self, record: RequestRecord) -> CorrelationId {
        let id = CorrelationId::generate();
        let event = AuditEvent::RequestRecorded {
            id: id.to_string(),
            record,
        };
        self.index_document(Some(&id), &event);
        id
    }

    fn record_response(&self, id: &CorrelationId, record: ResponseRecord) {
        if id.is_unlogged() {
            return;
        }
        let event = AuditEvent::ResponseRecorded {
            request_id: id.to_string(),
            record,
        };
        self.index_document(None, &event);
    }

    fn record_admission(&self, id: &CorrelationId, allowed: bool, reason: Option<&str>) {
        if id.is_unlogged() {
            return;
        }
        let event = AuditEvent::AdmissionRecorded {
            request_id: id.to_string(),
            timestamp: Utc::now(),
            allowed,
            reason: reason.map(String::from),
        };
        self.index_document(None, &event);
    }
}

/// Precompute the Authorization header: API key wins over basic auth,
/// neither configured means anonymous access.
fn auth_header(settings: &AuditSettings) -> Option<String> {
    if !settings.api_key.is_empty() {
        return Some(format!("ApiKey {}", settings.api_key));
    }
    if !settings.username.is_empty() {
        let credentials = BASE64.encode(format!("{}:{}", settings.username, settings.password));
        return Some(format!("Basic {credentials}"));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use std::time::Duration;

    fn settings_for(url: &str) -> AuditSettings {
        AuditSettings {
            enabled: true,
            url: url.to_string(),
            index: "gatehouse-proxy".to_string(),
            username: String::new(),
            password: String::new(),
            api_key: String::new(),
        }
    }

    fn request_record() -> RequestRecord {
        RequestRecord {
            timestamp: Utc::now(),
            method: "POST".to_string(),
            path: "/api/chat".to_string(),
            remote_ip: "127.0.0.1:5000".to_string(),
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: "{}".to_string(),
            llm_request: None,
        }
    }

    #[tokio::test]
    async fn request_documents_are_keyed_by_correlation_id() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock(
                "PUT",
                Matcher::Regex(r"^/gatehouse-proxy/_doc/[0-9a-f-]+$".to_string()),
            )
            .with_status(201)
            .create_async()
            .await;

        let sink = ElasticDocSink::new(&settings_for(&server.url())).unwrap();
        let id = sink.record_request(request_record());
        assert!(!id.is_unlogged());

        // the write is spawned; give it a moment to land
        tokio::time::sleep(Duration::from_millis(200)).await;
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn admission_documents_are_posted_unkeyed() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/gatehouse-proxy/_doc")
            .match_body(Matcher::PartialJsonString(
                r#"{"event":"admission_recorded","allowed":false,"reason":"nope"}"#.to_string(),
            ))
            .with_status(201)
            .create_async()
            .await;

        let sink = ElasticDocSink::new(&settings_for(&server.url())).unwrap();
        sink.record_admission(&CorrelationId::generate(), false, Some("nope"));

        tokio::time::sleep(Duration::from_millis(200)).await;
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn unlogged_sentinel_suppresses_writes() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/gatehouse-proxy/_doc")
            .expect(0)
            .create_async()
            .await;

        let sink = ElasticDocSink::new(&settings_for(&server.url())).unwrap();
        sink.record_admission(&CorrelationId::unlogged(), true, None);

        tokio::time::sleep(Duration::from_millis(100)).await;
        mock.assert_async().await;
    }

    #[test]
    fn api_key_auth_takes_precedence() {
        let mut settings = settings_for("http://localhost:9200");
        settings.api_key = "secret".to_string();
        settings.username = "elastic".to_string();
        settings.password = "pw".to_string();

        assert_eq!(auth_header(&settings).as_deref(), Some("ApiKey secret"));
    }

    #[test]
    fn basic_auth_is_base64_of_user_and_password() {
        let mut settings = settings_for("http://localhost:9200");
        settings.username = "elastic".to_string();
        settings.password = "pw".to_string();

        let header = auth_header(&settings).unwrap();
        assert_eq!(header, format!("Basic {}", BASE64.encode("elastic:pw")));
    }

    #[test]
    fn no_credentials_means_anonymous() {
        assert!(auth_header(&settings_for("http://localhost:9200")).is_none());
    }

    #[test]
    fn invalid_audit_url_is_rejected() {
        let settings = settings_for("not-a-url");
        assert!(ElasticDocSink::new(&settings).is_err());
    }
}

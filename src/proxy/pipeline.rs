//! The interception pipeline
//!
//! Per-request decision order: record the request, gate state-mutating
//! methods through admission control, then either short-circuit with a
//! synthetic denial or forward to the backend, tapping streamed responses
//! for reassembly. Within one request the audit sink always sees request,
//! then admission, then response; a denied request is never forwarded.

use crate::admission::{denial_body, PolicyChecker, DEFAULT_DENIAL_REASON};
use crate::audit::{AuditSink, RequestRecord, ResponseRecord};
use crate::proxy::forwarder::Forwarder;
use crate::proxy::reassembler::{tap_response_body, StreamReassembler};
use crate::proxy::types::{
    ApiKind, ModelName, ProxyError, ProxyResult, RequestSizeLimit,
};
use axum::body::Body;
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{Method, Request, Response, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

const MODEL_UNKNOWN: &str = "unknown";

/// Orchestrates admission, forwarding, and response recording for one
/// request at a time. Stateless across requests; safe to share.
pub struct InterceptionPipeline {
    sink: Arc<dyn AuditSink>,
    checker: Arc<dyn PolicyChecker>,
    forwarder: Forwarder,
    denial_model: ModelName,
    max_request_size: RequestSizeLimit,
}

impl InterceptionPipeline {
    pub fn new(
        sink: Arc<dyn AuditSink>,
        checker: Arc<dyn PolicyChecker>,
        forwarder: Forwarder,
        denial_model: ModelName,
        max_request_size: RequestSizeLimit,
    ) -> Self {
        Self {
            sink,
            checker,
            forwarder,
            denial_model,
            max_request_size,
        }
    }

    /// Run one request through the pipeline.
    pub async fn handle(
        &self,
        request: Request<Body>,
        remote_addr: &str,
    ) -> ProxyResult<Response<Body>> {
        let (parts, body) = request.into_parts();
        let path = parts.uri.path().to_string();

        // The body is buffered exactly once; admission inspects these bytes
        // and forwarding replays them, so inspection can never corrupt or
        // truncate what reaches the backend.
        let body_bytes = buffer_request_body(body, self.max_request_size).await?;

        info!(method = %parts.method, %path, "intercepted request");

        let record = RequestRecord::from_http(
            parts.method.as_str(),
            &path,
            remote_addr,
            &parts.headers,
            &body_bytes,
        );
        let correlation_id = self.sink.record_request(record);

        // Gate on method, not path: every state-mutating request is checked
        if parts.method == Method::POST {
            let candidate = String::from_utf8_lossy(&body_bytes);
            let verdict = self.checker.evaluate(&candidate).await;

            if let Some(error) = &verdict.evaluation_error {
                warn!(
                    correlation_id = %correlation_id,
                    %error,
                    "admission evaluation degraded, failing open"
                );
            }

            self.sink
                .record_admission(&correlation_id, verdict.allowed, verdict.reason.as_deref());

            if !verdict.allowed {
                let reason = verdict
                    .reason
                    .unwrap_or_else(|| DEFAULT_DENIAL_REASON.to_string());
                info!(
                    correlation_id = %correlation_id,
                    %reason,
                    "request denied by admission control"
                );
                return self.denial_response(&reason);
            }
        }

        let (stream_requested, model) = stream_intent(&body_bytes);

        let response = self.forwarder.forward(parts, body_bytes).await?;

        if correlation_id.is_unlogged() {
            // Nothing to record; relay the response untouched
            return Ok(response);
        }

        if stream_requested {
            let reassembler = StreamReassembler::new(
                self.sink.clone(),
                correlation_id,
                ApiKind::from_path(&path),
                model,
            );
            let (response_parts, response_body) = response.into_parts();
            return Ok(Response::from_parts(
                response_parts,
                tap_response_body(response_body, reassembler),
            ));
        }

        // Non-streaming: buffer the whole backend response and record it in
        // one shot before handing it to the client
        let (response_parts, response_body) = response.into_parts();
        let collected = response_body
            .collect()
            .await
            .map_err(|e| ProxyError::Upstream(format!("failed to read backend response: {e}")))?
            .to_bytes();

        let record = ResponseRecord::from_http(
            response_parts.status.as_u16(),
            &path,
            &response_parts.headers,
            &collected,
        );
        self.sink.record_response(&correlation_id, record);

        Ok(Response::from_parts(response_parts, Body::from(collected)))
    }

    fn denial_response(&self, reason: &str) -> ProxyResult<Response<Body>> {
        let body = denial_body(self.denial_model.as_ref(), reason);
        Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .map_err(ProxyError::from)
    }
}

/// Collect the request body within the configured cap. An I/O failure here
/// is the one case that surfaces to the client as a 400.
async fn buffer_request_body(body: Body, limit: RequestSizeLimit) -> ProxyResult<Bytes> {
    let collected = http_body_util::Limited::new(body, *limit.as_ref())
        .collect()
        .await
        .map_err(|e| {
            if e.is::<http_body_util::LengthLimitError>() {
                ProxyError::RequestTooLarge { max_size: limit }
            } else {
                ProxyError::RequestBodyRead(e.to_string())
            }
        })?;
    Ok(collected.to_bytes())
}

/// Whether the request asked for a streamed response, and which model it
/// addressed. Non-JSON bodies stream nothing and address no model.
fn stream_intent(body: &[u8]) -> (bool, String) {
    let Ok(data) = serde_json::from_slice::<Value>(body) else {
        return (false, MODEL_UNKNOWN.to_string());
    };

    let stream = data
        .get("stream")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let model = data
        .get("model")
        .and_then(Value::as_str)
        .unwrap_or(MODEL_UNKNOWN)
        .to_string();

    (stream, model)
}

//! Main proxy service implementation
//!
//! `ProxyService` wires the audit sink, the policy checker, and the
//! forwarder into an [`InterceptionPipeline`] and exposes it as an Axum
//! router: a health endpoint plus a fallback that relays every other
//! method/path combination. Interception is path-agnostic by design.

use crate::admission::{NoopChecker, OllamaChecker, PolicyChecker};
use crate::audit::{AuditSink, ElasticDocSink, NoopAuditSink};
use crate::config::Settings;
use crate::proxy::forwarder::Forwarder;
use crate::proxy::headers::paths;
use crate::proxy::pipeline::InterceptionPipeline;
use crate::proxy::types::{ModelName, ProxyError, ProxyResult, RequestSizeLimit, TargetUrl};
use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// The assembled proxy: one pipeline shared by all connections
pub struct ProxyService {
    pipeline: Arc<InterceptionPipeline>,
}

impl ProxyService {
    /// Build the service from configuration, choosing no-op implementations
    /// for disabled collaborators so the pipeline never branches on
    /// presence.
    pub fn from_settings(settings: &Settings) -> ProxyResult<Self> {
        let sink: Arc<dyn AuditSink> = if settings.audit.enabled {
            Arc::new(ElasticDocSink::new(&settings.audit)?)
        } else {
            info!("audit logging disabled");
            Arc::new(NoopAuditSink)
        };

        let denial_model = ModelName::try_new(settings.admission.model_name.clone())
            .unwrap_or_else(|_| ModelName::try_new("unknown".to_string()).expect("static name"));

        let checker: Arc<dyn PolicyChecker> = if settings.admission.enabled {
            let model = ModelName::try_new(settings.admission.model_name.clone())
                .map_err(|e| ProxyError::Internal(format!("invalid judgment model name: {e}")))?;
            let judge_url = TargetUrl::try_new(settings.admission.ollama_url.clone())
                .map_err(|e| ProxyError::InvalidTargetUrl(format!("judgment url: {e}")))?;
            Arc::new(OllamaChecker::new(
                model,
                judge_url,
                Duration::from_secs(settings.admission.timeout_secs),
                settings.admission.max_retries,
            ))
        } else {
            warn!("admission control disabled, all requests pass unchecked");
            Arc::new(NoopChecker)
        };

        let target = TargetUrl::try_new(settings.proxy.target_url.clone())
            .map_err(|e| ProxyError::InvalidTargetUrl(format!("target url: {e}")))?;
        let forwarder = Forwarder::new(
            target,
            Duration::from_secs(settings.proxy.request_timeout_secs),
        )?;

        let max_request_size = RequestSizeLimit::try_new(settings.proxy.max_request_bytes)
            .map_err(|e| ProxyError::Internal(format!("invalid request size limit: {e}")))?;

        let pipeline = Arc::new(InterceptionPipeline::new(
            sink,
            checker,
            forwarder,
            denial_model,
            max_request_size,
        ));

        Ok(Self { pipeline })
    }

    /// Create an Axum router for the proxy service
    pub fn into_router(self) -> axum::Router {
        axum::Router::new()
            .route(paths::HEALTH, axum::routing::get(health_handler))
            .fallback(proxy_handler)
            .with_state(Arc::new(self))
            .layer(TraceLayer::new_for_http())
    }
}

/// Axum handler relaying everything through the pipeline
async fn proxy_handler(
    State(service): State<Arc<ProxyService>>,
    request: Request<Body>,
) -> Result<Response, ProxyError> {
    let remote_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.to_string())
        .unwrap_or_default();

    service.pipeline.handle(request, &remote_addr).await
}

/// Health check handler
async fn health_handler() -> &'static str {
    "OK"
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = match &self {
            // The only client-visible 4xx: the request itself was unreadable
            ProxyError::RequestBodyRead(_) | ProxyError::RequestTooLarge { .. } => {
                StatusCode::BAD_REQUEST
            }
            ProxyError::RequestTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::BAD_GATEWAY,
        };

        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn disabled_settings() -> Settings {
        let mut settings = Settings::new().unwrap();
        settings.admission.enabled = false;
        settings.audit.enabled = false;
        settings
    }

    #[tokio::test]
    async fn service_builds_from_disabled_settings() {
        let service = ProxyService::from_settings(&disabled_settings());
        assert!(service.is_ok());
    }

    #[tokio::test]
    async fn health_endpoint_answers_without_a_backend() {
        let service = ProxyService::from_settings(&disabled_settings()).unwrap();
        let app = service.into_router();

        let response = app
            .oneshot(
                http::Request::builder()
                    .uri(paths::HEALTH)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"OK");
    }

    #[test]
    fn invalid_target_url_is_rejected_at_build_time() {
        let mut settings = disabled_settings();
        settings.proxy.target_url = "not-a-url".to_string();
        assert!(ProxyService::from_settings(&settings).is_err());
    }

    #[test]
    fn body_errors_map_to_bad_request() {
        let response =
            ProxyError::RequestBodyRead("connection reset".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = ProxyError::Upstream("backend down".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}

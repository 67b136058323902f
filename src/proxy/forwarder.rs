//! The forward-and-relay primitive
//!
//! Rebases the inbound request onto the configured backend, applies the
//! forwarding header rewrite, and relays the backend's response body without
//! buffering it, so streamed responses reach the client in real time.

use crate::proxy::headers::{apply_forwarding_headers, paths};
use crate::proxy::types::{ProxyError, ProxyResult, TargetUrl};
use axum::body::Body;
use bytes::Bytes;
use hyper::{Request, Response, Uri};
use std::time::Duration;
use tracing::debug;

type ForwardClient = hyper_util::client::legacy::Client<
    hyper_util::client::legacy::connect::HttpConnector,
    Body,
>;

/// Forwards requests to the single configured backend
#[derive(Clone)]
pub struct Forwarder {
    client: ForwardClient,
    target: TargetUrl,
    target_host: String,
    timeout: Duration,
}

impl Forwarder {
    pub fn new(target: TargetUrl, timeout: Duration) -> ProxyResult<Self> {
        let target_uri: Uri = target
            .as_ref()
            .parse()
            .map_err(|_| ProxyError::InvalidTargetUrl(target.as_ref().to_string()))?;
        let target_host = target_uri
            .authority()
            .map(|authority| authority.to_string())
            .ok_or_else(|| ProxyError::InvalidTargetUrl(target.as_ref().to_string()))?;

        let client =
            hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
                .http1_title_case_headers(true)
                .http1_preserve_header_case(true)
                .build_http();

        Ok(Self {
            client,
            target,
            target_host,
            timeout,
        })
    }

    /// Send the request to the backend and hand back its response with the
    /// body still streaming.
    pub async fn forward(
        &self,
        mut parts: http::request::Parts,
        body: Bytes,
    ) -> ProxyResult<Response<Body>> {
        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or(paths::DEFAULT);

        let full_uri = format!(
            "{}{}",
            self.target.as_ref().trim_end_matches('/'),
            path_and_query
        );
        parts.uri = full_uri
            .parse()
            .map_err(|_| ProxyError::InvalidTargetUrl(full_uri))?;

        apply_forwarding_headers(&mut parts.headers, &self.target_host);

        debug!(uri = %parts.uri, method = %parts.method, "forwarding to backend");

        let outgoing = Request::from_parts(parts, Body::from(body));
        let response = tokio::time::timeout(self.timeout, self.client.request(outgoing))
            .await
            .map_err(|_| ProxyError::RequestTimeout(self.timeout))?
            .map_err(|e| ProxyError::Upstream(format!("backend connection failed: {e}")))?;

        let (response_parts, response_body) = response.into_parts();
        Ok(Response::from_parts(response_parts, Body::new(response_body)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::headers::{PROXY_AGENT, X_FORWARDED_HOST, X_PROXY_AGENT};
    use http::HeaderMap;
    use http_body_util::BodyExt;
    use std::net::SocketAddr;
    use tokio::net::TcpListener;

    async fn spawn_backend(app: axum::Router) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn forwarder_for(addr: SocketAddr) -> Forwarder {
        let target = TargetUrl::try_new(format!("http://{addr}")).unwrap();
        Forwarder::new(target, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn forwards_and_relays_the_backend_response() {
        let app = axum::Router::new().route(
            "/echo",
            axum::routing::post(|body: String| async move { body }),
        );
        let addr = spawn_backend(app).await;

        let (parts, ()) = Request::builder()
            .method("POST")
            .uri("/echo?x=1")
            .body(())
            .unwrap()
            .into_parts();

        let response = forwarder_for(addr)
            .forward(parts, Bytes::from_static(b"payload"))
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"payload");
    }

    #[tokio::test]
    async fn forwarded_requests_carry_proxy_markers() {
        let app = axum::Router::new().route(
            "/inspect",
            axum::routing::get(|headers: HeaderMap| async move {
                format!(
                    "{}|{}",
                    headers
                        .get(X_PROXY_AGENT)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or(""),
                    headers
                        .get(X_FORWARDED_HOST)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or(""),
                )
            }),
        );
        let addr = spawn_backend(app).await;

        let (parts, ()) = Request::builder()
            .uri("/inspect")
            .header("host", "proxy.local:8080")
            .body(())
            .unwrap()
            .into_parts();

        let response = forwarder_for(addr)
            .forward(parts, Bytes::new())
            .await
            .unwrap();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();

        assert_eq!(text, format!("{PROXY_AGENT}|proxy.local:8080"));
    }

    #[tokio::test]
    async fn unreachable_backend_is_an_upstream_error() {
        // bind-then-drop to get a port nothing listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (parts, ()) = Request::builder().uri("/").body(()).unwrap().into_parts();
        let result = forwarder_for(addr).forward(parts, Bytes::new()).await;

        assert!(matches!(result, Err(ProxyError::Upstream(_))));
    }
}

//! Admission checking against a judgment model
//!
//! The checker submits candidate text to an Ollama-compatible `/api/chat`
//! endpoint with a fixed classification instruction and maps the reply onto
//! a [`PolicyVerdict`]. Transport failures are retried with exponential
//! backoff and, once exhausted, fail open: an unreachable judge must never
//! take the backend down with it.

use crate::admission::verdict::{parse_verdict, ParsedVerdict, PolicyVerdict};
use crate::admission::ChatMessage;
use crate::proxy::types::{ModelName, TargetUrl};
use async_trait::async_trait;
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{Method, Request};
use http_body_util::{BodyExt, Full};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

/// Instruction pinning the judge to the one-token verdict grammar
pub const JUDGE_SYSTEM_INSTRUCTION: &str = "You are a security reviewer. Your task is to check \
     whether the content is permitted. Reply with ALLOW or DISALLOW only.";

/// Judgment calls are slow LLM inferences; configured timeouts below this
/// floor are raised to it so premature timeouts do not inflate false-opens.
pub const JUDGE_TIMEOUT_FLOOR: Duration = Duration::from_secs(30);

const BACKOFF_INITIAL: Duration = Duration::from_millis(500);
const BACKOFF_CAP: Duration = Duration::from_secs(5);

const CONTENT_TYPE_JSON: &str = "application/json";

/// Capability gating whether a request may reach the backend.
///
/// Implementations are stateless aside from configuration and their
/// transport client, so one instance serves concurrent requests without
/// per-call locking.
#[async_trait]
pub trait PolicyChecker: Send + Sync {
    /// Evaluate a body of text against the admission policy.
    async fn evaluate(&self, text: &str) -> PolicyVerdict;

    /// Evaluate a chat exchange by checking its most recent user turn.
    /// An exchange with no user turn is allowed.
    async fn evaluate_messages(&self, messages: &[ChatMessage]) -> PolicyVerdict {
        match messages.iter().rev().find(|m| m.role == "user") {
            Some(turn) => self.evaluate(&turn.content).await,
            None => PolicyVerdict::allow(),
        }
    }
}

/// Checker used when admission control is disabled: allows everything
/// without a network call, so call sites never branch on presence.
pub struct NoopChecker;

#[async_trait]
impl PolicyChecker for NoopChecker {
    async fn evaluate(&self, _text: &str) -> PolicyVerdict {
        PolicyVerdict::allow()
    }
}

type JudgeHttpClient = hyper_util::client::legacy::Client<
    hyper_util::client::legacy::connect::HttpConnector,
    Full<Bytes>,
>;

/// Checker backed by an Ollama-compatible judgment endpoint
pub struct OllamaChecker {
    model: ModelName,
    judge_url: TargetUrl,
    timeout: Duration,
    max_retries: u32,
    client: JudgeHttpClient,
}

#[derive(Serialize)]
struct JudgeTurn<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct JudgeRequest<'a> {
    model: &'a str,
    messages: [JudgeTurn<'a>; 2],
    stream: bool,
}

#[derive(Deserialize)]
struct JudgeReply {
    content: String,
}

#[derive(Deserialize)]
struct JudgeResponse {
    message: JudgeReply,
}

/// How one judgment attempt failed. Transport faults are retried;
/// a malformed reply is not, since resending the same request cannot fix it.
enum AttemptError {
    Transport(String),
    Malformed(String),
}

impl OllamaChecker {
    pub fn new(
        model: ModelName,
        judge_url: TargetUrl,
        configured_timeout: Duration,
        max_retries: u32,
    ) -> Self {
        let timeout = effective_timeout(configured_timeout);
        if timeout != configured_timeout {
            warn!(
                configured = ?configured_timeout,
                effective = ?timeout,
                "configured judgment timeout is below the floor, raising it"
            );
        }

        let client =
            hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
                .build_http();

        info!(
            model = %model,
            judge_url = %judge_url,
            ?timeout,
            max_retries,
            "admission control enabled"
        );

        Self {
            model,
            judge_url,
            timeout,
            max_retries,
            client,
        }
    }

    /// One bounded judgment call: POST the classification request and return
    /// the judge's reply text.
    async fn send_judgment(&self, payload: Bytes) -> Result<String, AttemptError> {
        let uri = format!(
            "{}/api/chat",
            self.judge_url.as_ref().trim_end_matches('/')
        );

        let request = Request::builder()
            .method(Method::POST)
            .uri(&uri)
            .header(CONTENT_TYPE, CONTENT_TYPE_JSON)
            .body(Full::new(payload))
            .map_err(|e| AttemptError::Transport(format!("failed to build request: {e}")))?;

        let response = tokio::time::timeout(self.timeout, self.client.request(request))
            .await
            .map_err(|_| {
                AttemptError::Transport(format!("judgment call timed out after {:?}", self.timeout))
            })?
            .map_err(|e| AttemptError::Transport(format!("judgment call failed: {e}")))?;

        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| AttemptError::Transport(format!("failed to read judge reply: {e}")))?
            .to_bytes();

        if !status.is_success() {
            return Err(AttemptError::Transport(format!(
                "judgment service returned {status}"
            )));
        }

        let parsed: JudgeResponse = serde_json::from_slice(&body)
            .map_err(|e| AttemptError::Malformed(format!("unparseable judge reply: {e}")))?;

        Ok(parsed.message.content)
    }
}

#[async_trait]
impl PolicyChecker for OllamaChecker {
    async fn evaluate(&self, text: &str) -> PolicyVerdict {
        let judge_request = JudgeRequest {
            model: self.model.as_ref(),
            messages: [
                JudgeTurn {
                    role: "system",
                    content: JUDGE_SYSTEM_INSTRUCTION,
                },
                JudgeTurn {
                    role: "user",
                    content: text,
                },
            ],
            stream: false,
        };

        let payload: Bytes = match serde_json::to_vec(&judge_request) {
            Ok(bytes) => bytes.into(),
            Err(e) => {
                warn!(error = %e, "failed to serialize judgment request, allowing");
                return PolicyVerdict::fail_open(format!("serialization failed: {e}"));
            }
        };

        let mut last_error = String::new();
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(backoff_delay(attempt - 1)).await;
            }

            match self.send_judgment(payload.clone()).await {
                Ok(reply) => {
                    return match parse_verdict(&reply) {
                        ParsedVerdict::Allowed => PolicyVerdict::allow(),
                        ParsedVerdict::Denied(reason) => PolicyVerdict::deny(reason),
                        ParsedVerdict::Anomalous => {
                            warn!(%reply, "unrecognized verdict from judgment model, allowing");
                            PolicyVerdict::fail_open(format!("unrecognized verdict: {reply}"))
                        }
                    };
                }
                Err(AttemptError::Malformed(error)) => {
                    warn!(%error, "malformed judge reply, allowing");
                    return PolicyVerdict::fail_open(error);
                }
                Err(AttemptError::Transport(error)) => {
                    warn!(
                        attempt,
                        max_retries = self.max_retries,
                        %error,
                        "judgment call failed"
                    );
                    last_error = error;
                }
            }
        }

        warn!(%last_error, "admission check exhausted retries, allowing");
        PolicyVerdict::fail_open(last_error)
    }
}

/// Enforce the judgment timeout floor.
fn effective_timeout(configured: Duration) -> Duration {
    configured.max(JUDGE_TIMEOUT_FLOOR)
}

/// Delay before retry `attempt + 1`: exponential from 500ms, capped at 5s.
fn backoff_delay(attempt: u32) -> Duration {
    let doubled = BACKOFF_INITIAL.saturating_mul(1u32 << attempt.min(16));
    doubled.min(BACKOFF_CAP)
}

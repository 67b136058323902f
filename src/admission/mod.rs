//! Admission control for requests headed to the backend
//!
//! Every state-mutating request is classified by a judgment model before it
//! is forwarded. The gate is deliberately fail-open: infrastructure trouble
//! on the judgment path must never block legitimate traffic, so transport
//! exhaustion and malformed verdicts both resolve to allow with the failure
//! surfaced in logs and on the verdict.

pub mod checker;
pub mod denial;
pub mod verdict;

use serde::{Deserialize, Serialize};

pub use checker::{NoopChecker, OllamaChecker, PolicyChecker, JUDGE_TIMEOUT_FLOOR};
pub use denial::denial_body;
pub use verdict::{PolicyVerdict, DEFAULT_DENIAL_REASON};

/// A single chat turn as the inference API represents it
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

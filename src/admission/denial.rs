//! Synthetic denial responses
//!
//! A denied request is answered with HTTP 200 and a body shaped exactly like
//! the backend's own chat completion, so clients cannot distinguish a policy
//! denial from a model that declined. Field order is stable and the timing
//! fields carry plausible fabricated values.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;

/// Denial message shown to the client, with the policy reason appended
const DENIAL_PREFACE: &str = "I'm sorry, but I can't help with that request. Reason:";

// Fabricated but plausible timing values, in nanoseconds where the backend
// reports nanoseconds.
const TOTAL_DURATION: i64 = 8_000_000_000;
const LOAD_DURATION: i64 = 15_000_000;
const PROMPT_EVAL_COUNT: i64 = 15;
const PROMPT_EVAL_DURATION: i64 = 9_000_000;
const EVAL_COUNT: i64 = 400;
const EVAL_DURATION: i64 = 7_900_000_000;

#[derive(Serialize)]
struct DenialMessage<'a> {
    role: &'a str,
    content: String,
}

/// Serialized field order matches the backend's chat response schema.
#[derive(Serialize)]
struct DenialResponse<'a> {
    model: &'a str,
    created_at: String,
    message: DenialMessage<'a>,
    done_reason: &'a str,
    done: bool,
    total_duration: i64,
    load_duration: i64,
    prompt_eval_count: i64,
    prompt_eval_duration: i64,
    eval_count: i64,
    eval_duration: i64,
}

/// Build the JSON body returned in place of a denied request.
pub fn denial_body(model: &str, reason: &str) -> Vec<u8> {
    let response = DenialResponse {
        model,
        created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true),
        message: DenialMessage {
            role: "assistant",
            content: format!("{DENIAL_PREFACE} {reason}"),
        },
        done_reason: "stop",
        done: true,
        total_duration: TOTAL_DURATION,
        load_duration: LOAD_DURATION,
        prompt_eval_count: PROMPT_EVAL_COUNT,
        prompt_eval_duration: PROMPT_EVAL_DURATION,
        eval_count: EVAL_COUNT,
        eval_duration: EVAL_DURATION,
    };

    // The struct serializes infallibly: fixed fields, no maps
    serde_json::to_vec(&response).unwrap_or_default()
}

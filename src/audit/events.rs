//! Audit document shapes
//!
//! Records are write-once: the pipeline builds them, the sink serializes
//! them, and nothing reads them back. Requests and responses against the
//! inference API additionally carry a parsed `llm_request`/`llm_response`
//! section so the documents can be searched by model or prompt rather than
//! by raw body text.

use crate::admission::ChatMessage;
use chrono::{DateTime, Utc};
use http::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Everything captured about one inbound request
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RequestRecord {
    #[serde(rename = "@timestamp")]
    pub timestamp: DateTime<Utc>,
    pub method: String,
    pub path: String,
    pub remote_ip: String,
    pub headers: Vec<(String, String)>,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub llm_request: Option<LlmRequestInfo>,
}

/// Inference-specific fields extracted from a request body
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmRequestInfo {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub prompt: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub temperature: Option<f64>,
}

/// Everything captured about one backend response
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResponseRecord {
    #[serde(rename = "@timestamp")]
    pub timestamp: DateTime<Utc>,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub llm_response: Option<LlmResponseInfo>,
}

/// Inference-specific fields extracted from a response body
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmResponseInfo {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub model: Option<String>,
    /// Completion text from the generate API
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub generated_text: Option<String>,
    /// Assistant reply from the chat API
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub response: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub finished: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub total_duration: Option<i64>,
}

/// Discriminated union of everything written to the sink.
/// Append-only semantics: the sink is only ever written, never queried.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    RequestRecorded {
        id: String,
        #[serde(flatten)]
        record: RequestRecord,
    },
    ResponseRecorded {
        request_id: String,
        #[serde(flatten)]
        record: ResponseRecord,
    },
    AdmissionRecorded {
        request_id: String,
        #[serde(rename = "@timestamp")]
        timestamp: DateTime<Utc>,
        allowed: bool,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        reason: Option<String>,
    },
}

impl RequestRecord {
    pub fn from_http(method: &str, path: &str, remote_ip: &str, headers: &HeaderMap, body: &[u8]) -> Self {
        Self {
            timestamp: Utc::now(),
            method: method.to_string(),
            path: path.to_string(),
            remote_ip: remote_ip.to_string(),
            headers: header_pairs(headers),
            body: String::from_utf8_lossy(body).into_owned(),
            llm_request: parse_llm_request(path, body),
        }
    }
}

impl ResponseRecord {
    pub fn from_http(status: u16, path: &str, headers: &HeaderMap, body: &[u8]) -> Self {
        Self {
            timestamp: Utc::now(),
            status,
            headers: header_pairs(headers),
            body: String::from_utf8_lossy(body).into_owned(),
            llm_response: parse_llm_response(path, body),
        }
    }
}

/// Collapse an HTTP header map into an ordered (name, joined values) list,
/// built once per request and never mutated afterwards.
pub fn header_pairs(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .keys()
        .map(|name| {
            let joined = headers
                .get_all(name)
                .iter()
                .map(|v| v.to_str().unwrap_or("<binary>"))
                .collect::<Vec<_>>()
                .join(", ");
            (name.to_string(), joined)
        })
        .collect()
}

/// Extract inference request fields from an `/api/...` request body.
/// Returns `None` for non-API paths and for bodies that are not JSON.
pub fn parse_llm_request(path: &str, body: &[u8]) -> Option<LlmRequestInfo> {
    if !path.contains("/api/") {
        return None;
    }

    let data: Value = serde_json::from_slice(body).ok()?;

    let mut info = LlmRequestInfo {
        model: data.get("model").and_then(Value::as_str).map(String::from),
        stream: data.get("stream").and_then(Value::as_bool).unwrap_or(false),
        temperature: data.get("temperature").and_then(Value::as_f64),
        system: data.get("system").and_then(Value::as_str).map(String::from),
        ..LlmRequestInfo::default()
    };

    if path.contains("/api/generate") {
        info.prompt = data.get("prompt").and_then(Value::as_str).map(String::from);
    } else if path.contains("/api/chat") {
        if let Some(messages) = data.get("messages").and_then(Value::as_array) {
            info.messages = messages
                .iter()
                .filter_map(Value::as_object)
                .map(|msg| ChatMessage {
                    role: msg
                        .get("role")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    content: msg
                        .get("content")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                })
                .collect();
        }
    }

    Some(info)
}

/// Extract inference response fields from an `/api/...` response body.
pub fn parse_llm_response(path: &str, body: &[u8]) -> Option<LlmResponseInfo> {
    if !path.contains("/api/") {
        return None;
    }

    let data: Value = serde_json::from_slice(body).ok()?;

    let mut info = LlmResponseInfo {
        model: data.get("model").and_then(Value::as_str).map(String::from),
        finished: data.get("done").and_then(Value::as_bool).unwrap_or(false),
        total_duration: data.get("total_duration").and_then(Value::as_i64),
        ..LlmResponseInfo::default()
    };

    if path.contains("/api/generate") {
        info.generated_text = data
            .get("response")
            .and_then(Value::as_str)
            .map(String::from);
    } else if path.contains("/api/chat") {
        info.response = data
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(Value::as_str)
            .map(String::from);
    }

    Some(info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn chat_request_body_is_parsed() {
        let body = json!({
            "model": "llama3",
            "messages": [
                {"role": "system", "content": "be terse"},
                {"role": "user", "content": "hi"}
            ],
            "stream": true,
            "temperature": 0.7
        });

        let info = parse_llm_request("/api/chat", body.to_string().as_bytes()).unwrap();
        assert_eq!(info.model.as_deref(), Some("llama3"));
        assert!(info.stream);
        assert_eq!(info.temperature, Some(0.7));
        assert_eq!(info.messages.len(), 2);
        assert_eq!(info.messages[1].content, "hi");
        assert!(info.prompt.is_none());
    }

    #[test]
    fn generate_request_body_is_parsed() {
        let body = json!({"model": "llama3", "prompt": "tell me a story", "system": "be brief"});

        let info = parse_llm_request("/api/generate", body.to_string().as_bytes()).unwrap();
        assert_eq!(info.prompt.as_deref(), Some("tell me a story"));
        assert_eq!(info.system.as_deref(), Some("be brief"));
        assert!(info.messages.is_empty());
        assert!(!info.stream);
    }

    #[test]
    fn non_api_paths_and_non_json_bodies_yield_nothing() {
        assert!(parse_llm_request("/metrics", b"{\"model\":\"x\"}").is_none());
        assert!(parse_llm_request("/api/chat", b"not json").is_none());
        assert!(parse_llm_response("/health", b"{}").is_none());
        assert!(parse_llm_response("/api/chat", b"\x00\x01").is_none());
    }

    #[test]
    fn chat_response_body_is_parsed() {
        let body = json!({
            "model": "llama3",
            "message": {"role": "assistant", "content": "Hello"},
            "done": true,
            "total_duration": 123456
        });

        let info = parse_llm_response("/api/chat", body.to_string().as_bytes()).unwrap();
        assert_eq!(info.response.as_deref(), Some("Hello"));
        assert!(info.finished);
        assert_eq!(info.total_duration, Some(123456));
        assert!(info.generated_text.is_none());
    }

    #[test]
    fn generate_response_body_is_parsed() {
        let body = json!({"model": "llama3", "response": "Once upon", "done": false});

        let info = parse_llm_response("/api/generate", body.to_string().as_bytes()).unwrap();
        assert_eq!(info.generated_text.as_deref(), Some("Once upon"));
        assert!(!info.finished);
    }

    #[test]
    fn header_pairs_join_repeated_values() {
        let mut headers = HeaderMap::new();
        headers.append("accept", "text/plain".parse().unwrap());
        headers.append("accept", "application/json".parse().unwrap());
        headers.insert("content-type", "application/json".parse().unwrap());

        let pairs = header_pairs(&headers);
        assert!(pairs.contains(&(
            "accept".to_string(),
            "text/plain, application/json".to_string()
        )));
        assert!(pairs.contains(&("content-type".to_string(), "application/json".to_string())));
    }

    #[test]
    fn audit_event_serializes_with_discriminant() {
        let event = AuditEvent::AdmissionRecorded {
            request_id: "abc".to_string(),
            timestamp: Utc::now(),
            allowed: false,
            reason: Some("prohibited content".to_string()),
        };

        let value: Value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "admission_recorded");
        assert_eq!(value["request_id"], "abc");
        assert_eq!(value["allowed"], false);
        assert_eq!(value["reason"], "prohibited content");
    }

    #[test]
    fn request_record_from_http_captures_enrichment() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", "application/json".parse().unwrap());
        let body = json!({"model": "llama3", "prompt": "hi"}).to_string();

        let record = RequestRecord::from_http(
            "POST",
            "/api/generate",
            "127.0.0.1:9999",
            &headers,
            body.as_bytes(),
        );

        assert_eq!(record.method, "POST");
        assert_eq!(record.path, "/api/generate");
        assert_eq!(record.body, body);
        let info = record.llm_request.unwrap();
        assert_eq!(info.model.as_deref(), Some("llama3"));
    }
}

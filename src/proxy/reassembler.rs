//! Streaming response reassembly
//!
//! Streamed backend responses arrive as newline-delimited JSON chunks. The
//! reassembler rides a side tap on the byte stream: chunks are copied to it
//! while the originals flow to the client untouched, and once the terminal
//! `done: true` object is seen, exactly one reconstructed logical response
//! is recorded to the audit sink. A reassembly failure of any kind is
//! swallowed locally; the client-facing relay never waits on the tap.

use crate::audit::{AuditSink, LlmResponseInfo, ResponseRecord};
use crate::proxy::types::{ApiKind, CorrelationId};
use axum::body::Body;
use bytes::Bytes;
use chrono::Utc;
use futures_util::StreamExt;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Depth of the tap channel; overflow drops copies, never client bytes
const TAP_CHANNEL_CAPACITY: usize = 16;

/// Reassembles one streamed response. One instance per stream; discarded
/// after the terminal chunk has been processed.
pub struct StreamReassembler {
    sink: Arc<dyn AuditSink>,
    correlation_id: CorrelationId,
    kind: ApiKind,
    model: String,
    buffer: Vec<u8>,
    /// Offset of the first byte not yet consumed as a complete line
    scan_from: usize,
    emitted: bool,
}

#[derive(Serialize)]
struct CombinedMessage<'a> {
    content: &'a str,
}

#[derive(Serialize)]
struct CombinedChatResponse<'a> {
    message: CombinedMessage<'a>,
    model: &'a str,
    done: bool,
}

impl StreamReassembler {
    pub fn new(
        sink: Arc<dyn AuditSink>,
        correlation_id: CorrelationId,
        kind: ApiKind,
        model: impl Into<String>,
    ) -> Self {
        Self {
            sink,
            correlation_id,
            kind,
            model: model.into(),
            buffer: Vec::new(),
            scan_from: 0,
            emitted: false,
        }
    }

    /// Feed one raw chunk from the response stream. Chunks need not align
    /// with JSON object boundaries; objects are recovered at newline seams.
    pub fn push(&mut self, chunk: &[u8]) {
        if self.emitted {
            return;
        }

        self.buffer.extend_from_slice(chunk);

        if self.detect_done() {
            self.emitted = true;
            let record = self.reconstruct();
            self.sink.record_response(&self.correlation_id, record);
        }
    }

    /// Whether the accumulated buffer now contains an object whose `done`
    /// field is boolean true. Detection parses each candidate line, so both
    /// `"done":true` and `"done": true` renderings are caught and a `done`
    /// inside a string literal is not.
    fn detect_done(&mut self) -> bool {
        while let Some(rel) = self.buffer[self.scan_from..]
            .iter()
            .position(|b| *b == b'\n')
        {
            let line_end = self.scan_from + rel;
            let done = line_signals_done(&self.buffer[self.scan_from..line_end]);
            self.scan_from = line_end + 1;
            if done {
                return true;
            }
        }

        // The terminal object may arrive without a trailing newline
        line_signals_done(&self.buffer[self.scan_from..])
    }

    /// Build the single logical response record for this stream.
    fn reconstruct(&self) -> ResponseRecord {
        let (body, llm_response) = match self.kind {
            ApiKind::Chat => {
                let content = self.combined_chat_content();
                let combined = CombinedChatResponse {
                    message: CombinedMessage { content: &content },
                    model: &self.model,
                    done: true,
                };
                let body = serde_json::to_string(&combined).unwrap_or_default();
                let info = LlmResponseInfo {
                    model: Some(self.model.clone()),
                    response: Some(content),
                    finished: true,
                    ..LlmResponseInfo::default()
                };
                (body, Some(info))
            }
            // Generate-style and unrecognized streams are logged verbatim
            ApiKind::Generate | ApiKind::Other => (
                String::from_utf8_lossy(&self.buffer).into_owned(),
                None,
            ),
        };

        ResponseRecord {
            timestamp: Utc::now(),
            status: 200,
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body,
            llm_response,
        }
    }

    /// Concatenate `message.content` from every parsed chunk in arrival
    /// order. Unparseable or content-free chunks are skipped.
    fn combined_chat_content(&self) -> String {
        let mut content = String::new();
        for line in self.buffer.split(|b| *b == b'\n') {
            if line.is_empty() {
                continue;
            }
            let Ok(value) = serde_json::from_slice::<Value>(line) else {
                continue;
            };
            if let Some(fragment) = value
                .get("message")
                .and_then(|m| m.get("content"))
                .and_then(Value::as_str)
            {
                content.push_str(fragment);
            }
        }
        content
    }
}

fn line_signals_done(line: &[u8]) -> bool {
    if line.is_empty() {
        return false;
    }
    serde_json::from_slice::<Value>(line)
        .ok()
        .and_then(|value| value.get("done").and_then(Value::as_bool))
        .unwrap_or(false)
}

/// Wrap a backend response body so every chunk is copied to the reassembler
/// while the original bytes flow to the client unchanged and in real time.
pub fn tap_response_body(body: Body, mut reassembler: StreamReassembler) -> Body {
    let (tx, mut rx) = mpsc::channel::<Bytes>(TAP_CHANNEL_CAPACITY);

    tokio::spawn(async move {
        while let Some(chunk) = rx.recv().await {
            reassembler.push(&chunk);
        }
    });

    let stream = body.into_data_stream().map(move |result| {
        if let Ok(chunk) = &result {
            // Best-effort copy; the relay never waits on the tap
            let _ = tx.try_send(chunk.clone());
        }
        result
    });

    Body::from_stream(stream)
}

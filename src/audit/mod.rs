//! Audit logging for intercepted traffic
//!
//! Requests, responses, and admission decisions are recorded as append-only
//! documents. Delivery is best-effort and fire-and-forget: audit writes run
//! off the request path and a failed or absent sink never affects service.

pub mod elastic;
pub mod events;
pub mod sink;

pub use elastic::ElasticDocSink;
pub use events::{
    header_pairs, parse_llm_request, parse_llm_response, AuditEvent, LlmRequestInfo,
    LlmResponseInfo, RequestRecord, ResponseRecord,
};
pub use sink::{AuditSink, NoopAuditSink};

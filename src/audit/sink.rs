//! The audit sink capability
//!
//! Mirrors the recorder seam in the proxy: synchronous, fire-and-forget
//! methods that implementations service in the background. A sink failure
//! degrades to "no logging", never to "no service".

use crate::audit::events::{RequestRecord, ResponseRecord};
use crate::proxy::types::CorrelationId;

/// Where audit records go. Implementations must be safe for concurrent use
/// and must never block the caller on delivery.
pub trait AuditSink: Send + Sync {
    /// Record an observed request and hand back the correlation id that
    /// links its admission and response records to it.
    fn record_request(&self, record: RequestRecord) -> CorrelationId;

    /// Record the logical response for a previously recorded request.
    fn record_response(&self, id: &CorrelationId, record: ResponseRecord);

    /// Record the admission decision for a previously recorded request.
    fn record_admission(&self, id: &CorrelationId, allowed: bool, reason: Option<&str>);
}

/// Sink used when audit logging is disabled. Hands out the unlogged
/// sentinel so downstream record calls become no-ops.
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record_request(&self, _record: RequestRecord) -> CorrelationId {
        CorrelationId::unlogged()
    }

    fn record_response(&self, _id: &CorrelationId, _record: ResponseRecord) {}

    fn record_admission(&self, _id: &CorrelationId, _allowed: bool, _reason: Option<&str>) {}
}

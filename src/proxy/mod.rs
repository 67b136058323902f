//! Proxy module for intercepting inference traffic
//!
//! Requests flow through the interception pipeline: record, gate, forward,
//! and — for streamed responses — reassemble through a side tap while the
//! bytes relay to the client untouched.

pub mod forwarder;
pub mod headers;
pub mod pipeline;
pub mod reassembler;
pub mod service;
pub mod types;


pub use pipeline::InterceptionPipeline;
pub use service::ProxyService;
pub use types::{ApiKind, CorrelationId, ProxyError, ProxyResult};

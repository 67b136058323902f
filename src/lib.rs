//! Gatehouse - an intercepting proxy for local LLM inference servers
//!
//! Gatehouse sits between clients and an Ollama-compatible backend. It
//! relays traffic transparently, records requests, responses, and admission
//! decisions to an audit sink, and gates state-mutating requests through a
//! model-based admission check that fails open when the judge is
//! unavailable.

pub mod admission;
pub mod application;
pub mod audit;
pub mod config;
pub mod error;
pub mod proxy;

pub use application::Application;
pub use error::{Error, Result};

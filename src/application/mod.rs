//! Application layer - orchestration of domain logic.
//!
//! This layer coordinates the domain logic against the backing store and the
//! translator:
//! - Admission controller (per-client rate limiting)
//! - Session context store (bounded conversation history)
//! - Result cache (fingerprint to translation)
//! - Translation gateway (the request flow, with request coalescing)
//!
//! ## Ports
//!
//! The application layer defines ports (traits) that infrastructure
//! adapters must implement. Components only ever see `dyn KeyValueStore`,
//! never a concrete store.

pub mod admission;
pub mod cache;
pub mod circuit_breaker;
pub mod context;
pub mod gateway;
pub mod metrics;
pub mod ports;
pub mod singleflight;

//! Domain layer - pure types and algorithms with no I/O.
//!
//! This layer contains the core concepts of request governance:
//! - Fixed-window admission decisions
//! - Conversation exchanges and context hint rendering
//! - Cache fingerprints over normalized translation inputs
//! - Requests, responses and cache entries
//!
//! All types in this layer are pure and easily testable.

pub mod fingerprint;
pub mod session;
pub mod translation;
pub mod window;

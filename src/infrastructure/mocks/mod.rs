//! Test doubles for the gateway's ports.
//!
//! These let application logic be driven deterministically: a clock that only
//! moves when told to, a translator that counts and fails on demand, a store
//! that can be taken offline, and a layer capturing log output.

pub mod clock;
pub mod flaky_store;
pub mod layer;
pub mod translator;

pub use clock::MockClock;
pub use flaky_store::FlakyStore;
pub use layer::{CapturedEvent, MockCaptureLayer};
pub use translator::MockTranslator;

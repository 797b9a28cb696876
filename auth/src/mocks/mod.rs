//! Mock provider implementations for testing.
//!
//! In-memory implementations of the provider traits and a settable clock
//! for use in unit and integration tests.

pub mod clock;
pub mod resource;

pub use clock::MockClock;
pub use resource::MockResourceStore;

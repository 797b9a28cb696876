//! Storage providers.
//!
//! Traits for the external dependencies of the token lifecycle. Components
//! depend on these traits; the application supplies a concrete store.
//!
//! This enables:
//! - **Testing**: Use mocks (in-memory, deterministic)
//! - **Production**: Use real services (Redis)

pub mod resource;

pub use resource::ResourceStore;

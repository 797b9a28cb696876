//! Storage implementations for auth system.
//!
//! - **Resource Store** (Redis) - Identity resources with their device tokens,
//!   written with compare-and-swap on the resource version

pub mod resource_redis;

// Re-exports
pub use resource_redis::RedisResourceStore;

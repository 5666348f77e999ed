//! Service layer
//!
//! Presence resolution and batch lookups, separated from HTTP handlers.
//! Services orchestrate the record store, cache, and federation.

mod presence;
mod resolver;

pub use presence::PresenceService;
pub use resolver::{CachedPresence, PresenceCache, PresenceResolver, select_authoritative};

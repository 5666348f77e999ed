//! Grid federation module
//!
//! Handles:
//! - User identifiers (bare and federated)
//! - Display-name requests to remote authorities
//! - Concurrent refresh of stale federated names

mod connector;
mod identifier;
mod refresher;

pub use connector::{
    DISPLAY_NAMES_PATH, DisplayNameConnector, DisplayNameSource, encode_request, parse_reply,
};
pub use identifier::{
    UUID_LEN, UniversalIdentifier, canonical_key, is_federated, normalize_authority,
};
pub use refresher::DisplayNameRefresher;

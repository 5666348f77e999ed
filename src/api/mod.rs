//! API layer
//!
//! HTTP handlers for:
//! - Display-name authority endpoint (for other grids)
//! - Operator views over presence rows
//! - Health and metrics (Prometheus)

mod admin;
mod display_names;
pub mod metrics;

pub use admin::{Evicted, OnlineCount, admin_router};
pub use display_names::{display_names_router, render_reply, requested_ids};
pub use metrics::ops_router;

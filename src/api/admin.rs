//! Operator endpoints
//!
//! Views over presence rows for grid operators, plus presence cache
//! eviction.

use axum::{
    Router,
    extract::{Path, Query, State},
    response::Json,
    routing::{delete, get},
};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::data::Record;
use crate::error::AppError;
use crate::federation::canonical_key;

/// Create admin router
///
/// Routes:
/// - GET /admin/users?prefix=... - Raw rows by key prefix
/// - GET /admin/users/online - Count of recently online users
/// - GET /admin/presence/:user_id - Resolved presence for one user
/// - DELETE /admin/presence/:user_id - Forget one user's cached presence
/// - DELETE /admin/cache - Forget all cached presence
pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/users", get(show_users))
        .route("/users/online", get(online_count))
        .route("/presence/:user_id", get(show_presence).delete(forget_presence))
        .route("/cache", delete(clear_cache))
}

#[derive(Debug, Deserialize)]
struct UsersQuery {
    #[serde(default)]
    prefix: String,
}

/// GET /admin/users
///
/// Lists stored rows whose user ID starts with `prefix`. An empty prefix
/// is refused rather than dumping every row.
async fn show_users(
    State(state): State<AppState>,
    Query(query): Query<UsersQuery>,
) -> Result<Json<Vec<Record>>, AppError> {
    let prefix = query.prefix.trim();
    if prefix.is_empty() {
        return Err(AppError::Validation("prefix must not be empty".to_string()));
    }

    let records = state.presence.show_user_records(prefix).await?;
    Ok(Json(records))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OnlineCount {
    pub count: usize,
}

/// GET /admin/users/online
async fn online_count(State(state): State<AppState>) -> Result<Json<OnlineCount>, AppError> {
    let count = state.presence.count_recently_online().await?;
    Ok(Json(OnlineCount { count }))
}

/// GET /admin/presence/:user_id
///
/// Returns the authoritative record as stored fields.
async fn show_presence(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Record>, AppError> {
    let record = state
        .resolver
        .resolve(&user_id)
        .await
        .ok_or(AppError::NotFound)?;
    Ok(Json(record.to_record()))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Evicted {
    pub removed: usize,
}

/// DELETE /admin/presence/:user_id
///
/// The next lookup for this user goes back to the store.
async fn forget_presence(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Json<Evicted> {
    let removed = state.cache.invalidate(canonical_key(&user_id)).await;
    tracing::info!(user_id = %user_id, removed, "Evicted cached presence");
    Json(Evicted {
        removed: usize::from(removed),
    })
}

/// DELETE /admin/cache
async fn clear_cache(State(state): State<AppState>) -> Json<Evicted> {
    let removed = state.cache.clear().await;
    tracing::info!(removed, "Cleared presence cache");
    Json(Evicted { removed })
}

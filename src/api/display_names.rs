//! Display-name authority endpoint
//!
//! - POST /get_display_names
//!
//! Answers other grids asking for the names of users homed here.

use axum::{Router, extract::State, http::header, response::IntoResponse, routing::post};

use crate::AppState;
use crate::federation::{DISPLAY_NAMES_PATH, canonical_key};

/// Create display-name router
pub fn display_names_router() -> Router<AppState> {
    Router::new().route(&format!("/{}", DISPLAY_NAMES_PATH), post(get_display_names))
}

/// Pull `AgentIDs[]` (or `AgentIDs`) values out of a form body
pub fn requested_ids(body: &str) -> Vec<String> {
    url::form_urlencoded::parse(body.as_bytes())
        .filter(|(key, _)| key == "AgentIDs[]" || key == "AgentIDs")
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .collect()
}

/// Render the positional reply for resolved `(uuid, name)` pairs
pub fn render_reply(names: &[(String, String)]) -> String {
    let mut xml = String::from(r#"<?xml version="1.0" encoding="utf-8"?><ServerResponse>"#);
    for (index, (uuid, name)) in names.iter().enumerate() {
        xml.push_str(&format!(
            "<uuid{index}>{}</uuid{index}><name{index}>{}</name{index}>",
            html_escape::encode_text(uuid),
            html_escape::encode_text(name),
        ));
    }
    xml.push_str("<success>true</success></ServerResponse>");
    xml
}

/// POST /get_display_names
///
/// Form body: `AgentIDs[]=<uuid>&AgentIDs[]=<uuid>...`
///
/// Only users with a known, non-empty display name are listed. A body
/// naming no users gets an empty reply.
async fn get_display_names(State(state): State<AppState>, body: String) -> impl IntoResponse {
    let ids = requested_ids(&body);
    if ids.is_empty() {
        tracing::debug!("Display-name request without AgentIDs");
        return ([(header::CONTENT_TYPE, "text/xml")], String::new());
    }

    let mut names = Vec::new();
    for id in &ids {
        match state.resolver.resolve(id).await {
            Some(record) if !record.display_name.is_empty() => {
                names.push((canonical_key(&record.user_id).to_string(), record.display_name));
            }
            _ => tracing::debug!(user_id = %id, "No display name to report"),
        }
    }

    tracing::info!(
        requested = ids.len(),
        answered = names.len(),
        "Served display-name request"
    );

    ([(header::CONTENT_TYPE, "text/xml")], render_reply(&names))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::federation::parse_reply;
    use uuid::Uuid;

    const ADA: &str = "11111111-1111-1111-1111-111111111111";

    #[test]
    fn reads_both_agent_id_spellings() {
        let body = format!("AgentIDs%5B%5D={ADA}&AgentIDs=22222222-2222-2222-2222-222222222222&other=x");
        let ids = requested_ids(&body);
        assert_eq!(ids, vec![ADA.to_string(), "22222222-2222-2222-2222-222222222222".to_string()]);
        assert!(requested_ids("").is_empty());
    }

    #[tokio::test]
    async fn router_serves_names_from_memory_store() {
        use crate::config::{
            AppConfig, CacheConfig, DatabaseConfig, DisplayNameConfig, LoggingConfig, ServerConfig,
        };
        use crate::data::MemoryRecordStore;
        use axum::body::Body;
        use axum::http::{Request, StatusCode};
        use std::sync::Arc;
        use tower::ServiceExt;

        let config = AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            database: DatabaseConfig {
                path: "unused.db".into(),
            },
            cache: CacheConfig::default(),
            display_names: DisplayNameConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        };
        let state = AppState::with_store(config, Arc::new(MemoryRecordStore::new())).unwrap();
        assert!(state.resolver.set_display_name(ADA, "Ada").await);

        let response = crate::build_router(state)
            .oneshot(
                Request::post("/get_display_names")
                    .body(Body::from(format!("AgentIDs[]={ADA}")))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let names = parse_reply(&String::from_utf8(body.to_vec()).unwrap()).unwrap();
        assert_eq!(names[&Uuid::parse_str(ADA).unwrap()], "Ada");
    }

    #[test]
    fn reply_is_readable_by_the_connector() {
        let xml = render_reply(&[(ADA.to_string(), "Ada <The First>".to_string())]);

        let names = parse_reply(&xml).unwrap();
        assert_eq!(names[&Uuid::parse_str(ADA).unwrap()], "Ada <The First>");
    }
}

//! SQLite record store
//!
//! Persists presence rows through SQLx. Each row is keyed by its full
//! user ID and carries its fields as a JSON object, so rows written by
//! older or newer versions keep fields this build does not know about.

use async_trait::async_trait;
use sqlx::{Pool, Sqlite, SqlitePool};
use std::collections::BTreeMap;
use std::path::Path;

use super::models::Record;
use super::store::RecordStore;
use crate::error::AppError;

/// SQLite-backed presence store
pub struct SqliteRecordStore {
    pool: Pool<Sqlite>,
}

/// Escape `LIKE` wildcards so a prefix matches literally
fn like_prefix_pattern(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn decode_row(user_id: String, data: &str) -> Record {
    let data = match serde_json::from_str::<BTreeMap<String, String>>(data) {
        Ok(data) => data,
        Err(error) => {
            tracing::warn!(
                user_id = %user_id,
                %error,
                "Stored presence fields are not valid JSON, treating row as empty"
            );
            BTreeMap::new()
        }
    };

    Record { user_id, data }
}

impl SqliteRecordStore {
    /// Connect to SQLite database
    ///
    /// Creates the database file if it doesn't exist.
    /// Runs pending migrations automatically.
    ///
    /// # Errors
    /// Returns error if connection or migration fails
    pub async fn connect(path: &Path) -> Result<Self, AppError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AppError::Database(sqlx::Error::Io(e)))?;
        }

        let connection_string = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePool::connect(&connection_string).await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| {
                tracing::error!("Migration failed: {}", e);
                AppError::Internal(anyhow::anyhow!("Migration failed: {}", e))
            })?;

        tracing::info!(path = %path.display(), "Presence store connected and migrated");

        Ok(Self { pool })
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn get(&self, user_id: &str) -> Result<Option<Record>, AppError> {
        let row = sqlx::query_as::<_, (String, String)>(
            "SELECT user_id, data FROM grid_users WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(user_id, data)| decode_row(user_id, &data)))
    }

    async fn get_all(&self, prefix: &str) -> Result<Vec<Record>, AppError> {
        let rows = if prefix.is_empty() {
            sqlx::query_as::<_, (String, String)>(
                "SELECT user_id, data FROM grid_users ORDER BY rowid",
            )
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query_as::<_, (String, String)>(
                r#"SELECT user_id, data FROM grid_users WHERE user_id LIKE ? ESCAPE '\' ORDER BY rowid"#,
            )
            .bind(like_prefix_pattern(prefix))
            .fetch_all(&self.pool)
            .await?
        };

        Ok(rows
            .into_iter()
            .map(|(user_id, data)| decode_row(user_id, &data))
            .collect())
    }

    async fn store(&self, record: &Record) -> Result<bool, AppError> {
        let data = serde_json::to_string(&record.data)?;

        let result = sqlx::query(
            r#"
            INSERT INTO grid_users (user_id, data)
            VALUES (?, ?)
            ON CONFLICT(user_id) DO UPDATE SET data = excluded.data
            "#,
        )
        .bind(&record.user_id)
        .bind(data)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

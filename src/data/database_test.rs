//! SQLite record store tests

use super::*;
use tempfile::TempDir;

const USER: &str = "11111111-1111-1111-1111-111111111111";

/// Helper to create a test database
async fn create_test_db() -> (SqliteRecordStore, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let db = SqliteRecordStore::connect(&db_path).await.unwrap();
    (db, temp_dir)
}

#[tokio::test]
async fn test_database_connection() {
    let (db, _temp_dir) = create_test_db().await;
    assert!(db.get_all("").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_store_and_get() {
    let (db, _temp_dir) = create_test_db().await;

    let record = Record::new(USER)
        .with(FIELD_ONLINE, "True")
        .with(FIELD_LOGIN, "100")
        .with(FIELD_DISPLAY_NAME, "Ada");

    assert!(db.store(&record).await.unwrap());

    let retrieved = db.get(USER).await.unwrap();
    assert_eq!(retrieved, Some(record));
    assert!(db.get("22222222-2222-2222-2222-222222222222").await.unwrap().is_none());
}

#[tokio::test]
async fn test_store_overwrites_existing_row() {
    let (db, _temp_dir) = create_test_db().await;

    db.store(&Record::new(USER).with(FIELD_ONLINE, "True"))
        .await
        .unwrap();
    db.store(&Record::new(USER).with(FIELD_ONLINE, "False"))
        .await
        .unwrap();

    let rows = db.get_all(USER).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].field(FIELD_ONLINE), Some("False"));
}

#[tokio::test]
async fn test_get_all_by_prefix_keeps_insertion_order() {
    let (db, _temp_dir) = create_test_db().await;
    let federated = format!("{USER}@grid.example.org;First;Last");

    db.store(&Record::new(USER)).await.unwrap();
    db.store(&Record::new("22222222-2222-2222-2222-222222222222"))
        .await
        .unwrap();
    db.store(&Record::new(federated.clone())).await.unwrap();

    let rows = db.get_all(USER).await.unwrap();
    let ids: Vec<_> = rows.iter().map(|r| r.user_id.as_str()).collect();
    assert_eq!(ids, vec![USER, federated.as_str()]);

    assert_eq!(db.get_all("").await.unwrap().len(), 3);
    assert!(db.get_all("3333").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_prefix_wildcards_match_literally() {
    let (db, _temp_dir) = create_test_db().await;

    db.store(&Record::new("abc-user")).await.unwrap();

    assert!(db.get_all("a_c").await.unwrap().is_empty());
    assert!(db.get_all("%").await.unwrap().is_empty());
    assert_eq!(db.get_all("abc").await.unwrap().len(), 1);
}

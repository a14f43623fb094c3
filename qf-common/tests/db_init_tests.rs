//! Tests for on-disk database initialization

use qf_common::db::init_database;

#[tokio::test]
async fn test_database_creation_when_missing() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("nested").join("questionflow.db");
    assert!(!db_path.exists());

    let result = init_database(&db_path).await;
    assert!(result.is_ok(), "Database initialization failed: {:?}", result.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_database_opens_existing() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("questionflow.db");

    let pool1 = init_database(&db_path).await.expect("first open");
    sqlx::query(
        "INSERT INTO sessions (id, title, is_active, auto_merge_doubts, created_at) VALUES ('s1', 'Algebra', 1, 1, 0)",
    )
    .execute(&pool1)
    .await
    .unwrap();
    pool1.close().await;

    let pool2 = init_database(&db_path).await.expect("reopen existing database");
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sessions")
        .fetch_one(&pool2)
        .await
        .unwrap();
    assert_eq!(count, 1, "existing rows must survive reinitialization");
}

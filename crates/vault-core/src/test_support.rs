//! Shared fixtures for unit tests

use chrono::Utc;

use crate::storage::{Database, DEFAULT_QUERY_TIMEOUT};

pub async fn test_db() -> Database {
    Database::open_in_memory(DEFAULT_QUERY_TIMEOUT).await.unwrap()
}

/// Insert a bare user row and return its id
pub async fn create_user(db: &Database, email: &str) -> i64 {
    let email = email.to_string();
    db.call(move |conn| {
        conn.query_row(
            "INSERT INTO users (created_at, name, email, password_hash) \
             VALUES (?1, 'Test User', ?2, 'unused') RETURNING id",
            rusqlite::params![Utc::now(), email],
            |row| row.get(0),
        )
    })
    .await
    .unwrap()
}

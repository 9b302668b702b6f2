use super::schema::Database;
use super::types::{DatabaseError, User};

impl Database {
    /// Return the user named `name`, creating it on first use.
    pub async fn ensure_user(&self, name: &str) -> Result<User, DatabaseError> {
        let now = chrono::Utc::now().timestamp_micros();
        // The no-op update makes RETURNING yield the existing row on conflict.
        let user: User = sqlx::query_as(
            r#"
            INSERT INTO users (name, created_at) VALUES (?, ?)
            ON CONFLICT(name) DO UPDATE SET name = excluded.name
            RETURNING id, name, created_at
        "#,
        )
        .bind(name)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    pub async fn get_user_by_name(&self, name: &str) -> Result<User, DatabaseError> {
        sqlx::query_as("SELECT id, name, created_at FROM users WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("user `{name}`")))
    }
}

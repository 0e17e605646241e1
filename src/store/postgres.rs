use super::{filters_to_object, DataStore, Filter};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;

/// PostgreSQL-backed store. Every record is one JSONB document in the
/// `records` table; equality filters become `@>` containment on top-level
/// keys, which the GIN index serves. No store-level transactions are
/// exposed — the contract is the same as the in-memory store's.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DataStore for PostgresStore {
    async fn insert(&self, collection: &str, record: Value) -> Result<Value> {
        let row: (Value,) = sqlx::query_as(
            r#"
            INSERT INTO records (collection, data)
            VALUES ($1, $2)
            RETURNING data
            "#,
        )
        .bind(collection)
        .bind(&record)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row.0)
    }

    async fn select(&self, collection: &str, filters: &[Filter]) -> Result<Vec<Value>> {
        let rows: Vec<(Value,)> = sqlx::query_as(
            r#"
            SELECT data
            FROM records
            WHERE collection = $1 AND data @> $2
            ORDER BY id
            "#,
        )
        .bind(collection)
        .bind(filters_to_object(filters))
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows.into_iter().map(|(data,)| data).collect())
    }

    async fn update(&self, collection: &str, filters: &[Filter], patch: Value) -> Result<u64> {
        if !patch.is_object() {
            return Err(AppError::InvalidInput(
                "patch must be a JSON object".to_string(),
            ));
        }
        let result = sqlx::query(
            r#"
            UPDATE records
            SET data = data || $3
            WHERE collection = $1 AND data @> $2
            "#,
        )
        .bind(collection)
        .bind(filters_to_object(filters))
        .bind(patch)
        .execute(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected())
    }

    async fn delete(&self, collection: &str, filters: &[Filter]) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM records
            WHERE collection = $1 AND data @> $2
            "#,
        )
        .bind(collection)
        .bind(filters_to_object(filters))
        .execute(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected())
    }
}

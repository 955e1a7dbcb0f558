//! Postgres-backed session store
//!
//! Stores each record as a JSONB document with the version in its own
//! column so compare-and-swap is one version-guarded UPDATE. Schema is
//! bootstrapped lazily on first use.

use super::SessionStore;
use crate::error::OrchestrationError;
use crate::models::SessionRecord;
use crate::Result;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tokio::sync::OnceCell;

pub struct PgSessionStore {
    pool: PgPool,
    schema_ready: Arc<OnceCell<()>>,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            schema_ready: Arc::new(OnceCell::new()),
        }
    }

    /// Lazy pool from `POSTGRES_URL`/`DATABASE_URL`; `None` when neither is
    /// set so callers can fall back to the in-memory store.
    pub fn from_env() -> Option<Self> {
        let url = std::env::var("POSTGRES_URL")
            .or_else(|_| std::env::var("DATABASE_URL"))
            .ok()?;

        match sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(&url)
        {
            Ok(pool) => Some(Self::new(pool)),
            Err(error) => {
                tracing::warn!("Failed to initialize postgres session store: {}", error);
                None
            }
        }
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.schema_ready
            .get_or_try_init(|| async {
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS loan_sessions (
                      session_id TEXT PRIMARY KEY,
                      version BIGINT NOT NULL,
                      record JSONB NOT NULL,
                      updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                    );
                    "#,
                )
                .execute(&self.pool)
                .await?;

                Ok::<(), sqlx::Error>(())
            })
            .await
            .map_err(|e| {
                OrchestrationError::DatabaseError(format!(
                    "Failed to initialize session schema: {}",
                    e
                ))
            })?;

        Ok(())
    }

    fn decode(record: serde_json::Value) -> Result<SessionRecord> {
        serde_json::from_value(record).map_err(OrchestrationError::from)
    }
}

#[async_trait::async_trait]
impl SessionStore for PgSessionStore {
    async fn get(&self, session_id: &str) -> Result<SessionRecord> {
        self.ensure_schema().await?;

        let row = sqlx::query("SELECT record FROM loan_sessions WHERE session_id = $1")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                OrchestrationError::DatabaseError(format!("Failed to load session: {}", e))
            })?;

        match row {
            Some(row) => {
                let record: serde_json::Value = row.try_get("record").map_err(|e| {
                    OrchestrationError::DatabaseError(format!("Malformed session row: {}", e))
                })?;
                Self::decode(record)
            }
            None => Err(OrchestrationError::SessionNotFound(session_id.to_string())),
        }
    }

    async fn create(&self, session_id: &str) -> Result<SessionRecord> {
        self.ensure_schema().await?;

        let record = SessionRecord::new(session_id.to_string());
        let payload = serde_json::to_value(&record)?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO loan_sessions (session_id, version, record)
            VALUES ($1, $2, $3)
            ON CONFLICT (session_id) DO NOTHING
            "#,
        )
        .bind(session_id)
        .bind(record.version as i64)
        .bind(&payload)
        .execute(&self.pool)
        .await
        .map_err(|e| OrchestrationError::DatabaseError(format!("Failed to create session: {}", e)))?;

        if inserted.rows_affected() == 0 {
            return Err(OrchestrationError::SessionAlreadyExists(
                session_id.to_string(),
            ));
        }
        Ok(record)
    }

    async fn compare_and_swap(
        &self,
        session_id: &str,
        expected_version: u64,
        mut updated: SessionRecord,
    ) -> Result<SessionRecord> {
        self.ensure_schema().await?;

        updated.version = expected_version + 1;
        updated.updated_at = chrono::Utc::now();
        let payload = serde_json::to_value(&updated)?;

        let result = sqlx::query(
            r#"
            UPDATE loan_sessions
            SET version = $1, record = $2, updated_at = NOW()
            WHERE session_id = $3 AND version = $4
            "#,
        )
        .bind(updated.version as i64)
        .bind(&payload)
        .bind(session_id)
        .bind(expected_version as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| OrchestrationError::DatabaseError(format!("Failed to commit session: {}", e)))?;

        if result.rows_affected() == 0 {
            // Distinguish a missing row from a stale version
            let row = sqlx::query("SELECT version FROM loan_sessions WHERE session_id = $1")
                .bind(session_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    OrchestrationError::DatabaseError(format!(
                        "Failed to inspect session version: {}",
                        e
                    ))
                })?;

            return match row {
                Some(row) => {
                    let actual: i64 = row.try_get("version").unwrap_or(-1);
                    Err(OrchestrationError::VersionConflict {
                        session_id: session_id.to_string(),
                        expected: expected_version,
                        actual: actual.max(0) as u64,
                    })
                }
                None => Err(OrchestrationError::SessionNotFound(session_id.to_string())),
            };
        }

        Ok(updated)
    }
}

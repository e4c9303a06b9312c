use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::info;

use super::{PlanRunState, RunStore};
use crate::error::StoreError;

/// Run store backed by a SQLite table, so paused runs outlive the process.
pub struct SqliteRunStore {
    pool: SqlitePool,
    ttl: Option<Duration>,
}

impl SqliteRunStore {
    /// Opens (creating if needed) the database at `url` and ensures the table exists.
    pub async fn connect(url: &str, ttl: Option<Duration>) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        info!("Run store opened at {}", url);
        Self::with_pool(pool, ttl).await
    }

    /// A private in-memory database. One pinned connection, so the data stays put.
    pub async fn in_memory(ttl: Option<Duration>) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::with_pool(pool, ttl).await
    }

    pub async fn with_pool(pool: SqlitePool, ttl: Option<Duration>) -> Result<Self, StoreError> {
        let store = Self { pool, ttl };
        store.ensure_table().await?;
        Ok(store)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn ensure_table(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS plan_runs (
                run_id     TEXT PRIMARY KEY,
                tool       TEXT NOT NULL,
                step_index INTEGER NOT NULL,
                context    TEXT NOT NULL,
                leased     INTEGER NOT NULL DEFAULT 0,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Rows touched at or before this second are expired.
    fn cutoff(&self, now: i64) -> i64 {
        match self.ttl {
            Some(ttl) => now - i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX),
            None => i64::MIN,
        }
    }
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[async_trait]
impl RunStore for SqliteRunStore {
    async fn save(&self, state: &PlanRunState) -> Result<(), StoreError> {
        let context = serde_json::to_string(&state.context)?;
        sqlx::query(
            "INSERT INTO plan_runs (run_id, tool, step_index, context, leased, updated_at)
             VALUES (?1, ?2, ?3, ?4, 0, ?5)
             ON CONFLICT(run_id) DO UPDATE SET
                tool = excluded.tool,
                step_index = excluded.step_index,
                context = excluded.context,
                leased = 0,
                updated_at = excluded.updated_at",
        )
        .bind(&state.run_id)
        .bind(&state.tool)
        .bind(state.step_index as i64)
        .bind(context)
        .bind(now_secs())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn claim(&self, run_id: &str, tool: &str) -> Result<PlanRunState, StoreError> {
        let now = now_secs();
        let cutoff = self.cutoff(now);

        // The lease is taken in the same statement that reads the row.
        let claimed: Option<(i64, String)> = sqlx::query_as(
            "UPDATE plan_runs SET leased = 1, updated_at = ?1
             WHERE run_id = ?2 AND tool = ?3 AND leased = 0 AND updated_at > ?4
             RETURNING step_index, context",
        )
        .bind(now)
        .bind(run_id)
        .bind(tool)
        .bind(cutoff)
        .fetch_optional(&self.pool)
        .await?;

        if let Some((step_index, context)) = claimed {
            return Ok(PlanRunState {
                run_id: run_id.to_string(),
                tool: tool.to_string(),
                step_index: step_index.max(0) as usize,
                context: serde_json::from_str(&context)?,
            });
        }

        let busy: Option<(i64,)> = sqlx::query_as(
            "SELECT leased FROM plan_runs
             WHERE run_id = ?1 AND tool = ?2 AND leased = 1 AND updated_at > ?3",
        )
        .bind(run_id)
        .bind(tool)
        .bind(cutoff)
        .fetch_optional(&self.pool)
        .await?;

        match busy {
            Some(_) => Err(StoreError::Busy(run_id.to_string())),
            None => Err(StoreError::Unknown(run_id.to_string())),
        }
    }

    async fn release(&self, run_id: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE plan_runs SET leased = 0 WHERE run_id = ?1")
            .bind(run_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn discard(&self, run_id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM plan_runs WHERE run_id = ?1")
            .bind(run_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn purge_expired(&self) -> Result<usize, StoreError> {
        if self.ttl.is_none() {
            return Ok(0);
        }
        let result = sqlx::query("DELETE FROM plan_runs WHERE updated_at <= ?1")
            .bind(self.cutoff(now_secs()))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }
}

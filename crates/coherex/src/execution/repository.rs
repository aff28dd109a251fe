//! Execution audit repository.
//!
//! Records move pending -> running -> completed|failed. Every record is
//! finalized by its request handler on all paths, so nothing is left
//! pending or running after a request completes.

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::models::{ExecutionRecord, ExecutionStatus};

const SELECT_COLUMNS: &str = r#"
    SELECT id, agent_id, session_id, input, output, status, simulated,
           started_at, completed_at, duration_ms, logs
    FROM executions
"#;

/// Repository for the execution audit trail.
#[derive(Debug, Clone)]
pub struct ExecutionRepository {
    pool: SqlitePool,
}

impl ExecutionRepository {
    /// Create a new repository.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a new pending record for an invocation.
    pub async fn begin(
        &self,
        agent_id: &str,
        session_id: Option<&str>,
        input: &str,
    ) -> Result<ExecutionRecord> {
        let record = ExecutionRecord {
            id: Uuid::new_v4().to_string(),
            agent_id: agent_id.to_string(),
            session_id: session_id.map(str::to_string),
            input: input.to_string(),
            output: None,
            status: ExecutionStatus::Pending,
            simulated: false,
            started_at: Utc::now().to_rfc3339(),
            completed_at: None,
            duration_ms: None,
            logs: Vec::new(),
        };

        sqlx::query(
            r#"
            INSERT INTO executions (id, agent_id, session_id, input, status, simulated, started_at, logs)
            VALUES (?, ?, ?, ?, ?, 0, ?, '[]')
            "#,
        )
        .bind(&record.id)
        .bind(&record.agent_id)
        .bind(&record.session_id)
        .bind(&record.input)
        .bind(record.status.to_string())
        .bind(&record.started_at)
        .execute(&self.pool)
        .await
        .context("creating execution record")?;

        Ok(record)
    }

    /// Mark a record as running.
    pub async fn mark_running(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE executions SET status = 'running' WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("marking execution running")?;

        Ok(())
    }

    /// Finalize a record as completed.
    pub async fn mark_completed(
        &self,
        id: &str,
        output: &str,
        simulated: bool,
        duration_ms: i64,
        logs: &[String],
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE executions
            SET status = 'completed', output = ?, simulated = ?,
                completed_at = ?, duration_ms = ?, logs = ?
            WHERE id = ?
            "#,
        )
        .bind(output)
        .bind(simulated)
        .bind(Utc::now().to_rfc3339())
        .bind(duration_ms)
        .bind(serde_json::to_string(logs).context("serializing execution logs")?)
        .bind(id)
        .execute(&self.pool)
        .await
        .context("marking execution completed")?;

        Ok(())
    }

    /// Finalize a record as failed, capturing the error into the logs.
    pub async fn mark_failed(
        &self,
        id: &str,
        error: &str,
        duration_ms: Option<i64>,
        logs: &[String],
    ) -> Result<()> {
        let mut logs = logs.to_vec();
        logs.push(format!("error: {}", error));

        sqlx::query(
            r#"
            UPDATE executions
            SET status = 'failed', completed_at = ?, duration_ms = ?, logs = ?
            WHERE id = ?
            "#,
        )
        .bind(Utc::now().to_rfc3339())
        .bind(duration_ms)
        .bind(serde_json::to_string(&logs).context("serializing execution logs")?)
        .bind(id)
        .execute(&self.pool)
        .await
        .context("marking execution failed")?;

        Ok(())
    }

    /// Get a record by ID.
    pub async fn get(&self, id: &str) -> Result<Option<ExecutionRecord>> {
        let record =
            sqlx::query_as::<_, ExecutionRecord>(&format!("{} WHERE id = ?", SELECT_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .context("fetching execution record")?;

        Ok(record)
    }

    /// List records for an agent, newest first.
    pub async fn list_by_agent(&self, agent_id: &str) -> Result<Vec<ExecutionRecord>> {
        let records = sqlx::query_as::<_, ExecutionRecord>(&format!(
            "{} WHERE agent_id = ? ORDER BY started_at DESC",
            SELECT_COLUMNS
        ))
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await
        .context("listing executions by agent")?;

        Ok(records)
    }

    /// List records for a session, newest first.
    pub async fn list_by_session(&self, session_id: &str) -> Result<Vec<ExecutionRecord>> {
        let records = sqlx::query_as::<_, ExecutionRecord>(&format!(
            "{} WHERE session_id = ? ORDER BY started_at DESC",
            SELECT_COLUMNS
        ))
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .context("listing executions by session")?;

        Ok(records)
    }
}

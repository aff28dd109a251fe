//! Session database repository.
//!
//! Status transitions are compare-and-swap updates keyed on the expected
//! prior status; callers check the returned flag so that two concurrent
//! transitions on the same row cannot both succeed.

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;

use super::models::{Session, SessionStatus, Turn, TurnRole};

/// Repository for session persistence.
#[derive(Debug, Clone)]
pub struct SessionRepository {
    pool: SqlitePool,
}

impl SessionRepository {
    /// Create a new repository.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Persist a new session.
    pub async fn create(&self, session: &Session) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions (id, agent_id, sandbox_ref, status, created_at, last_activity_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&session.id)
        .bind(&session.agent_id)
        .bind(&session.sandbox_ref)
        .bind(session.status.to_string())
        .bind(&session.created_at)
        .bind(&session.last_activity_at)
        .execute(&self.pool)
        .await
        .context("creating session")?;

        Ok(())
    }

    /// Get a session by ID.
    pub async fn get(&self, id: &str) -> Result<Option<Session>> {
        let session = sqlx::query_as::<_, Session>(
            r#"
            SELECT id, agent_id, sandbox_ref, status, created_at, last_activity_at
            FROM sessions
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("fetching session")?;

        Ok(session)
    }

    /// Newest non-stopped session for an agent, if any.
    pub async fn find_live_by_agent(&self, agent_id: &str) -> Result<Option<Session>> {
        let session = sqlx::query_as::<_, Session>(
            r#"
            SELECT id, agent_id, sandbox_ref, status, created_at, last_activity_at
            FROM sessions
            WHERE agent_id = ? AND status != 'stopped'
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(agent_id)
        .fetch_optional(&self.pool)
        .await
        .context("fetching live session for agent")?;

        Ok(session)
    }

    /// List sessions, optionally filtered by agent.
    pub async fn list(&self, agent_id: Option<&str>) -> Result<Vec<Session>> {
        let sessions = match agent_id {
            Some(agent_id) => {
                sqlx::query_as::<_, Session>(
                    r#"
                    SELECT id, agent_id, sandbox_ref, status, created_at, last_activity_at
                    FROM sessions
                    WHERE agent_id = ?
                    ORDER BY created_at DESC
                    "#,
                )
                .bind(agent_id)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, Session>(
                    r#"
                    SELECT id, agent_id, sandbox_ref, status, created_at, last_activity_at
                    FROM sessions
                    ORDER BY created_at DESC
                    "#,
                )
                .fetch_all(&self.pool)
                .await
            }
        }
        .context("listing sessions")?;

        Ok(sessions)
    }

    /// Hibernate a live session: active|idle -> hibernated, sandbox ref
    /// cleared. Returns false if the session was not live.
    pub async fn mark_hibernated(&self, id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET status = 'hibernated', sandbox_ref = NULL
            WHERE id = ? AND status IN ('active', 'idle')
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .context("marking session hibernated")?;

        Ok(result.rows_affected() > 0)
    }

    /// Resume a hibernated session with a fresh sandbox handle. Returns
    /// false if the session was not hibernated.
    pub async fn mark_resumed(&self, id: &str, sandbox_ref: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET status = 'active', sandbox_ref = ?
            WHERE id = ? AND status = 'hibernated'
            "#,
        )
        .bind(sandbox_ref)
        .bind(id)
        .execute(&self.pool)
        .await
        .context("marking session resumed")?;

        Ok(result.rows_affected() > 0)
    }

    /// Stop a session from any non-stopped state. Returns false if it was
    /// already stopped.
    pub async fn mark_stopped(&self, id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET status = 'stopped', sandbox_ref = NULL
            WHERE id = ? AND status != 'stopped'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .context("marking session stopped")?;

        Ok(result.rows_affected() > 0)
    }

    /// Demote an active session to idle. Returns false unless it was active.
    pub async fn mark_idle(&self, id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET status = 'idle'
            WHERE id = ? AND status = 'active'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .context("marking session idle")?;

        Ok(result.rows_affected() > 0)
    }

    /// Update the activity marker and promote idle back to active.
    pub async fn touch_activity(&self, id: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE sessions
            SET last_activity_at = ?,
                status = CASE WHEN status = 'idle' THEN 'active' ELSE status END
            WHERE id = ?
            "#,
        )
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await
        .context("touching session activity")?;

        Ok(())
    }

    /// Live sessions whose last activity is older than the given cutoff.
    pub async fn list_live_inactive_since(
        &self,
        status: SessionStatus,
        cutoff: &str,
    ) -> Result<Vec<Session>> {
        let sessions = sqlx::query_as::<_, Session>(
            r#"
            SELECT id, agent_id, sandbox_ref, status, created_at, last_activity_at
            FROM sessions
            WHERE status = ? AND last_activity_at < ?
            "#,
        )
        .bind(status.to_string())
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .context("listing inactive sessions")?;

        Ok(sessions)
    }

    /// Append a user/assistant turn pair in one transaction, preserving
    /// append order.
    pub async fn append_turn_pair(
        &self,
        session_id: &str,
        input: &str,
        output: &str,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.context("starting turn append")?;

        let next_seq: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(seq), 0) + 1 FROM conversation_turns WHERE session_id = ?",
        )
        .bind(session_id)
        .fetch_one(&mut *tx)
        .await
        .context("fetching next turn seq")?;

        let now = Utc::now().to_rfc3339();
        for (offset, (role, content)) in [(TurnRole::User, input), (TurnRole::Assistant, output)]
            .into_iter()
            .enumerate()
        {
            sqlx::query(
                r#"
                INSERT INTO conversation_turns (session_id, seq, role, content, created_at)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(session_id)
            .bind(next_seq + offset as i64)
            .bind(role.to_string())
            .bind(content)
            .bind(&now)
            .execute(&mut *tx)
            .await
            .context("appending conversation turn")?;
        }

        tx.commit().await.context("committing turn append")?;
        Ok(())
    }

    /// Full conversation log for a session, in append order.
    pub async fn list_turns(&self, session_id: &str) -> Result<Vec<Turn>> {
        let turns = sqlx::query_as::<_, Turn>(
            r#"
            SELECT session_id, seq, role, content, created_at
            FROM conversation_turns
            WHERE session_id = ?
            ORDER BY seq ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .context("listing conversation turns")?;

        Ok(turns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn session(id: &str, agent_id: &str, status: SessionStatus) -> Session {
        let now = Utc::now().to_rfc3339();
        Session {
            id: id.to_string(),
            agent_id: agent_id.to_string(),
            sandbox_ref: status.holds_sandbox().then(|| format!("sb-{}", id)),
            status,
            created_at: now.clone(),
            last_activity_at: now,
        }
    }

    async fn repo() -> SessionRepository {
        let db = Database::in_memory().await.unwrap();
        SessionRepository::new(db.pool().clone())
    }

    #[tokio::test]
    async fn test_cas_hibernate_requires_live_status() {
        let repo = repo().await;
        repo.create(&session("s1", "a1", SessionStatus::Active))
            .await
            .unwrap();

        assert!(repo.mark_hibernated("s1").await.unwrap());
        // Second hibernate hits a hibernated row: zero rows affected.
        assert!(!repo.mark_hibernated("s1").await.unwrap());

        let stored = repo.get("s1").await.unwrap().unwrap();
        assert_eq!(stored.status, SessionStatus::Hibernated);
        assert!(stored.sandbox_ref.is_none());
    }

    #[tokio::test]
    async fn test_cas_resume_requires_hibernated() {
        let repo = repo().await;
        repo.create(&session("s1", "a1", SessionStatus::Active))
            .await
            .unwrap();

        assert!(!repo.mark_resumed("s1", "sb-new").await.unwrap());
        repo.mark_hibernated("s1").await.unwrap();
        assert!(repo.mark_resumed("s1", "sb-new").await.unwrap());

        let stored = repo.get("s1").await.unwrap().unwrap();
        assert_eq!(stored.status, SessionStatus::Active);
        assert_eq!(stored.sandbox_ref.as_deref(), Some("sb-new"));
    }

    #[tokio::test]
    async fn test_stop_from_any_state_clears_ref() {
        let repo = repo().await;
        repo.create(&session("s1", "a1", SessionStatus::Idle))
            .await
            .unwrap();

        assert!(repo.mark_stopped("s1").await.unwrap());
        assert!(!repo.mark_stopped("s1").await.unwrap());

        let stored = repo.get("s1").await.unwrap().unwrap();
        assert_eq!(stored.status, SessionStatus::Stopped);
        assert!(stored.sandbox_ref.is_none());
    }

    #[tokio::test]
    async fn test_find_live_skips_stopped() {
        let repo = repo().await;
        repo.create(&session("s1", "a1", SessionStatus::Stopped))
            .await
            .unwrap();
        assert!(repo.find_live_by_agent("a1").await.unwrap().is_none());

        repo.create(&session("s2", "a1", SessionStatus::Hibernated))
            .await
            .unwrap();
        let live = repo.find_live_by_agent("a1").await.unwrap().unwrap();
        assert_eq!(live.id, "s2");
    }

    #[tokio::test]
    async fn test_turn_pairs_append_in_order() {
        let repo = repo().await;
        repo.create(&session("s1", "a1", SessionStatus::Active))
            .await
            .unwrap();

        repo.append_turn_pair("s1", "hi", "hello").await.unwrap();
        repo.append_turn_pair("s1", "how are you", "fine").await.unwrap();

        let turns = repo.list_turns("s1").await.unwrap();
        assert_eq!(turns.len(), 4);
        assert_eq!(
            turns.iter().map(|t| t.seq).collect::<Vec<_>>(),
            vec![1, 2, 3, 4]
        );
        assert_eq!(turns[0].role, TurnRole::User);
        assert_eq!(turns[0].content, "hi");
        assert_eq!(turns[3].role, TurnRole::Assistant);
        assert_eq!(turns[3].content, "fine");
    }

    #[tokio::test]
    async fn test_touch_activity_promotes_idle() {
        let repo = repo().await;
        repo.create(&session("s1", "a1", SessionStatus::Idle))
            .await
            .unwrap();

        repo.touch_activity("s1").await.unwrap();
        let stored = repo.get("s1").await.unwrap().unwrap();
        assert_eq!(stored.status, SessionStatus::Active);
    }
}

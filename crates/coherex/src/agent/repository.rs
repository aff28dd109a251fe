//! Agent database repository.

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::models::{AgentConfig, AgentStatus, CreateAgentRequest};

/// Repository for agent configuration.
#[derive(Debug, Clone)]
pub struct AgentRepository {
    pool: SqlitePool,
}

impl AgentRepository {
    /// Create a new repository.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Register a new agent.
    pub async fn create(&self, request: CreateAgentRequest) -> Result<AgentConfig> {
        let agent = AgentConfig {
            id: Uuid::new_v4().to_string(),
            name: request.name,
            execution_mode: request.execution_mode,
            status: request.status.unwrap_or(AgentStatus::Draft),
            model: request.model,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            system_prompt: request.system_prompt,
            created_at: Utc::now().to_rfc3339(),
        };

        sqlx::query(
            r#"
            INSERT INTO agents (
                id, name, execution_mode, status, model,
                temperature, max_tokens, system_prompt, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&agent.id)
        .bind(&agent.name)
        .bind(agent.execution_mode.to_string())
        .bind(agent.status.to_string())
        .bind(&agent.model)
        .bind(agent.temperature)
        .bind(agent.max_tokens)
        .bind(&agent.system_prompt)
        .bind(&agent.created_at)
        .execute(&self.pool)
        .await
        .context("creating agent")?;

        Ok(agent)
    }

    /// Get an agent by ID.
    pub async fn get(&self, id: &str) -> Result<Option<AgentConfig>> {
        let agent = sqlx::query_as::<_, AgentConfig>(
            r#"
            SELECT id, name, execution_mode, status, model,
                   temperature, max_tokens, system_prompt, created_at
            FROM agents
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("fetching agent")?;

        Ok(agent)
    }

    /// List all agents.
    pub async fn list(&self) -> Result<Vec<AgentConfig>> {
        let agents = sqlx::query_as::<_, AgentConfig>(
            r#"
            SELECT id, name, execution_mode, status, model,
                   temperature, max_tokens, system_prompt, created_at
            FROM agents
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("listing agents")?;

        Ok(agents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::ExecutionMode;
    use crate::db::Database;

    fn request(mode: ExecutionMode) -> CreateAgentRequest {
        CreateAgentRequest {
            name: "researcher".to_string(),
            execution_mode: mode,
            status: Some(AgentStatus::Active),
            model: "claude-sonnet".to_string(),
            temperature: Some(0.2),
            max_tokens: Some(4096),
            system_prompt: Some("You are a research assistant.".to_string()),
        }
    }

    #[tokio::test]
    async fn test_create_and_get_roundtrip() {
        let db = Database::in_memory().await.unwrap();
        let repo = AgentRepository::new(db.pool().clone());

        let created = repo.create(request(ExecutionMode::Persistent)).await.unwrap();
        let fetched = repo.get(&created.id).await.unwrap().unwrap();

        assert_eq!(fetched.name, "researcher");
        assert_eq!(fetched.execution_mode, ExecutionMode::Persistent);
        assert_eq!(fetched.status, AgentStatus::Active);
        assert_eq!(fetched.max_tokens, Some(4096));
    }

    #[tokio::test]
    async fn test_get_unknown_returns_none() {
        let db = Database::in_memory().await.unwrap();
        let repo = AgentRepository::new(db.pool().clone());

        assert!(repo.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_archived_agent_not_executable() {
        let db = Database::in_memory().await.unwrap();
        let repo = AgentRepository::new(db.pool().clone());

        let mut req = request(ExecutionMode::Ephemeral);
        req.status = Some(AgentStatus::Archived);
        let agent = repo.create(req).await.unwrap();

        assert!(!agent.is_executable());
    }
}

//! AgentManager — CRUD, seeding, and usage statistics over the agent tables.
//!
//! Builtin immutability is enforced here at the point of mutation via
//! `assert_mutable`, not just at creation. Counter updates run as single SQL
//! statements so concurrent analyses cannot lose updates.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::{FromRow, SqlitePool};
use tracing::info;

use crate::errors::AppError;
use crate::llm_client::ChatClient;
use crate::models::agent::{AgentRow, AgentStatistics, AgentType, AgentUsageRow};

use super::agent::{AnalysisContext, AnalysisOutcome, CustomizableAgent};
use super::prompts::BUILTIN_AGENTS;
use super::template::validate_template;

/// Payload for creating a custom agent. Fields are optional at the type
/// level so the manager can report exactly which required field is missing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewAgent {
    pub name: Option<String>,
    pub description: Option<String>,
    pub agent_type: Option<String>,
    pub prompt_template: Option<String>,
}

/// Partial update for a custom agent; absent fields keep their value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub agent_type: Option<String>,
    pub prompt_template: Option<String>,
}

/// Visibility filter for catalog listings.
#[derive(Debug, Clone, Copy)]
pub struct AgentFilter {
    pub include_builtin: bool,
    pub include_custom: bool,
    pub agent_type: Option<AgentType>,
}

impl Default for AgentFilter {
    fn default() -> Self {
        Self {
            include_builtin: true,
            include_custom: true,
            agent_type: None,
        }
    }
}

/// Fields of one usage record at creation time. Rating and feedback are
/// filled in later through `rate_usage`.
#[derive(Debug, Clone)]
pub struct NewUsageRecord {
    pub agent_id: i64,
    pub analysis_id: i64,
    pub execution_time: f64,
    pub success: bool,
    pub error_message: String,
}

#[derive(Clone)]
pub struct AgentManager {
    pool: SqlitePool,
    client: Arc<dyn ChatClient>,
}

impl AgentManager {
    pub fn new(pool: SqlitePool, client: Arc<dyn ChatClient>) -> Self {
        Self { pool, client }
    }

    pub(crate) fn client(&self) -> Arc<dyn ChatClient> {
        self.client.clone()
    }

    /// Idempotent: seeds one builtin agent per non-custom type. A second
    /// call finds the existing rows and inserts nothing.
    pub async fn initialize(&self) -> Result<(), AppError> {
        for builtin in &BUILTIN_AGENTS {
            let existing: Option<i64> =
                sqlx::query_scalar("SELECT id FROM ai_agents WHERE agent_type = ? AND is_builtin = TRUE")
                    .bind(builtin.agent_type)
                    .fetch_optional(&self.pool)
                    .await?;
            if existing.is_none() {
                self.insert_agent(
                    builtin.name,
                    Some(builtin.description),
                    builtin.agent_type,
                    builtin.prompt_template,
                    true,
                )
                .await?;
                info!("Seeded builtin agent: {}", builtin.name);
            }
        }
        Ok(())
    }

    /// Creates a custom agent. Validation mirrors what `CustomizableAgent`
    /// enforces at construction, so a created agent can always be
    /// instantiated later. Returns the new agent id.
    pub async fn create_agent(&self, data: &NewAgent) -> Result<i64, AppError> {
        let name = require_field(&data.name, "name")?;
        let agent_type = AgentType::parse(require_field(&data.agent_type, "agent_type")?)?;
        let prompt_template = require_field(&data.prompt_template, "prompt_template")?;
        validate_template(prompt_template)?;

        let id = self
            .insert_agent(name, data.description.as_deref(), agent_type, prompt_template, false)
            .await?;
        info!("Created agent: {name} (ID: {id})");
        Ok(id)
    }

    pub async fn get_agent(&self, agent_id: i64) -> Result<Option<AgentRow>, AppError> {
        Ok(
            sqlx::query_as::<_, AgentRow>("SELECT * FROM ai_agents WHERE id = ?")
                .bind(agent_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    /// Lists agents matching the visibility filter. Ordered by id, so the
    /// ordering is stable across calls within one process run.
    pub async fn get_all_agents(&self, filter: &AgentFilter) -> Result<Vec<AgentRow>, AppError> {
        let mut agents =
            sqlx::query_as::<_, AgentRow>("SELECT * FROM ai_agents ORDER BY id")
                .fetch_all(&self.pool)
                .await?;

        agents.retain(|agent| {
            let visible = if agent.is_builtin {
                filter.include_builtin
            } else {
                filter.include_custom
            };
            visible && filter.agent_type.map_or(true, |t| agent.agent_type == t)
        });
        Ok(agents)
    }

    /// Merges the provided fields into a custom agent. Builtins are
    /// rejected; a changed template is re-validated; `updated_at` moves
    /// strictly past the stored value.
    pub async fn update_agent(
        &self,
        agent_id: i64,
        updates: &AgentUpdate,
    ) -> Result<AgentRow, AppError> {
        let Some(agent) = self.get_agent(agent_id).await? else {
            return Err(AppError::NotFound(format!("Agent {agent_id} not found")));
        };
        assert_mutable(&agent, "update")?;

        let name = updates.name.clone().unwrap_or(agent.name);
        let description = updates.description.clone().or(agent.description);
        let agent_type = match updates.agent_type.as_deref() {
            Some(s) => AgentType::parse(s)?,
            None => agent.agent_type,
        };
        let prompt_template = match &updates.prompt_template {
            Some(template) => {
                validate_template(template)?;
                template.clone()
            }
            None => agent.prompt_template,
        };

        let updated_at = advance_past(agent.updated_at);
        sqlx::query(
            "UPDATE ai_agents SET name = ?, description = ?, agent_type = ?, \
             prompt_template = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&name)
        .bind(&description)
        .bind(agent_type)
        .bind(&prompt_template)
        .bind(updated_at)
        .bind(agent_id)
        .execute(&self.pool)
        .await?;

        info!("Updated agent: {name} (ID: {agent_id})");
        self.get_agent(agent_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Agent {agent_id} not found")))
    }

    /// Deletes a custom agent; usage history cascades away with it.
    /// Returns whether a row was actually removed.
    pub async fn delete_agent(&self, agent_id: i64) -> Result<bool, AppError> {
        let Some(agent) = self.get_agent(agent_id).await? else {
            return Ok(false);
        };
        assert_mutable(&agent, "delete")?;

        let result = sqlx::query("DELETE FROM ai_agents WHERE id = ?")
            .bind(agent_id)
            .execute(&self.pool)
            .await?;
        let deleted = result.rows_affected() > 0;
        if deleted {
            info!("Deleted agent: {} (ID: {agent_id})", agent.name);
        }
        Ok(deleted)
    }

    /// Bumps `usage_count`; with a rating, also folds it into the running
    /// mean over rated calls only. Unrated calls leave the average and the
    /// rated-call count untouched. Each branch is one UPDATE, so concurrent
    /// callers cannot interleave a lost update.
    pub async fn update_agent_usage(
        &self,
        agent_id: i64,
        rating: Option<f64>,
    ) -> Result<(), AppError> {
        let now = Utc::now();
        match rating {
            Some(r) => {
                sqlx::query(
                    "UPDATE ai_agents SET usage_count = usage_count + 1, \
                     average_rating = (average_rating * rating_count + ?) / (rating_count + 1), \
                     rating_count = rating_count + 1, updated_at = ? WHERE id = ?",
                )
                .bind(r)
                .bind(now)
                .bind(agent_id)
                .execute(&self.pool)
                .await?;
            }
            None => {
                sqlx::query(
                    "UPDATE ai_agents SET usage_count = usage_count + 1, updated_at = ? \
                     WHERE id = ?",
                )
                .bind(now)
                .bind(agent_id)
                .execute(&self.pool)
                .await?;
            }
        }
        Ok(())
    }

    /// Writes one audit row for an invocation. Returns the row id so the
    /// caller can rate it later.
    pub async fn record_usage(&self, record: &NewUsageRecord) -> Result<i64, AppError> {
        let result = sqlx::query(
            "INSERT INTO agent_usage_history \
             (agent_id, analysis_id, execution_time, success, error_message, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(record.agent_id)
        .bind(record.analysis_id)
        .bind(record.execution_time)
        .bind(record.success)
        .bind(&record.error_message)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn get_usage_history(
        &self,
        agent_id: i64,
    ) -> Result<Vec<AgentUsageRow>, AppError> {
        Ok(sqlx::query_as::<_, AgentUsageRow>(
            "SELECT * FROM agent_usage_history WHERE agent_id = ? ORDER BY id DESC",
        )
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Attaches a user rating to one usage record and folds it into the
    /// owning agent's running mean. Does not count as a new use. Returns
    /// false when the record does not exist.
    pub async fn rate_usage(
        &self,
        usage_id: i64,
        rating: f64,
        feedback: Option<&str>,
    ) -> Result<bool, AppError> {
        if !(1.0..=5.0).contains(&rating) {
            return Err(AppError::Validation(
                "Rating must be between 1.0 and 5.0".to_string(),
            ));
        }

        let Some(record) = sqlx::query_as::<_, AgentUsageRow>(
            "SELECT * FROM agent_usage_history WHERE id = ?",
        )
        .bind(usage_id)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(false);
        };
        if record.rating.is_some() {
            return Err(AppError::Validation(format!(
                "Usage record {usage_id} is already rated"
            )));
        }

        sqlx::query("UPDATE agent_usage_history SET rating = ?, feedback = ? WHERE id = ?")
            .bind(rating)
            .bind(feedback)
            .bind(usage_id)
            .execute(&self.pool)
            .await?;

        sqlx::query(
            "UPDATE ai_agents SET \
             average_rating = (average_rating * rating_count + ?) / (rating_count + 1), \
             rating_count = rating_count + 1, updated_at = ? WHERE id = ?",
        )
        .bind(rating)
        .bind(Utc::now())
        .bind(record.agent_id)
        .execute(&self.pool)
        .await?;

        info!("Rated agent usage {usage_id}: {rating}/5.0");
        Ok(true)
    }

    /// Combines the coarse counters with detail aggregated over usage rows.
    pub async fn get_agent_statistics(
        &self,
        agent_id: i64,
    ) -> Result<AgentStatistics, AppError> {
        let Some(agent) = self.get_agent(agent_id).await? else {
            return Err(AppError::NotFound(format!("Agent {agent_id} not found")));
        };

        let agg = sqlx::query_as::<_, UsageAggregates>(
            "SELECT COUNT(*) AS total_uses, \
                    COALESCE(SUM(success), 0) AS successful_uses, \
                    COALESCE(AVG(execution_time), 0.0) AS avg_execution_time, \
                    COALESCE(AVG(rating), 0.0) AS avg_user_rating, \
                    COUNT(rating) AS rating_count \
             FROM agent_usage_history WHERE agent_id = ?",
        )
        .bind(agent_id)
        .fetch_one(&self.pool)
        .await?;

        let success_rate = if agg.total_uses > 0 {
            agg.successful_uses as f64 / agg.total_uses as f64
        } else {
            0.0
        };

        Ok(AgentStatistics {
            agent_id,
            usage_count: agent.usage_count,
            average_rating: agent.average_rating,
            total_uses: agg.total_uses,
            successful_uses: agg.successful_uses,
            success_rate,
            avg_execution_time: agg.avg_execution_time,
            avg_user_rating: agg.avg_user_rating,
            rating_count: agg.rating_count,
        })
    }

    /// Resolves an agent, binds it, runs one analysis, and returns the
    /// envelope. Deliberately does not touch usage statistics — recording a
    /// use is the caller's explicit responsibility.
    pub async fn analyze_with_agent(
        &self,
        agent_id: i64,
        context: &AnalysisContext,
    ) -> Result<AnalysisOutcome, AppError> {
        let Some(agent) = self.get_agent(agent_id).await? else {
            return Err(AppError::NotFound(format!("Agent {agent_id} not found")));
        };
        self.run_analysis(agent, context).await
    }

    /// Like `analyze_with_agent`, but for callers that already hold the row —
    /// avoids a second fetch of the same agent.
    pub async fn run_analysis(
        &self,
        agent: AgentRow,
        context: &AnalysisContext,
    ) -> Result<AnalysisOutcome, AppError> {
        let instance = CustomizableAgent::new(agent, self.client.clone())?;
        Ok(instance.analyze(context).await)
    }

    async fn insert_agent(
        &self,
        name: &str,
        description: Option<&str>,
        agent_type: AgentType,
        prompt_template: &str,
        is_builtin: bool,
    ) -> Result<i64, AppError> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO ai_agents \
             (name, description, agent_type, prompt_template, is_builtin, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(name)
        .bind(description)
        .bind(agent_type)
        .bind(prompt_template)
        .bind(is_builtin)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }
}

#[derive(FromRow)]
struct UsageAggregates {
    total_uses: i64,
    successful_uses: i64,
    avg_execution_time: f64,
    avg_user_rating: f64,
    rating_count: i64,
}

/// The single authorization check for agent mutations.
fn assert_mutable(agent: &AgentRow, action: &str) -> Result<(), AppError> {
    if agent.is_builtin {
        return Err(AppError::Validation(format!("Cannot {action} builtin agent")));
    }
    Ok(())
}

fn require_field<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str, AppError> {
    match value.as_deref().filter(|v| !v.trim().is_empty()) {
        Some(v) => Ok(v),
        None => Err(AppError::Validation(format!(
            "Missing required field: {field}"
        ))),
    }
}

/// Returns now, nudged forward if the clock has not advanced past `prior`.
fn advance_past(prior: DateTime<Utc>) -> DateTime<Utc> {
    let now = Utc::now();
    if now > prior {
        now
    } else {
        prior + chrono::Duration::microseconds(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use std::str::FromStr;

    struct StubClient {
        reply: Result<String, String>,
    }

    #[async_trait]
    impl ChatClient for StubClient {
        async fn complete(&self, _prompt: &str) -> anyhow::Result<String> {
            match &self.reply {
                Ok(s) => Ok(s.clone()),
                Err(m) => Err(anyhow::anyhow!("{m}")),
            }
        }
    }

    async fn manager_with(reply: Result<&str, &str>) -> AgentManager {
        // Single connection: an in-memory database exists per connection
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .unwrap()
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap();
        crate::db::init_schema(&pool).await.unwrap();
        let client = Arc::new(StubClient {
            reply: reply.map(str::to_string).map_err(str::to_string),
        });
        AgentManager::new(pool, client)
    }

    async fn manager() -> AgentManager {
        manager_with(Ok(r#"{"overall_score": 80}"#)).await
    }

    fn custom_agent(name: &str) -> NewAgent {
        NewAgent {
            name: Some(name.to_string()),
            description: Some("test".to_string()),
            agent_type: Some("custom".to_string()),
            prompt_template: Some("{job_description} vs {resume_content}".to_string()),
        }
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let mgr = manager().await;
        mgr.initialize().await.unwrap();
        mgr.initialize().await.unwrap();

        let builtins = mgr
            .get_all_agents(&AgentFilter {
                include_custom: false,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(builtins.len(), 5);

        let mut types: Vec<_> = builtins.iter().map(|a| a.agent_type).collect();
        types.sort_by_key(|t| t.as_str());
        types.dedup();
        assert_eq!(types.len(), 5);
    }

    #[tokio::test]
    async fn test_create_agent_roundtrip() {
        let mgr = manager().await;
        let id = mgr.create_agent(&custom_agent("mine")).await.unwrap();

        let agent = mgr.get_agent(id).await.unwrap().unwrap();
        assert_eq!(agent.name, "mine");
        assert_eq!(agent.agent_type, AgentType::Custom);
        assert!(!agent.is_builtin);
        assert_eq!(agent.usage_count, 0);
    }

    #[tokio::test]
    async fn test_create_agent_reports_missing_fields() {
        let mgr = manager().await;

        let err = mgr
            .create_agent(&NewAgent {
                agent_type: Some("custom".to_string()),
                prompt_template: Some("{job_description} {resume_content}".to_string()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Missing required field: name"));

        let err = mgr
            .create_agent(&NewAgent {
                name: Some("x".to_string()),
                agent_type: Some("custom".to_string()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(err
            .to_string()
            .contains("Missing required field: prompt_template"));
    }

    #[tokio::test]
    async fn test_create_agent_rejects_unknown_type() {
        let mgr = manager().await;
        let mut data = custom_agent("x");
        data.agent_type = Some("wizard".to_string());
        let err = mgr.create_agent(&data).await.unwrap_err();
        assert!(err.to_string().contains("Invalid agent_type"));
    }

    #[tokio::test]
    async fn test_create_agent_rejects_bad_template() {
        let mgr = manager().await;
        let mut data = custom_agent("x");
        data.prompt_template = Some("only {job_description}".to_string());
        let err = mgr.create_agent(&data).await.unwrap_err();
        assert!(err
            .to_string()
            .contains("missing required variable: resume_content"));
    }

    #[tokio::test]
    async fn test_builtin_agents_cannot_be_updated_or_deleted() {
        let mgr = manager().await;
        mgr.initialize().await.unwrap();
        let builtins = mgr
            .get_all_agents(&AgentFilter {
                include_custom: false,
                ..Default::default()
            })
            .await
            .unwrap();
        let builtin = &builtins[0];

        let err = mgr
            .update_agent(builtin.id, &AgentUpdate::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Cannot update builtin agent"));

        let err = mgr.delete_agent(builtin.id).await.unwrap_err();
        assert!(err.to_string().contains("Cannot delete builtin agent"));
    }

    #[tokio::test]
    async fn test_update_agent_merges_and_advances_updated_at() {
        let mgr = manager().await;
        let id = mgr.create_agent(&custom_agent("before")).await.unwrap();
        let before = mgr.get_agent(id).await.unwrap().unwrap();

        let updated = mgr
            .update_agent(
                id,
                &AgentUpdate {
                    name: Some("after".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "after");
        // Unmentioned fields keep their value
        assert_eq!(updated.prompt_template, before.prompt_template);
        assert!(updated.updated_at > before.updated_at);
    }

    #[tokio::test]
    async fn test_update_agent_revalidates_changed_template() {
        let mgr = manager().await;
        let id = mgr.create_agent(&custom_agent("x")).await.unwrap();
        let err = mgr
            .update_agent(
                id,
                &AgentUpdate {
                    prompt_template: Some("no markers".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("missing required variable"));
    }

    #[tokio::test]
    async fn test_update_missing_agent_is_not_found() {
        let mgr = manager().await;
        let err = mgr
            .update_agent(9999, &AgentUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_missing_agent_returns_false() {
        let mgr = manager().await;
        assert!(!mgr.delete_agent(9999).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_cascades_usage_history() {
        let mgr = manager().await;
        let id = mgr.create_agent(&custom_agent("doomed")).await.unwrap();
        mgr.record_usage(&NewUsageRecord {
            agent_id: id,
            analysis_id: 0,
            execution_time: 1.0,
            success: true,
            error_message: String::new(),
        })
        .await
        .unwrap();
        assert_eq!(mgr.get_usage_history(id).await.unwrap().len(), 1);

        assert!(mgr.delete_agent(id).await.unwrap());
        assert!(mgr.get_agent(id).await.unwrap().is_none());
        assert!(mgr.get_usage_history(id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_usage_rating_running_mean() {
        let mgr = manager().await;
        let id = mgr.create_agent(&custom_agent("rated")).await.unwrap();

        mgr.update_agent_usage(id, Some(4.0)).await.unwrap();
        mgr.update_agent_usage(id, Some(5.0)).await.unwrap();
        let agent = mgr.get_agent(id).await.unwrap().unwrap();
        assert_eq!(agent.usage_count, 2);
        assert!((agent.average_rating - 4.5).abs() < 1e-9);

        // Unrated use bumps the count but not the average
        mgr.update_agent_usage(id, None).await.unwrap();
        let agent = mgr.get_agent(id).await.unwrap().unwrap();
        assert_eq!(agent.usage_count, 3);
        assert!((agent.average_rating - 4.5).abs() < 1e-9);
        assert_eq!(agent.rating_count, 2);
    }

    #[tokio::test]
    async fn test_statistics_aggregate_usage_rows() {
        let mgr = manager().await;
        let id = mgr.create_agent(&custom_agent("stats")).await.unwrap();

        let u1 = mgr
            .record_usage(&NewUsageRecord {
                agent_id: id,
                analysis_id: 1,
                execution_time: 1.0,
                success: true,
                error_message: String::new(),
            })
            .await
            .unwrap();
        let u2 = mgr
            .record_usage(&NewUsageRecord {
                agent_id: id,
                analysis_id: 2,
                execution_time: 2.0,
                success: true,
                error_message: String::new(),
            })
            .await
            .unwrap();
        mgr.record_usage(&NewUsageRecord {
            agent_id: id,
            analysis_id: 3,
            execution_time: 0.0,
            success: false,
            error_message: "timeout".to_string(),
        })
        .await
        .unwrap();

        assert!(mgr.rate_usage(u1, 4.5, None).await.unwrap());
        assert!(mgr.rate_usage(u2, 3.5, Some("ok")).await.unwrap());

        let stats = mgr.get_agent_statistics(id).await.unwrap();
        assert_eq!(stats.total_uses, 3);
        assert_eq!(stats.successful_uses, 2);
        assert!((stats.success_rate - 2.0 / 3.0).abs() < 1e-9);
        assert!((stats.avg_execution_time - 1.0).abs() < 1e-9);
        assert_eq!(stats.rating_count, 2);
        assert!((stats.avg_user_rating - 4.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_statistics_with_no_usage_rows() {
        let mgr = manager().await;
        let id = mgr.create_agent(&custom_agent("fresh")).await.unwrap();
        let stats = mgr.get_agent_statistics(id).await.unwrap();
        assert_eq!(stats.total_uses, 0);
        assert_eq!(stats.success_rate, 0.0);
        assert_eq!(stats.avg_user_rating, 0.0);
    }

    #[tokio::test]
    async fn test_rate_usage_validates_range_and_single_rating() {
        let mgr = manager().await;
        let id = mgr.create_agent(&custom_agent("x")).await.unwrap();
        let usage = mgr
            .record_usage(&NewUsageRecord {
                agent_id: id,
                analysis_id: 0,
                execution_time: 0.5,
                success: true,
                error_message: String::new(),
            })
            .await
            .unwrap();

        let err = mgr.rate_usage(usage, 0.5, None).await.unwrap_err();
        assert!(err.to_string().contains("between 1.0 and 5.0"));

        assert!(mgr.rate_usage(usage, 5.0, None).await.unwrap());
        let err = mgr.rate_usage(usage, 4.0, None).await.unwrap_err();
        assert!(err.to_string().contains("already rated"));

        // Unknown record: absence, not an error
        assert!(!mgr.rate_usage(9999, 4.0, None).await.unwrap());
    }

    #[tokio::test]
    async fn test_get_all_agents_filters() {
        let mgr = manager().await;
        mgr.initialize().await.unwrap();
        mgr.create_agent(&custom_agent("mine")).await.unwrap();

        let all = mgr.get_all_agents(&AgentFilter::default()).await.unwrap();
        assert_eq!(all.len(), 6);

        let custom_only = mgr
            .get_all_agents(&AgentFilter {
                include_builtin: false,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(custom_only.len(), 1);
        assert_eq!(custom_only[0].name, "mine");

        let technical = mgr
            .get_all_agents(&AgentFilter {
                agent_type: Some(AgentType::Technical),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(technical.len(), 1);
        assert!(technical[0].is_builtin);
    }

    #[tokio::test]
    async fn test_analyze_with_agent_returns_envelope_without_bookkeeping() {
        let mgr = manager().await;
        let id = mgr.create_agent(&custom_agent("analyzer")).await.unwrap();

        let outcome = mgr
            .analyze_with_agent(id, &AnalysisContext::default())
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.agent_id, id);

        // Statistics are the caller's job, not analyze_with_agent's
        let agent = mgr.get_agent(id).await.unwrap().unwrap();
        assert_eq!(agent.usage_count, 0);
        assert!(mgr.get_usage_history(id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_analyze_with_failing_client_yields_failure_envelope() {
        let mgr = manager_with(Err("boom")).await;
        let id = mgr.create_agent(&custom_agent("x")).await.unwrap();

        let outcome = mgr
            .analyze_with_agent(id, &AnalysisContext::default())
            .await
            .unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_run_analysis_accepts_a_loaded_row() {
        let mgr = manager().await;
        let id = mgr.create_agent(&custom_agent("preloaded")).await.unwrap();
        let agent = mgr.get_agent(id).await.unwrap().unwrap();

        let outcome = mgr
            .run_analysis(agent, &AnalysisContext::default())
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.agent_id, id);
    }

    #[tokio::test]
    async fn test_analyze_with_unknown_agent_is_not_found() {
        let mgr = manager().await;
        let err = mgr
            .analyze_with_agent(424242, &AnalysisContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}

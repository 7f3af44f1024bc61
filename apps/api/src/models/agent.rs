use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::errors::AppError;

/// Agent persona categories. One builtin agent exists per non-custom type;
/// `Custom` is reserved for user-created agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum AgentType {
    General,
    Technical,
    Management,
    Creative,
    Sales,
    Custom,
}

impl AgentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::General => "general",
            AgentType::Technical => "technical",
            AgentType::Management => "management",
            AgentType::Creative => "creative",
            AgentType::Sales => "sales",
            AgentType::Custom => "custom",
        }
    }

    /// Parses a type name from user input. Unknown names are a validation
    /// error, not a fallback to `General`.
    pub fn parse(s: &str) -> Result<Self, AppError> {
        match s {
            "general" => Ok(AgentType::General),
            "technical" => Ok(AgentType::Technical),
            "management" => Ok(AgentType::Management),
            "creative" => Ok(AgentType::Creative),
            "sales" => Ok(AgentType::Sales),
            "custom" => Ok(AgentType::Custom),
            _ => Err(AppError::Validation(format!("Invalid agent_type: {s}"))),
        }
    }
}

/// A persisted agent definition (table `ai_agents`).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AgentRow {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub agent_type: AgentType,
    pub prompt_template: String,
    pub is_builtin: bool,
    pub usage_count: i64,
    /// Number of rated uses folded into `average_rating`. Unrated uses do
    /// not count here.
    pub rating_count: i64,
    pub average_rating: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One recorded agent invocation (table `agent_usage_history`).
/// Rows are written once; only the rating/feedback pair may be filled in
/// later by an explicit rating call.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AgentUsageRow {
    pub id: i64,
    pub agent_id: i64,
    pub analysis_id: i64,
    pub rating: Option<f64>,
    pub feedback: Option<String>,
    pub execution_time: f64,
    pub success: bool,
    pub error_message: String,
    pub created_at: DateTime<Utc>,
}

/// Coarse per-agent counters combined with detail aggregated over usage rows.
#[derive(Debug, Clone, Serialize)]
pub struct AgentStatistics {
    pub agent_id: i64,
    pub usage_count: i64,
    pub average_rating: f64,
    pub total_uses: i64,
    pub successful_uses: i64,
    /// successful_uses / total_uses, 0 when no usage rows exist.
    pub success_rate: f64,
    /// Mean over all rows, failed ones included.
    pub avg_execution_time: f64,
    /// Mean restricted to rows carrying a rating; 0 when none do.
    pub avg_user_rating: f64,
    pub rating_count: i64,
}

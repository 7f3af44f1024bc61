use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::agent::{AgentRow, AgentStatistics, AgentType, AgentUsageRow};
use crate::state::AppState;

use super::agent::{AnalysisContext, AnalysisOutcome};
use super::manager::{AgentFilter, AgentUpdate, NewAgent, NewUsageRecord};

fn default_true() -> bool {
    true
}

#[derive(Deserialize)]
pub struct AgentListQuery {
    #[serde(default = "default_true")]
    pub include_builtin: bool,
    #[serde(default = "default_true")]
    pub include_custom: bool,
    pub agent_type: Option<String>,
}

/// GET /api/v1/agents
pub async fn handle_list_agents(
    State(state): State<AppState>,
    Query(params): Query<AgentListQuery>,
) -> Result<Json<Vec<AgentRow>>, AppError> {
    let agent_type = params
        .agent_type
        .as_deref()
        .map(AgentType::parse)
        .transpose()?;
    let agents = state
        .agents
        .get_all_agents(&AgentFilter {
            include_builtin: params.include_builtin,
            include_custom: params.include_custom,
            agent_type,
        })
        .await?;
    Ok(Json(agents))
}

/// POST /api/v1/agents
pub async fn handle_create_agent(
    State(state): State<AppState>,
    Json(req): Json<NewAgent>,
) -> Result<(StatusCode, Json<AgentRow>), AppError> {
    let id = state.agents.create_agent(&req).await?;
    let agent = state
        .agents
        .get_agent(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Agent {id} not found")))?;
    Ok((StatusCode::CREATED, Json(agent)))
}

/// GET /api/v1/agents/:id
pub async fn handle_get_agent(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<AgentRow>, AppError> {
    let agent = state
        .agents
        .get_agent(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Agent {id} not found")))?;
    Ok(Json(agent))
}

/// PATCH /api/v1/agents/:id
pub async fn handle_update_agent(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<AgentUpdate>,
) -> Result<Json<AgentRow>, AppError> {
    let agent = state.agents.update_agent(id, &req).await?;
    Ok(Json(agent))
}

/// DELETE /api/v1/agents/:id
pub async fn handle_delete_agent(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    if state.agents.delete_agent(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("Agent {id} not found")))
    }
}

/// GET /api/v1/agents/:id/statistics
pub async fn handle_agent_statistics(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<AgentStatistics>, AppError> {
    let stats = state.agents.get_agent_statistics(id).await?;
    Ok(Json(stats))
}

/// GET /api/v1/agents/:id/history
pub async fn handle_agent_history(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<AgentUsageRow>>, AppError> {
    state
        .agents
        .get_agent(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Agent {id} not found")))?;
    let history = state.agents.get_usage_history(id).await?;
    Ok(Json(history))
}

#[derive(Serialize)]
pub struct AnalyzeResponse {
    pub usage_id: i64,
    pub agent_name: String,
    pub agent_type: AgentType,
    #[serde(flatten)]
    pub outcome: AnalysisOutcome,
}

/// POST /api/v1/agents/:id/analyze
///
/// Runs one analysis with an explicitly chosen agent, then records the use.
/// A failed LLM call still returns 200: the failure lives inside the
/// outcome envelope, and the usage row records it.
pub async fn handle_analyze(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(context): Json<AnalysisContext>,
) -> Result<Json<AnalyzeResponse>, AppError> {
    analyze_and_record(&state, id, &context).await.map(Json)
}

#[derive(Deserialize)]
pub struct AnalyzeRequest {
    /// Explicit agent choice; omitted means recommend one from the job
    /// description.
    pub agent_id: Option<i64>,
    #[serde(flatten)]
    pub context: AnalysisContext,
}

/// POST /api/v1/analyze
pub async fn handle_analyze_auto(
    State(state): State<AppState>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>, AppError> {
    let agent_id = match req.agent_id {
        Some(id) => id,
        None => {
            state
                .factory
                .recommended_agent(&req.context.job_description)
                .await?
                .ok_or_else(|| AppError::NotFound("No suitable agent found".to_string()))?
                .id
        }
    };
    analyze_and_record(&state, agent_id, &req.context)
        .await
        .map(Json)
}

async fn analyze_and_record(
    state: &AppState,
    agent_id: i64,
    context: &AnalysisContext,
) -> Result<AnalyzeResponse, AppError> {
    let agent = state
        .agents
        .get_agent(agent_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Agent {agent_id} not found")))?;

    let outcome = state.agents.run_analysis(agent.clone(), context).await?;

    let usage_id = state
        .agents
        .record_usage(&NewUsageRecord {
            agent_id,
            analysis_id: 0,
            execution_time: outcome.execution_time,
            success: outcome.success,
            error_message: outcome.error.clone().unwrap_or_default(),
        })
        .await?;
    state.agents.update_agent_usage(agent_id, None).await?;

    Ok(AnalyzeResponse {
        usage_id,
        agent_name: agent.name,
        agent_type: agent.agent_type,
        outcome,
    })
}

#[derive(Deserialize)]
pub struct RecommendRequest {
    pub job_description: String,
}

/// POST /api/v1/agents/recommend
pub async fn handle_recommend_agent(
    State(state): State<AppState>,
    Json(req): Json<RecommendRequest>,
) -> Result<Json<AgentRow>, AppError> {
    let agent = state
        .factory
        .recommended_agent(&req.job_description)
        .await?
        .ok_or_else(|| AppError::NotFound("No suitable agent found".to_string()))?;
    Ok(Json(agent))
}

#[derive(Deserialize)]
pub struct RatingRequest {
    pub rating: f64,
    pub feedback: Option<String>,
}

/// POST /api/v1/usage/:id/rating
pub async fn handle_rate_usage(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<RatingRequest>,
) -> Result<StatusCode, AppError> {
    if state
        .agents
        .rate_usage(id, req.rating, req.feedback.as_deref())
        .await?
    {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("Usage record {id} not found")))
    }
}

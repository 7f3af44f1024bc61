//! CustomizableAgent — binds one stored agent definition to a chat client
//! and runs single-shot analyses.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::error;

use crate::errors::AppError;
use crate::llm_client::ChatClient;
use crate::models::agent::AgentRow;

use super::parser::{parse_analysis, ParsedAnalysis};
use super::template::{render_template, validate_template};

/// Transient inputs for one analysis call. Built per call, never persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisContext {
    pub job_id: i64,
    pub resume_id: i64,
    pub job_description: String,
    pub resume_content: String,
    #[serde(default)]
    pub job_skills: Vec<String>,
    #[serde(default)]
    pub resume_skills: Vec<String>,
    /// Free-form caller metadata. Carried through for audit purposes only;
    /// never substituted into templates.
    #[serde(default)]
    pub additional_context: Map<String, Value>,
}

/// The always-returned result of an analysis call. A failed LLM call is
/// reported here, not raised: `success=false`, empty response and analysis,
/// and `error` carrying the failure message.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisOutcome {
    pub success: bool,
    pub agent_id: i64,
    /// Wall-clock seconds spent in the LLM call (up to the failure point
    /// when the call fails).
    pub execution_time: f64,
    pub raw_response: String,
    pub analysis: ParsedAnalysis,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct CustomizableAgent {
    definition: AgentRow,
    client: Arc<dyn ChatClient>,
}

impl CustomizableAgent {
    /// Fails before any network call if the definition's template is missing
    /// a required variable.
    pub fn new(definition: AgentRow, client: Arc<dyn ChatClient>) -> Result<Self, AppError> {
        validate_template(&definition.prompt_template)?;
        Ok(Self { definition, client })
    }

    pub fn definition(&self) -> &AgentRow {
        &self.definition
    }

    /// Formats the prompt, invokes the client, parses the response.
    /// Client failures are absorbed into a failure envelope — callers always
    /// receive an outcome, never an error.
    pub async fn analyze(&self, context: &AnalysisContext) -> AnalysisOutcome {
        let prompt = render_template(&self.definition.prompt_template, context);
        let started = Instant::now();

        match self.client.complete(&prompt).await {
            Ok(raw) => {
                let execution_time = started.elapsed().as_secs_f64();
                let analysis = parse_analysis(&raw);
                AnalysisOutcome {
                    success: true,
                    agent_id: self.definition.id,
                    execution_time,
                    raw_response: raw,
                    analysis,
                    error: None,
                }
            }
            Err(e) => {
                let execution_time = started.elapsed().as_secs_f64();
                error!("Agent '{}' analysis failed: {e}", self.definition.name);
                AnalysisOutcome {
                    success: false,
                    agent_id: self.definition.id,
                    execution_time,
                    raw_response: String::new(),
                    analysis: ParsedAnalysis::empty(),
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

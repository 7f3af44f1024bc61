//! AgentFactory — picks a builtin agent for a job description and builds
//! runnable agent instances from stored definitions.
//!
//! Recommendation is keyword scanning over the lowercased description, one
//! keyword list per specialist type, checked in a fixed order so technical
//! wins over management when both match. No keyword hit falls back to the
//! general agent.

use tracing::debug;

use crate::errors::AppError;
use crate::models::agent::{AgentRow, AgentType};

use super::agent::CustomizableAgent;
use super::manager::{AgentFilter, AgentManager};

const TECHNICAL_KEYWORDS: &[&str] = &[
    "开发", "程序员", "工程师", "技术", "编程", "代码", "软件", "算法",
    "developer", "engineer", "programming", "software",
];
const MANAGEMENT_KEYWORDS: &[&str] = &[
    "经理", "主管", "总监", "管理", "领导", "团队", "manager", "director", "leadership",
];
const CREATIVE_KEYWORDS: &[&str] = &[
    "设计", "创意", "美术", "ui", "ux", "视觉", "design", "creative", "visual",
];
const SALES_KEYWORDS: &[&str] = &["销售", "客户", "业务", "市场", "bd", "sales"];

#[derive(Clone)]
pub struct AgentFactory {
    manager: AgentManager,
}

impl AgentFactory {
    pub fn new(manager: AgentManager) -> Self {
        Self { manager }
    }

    /// Recommends a builtin agent for the given job description. Returns
    /// None only when the builtin catalog is empty (unseeded database).
    pub async fn recommended_agent(
        &self,
        job_description: &str,
    ) -> Result<Option<AgentRow>, AppError> {
        let builtins = self
            .manager
            .get_all_agents(&AgentFilter {
                include_custom: false,
                ..Default::default()
            })
            .await?;

        let wanted = classify(job_description);
        debug!("Recommending {} agent for job description", wanted.as_str());

        let pick = builtins
            .iter()
            .find(|a| a.agent_type == wanted)
            .or_else(|| builtins.iter().find(|a| a.agent_type == AgentType::General))
            .or_else(|| builtins.first());
        Ok(pick.cloned())
    }

    /// Binds a stored agent to the shared chat client. None for unknown ids.
    pub async fn create_agent_instance(
        &self,
        agent_id: i64,
    ) -> Result<Option<CustomizableAgent>, AppError> {
        let Some(agent) = self.manager.get_agent(agent_id).await? else {
            return Ok(None);
        };
        Ok(Some(CustomizableAgent::new(agent, self.manager.client())?))
    }
}

fn classify(job_description: &str) -> AgentType {
    let text = job_description.to_lowercase();
    // ASCII keywords match whole words only; "ui" must not fire inside
    // "build" or "guide". Chinese keywords match as substrings since CJK
    // text has no word separators.
    let words: Vec<&str> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let matches = |keywords: &[&str]| {
        keywords.iter().any(|k| {
            if k.is_ascii() {
                words.iter().any(|w| w == k)
            } else {
                text.contains(k)
            }
        })
    };

    if matches(TECHNICAL_KEYWORDS) {
        AgentType::Technical
    } else if matches(MANAGEMENT_KEYWORDS) {
        AgentType::Management
    } else if matches(CREATIVE_KEYWORDS) {
        AgentType::Creative
    } else if matches(SALES_KEYWORDS) {
        AgentType::Sales
    } else {
        AgentType::General
    }
}

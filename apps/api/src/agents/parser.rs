//! Response parsing — turns raw LLM text into a structured analysis.
//!
//! Two tiers: a JSON object is returned verbatim; anything else goes through
//! heuristic extraction of scores and sectioned lists from free text. The
//! result records which tier produced it, so callers can tell a structured
//! response from a best-effort extraction.
//!
//! `parse_analysis` is total: any input string, including the empty string,
//! yields a (possibly empty) mapping and never an error.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("hardcoded pattern"));

/// Which tier produced the parsed fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseSource {
    Json,
    Heuristic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedAnalysis {
    pub source: ParseSource,
    pub fields: Map<String, Value>,
}

impl ParsedAnalysis {
    /// The empty extraction — what a failed analysis carries.
    pub fn empty() -> Self {
        Self {
            source: ParseSource::Heuristic,
            fields: Map::new(),
        }
    }
}

/// Parses raw LLM output. JSON objects win; everything else falls back to
/// keyword extraction over free text.
pub fn parse_analysis(raw: &str) -> ParsedAnalysis {
    let text = strip_json_fences(raw);
    if let Ok(Value::Object(fields)) = serde_json::from_str::<Value>(text) {
        return ParsedAnalysis {
            source: ParseSource::Json,
            fields,
        };
    }
    extract_from_text(raw)
}

/// Strips ```json ... ``` or ``` ... ``` code fences from LLM output.
fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}

#[derive(PartialEq, Clone, Copy)]
enum Section {
    None,
    MissingSkills,
    Strengths,
    Suggestions,
}

/// Heuristic tier. Scores come from the first number on a line mentioning a
/// score label; lists are collected from bullet/numbered lines following a
/// section header until the next header. Labels are matched in both Chinese
/// and English.
fn extract_from_text(text: &str) -> ParsedAnalysis {
    let mut fields = Map::new();
    let mut strengths: Vec<Value> = Vec::new();
    let mut missing_skills: Vec<Value> = Vec::new();
    let mut suggestions: Vec<Value> = Vec::new();
    let mut section = Section::None;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let lower = line.to_lowercase();

        let is_score_line = line.contains("匹配度")
            || line.contains("分数")
            || line.contains("评分")
            || lower.contains("score");

        if is_score_line {
            if let Some(key) = score_key(line, &lower) {
                if let Some(m) = NUMBER_RE.find(line) {
                    if let Ok(score) = m.as_str().parse::<f64>() {
                        // First occurrence wins; scores cap at 100
                        fields.entry(key).or_insert(json!(score.min(100.0)));
                    }
                }
            }
            continue;
        }

        if line.contains("缺失") || line.contains("不足") || lower.contains("missing") {
            section = Section::MissingSkills;
        } else if line.contains("优势") || line.contains("长处") || lower.contains("strength") {
            section = Section::Strengths;
        } else if line.contains("建议") || line.contains("改进") || lower.contains("suggestion") {
            section = Section::Suggestions;
        } else if section != Section::None && is_list_item(line) {
            let item = line
                .trim_start_matches(|c: char| {
                    c == '-' || c == '•' || c == '*' || c == '.' || c == ' ' || c.is_ascii_digit()
                })
                .trim();
            if !item.is_empty() {
                let target = match section {
                    Section::MissingSkills => &mut missing_skills,
                    Section::Strengths => &mut strengths,
                    Section::Suggestions => &mut suggestions,
                    Section::None => unreachable!(),
                };
                target.push(json!(item));
            }
        }
    }

    if !missing_skills.is_empty() {
        fields.insert("missing_skills".to_string(), Value::Array(missing_skills));
    }
    if !strengths.is_empty() {
        fields.insert("strengths".to_string(), Value::Array(strengths));
    }
    if !suggestions.is_empty() {
        fields.insert("suggestions".to_string(), Value::Array(suggestions));
    }

    ParsedAnalysis {
        source: ParseSource::Heuristic,
        fields,
    }
}

fn score_key(line: &str, lower: &str) -> Option<&'static str> {
    if line.contains("总体") || line.contains("整体") || lower.contains("overall") {
        Some("overall_score")
    } else if line.contains("技能") || lower.contains("skill") {
        Some("skill_match_score")
    } else if line.contains("经验") || lower.contains("experience") {
        Some("experience_score")
    } else if line.contains("关键词") || lower.contains("keyword") {
        Some("keyword_coverage")
    } else {
        None
    }
}

fn is_list_item(line: &str) -> bool {
    line.starts_with('-')
        || line.starts_with('•')
        || line.starts_with('*')
        || line.chars().next().is_some_and(|c| c.is_ascii_digit())
}

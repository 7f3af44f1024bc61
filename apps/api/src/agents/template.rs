//! Prompt template validation and rendering.
//!
//! Templates are plain strings with `{name}`-style markers. Substitution is
//! a fixed whitelist: the two required variables plus the two optional skill
//! lists. Unknown markers pass through untouched, so a template cannot pull
//! in fields the caller never intended to expose.

use crate::errors::AppError;

use super::agent::AnalysisContext;

/// Every template must reference both of these.
pub const REQUIRED_VARIABLES: [&str; 2] = ["job_description", "resume_content"];

/// Checks that a template contains all required substitution markers.
/// The same check runs at agent construction and at create/update
/// persistence, so a stored agent can always be instantiated later.
pub fn validate_template(template: &str) -> Result<(), AppError> {
    for var in REQUIRED_VARIABLES {
        if !template.contains(&format!("{{{var}}}")) {
            return Err(AppError::Validation(format!(
                "Prompt template missing required variable: {var}"
            )));
        }
    }
    Ok(())
}

/// Substitutes the whitelisted variables into a template. Skill lists render
/// comma-joined; an empty list renders as an empty string rather than
/// failing, so templates that never mention skills are unaffected.
pub fn render_template(template: &str, context: &AnalysisContext) -> String {
    template
        .replace("{job_description}", &context.job_description)
        .replace("{resume_content}", &context.resume_content)
        .replace("{job_skills}", &context.job_skills.join(", "))
        .replace("{resume_skills}", &context.resume_skills.join(", "))
}

//! Agent subsystem: stored agent definitions, prompt templates, LLM response
//! parsing, and the manager/factory pair that runs analyses over them.

pub mod agent;
pub mod factory;
pub mod handlers;
pub mod manager;
pub mod parser;
pub mod prompts;
pub mod template;

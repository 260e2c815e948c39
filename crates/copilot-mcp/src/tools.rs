//! copilot-mcp Tool Definitions
//!
//! The five editing tools and their input schemas. Titles and
//! descriptions come from the prompt catalog; schemas are fixed here.

use serde_json::{json, Value};
use std::fmt;

use crate::prompts::ToolPromptPair;
use crate::protocol::{InputSchema, Tool};

/// The tools exposed by this server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    CodeFix,
    CodeRefactor,
    CodeGenerate,
    CodeTests,
    Agent,
}

impl ToolName {
    /// Registration order
    pub const ALL: [ToolName; 5] = [
        Self::CodeFix,
        Self::CodeRefactor,
        Self::CodeGenerate,
        Self::CodeTests,
        Self::Agent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CodeFix => "code_fix",
            Self::CodeRefactor => "code_refactor",
            Self::CodeGenerate => "code_generate",
            Self::CodeTests => "code_tests",
            Self::Agent => "agent",
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A required, non-empty string property
fn required_string(description: &str) -> Value {
    json!({ "type": "string", "minLength": 1, "description": description })
}

/// An optional string property
fn optional_string(description: &str) -> Value {
    json!({ "type": "string", "description": description })
}

/// Create a tool definition with the given name, prompt text, and schema properties
fn tool(name: ToolName, prompt: &ToolPromptPair, properties: Value, required: Vec<&str>) -> Tool {
    let props = properties.as_object().cloned().unwrap_or_default();
    Tool {
        name: name.as_str().to_string(),
        title: Some(prompt.title.clone()),
        description: prompt.description.clone(),
        input_schema: InputSchema {
            schema_type: "object".to_string(),
            properties: props,
            required: required.into_iter().map(|s| s.to_string()).collect(),
        },
    }
}

/// Build the MCP definition for one tool
pub fn definition(name: ToolName, prompt: &ToolPromptPair) -> Tool {
    match name {
        ToolName::CodeFix => tool(
            name,
            prompt,
            json!({
                "goal": required_string("What is wrong and what the fixed code should do"),
                "code": required_string("The code to fix"),
                "language": optional_string("Programming language of the code"),
                "context": optional_string("Surrounding code, error messages or other context")
            }),
            vec!["goal", "code"],
        ),
        ToolName::CodeRefactor => tool(
            name,
            prompt,
            json!({
                "goal": required_string("What the refactoring should achieve"),
                "code": required_string("The code to refactor"),
                "language": optional_string("Programming language of the code"),
                "constraints": optional_string("Rules the refactoring must respect (APIs to keep, style, performance)")
            }),
            vec!["goal", "code"],
        ),
        ToolName::CodeGenerate => tool(
            name,
            prompt,
            json!({
                "spec": required_string("Specification of the code to generate"),
                "language": required_string("Target programming language"),
                "context": optional_string("Existing code or project context to integrate with"),
                "style": optional_string("Style or convention preferences")
            }),
            vec!["spec", "language"],
        ),
        ToolName::CodeTests => tool(
            name,
            prompt,
            json!({
                "code": required_string("The code under test"),
                "language": required_string("Programming language of the code"),
                "framework": optional_string("Test framework to use (e.g. jest, pytest, cargo test)"),
                "requirements": optional_string("Cases or behaviors the tests must cover")
            }),
            vec!["code", "language"],
        ),
        ToolName::Agent => tool(
            name,
            prompt,
            json!({
                "goal": required_string("The multi-step task to carry out in the working directory"),
                "files": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Files the task is expected to touch or read"
                },
                "context": optional_string("Background the assistant needs for the task"),
                "constraints": optional_string("Rules the changes must respect")
            }),
            vec!["goal"],
        ),
    }
}

//! Tool Handler
//!
//! Handles tool calls by rendering the tool's prompt template and running
//! the assistant with it. Each call runs inside a `tool` span whose `scope`
//! is the tool name, so every log line of the call (the assistant's
//! included) carries it.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error_span, info, Instrument};

use copilot_core::logging::{truncate, PREVIEW_CHARS};

use crate::assistant::Assistant;
use crate::prompts::PromptCatalog;
use crate::protocol::ToolResult;
use crate::render::{render, Variables};
use crate::server::McpServer;
use crate::tools::{self, ToolName};

/// Length of goal/spec previews in request logs
const GOAL_PREVIEW_CHARS: usize = 120;

fn char_count(value: &Option<String>) -> usize {
    value.as_deref().map(|v| v.chars().count()).unwrap_or(0)
}

/// Explicit `null` behaves like an omitted list
fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Typed arguments of one tool
pub trait ToolInput: DeserializeOwned + Send + 'static {
    const TOOL: ToolName;

    /// Template variables for this input
    fn variables(&self) -> Variables;

    /// Log receipt of the request without the code body
    fn log_received(&self);
}

#[derive(Debug, Clone, Deserialize)]
pub struct CodeFixInput {
    pub goal: String,
    pub code: String,
    pub language: Option<String>,
    pub context: Option<String>,
}

impl ToolInput for CodeFixInput {
    const TOOL: ToolName = ToolName::CodeFix;

    fn variables(&self) -> Variables {
        Variables::new()
            .with("goal", self.goal.as_str())
            .with("code", self.code.as_str())
            .with_opt("language", self.language.as_deref())
            .with_opt("context", self.context.as_deref())
    }

    fn log_received(&self) {
        info!(
            goal = %truncate(&self.goal, GOAL_PREVIEW_CHARS),
            language = self.language.as_deref(),
            code_chars = self.code.chars().count(),
            context_chars = char_count(&self.context),
            "request received"
        );
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CodeRefactorInput {
    pub goal: String,
    pub code: String,
    pub language: Option<String>,
    pub constraints: Option<String>,
}

impl ToolInput for CodeRefactorInput {
    const TOOL: ToolName = ToolName::CodeRefactor;

    fn variables(&self) -> Variables {
        Variables::new()
            .with("goal", self.goal.as_str())
            .with("code", self.code.as_str())
            .with_opt("language", self.language.as_deref())
            .with_opt("constraints", self.constraints.as_deref())
    }

    fn log_received(&self) {
        info!(
            goal = %truncate(&self.goal, GOAL_PREVIEW_CHARS),
            language = self.language.as_deref(),
            code_chars = self.code.chars().count(),
            constraints_chars = char_count(&self.constraints),
            "request received"
        );
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CodeGenerateInput {
    pub spec: String,
    pub language: String,
    pub context: Option<String>,
    pub style: Option<String>,
}

impl ToolInput for CodeGenerateInput {
    const TOOL: ToolName = ToolName::CodeGenerate;

    fn variables(&self) -> Variables {
        Variables::new()
            .with("spec", self.spec.as_str())
            .with("language", self.language.as_str())
            .with_opt("context", self.context.as_deref())
            .with_opt("style", self.style.as_deref())
    }

    fn log_received(&self) {
        info!(
            spec = %truncate(&self.spec, GOAL_PREVIEW_CHARS),
            language = %self.language,
            context_chars = char_count(&self.context),
            style_chars = char_count(&self.style),
            "request received"
        );
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CodeTestsInput {
    pub code: String,
    pub language: String,
    pub framework: Option<String>,
    pub requirements: Option<String>,
}

impl ToolInput for CodeTestsInput {
    const TOOL: ToolName = ToolName::CodeTests;

    fn variables(&self) -> Variables {
        Variables::new()
            .with("code", self.code.as_str())
            .with("language", self.language.as_str())
            .with_opt("framework", self.framework.as_deref())
            .with_opt("requirements", self.requirements.as_deref())
    }

    fn log_received(&self) {
        info!(
            language = %self.language,
            framework = self.framework.as_deref(),
            code_chars = self.code.chars().count(),
            requirements_chars = char_count(&self.requirements),
            "request received"
        );
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentInput {
    pub goal: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub files: Vec<String>,
    pub context: Option<String>,
    pub constraints: Option<String>,
}

impl AgentInput {
    /// `- path` per line, empty when no files were given
    fn file_list(&self) -> String {
        self.files
            .iter()
            .map(|file| format!("- {}", file))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl ToolInput for AgentInput {
    const TOOL: ToolName = ToolName::Agent;

    fn variables(&self) -> Variables {
        Variables::new()
            .with("goal", self.goal.as_str())
            .with("files", self.file_list())
            .with_opt("context", self.context.as_deref())
            .with_opt("constraints", self.constraints.as_deref())
    }

    fn log_received(&self) {
        info!(
            goal = %truncate(&self.goal, GOAL_PREVIEW_CHARS),
            file_count = self.files.len(),
            context_chars = char_count(&self.context),
            constraints_chars = char_count(&self.constraints),
            "request received"
        );
    }
}

/// Renders prompts and runs the assistant for every tool
#[derive(Debug, Clone)]
pub struct Dispatcher {
    catalog: Arc<PromptCatalog>,
    assistant: Arc<Assistant>,
}

impl Dispatcher {
    pub fn new(catalog: Arc<PromptCatalog>, assistant: Arc<Assistant>) -> Self {
        Self { catalog, assistant }
    }

    /// Handle one (already validated) tool call
    pub async fn call<I: ToolInput>(&self, input: I) -> ToolResult {
        // Error level so the scope survives any level filter
        let span = error_span!("tool", scope = I::TOOL.as_str());

        async move {
            let start = Instant::now();
            input.log_received();

            let template = &self.catalog.get(I::TOOL).template;
            let prompt = render(template, &input.variables());
            debug!(
                prompt_preview = %truncate(&prompt, PREVIEW_CHARS),
                prompt_length = prompt.chars().count(),
                "rendered prompt"
            );

            let invocation = self.assistant.invoke(&prompt).await;

            info!(
                duration_ms = start.elapsed().as_millis() as u64,
                exit_code = invocation.exit_code,
                output_preview = %truncate(&invocation.output, PREVIEW_CHARS),
                output_length = invocation.output.chars().count(),
                "completed"
            );

            ToolResult::text(invocation.output)
        }
        .instrument(span)
        .await
    }

    /// Register all five tools on the server
    pub fn register_all(&self, server: &mut McpServer) {
        self.register::<CodeFixInput>(server);
        self.register::<CodeRefactorInput>(server);
        self.register::<CodeGenerateInput>(server);
        self.register::<CodeTestsInput>(server);
        self.register::<AgentInput>(server);
    }

    fn register<I: ToolInput>(&self, server: &mut McpServer) {
        let definition = tools::definition(I::TOOL, self.catalog.get(I::TOOL));
        let dispatcher = self.clone();

        server.register_tool(definition, move |input: I| {
            let dispatcher = dispatcher.clone();
            async move { dispatcher.call(input).await }
        });
    }
}

/// Build the server with every tool registered
pub fn build_server(catalog: Arc<PromptCatalog>, assistant: Arc<Assistant>) -> McpServer {
    let mut server = McpServer::new("copilot-mcp", env!("CARGO_PKG_VERSION"));
    Dispatcher::new(catalog, assistant).register_all(&mut server);
    server
}

//! Prompt catalog
//!
//! Each tool has two markdown resources:
//!
//! - `<tool>.description.md`: front matter with a `title`, then the
//!   description shown to MCP clients
//! - `<tool>.template.md`: the prompt body with `{{name}}` placeholders
//!
//! ```text
//! ---
//! title: Fix code
//! ---
//! Fixes a bug in the given code...
//! ```
//!
//! The built-in resources under `prompts/` are compiled into the binary.
//! A directory with the same file names can replace them at runtime.

use std::path::PathBuf;
use thiserror::Error;

use crate::tools::ToolName;

/// Prompt loading errors (fatal at startup)
#[derive(Debug, Error)]
pub enum PromptError {
    #[error("{resource}: missing required front matter block with title (--- title: ... ---)")]
    MissingFrontMatter { resource: String },

    #[error("{resource}: front matter missing title")]
    MissingTitle { resource: String },

    #[error("{resource}: no such built-in prompt")]
    NotFound { resource: String },

    #[error("{resource}: failed to read {path}: {source}")]
    Read {
        resource: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Title, description and template for one tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPromptPair {
    pub title: String,
    pub description: String,
    pub template: String,
}

/// A parsed description resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptFile {
    pub title: String,
    pub body: String,
}

/// Parse front matter and body out of a description resource
pub fn parse_prompt_file(resource: &str, content: &str) -> Result<PromptFile, PromptError> {
    let missing = || PromptError::MissingFrontMatter {
        resource: resource.to_string(),
    };

    let rest = content.strip_prefix("---").ok_or_else(missing)?;
    let rest = rest
        .strip_prefix("\r\n")
        .or_else(|| rest.strip_prefix('\n'))
        .ok_or_else(missing)?;

    // Find the closing delimiter line
    let mut offset = 0;
    let mut split = None;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            split = Some((&rest[..offset], &rest[offset + line.len()..]));
            break;
        }
        offset += line.len();
    }
    let (front_matter, body) = split.ok_or_else(missing)?;

    let title = front_matter
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(key, _)| key.trim() == "title")
        .map(|(_, value)| value.trim())
        .unwrap_or("");

    if title.is_empty() {
        return Err(PromptError::MissingTitle {
            resource: resource.to_string(),
        });
    }

    Ok(PromptFile {
        title: title.to_string(),
        body: body.trim().to_string(),
    })
}

/// Where prompt resources are read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptSource {
    /// Resources compiled into the binary
    Builtin,
    /// `<tool>.description.md` / `<tool>.template.md` files in a directory
    Directory(PathBuf),
}

impl PromptSource {
    pub fn from_dir(dir: Option<PathBuf>) -> Self {
        dir.map(Self::Directory).unwrap_or(Self::Builtin)
    }

    async fn read(&self, resource: &str) -> Result<String, PromptError> {
        match self {
            Self::Builtin => builtin(resource)
                .map(str::to_string)
                .ok_or_else(|| PromptError::NotFound {
                    resource: resource.to_string(),
                }),
            Self::Directory(dir) => {
                let path = dir.join(resource);
                tokio::fs::read_to_string(&path)
                    .await
                    .map_err(|source| PromptError::Read {
                        resource: resource.to_string(),
                        path,
                        source,
                    })
            }
        }
    }
}

/// Built-in resources, embedded at compile time
fn builtin(resource: &str) -> Option<&'static str> {
    let content = match resource {
        "code_fix.description.md" => include_str!("../prompts/code_fix.description.md"),
        "code_fix.template.md" => include_str!("../prompts/code_fix.template.md"),
        "code_refactor.description.md" => include_str!("../prompts/code_refactor.description.md"),
        "code_refactor.template.md" => include_str!("../prompts/code_refactor.template.md"),
        "code_generate.description.md" => include_str!("../prompts/code_generate.description.md"),
        "code_generate.template.md" => include_str!("../prompts/code_generate.template.md"),
        "code_tests.description.md" => include_str!("../prompts/code_tests.description.md"),
        "code_tests.template.md" => include_str!("../prompts/code_tests.template.md"),
        "agent.description.md" => include_str!("../prompts/agent.description.md"),
        "agent.template.md" => include_str!("../prompts/agent.template.md"),
        _ => return None,
    };
    Some(content)
}

async fn load_description(
    source: &PromptSource,
    tool: ToolName,
) -> Result<PromptFile, PromptError> {
    let resource = format!("{}.description.md", tool);
    let content = source.read(&resource).await?;
    parse_prompt_file(&resource, &content)
}

async fn load_template(source: &PromptSource, tool: ToolName) -> Result<String, PromptError> {
    let resource = format!("{}.template.md", tool);
    Ok(source.read(&resource).await?.trim().to_string())
}

async fn load_pair(source: &PromptSource, tool: ToolName) -> Result<ToolPromptPair, PromptError> {
    let (description, template) =
        tokio::try_join!(load_description(source, tool), load_template(source, tool))?;

    Ok(ToolPromptPair {
        title: description.title,
        description: description.body,
        template,
    })
}

/// Prompts for every tool, loaded once at startup and read-only afterwards
#[derive(Debug, Clone)]
pub struct PromptCatalog {
    code_fix: ToolPromptPair,
    code_refactor: ToolPromptPair,
    code_generate: ToolPromptPair,
    code_tests: ToolPromptPair,
    agent: ToolPromptPair,
}

impl PromptCatalog {
    /// Load all tools concurrently; any failure aborts the whole load
    pub async fn load(source: &PromptSource) -> Result<Self, PromptError> {
        let (code_fix, code_refactor, code_generate, code_tests, agent) = tokio::try_join!(
            load_pair(source, ToolName::CodeFix),
            load_pair(source, ToolName::CodeRefactor),
            load_pair(source, ToolName::CodeGenerate),
            load_pair(source, ToolName::CodeTests),
            load_pair(source, ToolName::Agent),
        )?;

        Ok(Self {
            code_fix,
            code_refactor,
            code_generate,
            code_tests,
            agent,
        })
    }

    pub fn get(&self, tool: ToolName) -> &ToolPromptPair {
        match tool {
            ToolName::CodeFix => &self.code_fix,
            ToolName::CodeRefactor => &self.code_refactor,
            ToolName::CodeGenerate => &self.code_generate,
            ToolName::CodeTests => &self.code_tests,
            ToolName::Agent => &self.agent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    fn write_prompts(dir: &Path) {
        for tool in ToolName::ALL {
            fs::write(
                dir.join(format!("{}.description.md", tool)),
                format!("---\ntitle: {} title\n---\n\nDescribes {}.\n", tool, tool),
            )
            .unwrap();
            fs::write(
                dir.join(format!("{}.template.md", tool)),
                "\nDo {{goal}}\n\n",
            )
            .unwrap();
        }
    }

    #[test]
    fn test_parse_prompt_file() {
        let file = parse_prompt_file(
            "x.md",
            "---\ntitle:   Fix code  \nauthor: someone\n---\n\n  Fixes bugs.\n\n",
        )
        .unwrap();

        assert_eq!(file.title, "Fix code");
        assert_eq!(file.body, "Fixes bugs.");
    }

    #[test]
    fn test_parse_crlf_and_colons_in_title() {
        let file =
            parse_prompt_file("x.md", "---\r\ntitle: Tests: generate\r\n---\r\nBody\r\n").unwrap();
        assert_eq!(file.title, "Tests: generate");
        assert_eq!(file.body, "Body");
    }

    #[test]
    fn test_parse_missing_front_matter() {
        let err = parse_prompt_file("x.md", "title: Fix\nBody").unwrap_err();
        assert!(matches!(err, PromptError::MissingFrontMatter { .. }));

        let err = parse_prompt_file("x.md", "---\ntitle: Fix\nBody without close").unwrap_err();
        assert!(matches!(err, PromptError::MissingFrontMatter { .. }));
    }

    #[test]
    fn test_parse_missing_title() {
        let err = parse_prompt_file("x.md", "---\nauthor: me\n---\nBody").unwrap_err();
        assert!(matches!(err, PromptError::MissingTitle { .. }));

        let err = parse_prompt_file("x.md", "---\ntitle:   \n---\nBody").unwrap_err();
        assert!(matches!(err, PromptError::MissingTitle { .. }));
    }

    #[tokio::test]
    async fn test_builtin_catalog_is_complete() {
        let catalog = PromptCatalog::load(&PromptSource::Builtin).await.unwrap();

        for tool in ToolName::ALL {
            let prompt = catalog.get(tool);
            assert!(!prompt.title.is_empty(), "{} has no title", tool);
            assert!(!prompt.description.is_empty(), "{} has no description", tool);
            assert!(!prompt.template.is_empty(), "{} has no template", tool);
        }

        let tests = catalog.get(ToolName::CodeTests);
        for placeholder in ["code", "language", "framework", "requirements"] {
            assert!(tests.template.contains(placeholder), "missing {}", placeholder);
        }
    }

    #[tokio::test]
    async fn test_directory_source() {
        let dir = tempfile::tempdir().unwrap();
        write_prompts(dir.path());

        let catalog = PromptCatalog::load(&PromptSource::Directory(dir.path().to_path_buf()))
            .await
            .unwrap();

        let fix = catalog.get(ToolName::CodeFix);
        assert_eq!(fix.title, "code_fix title");
        assert_eq!(fix.description, "Describes code_fix.");
        assert_eq!(fix.template, "Do {{goal}}");
    }

    #[tokio::test]
    async fn test_missing_title_fails_whole_catalog() {
        let dir = tempfile::tempdir().unwrap();
        write_prompts(dir.path());
        fs::write(
            dir.path().join("agent.description.md"),
            "---\nsummary: no title here\n---\nBody\n",
        )
        .unwrap();

        let err = PromptCatalog::load(&PromptSource::Directory(dir.path().to_path_buf()))
            .await
            .unwrap_err();

        match err {
            PromptError::MissingTitle { resource } => assert_eq!(resource, "agent.description.md"),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_resource_fails() {
        let dir = tempfile::tempdir().unwrap();
        write_prompts(dir.path());
        fs::remove_file(dir.path().join("code_tests.template.md")).unwrap();

        let err = PromptCatalog::load(&PromptSource::Directory(dir.path().to_path_buf()))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PromptError::Read { ref resource, .. } if resource == "code_tests.template.md"
        ));
    }

    #[test]
    fn test_source_from_dir() {
        assert_eq!(PromptSource::from_dir(None), PromptSource::Builtin);
        assert_eq!(
            PromptSource::from_dir(Some(PathBuf::from("/p"))),
            PromptSource::Directory(PathBuf::from("/p"))
        );
    }
}

//! Prompt template rendering
//!
//! Replaces `{{name}}` placeholders (whitespace inside the braces allowed)
//! with caller-supplied values in a single `replace_all` pass. Substituted
//! values are copied to the output and never rescanned, so a value that
//! itself contains `{{...}}` is inserted literally.

use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}")
        .expect("placeholder pattern is valid")
});

/// Template variables: name -> optional value.
///
/// A name mapped to `None` renders as an empty string. A name that is not
/// present at all leaves its placeholder untouched.
#[derive(Debug, Clone, Default)]
pub struct Variables {
    vars: HashMap<String, Option<String>>,
}

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a variable to a value
    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.vars.insert(name.to_string(), Some(value.into()));
        self
    }

    /// Set a variable that may be absent
    pub fn with_opt(mut self, name: &str, value: Option<&str>) -> Self {
        self.vars.insert(name.to_string(), value.map(str::to_string));
        self
    }

    /// `None` if the name is unknown, `Some("")` if it is known but absent
    fn lookup(&self, name: &str) -> Option<&str> {
        self.vars
            .get(name)
            .map(|value| value.as_deref().unwrap_or(""))
    }
}

/// Render a template with the given variables
pub fn render(template: &str, vars: &Variables) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            vars.lookup(&caps[1]).unwrap_or(&caps[0]).to_string()
        })
        .into_owned()
}

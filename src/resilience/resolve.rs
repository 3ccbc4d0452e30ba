//! Configuration and key resolution shared by every resilience component.
//!
//! Precedence is always: call declaration, then dependency default, then
//! nothing (feature disabled).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{Call, Dependency};

/// Pick the call's declaration over the dependency default.
pub fn resolve_config<'a, T>(declared: Option<&'a T>, default: Option<&'a T>) -> Option<&'a T> {
    declared.or(default)
}

/// Key pattern with `{field}` placeholders filled from the call's public fields.
///
/// Placeholders that do not resolve are kept verbatim. A template without
/// placeholders is simply an explicit key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyTemplate(String);

impl KeyTemplate {
    /// Create a template
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    /// Raw template text
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Substitute placeholders from the call
    pub fn render(&self, call: &dyn Call) -> String {
        let template = self.0.as_str();
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];

            match after.find('}') {
                Some(close) if is_field_name(&after[..close]) => {
                    let name = &after[..close];
                    match call.field(name) {
                        Some(value) => out.push_str(&value),
                        None => {
                            out.push('{');
                            out.push_str(name);
                            out.push('}');
                        }
                    }
                    rest = &after[close + 1..];
                }
                _ => {
                    out.push('{');
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        out
    }
}

impl fmt::Display for KeyTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for KeyTemplate {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for KeyTemplate {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

fn is_field_name(candidate: &str) -> bool {
    !candidate.is_empty()
        && candidate
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Resolve the key for a call: rendered template if one is configured,
/// otherwise the dependency identity.
pub fn resolve_key(template: Option<&KeyTemplate>, scope: &Dependency, call: &dyn Call) -> String {
    match template {
        Some(template) => template.render(call),
        None => scope.identity().to_string(),
    }
}

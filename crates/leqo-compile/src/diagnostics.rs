//! Non-fatal diagnostics attached to a successful compile.

use serde::Serialize;

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
}

/// A per-node or global message attached to the compile result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    /// The node the message refers to, if any.
    pub node: Option<String>,
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    /// A warning attached to a node.
    pub fn warning(node: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            node: Some(node.into()),
            severity: Severity::Warning,
            message: message.into(),
        }
    }

    /// An informational message attached to a node.
    pub fn info(node: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            node: Some(node.into()),
            severity: Severity::Info,
            message: message.into(),
        }
    }
}

use serde::{Deserialize, Serialize};

/// `terraform validate -json` output.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TerraformValidateOutput {
    pub valid: bool,
    #[serde(default)]
    pub error_count: i32,
    #[serde(default)]
    pub warning_count: i32,
    #[serde(default)]
    pub diagnostics: Vec<TerraformDiagnostic>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TerraformDiagnostic {
    pub severity: String,
    pub summary: String,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub range: Option<DiagnosticRange>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DiagnosticRange {
    pub filename: String,
    pub start: Position,
    pub end: Position,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Position {
    pub line: i32,
    pub column: i32,
    #[serde(default)]
    pub byte: i32,
}

impl TerraformValidateOutput {
    /// One line per diagnostic, `severity: summary (file:line)`.
    pub fn describe(&self) -> Vec<String> {
        self.diagnostics
            .iter()
            .map(|d| match &d.range {
                Some(range) => format!(
                    "{}: {} ({}:{})",
                    d.severity, d.summary, range.filename, range.start.line
                ),
                None => format!("{}: {}", d.severity, d.summary),
            })
            .collect()
    }
}

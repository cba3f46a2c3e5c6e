//! Output formatting for CLI results.

use std::fmt::Write;

use serde::Serialize;

use crate::agent::TurnReport;
use crate::agent::tool::ToolDefinition;

/// Output format for command results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// Pretty-printed JSON.
    Json,
}

impl OutputFormat {
    /// Parses a format name; unknown names fall back to text.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Text,
        }
    }

    /// Serializes `value` as pretty JSON.
    pub fn to_json<T: Serialize + ?Sized>(self, value: &T) -> String {
        serde_json::to_string_pretty(value)
            .unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() }).to_string())
    }
}

/// Answer text, numbered sources and a stats footer.
pub fn format_report(report: &TurnReport) -> String {
    let mut out = report.envelope.answer_text.trim_end().to_string();
    out.push('\n');
    if !report.envelope.citations.is_empty() {
        out.push_str("\nSources:\n");
        for (key, source) in report.envelope.citations.iter() {
            let _ = writeln!(out, "  [{key}] {source}");
        }
    }
    let _ = writeln!(
        out,
        "\n---\nAttempts: {} | Iterations: {} | Tokens: {} ({} prompt, {} completion)",
        report.attempts,
        report.iterations,
        report.total_usage.total(),
        report.total_usage.prompt_tokens,
        report.total_usage.completion_tokens,
    );
    out
}

/// One block per tool: name, description and parameter schema.
pub fn format_tools(definitions: &[ToolDefinition]) -> String {
    let mut out = String::new();
    for def in definitions {
        let params = serde_json::to_string_pretty(&def.parameters).unwrap_or_default();
        let _ = writeln!(out, "{}\n  {}\n{params}\n", def.name, def.description);
    }
    out
}

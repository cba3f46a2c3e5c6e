//! System prompts for the two agents.
//!
//! Prompts are markdown templates loaded from a prompt directory with
//! compiled-in fallbacks. The metadata prompt carries a `{schema}`
//! placeholder that is replaced with the store's DDL.

use std::path::{Path, PathBuf};

/// Placeholder in the metadata prompt replaced by the table schema.
pub const SCHEMA_PLACEHOLDER: &str = "{schema}";

/// Default subdirectory (under the home directory) for prompt files.
const DEFAULT_PROMPT_DIR: &str = ".config/contract-qa/prompts";
/// Environment variable overriding the prompt directory.
const PROMPT_DIR_ENV: &str = "CONTRACT_QA_PROMPT_DIR";

const METADATA_FILENAME: &str = "metadata.md";
const SEARCH_FILENAME: &str = "search.md";

/// Shared answer contract appended to both prompts.
const ANSWER_FORMAT: &str = r#"## Answer Format

Reply with a single JSON object and nothing else:

```json
{
  "answerText": "Answer with inline markers such as [doc1] and [doc2].",
  "citations": {
    "doc1": "descriptor of the first source used",
    "doc2": "descriptor of the second source used"
  }
}
```

Citation rules:
- Number markers in the order you first use a source: the first source is [doc1], the next new one [doc2], and so on. Reusing a source reuses its marker.
- Every marker in `answerText` has an entry in `citations`, and every entry is used in `answerText`.
- Each citation value is a non-empty string naming the real source. Never use numbers, booleans, or stand-ins like "source" or "doc1".
- If nothing relevant was found, say so in `answerText` and return an empty `citations` object.
"#;

/// Default system prompt for the SQL metadata agent.
pub const METADATA_SYSTEM_PROMPT: &str = r"## Role

You answer questions about a contract portfolio by querying structured contract metadata with SQL.

## Schema

{schema}

## Tool

`execute_sql_query(query, explanation)` runs one read-only SELECT and returns the rows as JSON.

Query rules (violations come back as tool errors; fix the query and call again):
- A single SELECT statement. No INSERT, UPDATE, DELETE, DROP, ALTER, TRUNCATE or CREATE anywhere in the text.
- Every query needs a WHERE clause, a LIMIT clause, or both. Prefer both.
- LIMIT values above the configured ceiling are lowered to it.
- Select only the columns you need. Use COUNT, GROUP BY and other aggregates for statistics.
- Handle NULLs with IS NULL / IS NOT NULL.
- Join tables on (project_id, reference_doc_id).

## Citations

Cite the tables you queried, e.g. `Database: contract_asmd table`.
";

/// Default system prompt for the contract text search agent.
pub const SEARCH_SYSTEM_PROMPT: &str = r"## Role

You answer questions about contracts using only passages retrieved from the contract text index.

## Tools

- `hybrid_search(query, top_k?)`: keyword plus semantic search across everything in scope.
- `search_by_project(project_id, query?, search_type?, top_k?)`: search inside one project. `search_type` is `hybrid` (default), `semantic` or `text`.
- `search_similar_documents(record_id, top_k?)`: find passages similar to one you already retrieved, using its Record value.
- `search_by_document(project_id, reference_doc_id, top_k?)`: read one document's passages in order.
- `compare_filtered_documents(query, top_k?)`: run the same query against each filtered document separately. Use it when the active filters name two or more documents and the question compares them.

Searches must have a query or a filter; a search that would scan the entire corpus is rejected.

## Search Results

Results arrive as markdown blocks headed `## Search Result N`, each with a table giving the Document, Contract Type, Section and Record, followed by the passage. The result number is not a citation number.

## Filters

When filters are active, every search is restricted to them automatically. You do not need to repeat them in tool arguments.

## Citations

Cite the Document value of each passage you rely on, e.g. `SupplierAgreement_2024.pdf-12`.
";

/// Resolved system prompts for both agents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSet {
    /// SQL metadata agent prompt (with `{schema}` placeholder).
    pub metadata: String,
    /// Contract search agent prompt.
    pub search: String,
}

impl PromptSet {
    /// Loads prompts, falling back to compiled-in defaults per file.
    ///
    /// Directory resolution: `prompt_dir`, then `CONTRACT_QA_PROMPT_DIR`,
    /// then `~/.config/contract-qa/prompts`.
    #[must_use]
    pub fn load(prompt_dir: Option<&Path>) -> Self {
        let dir = prompt_dir
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(PROMPT_DIR_ENV).ok().map(PathBuf::from))
            .or_else(Self::default_dir);

        let read = |filename: &str, fallback: &str| -> String {
            dir.as_ref()
                .map(|d| d.join(filename))
                .and_then(|path| std::fs::read_to_string(path).ok())
                .filter(|text| !text.trim().is_empty())
                .unwrap_or_else(|| fallback.to_string())
        };

        Self {
            metadata: read(METADATA_FILENAME, METADATA_SYSTEM_PROMPT),
            search: read(SEARCH_FILENAME, SEARCH_SYSTEM_PROMPT),
        }
    }

    /// Compiled-in defaults.
    #[must_use]
    pub fn defaults() -> Self {
        Self {
            metadata: METADATA_SYSTEM_PROMPT.to_string(),
            search: SEARCH_SYSTEM_PROMPT.to_string(),
        }
    }

    /// Writes the default templates into `dir`, skipping existing files.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory or a file cannot be written.
    pub fn write_defaults(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)?;
        let mut written = Vec::new();
        for (filename, content) in [
            (METADATA_FILENAME, METADATA_SYSTEM_PROMPT),
            (SEARCH_FILENAME, SEARCH_SYSTEM_PROMPT),
        ] {
            let path = dir.join(filename);
            if !path.exists() {
                std::fs::write(&path, content)?;
                written.push(path);
            }
        }
        Ok(written)
    }

    /// `~/.config/contract-qa/prompts`, if the home directory is known.
    #[must_use]
    pub fn default_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(DEFAULT_PROMPT_DIR))
    }
}

/// Appends the answer contract to an agent prompt.
#[must_use]
pub fn with_answer_format(prompt: &str) -> String {
    format!("{}\n\n{ANSWER_FORMAT}", prompt.trim_end())
}

/// Fills the metadata prompt's schema placeholder.
#[must_use]
pub fn render_metadata_prompt(template: &str, schema: &str) -> String {
    let schema = if schema.trim().is_empty() {
        "(no tables found)"
    } else {
        schema.trim()
    };
    let body = if template.contains(SCHEMA_PLACEHOLDER) {
        template.replace(SCHEMA_PLACEHOLDER, schema)
    } else {
        format!("{}\n\n## Schema\n\n{schema}\n", template.trim_end())
    };
    with_answer_format(&body)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_render_metadata_prompt() {
        let prompt = render_metadata_prompt(
            METADATA_SYSTEM_PROMPT,
            "-- contract_asmd\nCREATE TABLE contract_asmd (id INTEGER);",
        );
        assert!(prompt.contains("CREATE TABLE contract_asmd"));
        assert!(!prompt.contains(SCHEMA_PLACEHOLDER));
        assert!(prompt.contains("\"answerText\""));
    }

    #[test]
    fn test_render_template_without_placeholder() {
        let prompt = render_metadata_prompt("Custom prompt.", "CREATE TABLE t (x);");
        assert!(prompt.starts_with("Custom prompt."));
        assert!(prompt.contains("## Schema\n\nCREATE TABLE t (x);"));
    }

    #[test]
    fn test_write_defaults_then_load() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir failed: {e}"));
        let written =
            PromptSet::write_defaults(dir.path()).unwrap_or_else(|e| panic!("write failed: {e}"));
        assert_eq!(written.len(), 2);

        let again =
            PromptSet::write_defaults(dir.path()).unwrap_or_else(|e| panic!("write failed: {e}"));
        assert!(again.is_empty());

        std::fs::write(dir.path().join(SEARCH_FILENAME), "Search carefully.")
            .unwrap_or_else(|e| panic!("overwrite failed: {e}"));
        let prompts = PromptSet::load(Some(dir.path()));
        assert_eq!(prompts.search, "Search carefully.");
        assert_eq!(prompts.metadata, METADATA_SYSTEM_PROMPT);
    }

    #[test]
    fn test_empty_file_falls_back() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir failed: {e}"));
        std::fs::write(dir.path().join(METADATA_FILENAME), "  \n")
            .unwrap_or_else(|e| panic!("write failed: {e}"));
        let prompts = PromptSet::load(Some(dir.path()));
        assert_eq!(prompts.metadata, METADATA_SYSTEM_PROMPT);
    }
}

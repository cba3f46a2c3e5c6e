//! Pre-execution checks on generated tool calls.
//!
//! SQL is classified with a small tokenizer rather than a parser: string
//! literals, quoted identifiers, and comments are skipped so keywords are
//! only matched as standalone tokens. A statement is accepted only if it
//! is a single `SELECT`, mentions no blocked verb, is scoped by `WHERE` or
//! `LIMIT`, and ends up with a top-level `LIMIT` no larger than the
//! ceiling. Accepted statements are rewritten deterministically, and
//! sanitizing an already sanitized statement returns it unchanged.
//!
//! Searches are accepted only when they carry query text or a narrowing
//! filter.

use crate::agent::config::AgentConfig;
use crate::agent::tool::ToolInvocation;
use crate::core::{DocumentRef, SearchFilter, SearchMode, SearchRequest};
use crate::error::{GuardrailRule, GuardrailViolation};

/// Default ceiling applied to `LIMIT`.
pub const DEFAULT_LIMIT_CEILING: u64 = 1000;

/// Keywords that may not appear anywhere in a statement.
pub const BLOCKED_VERBS: [&str; 7] = [
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "TRUNCATE", "CREATE",
];

/// What to do with a `SELECT` that has neither `WHERE` nor `LIMIT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingScopePolicy {
    /// Reject the statement so the model adds a scope.
    #[default]
    Reject,
    /// Accept it and append `LIMIT <ceiling>`.
    InjectLimit,
}

impl MissingScopePolicy {
    /// Policy used unless configured otherwise.
    pub const DEFAULT: Self = Self::Reject;

    /// Parses `reject` or `inject`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "reject" => Some(Self::Reject),
            "inject" | "inject_limit" | "inject-limit" => Some(Self::InjectLimit),
            _ => None,
        }
    }
}

/// Rules for SQL tool calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlPolicy {
    /// Largest `LIMIT` allowed; larger values are rewritten down.
    pub limit_ceiling: u64,
    /// Handling of statements without `WHERE` or `LIMIT`.
    pub missing_scope: MissingScopePolicy,
    /// Upper-case keywords rejected as standalone tokens.
    pub blocked_verbs: Vec<String>,
}

impl Default for SqlPolicy {
    fn default() -> Self {
        Self {
            limit_ceiling: DEFAULT_LIMIT_CEILING,
            missing_scope: MissingScopePolicy::DEFAULT,
            blocked_verbs: BLOCKED_VERBS.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Rules for search tool calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchPolicy {
    /// `top_k` used when the model gives none.
    pub default_top_k: usize,
    /// Largest `top_k` allowed; larger values are clamped.
    pub max_top_k: usize,
}

impl Default for SearchPolicy {
    fn default() -> Self {
        Self {
            default_top_k: 10,
            max_top_k: 50,
        }
    }
}

/// Immutable guardrail configuration shared by all turns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuardrailPolicy {
    /// SQL rules.
    pub sql: SqlPolicy,
    /// Search rules.
    pub search: SearchPolicy,
}

/// A SQL statement that passed the guardrail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedSql {
    /// Rewritten statement.
    pub query: String,
    /// Model's stated intent.
    pub explanation: String,
}

/// Tool arguments after validation and rewriting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SanitizedArguments {
    /// A read-only statement for the relational store.
    Sql(SanitizedSql),
    /// A scoped request for the vector store.
    Search(SearchRequest),
}

impl GuardrailPolicy {
    /// Builds the policy from configuration.
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            sql: SqlPolicy {
                limit_ceiling: config.sql_limit_ceiling,
                missing_scope: config.missing_scope_policy,
                ..SqlPolicy::default()
            },
            search: SearchPolicy {
                default_top_k: config.search_top_k,
                max_top_k: config.max_search_top_k,
            },
        }
    }

    /// Validates a decoded tool call against the policy.
    ///
    /// `scope` is the turn's filter; it is merged into every search.
    pub fn validate(
        &self,
        invocation: ToolInvocation,
        scope: &SearchFilter,
    ) -> Result<SanitizedArguments, GuardrailViolation> {
        match invocation {
            ToolInvocation::ExecuteSqlQuery(args) => {
                let query = self.sql.sanitize(&args.query)?;
                Ok(SanitizedArguments::Sql(SanitizedSql {
                    query,
                    explanation: args.explanation,
                }))
            }
            ToolInvocation::HybridSearch(args) => {
                self.scoped(Some(args.query), scope.clone(), args.top_k, SearchMode::Hybrid)
            }
            ToolInvocation::SearchByProject(args) => {
                let mut filter = scope.clone();
                let project = args.project_id.trim();
                if !project.is_empty() && !filter.project_ids.iter().any(|p| p == project) {
                    filter.project_ids.push(project.to_string());
                }
                let mode = args.search_type.unwrap_or_default();
                self.scoped(args.query, filter, args.top_k, mode)
            }
            ToolInvocation::SearchSimilarDocuments(args) => {
                let record_id = args.record_id.trim();
                if record_id.is_empty() {
                    return Err(GuardrailViolation::new(
                        GuardrailRule::UnscopedSearch,
                        "search_similar_documents requires a non-empty record_id",
                    ));
                }
                // The reference chunk anchors the search, so no query or filter is needed.
                Ok(SanitizedArguments::Search(SearchRequest {
                    query: None,
                    filter: scope.clone(),
                    top_k: self.search.clamp_top_k(args.top_k),
                    mode: SearchMode::Semantic,
                    similar_to: Some(record_id.to_string()),
                }))
            }
            ToolInvocation::SearchByDocument(args) => {
                if args.project_id.trim().is_empty() || args.reference_doc_id.trim().is_empty() {
                    return Err(GuardrailViolation::new(
                        GuardrailRule::UnscopedSearch,
                        "search_by_document requires a non-empty project_id and reference_doc_id",
                    ));
                }
                let doc = DocumentRef::new(args.project_id.trim(), args.reference_doc_id.trim());
                let filter = scope.for_document(&doc);
                self.scoped(None, filter, args.top_k, SearchMode::Text)
            }
            ToolInvocation::CompareFilteredDocuments(args) => {
                if args.query.trim().is_empty() {
                    return Err(GuardrailViolation::new(
                        GuardrailRule::UnscopedSearch,
                        "compare_filtered_documents requires a non-empty query",
                    ));
                }
                self.scoped(Some(args.query), scope.clone(), args.top_k, SearchMode::Hybrid)
            }
        }
    }

    fn scoped(
        &self,
        query: Option<String>,
        filter: SearchFilter,
        top_k: Option<usize>,
        mode: SearchMode,
    ) -> Result<SanitizedArguments, GuardrailViolation> {
        let request = SearchRequest {
            query: query
                .map(|q| q.trim().to_string())
                .filter(|q| !q.is_empty()),
            filter,
            top_k: self.search.clamp_top_k(top_k),
            mode,
            similar_to: None,
        };
        if request.query_text().is_none() && !request.filter.has_filters() {
            return Err(GuardrailViolation::new(
                GuardrailRule::UnscopedSearch,
                "search requires a non-empty query or at least one document, project, \
                 or contract type filter",
            ));
        }
        Ok(SanitizedArguments::Search(request))
    }
}

impl SearchPolicy {
    /// Applies the default and clamps to `1..=max_top_k`.
    pub fn clamp_top_k(&self, top_k: Option<usize>) -> usize {
        top_k
            .unwrap_or(self.default_top_k)
            .clamp(1, self.max_top_k.max(1))
    }
}

impl SqlPolicy {
    /// Validates and rewrites one SQL statement.
    ///
    /// Leading and trailing comments and trailing semicolons are dropped.
    /// An oversized top-level `LIMIT` is lowered to the ceiling; a
    /// missing one is appended.
    pub fn sanitize(&self, sql: &str) -> Result<String, GuardrailViolation> {
        let mut tokens = tokenize(sql)?;
        while tokens.last().is_some_and(|t| t.kind == TokenKind::Semicolon) {
            tokens.pop();
        }
        let (Some(first), Some(last)) = (tokens.first(), tokens.last()) else {
            return Err(violation(GuardrailRule::NotSelect, "empty statement"));
        };
        let (start, end) = (first.start, last.end);

        if tokens.iter().any(|t| t.kind == TokenKind::Semicolon) {
            return Err(violation(
                GuardrailRule::MultipleStatements,
                "only one statement is allowed per call",
            ));
        }

        let first_word = first.text(sql);
        if first.kind != TokenKind::Word || !first_word.eq_ignore_ascii_case("SELECT") {
            return Err(violation(
                GuardrailRule::NotSelect,
                format!("only SELECT statements are allowed, found {first_word:?}"),
            ));
        }

        for token in tokens.iter().filter(|t| t.kind == TokenKind::Word) {
            let word = token.text(sql);
            if self
                .blocked_verbs
                .iter()
                .any(|verb| verb.eq_ignore_ascii_case(word))
            {
                return Err(violation(
                    GuardrailRule::BlockedVerb,
                    format!(
                        "statement contains blocked keyword {}",
                        word.to_ascii_uppercase()
                    ),
                ));
            }
        }

        let depths = paren_depths(&tokens).ok_or_else(|| {
            violation(GuardrailRule::Malformed, "unbalanced parentheses")
        })?;

        let is_keyword =
            |t: &Token, kw: &str| t.kind == TokenKind::Word && t.text(sql).eq_ignore_ascii_case(kw);
        let has_where = tokens.iter().any(|t| is_keyword(t, "WHERE"));
        let has_limit = tokens.iter().any(|t| is_keyword(t, "LIMIT"));
        if !has_where && !has_limit && self.missing_scope == MissingScopePolicy::Reject {
            return Err(violation(
                GuardrailRule::MissingScope,
                "missing WHERE/LIMIT: every SELECT must include a WHERE clause or a LIMIT clause",
            ));
        }

        let top_level_limit = tokens
            .iter()
            .enumerate()
            .rev()
            .find(|(i, t)| depths[*i] == 0 && is_keyword(t, "LIMIT"))
            .map(|(i, _)| i);

        let Some(limit_at) = top_level_limit else {
            return Ok(format!("{} LIMIT {}", &sql[start..end], self.limit_ceiling));
        };

        let count = limit_count_token(&tokens, limit_at, sql).ok_or_else(|| {
            violation(
                GuardrailRule::InvalidLimit,
                "LIMIT must end the statement and take non-negative integer literals only",
            )
        })?;
        let value = count.text(sql).parse::<u64>().unwrap_or(u64::MAX);
        if value <= self.limit_ceiling {
            return Ok(sql[start..end].to_string());
        }
        Ok(format!(
            "{}{}{}",
            &sql[start..count.start],
            self.limit_ceiling,
            &sql[count.end..end]
        ))
    }
}

fn violation(rule: GuardrailRule, detail: impl Into<String>) -> GuardrailViolation {
    GuardrailViolation::new(rule, detail)
}

/// Returns the token holding the row count of the `LIMIT` at `at`.
///
/// The clause must end the statement as `LIMIT n`, `LIMIT n OFFSET m`,
/// or `LIMIT offset, n`, with every operand a plain decimal integer.
fn limit_count_token<'t>(tokens: &'t [Token], at: usize, sql: &str) -> Option<&'t Token> {
    let is_integer = |t: &Token| {
        t.kind == TokenKind::Number && t.text(sql).bytes().all(|b| b.is_ascii_digit())
    };
    let is_offset =
        |t: &Token| t.kind == TokenKind::Word && t.text(sql).eq_ignore_ascii_case("OFFSET");
    match tokens.get(at + 1..)? {
        [count] if is_integer(count) => Some(count),
        [count, keyword, offset] if is_integer(count) && is_offset(keyword) && is_integer(offset) => {
            Some(count)
        }
        [offset, comma, count]
            if is_integer(offset) && comma.kind == TokenKind::Comma && is_integer(count) =>
        {
            Some(count)
        }
        _ => None,
    }
}

/// Parenthesis depth of every token, or `None` if unbalanced.
fn paren_depths(tokens: &[Token]) -> Option<Vec<i32>> {
    let mut depth = 0_i32;
    let mut depths = Vec::with_capacity(tokens.len());
    for token in tokens {
        if token.kind == TokenKind::CloseParen {
            depth -= 1;
            if depth < 0 {
                return None;
            }
        }
        depths.push(depth);
        if token.kind == TokenKind::OpenParen {
            depth += 1;
        }
    }
    (depth == 0).then_some(depths)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Word,
    Number,
    Quoted,
    Semicolon,
    OpenParen,
    CloseParen,
    Comma,
    Other,
}

#[derive(Debug, Clone, Copy)]
struct Token {
    kind: TokenKind,
    start: usize,
    end: usize,
}

impl Token {
    fn text<'a>(&self, sql: &'a str) -> &'a str {
        &sql[self.start..self.end]
    }
}

fn tokenize(sql: &str) -> Result<Vec<Token>, GuardrailViolation> {
    let bytes = sql.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        let start = i;
        let kind = match b {
            b if b.is_ascii_whitespace() => {
                i += 1;
                continue;
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                i = bytes[i..]
                    .iter()
                    .position(|&c| c == b'\n')
                    .map_or(bytes.len(), |p| i + p + 1);
                continue;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let close = sql[i + 2..].find("*/").ok_or_else(|| {
                    violation(GuardrailRule::Malformed, "unterminated block comment")
                })?;
                i = i + 2 + close + 2;
                continue;
            }
            b'\'' | b'"' | b'`' => {
                i = skip_quoted(bytes, i)?;
                TokenKind::Quoted
            }
            b';' => {
                i += 1;
                TokenKind::Semicolon
            }
            b'(' => {
                i += 1;
                TokenKind::OpenParen
            }
            b')' => {
                i += 1;
                TokenKind::CloseParen
            }
            b',' => {
                i += 1;
                TokenKind::Comma
            }
            b if b.is_ascii_alphabetic() || b == b'_' => {
                while i < bytes.len()
                    && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_' || bytes[i] == b'$')
                {
                    i += 1;
                }
                TokenKind::Word
            }
            b if b.is_ascii_digit() => {
                // Hex, exponent, and digit-separator forms stay one token.
                i += 1;
                while i < bytes.len() {
                    let c = bytes[i];
                    let exponent_sign =
                        matches!(c, b'+' | b'-') && matches!(bytes[i - 1], b'e' | b'E');
                    if !(c.is_ascii_alphanumeric() || matches!(c, b'.' | b'_') || exponent_sign) {
                        break;
                    }
                    i += 1;
                }
                TokenKind::Number
            }
            _ => {
                i += 1;
                while i < bytes.len() && !sql.is_char_boundary(i) {
                    i += 1;
                }
                TokenKind::Other
            }
        };
        tokens.push(Token {
            kind,
            start,
            end: i,
        });
    }

    Ok(tokens)
}

/// Skips a quoted literal or identifier starting at `start`; a doubled
/// quote inside is an escape. Returns the index after the closing quote.
fn skip_quoted(bytes: &[u8], start: usize) -> Result<usize, GuardrailViolation> {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        if bytes[i] == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return Ok(i + 1);
        }
        i += 1;
    }
    Err(violation(
        GuardrailRule::Malformed,
        "unterminated quoted literal",
    ))
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::agent::tool::{
        CompareDocumentsArgs, DocumentSearchArgs, HybridSearchArgs, ProjectSearchArgs,
        SimilarDocumentsArgs, SqlQueryArgs,
    };
    use proptest::prelude::*;
    use test_case::test_case;

    fn sanitize(sql: &str) -> Result<String, GuardrailViolation> {
        SqlPolicy::default().sanitize(sql)
    }

    #[test_case(
        "SELECT * FROM contract_asmd LIMIT 5000",
        "SELECT * FROM contract_asmd LIMIT 1000" ; "caps oversized limit")]
    #[test_case(
        "SELECT COUNT(*) FROM contract_asmd WHERE contract_type = 'Service Agreement'",
        "SELECT COUNT(*) FROM contract_asmd WHERE contract_type = 'Service Agreement' LIMIT 1000" ; "injects ceiling")]
    #[test_case(
        "select id from t where a = 1;",
        "select id from t where a = 1 LIMIT 1000" ; "strips trailing semicolon")]
    #[test_case(
        "SELECT updated_at, created_by, dropped FROM t LIMIT 10",
        "SELECT updated_at, created_by, dropped FROM t LIMIT 10" ; "verbs inside identifiers")]
    #[test_case(
        "SELECT * FROM t WHERE note = 'please DELETE this' LIMIT 5",
        "SELECT * FROM t WHERE note = 'please DELETE this' LIMIT 5" ; "verb inside string literal")]
    #[test_case(
        "SELECT \"update\" FROM t WHERE id = 1",
        "SELECT \"update\" FROM t WHERE id = 1 LIMIT 1000" ; "verb as quoted identifier")]
    #[test_case(
        "SELECT * FROM (SELECT * FROM t LIMIT 5000) s WHERE s.x = 1",
        "SELECT * FROM (SELECT * FROM t LIMIT 5000) s WHERE s.x = 1 LIMIT 1000" ; "subquery limit is not top level")]
    #[test_case(
        "SELECT * FROM t LIMIT 10 OFFSET 20",
        "SELECT * FROM t LIMIT 10 OFFSET 20" ; "limit with offset")]
    #[test_case(
        "SELECT * FROM t LIMIT 20, 5000",
        "SELECT * FROM t LIMIT 20, 1000" ; "offset comma count form")]
    #[test_case(
        "-- leading comment\nSELECT * FROM t WHERE a = 1 -- trailing",
        "SELECT * FROM t WHERE a = 1 LIMIT 1000" ; "comments outside statement dropped")]
    #[test_case(
        "SELECT * FROM t LIMIT 99999999999999999999999",
        "SELECT * FROM t LIMIT 1000" ; "overflowing limit")]
    #[test_case(
        "SELECT * FROM t WHERE flags = 0x1F AND ratio > 1e-3",
        "SELECT * FROM t WHERE flags = 0x1F AND ratio > 1e-3 LIMIT 1000" ; "hex and exponent literals in where")]
    fn test_accepts(input: &str, expected: &str) {
        let out = sanitize(input).unwrap_or_else(|e| panic!("rejected {input:?}: {e}"));
        assert_eq!(out, expected);
    }

    #[test_case("SELECT * FROM contract_asmd", GuardrailRule::MissingScope ; "missing where and limit")]
    #[test_case("", GuardrailRule::NotSelect ; "empty")]
    #[test_case("  ;  ", GuardrailRule::NotSelect ; "only semicolon")]
    #[test_case("DELETE FROM t WHERE id = 1", GuardrailRule::NotSelect ; "delete statement")]
    #[test_case("WITH x AS (SELECT 1) SELECT * FROM x LIMIT 1", GuardrailRule::NotSelect ; "cte")]
    #[test_case("SELECT * FROM t WHERE id = 1; DROP TABLE t", GuardrailRule::MultipleStatements ; "stacked statement")]
    #[test_case("SELECT * FROM t WHERE id = 1 OR drop = 1", GuardrailRule::BlockedVerb ; "standalone drop")]
    #[test_case("select create from t limit 1", GuardrailRule::BlockedVerb ; "lowercase create")]
    #[test_case("SELECT * FROM t WHERE a = 'oops", GuardrailRule::Malformed ; "unterminated literal")]
    #[test_case("SELECT * FROM t WHERE a = 1 /* open", GuardrailRule::Malformed ; "unterminated comment")]
    #[test_case("SELECT * FROM t WHERE (a = 1", GuardrailRule::Malformed ; "unbalanced paren")]
    #[test_case("SELECT * FROM t LIMIT ALL", GuardrailRule::InvalidLimit ; "limit all")]
    #[test_case("SELECT * FROM t LIMIT -1", GuardrailRule::InvalidLimit ; "negative limit")]
    #[test_case("SELECT * FROM t LIMIT 2.5", GuardrailRule::InvalidLimit ; "fractional limit")]
    #[test_case("SELECT * FROM t LIMIT", GuardrailRule::InvalidLimit ; "dangling limit")]
    #[test_case("SELECT * FROM t LIMIT 0x10000", GuardrailRule::InvalidLimit ; "hex limit")]
    #[test_case("SELECT * FROM t LIMIT 1e4", GuardrailRule::InvalidLimit ; "exponent limit")]
    #[test_case("SELECT * FROM t LIMIT 1_0000", GuardrailRule::InvalidLimit ; "digit separator limit")]
    #[test_case("SELECT * FROM t LIMIT 1 + 5000", GuardrailRule::InvalidLimit ; "sum limit")]
    #[test_case("SELECT * FROM t LIMIT 1*5000", GuardrailRule::InvalidLimit ; "product limit")]
    #[test_case("SELECT * FROM t LIMIT 10 OFFSET 0x10", GuardrailRule::InvalidLimit ; "hex offset")]
    #[test_case("SELECT * FROM t LIMIT 5, 1 + 5000", GuardrailRule::InvalidLimit ; "comma form with expression")]
    #[test_case("SELECT * FROM t LIMIT 10 OFFSET 2 * 3", GuardrailRule::InvalidLimit ; "offset expression")]
    fn test_rejects(input: &str, rule: GuardrailRule) {
        match sanitize(input) {
            Err(v) => assert_eq!(v.rule, rule, "{input:?}: {}", v.detail),
            Ok(out) => panic!("accepted {input:?} as {out:?}"),
        }
    }

    #[test]
    fn test_missing_scope_detail() {
        let err = sanitize("SELECT * FROM contract_asmd")
            .err()
            .unwrap_or_else(|| panic!("expected rejection"));
        assert!(err.detail.starts_with("missing WHERE/LIMIT"));
    }

    #[test]
    fn test_inject_policy_accepts_unscoped() {
        let policy = SqlPolicy {
            missing_scope: MissingScopePolicy::InjectLimit,
            ..SqlPolicy::default()
        };
        let out = policy
            .sanitize("SELECT * FROM contract_asmd")
            .unwrap_or_else(|e| panic!("rejected: {e}"));
        assert_eq!(out, "SELECT * FROM contract_asmd LIMIT 1000");
    }

    #[test]
    fn test_custom_ceiling() {
        let policy = SqlPolicy {
            limit_ceiling: 50,
            ..SqlPolicy::default()
        };
        let out = policy
            .sanitize("SELECT * FROM t LIMIT 51")
            .unwrap_or_else(|e| panic!("rejected: {e}"));
        assert_eq!(out, "SELECT * FROM t LIMIT 50");
    }

    #[test]
    fn test_missing_scope_policy_parse() {
        assert_eq!(MissingScopePolicy::parse("Reject"), Some(MissingScopePolicy::Reject));
        assert_eq!(
            MissingScopePolicy::parse("inject"),
            Some(MissingScopePolicy::InjectLimit)
        );
        assert_eq!(MissingScopePolicy::parse("maybe"), None);
    }

    fn policy() -> GuardrailPolicy {
        GuardrailPolicy::default()
    }

    #[test]
    fn test_validate_sql_invocation() {
        let inv = ToolInvocation::ExecuteSqlQuery(SqlQueryArgs {
            query: "SELECT * FROM contract_asmd LIMIT 5000".to_string(),
            explanation: "all rows".to_string(),
        });
        match policy().validate(inv, &SearchFilter::default()) {
            Ok(SanitizedArguments::Sql(sql)) => {
                assert_eq!(sql.query, "SELECT * FROM contract_asmd LIMIT 1000");
                assert_eq!(sql.explanation, "all rows");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_unscoped_search_rejected() {
        let inv = ToolInvocation::HybridSearch(HybridSearchArgs {
            query: "   ".to_string(),
            top_k: None,
        });
        let err = policy()
            .validate(inv, &SearchFilter::default())
            .err()
            .unwrap_or_else(|| panic!("expected rejection"));
        assert_eq!(err.rule, GuardrailRule::UnscopedSearch);
    }

    #[test]
    fn test_blank_query_with_turn_filter_accepted() {
        let scope = SearchFilter {
            contract_types: vec!["Lease".to_string()],
            ..SearchFilter::default()
        };
        let inv = ToolInvocation::HybridSearch(HybridSearchArgs {
            query: String::new(),
            top_k: Some(500),
        });
        match policy().validate(inv, &scope) {
            Ok(SanitizedArguments::Search(req)) => {
                assert!(req.query.is_none());
                assert_eq!(req.top_k, 50);
                assert_eq!(req.filter.contract_types, vec!["Lease"]);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_project_search_adds_project_filter() {
        let inv = ToolInvocation::SearchByProject(ProjectSearchArgs {
            project_id: "p9".to_string(),
            query: None,
            search_type: None,
            top_k: None,
        });
        match policy().validate(inv, &SearchFilter::default()) {
            Ok(SanitizedArguments::Search(req)) => {
                assert_eq!(req.filter.project_ids, vec!["p9"]);
                assert_eq!(req.top_k, 10);
                assert_eq!(req.mode, SearchMode::Hybrid);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_project_search_honours_search_type() {
        let inv = ToolInvocation::SearchByProject(ProjectSearchArgs {
            project_id: "p9".to_string(),
            query: Some("late fees".to_string()),
            search_type: Some(SearchMode::Text),
            top_k: Some(3),
        });
        match policy().validate(inv, &SearchFilter::default()) {
            Ok(SanitizedArguments::Search(req)) => {
                assert_eq!(req.mode, SearchMode::Text);
                assert_eq!(req.query_text(), Some("late fees"));
                assert!(req.similar_to.is_none());
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_similar_documents_keeps_turn_scope() {
        let scope = SearchFilter {
            project_ids: vec!["p1".to_string()],
            ..SearchFilter::default()
        };
        let inv = ToolInvocation::SearchSimilarDocuments(SimilarDocumentsArgs {
            record_id: " p1-r1-12 ".to_string(),
            top_k: Some(900),
        });
        match policy().validate(inv, &scope) {
            Ok(SanitizedArguments::Search(req)) => {
                assert_eq!(req.similar_to.as_deref(), Some("p1-r1-12"));
                assert_eq!(req.mode, SearchMode::Semantic);
                assert_eq!(req.filter.project_ids, vec!["p1"]);
                assert_eq!(req.top_k, 50);
                assert!(req.query.is_none());
            }
            other => panic!("unexpected: {other:?}"),
        }

        let inv = ToolInvocation::SearchSimilarDocuments(SimilarDocumentsArgs {
            record_id: "  ".to_string(),
            top_k: None,
        });
        let err = policy()
            .validate(inv, &SearchFilter::default())
            .err()
            .unwrap_or_else(|| panic!("expected rejection"));
        assert_eq!(err.rule, GuardrailRule::UnscopedSearch);
    }

    #[test]
    fn test_document_search_requires_ids() {
        let inv = ToolInvocation::SearchByDocument(DocumentSearchArgs {
            project_id: "p1".to_string(),
            reference_doc_id: " ".to_string(),
            top_k: None,
        });
        assert!(policy().validate(inv, &SearchFilter::default()).is_err());

        let inv = ToolInvocation::SearchByDocument(DocumentSearchArgs {
            project_id: "p1".to_string(),
            reference_doc_id: "r1".to_string(),
            top_k: None,
        });
        match policy().validate(inv, &SearchFilter::default()) {
            Ok(SanitizedArguments::Search(req)) => {
                assert_eq!(req.filter.documents.len(), 1);
                assert_eq!(req.mode, SearchMode::Text);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_compare_requires_query() {
        let inv = ToolInvocation::CompareFilteredDocuments(CompareDocumentsArgs {
            query: String::new(),
            top_k: None,
        });
        assert!(policy().validate(inv, &SearchFilter::default()).is_err());
    }

    const FRAGMENTS: &[&str] = &[
        "SELECT", "select", "*", "id", "FROM", "contract_asmd", "WHERE", "where", "LIMIT",
        "limit", "5000", "10", "=", "'x'", "'it''s'", "(", ")", ",", "OFFSET", "updated_at",
        "\"delete\"", "--c\n", "/* c */", "AND", ";",
    ];

    fn sql_strategy() -> impl Strategy<Value = String> {
        prop::collection::vec(prop::sample::select(FRAGMENTS), 1..14)
            .prop_map(|parts| parts.join(" "))
    }

    proptest! {
        #[test]
        fn prop_sanitize_is_idempotent(sql in sql_strategy()) {
            if let Ok(once) = sanitize(&sql) {
                let twice = sanitize(&once);
                prop_assert_eq!(twice, Ok(once));
            }
        }

        #[test]
        fn prop_limit_never_exceeds_ceiling(n in 0_u64..10_000_000) {
            let out = sanitize(&format!("SELECT * FROM contract_asmd LIMIT {n}"))
                .unwrap_or_default();
            prop_assert_eq!(out, format!("SELECT * FROM contract_asmd LIMIT {}", n.min(1000)));
        }

        #[test]
        fn prop_blocked_verb_always_rejected(
            verb in prop::sample::select(BLOCKED_VERBS.to_vec()),
            lower in any::<bool>(),
        ) {
            let verb = if lower { verb.to_ascii_lowercase() } else { verb.to_string() };
            let sql = format!("SELECT * FROM t WHERE id = 1 AND {verb} LIMIT 5");
            let verdict = sanitize(&sql);
            prop_assert_eq!(verdict.err().map(|v| v.rule), Some(GuardrailRule::BlockedVerb));
        }

        #[test]
        fn prop_unscoped_select_rejected(table in "[a-z_]{1,12}") {
            prop_assume!(!["where", "limit"].contains(&table.as_str()));
            prop_assume!(!BLOCKED_VERBS.iter().any(|v| v.eq_ignore_ascii_case(&table)));
            let verdict = sanitize(&format!("SELECT * FROM {table}"));
            prop_assert_eq!(verdict.err().map(|v| v.rule), Some(GuardrailRule::MissingScope));
        }
    }
}

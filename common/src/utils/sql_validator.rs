//! SQL statement validator.
//!
//! Pattern based security checks applied to raw statement text before it
//! reaches an engine. This is not a SQL parser: the checks are heuristics and
//! crafted input can evade them.

use std::sync::LazyLock;

use regex::Regex;

use crate::errors::{AppError, AppResult};
use crate::models::{AccessPolicy, DatabaseConfig};

/// Maximum number of subqueries (`SELECT` occurrences minus one).
pub const MAX_SUBQUERIES: usize = 5;
/// Maximum number of `JOIN` occurrences.
pub const MAX_JOINS: usize = 10;
/// Maximum statement length in characters.
pub const MAX_QUERY_LENGTH: usize = 50_000;

const REDACTED: &str = "[REDACTED]";

/// Denylisted fragments, matched against the upper-cased statement.
const DANGEROUS_PATTERNS: [(&str, &str); 11] = [
    ("--", "SQL comments"),
    (";--", "SQL injection attempts"),
    ("/*", "SQL block comments"),
    ("*/", "SQL block comments"),
    ("EXEC(", "dynamic SQL execution"),
    ("EXECUTE(", "dynamic SQL execution"),
    ("SP_", "system stored procedures"),
    ("XP_", "extended stored procedures"),
    ("LOAD_FILE", "file system access"),
    ("INTO OUTFILE", "file system access"),
    ("INTO DUMPFILE", "file system access"),
];

/// Qualifiers that are schemas rather than user databases.
const SYSTEM_SCHEMAS: [&str; 6] = [
    "information_schema",
    "performance_schema",
    "sys",
    "mysql",
    "pg_catalog",
    "public",
];

/// Short tokens treated as table aliases.
const COMMON_ALIASES: [&str; 10] = ["u", "o", "p", "t", "t1", "t2", "t3", "a", "b", "c"];

/// Fragments rejected inside a table name.
const TABLE_NAME_DENYLIST: [&str; 11] = [
    ";", "--", "/*", "*/", "'", "\"", "\\", "DROP", "DELETE", "UPDATE", "INSERT",
];

static USE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|\s*;\s*)USE\s+([a-zA-Z_][a-zA-Z0-9_]*)\s*(?:;|$|\s)")
        .expect("valid USE regex")
});

static QUALIFIED_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b([a-zA-Z_][a-zA-Z0-9_]*)\s*\.\s*[a-zA-Z_][a-zA-Z0-9_]*(?:\s|$|,|\)|;)")
        .expect("valid qualified-name regex")
});

/// Validates SQL statements against the access policy and the denylist.
#[derive(Debug, Clone)]
pub struct SqlValidator {
    policy: AccessPolicy,
    secrets: Vec<String>,
}

impl SqlValidator {
    /// Creates a validator for the given configuration.
    pub fn new(config: &DatabaseConfig) -> Self {
        Self::with_policy(
            config.access_policy(),
            config.secrets().iter().map(|s| s.to_string()).collect(),
        )
    }

    /// Creates a validator from an explicit policy and the values to redact.
    pub fn with_policy(policy: AccessPolicy, secrets: Vec<String>) -> Self {
        Self { policy, secrets }
    }

    /// Returns the access policy.
    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    /// Runs database access, basic safety and complexity checks, stopping at
    /// the first failure.
    pub fn validate(&self, query: &str) -> AppResult<()> {
        self.validate_database_access(query)?;
        Self::validate_basic_safety(query)?;
        Self::validate_complexity(query)?;
        Ok(())
    }

    /// Rejects `USE` directives and qualified names that point at databases
    /// outside the policy.
    pub fn validate_database_access(&self, query: &str) -> AppResult<()> {
        let normalized = query.trim().to_uppercase();
        for caps in USE_PATTERN.captures_iter(&normalized) {
            let name = caps[1].to_lowercase();
            self.check_allowed(&name)?;
        }

        for caps in QUALIFIED_PATTERN.captures_iter(query) {
            let name = caps[1].to_lowercase();
            if SYSTEM_SCHEMAS.iter().any(|s| *s == name)
                || COMMON_ALIASES.iter().any(|a| *a == name)
            {
                continue;
            }
            self.check_allowed(&name)?;
        }
        Ok(())
    }

    /// Rejects empty statements, denylisted fragments and stacked statements.
    pub fn validate_basic_safety(query: &str) -> AppResult<()> {
        let normalized = query.trim().to_uppercase();
        if normalized.is_empty() {
            return Err(AppError::Validation("query cannot be empty".into()));
        }
        for (pattern, description) in DANGEROUS_PATTERNS {
            if normalized.contains(pattern) {
                return Err(AppError::Validation(format!(
                    "potentially dangerous pattern detected ({description}): {pattern}"
                )));
            }
        }
        if has_stacked_statement(&normalized) {
            return Err(AppError::Validation(
                "potentially dangerous pattern detected (multiple statements): ;".into(),
            ));
        }
        Ok(())
    }

    /// Rejects statements with too many subqueries or joins, or too long.
    pub fn validate_complexity(query: &str) -> AppResult<()> {
        let normalized = query.trim().to_uppercase();

        let subqueries = normalized.matches("SELECT").count().saturating_sub(1);
        if subqueries > MAX_SUBQUERIES {
            return Err(AppError::Validation(format!(
                "query complexity limit exceeded: too many subqueries ({subqueries} > {MAX_SUBQUERIES})"
            )));
        }

        let joins = normalized.matches("JOIN").count();
        if joins > MAX_JOINS {
            return Err(AppError::Validation(format!(
                "query complexity limit exceeded: too many JOINs ({joins} > {MAX_JOINS})"
            )));
        }

        let length = query.chars().count();
        if length > MAX_QUERY_LENGTH {
            return Err(AppError::Validation(format!(
                "query complexity limit exceeded: query too long ({length} characters > {MAX_QUERY_LENGTH})"
            )));
        }
        Ok(())
    }

    /// Validates a table name passed as an identifier.
    pub fn validate_table_name(name: &str) -> AppResult<()> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(AppError::Validation("table name cannot be empty".into()));
        }
        let upper = trimmed.to_uppercase();
        match TABLE_NAME_DENYLIST.iter().find(|d| upper.contains(*d)) {
            Some(danger) => Err(AppError::Validation(format!(
                "table name contains potentially dangerous characters or keywords: {danger}"
            ))),
            None => Ok(()),
        }
    }

    /// Replaces every configured password, username and host occurrence.
    pub fn sanitize(&self, message: &str) -> String {
        self.secrets
            .iter()
            .filter(|s| !s.is_empty())
            .fold(message.to_string(), |msg, secret| msg.replace(secret.as_str(), REDACTED))
    }

    /// Sanitizes the message of an error, keeping its kind.
    pub fn sanitize_error(&self, err: AppError) -> AppError {
        err.map_message(|m| self.sanitize(&m))
    }

    fn check_allowed(&self, database: &str) -> AppResult<()> {
        if self.policy.is_allowed(database) {
            Ok(())
        } else {
            Err(AppError::Validation(format!(
                "access denied: database '{database}' is not in allowed databases list"
            )))
        }
    }
}

/// Whether a `;` outside quoted text is followed by another statement.
/// Trailing semicolons are allowed.
fn has_stacked_statement(query: &str) -> bool {
    let mut quote: Option<char> = None;
    for (idx, ch) in query.char_indices() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"' | '`') => quote = Some(ch),
            (None, ';') => {
                if query[idx + 1..].chars().any(|c| !c.is_whitespace() && c != ';') {
                    return true;
                }
            }
            (None, _) => {}
        }
    }
    false
}

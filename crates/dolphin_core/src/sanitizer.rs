//! Defensive SQL text handling.
//!
//! The injection check is a fixed regex blocklist. It is a heuristic: it misses
//! some attacks and flags some legitimate text (a `#` inside a string literal,
//! for instance). It sits in front of execution, not in place of bound
//! parameters.

use once_cell::sync::Lazy;
use regex::Regex;

/// Patterns checked against the upper-cased statement, in order.
const INJECTION_PATTERNS: [&str; 6] = [
    // tautologies such as OR 1=1, AND '2'='2'
    r#"(\bOR\b|\bAND\b)\s+['"]?\d+['"]?\s*=\s*['"]?\d+"#,
    // statement terminator followed by a destructive verb
    r";\s*(DROP|DELETE|UPDATE|INSERT)\s+",
    // comment markers
    r"--|#|/\*",
    r"\bUNION\b.*\bSELECT\b",
    r"\bEXEC\b|\bEXECUTE\b",
    r"\bXP_CMDSHELL\b",
];

/// Compiled blocklist. A pattern that fails to compile is skipped.
static INJECTION_REGEXES: Lazy<Vec<Regex>> = Lazy::new(|| {
    INJECTION_PATTERNS
        .iter()
        .filter_map(|pattern| match Regex::new(&format!("(?i){pattern}")) {
            Ok(regex) => Some(regex),
            Err(e) => {
                tracing::warn!(pattern, error = %e, "Skipping injection pattern that failed to compile");
                None
            }
        })
        .collect()
});

/// Stateless SQL-safety helpers.
pub struct SqlSanitizer;

impl SqlSanitizer {
    /// Check statement text against the injection blocklist.
    ///
    /// Returns `true` on the first matching pattern.
    pub fn detect_sql_injection(sql: &str) -> bool {
        let upper = sql.to_uppercase();
        INJECTION_REGEXES.iter().any(|regex| regex.is_match(&upper))
    }

    /// Check that a name is safe to interpolate as an identifier.
    ///
    /// Non-empty, does not start with a digit, and only ASCII letters, digits
    /// and underscores.
    pub fn is_valid_identifier(name: &str) -> bool {
        match name.chars().next() {
            None => false,
            Some(first) if first.is_ascii_digit() => false,
            Some(_) => name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'),
        }
    }

    /// Backslash-escape quotes, backslash, NUL, newline, carriage return and tab.
    pub fn escape_string(input: &str) -> String {
        let mut escaped = String::with_capacity(input.len() * 2);
        for c in input.chars() {
            match c {
                '\'' => escaped.push_str("\\'"),
                '"' => escaped.push_str("\\\""),
                '\\' => escaped.push_str("\\\\"),
                '\0' => escaped.push_str("\\0"),
                '\n' => escaped.push_str("\\n"),
                '\r' => escaped.push_str("\\r"),
                '\t' => escaped.push_str("\\t"),
                other => escaped.push(other),
            }
        }
        escaped
    }

    /// Substitute `?` placeholders with escaped, single-quoted parameters.
    ///
    /// Placeholders are filled left to right. Substituted text is never
    /// rescanned, and placeholders beyond the last parameter are left as `?`.
    /// This is textual substitution; its safety rests on
    /// [`escape_string`](Self::escape_string).
    pub fn build_parameterized_query<S: AsRef<str>>(template: &str, params: &[S]) -> String {
        let mut query = String::with_capacity(template.len());
        let mut params = params.iter();
        for c in template.chars() {
            if c == '?' {
                if let Some(param) = params.next() {
                    query.push('\'');
                    query.push_str(&Self::escape_string(param.as_ref()));
                    query.push('\'');
                    continue;
                }
            }
            query.push(c);
        }
        query
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Structural inverse of `escape_string`, used to check the round trip.
    fn unescape(escaped: &str) -> String {
        let mut out = String::new();
        let mut chars = escaped.chars();
        while let Some(c) = chars.next() {
            if c != '\\' {
                out.push(c);
                continue;
            }
            match chars.next() {
                Some('0') => out.push('\0'),
                Some('n') => out.push('\n'),
                Some('r') => out.push('\r'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => out.push('\\'),
            }
        }
        out
    }

    #[test]
    fn test_all_patterns_compile() {
        assert_eq!(INJECTION_REGEXES.len(), INJECTION_PATTERNS.len());
    }

    #[test]
    fn test_detects_tautology() {
        assert!(SqlSanitizer::detect_sql_injection("SELECT * FROM t WHERE id=1 OR 1=1"));
        assert!(SqlSanitizer::detect_sql_injection("select * from t where a = 'x' and '2'='2'"));
    }

    #[test]
    fn test_placeholder_template_is_clean() {
        assert!(!SqlSanitizer::detect_sql_injection("SELECT name FROM users WHERE id = ?"));
        assert!(!SqlSanitizer::detect_sql_injection(
            "UPDATE accounts SET balance = ? WHERE id = ? AND owner = ?"
        ));
    }

    #[test]
    fn test_detects_stacked_and_commented_statements() {
        assert!(SqlSanitizer::detect_sql_injection("SELECT 1; DROP TABLE users"));
        assert!(SqlSanitizer::detect_sql_injection("SELECT 1; delete from users"));
        assert!(SqlSanitizer::detect_sql_injection("SELECT * FROM users -- trailing"));
        assert!(SqlSanitizer::detect_sql_injection("SELECT * FROM users /* hidden */"));
        assert!(SqlSanitizer::detect_sql_injection("SELECT a FROM t UNION ALL SELECT password FROM u"));
        assert!(SqlSanitizer::detect_sql_injection("exec sp_who"));
        assert!(SqlSanitizer::detect_sql_injection("SELECT xp_cmdshell"));
    }

    #[test]
    fn test_heuristic_false_positive_on_quoted_hash() {
        // Known over-blocking: the comment marker is flagged even inside a literal.
        assert!(SqlSanitizer::detect_sql_injection("SELECT * FROM tags WHERE label = '#rust'"));
    }

    #[test]
    fn test_heuristic_misses_non_numeric_tautology() {
        // Known under-blocking: only numeric tautologies are listed.
        assert!(!SqlSanitizer::detect_sql_injection("SELECT * FROM t WHERE name = '' OR 'a'='a'"));
    }

    #[test]
    fn test_identifier_validation() {
        assert!(SqlSanitizer::is_valid_identifier("user_table"));
        assert!(SqlSanitizer::is_valid_identifier("_t2"));
        assert!(!SqlSanitizer::is_valid_identifier("1table"));
        assert!(!SqlSanitizer::is_valid_identifier(""));
        assert!(!SqlSanitizer::is_valid_identifier("users; DROP"));
        assert!(!SqlSanitizer::is_valid_identifier("na`me"));
        assert!(!SqlSanitizer::is_valid_identifier("tablé"));
    }

    #[test]
    fn test_escape_round_trip() {
        let original = "it's a \"quote\" \\ with\0nul\nnew\rret\ttab";
        let escaped = SqlSanitizer::escape_string(original);
        assert!(!escaped.contains('\n'));
        assert!(!escaped.contains('\0'));
        assert_eq!(unescape(&escaped), original);
    }

    #[test]
    fn test_build_parameterized_query() {
        assert_eq!(
            SqlSanitizer::build_parameterized_query("SELECT * FROM t WHERE a=? AND b=?", &["x", "y"]),
            "SELECT * FROM t WHERE a='x' AND b='y'"
        );
    }

    #[test]
    fn test_build_leaves_surplus_placeholders() {
        assert_eq!(
            SqlSanitizer::build_parameterized_query("SELECT * FROM t WHERE a=? AND b=?", &["x"]),
            "SELECT * FROM t WHERE a='x' AND b=?"
        );
    }

    #[test]
    fn test_build_does_not_rescan_parameters() {
        let params = vec!["what?".to_string(), "o'neil".to_string()];
        assert_eq!(
            SqlSanitizer::build_parameterized_query("INSERT INTO q VALUES (?, ?)", &params),
            "INSERT INTO q VALUES ('what?', 'o\\'neil')"
        );
    }
}

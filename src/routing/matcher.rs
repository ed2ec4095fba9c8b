//! Pattern compilation shared by the redirect and MIME override tables.
//!
//! # Design Decisions
//! - Patterns are unanchored regexes; operators anchor with `^`/`$`
//! - A pattern that fails to compile is logged and never matches
//! - Override files can introduce patterns at request time, so compilation
//!   happens per lookup rather than once at startup

use regex::Regex;

/// Compile a rule pattern, logging and discarding it if invalid.
pub fn compile_pattern(pattern: &str, table: &'static str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(regex) => Some(regex),
        Err(e) => {
            tracing::warn!(table, pattern, error = %e, "Ignoring invalid pattern");
            None
        }
    }
}

/// Whether `path` falls under any of `prefixes`, returning the first that does.
///
/// Prefix matching is plain string comparison, checked in order.
pub fn match_prefix<'a, V>(
    routes: impl IntoIterator<Item = (&'a str, V)>,
    path: &str,
) -> Option<(&'a str, V)> {
    routes
        .into_iter()
        .find(|(prefix, _)| path.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_pattern_is_none() {
        assert!(compile_pattern("[", "test").is_none());
        assert!(compile_pattern("^/ok$", "test").is_some());
    }

    #[test]
    fn first_prefix_wins() {
        let routes = [("/app/", 1), ("/app/admin/", 2), ("/", 3)];
        assert_eq!(match_prefix(routes, "/app/admin/x"), Some(("/app/", 1)));
        assert_eq!(match_prefix(routes, "/other"), Some(("/", 3)));
        assert_eq!(match_prefix([("/app", 1)], "/ap"), None);
    }
}

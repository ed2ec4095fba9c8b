//! Regex redirect rules.
//!
//! Temporary rules are evaluated before permanent ones, and only the first
//! matching rule of all is applied.

use crate::config::{RuleMap, ServerConfig};
use crate::protocol::request::Request;
use crate::protocol::status::Status;
use crate::routing::matcher::compile_pattern;

/// A matched redirect, ready to be written as a header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub status: Status,
    pub target: String,
}

/// Find the first matching redirect rule and rewrite `request.path` with it.
///
/// Returns `None` and leaves the request untouched when no rule matches.
pub fn apply_redirects(config: &ServerConfig, request: &mut Request) -> Option<Redirect> {
    let tables = [
        (&config.temp_redirects, Status::RedirectTemporary, "temp_redirects"),
        (&config.perm_redirects, Status::RedirectPermanent, "perm_redirects"),
    ];
    for (rules, status, table) in tables {
        if let Some(rewritten) = first_rewrite(rules, table, &request.path) {
            tracing::debug!(from = %request.path, to = %rewritten, status = status.code(), "Redirect matched");
            let target = if rewritten.contains("://") {
                rewritten.clone()
            } else {
                request.url_with_path(&rewritten)
            };
            request.path = rewritten;
            return Some(Redirect { status, target });
        }
    }
    None
}

fn first_rewrite(rules: &RuleMap<String>, table: &'static str, path: &str) -> Option<String> {
    rules.iter().find_map(|(pattern, replacement)| {
        let regex = compile_pattern(pattern, table)?;
        regex
            .is_match(path)
            .then(|| regex.replace_all(path, replacement.as_str()).into_owned())
    })
}

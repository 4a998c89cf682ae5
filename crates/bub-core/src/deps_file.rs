//! Parses the per-action deps file each command writes at
//! `action.deps_path` (`spec.md` §6, `DEPENDENCIES-<action-number>`).
//!
//! Whitespace-separated tokens, with backslash-newline continuations
//! ignored; if parentheses appear anywhere, only the text inside them is
//! the relevant payload (supports compilers that emit Makefile-like or
//! rule-syntax dependency output).

/// Parse deps-file text into a flat token list (`spec.md` §4.5 step 1,
/// §6).
pub fn parse_deps_file(text: &str) -> Vec<String> {
    let joined = text.replace("\\\r\n", " ").replace("\\\n", " ");
    let payload = if joined.contains('(') {
        extract_parenthesized(&joined)
    } else {
        joined
    };
    payload.split_whitespace().map(str::to_string).collect()
}

fn extract_parenthesized(s: &str) -> String {
    let mut out = String::new();
    let mut depth = 0u32;
    for c in s.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth > 0 => out.push(c),
            _ => {}
        }
    }
    out
}

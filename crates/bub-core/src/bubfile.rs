//! The Bubfile tokenizer and statement parser (`spec.md` §4.2).
//!
//! A Bubfile is whitespace-delimited tokens, `#`-to-end-of-line comments,
//! statement terminator `;`, field separator `:`. `${NAME}` tokens are
//! expanded immediately using the options' variables. Conditional regions
//! `[tag]( … )` include their contents only if `tag` is in the active
//! conditional set; no nesting is supported, and only whitespace is allowed
//! between `]` and `(` for a bracket run to be recognized as a conditional
//! at all (otherwise it is left as ordinary text).

use std::collections::HashSet;
use std::path::Path;

use bub_common::{options::expand_token, Origin};

use crate::error::ConfigError;

/// A single parsed statement: `rule targets : arg1 : arg2 : arg3 : arg4 ;`
/// (`spec.md` §4.2 names the first three args; the concrete rule grammar for
/// `dist-exe`/`test-exe` needs a fourth, so this parser accepts up to four
/// trailing fields and each rule's handler in `planner.rs` validates the
/// count it actually expects).
#[derive(Debug, Clone)]
pub struct Statement {
    pub origin: Origin,
    pub rule: String,
    pub targets: Vec<String>,
    pub args: Vec<Vec<String>>,
}

/// Strip `#`-to-end-of-line comments and resolve `[tag]( … )` conditional
/// regions, preserving every newline's position so downstream line numbers
/// stay accurate.
fn resolve_conditionals_and_comments(
    path: &Path,
    text: &str,
    conditionals: &HashSet<String>,
) -> Result<String, ConfigError> {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '#' {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }
        if c == '[' {
            if let Some((tag, open_paren)) = try_match_conditional_head(&chars, i) {
                match find_matching_paren(&chars, open_paren) {
                    Some(close) => {
                        let keep = conditionals.contains(&tag);
                        if keep {
                            for &c in &chars[i..=open_paren] {
                                out.push(if c == '\n' { '\n' } else { ' ' });
                            }
                            out.extend(&chars[open_paren + 1..close]);
                            out.push(' ');
                        } else {
                            for &c in &chars[i..=close] {
                                out.push(if c == '\n' { '\n' } else { ' ' });
                            }
                        }
                        i = close + 1;
                        continue;
                    }
                    None => {
                        let line = 1 + chars[..i].iter().filter(|&&c| c == '\n').count() as u32;
                        return Err(ConfigError::UnterminatedConditional(
                            Origin::new(path, line),
                            tag,
                        ));
                    }
                }
            }
        }
        out.push(c);
        i += 1;
    }
    Ok(out)
}

/// If `chars[i]` begins `[tag]` followed by only whitespace then `(`,
/// return `(tag, index_of_open_paren)`.
fn try_match_conditional_head(chars: &[char], i: usize) -> Option<(String, usize)> {
    let mut j = i + 1;
    while j < chars.len() && (chars[j].is_alphanumeric() || chars[j] == '-' || chars[j] == '_') {
        j += 1;
    }
    if j == i + 1 || j >= chars.len() || chars[j] != ']' {
        return None;
    }
    let tag: String = chars[i + 1..j].iter().collect();
    let mut k = j + 1;
    while k < chars.len() && chars[k].is_whitespace() {
        k += 1;
    }
    if k < chars.len() && chars[k] == '(' {
        Some((tag, k))
    } else {
        None
    }
}

/// Given the index of an opening `(`, find the index of its matching `)`.
fn find_matching_paren(chars: &[char], open: usize) -> Option<usize> {
    let mut depth = 0i32;
    for (idx, &c) in chars.iter().enumerate().skip(open) {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => {}
        }
    }
    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tok<'a> {
    Word(&'a str),
    Colon,
    Semi,
}

fn tokenize_raw(text: &str) -> Vec<(Tok<'_>, u32)> {
    let mut tokens = Vec::new();
    let mut line: u32 = 1;
    let mut word_start: Option<usize> = None;
    let bytes: Vec<(usize, char)> = text.char_indices().collect();

    let flush_word = |tokens: &mut Vec<(Tok<'_>, u32)>, start: Option<usize>, end: usize, line: u32| {
        if let Some(start) = start {
            if end > start {
                tokens.push((Tok::Word(&text[start..end]), line));
            }
        }
    };

    for &(idx, c) in &bytes {
        if c == '\n' {
            flush_word(&mut tokens, word_start, idx, line);
            word_start = None;
            line += 1;
            continue;
        }
        if c.is_whitespace() {
            flush_word(&mut tokens, word_start, idx, line);
            word_start = None;
            continue;
        }
        if c == ';' || c == ':' {
            flush_word(&mut tokens, word_start, idx, line);
            word_start = None;
            tokens.push((if c == ';' { Tok::Semi } else { Tok::Colon }, line));
            continue;
        }
        if word_start.is_none() {
            word_start = Some(idx);
        }
    }
    flush_word(&mut tokens, word_start, text.len(), line);
    tokens
}

/// Parse a Bubfile's full statement list.
///
/// `lookup` resolves a `${NAME}` fence to its variable's value list, exactly
/// as used by the options loader's own expansion (`spec.md` §4.1, §4.2).
pub fn parse_statements(
    path: &Path,
    text: &str,
    conditionals: &HashSet<String>,
    lookup: &dyn Fn(&str) -> Option<Vec<String>>,
) -> Result<Vec<Statement>, ConfigError> {
    let resolved = resolve_conditionals_and_comments(path, text, conditionals)?;
    let raw_tokens = tokenize_raw(&resolved);

    let mut statements = Vec::new();
    let mut current_fields: Vec<Vec<String>> = vec![Vec::new()];
    let mut stmt_line: Option<u32> = None;

    for (tok, line) in raw_tokens {
        if stmt_line.is_none() {
            if let Tok::Word(_) = tok {
                stmt_line = Some(line);
            }
        }
        match tok {
            Tok::Word(w) => {
                for piece in expand_token(w, lookup) {
                    current_fields.last_mut().unwrap().push(piece);
                }
            }
            Tok::Colon => {
                current_fields.push(Vec::new());
            }
            Tok::Semi => {
                let origin = Origin::new(path, stmt_line.unwrap_or(line));
                statements.push(build_statement(origin, &current_fields)?);
                current_fields = vec![Vec::new()];
                stmt_line = None;
            }
        }
    }

    if current_fields.iter().any(|f| !f.is_empty()) {
        let origin = Origin::new(path, stmt_line.unwrap_or(0));
        return Err(ConfigError::MalformedStatement(
            origin,
            "statement is missing its terminating ';'".to_string(),
        ));
    }

    Ok(statements)
}

fn build_statement(origin: Origin, fields: &[Vec<String>]) -> Result<Statement, ConfigError> {
    let field0 = &fields[0];
    let Some((rule, targets)) = field0.split_first() else {
        return Err(ConfigError::MalformedStatement(
            origin,
            "empty statement before ';'".to_string(),
        ));
    };
    Ok(Statement {
        origin,
        rule: rule.clone(),
        targets: targets.to_vec(),
        args: fields[1..].to_vec(),
    })
}

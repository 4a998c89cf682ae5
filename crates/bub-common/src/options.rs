//! The options file loader (`spec.md` §4.1, §6).
//!
//! The options file is a line-oriented `key = value` store produced by the
//! build-directory bootstrap tool. Keys starting with `.` declare build
//! commands (compile/generate/link, classified by the shape of their output
//! extension list); every other key is a `${NAME}`-expandable variable.

use std::collections::HashMap;
use std::fmt;

use crate::Origin;

const RESERVED_EXTENSIONS: &[&str] = &["obj", "slib", "dlib", "exe"];

/// The three kinds of linked binary a `.slib`/`.dlib`/`.exe` command table
/// entry can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkKind {
    StaticLib,
    DynamicLib,
    Exe,
}

impl LinkKind {
    fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "slib" => Some(Self::StaticLib),
            "dlib" => Some(Self::DynamicLib),
            "exe" => Some(Self::Exe),
            _ => None,
        }
    }
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LinkKind::StaticLib => "slib",
            LinkKind::DynamicLib => "dlib",
            LinkKind::Exe => "exe",
        };
        f.write_str(s)
    }
}

/// A `generate` command table entry: one input extension, many named output
/// suffixes, produced by a single command invocation.
#[derive(Debug, Clone)]
pub struct GenerateCommand {
    pub outputs: Vec<String>,
    pub template: String,
}

#[derive(Debug, thiserror::Error)]
pub enum OptionsError {
    #[error("{0} malformed option line: {1:?}")]
    MalformedLine(Origin, String),

    #[error("{0} build command key {1:?} has no output extension")]
    MissingOutputExtension(Origin, String),

    #[error(
        "{0} reserved output extension {1:?} used outside of its dedicated position in key {2:?}"
    )]
    ReservedExtensionMisuse(Origin, String, String),

    #[error("{0} input extension {1:?} already owns a compile-or-generate command")]
    DuplicateCommandOwner(Origin, String),

    #[error("{0} duplicate link command for {1} input extension {2:?}")]
    DuplicateLinkCommand(Origin, LinkKind, String),

    #[error("{0} duplicate variable definition {1:?}")]
    DuplicateVariable(Origin, String),
}

/// The parsed contents of an options file.
#[derive(Debug, Clone, Default)]
pub struct OptionsFile {
    pub variables: HashMap<String, Vec<String>>,
    pub compile: HashMap<String, String>,
    pub generate: HashMap<String, GenerateCommand>,
    pub link: HashMap<(LinkKind, String), String>,
}

impl OptionsFile {
    /// Parse the line-oriented options file format described in `spec.md` §6.
    pub fn parse(path: &std::path::Path, text: &str) -> Result<Self, OptionsError> {
        let mut opts = OptionsFile::default();

        for (idx, raw_line) in text.lines().enumerate() {
            let line = raw_line.trim();
            let origin = || Origin::new(path, (idx + 1) as u32);

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some(sep) = line.find(" = ") else {
                return Err(OptionsError::MalformedLine(origin(), line.to_string()));
            };
            let key = line[..sep].trim();
            let value = line[sep + 3..].trim();

            if let Some(suffix) = key.strip_prefix('.') {
                opts.add_command(origin(), suffix, value)?;
            } else {
                if opts.variables.contains_key(key) {
                    return Err(OptionsError::DuplicateVariable(origin(), key.to_string()));
                }
                opts.variables.insert(
                    key.to_string(),
                    value.split_whitespace().map(str::to_string).collect(),
                );
            }
        }

        Ok(opts)
    }

    fn add_command(
        &mut self,
        origin: Origin,
        key_suffix: &str,
        template: &str,
    ) -> Result<(), OptionsError> {
        let parts: Vec<&str> = key_suffix.split('.').collect();
        let Some((input_ext, outputs)) = parts.split_first() else {
            return Err(OptionsError::MissingOutputExtension(
                origin,
                format!(".{key_suffix}"),
            ));
        };
        if outputs.is_empty() {
            return Err(OptionsError::MissingOutputExtension(
                origin,
                format!(".{key_suffix}"),
            ));
        }
        let input_ext = (*input_ext).to_string();

        if outputs.len() == 1 {
            if let Some(kind) = LinkKind::from_extension(outputs[0]) {
                let k = (kind, input_ext.clone());
                if self.link.contains_key(&k) {
                    return Err(OptionsError::DuplicateLinkCommand(origin, kind, input_ext));
                }
                self.link.insert(k, template.to_string());
                return Ok(());
            }
            if outputs[0] == "obj" {
                self.claim_input_ext(&origin, &input_ext)?;
                self.compile.insert(input_ext, template.to_string());
                return Ok(());
            }
        }

        // Otherwise: a generate command. None of its outputs may be reserved.
        for out in outputs {
            if RESERVED_EXTENSIONS.contains(out) {
                return Err(OptionsError::ReservedExtensionMisuse(
                    origin,
                    (*out).to_string(),
                    format!(".{key_suffix}"),
                ));
            }
        }
        self.claim_input_ext(&origin, &input_ext)?;
        self.generate.insert(
            input_ext,
            GenerateCommand {
                outputs: outputs.iter().map(|s| s.to_string()).collect(),
                template: template.to_string(),
            },
        );
        Ok(())
    }

    /// Enforce "an input extension may own at most one compile-or-generate
    /// command" (`spec.md` §4.1).
    fn claim_input_ext(&self, origin: &Origin, input_ext: &str) -> Result<(), OptionsError> {
        if self.compile.contains_key(input_ext) || self.generate.contains_key(input_ext) {
            return Err(OptionsError::DuplicateCommandOwner(
                origin.clone(),
                input_ext.to_string(),
            ));
        }
        Ok(())
    }

    pub fn variable(&self, name: &str) -> Option<&[String]> {
        self.variables.get(name).map(Vec::as_slice)
    }
}

/// Expand a command template using `${NAME}` substitution (`spec.md` §4.1).
///
/// The template is tokenised on whitespace; each token is expanded
/// independently via [`expand_token`], and the results are flattened back
/// into a single token stream (this is what lets a single `${LIBS}`
/// occurrence spread across many tokens on the final command line).
pub fn expand_command(template: &str, lookup: &dyn Fn(&str) -> Option<Vec<String>>) -> Vec<String> {
    template
        .split_whitespace()
        .flat_map(|tok| expand_token(tok, lookup))
        .collect()
}

/// Expand every `${NAME}` fence within a single whitespace-delimited token.
///
/// A token with no fence is emitted unchanged. A token with a fence is
/// expanded once per value in the variable's value list (their
/// cartesian product, if a token somehow contains more than one fence);
/// an undefined variable name has no values, so the expansion of that token
/// is empty.
pub fn expand_token(token: &str, lookup: &dyn Fn(&str) -> Option<Vec<String>>) -> Vec<String> {
    let Some(start) = token.find("${") else {
        return vec![token.to_string()];
    };
    let Some(end_rel) = token[start..].find('}') else {
        return vec![token.to_string()];
    };
    let end = start + end_rel;
    let prefix = &token[..start];
    let name = &token[start + 2..end];
    let suffix = &token[end + 1..];

    let values = lookup(name).unwrap_or_default();
    let rest = expand_token(suffix, lookup);

    values
        .iter()
        .flat_map(|v| rest.iter().map(move |r| format!("{prefix}{v}{r}")))
        .collect()
}

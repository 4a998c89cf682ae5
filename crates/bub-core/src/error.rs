//! The error taxonomy (`spec.md` §7): `ConfigError`, `RuleViolation`,
//! `UnknownEntity`, `ActionFailure`, `SchedulerInvariant`. Config/Rule/Unknown
//! errors during planning are fatal and carry an [`Origin`] so they print with
//! the `<path>|<line>| ERROR:` prefix; `ActionFailure` cancels the build
//! cooperatively; `SchedulerInvariant` is an internal-consistency abort.

use std::path::PathBuf;

use bub_common::Origin;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} {1}")]
    Options(Origin, #[source] bub_common::OptionsError),

    #[error("{0} unrecognized rule {1:?}")]
    UnknownRule(Origin, String),

    #[error("{0} rule {1:?} expects {2} field(s), got {3}")]
    WrongFieldCount(Origin, String, usize, usize),

    #[error("{0} malformed statement: {1:?}")]
    MalformedStatement(Origin, String),

    #[error("{0} unterminated conditional region starting with [{1}](")]
    UnterminatedConditional(Origin, String),

    #[error("{0} expected '(' after conditional tag, found {1:?}")]
    ExpectedConditionalOpen(Origin, String),
}

#[derive(Debug, thiserror::Error)]
pub enum RuleViolation {
    #[error("{0} node name {1:?} is not path-atomic or is empty")]
    MalformedNodeName(Origin, String),

    #[error("{0} duplicate trail {1:?}")]
    DuplicateTrail(Origin, String),

    #[error(
        "{origin} visibility violation: {dependent} may not depend on {dependency} \
        (not visible from common ancestor {common_ancestor})"
    )]
    VisibilityBreach {
        origin: Origin,
        dependent: String,
        dependency: String,
        common_ancestor: String,
    },

    #[error("{0} circular reference detected, walk exceeded depth {1} starting at {2:?}")]
    CircularReference(Origin, usize, String),

    #[error("{0} forward reference: {1:?} (number {2}) may not depend on {3:?} (number {4})")]
    ForwardReference(Origin, String, u64, String, u64),

    #[error(
        "{0} {1:?} may not depend on {2:?}: dependent's package is a descendant of dependency's package"
    )]
    PackageDescendantDependency(Origin, String, String),

    #[error("{0} file {1:?} is already used by binary {2:?}, cannot also be used by {3:?}")]
    SourceReused(Origin, String, String, String),

    #[error(
        "{0} binary {1:?} mixes incompatible source extensions: {2:?} is not in the \
        same language family as the binary's extension signature {3:?}"
    )]
    MismatchedSourceExtension(Origin, String, String, String),

    #[error(
        "{0} dynamic-lib {1:?} requires static-lib {2:?}, but it is not packaged into any \
        earlier dynamic-lib -- a dynamic-lib's augmentation may not add new static-lib link \
        dependencies"
    )]
    DynamicLibRequiresUnpackagedStaticLib(Origin, String, String),

    #[error("{0} dynamic-lib {1:?} and dynamic-lib {2:?} both contain static-lib {3:?}")]
    DynamicLibContentOverlap(Origin, String, String, String),
}

#[derive(Debug, thiserror::Error)]
pub enum UnknownEntity {
    #[error("{0} {1:?} includes unknown in-project file {2:?}")]
    UnknownInclude(Origin, String, String),

    #[error("{0} reference to undefined static-lib trail {1:?}")]
    UnknownStaticLibTrail(Origin, String),

    #[error("{0} reference to undefined node {1:?}")]
    UnknownNode(Origin, String),

    /// Downgrade case: a cached dependency path does not resolve to a known
    /// File. `spec.md` §4.4/§7 says to mark the consuming action maximally
    /// dirty and continue, not to abort planning.
    #[error("cached dependency {0:?} for output {1:?} does not resolve to a known file; marking dirty")]
    UnknownCachedDependency(String, PathBuf),
}

#[derive(Debug, thiserror::Error)]
pub enum ActionFailure {
    #[error("action {action_name:?} failed (exit {exit_code:?}):\n{stderr}")]
    NonZeroExit {
        action_name: String,
        exit_code: Option<i32>,
        stderr: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum SchedulerInvariant {
    #[error(
        "deadlock detected: all {idle_workers} worker(s) idle, {outstanding} file(s) still \
        outstanding, and no action was dispatched this round"
    )]
    Deadlock {
        idle_workers: usize,
        outstanding: usize,
    },
}

/// The top-level error type returned by the Planner.
#[derive(Debug, thiserror::Error)]
pub enum BubError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Rule(#[from] RuleViolation),
    #[error(transparent)]
    Unknown(#[from] UnknownEntity),
    #[error(transparent)]
    Action(#[from] ActionFailure),
    #[error(transparent)]
    Scheduler(#[from] SchedulerInvariant),
    #[error("{0}")]
    Io(String),
}

impl From<std::io::Error> for BubError {
    fn from(e: std::io::Error) -> Self {
        BubError::Io(e.to_string())
    }
}

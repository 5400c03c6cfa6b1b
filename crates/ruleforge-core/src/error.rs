use thiserror::Error;

use crate::target::TargetLabel;

/// The error kinds produced by the rule graph engine.
///
/// Each variant corresponds to one of the error classes in the failure design:
/// user input, configuration, rule construction, graph, rule-key hashing,
/// build execution, remote execution and cache errors.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("unresolvable target `{0}`")]
    UnresolvableTarget(TargetLabel),

    #[error("duplicate target `{0}` declared more than once")]
    DuplicateTarget(TargetLabel),

    #[error("malformed target pattern: {0}")]
    MalformedPattern(String),

    #[error("no input file `{path}` required by target `{target}`")]
    MissingInputFile { target: TargetLabel, path: String },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("rule `{target}` refused its arguments: {reason}")]
    RuleConstruction { target: TargetLabel, reason: String },

    #[error("dependency cycle detected: {0}")]
    Cycle(String),

    #[error("target `{referrer}` depends on unresolved target `{reference}`")]
    MissingDependency {
        referrer: TargetLabel,
        reference: TargetLabel,
    },

    #[error("rule `{target}` field `{field}` cannot be hashed: {reason}")]
    RuleKeyHashing {
        target: TargetLabel,
        field: String,
        reason: String,
    },

    #[error("build of `{target}` failed: {reason}")]
    BuildExecution { target: TargetLabel, reason: String },

    #[error("remote execution of `{target}` failed after {attempts} attempts: {reason}")]
    RemoteExecution {
        target: TargetLabel,
        attempts: u32,
        reason: String,
    },

    #[error("artifact cache error: {0}")]
    Cache(String),

    #[error("build was cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, BuildError>;

/// A report of every originating failure in a build, not just the first one observed.
#[derive(Debug, Default)]
pub struct ErrorReport {
    failures: Vec<(TargetLabel, BuildError)>,
}

impl ErrorReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, target: TargetLabel, error: BuildError) {
        self.failures.push((target, error));
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failures(&self) -> &[(TargetLabel, BuildError)] {
        &self.failures
    }
}

impl std::fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (target, err) in &self.failures {
            writeln!(f, "{target}: {err}")?;
        }
        Ok(())
    }
}

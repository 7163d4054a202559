//! Error types for configuration loading, call resolution and execution.

use std::path::PathBuf;

use thiserror::Error;

use crate::call_id::Stage;

/// The configuration tree does not have the shape the pipeline needs.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("missing configuration section: {section}")]
    MissingSection { section: String },

    #[error("{section}.{option}: expected a scalar value, found {found}")]
    NonScalarOption {
        section: String,
        option: String,
        found: &'static str,
    },

    #[error("{section}.positional_args: unknown positional argument '{name}' (expected one of: {expected})")]
    UnknownPositional {
        section: String,
        name: String,
        expected: String,
    },

    #[error("{section} must be a mapping")]
    NotAMapping { section: String },

    #[error("condition_queue is empty")]
    NoConditions,

    #[error("condition name '{0}' is used more than once")]
    DuplicateCondition(String),

    #[error("invalid prgbar_regex: {0}")]
    ProgressPattern(#[from] regex::Error),
}

/// Resolving a stage call failed before any process was launched.
#[derive(Error, Debug)]
pub enum CallError {
    /// Conditions of one group disagree on a value the whole group must share.
    #[error("CHECK YAML CONFIG FILE: Conditions in group {group} do not agree on which \"{option}\" to use: {}", values.join(", "))]
    ConfigurationDisagreement {
        group: String,
        option: String,
        values: Vec<String>,
    },

    /// An upstream output is neither recorded in memory nor present on disk.
    #[error("I could not find an appropriate {file} file. Failed to find: {}", path.display())]
    MissingUpstreamArtifact { file: String, path: PathBuf },

    #[error("{stage} calls are not made for a {subject}")]
    SubjectMismatch { stage: Stage, subject: &'static str },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Running an external program failed.
#[derive(Error, Debug)]
pub enum ExecError {
    #[error("SystemCallError: {program} exited with status {status}\n{stderr}")]
    ProgramFailed {
        program: String,
        status: i32,
        stderr: String,
    },

    #[error("KeyboardInterrupt: {program} was interrupted")]
    Interrupted { program: String },

    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExecError {
    /// Failures after which the run moves on to the next call.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ExecError::ProgramFailed { .. } | ExecError::Interrupted { .. }
        )
    }
}

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("failed to read template {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("template {} references unknown value '{name}'", path.display())]
    UnknownPlaceholder { path: PathBuf, name: String },
}

//! Call resolution and execution for the tophat -> cufflinks -> cuffmerge ->
//! cuffdiff pipeline.
//!
//! A [`StageCall`] turns the configuration tree, one condition (or one group
//! of conditions) and the outputs of earlier stages into a complete command
//! line. Upstream outputs are found through the run's [`CallRecordStore`],
//! falling back to the on-disk layout under `base_dir` when a record is
//! missing (for example when resuming a run).

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

pub mod call_id;
pub mod calls;
pub mod condition;
pub mod config;
pub mod errors;
pub mod exec;
pub mod interrupt;
pub mod notify;
pub mod options;
pub mod pipeline;
pub mod progress;
pub mod records;
pub mod template;

#[cfg(test)]
pub(crate) mod testing;

pub use call_id::{CallId, Stage};
pub use calls::{CallContext, CallEnv, CallOutcome, CallSubject, StageCall};
pub use condition::{Condition, ConditionGroup, ConditionSet};
pub use config::{load_config, Config, ConfigValue, EmailInfo, QsubOptions, StageOptions};
pub use errors::{CallError, ConfigError, ExecError, TemplateError};
pub use exec::{Executor, ProgramOutput, SystemExecutor};
pub use interrupt::InterruptGuard;
pub use notify::{CurlSmtpNotifier, LogNotifier, Notifier};
pub use options::{ArgValue, OptionMap};
pub use pipeline::{Pipeline, RunSummary};
pub use progress::ProgressFilter;
pub use records::{CallRecord, CallRecordStore};
pub use template::{PlaceholderTemplate, TemplateRenderer};

/// How a run treats its stage calls once they are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Launch the programs, keep per-call logs and send notifications.
    Analyze,
    /// Print each command line and nothing else.
    DryRun,
    /// Write a batch submission script per call.
    QsubScript,
}

impl RunMode {
    pub fn as_str(self) -> &'static str {
        match self {
            RunMode::Analyze => "analyze",
            RunMode::DryRun => "dry_run",
            RunMode::QsubScript => "qsub_script",
        }
    }
}

pub fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("failed to create {}", path.display()))
}

/// Name of the machine the run is executing on, for notification subjects.
pub fn hostname() -> String {
    system_hostname()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| std::env::var("HOSTNAME").ok())
        .unwrap_or_else(|| "localhost".to_string())
}

#[cfg(unix)]
fn system_hostname() -> Option<String> {
    nix::unistd::gethostname()
        .ok()
        .map(|name| name.to_string_lossy().into_owned())
}

#[cfg(not(unix))]
fn system_hostname() -> Option<String> {
    std::env::var("COMPUTERNAME").ok()
}

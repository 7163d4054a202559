use std::path::{Path, PathBuf};

use tracing::warn;

use super::log::CallLog;
use crate::call_id::CallId;
use crate::config::{Config, ConfigValue, StageOptions};
use crate::errors::CallError;
use crate::options::{ArgValue, OptionMap};
use crate::records::CallRecordStore;
use crate::RunMode;

/// State shared by the stage-specific resolution rules while a call is
/// being constructed.
pub(crate) struct Resolver<'a> {
    pub config: &'a Config,
    pub mode: RunMode,
    pub call_id: &'a CallId,
    pub out_dir: &'a Path,
    pub options: OptionMap,
    stage_options: &'a StageOptions,
    store: &'a CallRecordStore,
    log: Option<&'a CallLog>,
}

impl<'a> Resolver<'a> {
    pub fn new(
        config: &'a Config,
        mode: RunMode,
        call_id: &'a CallId,
        out_dir: &'a Path,
        stage_options: &'a StageOptions,
        store: &'a CallRecordStore,
        log: Option<&'a CallLog>,
    ) -> Self {
        Self {
            config,
            mode,
            call_id,
            out_dir,
            options: OptionMap::from_stage_options(stage_options),
            stage_options,
            store,
            log,
        }
    }

    /// Fills in an option the section marks `from_conditions`. `None` from
    /// `derive` leaves the option out of the command line.
    pub fn option<F>(&mut self, name: &str, derive: F) -> Result<(), CallError>
    where
        F: FnOnce(&Self) -> Result<Option<String>, CallError>,
    {
        if self.stage_options.get(name) != Some(&ConfigValue::FromConditions) {
            return Ok(());
        }
        let value = match derive(&*self)? {
            Some(v) => ArgValue::Value(v),
            None => ArgValue::Switch(false),
        };
        self.options.set(name, value);
        Ok(())
    }

    pub fn positional<F>(&self, name: &str, derive: F) -> Result<String, CallError>
    where
        F: FnOnce(&Self) -> Result<String, CallError>,
    {
        match self.stage_options.positional(name) {
            ConfigValue::FromConditions => derive(self),
            ConfigValue::Literal(v) => Ok(v),
            ConfigValue::Switch(b) => Ok(b.to_string()),
        }
    }

    /// Path of `file_name` inside the output directory of `upstream`.
    ///
    /// Uses the in-memory record when there is one. Otherwise the path is
    /// rebuilt as `<base_dir>/<upstream>/<file_name>`; if nothing is there
    /// the call fails in analyze mode and proceeds with the expected path in
    /// the other modes.
    pub fn upstream_artifact(&self, upstream: &CallId, file_name: &str) -> Result<PathBuf, CallError> {
        if let Some(record) = self.store.lookup(upstream) {
            return Ok(record.out_dir.join(file_name));
        }

        let expected = self
            .config
            .run
            .base_dir
            .join(upstream.to_string())
            .join(file_name);
        warn!(
            call_id = %self.call_id,
            upstream = %upstream,
            path = %expected.display(),
            "no call record in memory; looking in base_dir"
        );
        self.log_msg(&format!(
            "WARNING: unable to find matching {} call record in memory for: {}\nAttempting to find {} in your base_dir.",
            upstream.stage,
            upstream.subject,
            expected.display()
        ))?;

        if expected.exists() || self.mode != RunMode::Analyze {
            return Ok(expected);
        }
        Err(CallError::MissingUpstreamArtifact {
            file: file_name.to_string(),
            path: expected,
        })
    }

    pub fn log_msg(&self, msg: &str) -> Result<(), CallError> {
        if let Some(log) = self.log {
            log.append(msg)?;
        }
        Ok(())
    }
}

use std::fs;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use crate::call_id::{CallId, Stage};
use crate::calls::{CallContext, CallEnv, CallOutcome, CallSubject, StageCall};
use crate::condition::ConditionGroup;
use crate::config::Config;
use crate::interrupt::InterruptGuard;
use crate::records::CallRecordStore;
use crate::RunMode;

/// What a finished run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub run_id: String,
    pub mode: RunMode,
    pub completed: usize,
    /// Calls that failed in a way the run moved past.
    pub recovered: Vec<CallId>,
}

/// Drives every enabled stage over the condition queue, in stage order.
pub struct Pipeline {
    config: Config,
    mode: RunMode,
    records: CallRecordStore,
}

impl Pipeline {
    pub fn new(config: Config, mode: RunMode) -> Self {
        Self {
            config,
            mode,
            records: CallRecordStore::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn records(&self) -> &CallRecordStore {
        &self.records
    }

    /// Call ids the run would make, in the order it would make them.
    pub fn plan(&self) -> Vec<CallId> {
        let groups = self.config.conditions.groups();
        let mut plan = Vec::new();
        for stage in Stage::ALL {
            if !self.config.stage_enabled(stage) {
                continue;
            }
            for subject in subjects(&self.config, &groups, stage) {
                plan.push(CallId::new(stage, subject.name()));
            }
        }
        plan
    }

    pub fn run(&mut self, env: &mut CallEnv<'_>) -> Result<RunSummary> {
        if self.mode == RunMode::QsubScript && self.config.qsub.is_none() {
            bail!("qsub_script mode needs a qsub_options section in the configuration");
        }
        self.prepare()?;
        let _interrupts = match self.mode {
            RunMode::Analyze => Some(InterruptGuard::install()?),
            RunMode::DryRun | RunMode::QsubScript => None,
        };
        info!(run_id = %self.config.run_id, mode = self.mode.as_str(), "starting run");

        let ctx = CallContext::new(&self.config, self.mode);
        let groups = self.config.conditions.groups();
        let mut summary = RunSummary {
            run_id: self.config.run_id.clone(),
            mode: self.mode,
            completed: 0,
            recovered: Vec::new(),
        };

        for stage in Stage::ALL {
            if !self.config.stage_enabled(stage) {
                info!(stage = %stage, "stage disabled; skipping");
                continue;
            }
            for subject in subjects(&self.config, &groups, stage) {
                let mut call = match StageCall::new(&ctx, &mut self.records, stage, subject) {
                    Ok(call) => call,
                    Err(err) => {
                        if self.mode == RunMode::Analyze {
                            let call_id = CallId::new(stage, subject.name());
                            env.report_setup_failure(&ctx.log_dir, &call_id, &err);
                        }
                        return Err(anyhow::Error::new(err)
                            .context(format!("failed to set up {} for {}", stage, subject.name())));
                    }
                };
                match call.execute(env) {
                    CallOutcome::Completed => summary.completed += 1,
                    CallOutcome::Recovered(detail) => {
                        warn!(call_id = %call.call_id(), "recovered from failed call");
                        info!(detail = %detail, "failure detail");
                        summary.recovered.push(call.call_id().clone());
                    }
                    CallOutcome::Fatal(detail) => {
                        bail!("call {} failed: {}", call.call_id(), detail);
                    }
                }
            }
        }

        info!(
            run_id = %summary.run_id,
            completed = summary.completed,
            recovered = summary.recovered.len(),
            "run finished"
        );
        Ok(summary)
    }

    /// Sets up the log directory and keeps a copy of the configuration there.
    fn prepare(&self) -> Result<()> {
        if self.mode != RunMode::Analyze {
            return Ok(());
        }
        let log_dir = self.config.log_dir();
        crate::ensure_dir(&log_dir)?;
        if let Some(source) = &self.config.source {
            let copy = log_dir.join(format!("{}.yaml", self.config.run_id));
            fs::copy(source, &copy).with_context(|| {
                format!("failed to copy {} to {}", source.display(), copy.display())
            })?;
        }
        Ok(())
    }
}

fn subjects<'a>(
    config: &'a Config,
    groups: &'a [ConditionGroup],
    stage: Stage,
) -> Vec<CallSubject<'a>> {
    if stage.is_group_scoped() {
        groups.iter().map(CallSubject::Group).collect()
    } else {
        config.conditions.iter().map(CallSubject::Condition).collect()
    }
}

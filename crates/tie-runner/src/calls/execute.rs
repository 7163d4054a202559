use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::Local;
use tracing::{error, info, warn};

use super::{CallLog, StageCall};
use crate::call_id::CallId;
use crate::config::{Config, EmailInfo, QsubOptions};
use crate::errors::{CallError, ExecError};
use crate::exec::Executor;
use crate::notify::Notifier;
use crate::options::ArgValue;
use crate::progress::ProgressFilter;
use crate::template::TemplateRenderer;
use crate::RunMode;

/// How a call ended. The pipeline keeps going after `Recovered` and stops
/// at `Fatal`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    Completed,
    Recovered(String),
    Fatal(String),
}

/// Collaborators and run metadata used while executing calls.
pub struct CallEnv<'a> {
    pub executor: &'a mut dyn Executor,
    pub notifier: &'a mut dyn Notifier,
    pub renderer: &'a dyn TemplateRenderer,
    pub run_id: String,
    pub hostname: String,
    pub email: EmailInfo,
    pub progress: ProgressFilter,
    pub qsub: Option<QsubOptions>,
}

impl<'a> CallEnv<'a> {
    pub fn new(
        config: &Config,
        executor: &'a mut dyn Executor,
        notifier: &'a mut dyn Notifier,
        renderer: &'a dyn TemplateRenderer,
    ) -> Self {
        Self {
            executor,
            notifier,
            renderer,
            run_id: config.run_id.clone(),
            hostname: crate::hostname(),
            email: config.email.clone().unwrap_or_default(),
            progress: config.progress.clone(),
            qsub: config.qsub.clone(),
        }
    }

    fn sitrep(&self) -> String {
        format!("[SITREP from {}] Run {}", self.hostname, self.run_id)
    }

    /// Logs, records and mails a call that could not be set up. The run stops
    /// after this.
    pub fn report_setup_failure(&mut self, log_dir: &Path, call_id: &CallId, err: &CallError) {
        error!(call_id = %call_id, error = %err, "could not set up call; stopping the run");
        let logged = CallLog::open(log_dir, call_id).and_then(|log| log.append(&err.to_string()));
        if let Err(log_err) = logged {
            warn!(call_id = %call_id, error = %log_err, "could not write call log");
        }
        let subject = format!(
            "{} experienced unhandled exception in call {}. EXITING.",
            self.sitrep(),
            call_id
        );
        self.notify(&subject, &err.to_string());
    }

    fn notify(&mut self, subject: &str, body: &str) {
        let credential = if self.email.email_li.is_empty() {
            String::new()
        } else {
            match self.email.credential() {
                Ok(c) => c,
                Err(err) => {
                    warn!(error = %err, "could not decode email credential");
                    String::new()
                }
            }
        };
        if let Err(err) = self.notifier.send(
            &self.email.email_from,
            &self.email.email_to,
            subject,
            body,
            &credential,
        ) {
            warn!(error = %err, subject, "failed to send notification");
        }
    }
}

fn report_time() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

impl StageCall {
    pub fn execute(&mut self, env: &mut CallEnv<'_>) -> CallOutcome {
        match self.mode {
            RunMode::Analyze => match self.run_program(env) {
                Ok(()) => CallOutcome::Completed,
                Err(err) => self.handle_failure(env, err),
            },
            RunMode::DryRun => {
                println!("{}\n", self.cmd_string());
                CallOutcome::Completed
            }
            RunMode::QsubScript => match self.write_qsub_script(env) {
                Ok(path) => {
                    info!(call_id = %self.call_id, script = %path.display(), "wrote qsub script");
                    CallOutcome::Completed
                }
                Err(err) => CallOutcome::Fatal(format!("{:#}", err)),
            },
        }
    }

    fn run_program(&mut self, env: &mut CallEnv<'_>) -> Result<(), ExecError> {
        let subject = format!(
            "{} - Starting {} at {}",
            env.sitrep(),
            self.call_id,
            report_time()
        );
        env.notify(&subject, &format!("{}\n\n{}", subject, self.cmd_string()));
        info!(call_id = %self.call_id, "starting call");
        self.log_msg(&format!("[start {}]\n", self.call_id))?;

        let output = env.executor.run(self.stage.program(), &self.arg_str)?;
        self.stderr_msg = env.progress.strip(&output.stderr);
        self.log_end(&env.progress)?;
        info!(call_id = %self.call_id, "call exited");

        let subject = format!(
            "{} - Exited {} at {}",
            env.sitrep(),
            self.call_id,
            report_time()
        );
        let body = format!("{}\n\n ==> stderr <==\n\n{}", subject, self.stderr_msg);
        env.notify(&subject, &body);
        Ok(())
    }

    fn handle_failure(&mut self, env: &mut CallEnv<'_>, err: ExecError) -> CallOutcome {
        let detail = env.progress.strip(&err.to_string());
        self.stderr_msg = detail.clone();
        if let Err(log_err) = self.log_end(&env.progress) {
            warn!(call_id = %self.call_id, error = %log_err, "could not write call log");
        }
        self.flag_out_dir();

        let (kind, verdict) = match err {
            ExecError::ProgramFailed { .. } => ("SystemCallError", "MOVING ON."),
            ExecError::Interrupted { .. } => ("KeyboardInterrupt", "MOVING ON."),
            ExecError::Spawn { .. } | ExecError::Io(_) => ("unhandled exception", "EXITING."),
        };
        let subject = format!(
            "{} experienced {} in call {}. {}",
            env.sitrep(),
            kind,
            self.call_id,
            verdict
        );
        env.notify(&subject, &detail);

        if err.is_recoverable() {
            warn!(call_id = %self.call_id, kind, "call failed; continuing with the next call");
            CallOutcome::Recovered(detail)
        } else {
            error!(call_id = %self.call_id, error = %detail, "call failed; stopping the run");
            CallOutcome::Fatal(detail)
        }
    }

    fn log_msg(&self, msg: &str) -> std::io::Result<()> {
        match &self.log {
            Some(log) => log.append(msg),
            None => Ok(()),
        }
    }

    fn log_end(&mut self, progress: &ProgressFilter) -> std::io::Result<()> {
        self.stderr_msg = progress.strip(&self.stderr_msg);
        let msg = format!(
            "{}\n\n{}\n[end {}]",
            self.cmd_string(),
            self.stderr_msg,
            self.call_id
        );
        self.log_msg(&msg)
    }

    /// `tophat_Aa0` -> `FAILED.tophat_Aa0`, in place.
    fn flag_out_dir(&mut self) {
        let Some(name) = self.out_dir.file_name() else {
            return;
        };
        if !self.out_dir.exists() {
            warn!(out_dir = %self.out_dir.display(), "no output directory to flag as failed");
            return;
        }
        let flagged = self
            .out_dir
            .with_file_name(format!("FAILED.{}", name.to_string_lossy()));
        match fs::rename(&self.out_dir, &flagged) {
            Ok(()) => self.out_dir = flagged,
            Err(err) => warn!(
                out_dir = %self.out_dir.display(),
                error = %err,
                "could not flag output directory as failed"
            ),
        }
    }

    /// The command line with the thread count handed over to the scheduler.
    fn batch_command(&self) -> String {
        let cmd = self.cmd_string();
        match self.options.get("p") {
            Some(ArgValue::Value(cores)) => cmd.replace(&format!("-p {}", cores), "-p $CORES"),
            _ => cmd,
        }
    }

    fn write_qsub_script(&self, env: &CallEnv<'_>) -> Result<PathBuf> {
        let qsub = env
            .qsub
            .as_ref()
            .ok_or_else(|| anyhow!("qsub_options are required to write qsub scripts"))?;

        let mut kw = BTreeMap::new();
        kw.insert("queues".to_string(), qsub.queues.join(","));
        kw.insert("datahome".to_string(), qsub.datahome.clone());
        kw.insert("core_range".to_string(), qsub.core_range.clone());
        kw.insert("email_addy".to_string(), env.email.email_to.clone());
        kw.insert("call_id".to_string(), self.call_id.to_string());
        kw.insert(
            "job_name".to_string(),
            format!("{}_{}", self.stage.nickname(), self.call_id.subject),
        );
        kw.insert("out_dir".to_string(), self.out_dir.display().to_string());
        kw.insert("ld_library_path".to_string(), qsub.ld_library_path.clone());
        kw.insert("cmd_str".to_string(), self.batch_command());

        let script = env.renderer.render(&qsub.template, &kw)?;
        crate::ensure_dir(&qsub.script_dir)?;
        let path = qsub.script_dir.join(format!("{}.qsub.sh", self.call_id));
        fs::write(&path, script).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }
}

use std::process::{Command, ExitStatus, Stdio};

#[cfg(unix)]
use std::os::unix::process::ExitStatusExt;

use tracing::debug;

use crate::errors::ExecError;
use crate::interrupt::interrupt_count;

#[cfg(unix)]
const SIGINT: i32 = 2;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgramOutput {
    pub stdout: String,
    pub stderr: String,
}

pub trait Executor {
    fn run(&mut self, program: &str, arg_str: &str) -> Result<ProgramOutput, ExecError>;
}

/// Launches the program as a child process and waits for it.
///
/// The argument string is split on whitespace, so space-joined lists such as
/// cuffdiff's sample BAMs become separate arguments.
#[derive(Debug, Default)]
pub struct SystemExecutor;

impl Executor for SystemExecutor {
    fn run(&mut self, program: &str, arg_str: &str) -> Result<ProgramOutput, ExecError> {
        debug!(program, arg_str, "launching external program");
        let mut cmd = Command::new(program);
        cmd.args(arg_str.split_whitespace());
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let interrupts_before = interrupt_count();
        let output = cmd.output().map_err(|source| ExecError::Spawn {
            program: program.to_string(),
            source,
        })?;
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if interrupt_count() != interrupts_before || killed_by_sigint(&output.status) {
            return Err(ExecError::Interrupted {
                program: program.to_string(),
            });
        }
        if output.status.success() {
            return Ok(ProgramOutput { stdout, stderr });
        }
        Err(ExecError::ProgramFailed {
            program: program.to_string(),
            status: output.status.code().unwrap_or(-1),
            stderr,
        })
    }
}

#[cfg(unix)]
fn killed_by_sigint(status: &ExitStatus) -> bool {
    status.signal() == Some(SIGINT)
}

#[cfg(not(unix))]
fn killed_by_sigint(_status: &ExitStatus) -> bool {
    false
}

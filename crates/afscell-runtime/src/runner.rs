use crate::command::CommandSpec;
use crate::crash::CrashSignal;
use crate::pump::{self, Mirror};
use crate::{status_code, ExecError};
use std::process::{Child, ExitStatus, Stdio};
use std::sync::mpsc::RecvTimeoutError;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How a non-zero exit status is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Non-zero exit is a `CommandFailed` error.
    Hard,
    /// Non-zero exit is logged as a warning and returned.
    Soft,
}

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub status: i32,
    /// Interleaved stdout and stderr.
    pub text: String,
}

impl CommandOutput {
    #[inline]
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Runs batch commands to completion. Aborts the running child as soon as
/// the supervised service is reported crashed.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    crash: CrashSignal,
}

impl CommandRunner {
    pub fn new(crash: CrashSignal) -> Self {
        Self { crash }
    }

    pub fn run(&self, spec: &CommandSpec) -> Result<i32, ExecError> {
        self.run_mode(spec, Mode::Hard)
    }

    pub fn run_tolerant(&self, spec: &CommandSpec) -> Result<i32, ExecError> {
        self.run_mode(spec, Mode::Soft)
    }

    pub fn run_mode(&self, spec: &CommandSpec, mode: Mode) -> Result<i32, ExecError> {
        let output = self.output(spec)?;
        check_status(spec, output.status, mode)?;
        Ok(output.status)
    }

    /// Run to completion and return the captured output without judging the
    /// exit status.
    pub fn output(&self, spec: &CommandSpec) -> Result<CommandOutput, ExecError> {
        self.crash.check()?;
        debug!("running {spec}");

        let mut child = spec
            .to_command()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ExecError::Spawn {
                command: spec.to_string(),
                source,
            })?;

        let rx = pump::attach(&mut child);
        let mut mirror = Mirror::new(spec.name());
        let mut captured = Vec::new();
        let mut collect = |chunk: Vec<u8>| {
            mirror.feed(&chunk);
            captured.extend(chunk);
        };

        let status = loop {
            if let Err(e) = self.crash.check() {
                kill_and_reap(&mut child);
                return Err(e);
            }
            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(chunk) => collect(chunk),
                Err(RecvTimeoutError::Timeout) => {
                    // A daemonized grandchild may hold the pipes open after
                    // the command itself has exited.
                    if let Some(status) = child.try_wait()? {
                        while let Ok(chunk) = rx.recv_timeout(POLL_INTERVAL) {
                            collect(chunk);
                        }
                        break status;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break self.wait(&mut child)?,
            }
        };
        mirror.flush();

        let status = status_code(status);
        debug!("{} exited with status {status}", spec.name());
        Ok(CommandOutput {
            status,
            text: String::from_utf8_lossy(&captured).into_owned(),
        })
    }

    fn wait(&self, child: &mut Child) -> Result<ExitStatus, ExecError> {
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if let Err(e) = self.crash.check() {
                kill_and_reap(child);
                return Err(e);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

/// Apply a [`Mode`] to an exit status.
pub fn check_status(spec: &CommandSpec, status: i32, mode: Mode) -> Result<(), ExecError> {
    if status == 0 {
        return Ok(());
    }
    match mode {
        Mode::Hard => Err(ExecError::CommandFailed {
            command: spec.to_string(),
            status,
        }),
        Mode::Soft => {
            warn!("'{spec}' exited with status {status}, continuing");
            Ok(())
        }
    }
}

pub(crate) fn kill_and_reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

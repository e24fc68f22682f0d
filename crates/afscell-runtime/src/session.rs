//! Prompt/response driver for interactive console tools.
//!
//! A [`SessionScript`] is an ordered list of steps, each waiting for a piece
//! of text to appear on the child's output and then answering with one
//! line. Once the script is exhausted the driver closes the child's input
//! and waits for end of output and exit. One deadline bounds the whole
//! session.

use crate::command::CommandSpec;
use crate::crash::CrashSignal;
use crate::pump::{self, Mirror};
use crate::runner::kill_and_reap;
use crate::{status_code, ExecError};
use std::fmt;
use std::io::Write;
use std::process::{Child, ChildStdin, Stdio};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const END_OF_SESSION: &str = "end of session";

/// What to send once a step's pattern has been seen.
#[derive(Clone, PartialEq, Eq)]
pub enum Reply {
    Line(String),
    /// Sent like a line, but never written to the transcript log.
    Secret(String),
}

impl Reply {
    fn text(&self) -> &str {
        match self {
            Reply::Line(s) | Reply::Secret(s) => s,
        }
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Line(s) => f.debug_tuple("Line").field(s).finish(),
            Reply::Secret(_) => f.write_str("Secret(<redacted>)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub expect: String,
    pub reply: Reply,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionScript {
    steps: Vec<Step>,
}

impl SessionScript {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn send_line(mut self, expect: impl Into<String>, line: impl Into<String>) -> Self {
        self.steps.push(Step {
            expect: expect.into(),
            reply: Reply::Line(line.into()),
        });
        self
    }

    #[must_use]
    pub fn send_secret(mut self, expect: impl Into<String>, secret: impl Into<String>) -> Self {
        self.steps.push(Step {
            expect: expect.into(),
            reply: Reply::Secret(secret.into()),
        });
        self
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct SessionOutcome {
    /// Everything the child printed, stdout and stderr interleaved.
    pub transcript: String,
    pub status: i32,
}

#[derive(Debug, Clone)]
pub struct SessionDriver {
    timeout: Duration,
    crash: CrashSignal,
}

impl SessionDriver {
    pub fn new(timeout: Duration, crash: CrashSignal) -> Self {
        Self { timeout, crash }
    }

    /// Run `spec` through `script`. The exit status is returned, not judged.
    pub fn run(&self, spec: &CommandSpec, script: &SessionScript) -> Result<SessionOutcome, ExecError> {
        self.crash.check()?;
        debug!("starting session {spec} ({} steps)", script.len());

        let mut child = spec
            .to_command()
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ExecError::Spawn {
                command: spec.to_string(),
                source,
            })?;

        let mut session = Session {
            spec,
            stdin: child.stdin.take(),
            rx: pump::attach(&mut child),
            mirror: Mirror::new(spec.name()),
            transcript: String::new(),
            pending: String::new(),
            deadline: Instant::now() + self.timeout,
            timeout: self.timeout,
            crash: &self.crash,
        };

        match session.drive(&mut child, script) {
            Ok(status) => {
                let rest = session.mirror.flush();
                session.transcript.push_str(&rest);
                debug!("{} session ended with status {status}", spec.name());
                Ok(SessionOutcome {
                    transcript: session.transcript,
                    status,
                })
            }
            Err(e) => {
                let _ = session.mirror.flush();
                kill_and_reap(&mut child);
                Err(e)
            }
        }
    }
}

struct Session<'a> {
    spec: &'a CommandSpec,
    stdin: Option<ChildStdin>,
    rx: Receiver<Vec<u8>>,
    mirror: Mirror,
    transcript: String,
    /// Output not yet consumed by a matched pattern.
    pending: String,
    deadline: Instant,
    timeout: Duration,
    crash: &'a CrashSignal,
}

enum Wait {
    Data,
    Closed,
}

impl Session<'_> {
    fn drive(&mut self, child: &mut Child, script: &SessionScript) -> Result<i32, ExecError> {
        for step in script.steps() {
            self.expect(&step.expect)?;
            self.send(&step.reply)?;
        }

        // Closing stdin is the end-of-session marker for the child.
        drop(self.stdin.take());
        while let Wait::Data = self.next_chunk(END_OF_SESSION)? {}

        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status_code(status));
            }
            self.check_deadline(END_OF_SESSION)?;
            thread::sleep(POLL_INTERVAL);
        }
    }

    fn expect(&mut self, pattern: &str) -> Result<(), ExecError> {
        loop {
            if let Some(pos) = self.pending.find(pattern) {
                self.pending.drain(..pos + pattern.len());
                return Ok(());
            }
            if let Wait::Closed = self.next_chunk(pattern)? {
                return Err(ExecError::SessionClosed {
                    command: self.spec.to_string(),
                    pattern: pattern.to_owned(),
                });
            }
        }
    }

    fn send(&mut self, reply: &Reply) -> Result<(), ExecError> {
        match reply {
            Reply::Line(line) => self.mirror.note_sent(line),
            Reply::Secret(_) => self.mirror.note_sent("********"),
        }
        let stdin = self.stdin.as_mut().ok_or_else(|| {
            ExecError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "session input already closed",
            ))
        })?;
        stdin.write_all(reply.text().as_bytes())?;
        stdin.write_all(b"\n")?;
        stdin.flush()?;
        Ok(())
    }

    /// Wait for the next output chunk, bounded by the session deadline.
    fn next_chunk(&mut self, waiting_for: &str) -> Result<Wait, ExecError> {
        loop {
            self.check_deadline(waiting_for)?;
            match self.rx.recv_timeout(POLL_INTERVAL) {
                Ok(chunk) => {
                    let text = self.mirror.feed(&chunk);
                    self.transcript.push_str(&text);
                    self.pending.push_str(&text);
                    return Ok(Wait::Data);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return Ok(Wait::Closed),
            }
        }
    }

    fn check_deadline(&self, waiting_for: &str) -> Result<(), ExecError> {
        self.crash.check()?;
        if Instant::now() >= self.deadline {
            return Err(ExecError::SessionTimeout {
                command: self.spec.to_string(),
                pattern: waiting_for.to_owned(),
                timeout: self.timeout,
            });
        }
        Ok(())
    }
}

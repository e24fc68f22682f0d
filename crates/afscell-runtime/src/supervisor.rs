//! Supervision of the cell's long-running background server.
//!
//! The [`Supervisor`] owns at most one process group. A watcher thread polls
//! the group leader and, if it exits non-zero without a stop request, marks
//! the service crashed and trips the shared [`CrashSignal`]. The group is
//! remembered after the leader exits so that stopping or replacing the
//! service still reaches any helper it left behind. All state changes go
//! through [`validate_transition`].

use crate::command::CommandSpec;
use crate::crash::{CrashReport, CrashSignal};
use crate::state::{validate_transition, ServiceState};
use crate::{status_code, ExecError};
use std::os::unix::process::CommandExt;
use std::process::{Child, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const WATCH_INTERVAL: Duration = Duration::from_millis(50);
const REAP_WAIT: Duration = Duration::from_secs(1);

/// Interrupt, then poll `attempts` times `interval` apart before killing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for StopPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            interval: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Supervisor {
    shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    slot: Mutex<Slot>,
    crash: CrashSignal,
    policy: StopPolicy,
}

#[derive(Debug)]
struct Slot {
    state: ServiceState,
    instance: Option<Instance>,
    generation: u64,
}

#[derive(Debug)]
struct Instance {
    child: Child,
    command: String,
    generation: u64,
    /// Set once the group leader has been reaped.
    leader_exited: bool,
}

impl Slot {
    fn transition(&mut self, to: ServiceState) -> Result<(), ExecError> {
        validate_transition(self.state, to)?;
        debug!("service state {} -> {to}", self.state);
        self.state = to;
        Ok(())
    }

    /// Land in `Stopped` after a teardown, from wherever the slot is.
    fn settle(&mut self) -> Result<(), ExecError> {
        if self.state == ServiceState::Stopped {
            return Ok(());
        }
        self.transition(ServiceState::Stopped)
    }
}

impl Instance {
    fn pgid(&self) -> u32 {
        self.child.id()
    }

    /// Whether the leader is gone, reaping it if it just exited.
    fn reap(&mut self) -> std::io::Result<bool> {
        if !self.leader_exited {
            if let Some(status) = self.child.try_wait()? {
                debug!("pid {} exited with status {}", self.pgid(), status_code(status));
                self.leader_exited = true;
            }
        }
        Ok(self.leader_exited)
    }

    fn finished(&mut self) -> std::io::Result<bool> {
        Ok(self.reap()? && !group_alive(self.pgid()))
    }
}

impl Supervisor {
    pub fn new(policy: StopPolicy, crash: CrashSignal) -> Self {
        Self {
            shared: Arc::new(Shared {
                slot: Mutex::new(Slot {
                    state: ServiceState::Stopped,
                    instance: None,
                    generation: 0,
                }),
                crash,
                policy,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.shared
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> ServiceState {
        self.lock().state
    }

    /// Pid of the running group leader.
    pub fn pid(&self) -> Option<u32> {
        self.lock()
            .instance
            .as_ref()
            .filter(|i| !i.leader_exited)
            .map(Instance::pgid)
    }

    pub fn crash_signal(&self) -> &CrashSignal {
        &self.shared.crash
    }

    /// Launch `spec` as the supervised service, replacing any live instance
    /// and whatever is left of a previous one's process group.
    pub fn start(&self, spec: &CommandSpec) -> Result<(), ExecError> {
        self.shared.crash.check()?;
        let mut slot = self.lock();

        if let Some(mut old) = slot.instance.take() {
            info!("replacing {} (group {})", old.command, old.pgid());
            if slot.state == ServiceState::Running {
                slot.transition(ServiceState::Stopping)?;
            }
            force_stop(&mut old);
            slot.settle()?;
        }

        slot.transition(ServiceState::Starting)?;
        let mut cmd = spec.to_command();
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .process_group(0);
        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(source) => {
                slot.transition(ServiceState::Stopped)?;
                return Err(ExecError::Spawn {
                    command: spec.to_string(),
                    source,
                });
            }
        };

        slot.generation += 1;
        let generation = slot.generation;
        info!("started {spec} (pid {})", child.id());
        slot.instance = Some(Instance {
            child,
            command: spec.to_string(),
            generation,
            leader_exited: false,
        });
        slot.transition(ServiceState::Running)?;
        drop(slot);

        let watcher = self.clone();
        thread::spawn(move || watcher.watch(generation));
        Ok(())
    }

    /// Interrupt the service's process group and wait for it to empty,
    /// killing it when the stop budget runs out. A no-op when nothing was
    /// ever started.
    pub fn stop(&self) -> Result<(), ExecError> {
        let mut slot = self.lock();
        let Some(mut instance) = slot.instance.take() else {
            if slot.state == ServiceState::Crashed {
                slot.transition(ServiceState::Stopped)?;
            }
            return Ok(());
        };

        if slot.state == ServiceState::Running {
            slot.transition(ServiceState::Stopping)?;
        }
        info!("stopping {} (group {})", instance.command, instance.pgid());
        if let Err(e) = graceful_stop(&mut instance, self.shared.policy) {
            warn!("graceful stop of {} failed: {e}", instance.command);
            force_stop(&mut instance);
        }
        slot.settle()
    }

    /// Stop the service when the returned guard goes out of scope.
    pub fn teardown_guard(&self) -> TeardownGuard {
        TeardownGuard {
            supervisor: self.clone(),
        }
    }

    fn watch(&self, generation: u64) {
        loop {
            thread::sleep(WATCH_INTERVAL);
            let mut slot = self.lock();
            let (status, command, pgid) = match slot.instance.as_mut() {
                Some(instance)
                    if instance.generation == generation && !instance.leader_exited =>
                {
                    match instance.child.try_wait() {
                        Ok(None) => continue,
                        Ok(Some(status)) => {
                            instance.leader_exited = true;
                            (status_code(status), instance.command.clone(), instance.pgid())
                        }
                        Err(e) => {
                            warn!("cannot poll {}: {e}", instance.command);
                            return;
                        }
                    }
                }
                // Stopped or replaced.
                _ => return,
            };

            if group_alive(pgid) {
                warn!("{command} exited but process group {pgid} is still populated");
            }
            if status == 0 {
                info!("{command} exited");
                let _ = slot.transition(ServiceState::Stopped);
            } else {
                error!("{command} exited unexpectedly with status {status}");
                let _ = slot.transition(ServiceState::Crashed);
                self.shared.crash.trip(CrashReport { command, status });
            }
            return;
        }
    }
}

/// Stops the supervised service on drop, on every exit path.
#[must_use = "the service is stopped as soon as the guard is dropped"]
pub struct TeardownGuard {
    supervisor: Supervisor,
}

impl Drop for TeardownGuard {
    fn drop(&mut self) {
        if let Err(e) = self.supervisor.stop() {
            warn!("failed to stop supervised service: {e}");
        }
    }
}

fn graceful_stop(instance: &mut Instance, policy: StopPolicy) -> std::io::Result<()> {
    if instance.finished()? {
        return Ok(());
    }
    signal_group(instance.pgid(), libc::SIGINT)?;
    for _ in 0..policy.attempts {
        thread::sleep(policy.interval);
        if instance.finished()? {
            debug!("process group {} is empty", instance.pgid());
            return Ok(());
        }
    }
    warn!(
        "process group {} still populated after {} checks, killing",
        instance.pgid(),
        policy.attempts
    );
    force_stop(instance);
    Ok(())
}

fn force_stop(instance: &mut Instance) {
    let pgid = instance.pgid();
    if let Err(e) = signal_group(pgid, libc::SIGKILL) {
        warn!("failed to kill process group {pgid}: {e}");
        if !instance.leader_exited {
            let _ = instance.child.kill();
        }
    }
    if !instance.leader_exited {
        let _ = instance.child.wait();
        instance.leader_exited = true;
    }
    // Orphaned members are reaped by init, not by us.
    let deadline = Instant::now() + REAP_WAIT;
    while group_alive(pgid) && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
}

fn group_id(pid: u32) -> std::io::Result<i32> {
    i32::try_from(pid).map_err(|_| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("invalid pid {pid}: exceeds i32 range"),
        )
    })
}

/// The service runs in its own process group so that its helpers go down
/// with it, even after the leader is gone.
fn signal_group(pid: u32, signal: libc::c_int) -> std::io::Result<()> {
    let pgid = group_id(pid)?;
    // SAFETY: kill() with a valid process group id and signal is safe; pgid validated via i32::try_from above.
    #[allow(unsafe_code)]
    let ret = unsafe { libc::kill(-pgid, signal) };
    if ret != 0 {
        let errno = std::io::Error::last_os_error();
        if errno.raw_os_error() != Some(libc::ESRCH) {
            return Err(errno);
        }
    }
    Ok(())
}

/// Whether any process, zombies included, still belongs to the group.
fn group_alive(pid: u32) -> bool {
    let Ok(pgid) = group_id(pid) else {
        return false;
    };
    // SAFETY: signal 0 only checks that the group exists and may be signalled.
    #[allow(unsafe_code)]
    let ret = unsafe { libc::kill(-pgid, 0) };
    ret == 0 || std::io::Error::last_os_error().raw_os_error() != Some(libc::ESRCH)
}

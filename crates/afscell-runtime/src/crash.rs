use crate::ExecError;
use std::sync::{Arc, Mutex, PoisonError};

/// What the liveness watcher saw when the supervised service died.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrashReport {
    pub command: String,
    pub status: i32,
}

/// Tripped once by the supervisor's watcher; polled by everything that
/// blocks on a child process.
#[derive(Debug, Clone, Default)]
pub struct CrashSignal {
    inner: Arc<Mutex<Option<CrashReport>>>,
}

impl CrashSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a crash. The first report wins.
    pub fn trip(&self, report: CrashReport) {
        let mut slot = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(report);
        }
    }

    pub fn tripped(&self) -> Option<CrashReport> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn check(&self) -> Result<(), ExecError> {
        match self.tripped() {
            Some(report) => Err(ExecError::SupervisorCrash {
                command: report.command,
                status: report.status,
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_report_wins() {
        let signal = CrashSignal::new();
        assert!(signal.check().is_ok());

        let clone = signal.clone();
        clone.trip(CrashReport {
            command: "bosserver".to_owned(),
            status: 1,
        });
        clone.trip(CrashReport {
            command: "other".to_owned(),
            status: 9,
        });

        let report = signal.tripped().unwrap();
        assert_eq!(report.command, "bosserver");
        assert!(matches!(
            signal.check(),
            Err(ExecError::SupervisorCrash { status: 1, .. })
        ));
    }
}

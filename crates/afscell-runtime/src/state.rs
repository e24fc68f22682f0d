use crate::ExecError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of the supervised background service.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Stopped,
    Starting,
    Running,
    Stopping,
    /// Exited non-zero without a stop request.
    Crashed,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServiceState::Stopped => "stopped",
            ServiceState::Starting => "starting",
            ServiceState::Running => "running",
            ServiceState::Stopping => "stopping",
            ServiceState::Crashed => "crashed",
        };
        f.write_str(s)
    }
}

pub fn validate_transition(from: ServiceState, to: ServiceState) -> Result<(), ExecError> {
    let valid = matches!(
        (from, to),
        (ServiceState::Stopped | ServiceState::Crashed, ServiceState::Starting)
            | (
                ServiceState::Starting,
                ServiceState::Running | ServiceState::Stopped
            )
            | (
                ServiceState::Running,
                ServiceState::Stopping | ServiceState::Stopped | ServiceState::Crashed
            )
            | (
                ServiceState::Stopping | ServiceState::Crashed,
                ServiceState::Stopped
            )
    );

    if valid {
        Ok(())
    } else {
        Err(ExecError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

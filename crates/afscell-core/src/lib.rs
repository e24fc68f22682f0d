//! Provisioning orchestration for an OpenAFS cell and its Kerberos realm.
//!
//! This crate ties the layout tables and the process runtime together into
//! the `Orchestrator`: a fixed, ordered pipeline of stages that initializes
//! the realm, registers the cell's service key, brings up the background
//! server and database servers, and configures the local client. It also
//! provides the configuration-file templates, the run lock, interruption
//! handling, and the serializable run report.

pub mod concurrency;
pub mod context;
pub mod orchestrator;
pub mod report;
pub mod secret;
pub mod stage;
pub mod templates;

pub use concurrency::{install_signal_handler, shutdown_requested, RunLock};
pub use context::{CellIdentity, KeyVersion, ProvisioningContext};
pub use orchestrator::{Orchestrator, OrchestratorOptions};
pub use report::{RunReport, StageOutcome, StageRecord};
pub use secret::{resolve_secret, Secret, SecretPrompt};
pub use stage::{NoopObserver, StageClass, StageId, StageObserver};
pub use templates::{FsTemplateWriter, TemplateWriter};

use afscell_layout::{ConfigError, LayoutError};
use afscell_runtime::ExecError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Exec(#[from] ExecError),
    #[error("failed to write '{}': {reason}", path.display())]
    Template { path: PathBuf, reason: String },
    #[error("stage '{stage}' failed: {source}")]
    Stage {
        stage: StageId,
        #[source]
        source: Box<CoreError>,
    },
    #[error("{0}")]
    Lock(String),
    #[error("interrupted by user")]
    Interrupted,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LayoutError> for CoreError {
    fn from(e: LayoutError) -> Self {
        CoreError::Validation(e.to_string())
    }
}

impl CoreError {
    /// The underlying error, with stage attribution peeled off.
    pub fn root(&self) -> &CoreError {
        match self {
            CoreError::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    /// The stage a failure is attributed to, if any.
    pub fn stage(&self) -> Option<StageId> {
        match self {
            CoreError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

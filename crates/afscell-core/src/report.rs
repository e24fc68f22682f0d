use crate::context::{KeyVersion, ProvisioningContext};
use crate::stage::{StageClass, StageId};
use afscell_layout::{LayoutVariant, RealmVariant};
use afscell_runtime::ServiceState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum StageOutcome {
    Succeeded,
    /// Completed, but some commands failed and were tolerated.
    Tolerated { warnings: Vec<String> },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: StageId,
    pub class: StageClass,
    #[serde(flatten)]
    pub outcome: StageOutcome,
    pub duration_ms: u64,
}

/// Summary of one provisioning run, printed by `--json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub layout: LayoutVariant,
    pub realm_layout: RealmVariant,
    pub machine: String,
    pub cell: String,
    pub realm: String,
    pub tolerant: bool,
    pub upgrade: bool,
    pub key_version: Option<KeyVersion>,
    pub stages: Vec<StageRecord>,
    pub supervisor: ServiceState,
    pub success: bool,
}

impl RunReport {
    pub fn new(ctx: &ProvisioningContext) -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            layout: ctx.layout.variant,
            realm_layout: ctx.layout.realm,
            machine: ctx.identity.machine.clone(),
            cell: ctx.identity.cell.clone(),
            realm: ctx.identity.realm.clone(),
            tolerant: ctx.tolerant,
            upgrade: ctx.upgrade,
            key_version: None,
            stages: Vec::new(),
            supervisor: ServiceState::Stopped,
            success: false,
        }
    }

    pub fn record(&mut self, stage: StageId, outcome: StageOutcome, duration_ms: u64) {
        self.stages.push(StageRecord {
            stage,
            class: stage.class(),
            outcome,
            duration_ms,
        });
    }

    pub fn finish(&mut self, key_version: Option<KeyVersion>, supervisor: ServiceState, success: bool) {
        self.finished_at = Some(Utc::now());
        self.key_version = key_version;
        self.supervisor = supervisor;
        self.success = success;
    }

    pub fn failed_stage(&self) -> Option<StageId> {
        self.stages
            .iter()
            .find(|r| matches!(r.outcome, StageOutcome::Failed { .. }))
            .map(|r| r.stage)
    }

    pub fn warning_count(&self) -> usize {
        self.stages
            .iter()
            .map(|r| match &r.outcome {
                StageOutcome::Tolerated { warnings } => warnings.len(),
                _ => 0,
            })
            .sum()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

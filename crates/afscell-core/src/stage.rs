use crate::report::StageOutcome;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether a stage's failure may be downgraded by tolerant mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageClass {
    /// Failure always aborts the run.
    Critical,
    /// Failure of its commands only warns when tolerant mode is on.
    Tolerant,
}

/// Provisioning stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageId {
    ValidateLayout,
    WriteRealmConfig,
    WriteCellDirectory,
    InitializeRealm,
    WriteAdminAcl,
    StartRealmDaemons,
    CreateAdminPrincipal,
    VerifyAuthentication,
    CreateServicePrincipal,
    ExtractKeyVersion,
    ListKeytab,
    RegisterServiceKey,
    StartCellServer,
    SetCellName,
    CreateDatabaseServers,
    RestartCellServer,
    RegisterAdministrator,
    InitializeProtectionDb,
    VerifyMembership,
    RestartAllServers,
    CreateFileServer,
    InitializeVolumes,
    CreateUpdateServer,
    ConfigureClient,
}

impl StageId {
    pub const ALL: [StageId; 24] = [
        Self::ValidateLayout,
        Self::WriteRealmConfig,
        Self::WriteCellDirectory,
        Self::InitializeRealm,
        Self::WriteAdminAcl,
        Self::StartRealmDaemons,
        Self::CreateAdminPrincipal,
        Self::VerifyAuthentication,
        Self::CreateServicePrincipal,
        Self::ExtractKeyVersion,
        Self::ListKeytab,
        Self::RegisterServiceKey,
        Self::StartCellServer,
        Self::SetCellName,
        Self::CreateDatabaseServers,
        Self::RestartCellServer,
        Self::RegisterAdministrator,
        Self::InitializeProtectionDb,
        Self::VerifyMembership,
        Self::RestartAllServers,
        Self::CreateFileServer,
        Self::InitializeVolumes,
        Self::CreateUpdateServer,
        Self::ConfigureClient,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::ValidateLayout => "validate-layout",
            Self::WriteRealmConfig => "write-realm-config",
            Self::WriteCellDirectory => "write-cell-directory",
            Self::InitializeRealm => "initialize-realm",
            Self::WriteAdminAcl => "write-admin-acl",
            Self::StartRealmDaemons => "start-realm-daemons",
            Self::CreateAdminPrincipal => "create-admin-principal",
            Self::VerifyAuthentication => "verify-authentication",
            Self::CreateServicePrincipal => "create-service-principal",
            Self::ExtractKeyVersion => "extract-key-version",
            Self::ListKeytab => "list-keytab",
            Self::RegisterServiceKey => "register-service-key",
            Self::StartCellServer => "start-cell-server",
            Self::SetCellName => "set-cell-name",
            Self::CreateDatabaseServers => "create-database-servers",
            Self::RestartCellServer => "restart-cell-server",
            Self::RegisterAdministrator => "register-administrator",
            Self::InitializeProtectionDb => "initialize-protection-db",
            Self::VerifyMembership => "verify-membership",
            Self::RestartAllServers => "restart-all-servers",
            Self::CreateFileServer => "create-file-server",
            Self::InitializeVolumes => "initialize-volumes",
            Self::CreateUpdateServer => "create-update-server",
            Self::ConfigureClient => "configure-client",
        }
    }

    /// Preconditions for everything after them are critical; entity
    /// creation that fails on re-runs is tolerant.
    pub fn class(self) -> StageClass {
        match self {
            Self::ValidateLayout
            | Self::WriteRealmConfig
            | Self::WriteCellDirectory
            | Self::InitializeRealm
            | Self::WriteAdminAcl
            | Self::VerifyAuthentication
            | Self::ExtractKeyVersion
            | Self::SetCellName
            | Self::VerifyMembership
            | Self::RestartAllServers
            | Self::ConfigureClient => StageClass::Critical,
            Self::StartRealmDaemons
            | Self::CreateAdminPrincipal
            | Self::CreateServicePrincipal
            | Self::ListKeytab
            | Self::RegisterServiceKey
            | Self::StartCellServer
            | Self::CreateDatabaseServers
            | Self::RestartCellServer
            | Self::RegisterAdministrator
            | Self::InitializeProtectionDb
            | Self::CreateFileServer
            | Self::InitializeVolumes
            | Self::CreateUpdateServer => StageClass::Tolerant,
        }
    }

    /// One-line description for progress output.
    pub fn summary(self) -> &'static str {
        match self {
            Self::ValidateLayout => "checking binaries and paths",
            Self::WriteRealmConfig => "writing Kerberos configuration",
            Self::WriteCellDirectory => "writing CellServDB",
            Self::InitializeRealm => "creating the realm database",
            Self::WriteAdminAcl => "granting admin rights in the realm ACL",
            Self::StartRealmDaemons => "starting the KDC and admin daemons",
            Self::CreateAdminPrincipal => "creating the admin principal",
            Self::VerifyAuthentication => "testing authentication with kinit",
            Self::CreateServicePrincipal => "creating and exporting the cell service principal",
            Self::ExtractKeyVersion => "reading the service key version",
            Self::ListKeytab => "listing keytab entries",
            Self::RegisterServiceKey => "registering the service key with the cell",
            Self::StartCellServer => "starting the cell background server",
            Self::SetCellName => "setting the cell name",
            Self::CreateDatabaseServers => "creating backup, protection and volume location servers",
            Self::RestartCellServer => "restarting the cell background server",
            Self::RegisterAdministrator => "registering the cell administrator",
            Self::InitializeProtectionDb => "initializing the protection database",
            Self::VerifyMembership => "verifying administrator membership",
            Self::RestartAllServers => "restarting all cell servers",
            Self::CreateFileServer => "creating the demand-attach file server",
            Self::InitializeVolumes => "initializing volumes",
            Self::CreateUpdateServer => "creating the update server",
            Self::ConfigureClient => "configuring the local client cache",
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Progress callbacks, invoked on the pipeline thread.
pub trait StageObserver {
    fn stage_started(&self, _stage: StageId, _index: usize, _total: usize) {}
    fn stage_finished(&self, _stage: StageId, _outcome: &StageOutcome) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl StageObserver for NoopObserver {}

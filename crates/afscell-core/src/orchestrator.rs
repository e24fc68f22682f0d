//! The provisioning pipeline.
//!
//! Stages run strictly in [`StageId::ALL`] order on the calling thread. The
//! cell's background server is owned by a [`Supervisor`] that is torn down
//! on every exit path, and its watcher can abort whatever command is in
//! flight. Tolerant-class stages run their commands in soft mode when the
//! context asks for tolerance; everything else is hard.

use crate::concurrency::shutdown_requested;
use crate::context::{KeyVersion, ProvisioningContext, ADMIN_USER};
use crate::report::{RunReport, StageOutcome};
use crate::stage::{StageClass, StageId, StageObserver};
use crate::templates::{
    render_cacheinfo, render_cellservdb, render_kadm5_acl, render_krb5_conf, TemplateWriter,
};
use crate::CoreError;
use afscell_layout::{validate_cache_dir, Binary, RealmVariant};
use afscell_runtime::runner::check_status;
use afscell_runtime::{
    extract, CommandRunner, CommandSpec, CrashSignal, Mode, SessionDriver, SessionScript,
    StopPolicy, Supervisor, KVNO_PATTERN,
};
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

const KADMIN_PROMPT: &str = "kadmin.local:";
const ADMINISTRATORS_GROUP: &str = "system:administrators";
const ROOT_PARTITION: &str = "/vicepa";
const ROOT_VOLUME: &str = "root.afs";

#[derive(Debug, Clone, Copy)]
pub struct OrchestratorOptions {
    /// Bound on a whole interactive session.
    pub session_timeout: Duration,
    pub stop_policy: StopPolicy,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            session_timeout: Duration::from_secs(120),
            stop_policy: StopPolicy::default(),
        }
    }
}

pub struct Orchestrator<'a> {
    ctx: ProvisioningContext,
    runner: CommandRunner,
    sessions: SessionDriver,
    supervisor: Supervisor,
    writer: &'a dyn TemplateWriter,
    observer: &'a dyn StageObserver,
    report: RunReport,
    /// Tolerated failures of the stage currently running.
    warnings: Vec<String>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        ctx: ProvisioningContext,
        options: OrchestratorOptions,
        writer: &'a dyn TemplateWriter,
        observer: &'a dyn StageObserver,
    ) -> Self {
        let crash = CrashSignal::new();
        let report = RunReport::new(&ctx);
        Self {
            runner: CommandRunner::new(crash.clone()),
            sessions: SessionDriver::new(options.session_timeout, crash.clone()),
            supervisor: Supervisor::new(options.stop_policy, crash),
            ctx,
            writer,
            observer,
            report,
            warnings: Vec::new(),
        }
    }

    pub fn context(&self) -> &ProvisioningContext {
        &self.ctx
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    pub fn report(&self) -> &RunReport {
        &self.report
    }

    pub fn into_report(self) -> RunReport {
        self.report
    }

    /// Run every stage. The supervised server is stopped before this
    /// returns, whatever the outcome.
    pub fn provision(&mut self) -> Result<(), CoreError> {
        info!(
            "provisioning cell {} in realm {} ({} layout, {} realm layout{}{})",
            self.ctx.identity.cell,
            self.ctx.identity.realm,
            self.ctx.layout.variant,
            self.ctx.layout.realm,
            if self.ctx.tolerant { ", tolerant" } else { "" },
            if self.ctx.upgrade { ", upgrade" } else { "" },
        );

        let teardown = self.supervisor.teardown_guard();
        let result = self.run_stages();
        drop(teardown);

        self.ctx.release_realm_secret();
        self.ctx.release_admin_secret();
        self.report.finish(
            self.ctx.key_version(),
            self.supervisor.state(),
            result.is_ok(),
        );
        if result.is_ok() {
            info!(
                "cell {} provisioned ({} tolerated failures)",
                self.ctx.identity.cell,
                self.report.warning_count()
            );
        }
        result
    }

    fn run_stages(&mut self) -> Result<(), CoreError> {
        let total = StageId::ALL.len();
        for (index, stage) in StageId::ALL.into_iter().enumerate() {
            if shutdown_requested() {
                warn!("interrupted before {stage}");
                return Err(CoreError::Interrupted);
            }

            self.observer.stage_started(stage, index, total);
            info!("[{}/{total}] {stage}: {}", index + 1, stage.summary());
            self.warnings.clear();
            let started = Instant::now();
            // A server crash noticed between stages fails the next one.
            let result = self
                .supervisor
                .crash_signal()
                .check()
                .map_err(CoreError::from)
                .and_then(|()| self.execute(stage));
            let elapsed = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

            let outcome = match &result {
                Ok(()) if self.warnings.is_empty() => StageOutcome::Succeeded,
                Ok(()) => StageOutcome::Tolerated {
                    warnings: std::mem::take(&mut self.warnings),
                },
                Err(e) => StageOutcome::Failed {
                    error: e.to_string(),
                },
            };
            self.observer.stage_finished(stage, &outcome);
            self.report.record(stage, outcome, elapsed);

            if let Err(e) = result {
                error!("stage {stage} failed: {e}");
                return Err(CoreError::Stage {
                    stage,
                    source: Box::new(e),
                });
            }
        }
        Ok(())
    }

    fn execute(&mut self, stage: StageId) -> Result<(), CoreError> {
        let files = self.ctx.layout.files.clone();
        let id = self.ctx.identity.clone();
        match stage {
            StageId::ValidateLayout => {
                id.validate()?;
                self.ctx.layout.validate()?;
                validate_cache_dir(&self.ctx.cache.dir)?;
                Ok(())
            }
            StageId::WriteRealmConfig => self
                .writer
                .write(&render_krb5_conf(&id.realm), &files.krb5_conf),
            StageId::WriteCellDirectory => {
                let content = render_cellservdb(&id.cell, &id.address);
                self.writer.write(&content, &files.cellservdb_client)?;
                self.writer.write(&content, &files.cellservdb_server)
            }
            StageId::InitializeRealm => {
                let key = self.ctx.realm_secret()?.expose().to_owned();
                let script = SessionScript::new()
                    .send_secret("Enter KDC database master key:", key.as_str())
                    .send_secret("Re-enter KDC database master key to verify:", key);
                self.session(stage, self.bin(Binary::Kdb5Util).args(["create", "-s"]), &script)?;
                self.ctx.release_realm_secret();
                Ok(())
            }
            StageId::WriteAdminAcl => self.writer.write(&render_kadm5_acl(), &files.kadm5_acl),
            StageId::StartRealmDaemons => self.start_realm_daemons(stage),
            StageId::CreateAdminPrincipal => {
                let password = self.ctx.admin_secret()?.expose().to_owned();
                let script = SessionScript::new()
                    .send_line(KADMIN_PROMPT, format!("addprinc {}", id.admin_principal()))
                    .send_secret("Enter password for principal", password.as_str())
                    .send_secret("Re-enter password for principal", password)
                    .send_line(KADMIN_PROMPT, "quit");
                self.session(stage, self.bin(Binary::KadminLocal), &script)
            }
            StageId::VerifyAuthentication => {
                let password = self.ctx.admin_secret()?.expose().to_owned();
                let script = SessionScript::new().send_secret("Password for", password);
                self.session(
                    stage,
                    self.bin(Binary::Kinit).arg(id.admin_principal()),
                    &script,
                )?;
                self.ctx.release_admin_secret();
                Ok(())
            }
            StageId::CreateServicePrincipal => {
                let enc = self.ctx.encryption_option();
                let principal = id.service_principal();
                let script = SessionScript::new()
                    .send_line(KADMIN_PROMPT, format!("addprinc -randkey{enc} {principal}"))
                    .send_line(
                        KADMIN_PROMPT,
                        format!("ktadd -k {}{enc} {principal}", files.keytab.display()),
                    )
                    .send_line(KADMIN_PROMPT, "quit");
                self.session(stage, self.bin(Binary::KadminLocal), &script)
            }
            StageId::ExtractKeyVersion => {
                let spec = self
                    .bin(Binary::Kvno)
                    .arg("-k")
                    .arg(files.keytab.as_os_str())
                    .arg(id.service_principal());
                let output = self.runner.output(&spec)?;
                check_status(&spec, output.status, Mode::Hard)?;
                let kvno = KeyVersion::parse(&extract(&output.text, &KVNO_PATTERN)?)?;
                info!("service key version is {kvno}");
                self.ctx.set_key_version(kvno);
                Ok(())
            }
            StageId::ListKeytab => self.batch(
                stage,
                self.bin(Binary::Klist)
                    .args(["-e", "-k"])
                    .arg(files.keytab.as_os_str()),
            ),
            StageId::RegisterServiceKey => {
                let kvno = self.ctx.require_key_version()?;
                self.batch(
                    stage,
                    self.bin(Binary::Asetkey)
                        .arg("add")
                        .arg(kvno.to_string())
                        .arg(files.keytab.as_os_str())
                        .arg(id.service_principal()),
                )
            }
            StageId::StartCellServer | StageId::RestartCellServer => self.start_cell_server(stage),
            StageId::SetCellName => self.batch(
                stage,
                self.bos("setcellname").arg(&id.cell).arg("-localauth"),
            ),
            StageId::CreateDatabaseServers => {
                for server in [Binary::Buserver, Binary::Ptserver, Binary::Vlserver] {
                    let spec = self
                        .bos("create")
                        .args([server.key(), "simple"])
                        .arg(self.path(server))
                        .arg("-localauth");
                    self.batch(stage, spec)?;
                }
                Ok(())
            }
            StageId::RegisterAdministrator => self.batch(
                stage,
                self.bos("adduser").args([ADMIN_USER, "-localauth"]),
            ),
            StageId::InitializeProtectionDb => {
                self.batch(
                    stage,
                    self.bin(Binary::Pts)
                        .args(["createuser", "-name", ADMIN_USER, "-cell"])
                        .arg(&id.cell)
                        .arg("-localauth"),
                )?;
                self.batch(
                    stage,
                    self.bin(Binary::Pts).args([
                        "adduser",
                        "-user",
                        ADMIN_USER,
                        "-group",
                        ADMINISTRATORS_GROUP,
                        "-localauth",
                    ]),
                )
            }
            StageId::VerifyMembership => self.batch(
                stage,
                self.bin(Binary::Pts)
                    .args(["membership", ADMIN_USER, "-localauth"]),
            ),
            StageId::RestartAllServers => {
                self.batch(stage, self.bos("restart").args(["-all", "-localauth"]))
            }
            StageId::CreateFileServer => {
                let spec = self
                    .bos("create")
                    .args(["dafs", "dafs"])
                    .arg(self.path(Binary::Fileserver))
                    .arg(self.path(Binary::Volserver))
                    .arg(self.path(Binary::Salvageserver))
                    .arg(self.path(Binary::Salvager))
                    .arg("-localauth");
                self.batch(stage, spec)?;
                self.batch(
                    stage,
                    self.bos("status").args(["dafs", "-long", "-localauth"]),
                )
            }
            StageId::InitializeVolumes => {
                if self.ctx.upgrade {
                    for sub in ["syncvldb", "syncserv"] {
                        let spec = self
                            .bin(Binary::Vos)
                            .arg(sub)
                            .arg(&id.machine)
                            .args(["-verbose", "-localauth"]);
                        self.batch(stage, spec)?;
                    }
                    Ok(())
                } else {
                    self.batch(
                        stage,
                        self.bin(Binary::Vos)
                            .arg("create")
                            .arg(&id.machine)
                            .args([ROOT_PARTITION, ROOT_VOLUME, "-localauth"]),
                    )
                }
            }
            StageId::CreateUpdateServer => {
                let spec = self
                    .bos("create")
                    .args(["upserver", "simple"])
                    .arg(self.path(Binary::Upserver))
                    .arg("-localauth");
                self.batch(stage, spec)
            }
            StageId::ConfigureClient => {
                let dir = self.ctx.cache.dir.clone();
                validate_cache_dir(&dir)?;
                self.writer.write(
                    &render_cacheinfo(&dir, self.ctx.cache.size_kb),
                    &files.cacheinfo,
                )?;
                std::fs::create_dir_all(&dir)?;
                Ok(())
            }
        }
    }

    fn start_realm_daemons(&mut self, stage: StageId) -> Result<(), CoreError> {
        match self.ctx.layout.realm {
            RealmVariant::Source => {
                // Both daemons detach on their own; a failure to launch is
                // reported but nothing waits on them.
                for daemon in [Binary::Krb5kdc, Binary::Kadmind] {
                    let spec = self.bin(daemon);
                    let runner = self.runner.clone();
                    thread::Builder::new()
                        .name(daemon.key().to_owned())
                        .spawn(move || {
                            if let Err(e) = runner.run(&spec) {
                                warn!("{daemon}: {e}");
                            }
                        })?;
                }
                Ok(())
            }
            RealmVariant::Ubuntu => {
                for service in ["krb5-admin-server", "krb5-kdc"] {
                    self.batch(stage, self.service(service))?;
                }
                Ok(())
            }
        }
    }

    fn start_cell_server(&mut self, stage: StageId) -> Result<(), CoreError> {
        if self.ctx.layout.supervises_bosserver() {
            let spec = self.bin(Binary::Bosserver).arg("-nofork");
            self.supervisor.start(&spec)?;
            Ok(())
        } else {
            for service in ["openafs-fileserver", "openafs-client"] {
                self.batch(stage, self.service(service))?;
            }
            Ok(())
        }
    }

    fn mode(&self, stage: StageId) -> Mode {
        if self.ctx.tolerant && stage.class() == StageClass::Tolerant {
            Mode::Soft
        } else {
            Mode::Hard
        }
    }

    fn batch(&mut self, stage: StageId, spec: CommandSpec) -> Result<(), CoreError> {
        let status = self.runner.run_mode(&spec, self.mode(stage))?;
        if status != 0 {
            self.warnings
                .push(format!("'{spec}' exited with status {status}"));
        }
        Ok(())
    }

    fn session(
        &mut self,
        stage: StageId,
        spec: CommandSpec,
        script: &SessionScript,
    ) -> Result<(), CoreError> {
        let outcome = self.sessions.run(&spec, script)?;
        check_status(&spec, outcome.status, self.mode(stage))?;
        if outcome.status != 0 {
            self.warnings
                .push(format!("'{spec}' exited with status {}", outcome.status));
        }
        Ok(())
    }

    fn path(&self, binary: Binary) -> &Path {
        self.ctx.layout.binary(binary).as_path()
    }

    fn bin(&self, binary: Binary) -> CommandSpec {
        CommandSpec::new(self.path(binary).as_os_str())
    }

    /// `bos <subcommand> <machine>`
    fn bos(&self, subcommand: &str) -> CommandSpec {
        self.bin(Binary::Bos)
            .arg(subcommand)
            .arg(&self.ctx.identity.machine)
    }

    fn service(&self, name: &str) -> CommandSpec {
        self.bin(Binary::Service).args([name, "restart"])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CellIdentity;
    use crate::secret::Secret;
    use crate::stage::NoopObserver;
    use afscell_layout::{BinaryPath, BinaryTable, DeploymentLayout, LayoutVariant};
    use afscell_runtime::{CrashReport, ExecError};
    use std::cell::RefCell;
    use std::path::PathBuf;

    #[derive(Default)]
    struct RecordingWriter {
        writes: RefCell<Vec<(PathBuf, String)>>,
    }

    impl TemplateWriter for RecordingWriter {
        fn write(&self, content: &str, path: &Path) -> Result<(), CoreError> {
            self.writes
                .borrow_mut()
                .push((path.to_path_buf(), content.to_owned()));
            Ok(())
        }
    }

    fn context(layout: LayoutVariant) -> ProvisioningContext {
        let identity = CellIdentity {
            machine: "fs1".to_owned(),
            cell: "example.org".to_owned(),
            address: "192.0.2.10".to_owned(),
            realm: "EXAMPLE.ORG".to_owned(),
        };
        ProvisioningContext::new(
            DeploymentLayout::resolve(layout, RealmVariant::Source),
            identity,
            Secret::new("master"),
            Secret::new("admin"),
        )
    }

    #[test]
    fn tolerance_applies_only_to_tolerant_stages() {
        let writer = RecordingWriter::default();
        let mut ctx = context(LayoutVariant::Transarc);
        ctx.tolerant = true;
        let orch = Orchestrator::new(ctx, OrchestratorOptions::default(), &writer, &NoopObserver);
        assert_eq!(orch.mode(StageId::CreateAdminPrincipal), Mode::Soft);
        assert_eq!(orch.mode(StageId::VerifyAuthentication), Mode::Hard);
        assert_eq!(orch.mode(StageId::SetCellName), Mode::Hard);

        let strict = Orchestrator::new(
            context(LayoutVariant::Transarc),
            OrchestratorOptions::default(),
            &writer,
            &NoopObserver,
        );
        assert_eq!(strict.mode(StageId::CreateAdminPrincipal), Mode::Hard);
    }

    #[test]
    fn bos_commands_target_machine() {
        let writer = RecordingWriter::default();
        let orch = Orchestrator::new(
            context(LayoutVariant::Transarc),
            OrchestratorOptions::default(),
            &writer,
            &NoopObserver,
        );
        assert_eq!(
            orch.bos("setcellname").arg("example.org").to_string(),
            "/usr/afs/bin/bos setcellname fs1 example.org"
        );
        assert_eq!(
            orch.service("openafs-client").to_string(),
            "service openafs-client restart"
        );
    }

    #[test]
    fn cell_directory_goes_to_client_and_server() {
        let writer = RecordingWriter::default();
        let mut orch = Orchestrator::new(
            context(LayoutVariant::Transarc),
            OrchestratorOptions::default(),
            &writer,
            &NoopObserver,
        );
        orch.execute(StageId::WriteCellDirectory).unwrap();

        let writes = writer.writes.borrow();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0].0, PathBuf::from("/usr/vice/etc/CellServDB"));
        assert_eq!(writes[1].0, PathBuf::from("/usr/vice/etc/server/CellServDB"));
        assert_eq!(writes[0].1, writes[1].1);
        assert!(writes[0].1.starts_with(">example.org"));
    }

    #[test]
    fn crash_between_stages_fails_the_next_stage() {
        let writer = RecordingWriter::default();
        let mut orch = Orchestrator::new(
            context(LayoutVariant::Transarc),
            OrchestratorOptions::default(),
            &writer,
            &NoopObserver,
        );
        orch.supervisor().crash_signal().trip(CrashReport {
            command: "bosserver -nofork".to_owned(),
            status: 1,
        });

        let err = orch.provision().unwrap_err();
        assert_eq!(err.stage(), Some(StageId::ValidateLayout));
        assert!(matches!(
            err.root(),
            CoreError::Exec(ExecError::SupervisorCrash { status: 1, .. })
        ));
        assert_eq!(orch.report().failed_stage(), Some(StageId::ValidateLayout));
        assert!(writer.writes.borrow().is_empty());
    }

    #[test]
    fn validation_fails_before_any_write() {
        let writer = RecordingWriter::default();
        let mut ctx = context(LayoutVariant::Transarc);
        ctx.layout.binaries =
            BinaryTable::from_fn(|b| BinaryPath::new(format!("/nonexistent/afscell/{}", b.key())));
        let mut orch = Orchestrator::new(ctx, OrchestratorOptions::default(), &writer, &NoopObserver);

        let err = orch.provision().unwrap_err();
        assert_eq!(err.stage(), Some(StageId::ValidateLayout));
        assert!(matches!(err.root(), CoreError::Validation(_)));
        assert!(writer.writes.borrow().is_empty());
        assert_eq!(orch.report().stages.len(), 1);
        assert!(!orch.report().success);
    }

    #[test]
    fn key_registration_requires_extracted_version() {
        let writer = RecordingWriter::default();
        let mut orch = Orchestrator::new(
            context(LayoutVariant::Transarc),
            OrchestratorOptions::default(),
            &writer,
            &NoopObserver,
        );
        let err = orch.execute(StageId::RegisterServiceKey).unwrap_err();
        assert!(err.to_string().contains("key version"));
    }

    #[test]
    fn client_cache_collision_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("cache");
        std::fs::write(&cache, "").unwrap();

        let writer = RecordingWriter::default();
        let mut ctx = context(LayoutVariant::Transarc);
        ctx.cache.dir = cache;
        let mut orch = Orchestrator::new(ctx, OrchestratorOptions::default(), &writer, &NoopObserver);
        let err = orch.execute(StageId::ConfigureClient).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        assert!(writer.writes.borrow().is_empty());
    }

    #[test]
    fn client_cache_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("var").join("cache").join("openafs");

        let writer = RecordingWriter::default();
        let mut ctx = context(LayoutVariant::Transarc);
        ctx.cache.dir.clone_from(&cache);
        ctx.cache.size_kb = 1000;
        let mut orch = Orchestrator::new(ctx, OrchestratorOptions::default(), &writer, &NoopObserver);
        orch.execute(StageId::ConfigureClient).unwrap();

        assert!(cache.is_dir());
        let writes = writer.writes.borrow();
        assert_eq!(writes[0].0, PathBuf::from("/usr/vice/etc/cacheinfo"));
        assert_eq!(writes[0].1, format!("/afs:{}:1000", cache.display()));
    }
}

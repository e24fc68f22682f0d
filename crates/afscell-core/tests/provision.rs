//! End-to-end provisioning runs against stub binaries.
//!
//! Every OpenAFS and Kerberos tool is replaced by a small `/bin/sh` script
//! that appends its invocation to a call log and mimics the prompts of the
//! real tool. The stub `bosserver` records its pid and whether it received
//! an interrupt, so teardown can be checked from the outside.
//!
//! Tests hold `SERIAL` so that no other test forks while stubs are being
//! written (which would make executing them fail with ETXTBSY).

use afscell_core::{
    CellIdentity, CoreError, FsTemplateWriter, NoopObserver, Orchestrator, OrchestratorOptions,
    ProvisioningContext, RunReport, Secret, StageId, StageOutcome,
};
use afscell_layout::{
    Binary, BinaryPath, BinaryTable, DeploymentLayout, LayoutVariant, RealmVariant,
};
use afscell_runtime::{ExecError, ServiceState, StopPolicy};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

static SERIAL: Mutex<()> = Mutex::new(());

const ADMIN_PW: &str = "adminpw";

const KDB5_UTIL: &str = r#"
printf 'Enter KDC database master key: '
read a
printf 'Re-enter KDC database master key to verify: '
read b
[ "$a" = "$b" ] || exit 1
"#;

const KADMIN_LOCAL: &str = r#"
while printf 'kadmin.local: ' && read cmd; do
  echo "kadmin_local> $cmd" >> '@ROOT@/calls.log'
  case "$cmd" in
    quit) exit 0 ;;
    "addprinc -randkey"*) ;;
    addprinc*)
      printf 'Enter password for principal "%s": ' "${cmd#addprinc }"
      read p1
      printf '\nRe-enter password for principal "%s": ' "${cmd#addprinc }"
      read p2
      echo
      ;;
  esac
done
"#;

const KINIT: &str = r#"
printf 'Password for %s: ' "$1"
read pw
[ "$pw" = "adminpw" ]
"#;

const KVNO: &str = r#"echo "$3: kvno = 3""#;

const BOSSERVER: &str = r#"
echo $$ >> '@ROOT@/bosserver.pids'
trap 'echo $$ >> "@ROOT@/bosserver.stopped"; exit 0' INT
while :; do sleep 0.05; done
"#;

const PTS: &str = r#"
if [ "$1" = createuser ] && [ -e '@ROOT@/fail-pts-createuser' ]; then
  echo "pts: Entry for name already exists" >&2
  exit 1
fi
"#;

struct Fixture {
    _guard: MutexGuard<'static, ()>,
    dir: tempfile::TempDir,
}

impl Fixture {
    fn new() -> Self {
        let guard = SERIAL.lock().unwrap_or_else(PoisonError::into_inner);
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("bin")).unwrap();
        let fixture = Self { _guard: guard, dir };
        for binary in Binary::ALL {
            let body = match binary {
                Binary::Kdb5Util => KDB5_UTIL,
                Binary::KadminLocal => KADMIN_LOCAL,
                Binary::Kinit => KINIT,
                Binary::Kvno => KVNO,
                Binary::Bosserver => BOSSERVER,
                Binary::Pts => PTS,
                _ => "",
            };
            fixture.stub(binary, body);
        }
        fixture
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn stub(&self, binary: Binary, body: &str) {
        let path = self.root().join("bin").join(binary.key());
        let script = format!(
            "#!/bin/sh\necho \"{} $*\" >> '{}'\n{}\nexit $?\n",
            binary.key(),
            self.root().join("calls.log").display(),
            body.replace("@ROOT@", &self.root().display().to_string()),
        );
        fs::write(&path, script).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    fn touch(&self, name: &str) {
        fs::write(self.root().join(name), "").unwrap();
    }

    fn layout(&self, variant: LayoutVariant, realm: RealmVariant) -> DeploymentLayout {
        let mut layout = DeploymentLayout::resolve(variant, realm);
        let bin = self.root().join("bin");
        layout.binaries = BinaryTable::from_fn(|b| BinaryPath::new(bin.join(b.key())));
        let etc = self.root().join("etc");
        layout.files.keytab = etc.join("afs.keytab");
        layout.files.cellservdb_client = etc.join("CellServDB");
        layout.files.cellservdb_server = etc.join("server").join("CellServDB");
        layout.files.cacheinfo = etc.join("cacheinfo");
        layout.files.krb5_conf = etc.join("krb5.conf");
        layout.files.kadm5_acl = etc.join("kadm5.acl");
        layout
    }

    fn context(&self, layout: DeploymentLayout, tolerant: bool, upgrade: bool) -> ProvisioningContext {
        let identity = CellIdentity {
            machine: "fs1".to_owned(),
            cell: "example.org".to_owned(),
            address: "192.0.2.10".to_owned(),
            realm: "EXAMPLE.ORG".to_owned(),
        };
        let mut ctx =
            ProvisioningContext::new(layout, identity, Secret::new("masterkey"), Secret::new(ADMIN_PW));
        ctx.tolerant = tolerant;
        ctx.upgrade = upgrade;
        ctx.cache.dir = self.root().join("cache");
        ctx
    }

    fn provision(&self, ctx: ProvisioningContext) -> (Result<(), CoreError>, RunReport, ServiceState) {
        let writer = FsTemplateWriter::new(true);
        let options = OrchestratorOptions {
            session_timeout: Duration::from_secs(10),
            stop_policy: StopPolicy {
                attempts: 20,
                interval: Duration::from_millis(50),
            },
        };
        let mut orch = Orchestrator::new(ctx, options, &writer, &NoopObserver);
        let result = orch.provision();
        let state = orch.supervisor().state();
        (result, orch.into_report(), state)
    }

    fn calls(&self) -> Vec<String> {
        fs::read_to_string(self.root().join("calls.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_owned)
            .collect()
    }

    fn called(&self, line: &str) -> bool {
        self.calls().iter().any(|c| c == line)
    }

    fn lines_of(&self, name: &str) -> Vec<u32> {
        fs::read_to_string(self.root().join(name))
            .unwrap_or_default()
            .lines()
            .map(|l| l.trim().parse().unwrap())
            .collect()
    }

    fn keytab(&self) -> String {
        self.root().join("etc").join("afs.keytab").display().to_string()
    }
}

fn alive(pid: u32) -> bool {
    Path::new(&format!("/proc/{pid}")).exists()
}

fn outcome_of(report: &RunReport, stage: StageId) -> Option<&StageOutcome> {
    report
        .stages
        .iter()
        .find(|r| r.stage == stage)
        .map(|r| &r.outcome)
}

#[test]
fn tolerant_first_run_completes() {
    let fx = Fixture::new();
    let layout = fx.layout(LayoutVariant::Transarc, RealmVariant::Source);
    let (result, report, state) = fx.provision(fx.context(layout, true, false));

    result.unwrap();
    assert!(report.success);
    assert_eq!(report.stages.len(), StageId::ALL.len());
    assert_eq!(state, ServiceState::Stopped);
    assert_eq!(report.supervisor, ServiceState::Stopped);
    assert_eq!(report.key_version.as_ref().map(|k| k.get()), Some(3));

    let cache = fx.root().join("cache");
    assert!(cache.is_dir());
    assert_eq!(
        fs::read_to_string(fx.root().join("etc").join("cacheinfo")).unwrap(),
        format!("/afs:{}:50000", cache.display())
    );

    let krb5 = fs::read_to_string(fx.root().join("etc").join("krb5.conf")).unwrap();
    assert!(krb5.contains("default_realm = EXAMPLE.ORG"));
    let client_db = fs::read_to_string(fx.root().join("etc").join("CellServDB")).unwrap();
    let server_db =
        fs::read_to_string(fx.root().join("etc").join("server").join("CellServDB")).unwrap();
    assert_eq!(client_db, server_db);
    assert_eq!(
        fs::read_to_string(fx.root().join("etc").join("kadm5.acl")).unwrap(),
        "admin x\n"
    );

    assert!(fx.called("kdb5_util create -s"));
    assert!(fx.called("kadmin_local> addprinc admin@EXAMPLE.ORG"));
    assert!(fx.called("kinit admin@EXAMPLE.ORG"));
    assert!(fx.called(&format!(
        "kadmin_local> ktadd -k {} -e aes256-cts-hmac-sha1-96:normal,aes128-cts-hmac-sha1-96:normal afs/example.org@EXAMPLE.ORG",
        fx.keytab()
    )));
    assert!(fx.called(&format!("kvno -k {} afs/example.org@EXAMPLE.ORG", fx.keytab())));
    assert!(fx.called(&format!(
        "asetkey add 3 {} afs/example.org@EXAMPLE.ORG",
        fx.keytab()
    )));
    assert!(fx.called("bos setcellname fs1 example.org -localauth"));
    assert!(fx.called("pts createuser -name admin -cell example.org -localauth"));
    assert!(fx.called("pts adduser -user admin -group system:administrators -localauth"));
    assert!(fx.called("bos restart fs1 -all -localauth"));
    assert!(fx.called("vos create fs1 /vicepa root.afs -localauth"));
    assert!(!fx.calls().iter().any(|c| c.starts_with("vos sync")));

    // Started in the foreground, replaced, then stopped gracefully at teardown.
    assert!(fx.called("bosserver -nofork"));
    let pids = fx.lines_of("bosserver.pids");
    assert_eq!(pids.len(), 2);
    assert!(pids.iter().all(|pid| !alive(*pid)));
    assert_eq!(fx.lines_of("bosserver.stopped"), vec![pids[1]]);
}

#[test]
fn calls_follow_stage_order() {
    let fx = Fixture::new();
    let layout = fx.layout(LayoutVariant::Transarc, RealmVariant::Source);
    let (result, _, _) = fx.provision(fx.context(layout, false, false));
    result.unwrap();

    let calls = fx.calls();
    let position = |prefix: &str| {
        calls
            .iter()
            .position(|c| c.starts_with(prefix))
            .unwrap_or_else(|| panic!("no call starting with '{prefix}'"))
    };
    let order = [
        "kdb5_util create",
        "kadmin_local> addprinc admin",
        "kinit ",
        "kadmin_local> addprinc -randkey",
        "kvno ",
        "klist -e -k",
        "asetkey add",
        "bos setcellname",
        "bos create fs1 buserver",
        "bos create fs1 ptserver",
        "bos create fs1 vlserver",
        "bos adduser",
        "pts createuser",
        "pts membership",
        "bos restart",
        "bos create fs1 dafs",
        "bos status fs1 dafs",
        "vos create",
        "bos create fs1 upserver",
    ];
    for pair in order.windows(2) {
        assert!(
            position(pair[0]) < position(pair[1]),
            "'{}' should run before '{}'",
            pair[0],
            pair[1]
        );
    }
}

#[test]
fn upgrade_synchronizes_instead_of_creating() {
    let fx = Fixture::new();
    let layout = fx.layout(LayoutVariant::Transarc, RealmVariant::Source);
    let (result, report, state) = fx.provision(fx.context(layout, true, true));

    result.unwrap();
    assert!(report.upgrade);
    assert_eq!(state, ServiceState::Stopped);
    assert!(fx.called("vos syncvldb fs1 -verbose -localauth"));
    assert!(fx.called("vos syncserv fs1 -verbose -localauth"));
    assert!(!fx.calls().iter().any(|c| c.starts_with("vos create")));
}

#[test]
fn strict_run_aborts_on_failed_creation() {
    let fx = Fixture::new();
    fx.touch("fail-pts-createuser");
    let layout = fx.layout(LayoutVariant::Transarc, RealmVariant::Source);
    let (result, report, state) = fx.provision(fx.context(layout, false, false));

    let err = result.unwrap_err();
    assert_eq!(err.stage(), Some(StageId::InitializeProtectionDb));
    assert!(matches!(
        err.root(),
        CoreError::Exec(ExecError::CommandFailed { status: 1, .. })
    ));
    assert!(!report.success);
    assert_eq!(report.failed_stage(), Some(StageId::InitializeProtectionDb));

    // Nothing after the failing command ran.
    assert!(!fx.calls().iter().any(|c| c.starts_with("pts adduser")));
    assert!(!fx.calls().iter().any(|c| c.starts_with("bos restart")));
    assert!(!fx.root().join("etc").join("cacheinfo").exists());

    // The background server was torn down before returning.
    assert_eq!(state, ServiceState::Stopped);
    let pids = fx.lines_of("bosserver.pids");
    assert!(!pids.is_empty());
    assert!(pids.iter().all(|pid| !alive(*pid)));
}

#[test]
fn tolerant_run_downgrades_failed_creation() {
    let fx = Fixture::new();
    fx.touch("fail-pts-createuser");
    let layout = fx.layout(LayoutVariant::Transarc, RealmVariant::Source);
    let (result, report, _) = fx.provision(fx.context(layout, true, false));

    result.unwrap();
    match outcome_of(&report, StageId::InitializeProtectionDb) {
        Some(StageOutcome::Tolerated { warnings }) => {
            assert_eq!(warnings.len(), 1);
            assert!(warnings[0].contains("createuser"));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(fx.called("pts adduser -user admin -group system:administrators -localauth"));
    assert_eq!(report.warning_count(), 1);
}

#[test]
fn failed_authentication_is_fatal_even_when_tolerant() {
    let fx = Fixture::new();
    fx.stub(Binary::Kinit, "printf 'Password for %s: ' \"$1\"\nread pw\nexit 1");
    let layout = fx.layout(LayoutVariant::Transarc, RealmVariant::Source);
    let (result, _, state) = fx.provision(fx.context(layout, true, false));

    let err = result.unwrap_err();
    assert_eq!(err.stage(), Some(StageId::VerifyAuthentication));
    assert_eq!(state, ServiceState::Stopped);
    assert!(!fx.calls().iter().any(|c| c.starts_with("kvno")));
}

#[test]
fn missing_key_version_is_fatal_even_when_tolerant() {
    let fx = Fixture::new();
    fx.stub(Binary::Kvno, "echo 'kvno: Server not found in Kerberos database'");
    let layout = fx.layout(LayoutVariant::Transarc, RealmVariant::Source);
    let (result, report, _) = fx.provision(fx.context(layout, true, false));

    let err = result.unwrap_err();
    assert_eq!(err.stage(), Some(StageId::ExtractKeyVersion));
    assert!(matches!(
        err.root(),
        CoreError::Exec(ExecError::Extraction { .. })
    ));
    assert!(report.key_version.is_none());
    assert!(!fx.calls().iter().any(|c| c.starts_with("asetkey")));
}

#[test]
fn hung_session_times_out_even_when_tolerant() {
    let fx = Fixture::new();
    fx.stub(Binary::KadminLocal, "sleep 30");
    let layout = fx.layout(LayoutVariant::Transarc, RealmVariant::Source);
    let ctx = fx.context(layout, true, false);

    let writer = FsTemplateWriter::new(false);
    let options = OrchestratorOptions {
        session_timeout: Duration::from_millis(500),
        stop_policy: StopPolicy::default(),
    };
    let mut orch = Orchestrator::new(ctx, options, &writer, &NoopObserver);
    let err = orch.provision().unwrap_err();
    assert_eq!(err.stage(), Some(StageId::CreateAdminPrincipal));
    assert!(matches!(
        err.root(),
        CoreError::Exec(ExecError::SessionTimeout { .. })
    ));
}

#[test]
fn supervisor_crash_aborts_the_run() {
    let fx = Fixture::new();
    fx.stub(Binary::Bosserver, "sleep 0.2\nexit 1");
    fx.stub(Binary::Bos, "sleep 2");
    let layout = fx.layout(LayoutVariant::Transarc, RealmVariant::Source);

    let start = Instant::now();
    let (result, report, state) = fx.provision(fx.context(layout, true, false));
    let err = result.unwrap_err();

    assert!(matches!(
        err.root(),
        CoreError::Exec(ExecError::SupervisorCrash { status: 1, .. })
    ));
    assert!(err.stage().is_some());
    assert_eq!(report.failed_stage(), err.stage());
    assert!(!report.success);
    assert_eq!(state, ServiceState::Stopped);
    // Aborted while the first `bos` command was still sleeping.
    assert!(start.elapsed() < Duration::from_secs(8));
    assert!(!fx.calls().iter().any(|c| c.starts_with("pts")));
}

#[test]
fn ubuntu_layout_uses_service_scripts() {
    let fx = Fixture::new();
    let layout = fx.layout(LayoutVariant::Ubuntu, RealmVariant::Ubuntu);
    let (result, report, state) = fx.provision(fx.context(layout, false, false));

    result.unwrap();
    assert!(report.success);
    assert_eq!(state, ServiceState::Stopped);
    assert!(fx.called("service krb5-admin-server restart"));
    assert!(fx.called("service krb5-kdc restart"));
    let fileserver_restarts = fx
        .calls()
        .iter()
        .filter(|c| *c == "service openafs-fileserver restart")
        .count();
    assert_eq!(fileserver_restarts, 2);
    assert!(fx.called(
        "kadmin_local> addprinc -randkey -e des-cbc-crc:v4 afs/example.org@EXAMPLE.ORG"
    ));
    assert!(fx.lines_of("bosserver.pids").is_empty());
}

#[test]
fn source_realm_launches_daemons_in_background() {
    let fx = Fixture::new();
    let layout = fx.layout(LayoutVariant::Source, RealmVariant::Source);
    let (result, _, _) = fx.provision(fx.context(layout, false, false));
    result.unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while !(fx.called("krb5kdc ") && fx.called("kadmind ")) {
        assert!(Instant::now() < deadline, "realm daemons never ran");
        std::thread::sleep(Duration::from_millis(20));
    }
    assert!(!fx.called("service krb5-kdc restart"));
}

#[test]
fn missing_binary_fails_validation_before_any_command() {
    let fx = Fixture::new();
    fs::remove_file(fx.root().join("bin").join("vlserver")).unwrap();
    let layout = fx.layout(LayoutVariant::Transarc, RealmVariant::Source);
    let (result, report, _) = fx.provision(fx.context(layout, true, false));

    let err = result.unwrap_err();
    assert_eq!(err.stage(), Some(StageId::ValidateLayout));
    assert!(err.to_string().contains("vlserver"));
    assert_eq!(report.stages.len(), 1);
    assert!(fx.calls().is_empty());
    assert!(!fx.root().join("etc").exists());
}

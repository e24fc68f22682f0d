use super::{describe, load_config, resolve_layout, EXIT_SUCCESS};
use afscell_core::{
    resolve_secret, CellIdentity, CoreError, FsTemplateWriter, Orchestrator, OrchestratorOptions,
    ProvisioningContext, RunLock, Secret, SecretPrompt, StageId, StageObserver, StageOutcome,
};
use afscell_layout::{LayoutVariant, RealmVariant};
use afscell_runtime::StopPolicy;
use clap::Args;
use console::Style;
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Debug, Args)]
pub struct SetupArgs {
    /// Filesystem layout of the OpenAFS installation.
    pub layout: LayoutVariant,
    /// Filesystem layout of the Kerberos installation.
    pub realm_layout: RealmVariant,
    /// Host name of this server within the cell.
    pub machine: String,
    /// Name of the cell to create.
    pub cell: String,
    /// IP address the cell's servers listen on.
    pub cell_address: String,
    /// Kerberos realm to create.
    pub realm: String,
    /// Realm master key (prompted for when omitted).
    #[arg(long)]
    pub krb_pw: Option<String>,
    /// Password of the admin principal (prompted for when omitted).
    #[arg(long)]
    pub admin_pw: Option<String>,
    /// Do not diff and verify configuration files after writing them.
    #[arg(long, default_value_t = false)]
    pub skip_output_check: bool,
    /// Keep going when creating something that already exists fails.
    #[arg(long, default_value_t = false)]
    pub no_fail: bool,
    /// Synchronize an existing cell's volume databases instead of creating
    /// the root volume.
    #[arg(long, default_value_t = false)]
    pub upgrade: bool,
    /// TOML file with path overrides and tunables.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

pub fn run(args: SetupArgs, json: bool) -> Result<u8, String> {
    let config = load_config(args.config.as_deref())?;
    let layout = resolve_layout(&config, args.layout, args.realm_layout)?;
    debug!(
        "resolved {} layout with {} realm layout",
        layout.variant, layout.realm
    );

    let identity = CellIdentity {
        machine: args.machine,
        cell: args.cell,
        address: args.cell_address,
        realm: args.realm,
    };
    identity.validate().map_err(|e| describe(&e))?;

    let lock = RunLock::acquire(&config.run.lock_file).map_err(|e| describe(&e))?;
    info!("holding run lock {}", lock.path().display());

    let prompt = TerminalPrompt;
    let realm_secret = resolve_secret(
        args.krb_pw.map(Secret::new),
        "--krb-pw",
        "Kerberos realm master key",
        &prompt,
    )
    .map_err(|e| describe(&e))?;
    let admin_secret = resolve_secret(
        args.admin_pw.map(Secret::new),
        "--admin-pw",
        &format!("password for {}", identity.admin_principal()),
        &prompt,
    )
    .map_err(|e| describe(&e))?;

    let mut ctx = ProvisioningContext::new(layout, identity, realm_secret, admin_secret);
    ctx.tolerant = args.no_fail;
    ctx.upgrade = args.upgrade;
    ctx.cache = config.cache.clone();

    let options = OrchestratorOptions {
        session_timeout: config.session_timeout(),
        stop_policy: StopPolicy {
            attempts: config.supervisor.stop_attempts,
            interval: config.stop_interval(),
        },
    };
    let writer = FsTemplateWriter::new(!args.skip_output_check);
    let observer = ProgressPrinter { quiet: json };

    let mut orchestrator = Orchestrator::new(ctx, options, &writer, &observer);
    let result = orchestrator.provision();
    let report = orchestrator.into_report();
    drop(lock);

    if json {
        let payload = report
            .to_json()
            .map_err(|e| format!("JSON serialization failed: {e}"))?;
        println!("{payload}");
    } else if result.is_ok() {
        let kvno = report
            .key_version
            .map_or_else(|| "unknown".to_owned(), |k| k.to_string());
        println!(
            "cell {} ready (realm {}, service key version {kvno}, {} tolerated failures)",
            report.cell,
            report.realm,
            report.warning_count()
        );
    }

    result.map_err(|e| describe(&e))?;
    Ok(EXIT_SUCCESS)
}

/// Non-echoing terminal prompt with confirmation.
struct TerminalPrompt;

impl SecretPrompt for TerminalPrompt {
    fn prompt(&self, label: &str) -> Result<Secret, CoreError> {
        let value = dialoguer::Password::new()
            .with_prompt(label)
            .with_confirmation("Repeat", "entries do not match")
            .interact()
            .map_err(|e| CoreError::Validation(format!("cannot read {label}: {e}")))?;
        Ok(Secret::new(value))
    }
}

/// One line per stage on stderr, colored by outcome.
struct ProgressPrinter {
    quiet: bool,
}

impl StageObserver for ProgressPrinter {
    fn stage_started(&self, stage: StageId, index: usize, total: usize) {
        if !self.quiet {
            eprintln!(
                "{} {}",
                Style::new().dim().apply_to(format!("[{:>2}/{total}]", index + 1)),
                Style::new().bold().apply_to(stage.summary())
            );
        }
    }

    fn stage_finished(&self, stage: StageId, outcome: &StageOutcome) {
        if self.quiet {
            return;
        }
        match outcome {
            StageOutcome::Succeeded => {}
            StageOutcome::Tolerated { warnings } => {
                for w in warnings {
                    eprintln!("  {} {w}", Style::new().yellow().apply_to("⚠"));
                }
            }
            StageOutcome::Failed { error } => {
                eprintln!("  {} {stage}: {error}", Style::new().red().apply_to("✗"));
            }
        }
    }
}

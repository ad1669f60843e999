//! rksvc - reasonkit-web service lifecycle manager
//!
//! Usage:
//!   rksvc install [--binary PATH]    # Provision, install and start the daemon
//!   rksvc upgrade [--binary PATH]    # Swap the binary in place
//!   rksvc configure                  # Prompt for (or read from env) settings
//!   rksvc verify [--json]            # Check the installation
//!   rksvc uninstall [--purge]        # Remove the daemon

mod interactive;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use console::style;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rksvc_core::binary::discover_candidate;
use rksvc_core::commands::{
    ConfigureCommand, ConfigureOptions, InstallCommand, InstallOptions, UninstallCommand,
    UninstallOutcome, UpgradeCommand, UpgradeOptions, VerifyCommand,
};
use rksvc_core::config::ConfigOverrides;
use rksvc_core::definition::ServiceDefinition;
use rksvc_core::host::{LifecycleContext, SystemHost, Systemctl};
use rksvc_core::outcome::StepReport;
use rksvc_core::preflight::check_privilege;
use rksvc_core::uninstall::{UninstallOptions, UninstallReport};
use rksvc_core::verify::{CheckStatus, VerificationReport};
use rksvc_core::LifecycleError;

use crate::interactive::{ConfigureFlow, PromptConfirm};

#[derive(Parser)]
#[command(name = "rksvc")]
#[command(version, about = "reasonkit-web service lifecycle manager", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision the account and directories, install the binary and start the service
    Install(InstallArgs),

    /// Replace the installed binary, keeping configuration and data
    Upgrade(UpgradeArgs),

    /// Create or update the configuration file
    ///
    /// Values come from prompts, or from REASONKIT_* environment variables
    /// with --non-interactive. Keys that are not supplied keep their current value.
    Configure(ConfigureArgs),

    /// Check the installation and report each check
    Verify {
        /// Show details for passing checks too
        #[arg(short, long)]
        verbose: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Stop and remove the service
    ///
    /// Configuration, data, logs and the service account are kept unless
    /// --purge or --remove-account is given.
    #[command(alias = "rm")]
    Uninstall {
        /// Also delete configuration, data and logs
        #[arg(long)]
        purge: bool,

        /// Also delete the service account and group
        #[arg(long)]
        remove_account: bool,

        /// Skip confirmation prompts
        #[arg(short = 'y', long)]
        yes: bool,
    },
}

#[derive(Args)]
struct InstallArgs {
    /// Built artifact to install
    ///
    /// Defaults to ./reasonkit-web or ./target/release/reasonkit-web
    #[arg(long, value_name = "PATH")]
    binary: Option<PathBuf>,

    /// Installation prefix for the binary
    #[arg(long, value_name = "DIR")]
    prefix: Option<PathBuf>,

    /// Use an existing account and group instead of creating them
    #[arg(long)]
    skip_user: bool,

    /// Do not install missing utilities (curl, ca-certificates)
    #[arg(long)]
    skip_dependency: bool,

    /// Skip confirmation prompts (for CI/CD)
    #[arg(short = 'y', long)]
    yes: bool,
}

#[derive(Args)]
struct UpgradeArgs {
    /// Built artifact to install
    ///
    /// Defaults to ./reasonkit-web or ./target/release/reasonkit-web
    #[arg(long, value_name = "PATH")]
    binary: Option<PathBuf>,

    /// Skip confirmation prompts (for CI/CD)
    #[arg(short = 'y', long)]
    yes: bool,
}

#[derive(Args)]
struct ConfigureArgs {
    /// Read values from REASONKIT_* environment variables instead of prompting
    #[arg(long)]
    non_interactive: bool,

    /// Start the service afterwards, restarting it if running
    #[arg(long)]
    start: bool,

    /// Enable the service at boot
    #[arg(long)]
    enable: bool,

    /// Write without asking for confirmation
    #[arg(short = 'y', long)]
    yes: bool,
}

fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rksvc=info,rksvc_core=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // Help and version exit 0; usage errors exit 2.
            let _ = err.print();
            return ExitCode::from(err.exit_code() as u8);
        }
    };

    match run_cli(cli.command) {
        Ok(code) => code,
        Err(err) => {
            report_error(&err);
            ExitCode::FAILURE
        }
    }
}

fn report_error(err: &anyhow::Error) {
    match err.downcast_ref::<LifecycleError>() {
        Some(lifecycle) => {
            eprintln!(
                "{} {}: {:#}",
                style("error:").red().bold(),
                lifecycle.class(),
                err
            );
            eprintln!("  {} {}", style("hint:").yellow(), lifecycle.hint());
        }
        None => eprintln!("{} {:#}", style("error:").red().bold(), err),
    }
}

fn run_cli(command: Commands) -> Result<ExitCode> {
    let host = SystemHost::new();
    let supervisor = Systemctl::new();
    // An explicit prefix only applies to install; later commands follow the symlink.
    let definition = match &command {
        Commands::Install(InstallArgs {
            prefix: Some(prefix),
            ..
        }) => ServiceDefinition::reasonkit().with_prefix(prefix),
        _ => ServiceDefinition::reasonkit().with_installed_prefix(),
    };
    let ctx = LifecycleContext::new(&definition, &host, &supervisor);

    match command {
        Commands::Install(args) => run_install(ctx, args)?,
        Commands::Upgrade(args) => run_upgrade(ctx, args)?,
        Commands::Configure(args) => run_configure(ctx, args)?,
        Commands::Verify { verbose, json } => {
            let report = VerifyCommand::new(ctx).execute();
            if json {
                println!("{}", report.to_json()?);
            } else {
                print_verification(&report, verbose);
            }
            return Ok(ExitCode::from(report.exit_code()));
        }
        Commands::Uninstall {
            purge,
            remove_account,
            yes,
        } => {
            let options = UninstallOptions::default()
                .with_purge(purge)
                .with_remove_account(remove_account);
            let confirm = PromptConfirm::new(yes);
            match UninstallCommand::new(ctx, &confirm).execute(options)? {
                UninstallOutcome::Completed(report) => print_uninstall_result(&report),
                UninstallOutcome::Cancelled => println!("Uninstall cancelled."),
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// The explicit path, else a build artifact next to the working directory.
fn resolve_artifact(explicit: Option<PathBuf>, service_name: &str) -> Result<Option<PathBuf>> {
    if explicit.is_some() {
        return Ok(explicit);
    }
    let cwd = std::env::current_dir()?;
    let found = discover_candidate(&cwd, service_name);
    if let Some(path) = &found {
        tracing::info!(path = %path.display(), "using discovered artifact");
    }
    Ok(found)
}

fn run_install(ctx: LifecycleContext<'_>, args: InstallArgs) -> Result<()> {
    let def = ctx.definition;
    let mut options = InstallOptions::default()
        .with_skip_account(args.skip_user)
        .with_skip_dependencies(args.skip_dependency);
    if let Some(binary) = resolve_artifact(args.binary, &def.service_name)? {
        options = options.with_binary(binary);
    }

    let confirm = PromptConfirm::new(args.yes);
    let report = InstallCommand::new(ctx, &confirm).execute(&options)?;

    print_steps(&report.steps);
    print_warnings(&report.warnings);
    if report.changed() {
        println!(
            "✓ Installed {} {}",
            def.service_name,
            report.installed_version.as_deref().unwrap_or("(unknown version)")
        );
    } else {
        println!("• {} is already installed and up to date", def.service_name);
    }
    println!("  Configuration: {}", def.config_file.display());
    println!("  Next: `rksvc configure` to adjust settings, `rksvc verify` to check the service");
    Ok(())
}

fn run_upgrade(ctx: LifecycleContext<'_>, args: UpgradeArgs) -> Result<()> {
    let def = ctx.definition;
    let binary = resolve_artifact(args.binary, &def.service_name)?.ok_or_else(|| {
        LifecycleError::BinaryInvalid {
            path: PathBuf::from(&def.service_name),
            reason: "no artifact given and none found in the working directory".to_string(),
        }
    })?;

    let confirm = PromptConfirm::new(args.yes);
    let report = UpgradeCommand::new(ctx, &confirm).execute(&UpgradeOptions::new(binary))?;

    print_steps(&report.steps);
    print_warnings(&report.warnings);
    match (&report.previous_version, &report.installed_version) {
        (Some(old), Some(new)) if old != new => println!("✓ Upgraded {old} -> {new}"),
        (_, Some(new)) => println!("• {new} is installed"),
        _ => println!("✓ Upgraded {}", def.service_name),
    }
    if !report.status.active {
        println!("  {} is not running; start it with `rksvc configure --start`", def.service_name);
    }
    Ok(())
}

fn run_configure(ctx: LifecycleContext<'_>, args: ConfigureArgs) -> Result<()> {
    let from_env = ConfigOverrides::from_env()?;
    let command = ConfigureCommand::new(ctx);

    let overrides = if args.non_interactive || !console::user_attended() {
        from_env
    } else {
        // Prompting is pointless if the write will be refused.
        check_privilege(ctx.host)?;
        let mut flow = ConfigureFlow::new(command.current_document()?, from_env, args.yes);
        let result = flow.collect()?;
        if !result.confirmed {
            println!("Configuration cancelled.");
            return Ok(());
        }
        result.overrides
    };

    let options = ConfigureOptions::new(overrides)
        .with_enable(args.enable)
        .with_start(args.start);
    let report = command.execute(&options)?;

    print_steps(&report.steps);
    print_warnings(&report.warnings);
    if let Some(backup) = &report.backup {
        println!("  Previous configuration saved to {}", backup.display());
    }
    println!(
        "✓ Configuration at {} ({})",
        ctx.definition.config_file.display(),
        if report.status.active { "service running" } else { "service stopped" }
    );
    Ok(())
}

fn print_steps(steps: &[StepReport]) {
    for step in steps.iter().filter(|step| step.outcome.changed()) {
        println!("  {} {:<20} {}", style("✓").green(), step.step, step.detail);
    }
}

fn print_warnings(warnings: &[String]) {
    for warning in warnings {
        println!("  {} {}", style("⚠").yellow(), warning);
    }
}

fn print_verification(report: &VerificationReport, verbose: bool) {
    println!("Host: {}", report.hostname());
    println!();
    println!("  {:<20} {:<6} Detail", "Check", "Status");
    println!("  {}", "-".repeat(70));

    for check in report.checks() {
        let status = match check.status {
            CheckStatus::Pass => style(check.status.label()).green(),
            CheckStatus::Warn => style(check.status.label()).yellow(),
            CheckStatus::Fail => style(check.status.label()).red(),
        };
        let detail = if verbose || check.status != CheckStatus::Pass {
            check.detail.as_str()
        } else {
            ""
        };
        println!("  {:<20} {:<6} {}", check.name, status, detail);
    }

    let summary = report.summary();
    println!();
    println!(
        "Summary: {} passed, {} failed, {} warnings",
        summary.passed, summary.failed, summary.warnings
    );
}

fn print_uninstall_result(report: &UninstallReport) {
    print_steps(&report.steps);
    print_warnings(&report.warnings);
    println!("✓ Uninstalled reasonkit-web");

    if !report.preserved_paths.is_empty() {
        println!("  Kept (remove with --purge):");
        for path in &report.preserved_paths {
            println!("    {}", path.display());
        }
    }
    if let Some(account) = &report.preserved_account {
        println!("  Kept account '{account}' (remove with --remove-account)");
    }
}

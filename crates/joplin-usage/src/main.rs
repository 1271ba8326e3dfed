use anyhow::{bail, Context as _, Result};
use clap::{Args, Parser, Subcommand};
use joplin_usage_core::engine::{generate_report, ReportRun};
use joplin_usage_core::error::PreconditionError;
use joplin_usage_core::http::JoplinHttpApi;
use joplin_usage_core::lifecycle::{sweep_pending, PendingLedger};
use joplin_usage_core::logging::init_tracing;
use joplin_usage_core::markdown::outline;
use joplin_usage_core::settings::{
    app_config_dir, load_effective_settings, pending_ledger_path, save_settings, settings_path,
    UsageSettings,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(
    name = "joplin-usage",
    version,
    about = "Disk usage report for Joplin notebooks, built from the Joplin Data API"
)]
struct Cli {
    /// Directory holding settings.json and the pending placeholder ledger
    #[arg(long, global = true, env = "JOPLIN_USAGE_CONFIG")]
    config_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log level or filter directive (overrides --verbose)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compute the report and publish it as a note in the target notebook
    Report(ReportArgs),
    /// Delete placeholder notes left behind by interrupted runs
    Sweep(ConnectionArgs),
    /// Check that the Data API is reachable
    Ping(ConnectionArgs),
    /// Write default settings to the config directory
    InitConfig {
        /// Overwrite an existing settings file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args, Debug, Default)]
struct ConnectionArgs {
    /// Data API base URL
    #[arg(long)]
    url: Option<String>,

    /// Data API token
    #[arg(long)]
    token: Option<String>,
}

#[derive(Args, Debug)]
struct ReportArgs {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// Notebook id or exact title that receives the report
    #[arg(long)]
    notebook: Option<String>,

    /// Parallel linkage lookups (1 = sequential)
    #[arg(long)]
    concurrency: Option<usize>,

    /// Resources requested per page (max 100)
    #[arg(long)]
    page_size: Option<usize>,

    /// Title of the report note
    #[arg(long)]
    title: Option<String>,

    /// Print the report instead of publishing it
    #[arg(long)]
    dry_run: bool,

    /// Print a per-notebook summary after the run
    #[arg(long)]
    summary: bool,

    /// Print run statistics as JSON
    #[arg(long)]
    json_stats: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = init_tracing(cli.verbose, cli.log_level.as_deref(), cli.log_json) {
        eprintln!("warning: logging disabled: {err}");
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            if err.downcast_ref::<PreconditionError>().is_some() {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config_dir = cli.config_dir.clone().unwrap_or_else(app_config_dir);
    tracing::debug!(config_dir = %config_dir.display(), "using config dir");

    match cli.command {
        Command::Report(args) => cmd_report(&config_dir, args),
        Command::Sweep(args) => cmd_sweep(&config_dir, args),
        Command::Ping(args) => cmd_ping(&config_dir, args),
        Command::InitConfig { force } => cmd_init_config(&config_dir, force),
    }
}

fn load_with_connection(config_dir: &Path, args: &ConnectionArgs) -> Result<UsageSettings> {
    let mut settings = load_effective_settings(config_dir)?;
    if let Some(url) = &args.url {
        settings.api.base_url = url.clone();
    }
    if let Some(token) = &args.token {
        settings.api.token = Some(token.clone());
    }
    Ok(settings)
}

fn connect(settings: &UsageSettings) -> Result<JoplinHttpApi> {
    let api = JoplinHttpApi::new(settings.http_config());
    api.ping()
        .with_context(|| format!("reach data api at {}", api.config().base_url))?;
    Ok(api)
}

fn cmd_report(config_dir: &Path, args: ReportArgs) -> Result<()> {
    let mut settings = load_with_connection(config_dir, &args.connection)?;
    if let Some(notebook) = args.notebook {
        settings.report.target_notebook = Some(notebook);
    }
    if let Some(concurrency) = args.concurrency {
        settings.report.linkage_concurrency = concurrency;
    }
    if let Some(page_size) = args.page_size {
        settings.report.page_size = page_size;
    }
    if let Some(title) = args.title {
        settings.report.title = title;
    }

    let api = connect(&settings)?;
    let mut options = settings.report_options();
    options.dry_run = args.dry_run;

    let mut ledger = if args.dry_run {
        PendingLedger::in_memory()
    } else {
        PendingLedger::load(pending_ledger_path(config_dir))?
    };

    let run = generate_report(&api, &mut ledger, &options)?;

    if args.dry_run {
        print!("{}", run.body);
    } else if let Some(report_id) = &run.report_id {
        println!("report published: {report_id}");
    }
    if !run.swept.deleted.is_empty() {
        println!(
            "removed {} stale placeholder(s) from an earlier run",
            run.swept.deleted.len()
        );
    }
    if args.summary {
        print_summary(&run);
    }
    if args.json_stats {
        println!("{}", serde_json::to_string_pretty(&run.stats)?);
    }
    Ok(())
}

fn print_summary(run: &ReportRun) {
    let report = outline(&run.body);
    for section in &report.sections {
        println!(
            "{:>10} MB  {}  ({} resources)",
            section.total_megabytes,
            section.notebook_title,
            section.resources.len()
        );
    }
    println!(
        "{} resources, {} unreferenced, {} note references, {} notebooks",
        run.stats.resources,
        run.stats.orphaned_resources,
        run.stats.link_entries,
        run.stats.notebooks
    );
}

fn cmd_sweep(config_dir: &Path, args: ConnectionArgs) -> Result<()> {
    let settings = load_with_connection(config_dir, &args)?;
    let mut ledger = PendingLedger::load(pending_ledger_path(config_dir))?;
    if ledger.is_empty() {
        println!("no pending placeholders");
        return Ok(());
    }

    let api = connect(&settings)?;
    let outcome = sweep_pending(&api, &mut ledger)?;
    println!("deleted {} placeholder(s)", outcome.deleted.len());
    if !outcome.kept.is_empty() {
        bail!(
            "{} placeholder(s) could not be deleted: {}",
            outcome.kept.len(),
            outcome.kept.join(", ")
        );
    }
    Ok(())
}

fn cmd_ping(config_dir: &Path, args: ConnectionArgs) -> Result<()> {
    let settings = load_with_connection(config_dir, &args)?;
    let api = connect(&settings)?;
    println!("ok: {}", api.config().base_url);
    Ok(())
}

fn cmd_init_config(config_dir: &Path, force: bool) -> Result<()> {
    let path = settings_path(config_dir);
    if path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    save_settings(config_dir, &UsageSettings::default())?;
    println!("wrote {}", path.display());
    Ok(())
}

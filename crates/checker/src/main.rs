use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use checker_core::checker::{CheckReport, Checker, CheckerPage, CheckerQuery};
use checker_core::config::{CheckerConfig, load_config};
use checker_core::links::ResultRow;
use checker_core::runtime::{PathOverrides, ResolutionContext, ResolvedPaths, resolve_paths};
use checker_core::server;
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "checker",
    version,
    about = "Report which Page: subpages of a ProofreadPage index are transcluded"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    data_dir: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Print resolved runtime diagnostics")]
    diagnostics: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    data_dir: Option<PathBuf>,
    config: Option<PathBuf>,
    diagnostics: bool,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            data_dir: cli.data_dir.clone(),
            config: cli.config.clone(),
            diagnostics: cli.diagnostics,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Serve the checker web page")]
    Serve(ServeArgs),
    #[command(about = "Check one index page and print both lists")]
    Check(CheckArgs),
    #[command(about = "List open wiki databases")]
    Databases,
}

#[derive(Debug, Args)]
struct ServeArgs {
    #[arg(long, value_name = "ADDR", help = "Listen address (default from config)")]
    bind: Option<String>,
}

#[derive(Debug, Args)]
struct CheckArgs {
    #[arg(help = "Index page title, e.g. \"Index:Example.djvu\"")]
    title: String,
    #[arg(long, value_name = "DBNAME")]
    db: Option<String>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let runtime = RuntimeOptions::from_cli(&cli);

    match cli.command {
        Some(Commands::Serve(args)) => run_serve(&runtime, args),
        Some(Commands::Check(args)) => run_check(&runtime, args),
        Some(Commands::Databases) => run_databases(&runtime),
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn run_serve(runtime: &RuntimeOptions, args: ServeArgs) -> Result<()> {
    let (paths, config) = load_runtime(runtime)?;
    let bind = args.bind.unwrap_or_else(|| config.bind());
    tracing::info!(
        "starting checker v{} (meta_db={}, replicas={}, link_schema={})",
        env!("CARGO_PKG_VERSION"),
        paths.meta_db_path.display(),
        paths.replica_dir.display(),
        config.link_schema().as_str()
    );
    // Built outside the async runtime: lookups block and run on worker threads.
    let checker = Arc::new(Checker::from_config(&config, &paths));

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?
        .block_on(server::serve(checker, &bind))
}

fn run_check(runtime: &RuntimeOptions, args: CheckArgs) -> Result<()> {
    let (paths, config) = load_runtime(runtime)?;
    let checker = Checker::from_config(&config, &paths);
    let page = checker.handle(&CheckerQuery {
        db: args.db,
        title: Some(args.title),
    });

    match page {
        CheckerPage::Report(report) => match args.format {
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&report).context("failed to serialize report")?
                );
                Ok(())
            }
            OutputFormat::Text => {
                print_report(&report);
                Ok(())
            }
        },
        CheckerPage::Error(error) => bail!("{}", error.message()),
        CheckerPage::Form(_) => bail!("no index title given"),
    }
}

fn run_databases(runtime: &RuntimeOptions) -> Result<()> {
    let (paths, config) = load_runtime(runtime)?;
    let checker = Checker::from_config(&config, &paths);
    for database in checker.database_list()? {
        println!("{database}");
    }
    Ok(())
}

fn print_report(report: &CheckReport) {
    println!("{} on {} ({})", report.index_title, report.db, report.domain);
    print_rows("Transcluded", &report.classification.transcluded);
    print_rows("Not transcluded", &report.classification.not_transcluded);
}

fn print_rows(heading: &str, rows: &[ResultRow]) {
    println!("{heading} ({}):", rows.len());
    for row in rows {
        println!(
            "  {}\t{}\t{}",
            row.label(),
            row.status.as_deref().unwrap_or("-"),
            row.href()
        );
    }
}

fn load_runtime(runtime: &RuntimeOptions) -> Result<(ResolvedPaths, CheckerConfig)> {
    dotenvy::dotenv().ok();
    init_tracing();

    let context = ResolutionContext::from_process()?;
    let overrides = PathOverrides {
        data_dir: runtime.data_dir.clone(),
        config: runtime.config.clone(),
    };
    let paths = resolve_paths(&context, &overrides)?;
    let config = load_config(&paths.config_path)?;
    let paths = paths.with_config(&config);

    if runtime.diagnostics {
        eprintln!("{}", paths.diagnostics());
    }
    Ok((paths, config))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

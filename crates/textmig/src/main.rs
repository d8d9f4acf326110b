use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use textmig_core::check::check_all;
use textmig_core::convert::run_migration;
use textmig_core::pandoc::PandocTool;
use textmig_core::runtime::{ResolvedRuntime, RuntimeOverrides, resolve_runtime};
use textmig_core::store;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "textmig",
    version,
    about = "Batch Textile-to-Markdown migration for stored rich-text fields"
)]
struct Cli {
    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "Content database to operate on"
    )]
    database: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "Pandoc executable to invoke"
    )]
    pandoc: Option<PathBuf>,
    #[arg(long, global = true, help = "Print resolved runtime diagnostics")]
    diagnostics: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Convert every stored Textile field to Markdown in one transaction")]
    Run(RunArgs),
    #[command(about = "Scan stored fields for unbalanced <pre> tags without writing")]
    Check(CheckArgs),
}

#[derive(Debug, Args)]
struct RunArgs {
    #[arg(long, help = "Print the conversion report as JSON")]
    json: bool,
}

#[derive(Debug, Args)]
struct CheckArgs {
    #[arg(long, help = "Print the scan report as JSON")]
    json: bool,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let runtime = resolve_runtime(&RuntimeOverrides {
        database: cli.database.clone(),
        pandoc: cli.pandoc.clone(),
    })?;
    if cli.diagnostics {
        println!("[diagnostics]\n{}", runtime.diagnostics());
    }

    match cli.command {
        Commands::Run(args) => run_conversion(&runtime, args),
        Commands::Check(args) => run_check(&runtime, args),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn run_conversion(runtime: &ResolvedRuntime, args: RunArgs) -> Result<()> {
    let mut connection = store::open(&runtime.database_path)?;
    store::ensure_convertible_tables(&connection)?;
    let pandoc = PandocTool::new(runtime.pandoc_program.clone());

    let report = run_migration(&mut connection, &pandoc)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    println!("conversion run");
    println!("database: {}", normalize_path(&runtime.database_path));
    println!("pandoc: {}", normalize_path(&runtime.pandoc_program));
    println!(
        "welcome_texts.converted: {}",
        report.welcome_texts_converted
    );
    for pass in &report.passes {
        println!("rows.{}.{}: {}", pass.entity, pass.column, pass.rows);
    }
    println!("rows.total: {}", report.total_rows());
    Ok(())
}

fn run_check(runtime: &ResolvedRuntime, args: CheckArgs) -> Result<()> {
    let connection = store::open(&runtime.database_path)?;
    store::ensure_convertible_tables(&connection)?;

    let report = check_all(&connection)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    println!("integrity check");
    println!("database: {}", normalize_path(&runtime.database_path));
    println!("rows.scanned: {}", report.rows_scanned);
    println!("mismatches.count: {}", report.mismatches.len());
    if report.mismatches.is_empty() {
        println!("mismatches: <none>");
    } else {
        for mismatch in &report.mismatches {
            println!(
                "mismatches.entry: {}({})#{} <pre>={} </pre>={}",
                mismatch.entity, mismatch.id, mismatch.column, mismatch.open_tags,
                mismatch.close_tags
            );
        }
    }
    Ok(())
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

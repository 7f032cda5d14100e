use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use aodb_import::{
    cli::{Cli, Commands},
    datasets::DependencyResolver,
    importer::{validate_sources, ImportOptions, Importer},
    report::RunSummary,
    schema::gen::create_all_tables,
};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

fn main() -> ExitCode {
    let cli = Cli::parse_args();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Validate { sources } => {
            let report = validate_sources(&sources);
            for d in &report.datasets {
                let status = match (d.present, d.shape_ok) {
                    (true, true) => "ok",
                    (true, false) => "BAD SHAPE",
                    _ => "MISSING",
                };
                match &d.detail {
                    Some(detail) => println!("{:12} {:10} {} ({})", d.dataset, status, d.file, detail),
                    None => println!("{:12} {:10} {}", d.dataset, status, d.file),
                }
            }
            if report.ok() {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }

        Commands::Import {
            dataset,
            sources,
            database_url,
            chunk_size,
            clear,
            json,
        } => {
            let options = ImportOptions {
                sources,
                chunk_size,
                clear,
                quiet: json,
            };
            let mut importer = Importer::open(&database_url, options)?;
            let summary = importer.import_dataset(&dataset)?;
            print_summary(&summary, json)?;

            // Partial failures are reported, not exit-code errors;
            // fatal conditions are
            if summary.fatal.is_some() {
                Ok(ExitCode::FAILURE)
            } else {
                Ok(ExitCode::SUCCESS)
            }
        }

        Commands::All {
            sources,
            database_url,
            chunk_size,
            clear,
            json,
        } => {
            let options = ImportOptions {
                sources,
                chunk_size,
                clear,
                quiet: json,
            };
            let mut importer = Importer::open(&database_url, options)?;
            let summary = importer.import_all();
            print_summary(&summary, json)?;

            if summary.fatal.is_some() {
                Ok(ExitCode::FAILURE)
            } else {
                Ok(ExitCode::SUCCESS)
            }
        }

        Commands::InitDb { database_url } => {
            init_db(&database_url)?;
            println!("Schema created in {:?}", database_url);
            Ok(ExitCode::SUCCESS)
        }

        Commands::ListDatasets => {
            println!("Datasets in import order:\n");
            let ordered = DependencyResolver::new()
                .all_ordered()
                .map_err(anyhow::Error::msg)?;
            for dataset in ordered {
                println!("  {:8} ({})", dataset.name, dataset.source_file);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn init_db(path: &Path) -> Result<()> {
    let conn = rusqlite::Connection::open(path)
        .with_context(|| format!("Failed to create database: {:?}", path))?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    create_all_tables(&conn)
}

fn print_summary(summary: &RunSummary, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(summary).context("Failed to serialize summary")?
        );
    } else {
        print!("{}", summary.render());
    }
    Ok(())
}

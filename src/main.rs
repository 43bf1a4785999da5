use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use wc_rfm_export::logging::init_logging;
use wc_rfm_export::validation::OutputFolderValidator;
use wc_rfm_export::{AppConfig, Pipeline};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List candidate dump files in the configured dump directory
    List,
    /// Import a dump, build the derived relations, and export workbooks
    Import {
        /// Dump file to import; defaults to the first file in the dump directory
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Shamsi cutoff date (YYYY/MM/DD); "0" or empty measures from the start
        #[arg(short, long, default_value = "0")]
        cutoff: String,
    },
    /// Score a previously generated output folder into rfm_scores.xlsx
    Score {
        /// Output folder produced by an earlier import run
        #[arg(short, long)]
        folder: PathBuf,
    },
    /// Validate a previously generated output folder without scoring it
    Validate {
        /// Output folder produced by an earlier import run
        #[arg(short, long)]
        folder: PathBuf,
    },
}

fn main() -> Result<()> {
    let config = AppConfig::load()?;
    let _guard = init_logging(
        Some(config.logging.level.as_str()),
        config.logging.file_path.as_deref().map(Path::new),
    )?;

    let cli = Cli::parse();
    let pipeline = Pipeline::new(config.clone());

    match cli.command {
        Commands::List => list_dumps(&pipeline)?,
        Commands::Import { file, cutoff } => import_dump(&config, &pipeline, file, &cutoff)?,
        Commands::Score { folder } => {
            let path = pipeline.run_scoring(&folder)?;
            println!("Scores written to {}", path.display());
        }
        Commands::Validate { folder } => {
            let chunks = OutputFolderValidator::validate(&folder)?;
            println!(
                "Output folder {} is valid ({} rfm_data chunk(s))",
                folder.display(),
                chunks.len()
            );
        }
    }

    Ok(())
}

/// Print the candidate dump files, sorted by name
fn list_dumps(pipeline: &Pipeline) -> Result<()> {
    let files = pipeline.dump_reader().list_files()?;
    if files.is_empty() {
        println!("No dump files found. Allowed extensions: .sql, .gz, .sql.gz");
        return Ok(());
    }
    for file in files {
        let compressed = if file.compressed { " [compressed]" } else { "" };
        println!("{} ({} MB){compressed}", file.name, file.size_mb);
    }
    Ok(())
}

/// Run a full import and print the run report
fn import_dump(
    config: &AppConfig,
    pipeline: &Pipeline,
    file: Option<PathBuf>,
    cutoff: &str,
) -> Result<()> {
    let dump_path = match file {
        Some(path) => path,
        None => {
            let files = pipeline.dump_reader().list_files()?;
            let Some(first) = files.into_iter().next() else {
                bail!(
                    "no dump files found in {}; allowed extensions: .sql, .gz, .sql.gz",
                    config.paths.dump_dir
                );
            };
            info!(file = %first.name, "No dump specified; using the first candidate");
            first.path
        }
    };

    let report = pipeline
        .run_import(&dump_path, cutoff)
        .with_context(|| format!("import of {} failed", dump_path.display()))?;

    println!("Imported {} ({} MB)", report.dump.name, report.dump.size_mb);
    if !report.prefix.is_empty() {
        println!("Detected prefix: '{}'", report.prefix);
    }
    println!("Complete groups: {}", report.complete_groups.join(", "));
    println!(
        "Tables created: {}, INSERT statements: {}",
        report.outcome.tables_created, report.outcome.inserts_count
    );
    if !report.outcome.errors.is_empty() {
        println!("Statement errors: {}", report.outcome.errors.len());
        for error in report.outcome.errors.iter().take(5) {
            println!("  - {error}");
        }
        if report.outcome.errors.len() > 5 {
            println!("  ... and {} more", report.outcome.errors.len() - 5);
        }
    }
    println!("Output folder: {}", report.output_folder.display());
    for path in &report.exported_files {
        if let Some(name) = path.file_name() {
            println!("Workbook: {}", name.to_string_lossy());
        }
    }
    Ok(())
}

//! EPUB Anatomy
//!
//! Command line front end: inspect, validate, merge and re-cover EPUB files.

use std::io::{BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use epub_anatomy::{
    merge, set_cover, validate, BookSummary, Config, EpubArchive, EpubError, Report, TocEntry,
};

#[derive(Parser)]
#[command(name = "epub-anatomy")]
#[command(about = "Inspect, validate, merge and re-cover EPUB archives", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the structure of an EPUB: package, layout, spine and contents
    Inspect {
        file: PathBuf,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check EPUB files for structural problems; exits with 1 if any has errors
    Validate {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Print the reports as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the table of contents
    Toc { file: PathBuf },
    /// Merge several EPUBs, in order, into one
    Merge {
        /// Where to write the merged book
        output: PathBuf,
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
    /// Write a copy of an EPUB with a new cover image
    SetCover {
        /// The source EPUB
        src: PathBuf,
        /// The destination to save the EPUB with the cover to
        dst: PathBuf,
        /// The cover image
        image: PathBuf,
        /// Overwrite the destination without asking
        #[arg(short, long)]
        force: bool,
    },
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "epub_anatomy=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    dotenvy::dotenv().ok();
    let config = Config::from_env();
    tracing::debug!("Using {:?}", config);

    let cli = Cli::parse();
    match cli.command {
        Commands::Inspect { file, json } => inspect(&file, json),
        Commands::Validate { files, json } => validate_files(&files, json),
        Commands::Toc { file } => toc(&file),
        Commands::Merge { output, inputs } => {
            let summary = merge(inputs.as_slice(), &output, &config)
                .with_context(|| format!("Failed to merge into {}", output.display()))?;
            println!(
                "Written {} books to {} ({} spine items)",
                summary.inputs,
                output.display(),
                summary.spine_items
            );
            Ok(ExitCode::SUCCESS)
        }
        Commands::SetCover {
            src,
            dst,
            image,
            force,
        } => {
            let overwrite = may_write(&dst, force, std::io::stdin().is_terminal(), confirm_overwrite)?;
            if !overwrite {
                println!("Aborted");
                return Ok(ExitCode::FAILURE);
            }
            let summary = set_cover(&src, &dst, &image, overwrite, &config)
                .with_context(|| format!("Failed to set the cover of {}", src.display()))?;
            println!("Written output to {} (cover at {})", summary.destination, summary.cover_path);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn inspect(file: &Path, json: bool) -> Result<ExitCode> {
    let mut archive =
        EpubArchive::open(file).with_context(|| format!("Failed to open {}", file.display()))?;
    archive.check_mimetype()?;
    let summary = archive.summary()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(ExitCode::SUCCESS)
}

fn print_summary(summary: &BookSummary) {
    println!("{}", summary.source);
    println!("  Title:     {}", summary.title.as_deref().unwrap_or("(none)"));
    for creator in &summary.creators {
        match &creator.role {
            Some(role) => println!("  Creator:   {} ({})", creator.name, role),
            None => println!("  Creator:   {}", creator.name),
        }
    }
    if let Some(language) = &summary.language {
        println!("  Language:  {}", language);
    }
    if let Some(version) = &summary.version {
        println!("  Version:   {}", version);
    }
    println!("  Package:   {} ({})", summary.package_path, summary.layout);
    println!("  Producer:  {}", summary.producer);
    println!("  Entries:   {}", summary.entry_count);
    println!("  Manifest:  {} items", summary.manifest_count);
    println!("  Cover:     {}", summary.cover.as_deref().unwrap_or("(none)"));
    println!("  Spine:");
    for (i, path) in summary.spine.iter().enumerate() {
        println!("    {:>3}. {}", i + 1, path);
    }
    println!("  Contents ({:?}):", summary.toc_source);
    print_toc(&summary.toc, 4);
}

fn print_toc(toc: &[TocEntry], indent: usize) {
    for (depth, entry) in TocEntry::walk(toc) {
        println!("{:width$}{} -> {}", "", entry.label, entry.href, width = indent + depth * 2);
    }
}

fn validate_files(files: &[PathBuf], json: bool) -> Result<ExitCode> {
    let mut reports = Vec::with_capacity(files.len());
    let mut failed = false;

    for file in files {
        let mut archive = match EpubArchive::open(file) {
            Ok(archive) => archive,
            Err(e @ EpubError::NotAnEpub(_)) => {
                eprintln!("{}", e);
                failed = true;
                continue;
            }
            Err(e) => return Err(e).with_context(|| format!("Failed to open {}", file.display())),
        };
        let report = validate(&mut archive)?;
        failed |= !report.is_valid();
        reports.push(report);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        reports.iter().for_each(print_report);
    }

    Ok(if failed { ExitCode::FAILURE } else { ExitCode::SUCCESS })
}

fn print_report(report: &Report) {
    let status = if report.is_valid() { "ok" } else { "INVALID" };
    println!(
        "{}: {} ({} errors, {} warnings)",
        report.source,
        status,
        report.errors().count(),
        report.warnings().count()
    );
    for issue in &report.issues {
        println!("  [{}] {}: {}", issue.severity, issue.code, issue.message);
    }
}

fn toc(file: &Path) -> Result<ExitCode> {
    let mut archive =
        EpubArchive::open(file).with_context(|| format!("Failed to open {}", file.display()))?;
    let package_path = archive.package_path()?;
    let package = archive.package_at(&package_path)?;
    let (source, entries) = archive.toc(&package_path, &package)?;

    tracing::debug!("Table of contents of {} from {:?}", file.display(), source);
    print_toc(&entries, 0);
    Ok(ExitCode::SUCCESS)
}

/// Whether `dst` may be written. An existing file is only replaced with
/// `--force` or after the user agrees at a terminal.
fn may_write(
    dst: &Path,
    force: bool,
    interactive: bool,
    ask: impl FnOnce(&Path) -> Result<bool>,
) -> Result<bool> {
    if force || !dst.exists() {
        return Ok(true);
    }
    if !interactive {
        tracing::warn!("{} already exists and stdin is not a terminal; pass --force to overwrite", dst.display());
        return Ok(false);
    }
    ask(dst)
}

fn confirm_overwrite(dst: &Path) -> Result<bool> {
    print!(
        "WARNING: The output_file: {} already exists. Continuing will OVERWRITE this file. Would you like to continue? ",
        dst.display()
    );
    std::io::stdout().flush()?;

    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    let answer = answer.trim().to_uppercase();
    Ok(answer == "Y" || answer == "YES")
}

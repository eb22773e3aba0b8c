use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use compound_alias_table::{
    ClassifierMode, ExtractorBackend, MergeStats, PageSelection, PairingPolicy, PipelineOptions,
    PipelineWarning, SegmenterStrategy, UnitFailure, extract_page_text, find_table_pages,
    merge_csv_dir, page_text_path, parse_page_text_to_csv, read_page_list, run_all,
    success_ratio,
};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "alias-table",
    version,
    about = "Extract alias/name compound tables from PDF manuals into CSV"
)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Classify every page and write the table page numbers.
    FindPages {
        /// Input PDF path.
        #[arg(short, long)]
        input: PathBuf,

        /// Output page-list file, one page number per line.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Write the text of selected pages as a page-text file.
    Extract {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        output: PathBuf,

        /// Page selection like 1-3,5.
        #[arg(long, conflicts_with = "page_list")]
        pages: Option<String>,

        /// Page-list file written by find-pages.
        #[arg(long)]
        page_list: Option<PathBuf>,
    },
    /// Parse a page-text file into a CSV.
    Parse {
        /// Input page-text file.
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        output: PathBuf,

        /// Also write table_NN.txt and table_NN.csv per detected table.
        #[arg(long)]
        tables_dir: Option<PathBuf>,
    },
    /// Classify, extract and parse in one run.
    All {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        output: PathBuf,
    },
    /// Merge every CSV in a directory into one deduplicated CSV.
    Merge {
        /// Directory holding per-table CSV files.
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        output: PathBuf,
    },
}

#[derive(Debug, Args)]
struct CommonArgs {
    /// JSON options file; flags below override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Text extraction backend: auto, content-stream, plain-text.
    #[arg(long, global = true)]
    backend: Option<String>,

    /// Page classifier: weighted, strict-header.
    #[arg(long, global = true)]
    classifier: Option<String>,

    /// Table segmenter: header-sentinel, paired-marker, inline-header.
    #[arg(long, global = true)]
    segmenter: Option<String>,

    /// Row reconstruction: strict, shape-driven, single-line.
    #[arg(long, global = true)]
    pairing: Option<String>,

    /// Skip a table, as table_NN or table_NN=reason. Repeatable.
    #[arg(long = "exclude", global = true)]
    excluded: Vec<String>,

    /// Keep records not flagged as available (implies --extended).
    #[arg(long, global = true)]
    all_records: bool,

    /// Add available_in_p11 and source_table columns.
    #[arg(long, global = true)]
    extended: bool,

    /// Output delimiter character.
    #[arg(long, global = true)]
    csv_delimiter: Option<char>,

    /// Write page text without delimiter lines and read one row per line.
    #[arg(long, global = true)]
    no_delimiters: bool,

    /// Write the run summary as JSON.
    #[arg(long, global = true)]
    report: Option<PathBuf>,

    /// Log progress at info level.
    #[arg(short, long, global = true)]
    verbose: bool,
}

fn parse_flag<T: FromStr<Err = String>>(flag: &str, value: Option<&str>) -> Result<Option<T>> {
    value
        .map(T::from_str)
        .transpose()
        .map_err(|error| anyhow!("invalid {flag}: {error}"))
}

fn parse_exclusion(value: &str) -> (String, String) {
    match value.split_once('=') {
        Some((id, reason)) => (id.trim().to_string(), reason.trim().to_string()),
        None => (value.trim().to_string(), "excluded on the command line".to_string()),
    }
}

fn build_options(args: &CommonArgs) -> Result<PipelineOptions> {
    let mut options = match &args.config {
        Some(path) => PipelineOptions::from_json_file(path)
            .with_context(|| format!("failed to read --config '{}'", path.display()))?,
        None => PipelineOptions::default(),
    };

    if let Some(backend) = parse_flag::<ExtractorBackend>("--backend", args.backend.as_deref())? {
        options.backend = backend;
    }
    if let Some(mode) = parse_flag::<ClassifierMode>("--classifier", args.classifier.as_deref())? {
        options.classifier.mode = mode;
    }
    let segmenter = parse_flag::<SegmenterStrategy>("--segmenter", args.segmenter.as_deref())?;
    let pairing = parse_flag::<PairingPolicy>("--pairing", args.pairing.as_deref())?;
    if let Some(strategy) = segmenter {
        options.segmenter = strategy;
    } else if args.no_delimiters {
        options.segmenter = SegmenterStrategy::InlineHeader;
    }
    match pairing {
        Some(policy) => options.pairing = policy,
        None if options.segmenter == SegmenterStrategy::InlineHeader => {
            options.pairing = PairingPolicy::SingleLine;
        }
        None => {}
    }
    options
        .excluded_tables
        .extend(args.excluded.iter().map(|value| parse_exclusion(value)));
    if args.all_records {
        options.available_only = false;
        options.extended_columns = true;
    }
    if args.extended {
        options.extended_columns = true;
    }
    if let Some(delimiter) = args.csv_delimiter {
        options.csv_delimiter = delimiter;
    }
    if args.no_delimiters {
        options.delimit_lines = false;
    }

    options.validate()?;
    Ok(options)
}

fn log_warnings(warnings: &[PipelineWarning], verbose: bool) {
    for warning in warnings {
        let mut place = String::new();
        if let Some(page) = warning.page {
            place.push_str(&format!(" page {page}"));
        }
        if let Some(table) = &warning.table {
            place.push_str(&format!(" {table}"));
        }
        if verbose {
            eprintln!("warning [{:?}]{place}: {}", warning.code, warning.message);
        } else {
            eprintln!("warning{place}: {}", warning.message);
        }
    }
}

fn log_failures(label: &str, failures: &[UnitFailure]) {
    for failure in failures {
        eprintln!("{label} {}: {}", failure.unit, failure.reason);
    }
}

fn write_report<T: Serialize>(path: Option<&Path>, report: &T) -> Result<()> {
    let Some(path) = path else {
        return Ok(());
    };
    let body = serde_json::to_string_pretty(report).context("failed to serialize run report")?;
    std::fs::write(path, body)
        .with_context(|| format!("failed to write report '{}'", path.display()))
}

fn exit_for(produced: usize, empty_reason: &str) -> ExitCode {
    if produced > 0 {
        ExitCode::SUCCESS
    } else {
        eprintln!("nothing produced: {empty_reason}");
        ExitCode::from(2)
    }
}

fn print_merge(stats: &MergeStats, output: &Path) {
    let total = stats.per_source.len() + stats.failed.len();
    println!(
        "merged {} source(s) into {}: {} unique record(s), {:.1}% duplicates",
        success_ratio(stats.per_source.len(), total),
        output.display(),
        stats.unique_count,
        stats.duplicate_rate
    );
    for (databank, count) in &stats.per_databank {
        println!("  {databank}: {count}");
    }
}

fn run(cli: &Cli) -> Result<ExitCode> {
    let common = &cli.common;
    let options = build_options(common)?;
    let report_path = common.report.as_deref();

    match &cli.command {
        Commands::FindPages { input, output } => {
            let scan = find_table_pages(input, output.as_deref(), &options)
                .with_context(|| format!("failed to classify pages of '{}'", input.display()))?;
            log_warnings(&scan.warnings, common.verbose);
            if output.is_none() {
                for page in &scan.table_pages {
                    println!("{page}");
                }
            }
            write_report(report_path, &scan)?;
            Ok(exit_for(
                scan.table_pages.len(),
                "no page was classified as a table page",
            ))
        }
        Commands::Extract {
            input,
            output,
            pages,
            page_list,
        } => {
            let selection = match (pages, page_list) {
                (Some(pages), _) => {
                    PageSelection::from_str(pages).context("failed to parse --pages")?
                }
                (None, Some(path)) => read_page_list(path)
                    .with_context(|| format!("failed to read page list '{}'", path.display()))?,
                (None, None) => anyhow::bail!("extract needs --pages or --page-list"),
            };
            let report = extract_page_text(input, &selection, output, &options)
                .with_context(|| format!("failed to extract text from '{}'", input.display()))?;
            log_warnings(&report.warnings, common.verbose);
            write_report(report_path, &report)?;
            Ok(exit_for(
                report.pages_written.len(),
                "none of the selected pages is in the document",
            ))
        }
        Commands::Parse {
            input,
            output,
            tables_dir,
        } => {
            let report = parse_page_text_to_csv(input, output, tables_dir.as_deref(), &options)
                .with_context(|| format!("failed to parse '{}'", input.display()))?;
            log_warnings(&report.warnings, common.verbose);
            log_failures("skipped", &report.skipped);
            println!(
                "parsed {} table(s), {} record(s) written to {}",
                report.chunk_ratio(),
                report.record_count,
                output.display()
            );
            write_report(report_path, &report)?;
            Ok(exit_for(report.record_count, "no record survived parsing"))
        }
        Commands::All { input, output } => {
            let report = run_all(input, output, &options)
                .with_context(|| format!("failed to process '{}'", input.display()))?;
            log_warnings(&report.scan.warnings, common.verbose);
            log_warnings(&report.parse.warnings, common.verbose);
            log_failures("skipped", &report.parse.skipped);
            println!(
                "{} table page(s), parsed {} table(s), {} record(s) written to {} (page text: {})",
                report.scan.table_pages.len(),
                report.parse.chunk_ratio(),
                report.parse.record_count,
                output.display(),
                page_text_path(output).display()
            );
            write_report(report_path, &report)?;
            let reason = if report.scan.table_pages.is_empty() {
                "no page was classified as a table page"
            } else {
                "no record survived parsing"
            };
            Ok(exit_for(report.parse.record_count, reason))
        }
        Commands::Merge { input, output } => {
            let stats = merge_csv_dir(input, output, &options)
                .with_context(|| format!("failed to merge CSV files in '{}'", input.display()))?;
            log_failures("failed", &stats.failed);
            print_merge(&stats, output);
            write_report(report_path, &stats)?;
            Ok(exit_for(stats.unique_count, "no record was read from any CSV"))
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.common.verbose {
        "compound_alias_table=info"
    } else {
        "compound_alias_table=warn"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    match run(&cli) {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::from(1)
        }
    }
}

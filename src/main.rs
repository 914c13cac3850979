use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use inp2sees::{
    batch::{self, Job},
    convert_with, ConvertOptions, ConverterError, ElementType, Lookup, MappingTables, Model,
    UnmappedPolicy,
};

#[derive(Parser)]
#[command(name = "inp2sees", version, about = "Converts Abaqus input decks into OpenSeesPy scripts")]
struct Cli {
    /// Log parser and translator detail
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct TranslateArgs {
    /// Mapping tables to use instead of the builtin ones
    #[arg(long, value_name = "FILE")]
    tables: Option<PathBuf>,

    /// Fail on element types without a mapping instead of skipping them
    #[arg(long)]
    strict: bool,

    /// Replace existing output files
    #[arg(long)]
    overwrite: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert one input deck
    Convert {
        input: PathBuf,

        /// Output script, defaults to the input path with a .py extension
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Parse and translate, but write nothing
        #[arg(long)]
        dry_run: bool,

        #[command(flatten)]
        translate: TranslateArgs,
    },
    /// Print what an input deck contains
    Info {
        input: PathBuf,

        /// Mapping tables to report element targets from
        #[arg(long, value_name = "FILE")]
        tables: Option<PathBuf>,
    },
    /// Convert every input deck in a directory
    Batch {
        dir: PathBuf,

        /// Directory for the scripts, defaults to next to each input
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,

        #[command(flatten)]
        translate: TranslateArgs,
    },
}

fn init_logging(verbose: bool, quiet: bool) {
    let level = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_tables(path: Option<&Path>) -> Result<MappingTables, ConverterError> {
    match path {
        Some(path) => MappingTables::from_file(path),
        None => Ok(MappingTables::builtin().clone()),
    }
}

fn options(translate: &TranslateArgs) -> ConvertOptions {
    ConvertOptions {
        unmapped: if translate.strict {
            UnmappedPolicy::Fail
        } else {
            UnmappedPolicy::Skip
        },
    }
}

fn print_summary(model: &Model, tables: &MappingTables) {
    println!("nodes: {}", model.nodes.len());
    println!("elements: {}", model.elements.len());
    for (tag, count) in model.element_type_counts() {
        match tables.element(&ElementType::from_tag(&tag)) {
            Lookup::Mapped(spec) => {
                println!("  {tag}: {count} -> {} ({}D)", spec.target, spec.dimension)
            }
            Lookup::Unmapped => println!("  {tag}: {count} (unmapped)"),
        }
    }
    println!("node sets: {}", model.node_sets.len());
    println!("element sets: {}", model.element_sets.len());
    println!("materials: {}", model.materials.len());
    println!("sections: {}", model.sections.len());
    println!("boundary conditions: {}", model.boundaries.len());
    println!("loads: {}", model.loads.len());

    let skipped: Vec<(&str, usize)> = model.skipped_sections().collect();
    if !skipped.is_empty() {
        println!("skipped sections:");
        for (keyword, line) in skipped {
            println!("  {keyword} (line {line})");
        }
    }
}

/// Runs a subcommand
///
/// # Returns
/// The process exit code, or the error that stopped the run
fn run(command: Commands) -> Result<ExitCode, ConverterError> {
    match command {
        Commands::Convert {
            input,
            output,
            dry_run,
            translate,
        } => {
            let tables = load_tables(translate.tables.as_deref())?;

            if dry_run {
                let model = batch::load_model(&input)?;
                let (_, warnings) = convert_with(&model, &tables, &options(&translate))?;
                print_summary(&model, &tables);
                println!("warnings: {}", warnings.len());
                return Ok(ExitCode::SUCCESS);
            }

            let job = Job {
                tables: &tables,
                options: options(&translate),
                overwrite: translate.overwrite,
            };
            let report = batch::convert_file(&input, output.as_deref(), &job)?;
            println!(
                "{} -> {} ({} nodes, {} elements, {} warnings)",
                report.input.display(),
                report.output.display(),
                report.nodes,
                report.elements,
                report.warnings.len()
            );
            Ok(ExitCode::SUCCESS)
        }
        Commands::Info { input, tables } => {
            let tables = load_tables(tables.as_deref())?;
            let model = batch::load_model(&input)?;
            print_summary(&model, &tables);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Batch {
            dir,
            output,
            translate,
        } => {
            let tables = load_tables(translate.tables.as_deref())?;
            let job = Job {
                tables: &tables,
                options: options(&translate),
                overwrite: translate.overwrite,
            };

            let entries = batch::convert_directory(&dir, output.as_deref(), &job, true)?;
            if entries.is_empty() {
                warn!("no .{} files in {}", batch::INPUT_EXTENSION, dir.display());
            }

            let mut failed = 0;
            for entry in &entries {
                match &entry.result {
                    Ok(report) => println!(
                        "{} -> {} ({} warnings)",
                        report.input.display(),
                        report.output.display(),
                        report.warnings.len()
                    ),
                    Err(err) => {
                        failed += 1;
                        eprintln!("error: {}: {err}", entry.input.display());
                    }
                }
            }

            if failed > 0 {
                return Ok(ExitCode::FAILURE);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match run(cli.command) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

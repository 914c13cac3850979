//! Reading input decks from disk, writing scripts back, and converting whole
//! directories.

use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use crate::{
    datatypes::Model,
    error::ConverterError,
    mapping::MappingTables,
    parser::parse,
    renderer::render,
    translator::{convert_with, ConvertOptions, Warning},
};

pub const INPUT_EXTENSION: &str = "inp";
pub const OUTPUT_EXTENSION: &str = "py";

/// Settings shared by every file of a run
#[derive(Debug, Clone, Copy)]
pub struct Job<'a> {
    pub tables: &'a MappingTables,
    pub options: ConvertOptions,
    pub overwrite: bool,
}

impl Default for Job<'_> {
    fn default() -> Self {
        Job {
            tables: MappingTables::builtin(),
            options: ConvertOptions::default(),
            overwrite: false,
        }
    }
}

/// Outcome of converting one file
#[derive(Debug)]
pub struct FileReport {
    pub input: PathBuf,
    pub output: PathBuf,
    pub nodes: usize,
    pub elements: usize,
    pub warnings: Vec<Warning>,
}

#[derive(Debug)]
pub struct BatchEntry {
    pub input: PathBuf,
    pub result: Result<FileReport, ConverterError>,
}

fn io_error(path: &Path, source: std::io::Error) -> ConverterError {
    ConverterError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn has_input_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(INPUT_EXTENSION))
}

/// Reads an input deck. Files that are not valid UTF-8 are decoded as
/// Latin-1, which older decks are often written in.
pub fn read_input(path: &Path) -> Result<String, ConverterError> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(err) => return Err(io_error(path, err)),
    };

    match String::from_utf8(bytes) {
        Ok(text) => Ok(text),
        Err(err) => {
            debug!(path = %path.display(), "input is not UTF-8, decoding as Latin-1");
            Ok(err.into_bytes().iter().map(|b| *b as char).collect())
        }
    }
}

/// Reads and parses an input deck
///
/// # Arguments
/// * `path` - Path to a `.inp` file
///
/// # Returns
/// The parsed model
pub fn load_model(path: &Path) -> Result<Model, ConverterError> {
    if !has_input_extension(path) {
        return Err(ConverterError::Input(format!(
            "{} does not have a .{INPUT_EXTENSION} extension",
            path.display()
        )));
    }

    let text = read_input(path)?;
    info!("parsing {}", path.display());
    Ok(parse(&text)?)
}

/// The script path for an input: `output` if given, otherwise the input
/// path with a `.py` extension
pub fn output_path(input: &Path, output: Option<&Path>) -> PathBuf {
    match output {
        Some(path) => path.to_path_buf(),
        None => input.with_extension(OUTPUT_EXTENSION),
    }
}

/// Converts one input deck and writes the script
///
/// # Arguments
/// * `input` - Path to a `.inp` file
/// * `output` - Where to write the script, defaulting to the input path
///   with a `.py` extension
/// * `job` - Tables, options and the overwrite setting
///
/// # Returns
/// A report of what was written. Nothing is written on error.
pub fn convert_file(
    input: &Path,
    output: Option<&Path>,
    job: &Job,
) -> Result<FileReport, ConverterError> {
    let output = output_path(input, output);
    if output.exists() && !job.overwrite {
        return Err(ConverterError::Input(format!(
            "{} already exists, refusing to overwrite it",
            output.display()
        )));
    }

    let model = load_model(input)?;
    let (sequence, warnings) = convert_with(&model, job.tables, &job.options)?;
    let script = render(&sequence);

    if let Err(err) = std::fs::write(&output, script) {
        return Err(io_error(&output, err));
    }
    info!("wrote {}", output.display());

    Ok(FileReport {
        input: input.to_path_buf(),
        output,
        nodes: model.nodes.len(),
        elements: model.elements.len(),
        warnings,
    })
}

/// Input decks directly inside `dir`, sorted by file name
pub fn input_files(dir: &Path) -> Result<Vec<PathBuf>, ConverterError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(err) => return Err(io_error(dir, err)),
    };

    let mut files = Vec::new();
    for entry in entries {
        let path = match entry {
            Ok(e) => e.path(),
            Err(err) => return Err(io_error(dir, err)),
        };
        if path.is_file() && has_input_extension(&path) {
            files.push(path);
        }
    }
    files.sort();

    Ok(files)
}

/// Converts every input deck in a directory
///
/// # Arguments
/// * `dir` - The directory to scan, not recursively
/// * `out_dir` - Where scripts go, defaulting to next to each input
/// * `job` - Tables, options and the overwrite setting
/// * `progress` - Whether to draw a progress bar
///
/// # Returns
/// One entry per input file, in file name order. A failing file does not
/// stop the others.
pub fn convert_directory(
    dir: &Path,
    out_dir: Option<&Path>,
    job: &Job,
    progress: bool,
) -> Result<Vec<BatchEntry>, ConverterError> {
    let files = input_files(dir)?;

    if let Some(out_dir) = out_dir {
        if let Err(err) = std::fs::create_dir_all(out_dir) {
            return Err(io_error(out_dir, err));
        }
    }

    let bar = if progress {
        ProgressBar::new(files.len() as u64)
    } else {
        ProgressBar::hidden()
    };
    if let Ok(style) = ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}") {
        bar.set_style(style);
    }

    let mut entries = Vec::with_capacity(files.len());
    for input in files {
        let output = out_dir.and_then(|out_dir| {
            input
                .file_name()
                .map(|name| out_dir.join(name).with_extension(OUTPUT_EXTENSION))
        });

        bar.set_message(
            input
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
        );
        let result = convert_file(&input, output.as_deref(), job);
        bar.inc(1);

        entries.push(BatchEntry { input, result });
    }
    bar.finish_and_clear();

    let failed = entries.iter().filter(|e| e.result.is_err()).count();
    info!(
        "converted {} of {} files in {}",
        entries.len() - failed,
        entries.len(),
        dir.display()
    );

    Ok(entries)
}

use polars::prelude::*;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

use crate::error::Result;

/// Outcome of one loader run: the concatenated readings plus everything
/// that went wrong on a per-file basis.
#[derive(Debug)]
pub struct LoadReport {
    pub frame: DataFrame,
    pub files_read: usize,
    pub errors: Vec<LoadError>,
}

#[derive(Debug, Clone)]
pub struct LoadError {
    pub file: String,
    pub message: String,
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error loading file {}: {}", self.file, self.message)
    }
}

/// Parse one raw gateway export: semicolon-delimited, with a preamble line
/// ahead of the real header.
pub fn read_raw_file(path: &Path) -> Result<DataFrame> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_skip_rows(1)
        .with_infer_schema_length(Some(1000))
        .with_parse_options(CsvParseOptions::default().with_separator(b';'))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;
    Ok(df)
}

/// Load every export file with the given extension from `data_dir`, in
/// directory-listing order.
pub fn load_raw_dir(data_dir: &Path, extension: &str) -> Result<LoadReport> {
    info!("Loading raw readings from {:?}", data_dir);

    let mut candidates = Vec::new();
    for entry in fs::read_dir(data_dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(extension) {
            candidates.push(path);
        }
    }

    load_raw_files(&candidates)
}

/// Concatenate an explicit list of export files. A file that fails to parse
/// is skipped and reported; it never aborts the run. The per-file errors are
/// logged after the loop so progress output stays readable.
pub fn load_raw_files(paths: &[PathBuf]) -> Result<LoadReport> {
    let mut frames = Vec::new();
    let mut errors = Vec::new();

    for path in paths {
        match read_raw_file(path) {
            Ok(df) => {
                debug!("Loaded {} rows from {:?}", df.height(), path);
                frames.push(df.lazy());
            }
            Err(e) => errors.push(LoadError {
                file: path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string()),
                message: e.to_string(),
            }),
        }
    }

    let files_read = frames.len();
    info!("Parsed {}/{} raw export files", files_read, paths.len());
    for err in &errors {
        error!("{}", err);
    }

    let frame = if frames.is_empty() {
        DataFrame::empty()
    } else {
        concat(
            frames,
            UnionArgs {
                to_supertypes: true,
                ..Default::default()
            },
        )?
        .collect()?
    };

    Ok(LoadReport {
        frame,
        files_read,
        errors,
    })
}

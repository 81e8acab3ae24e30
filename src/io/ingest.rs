//! CSV ingest of measured experiments.
//!
//! Expected columns (header names are case-insensitive, a UTF-8 BOM is
//! tolerated):
//!
//! - `time` (s), `amb_temp` (°C), `q_gen` (W): required
//! - `sf_temp`, `air_temp` (°C): at least one, they become the outputs
//!
//! Unlike a table of independent records, a time series cannot lose rows
//! silently: any unparsable cell fails the whole file with its line number.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use csv::StringRecord;
use nalgebra::{DMatrix, DVector};
use tracing::info;

use crate::domain::{Dataset, OutputSelection, INPUT_AMBIENT, INPUT_POWER};
use crate::error::AppError;

pub const COL_TIME: &str = "time";
pub const COL_AMBIENT: &str = "amb_temp";
pub const COL_POWER: &str = "q_gen";
pub const COL_SURFACE: &str = "sf_temp";
pub const COL_AIR: &str = "air_temp";

/// Summary stats about the samples actually loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetStats {
    pub n_samples: usize,
    pub duration: f64,
    pub power_max: f64,
    pub ambient_min: f64,
    pub ambient_max: f64,
}

/// Ingest output: validated dataset plus provenance.
#[derive(Debug, Clone)]
pub struct IngestedData {
    pub path: PathBuf,
    pub dataset: Dataset,
    pub stats: DatasetStats,
}

/// How to build the dataset from the file.
#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    /// Outputs to use; inferred from the available columns when `None`.
    pub outputs: Option<OutputSelection>,
    /// Initial state `[T_in, T_air]`.
    ///
    /// Defaults to the first surface sample (or ambient) for `T_in` and the
    /// first air sample (or ambient) for `T_air`.
    pub x0: Option<[f64; 2]>,
}

/// Load one experiment CSV.
pub fn load_dataset(path: &Path, options: &IngestOptions) -> Result<IngestedData, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open CSV '{}': {e}", path.display())))?;
    let ingested = read_dataset(file, options)
        .map_err(|e| AppError::new(e.exit_code(), format!("{}: {e}", path.display())))?;

    info!(
        path = %path.display(),
        samples = ingested.1.n_samples,
        duration = ingested.1.duration,
        outputs = ?ingested.0.outputs(),
        "dataset loaded"
    );

    Ok(IngestedData {
        path: path.to_path_buf(),
        dataset: ingested.0,
        stats: ingested.1,
    })
}

/// Parse a dataset from any CSV reader.
pub fn read_dataset<R: std::io::Read>(
    reader: R,
    options: &IngestOptions,
) -> Result<(Dataset, DatasetStats), AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read CSV headers: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);

    let col = |name: &str| header_map.get(name).copied();
    let required = |name: &str| {
        col(name).ok_or_else(|| AppError::new(2, format!("Missing required column '{name}'.")))
    };
    let time_idx = required(COL_TIME)?;
    let amb_idx = required(COL_AMBIENT)?;
    let power_idx = required(COL_POWER)?;
    let sf_idx = col(COL_SURFACE);
    let air_idx = col(COL_AIR);

    let outputs = resolve_outputs(options.outputs, sf_idx.is_some(), air_idx.is_some())?;
    let output_idx: Vec<usize> = outputs
        .labels()
        .iter()
        .filter_map(|&label| col(label))
        .collect();

    let mut time = Vec::new();
    let mut inputs = Vec::new();
    let mut measured = Vec::new();
    let mut first_surface = None;
    let mut first_air = None;

    for (idx, result) in reader.records().enumerate() {
        // records() starts after the header, CSV lines are 1-based
        let line = idx + 2;
        let record = result.map_err(|e| AppError::new(2, format!("line {line}: CSV parse error: {e}")))?;

        time.push(parse_cell(&record, time_idx, COL_TIME, line)?);
        let amb = parse_cell(&record, amb_idx, COL_AMBIENT, line)?;
        let power = parse_cell(&record, power_idx, COL_POWER, line)?;
        inputs.extend([amb, power]);
        for &i in &output_idx {
            measured.push(parse_cell(&record, i, headers.get(i).unwrap_or("output"), line)?);
        }

        if idx == 0 {
            first_surface = sf_idx.map(|i| parse_cell(&record, i, COL_SURFACE, line)).transpose()?;
            first_air = air_idx.map(|i| parse_cell(&record, i, COL_AIR, line)).transpose()?;
        }
    }

    let n = time.len();
    if n == 0 {
        return Err(AppError::new(3, "CSV contains no samples."));
    }

    let u = DMatrix::from_row_slice(n, 2, &inputs);
    let y = DMatrix::from_row_slice(n, output_idx.len(), &measured);
    let t = DVector::from_vec(time);

    let ambient0 = u[(0, INPUT_AMBIENT)];
    let x0 = options.x0.unwrap_or([
        first_surface.unwrap_or(ambient0),
        first_air.unwrap_or(ambient0),
    ]);

    let stats = DatasetStats {
        n_samples: n,
        duration: t[n - 1] - t[0],
        power_max: u.column(INPUT_POWER).max(),
        ambient_min: u.column(INPUT_AMBIENT).min(),
        ambient_max: u.column(INPUT_AMBIENT).max(),
    };
    let dataset = Dataset::new(y, u, t, DVector::from_row_slice(&x0), outputs)?;
    Ok((dataset, stats))
}

fn resolve_outputs(
    requested: Option<OutputSelection>,
    has_surface: bool,
    has_air: bool,
) -> Result<OutputSelection, AppError> {
    let available = match (has_surface, has_air) {
        (true, true) => OutputSelection::Both,
        (true, false) => OutputSelection::Surface,
        (false, true) => OutputSelection::Air,
        (false, false) => {
            return Err(AppError::new(
                2,
                format!("CSV needs at least one output column ('{COL_SURFACE}' or '{COL_AIR}')."),
            ));
        }
    };
    match requested {
        None => Ok(available),
        Some(req) => {
            let ok = match req {
                OutputSelection::Both => has_surface && has_air,
                OutputSelection::Surface => has_surface,
                OutputSelection::Air => has_air,
            };
            if ok {
                Ok(req)
            } else {
                Err(AppError::new(
                    2,
                    format!("Requested outputs {req:?} but the CSV only has {available:?}."),
                ))
            }
        }
    }
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    name.trim().trim_start_matches('\u{feff}').to_ascii_lowercase()
}

fn parse_cell(record: &StringRecord, idx: usize, column: &str, line: usize) -> Result<f64, AppError> {
    let raw = record
        .get(idx)
        .ok_or_else(|| AppError::new(2, format!("line {line}: missing '{column}' value")))?;
    raw.parse::<f64>()
        .map_err(|_| AppError::new(2, format!("line {line}: '{column}' is not a number: '{raw}'")))
}

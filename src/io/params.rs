//! JSON records: parameters, ground truth, engine requests.
//!
//! Parameter files are read leniently (extra keys such as the initial
//! temperatures of a ground-truth file are ignored) and written with exactly
//! the five parameter keys.

use std::fs::File;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::data::GroundTruth;
use crate::domain::{EngineRequest, ThermalParams};
use crate::error::AppError;

pub fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open {what} '{}': {e}", path.display())))?;
    serde_json::from_reader(file)
        .map_err(|e| AppError::new(2, format!("Invalid {what} '{}': {e}", path.display())))
}

pub fn write_json<T: Serialize>(path: &Path, value: &T, what: &str) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create {what} '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, value)
        .map_err(|e| AppError::new(2, format!("Failed to write {what}: {e}")))
}

/// Read a parameter record and check it is physically valid.
pub fn read_params(path: &Path) -> Result<ThermalParams, AppError> {
    let params: ThermalParams = read_json(path, "parameter JSON")?;
    params.validate()?;
    Ok(params)
}

pub fn write_params(path: &Path, params: &ThermalParams) -> Result<(), AppError> {
    write_json(path, params, "parameter JSON")
}

pub fn read_ground_truth(path: &Path) -> Result<GroundTruth, AppError> {
    let truth: GroundTruth = read_json(path, "ground-truth JSON")?;
    truth.params.validate()?;
    Ok(truth)
}

pub fn write_ground_truth(path: &Path, truth: &GroundTruth) -> Result<(), AppError> {
    write_json(path, truth, "ground-truth JSON")
}

pub fn write_engine_request(path: &Path, request: &EngineRequest) -> Result<(), AppError> {
    write_json(path, request, "engine request JSON")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::build_system;

    #[test]
    fn params_round_trip_to_identical_matrices() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("params.json");
        let p = ThermalParams::new(97.3, 11.2, 2.87, 5.01, 1.93);
        write_params(&path, &p).unwrap();
        let back = read_params(&path).unwrap();
        assert_eq!(back, p);
        assert_eq!(build_system(&back).unwrap(), build_system(&p).unwrap());
    }

    #[test]
    fn ground_truth_file_is_a_valid_parameter_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("truth.json");
        let truth = GroundTruth {
            params: ThermalParams::new(100.0, 10.0, 3.0, 5.0, 2.0),
            in_temp: 25.0,
            air_temp: 24.0,
        };
        write_ground_truth(&path, &truth).unwrap();
        assert_eq!(read_params(&path).unwrap(), truth.params);
        assert_eq!(read_ground_truth(&path).unwrap(), truth);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{"cp":-1,"cair":10,"rin":3,"rout":5,"rair":2}"#).unwrap();
        let err = read_params(&path).unwrap_err();
        assert!(err.to_string().contains("cp"));
    }
}

//! CSV exports: datasets and simulated trajectories.
//!
//! Both are meant to be easy to consume in spreadsheets or plotting scripts,
//! and datasets written here load back through [`crate::io::load_dataset`].

use std::fs::File;
use std::path::Path;

use csv::Writer;
use nalgebra::DMatrix;

use crate::domain::{Dataset, INPUT_AMBIENT, INPUT_POWER};
use crate::error::AppError;
use crate::fit::Trajectory;
use crate::io::ingest::{COL_AMBIENT, COL_POWER, COL_TIME};

fn create(path: &Path, what: &str) -> Result<Writer<File>, AppError> {
    Writer::from_path(path)
        .map_err(|e| AppError::new(2, format!("Failed to create {what} '{}': {e}", path.display())))
}

fn csv_err(e: csv::Error) -> AppError {
    AppError::new(2, format!("Failed to write CSV: {e}"))
}

/// Write a dataset in the ingest schema.
pub fn write_dataset_csv(path: &Path, dataset: &Dataset) -> Result<(), AppError> {
    let mut w = create(path, "dataset CSV")?;

    let mut header = vec![COL_TIME, COL_AMBIENT, COL_POWER];
    header.extend(dataset.outputs().labels());
    w.write_record(&header).map_err(csv_err)?;

    let (t, u, y) = (dataset.t(), dataset.u(), dataset.y());
    for i in 0..dataset.len() {
        let mut row = vec![
            t[i].to_string(),
            u[(i, INPUT_AMBIENT)].to_string(),
            u[(i, INPUT_POWER)].to_string(),
        ];
        row.extend(y.row(i).iter().map(|v| v.to_string()));
        w.write_record(&row).map_err(csv_err)?;
    }
    w.flush().map_err(|e| AppError::new(2, format!("Failed to flush CSV: {e}")))
}

/// Write a simulated trajectory next to the measurements it explains.
///
/// `full` is the two-output simulation (surface and air); `residual` has one
/// column per measured output of `dataset`.
pub fn write_simulation_csv(
    path: &Path,
    dataset: &Dataset,
    full: &Trajectory,
    residual: &DMatrix<f64>,
) -> Result<(), AppError> {
    if full.outputs.nrows() != dataset.len() || residual.nrows() != dataset.len() {
        return Err(AppError::new(
            4,
            "Simulation length does not match the dataset.",
        ));
    }

    let mut w = create(path, "simulation CSV")?;

    let mut header: Vec<String> = ["time", "in_temp", "sf_temp_sim", "air_temp_sim"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    header.extend(dataset.outputs().labels().iter().map(|l| format!("{l}_residual")));
    w.write_record(&header).map_err(csv_err)?;

    for i in 0..dataset.len() {
        let mut row = vec![
            dataset.t()[i].to_string(),
            full.states[(i, 0)].to_string(),
            full.outputs[(i, 0)].to_string(),
            full.outputs[(i, 1)].to_string(),
        ];
        row.extend(residual.row(i).iter().map(|v| v.to_string()));
        w.write_record(&row).map_err(csv_err)?;
    }
    w.flush().map_err(|e| AppError::new(2, format!("Failed to flush CSV: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OutputSelection, ThermalParams};
    use crate::fit::simulate;
    use crate::io::{read_dataset, IngestOptions};
    use crate::math::InputHold;
    use crate::models::build_system;
    use nalgebra::DVector;

    fn dataset() -> (Dataset, Trajectory) {
        let n = 20;
        let t = DVector::from_fn(n, |i, _| i as f64 * 3.0);
        let u = DMatrix::from_fn(n, 2, |_, j| if j == 0 { 21.5 } else { 1.25 });
        let x0 = DVector::from_row_slice(&[21.5, 21.5]);
        let sys = build_system(&ThermalParams::new(100.0, 10.0, 3.0, 5.0, 2.0)).unwrap();
        let traj = simulate(&sys, &u, &t, &x0, InputHold::Linear);
        let ds = Dataset::new(traj.outputs.clone(), u, t, x0, OutputSelection::Both).unwrap();
        (ds, traj)
    }

    #[test]
    fn dataset_csv_reloads_identically() {
        let (ds, _) = dataset();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exp.csv");
        write_dataset_csv(&path, &ds).unwrap();

        let file = File::open(&path).unwrap();
        let opts = IngestOptions {
            x0: Some([21.5, 21.5]),
            ..IngestOptions::default()
        };
        let (back, _) = read_dataset(file, &opts).unwrap();
        assert_eq!(back.y(), ds.y());
        assert_eq!(back.u(), ds.u());
        assert_eq!(back.t(), ds.t());
    }

    #[test]
    fn simulation_csv_has_residual_columns() {
        let (ds, traj) = dataset();
        let residual = DMatrix::zeros(ds.len(), 2);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sim.csv");
        write_simulation_csv(&path, &ds, &traj, &residual).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let header = text.lines().next().unwrap();
        assert_eq!(
            header,
            "time,in_temp,sf_temp_sim,air_temp_sim,sf_temp_residual,air_temp_residual"
        );
        assert_eq!(text.lines().count(), ds.len() + 1);
    }
}

//! Export simulation and harp results to CSV.
//!
//! The export is meant to be easy to consume in spreadsheets or downstream scripts.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::domain::TimeSeries;
use crate::error::AppError;
use crate::models::HarpPoint;

/// One line of the simulation export.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationRow {
    pub time: f64,
    pub simulated: f64,
    pub observed: Option<f64>,
}

impl SimulationRow {
    pub fn residual(&self) -> Option<f64> {
        self.observed.map(|obs| self.simulated - obs)
    }
}

/// Write `time,simulated,observed,residual`; empty cells where nothing was observed.
pub fn write_simulation_csv(path: &Path, rows: &[SimulationRow]) -> Result<(), AppError> {
    let mut file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create export CSV '{}': {e}", path.display())))?;

    writeln!(file, "time,simulated,observed,residual")
        .map_err(|e| AppError::new(2, format!("Failed to write export CSV header: {e}")))?;

    for r in rows {
        writeln!(
            file,
            "{:.6},{:.6},{},{}",
            r.time,
            r.simulated,
            r.observed.map(|v| format!("{v:.6}")).unwrap_or_default(),
            r.residual().map(|v| format!("{v:.6}")).unwrap_or_default(),
        )
        .map_err(|e| AppError::new(2, format!("Failed to write export CSV row: {e}")))?;
    }

    Ok(())
}

/// Write a series as `time,value`; missing values become empty cells.
///
/// The output reads back through `load_series_csv`.
pub fn write_series_csv(path: &Path, series: &TimeSeries) -> Result<(), AppError> {
    let mut file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create series CSV '{}': {e}", path.display())))?;

    writeln!(file, "time,value").map_err(|e| AppError::new(2, format!("Failed to write series CSV header: {e}")))?;
    for (t, v) in series.iter() {
        // Shortest round-trip form so times land back on the sampling grid.
        let value = if v.is_nan() { String::new() } else { format!("{v}") };
        writeln!(file, "{t},{value}")
            .map_err(|e| AppError::new(2, format!("Failed to write series CSV row: {e}")))?;
    }
    Ok(())
}

/// Write the harp curve and its dilution lines as `dilution,value,first,second`.
///
/// The undiluted curve has dilution 0.
pub fn write_harp_csv(
    path: &Path,
    curve: &[HarpPoint],
    dilutions: &[(f64, Vec<HarpPoint>)],
) -> Result<(), AppError> {
    let mut file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create harp CSV '{}': {e}", path.display())))?;

    writeln!(file, "dilution,value,first,second")
        .map_err(|e| AppError::new(2, format!("Failed to write harp CSV header: {e}")))?;

    let lines = std::iter::once((0.0, curve)).chain(dilutions.iter().map(|(f, line)| (*f, line.as_slice())));
    for (fraction, line) in lines {
        for p in line {
            writeln!(file, "{fraction},{:.6},{:.6},{:.6}", p.value, p.first, p.second)
                .map_err(|e| AppError::new(2, format!("Failed to write harp CSV row: {e}")))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulation_csv_leaves_unobserved_cells_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sim.csv");
        let rows = [
            SimulationRow {
                time: 2000.0,
                simulated: 5.0,
                observed: None,
            },
            SimulationRow {
                time: 2001.0,
                simulated: 6.0,
                observed: Some(5.5),
            },
        ];
        write_simulation_csv(&path, &rows).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "time,simulated,observed,residual");
        assert_eq!(lines[1], "2000.000000,5.000000,,");
        assert_eq!(lines[2], "2001.000000,6.000000,5.500000,0.500000");
    }

    #[test]
    fn series_csv_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("obs.csv");
        let series = TimeSeries::new(vec![2000.0, 2001.0, 2002.0], vec![1.25, f64::NAN, 3.0]).unwrap();
        write_series_csv(&path, &series).unwrap();

        let back = crate::io::load_series_csv(&path, crate::domain::Sampling::Yearly).unwrap();
        assert_eq!(back.series.times(), series.times());
        assert_eq!(back.missing, 1);
        assert_eq!(back.series.values()[2], 3.0);
    }

    #[test]
    fn harp_csv_lists_curve_then_dilutions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harp.csv");
        let curve = vec![HarpPoint {
            value: 10.0,
            first: 4.0,
            second: 8.0,
        }];
        let dilutions = crate::models::dilution_lines(&curve, &[0.5]);
        write_harp_csv(&path, &curve, &dilutions).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "0,10.000000,4.000000,8.000000");
        assert_eq!(lines[2], "0.5,10.000000,2.000000,4.000000");
    }
}

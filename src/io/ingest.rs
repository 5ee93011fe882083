//! CSV ingest of tracer time series.
//!
//! Turns a two-column CSV (time, concentration) into a validated
//! [`TimeSeries`] in decimal years.
//!
//! Design goals:
//! - **Strict schema** for the time and value columns (clear errors + exit code 2)
//! - **Row-level validation** (skip bad rows, but report what happened)
//! - **No reordering**: unordered or duplicate timestamps are rejected, not fixed
//!
//! Accepted time formats: decimal years (`1963.5`), `YYYY-MM` and
//! `YYYY-MM-DD`. Dates map onto the sampling grid: monthly sampling uses
//! `year + (month − 1)/12`, yearly sampling uses the year. Rounded decimal
//! years (`1963.0833`) are snapped onto the monthly or yearly grid.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{Datelike, NaiveDate};
use csv::StringRecord;
use tracing::{debug, warn};

use crate::domain::{Sampling, TimeSeries};
use crate::error::AppError;

/// Decimal years within this fraction of a step from a grid point are snapped onto it.
const GRID_SNAP: f64 = 1e-3;

const TIME_COLUMNS: [&str; 3] = ["time", "date", "year"];
const VALUE_COLUMNS: [&str; 3] = ["value", "concentration", "c"];

/// A row-level error encountered during ingest.
#[derive(Debug, Clone)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

/// Ingest output: the series plus row-level bookkeeping.
#[derive(Debug, Clone)]
pub struct IngestedSeries {
    pub series: TimeSeries,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
    /// Rows with an empty value (kept as missing observations).
    pub missing: usize,
}

/// Load a series CSV from disk.
pub fn load_series_csv(path: &Path, sampling: Sampling) -> Result<IngestedSeries, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open CSV '{}': {e}", path.display())))?;
    let ingested = read_series(file, sampling)
        .map_err(|e| AppError::new(e.exit_code(), format!("{}: {e}", path.display())))?;

    debug!(
        path = %path.display(),
        rows = ingested.rows_read,
        used = ingested.series.len(),
        missing = ingested.missing,
        "series loaded"
    );
    for err in &ingested.row_errors {
        warn!(line = err.line, "{}", err.message);
    }
    Ok(ingested)
}

/// Parse a series CSV from any reader.
pub fn read_series<R: Read>(reader: R, sampling: Sampling) -> Result<IngestedSeries, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read CSV headers: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);

    let time_idx = find_column(&header_map, &TIME_COLUMNS)?;
    let value_idx = find_column(&header_map, &VALUE_COLUMNS)?;

    let mut times = Vec::new();
    let mut values = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;
    let mut missing = 0usize;

    for (idx, result) in reader.records().enumerate() {
        // +2: records start after the header, lines are 1-based.
        let line = idx + 2;
        rows_read += 1;

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(RowError {
                    line,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };

        match parse_row(&record, time_idx, value_idx, sampling) {
            Ok((t, v)) => {
                if v.is_nan() {
                    missing += 1;
                }
                times.push(t);
                values.push(v);
            }
            Err(message) => row_errors.push(RowError { line, message }),
        }
    }

    if times.is_empty() {
        return Err(AppError::new(2, "No valid rows in series CSV."));
    }

    let series = TimeSeries::new(times, values)?;
    Ok(IngestedSeries {
        series,
        row_errors,
        rows_read,
        missing,
    })
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports sometimes prefix the first header with a BOM.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

fn find_column(header_map: &HashMap<String, usize>, names: &[&str]) -> Result<usize, AppError> {
    names
        .iter()
        .find_map(|n| header_map.get(*n).copied())
        .ok_or_else(|| {
            let listed = names.iter().map(|n| format!("`{n}`")).collect::<Vec<_>>().join(", ");
            AppError::new(2, format!("Missing required column: one of {listed}"))
        })
}

fn parse_row(record: &StringRecord, time_idx: usize, value_idx: usize, sampling: Sampling) -> Result<(f64, f64), String> {
    let raw_time = record
        .get(time_idx)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| "Missing time value.".to_string())?;
    let time = snap_to_grid(parse_time(raw_time, sampling)?, sampling);

    let value = match record.get(value_idx).map(str::trim).filter(|s| !s.is_empty()) {
        None => f64::NAN,
        Some(s) => {
            let v = s
                .parse::<f64>()
                .map_err(|_| format!("Invalid concentration '{s}'."))?;
            if !v.is_finite() {
                return Err(format!("Non-finite concentration '{s}'."));
            }
            v
        }
    };

    Ok((time, value))
}

/// Parse a timestamp into decimal years.
pub fn parse_time(s: &str, sampling: Sampling) -> Result<f64, String> {
    if let Ok(t) = s.parse::<f64>() {
        return if t.is_finite() {
            Ok(t)
        } else {
            Err(format!("Non-finite time '{s}'."))
        };
    }

    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(&format!("{s}-01"), "%Y-%m-%d"))
        .map_err(|_| format!("Invalid time '{s}'. Expected decimal years, YYYY-MM or YYYY-MM-DD."))?;
    Ok(date_to_decimal_year(date, sampling))
}

/// Snap `t` onto the calendar grid (`k·Δ`) when it is within `GRID_SNAP·Δ` of a grid point.
///
/// Custom intervals have no calendar anchor and are left untouched.
pub fn snap_to_grid(t: f64, sampling: Sampling) -> f64 {
    let dt = match sampling {
        Sampling::Monthly | Sampling::Yearly => sampling.step(),
        Sampling::Interval(_) => return t,
    };
    let k = (t / dt).round();
    let snapped = match sampling {
        Sampling::Monthly => k / 12.0,
        _ => k,
    };
    if (t - snapped).abs() <= GRID_SNAP * dt { snapped } else { t }
}

/// Decimal year of `date` on the sampling grid.
pub fn date_to_decimal_year(date: NaiveDate, sampling: Sampling) -> f64 {
    let year = date.year() as f64;
    match sampling {
        Sampling::Monthly => year + date.month0() as f64 / 12.0,
        Sampling::Yearly => year,
        Sampling::Interval(_) => {
            let days = if date.leap_year() { 366.0 } else { 365.0 };
            year + date.ordinal0() as f64 / days
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn monthly_dates_map_to_grid() {
        let csv = "Date,Value\n1963-01,10\n1963-02-15,20\n1963-03,\n";
        let ingested = read_series(csv.as_bytes(), Sampling::Monthly).unwrap();
        let s = &ingested.series;
        assert_eq!(s.len(), 3);
        assert_eq!(s.times()[0], 1963.0);
        assert!((s.times()[1] - (1963.0 + 1.0 / 12.0)).abs() < 1e-12);
        assert!(s.values()[2].is_nan());
        assert_eq!(ingested.missing, 1);
        assert!(s.check_uniform(Sampling::Monthly).is_ok());
    }

    #[test]
    fn decimal_years_and_alternative_headers() {
        let csv = "\u{feff}year,c\n2000.0,1.5\n2001.0,2.5\n";
        let ingested = read_series(csv.as_bytes(), Sampling::Yearly).unwrap();
        assert_eq!(ingested.series.times(), &[2000.0, 2001.0]);
        assert_eq!(ingested.series.values(), &[1.5, 2.5]);
    }

    #[test]
    fn rounded_decimal_years_snap_to_the_monthly_grid() {
        let csv = "time,value\n1963.0833,1\n1963.1667,2\n1963.25,3\n1963.3,4\n";
        let ingested = read_series(csv.as_bytes(), Sampling::Monthly).unwrap();
        let t = ingested.series.times();
        assert!((t[0] - (1963.0 + 1.0 / 12.0)).abs() < 1e-12);
        assert!((t[1] - (1963.0 + 2.0 / 12.0)).abs() < 1e-12);
        assert_eq!(t[2], 1963.25);
        // Too far from any month start: left for the model to reject.
        assert_eq!(t[3], 1963.3);

        assert_eq!(snap_to_grid(1963.0833, Sampling::Interval(0.5)), 1963.0833);
        assert_eq!(snap_to_grid(2000.0004, Sampling::Yearly), 2000.0);
    }

    #[test]
    fn synthetic_monthly_observations_fit_after_csv_round_trip() {
        use std::sync::Arc;

        use crate::data::{SyntheticOptions, bomb_pulse_input, synthetic_observations};
        use crate::domain::{Tracer, WarmupSpec};
        use crate::fit::Solver;
        use crate::io::write_series_csv;
        use crate::models::{Component, ConvolutionEngine, Model};
        use crate::units::{ExponentialPiston, UnitModel};

        let engine = ConvolutionEngine {
            sampling: Sampling::Monthly,
            decay: Tracer::Tritium.decay(),
            steady_state_input: 5.0,
            warmup: WarmupSpec::default(),
        };
        let input = bomb_pulse_input(1950.0, 2010.0, Sampling::Monthly).unwrap();
        let model = Model::new(vec![Component::new(Arc::new(ExponentialPiston), 1.0)], input, engine).unwrap();
        let truth = vec![
            ExponentialPiston
                .default_params()
                .with_value("mtt", 12.0)
                .with_value("eta", 0.0)
                .with_fixed("eta", true),
        ];
        let opts = SyntheticOptions {
            every: 5,
            from: Some(1990.0),
            noise_sd: 0.0,
            seed: 1,
        };
        let observations = synthetic_observations(&model, &truth, opts).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("obs.csv");
        write_series_csv(&path, &observations).unwrap();
        let reloaded = load_series_csv(&path, Sampling::Monthly).unwrap().series;
        assert_eq!(reloaded.len(), observations.len());
        assert_eq!(
            model.sample_indices(reloaded.times()).unwrap(),
            model.sample_indices(observations.times()).unwrap()
        );

        let start = vec![truth[0].clone().with_value("mtt", 8.0)];
        let report = Solver::default().fit(&model, &start, &reloaded).unwrap();
        assert!(report.converged(), "status {:?}", report.status);
        let mtt = report.params[0].value("mtt").unwrap();
        assert!((mtt - 12.0).abs() / 12.0 < 1e-3, "mtt {mtt}");
    }

    #[test]
    fn bad_rows_are_reported_and_skipped() {
        let csv = "time,value\n2000,1\nnot-a-date,2\n2002,abc\n2003,4\n";
        let ingested = read_series(csv.as_bytes(), Sampling::Yearly).unwrap();
        assert_eq!(ingested.rows_read, 4);
        assert_eq!(ingested.series.len(), 2);
        let lines: Vec<_> = ingested.row_errors.iter().map(|e| e.line).collect();
        assert_eq!(lines, vec![3, 4]);
    }

    #[test]
    fn schema_and_order_errors_are_input_errors() {
        let err = read_series("when,value\n2000,1\n".as_bytes(), Sampling::Yearly).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("`time`"));

        let err = read_series("time,value\n2001,1\n2000,2\n".as_bytes(), Sampling::Yearly).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn loads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "time,value").unwrap();
        for i in 0..24 {
            writeln!(file, "{},{}", 1990.0 + i as f64 / 12.0, i).unwrap();
        }
        file.flush().unwrap();

        let ingested = load_series_csv(file.path(), Sampling::Monthly).unwrap();
        assert_eq!(ingested.series.len(), 24);
        assert!(ingested.row_errors.is_empty());

        let missing = load_series_csv(Path::new("/nonexistent/series.csv"), Sampling::Monthly);
        assert_eq!(missing.unwrap_err().exit_code(), 2);
    }
}

//! Sweep dataset: one [`MetricsRecord`] per worker count, strictly ordered.
//!
//! The dataset is the only thing handed to downstream consumers (report and
//! plot generators). Its logical schema is the contract; Arrow, Parquet,
//! JSON and a plain-text table are provided as carriers.

use std::fmt;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, StringArray, UInt32Array};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Quality of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordStatus {
    /// Measured and every metric in range
    Ok,
    /// Measured, but the inferred fraction lies outside `[0, 1]`
    Anomalous,
    /// No usable measurement; metric fields are empty
    Missing,
}

impl RecordStatus {
    /// Lower-case label used in exports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Anomalous => "anomalous",
            Self::Missing => "missing",
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived metrics for one worker count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    /// Worker count
    pub core_count: u32,
    /// Parallel wall time in seconds (slowest rank)
    pub time: Option<f64>,
    /// `T1 / Tp`
    pub speedup: Option<f64>,
    /// Speedup per worker
    pub efficiency: Option<f64>,
    /// Amdahl speedup for the sweep's model serial fraction
    pub predicted_speedup: Option<f64>,
    /// Parallelizable fraction solved from the measured speedup
    pub parallel_fraction: Option<f64>,
    /// Empirical serial fraction (Karp–Flatt)
    pub serial_fraction: Option<f64>,
    /// Record quality
    pub status: RecordStatus,
    /// Runs attempted for this configuration
    pub attempts: u32,
    /// Last error (missing) or anomaly description
    pub note: Option<String>,
}

impl MetricsRecord {
    /// The baseline record: its own reference, so speedup and efficiency are 1.
    #[must_use]
    pub const fn baseline(time: f64, attempts: u32) -> Self {
        Self {
            core_count: 1,
            time: Some(time),
            speedup: Some(1.0),
            efficiency: Some(1.0),
            predicted_speedup: None,
            parallel_fraction: None,
            serial_fraction: None,
            status: RecordStatus::Ok,
            attempts,
            note: None,
        }
    }

    /// A gap: the configuration produced no usable measurement.
    #[must_use]
    pub fn missing(core_count: u32, attempts: u32, reason: impl Into<String>) -> Self {
        Self {
            core_count,
            time: None,
            speedup: None,
            efficiency: None,
            predicted_speedup: None,
            parallel_fraction: None,
            serial_fraction: None,
            status: RecordStatus::Missing,
            attempts,
            note: Some(reason.into()),
        }
    }

    /// Whether the record carries measurements.
    #[must_use]
    pub const fn is_measured(&self) -> bool {
        !matches!(self.status, RecordStatus::Missing)
    }
}

/// Ordered collection of records, one per worker count.
///
/// Serializes as a bare array of records; deserializing replays
/// [`Dataset::push`], so out-of-order input is rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<MetricsRecord>", into = "Vec<MetricsRecord>")]
pub struct Dataset {
    records: Vec<MetricsRecord>,
}

impl TryFrom<Vec<MetricsRecord>> for Dataset {
    type Error = Error;

    fn try_from(records: Vec<MetricsRecord>) -> Result<Self> {
        let mut dataset = Self::new();
        for record in records {
            dataset.push(record)?;
        }
        Ok(dataset)
    }
}

impl From<Dataset> for Vec<MetricsRecord> {
    fn from(dataset: Dataset) -> Self {
        dataset.records
    }
}

impl Dataset {
    /// Create an empty dataset.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfOrder`] unless `record.core_count` is greater
    /// than every core count already present.
    pub fn push(&mut self, record: MetricsRecord) -> Result<()> {
        if let Some(last) = self.records.last() {
            if record.core_count <= last.core_count {
                return Err(Error::OutOfOrder {
                    core_count: record.core_count,
                    last: last.core_count,
                });
            }
        }
        self.records.push(record);
        Ok(())
    }

    /// All records in ascending core-count order.
    #[must_use]
    pub fn records(&self) -> &[MetricsRecord] {
        &self.records
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the dataset is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record for a given worker count.
    #[must_use]
    pub fn get(&self, core_count: u32) -> Option<&MetricsRecord> {
        self.records
            .binary_search_by_key(&core_count, |r| r.core_count)
            .ok()
            .map(|i| &self.records[i])
    }

    /// Baseline record, if the sweep got that far.
    #[must_use]
    pub fn baseline(&self) -> Option<&MetricsRecord> {
        self.records.first().filter(|r| r.core_count == 1)
    }

    /// Records with the given status.
    pub fn with_status(&self, status: RecordStatus) -> impl Iterator<Item = &MetricsRecord> {
        self.records.iter().filter(move |r| r.status == status)
    }

    /// Fill `predicted_speedup` of every measured record from serial fraction `f`.
    pub(crate) fn apply_prediction(&mut self, f: f64) {
        for record in self.records.iter_mut().filter(|r| r.is_measured()) {
            record.predicted_speedup = crate::metrics::amdahl_predicted(f, record.core_count).ok();
        }
    }

    /// Arrow schema of the exported table.
    #[must_use]
    pub fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("core_count", DataType::UInt32, false),
            Field::new("time_seconds", DataType::Float64, true),
            Field::new("speedup", DataType::Float64, true),
            Field::new("efficiency", DataType::Float64, true),
            Field::new("predicted_speedup", DataType::Float64, true),
            Field::new("parallel_fraction", DataType::Float64, true),
            Field::new("serial_fraction", DataType::Float64, true),
            Field::new("status", DataType::Utf8, false),
            Field::new("attempts", DataType::UInt32, false),
            Field::new("note", DataType::Utf8, true),
        ]))
    }

    /// Export as a single Arrow record batch, one row per configuration.
    ///
    /// # Errors
    ///
    /// Returns error if Arrow rejects the batch.
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let rows = &self.records;
        let float = |get: fn(&MetricsRecord) -> Option<f64>| -> ArrayRef {
            Arc::new(rows.iter().map(get).collect::<Float64Array>())
        };
        let columns: Vec<ArrayRef> = vec![
            Arc::new(UInt32Array::from_iter_values(rows.iter().map(|r| r.core_count))),
            float(|r| r.time),
            float(|r| r.speedup),
            float(|r| r.efficiency),
            float(|r| r.predicted_speedup),
            float(|r| r.parallel_fraction),
            float(|r| r.serial_fraction),
            Arc::new(StringArray::from_iter_values(
                rows.iter().map(|r| r.status.as_str()),
            )),
            Arc::new(UInt32Array::from_iter_values(rows.iter().map(|r| r.attempts))),
            Arc::new(rows.iter().map(|r| r.note.as_deref()).collect::<StringArray>()),
        ];
        Ok(RecordBatch::try_new(Self::schema(), columns)?)
    }

    /// Write the table as a Parquet file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be created or written.
    pub fn write_parquet<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let batch = self.to_record_batch()?;
        let file = File::create(path.as_ref())?;
        let mut writer = ArrowWriter::try_new(file, batch.schema(), None)?;
        writer.write(&batch)?;
        writer.close()?;
        Ok(())
    }

    /// Write the records as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be created or written.
    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path.as_ref())?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }
}

fn cell(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.4}"))
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:>5} {:>12} {:>9} {:>10} {:>9} {:>9} {:>9}  {}",
            "cores", "time (s)", "speedup", "efficiency", "predicted", "f_par", "f_ser", "status"
        )?;
        for r in &self.records {
            write!(
                f,
                "{:>5} {:>12} {:>9} {:>10} {:>9} {:>9} {:>9}  {}",
                r.core_count,
                r.time.map_or_else(|| "-".to_string(), |t| format!("{t:.6}")),
                cell(r.speedup),
                cell(r.efficiency),
                cell(r.predicted_speedup),
                cell(r.parallel_fraction),
                cell(r.serial_fraction),
                r.status
            )?;
            if let Some(note) = &r.note {
                write!(f, " ({note})")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Array;

    fn sample() -> Dataset {
        let mut ds = Dataset::new();
        ds.push(MetricsRecord::baseline(100.0, 1)).unwrap();
        ds.push(MetricsRecord {
            core_count: 4,
            time: Some(40.0),
            speedup: Some(2.5),
            efficiency: Some(0.625),
            predicted_speedup: None,
            parallel_fraction: Some(0.8),
            serial_fraction: Some(0.2),
            status: RecordStatus::Ok,
            attempts: 1,
            note: None,
        })
        .unwrap();
        ds.push(MetricsRecord::missing(8, 3, "timed out")).unwrap();
        ds
    }

    #[test]
    fn test_push_enforces_order() {
        let mut ds = sample();
        let err = ds.push(MetricsRecord::missing(8, 1, "dup")).unwrap_err();
        assert!(matches!(err, Error::OutOfOrder { core_count: 8, last: 8 }));
        assert!(ds.push(MetricsRecord::missing(2, 1, "late")).is_err());
        assert_eq!(ds.len(), 3);
    }

    #[test]
    fn test_lookup() {
        let ds = sample();
        assert_eq!(ds.baseline().map(|r| r.core_count), Some(1));
        assert_eq!(ds.get(4).and_then(|r| r.speedup), Some(2.5));
        assert!(ds.get(2).is_none());
        assert_eq!(ds.with_status(RecordStatus::Missing).count(), 1);
    }

    #[test]
    fn test_apply_prediction_skips_missing() {
        let mut ds = sample();
        ds.apply_prediction(0.2);
        let p1 = ds.get(1).and_then(|r| r.predicted_speedup).unwrap();
        assert!((p1 - 1.0).abs() < 1e-12);
        let p4 = ds.get(4).and_then(|r| r.predicted_speedup).unwrap();
        assert!((p4 - 2.5).abs() < 1e-9);
        assert!(ds.get(8).and_then(|r| r.predicted_speedup).is_none());
    }

    #[test]
    fn test_record_batch_schema_and_nulls() {
        let batch = sample().to_record_batch().unwrap();
        assert_eq!(batch.num_rows(), 3);
        assert_eq!(batch.num_columns(), 10);
        assert_eq!(batch.schema(), Dataset::schema());

        let time = batch
            .column(1)
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap();
        assert!(time.is_null(2));
        assert!((time.value(1) - 40.0).abs() < f64::EPSILON);

        let status = batch
            .column(7)
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(status.value(2), "missing");
    }

    #[test]
    fn test_write_parquet_and_json() {
        let dir = tempfile::tempdir().unwrap();
        let ds = sample();

        let parquet_path = dir.path().join("sweep.parquet");
        ds.write_parquet(&parquet_path).unwrap();
        assert!(std::fs::metadata(&parquet_path).unwrap().len() > 0);

        let json_path = dir.path().join("sweep.json");
        ds.write_json(&json_path).unwrap();
        let text = std::fs::read_to_string(&json_path).unwrap();
        let back: Vec<MetricsRecord> = serde_json::from_str(&text).unwrap();
        assert_eq!(back, ds.records());

        let loaded: Dataset = serde_json::from_str(&text).unwrap();
        assert_eq!(loaded, ds);
        assert_eq!(loaded.get(4).unwrap().speedup, Some(2.5));
    }

    #[test]
    fn test_deserialize_rejects_out_of_order() {
        let descending = vec![
            MetricsRecord::baseline(10.0, 1),
            MetricsRecord::missing(4, 1, "gap"),
            MetricsRecord::missing(2, 1, "gap"),
        ];
        let text = serde_json::to_string(&descending).unwrap();
        let err = serde_json::from_str::<Dataset>(&text).unwrap_err();
        assert!(err.to_string().contains("out of order"));

        let duplicate = vec![
            MetricsRecord::baseline(10.0, 1),
            MetricsRecord::missing(1, 1, "gap"),
        ];
        let text = serde_json::to_string(&duplicate).unwrap();
        assert!(serde_json::from_str::<Dataset>(&text).is_err());
    }

    #[test]
    fn test_display_marks_gaps() {
        let table = sample().to_string();
        assert!(table.contains("cores"));
        assert!(table.contains("missing (timed out)"));
        assert_eq!(table.lines().count(), 4);
    }
}

//! Per-frame metric cache and its on-disk stats file.
//!
//! [`FrameMetricStore`] maps `frame_number → metric_name → f64`. Entries are
//! write-once: the first value stored for a `(frame, metric)` pair is the one
//! every later reader sees, so detectors can share the store and a re-run fed
//! from a saved stats file skips recomputation without changing results.
//!
//! The stats file is a comma-delimited table:
//!
//! ```text
//! Frame Rate:,25
//! Frame Number,Timecode,delta_hsv_avg,delta_hue,delta_sat,delta_lum
//! 1,00:00:00.000,,,,
//! 2,00:00:00.040,0.5,0,1.5,0
//! ```
//!
//! Frame numbers in the file are 1-based. Values are written in shortest
//! round-trip form, so a reload reproduces them bit for bit.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use tracing::{debug, info, instrument, warn};

use crate::common::{Result, SceneDetectError};
use crate::timecode::{validate_fps, FrameTimecode, MAX_FPS_DELTA};

const FRAME_RATE_LABEL: &str = "Frame Rate:";
const FRAME_NUMBER_COLUMN: &str = "Frame Number";
const TIMECODE_COLUMN: &str = "Timecode";

/// Write-once cache of named per-frame metrics
#[derive(Debug, Default, Clone)]
pub struct FrameMetricStore {
    frames: BTreeMap<u64, BTreeMap<String, f64>>,
    registered: Vec<String>,
    save_required: bool,
}

impl FrameMetricStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record metric names so the stats file lists them in this order.
    /// Already registered names are ignored.
    pub fn register_metrics<S: AsRef<str>>(&mut self, keys: &[S]) {
        for key in keys {
            let key = key.as_ref();
            if !self.registered.iter().any(|registered| registered == key) {
                debug!("Registering metric '{}'", key);
                self.registered.push(key.to_string());
            }
        }
    }

    pub fn registered_metrics(&self) -> &[String] {
        &self.registered
    }

    pub fn get(&self, frame_number: u64, key: &str) -> Option<f64> {
        self.frames
            .get(&frame_number)
            .and_then(|metrics| metrics.get(key))
            .copied()
    }

    pub fn get_metrics(&self, frame_number: u64, keys: &[&str]) -> Vec<Option<f64>> {
        keys.iter().map(|key| self.get(frame_number, key)).collect()
    }

    /// True when every one of `keys` is cached for `frame_number`.
    pub fn metrics_exist(&self, frame_number: u64, keys: &[&str]) -> bool {
        match self.frames.get(&frame_number) {
            Some(metrics) => keys.iter().all(|key| metrics.contains_key(*key)),
            None => keys.is_empty(),
        }
    }

    /// Store a value unless the pair is already cached.
    ///
    /// Returns `true` if the value was stored. An existing entry is never
    /// replaced; a conflicting value is logged and dropped.
    pub fn insert(&mut self, frame_number: u64, key: &str, value: f64) -> bool {
        let inserted = self.insert_entry(frame_number, key, value);
        if inserted {
            self.save_required = true;
        }
        inserted
    }

    fn insert_entry(&mut self, frame_number: u64, key: &str, value: f64) -> bool {
        let metrics = self.frames.entry(frame_number).or_default();
        match metrics.get(key) {
            Some(existing) => {
                if existing.to_bits() != value.to_bits() {
                    warn!(
                        "Ignoring new value {} for metric '{}' at frame {} (cached: {})",
                        value, key, frame_number, existing
                    );
                }
                false
            }
            None => {
                metrics.insert(key.to_string(), value);
                true
            }
        }
    }

    /// Return the cached value, or compute, store and return it.
    ///
    /// `compute` runs at most once per `(frame_number, key)` for the lifetime
    /// of the store.
    pub fn get_or_compute(
        &mut self,
        frame_number: u64,
        key: &str,
        compute: impl FnOnce() -> f64,
    ) -> f64 {
        if let Some(value) = self.get(frame_number, key) {
            return value;
        }
        let value = compute();
        self.insert(frame_number, key, value);
        value
    }

    /// Multi-metric form of [`FrameMetricStore::get_or_compute`].
    ///
    /// The cache only counts as a hit if all `keys` are present. `compute`
    /// must return one value per key, in the same order.
    pub fn get_or_try_compute_all(
        &mut self,
        frame_number: u64,
        keys: &[&str],
        compute: impl FnOnce() -> Result<Vec<f64>>,
    ) -> Result<Vec<f64>> {
        if self.metrics_exist(frame_number, keys) {
            return Ok(self
                .get_metrics(frame_number, keys)
                .into_iter()
                .flatten()
                .collect());
        }

        let values = compute()?;
        if values.len() != keys.len() {
            return Err(SceneDetectError::internal_error(format!(
                "Computed {} values for {} metrics at frame {}",
                values.len(),
                keys.len(),
                frame_number
            )));
        }

        for (key, value) in keys.iter().zip(&values) {
            self.insert(frame_number, key, *value);
        }

        // Partially cached frames keep their original values.
        Ok(self
            .get_metrics(frame_number, keys)
            .into_iter()
            .flatten()
            .collect())
    }

    /// Number of frames with at least one cached metric
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frame_numbers(&self) -> impl Iterator<Item = u64> + '_ {
        self.frames.keys().copied()
    }

    /// True when values were computed since the last save or load.
    pub fn is_save_required(&self) -> bool {
        self.save_required
    }

    /// Stats file columns: registered metrics first, then any others sorted by name.
    fn columns(&self) -> Vec<String> {
        let mut extra: Vec<String> = self
            .frames
            .values()
            .flat_map(|metrics| metrics.keys())
            .filter(|key| !self.registered.contains(*key))
            .cloned()
            .collect();
        extra.sort();
        extra.dedup();

        let mut columns = self.registered.clone();
        columns.extend(extra);
        columns
    }

    /// Write the store as a stats file.
    #[instrument(skip(self, writer))]
    pub fn save<W: Write>(&mut self, writer: W, fps: f64) -> Result<()> {
        validate_fps(fps)?;
        let mut writer = BufWriter::new(writer);
        let columns = self.columns();

        writeln!(writer, "{},{}", FRAME_RATE_LABEL, fps)?;
        write!(writer, "{},{}", FRAME_NUMBER_COLUMN, TIMECODE_COLUMN)?;
        for column in &columns {
            write!(writer, ",{}", column)?;
        }
        writeln!(writer)?;

        for (frame_number, metrics) in &self.frames {
            let timecode = FrameTimecode::new(*frame_number, fps);
            write!(writer, "{},{}", frame_number + 1, timecode.format(3, true))?;
            for column in &columns {
                match metrics.get(column) {
                    Some(value) => write!(writer, ",{}", value)?,
                    None => write!(writer, ",")?,
                }
            }
            writeln!(writer)?;
        }
        writer.flush()?;

        debug!(
            "Saved {} frames x {} metrics to stats file",
            self.frames.len(),
            columns.len()
        );
        self.save_required = false;
        Ok(())
    }

    /// Populate the store from a stats file, returning the number of rows read.
    ///
    /// Values already cached are kept. An empty input loads nothing.
    ///
    /// # Errors
    /// * `StatsFileFramerateMismatch` - the file was written at another framerate
    /// * `StatsFileCorrupt` - missing header, bad frame number, ragged row or
    ///   unparseable value
    #[instrument(skip(self, reader))]
    pub fn load<R: BufRead>(&mut self, reader: R, fps: f64) -> Result<usize> {
        validate_fps(fps)?;
        let mut lines = reader.lines().enumerate();

        let Some((_, rate_line)) = lines.next() else {
            debug!("Stats file is empty, nothing to load");
            return Ok(0);
        };
        let rate_line = rate_line?;
        let file_fps = parse_frame_rate_line(&rate_line)?;
        if (file_fps - fps).abs() >= MAX_FPS_DELTA {
            return Err(SceneDetectError::StatsFileFramerateMismatch {
                expected: fps,
                found: file_fps,
            });
        }

        let (_, header) = lines
            .next()
            .ok_or_else(|| SceneDetectError::stats_corrupt(2, "missing column header"))?;
        let header = header?;
        let header: Vec<&str> = header.trim_end().split(',').collect();
        if header.len() < 2 || header[0] != FRAME_NUMBER_COLUMN || header[1] != TIMECODE_COLUMN {
            return Err(SceneDetectError::stats_corrupt(
                2,
                format!("expected '{},{}' header", FRAME_NUMBER_COLUMN, TIMECODE_COLUMN),
            ));
        }
        let metric_names = &header[2..];
        self.register_metrics(metric_names);

        let mut rows = 0;
        for (index, line) in lines {
            let line_number = index + 1;
            let line = line?;
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }

            let cells: Vec<&str> = line.split(',').collect();
            if cells.len() != header.len() {
                return Err(SceneDetectError::stats_corrupt(
                    line_number,
                    format!("expected {} cells, found {}", header.len(), cells.len()),
                ));
            }

            let frame_number = cells[0]
                .parse::<u64>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .ok_or_else(|| {
                    SceneDetectError::stats_corrupt(
                        line_number,
                        format!("invalid frame number '{}'", cells[0]),
                    )
                })?;

            for (name, cell) in metric_names.iter().zip(&cells[2..]) {
                if cell.is_empty() {
                    continue;
                }
                let value: f64 = cell.parse().map_err(|_| {
                    SceneDetectError::stats_corrupt(
                        line_number,
                        format!("invalid value '{}' for metric '{}'", cell, name),
                    )
                })?;
                self.insert_entry(frame_number, name, value);
            }
            rows += 1;
        }

        info!("Loaded {} frames of metrics from stats file", rows);
        Ok(rows)
    }

    /// Save to a file, creating or truncating it.
    pub fn save_to_path(&mut self, path: impl AsRef<Path>, fps: f64) -> Result<()> {
        let file = File::create(path.as_ref())?;
        self.save(file, fps)
    }

    /// Load from a file; a missing file loads nothing.
    pub fn load_from_path(&mut self, path: impl AsRef<Path>, fps: f64) -> Result<usize> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("Stats file {} does not exist yet", path.display());
            return Ok(0);
        }
        let file = File::open(path)?;
        self.load(BufReader::new(file), fps)
    }
}

fn parse_frame_rate_line(line: &str) -> Result<f64> {
    let mut cells = line.trim_end().split(',');
    if cells.next() != Some(FRAME_RATE_LABEL) {
        return Err(SceneDetectError::stats_corrupt(
            1,
            format!("expected '{}' line", FRAME_RATE_LABEL),
        ));
    }
    cells
        .next()
        .and_then(|value| value.parse::<f64>().ok())
        .filter(|fps| fps.is_finite() && *fps > 0.0)
        .ok_or_else(|| SceneDetectError::stats_corrupt(1, "invalid frame rate"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::io::Cursor;

    #[test]
    fn test_get_or_compute_runs_once() {
        let mut store = FrameMetricStore::new();
        let calls = Cell::new(0);

        let first = store.get_or_compute(5, "frame_avg_rgb", || {
            calls.set(calls.get() + 1);
            12.5
        });
        let second = store.get_or_compute(5, "frame_avg_rgb", || {
            calls.set(calls.get() + 1);
            99.0
        });

        assert_eq!(first, 12.5);
        assert_eq!(second, 12.5);
        assert_eq!(calls.get(), 1);
        assert!(store.is_save_required());
    }

    #[test]
    fn test_insert_is_write_once() {
        let mut store = FrameMetricStore::new();
        assert!(store.insert(1, "a", 1.0));
        assert!(!store.insert(1, "a", 2.0));
        assert_eq!(store.get(1, "a"), Some(1.0));
        assert_eq!(store.get(1, "b"), None);
        assert_eq!(store.get(2, "a"), None);
    }

    #[test]
    fn test_metrics_exist_requires_all_keys() {
        let mut store = FrameMetricStore::new();
        store.insert(3, "a", 1.0);
        assert!(store.metrics_exist(3, &["a"]));
        assert!(!store.metrics_exist(3, &["a", "b"]));
        assert!(!store.metrics_exist(4, &["a"]));
    }

    #[test]
    fn test_get_or_try_compute_all() {
        let mut store = FrameMetricStore::new();
        store.insert(0, "b", 7.0);

        let values = store
            .get_or_try_compute_all(0, &["a", "b"], || Ok(vec![1.0, 2.0]))
            .unwrap();
        // The cached "b" wins over the recomputed one
        assert_eq!(values, vec![1.0, 7.0]);

        let values = store
            .get_or_try_compute_all(0, &["a", "b"], || panic!("should be cached"))
            .unwrap();
        assert_eq!(values, vec![1.0, 7.0]);

        let result = store.get_or_try_compute_all(1, &["a", "b"], || Ok(vec![1.0]));
        assert!(matches!(result, Err(SceneDetectError::InternalError { .. })));

        let result = store.get_or_try_compute_all(2, &["a"], || {
            Err(SceneDetectError::frame_error(2, "boom"))
        });
        assert!(result.is_err());
        assert!(!store.metrics_exist(2, &["a"]));
    }

    #[test]
    fn test_save_format() {
        let mut store = FrameMetricStore::new();
        store.register_metrics(&["delta_hsv_avg", "delta_hue"]);
        store.insert(0, "delta_hue", 0.25);
        store.insert(1, "delta_hsv_avg", 3.0);
        store.insert(1, "delta_hue", 1.5);

        let mut out = Vec::new();
        store.save(&mut out, 25.0).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert_eq!(
            text,
            "Frame Rate:,25\n\
             Frame Number,Timecode,delta_hsv_avg,delta_hue\n\
             1,00:00:00.000,,0.25\n\
             2,00:00:00.040,3,1.5\n"
        );
        assert!(!store.is_save_required());
    }

    #[test]
    fn test_save_load_round_trip() {
        let mut store = FrameMetricStore::new();
        store.register_metrics(&["x"]);
        store.insert(0, "x", 1.0 / 3.0);
        store.insert(10, "x", 123.456_789_012_345);
        store.insert(10, "y", -0.1);

        let mut out = Vec::new();
        store.save(&mut out, 29.97).unwrap();

        let mut loaded = FrameMetricStore::new();
        let rows = loaded.load(Cursor::new(out), 29.97).unwrap();
        assert_eq!(rows, 2);
        assert_eq!(loaded.get(0, "x"), Some(1.0 / 3.0));
        assert_eq!(loaded.get(10, "x"), Some(123.456_789_012_345));
        assert_eq!(loaded.get(10, "y"), Some(-0.1));
        assert_eq!(loaded.get(0, "y"), None);
        assert_eq!(loaded.registered_metrics(), &["x".to_string(), "y".to_string()]);
        assert!(!loaded.is_save_required());
    }

    #[test]
    fn test_load_framerate_mismatch() {
        let text = "Frame Rate:,30\nFrame Number,Timecode,x\n1,00:00:00.000,1\n";
        let mut store = FrameMetricStore::new();
        let result = store.load(Cursor::new(text), 25.0);
        assert!(matches!(
            result,
            Err(SceneDetectError::StatsFileFramerateMismatch { .. })
        ));
    }

    #[test]
    fn test_load_corrupt_files() {
        let cases = [
            "Frames:,25\n",
            "Frame Rate:,abc\n",
            "Frame Rate:,25\n",
            "Frame Rate:,25\nFrame,Time,x\n",
            "Frame Rate:,25\nFrame Number,Timecode,x\n0,00:00:00.000,1\n",
            "Frame Rate:,25\nFrame Number,Timecode,x\n1,00:00:00.000\n",
            "Frame Rate:,25\nFrame Number,Timecode,x\n1,00:00:00.000,nope\n",
        ];
        for text in cases {
            let mut store = FrameMetricStore::new();
            let result = store.load(Cursor::new(text), 25.0);
            assert!(
                matches!(result, Err(SceneDetectError::StatsFileCorrupt { .. })),
                "expected corrupt error for {:?}, got {:?}",
                text,
                result
            );
        }
    }

    #[test]
    fn test_load_keeps_existing_values() {
        let text = "Frame Rate:,25\nFrame Number,Timecode,x\n1,00:00:00.000,5\n\n";
        let mut store = FrameMetricStore::new();
        store.insert(0, "x", 1.0);
        assert_eq!(store.load(Cursor::new(text), 25.0).unwrap(), 1);
        assert_eq!(store.get(0, "x"), Some(1.0));
    }

    #[test]
    fn test_load_empty_input() {
        let mut store = FrameMetricStore::new();
        assert_eq!(store.load(Cursor::new(""), 25.0).unwrap(), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_path_helpers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.csv");

        let mut store = FrameMetricStore::new();
        assert_eq!(store.load_from_path(&path, 25.0).unwrap(), 0);

        store.insert(4, "frame_avg_rgb", 42.0);
        store.save_to_path(&path, 25.0).unwrap();

        let mut reloaded = FrameMetricStore::new();
        assert_eq!(reloaded.load_from_path(&path, 25.0).unwrap(), 1);
        assert_eq!(reloaded.get(4, "frame_avg_rgb"), Some(42.0));
        assert_eq!(reloaded.frame_numbers().collect::<Vec<_>>(), vec![4]);
    }
}

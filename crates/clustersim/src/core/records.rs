//! Named time series of samples.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;

use serde::Serialize;

use clustersim_core::Tick;

/// Keyed collection of `(tick, value)` series.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Records {
    series: BTreeMap<String, Vec<(Tick, f64)>>,
}

#[derive(Serialize)]
struct Row<'a> {
    key: &'a str,
    tick: Tick,
    value: f64,
}

impl Records {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a sample as is.
    pub fn append(&mut self, key: &str, tick: Tick, value: f64) {
        self.series.entry(key.to_string()).or_default().push((tick, value));
    }

    /// Appends a sample of a piecewise-constant signal.
    ///
    /// A new series starts with `(0, 0.0)`. When the previous sample is older than `tick - 1`, the previous
    /// value is repeated at `tick - 1` so that plots render a step rather than a ramp.
    pub fn append_step(&mut self, key: &str, tick: Tick, value: f64) {
        let series = self.series.entry(key.to_string()).or_insert_with(|| vec![(0, 0.)]);
        if let Some(&(last_tick, last_value)) = series.last() {
            // a hold at `tick - 1` on top of a sample already there would duplicate the point
            if last_tick + 1 < tick {
                series.push((tick - 1, last_value));
            }
        }
        series.push((tick, value));
    }

    /// Samples of the given series, empty if nothing was recorded.
    pub fn get(&self, key: &str) -> &[(Tick, f64)] {
        self.series.get(key).map(|s| s.as_slice()).unwrap_or(&[])
    }

    pub fn last(&self, key: &str) -> Option<(Tick, f64)> {
        self.get(key).last().copied()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(|k| k.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Writes all samples as `key,tick,value` rows.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut writer = csv::Writer::from_writer(writer);
        for (key, samples) in &self.series {
            for &(tick, value) in samples {
                writer.serialize(Row { key, tick, value })?;
            }
        }
        writer.flush()?;
        Ok(())
    }

    pub fn save_csv(&self, path: &str) -> Result<(), csv::Error> {
        let file = File::create(path)?;
        self.write_csv(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_series_gets_seed_and_hold_points() {
        let mut records = Records::new();
        records.append_step("tasks", 1, 1.);
        records.append_step("tasks", 11, 0.);
        assert_eq!(records.get("tasks"), &[(0, 0.), (1, 1.), (10, 1.), (11, 0.)]);
    }

    #[test]
    fn adjacent_samples_get_no_hold_point() {
        let mut records = Records::new();
        records.append_step("tasks", 0, 1.);
        records.append_step("tasks", 1, 2.);
        records.append_step("tasks", 1, 1.);
        assert_eq!(records.get("tasks"), &[(0, 0.), (0, 1.), (1, 2.), (1, 1.)]);
    }

    #[test]
    fn plain_append() {
        let mut records = Records::new();
        records.append("task_runtime", 11, 10.);
        records.append("task_runtime", 22, 10.);
        assert_eq!(records.get("task_runtime"), &[(11, 10.), (22, 10.)]);
        assert_eq!(records.last("task_runtime"), Some((22, 10.)));
        assert!(records.get("missing").is_empty());
    }

    #[test]
    fn csv_export() {
        let mut records = Records::new();
        records.append("b", 2, 0.5);
        records.append("a", 1, 1.);
        let mut out = Vec::new();
        records.write_csv(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "key,tick,value\na,1,1.0\nb,2,0.5\n");
    }
}

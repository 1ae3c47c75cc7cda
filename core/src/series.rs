//! Rolling time series of the graphed metrics.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::buffer::RingBuffer;
use crate::monitoring::Snapshot;

/// A graphed metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Temp,
    Cpu,
    Clock,
    Volt,
}

impl Metric {
    pub const ALL: [Metric; 4] = [Metric::Temp, Metric::Cpu, Metric::Clock, Metric::Volt];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Temp => "temp",
            Self::Cpu => "cpu",
            Self::Clock => "clock",
            Self::Volt => "volt",
        }
    }

    fn index(self) -> usize {
        match self {
            Self::Temp => 0,
            Self::Cpu => 1,
            Self::Clock => 2,
            Self::Volt => 3,
        }
    }

    fn value_of(self, snapshot: &Snapshot) -> f64 {
        match self {
            Self::Temp => snapshot.temperature_c,
            Self::Cpu => snapshot.cpu_load_pct,
            Self::Clock => f64::from(snapshot.clock_mhz),
            Self::Volt => snapshot.voltage_v,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "temp" => Ok(Self::Temp),
            "cpu" => Ok(Self::Cpu),
            "clock" => Ok(Self::Clock),
            "volt" => Ok(Self::Volt),
            other => Err(format!("unknown metric: {other}")),
        }
    }
}

/// Bounded history of the four graphed metrics on a shared time axis.
///
/// X coordinates come from a tick counter multiplied by the fast-tick step,
/// not from the snapshot timestamp, so the axis is strictly increasing even
/// when ticks are skipped.
#[derive(Debug, Clone)]
pub struct TimeSeries {
    time_axis: RingBuffer<f64>,
    values: [RingBuffer<f64>; 4],
    step_s: f64,
    tick: u64,
}

impl TimeSeries {
    pub fn new(capacity: usize, step_s: f64) -> Self {
        Self {
            time_axis: RingBuffer::new(capacity),
            values: std::array::from_fn(|_| RingBuffer::new(capacity)),
            step_s,
            tick: 0,
        }
    }

    /// Append one sample of every metric.
    pub fn push(&mut self, snapshot: &Snapshot) {
        self.time_axis.push(self.tick as f64 * self.step_s);
        for metric in Metric::ALL {
            self.values[metric.index()].push(metric.value_of(snapshot));
        }
        self.tick += 1;
    }

    /// Advance the time axis without recording a sample.
    pub fn skip(&mut self) {
        self.tick += 1;
    }

    /// Copy of `(xs, ys)` for one metric, oldest first.
    pub fn view(&self, metric: Metric) -> (Vec<f64>, Vec<f64>) {
        (
            self.time_axis.to_vec(),
            self.values[metric.index()].to_vec(),
        )
    }

    pub fn len(&self) -> usize {
        self.time_axis.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time_axis.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.time_axis.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(temp: f64, clock: u32) -> Snapshot {
        Snapshot {
            temperature_c: temp,
            cpu_load_pct: temp / 2.0,
            clock_mhz: clock,
            voltage_v: 0.85,
            ..Default::default()
        }
    }

    #[test]
    fn metric_names_round_trip() {
        for metric in Metric::ALL {
            assert_eq!(metric.as_str().parse::<Metric>().unwrap(), metric);
        }
        assert!("fan".parse::<Metric>().is_err());
        assert_eq!(serde_json::to_string(&Metric::Volt).unwrap(), "\"volt\"");
    }

    #[test]
    fn new_series_is_empty() {
        let series = TimeSeries::new(150, 0.1);
        for metric in Metric::ALL {
            let (xs, ys) = series.view(metric);
            assert!(xs.is_empty());
            assert!(ys.is_empty());
        }
        assert!(series.is_empty());
    }

    #[test]
    fn push_records_every_metric() {
        let mut series = TimeSeries::new(150, 0.1);
        series.push(&snapshot(55.0, 1800));
        assert_eq!(series.view(Metric::Temp).1, vec![55.0]);
        assert_eq!(series.view(Metric::Cpu).1, vec![27.5]);
        assert_eq!(series.view(Metric::Clock).1, vec![1800.0]);
        assert_eq!(series.view(Metric::Volt).1, vec![0.85]);
        assert_eq!(series.view(Metric::Temp).0, vec![0.0]);
    }

    #[test]
    fn overflow_keeps_capacity_and_order() {
        let mut series = TimeSeries::new(150, 0.1);
        for i in 0..500u32 {
            series.push(&snapshot(f64::from(i), 1000 + i));
        }

        for metric in Metric::ALL {
            let (xs, ys) = series.view(metric);
            assert_eq!(xs.len(), 150);
            assert_eq!(ys.len(), 150);
            for pair in xs.windows(2) {
                assert!(pair[1] > pair[0]);
                assert!((pair[1] - pair[0] - 0.1).abs() < 1e-9);
            }
        }

        let (xs, temps) = series.view(Metric::Temp);
        assert_eq!(*temps.last().unwrap(), 499.0);
        assert_eq!(temps[0], 350.0);
        assert!((xs.last().unwrap() - 49.9).abs() < 1e-9);
        assert_eq!(*series.view(Metric::Clock).1.last().unwrap(), 1499.0);
    }

    #[test]
    fn skip_advances_time_only() {
        let mut series = TimeSeries::new(10, 0.1);
        series.push(&snapshot(40.0, 1500));
        series.skip();
        series.skip();
        series.push(&snapshot(41.0, 1500));

        let (xs, ys) = series.view(Metric::Temp);
        assert_eq!(ys, vec![40.0, 41.0]);
        assert_eq!(xs.len(), 2);
        assert!((xs[1] - 0.3).abs() < 1e-9);
    }
}

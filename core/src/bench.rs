//! Worst-case aggregation for timed benchmarks.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::monitoring::{Snapshot, ThrottleState};

/// Peak temperature below which cooling is rated excellent.
pub const EXCELLENT_BELOW_C: f64 = 65.0;

/// Peak temperature below which cooling is rated good.
pub const GOOD_BELOW_C: f64 = 78.0;

/// Running maxima over the snapshots of one timed session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BenchStats {
    pub max_temp_c: f64,
    pub max_clock_mhz: u32,
    pub max_ram_mib: u64,
    pub max_volt_v: f64,
    pub throttled_observed: bool,
    pub samples: u64,
}

impl BenchStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one snapshot into the maxima.
    pub fn accept(&mut self, snapshot: &Snapshot) {
        self.max_temp_c = self.max_temp_c.max(snapshot.temperature_c);
        self.max_clock_mhz = self.max_clock_mhz.max(snapshot.clock_mhz);
        self.max_ram_mib = self.max_ram_mib.max(snapshot.ram_used_mib);
        self.max_volt_v = self.max_volt_v.max(snapshot.voltage_v);
        self.throttled_observed |= snapshot.throttle_state == ThrottleState::Throttled;
        self.samples += 1;
    }

    pub fn summary(&self) -> Summary {
        Summary {
            max_temp_c: self.max_temp_c,
            max_clock_mhz: self.max_clock_mhz,
            max_ram_mib: self.max_ram_mib,
            max_volt_v: self.max_volt_v,
            throttled: self.throttled_observed,
            rating: Rating::from_max_temp(self.max_temp_c),
        }
    }
}

/// Cooling verdict derived from the peak temperature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rating {
    #[serde(rename = "EXCELLENT")]
    Excellent,
    #[serde(rename = "GOOD")]
    Good,
    #[serde(rename = "THERMAL LIMIT REACHED")]
    ThermalLimitReached,
}

impl Rating {
    pub fn from_max_temp(max_temp_c: f64) -> Self {
        if max_temp_c < EXCELLENT_BELOW_C {
            Self::Excellent
        } else if max_temp_c < GOOD_BELOW_C {
            Self::Good
        } else {
            Self::ThermalLimitReached
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Excellent => "EXCELLENT",
            Self::Good => "GOOD",
            Self::ThermalLimitReached => "THERMAL LIMIT REACHED",
        }
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a completed benchmark.
///
/// `throttled` serializes as `"Yes"` / `"No"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub max_temp_c: f64,
    pub max_clock_mhz: u32,
    pub max_ram_mib: u64,
    pub max_volt_v: f64,
    #[serde(with = "yes_no")]
    pub throttled: bool,
    pub rating: Rating,
}

impl Summary {
    pub fn throttled_label(&self) -> &'static str {
        if self.throttled {
            "Yes"
        } else {
            "No"
        }
    }
}

/// The results report as shown after a benchmark.
impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "MAX TEMPERATURE:  {:.1} °C", self.max_temp_c)?;
        writeln!(f, "MAX CLOCK SPEED: {} MHz", self.max_clock_mhz)?;
        writeln!(f, "MAX RAM USED:    {} MB", self.max_ram_mib)?;
        writeln!(f, "MAX VOLTAGE:     {:.4} V", self.max_volt_v)?;
        writeln!(f, "THROTTLING:      {}", self.throttled_label())?;
        writeln!(f)?;
        write!(f, "COOLING PERFORMANCE: {}", self.rating)
    }
}

mod yes_no {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &bool, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(if *value { "Yes" } else { "No" })
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
        match String::deserialize(d)?.as_str() {
            "Yes" => Ok(true),
            "No" => Ok(false),
            other => Err(de::Error::custom(format!("expected Yes or No, got {other}"))),
        }
    }
}

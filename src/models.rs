use std::fmt;
use std::str::FromStr;

use crate::error::LinkError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WeightUnit {
    #[default]
    Kg,
    Lb,
}

impl fmt::Display for WeightUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WeightUnit::Kg => write!(f, "kg"),
            WeightUnit::Lb => write!(f, "lb"),
        }
    }
}

/// One normalized measurement, as shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WeightReading {
    pub weight: f64,
    pub unit: WeightUnit,
}

impl WeightReading {
    pub fn kg(weight: f64) -> Self {
        WeightReading {
            weight,
            unit: WeightUnit::Kg,
        }
    }
}

impl fmt::Display for WeightReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} {}", self.weight, self.unit)
    }
}

/// A reading stamped with its capture time (Unix epoch milliseconds)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightSample {
    pub weight: f64,
    pub timestamp: i64,
}

/// Which of the two device personalities feeds the reading stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceSelection {
    /// WH-C06 style broadcast scale
    #[default]
    PassiveScale,
    /// Tindeq Progressor force sensor
    ActiveSensor,
}

impl DeviceSelection {
    pub fn id(&self) -> &'static str {
        match self {
            DeviceSelection::PassiveScale => "whc06",
            DeviceSelection::ActiveSensor => "tindeq",
        }
    }
}

impl fmt::Display for DeviceSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for DeviceSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "whc06" | "scale" | "passive" => Ok(DeviceSelection::PassiveScale),
            "tindeq" | "progressor" | "active" => Ok(DeviceSelection::ActiveSensor),
            other => Err(format!("unknown device type '{}'", other)),
        }
    }
}

/// Lifecycle of the Progressor link
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    Scanning,
    Connecting,
    Monitoring,
    /// Resting state after a failure; `scan_and_connect` may be retried from here.
    Error(LinkError),
}

/// Snapshot of the flags a UI needs to render the Progressor controls
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LinkStatus {
    pub is_connected: bool,
    pub is_monitoring: bool,
    pub is_loading: bool,
    pub error: Option<LinkError>,
}

/// Averages over one acquisition session, logged when the service exits
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub device: DeviceSelection,
    pub samples: usize,
    pub peak: f64,
    pub mean: f64,
    pub duration_ms: i64,
}

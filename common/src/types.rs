use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StallState {
    Empty,
    Occupied,
    Arriving,
    Departing,
}

impl StallState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Empty => "EMPTY",
            Self::Occupied => "OCCUPIED",
            Self::Arriving => "ARRIVING",
            Self::Departing => "DEPARTING",
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Empty => 0,
            Self::Occupied => 1,
            Self::Arriving => 2,
            Self::Departing => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Movement {
    IntoStall,
    None,
    OutOfStall,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedColor {
    Red,
    Yellow,
    Green,
    Blue,
}

impl LedColor {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Red => "red",
            Self::Yellow => "yellow",
            Self::Green => "green",
            Self::Blue => "blue",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "red" => Some(Self::Red),
            "yellow" => Some(Self::Yellow),
            "green" => Some(Self::Green),
            "blue" => Some(Self::Blue),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BeaconMode {
    Paid,
    Free,
    Disabled,
}

impl BeaconMode {
    pub fn from_switch_value(value: &str) -> Self {
        match value.trim() {
            "0" => Self::Free,
            "2" => Self::Disabled,
            _ => Self::Paid,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Paid => "PAID",
            Self::Free => "FREE",
            Self::Disabled => "DISABLED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeaconSource {
    Occupancy,
    Hourglass,
    Switch,
}

impl BeaconSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Occupancy => "occupancy",
            Self::Hourglass => "hourglass",
            Self::Switch => "switch",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccupancyPayload {
    pub count: u64,
    pub state: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourglassStatus {
    #[serde(rename = "fillSeconds")]
    pub fill_seconds: i64,
    #[serde(rename = "remainingSeconds")]
    pub remaining_seconds: i64,
    #[serde(rename = "pendingAddSeconds")]
    pub pending_add_seconds: i64,
    pub running: bool,
    pub expired: bool,
    #[serde(rename = "percentRemaining")]
    pub percent_remaining: f64,
    pub led: LedColor,
    #[serde(rename = "timeLine")]
    pub time_line: String,
    #[serde(rename = "logLine")]
    pub log_line: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BeaconStatus {
    pub on: bool,
    pub mode: &'static str,
    pub requested: bool,
    #[serde(rename = "lastSource")]
    pub last_source: Option<&'static str>,
}

use serde::Deserialize;
use thiserror::Error;

use crate::{config::ClassifierConfig, hourglass::HourglassCommand, types::LedColor};

#[derive(Debug, Error)]
pub enum CommandParseError {
    #[error("malformed payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("`{cmd}` requires an integer `value`")]
    MissingValue { cmd: &'static str },
    #[error("unknown LED color `{0}`")]
    UnknownColor(String),
    #[error("LED state must be 0 or 1 (got {0})")]
    InvalidLedState(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HourglassVerb {
    Set,
    Update,
    Start,
    Reset,
}

/// Wire form of a timer command, as sent over PUT or the command topic.
#[derive(Debug, Clone, Deserialize)]
pub struct HourglassRequest {
    pub cmd: HourglassVerb,
    #[serde(default)]
    pub value: Option<i64>,
    #[serde(default)]
    pub auth: String,
    #[serde(default)]
    pub issued_at: Option<i64>,
}

impl HourglassRequest {
    pub fn parse(raw: &[u8]) -> Result<Self, CommandParseError> {
        Ok(serde_json::from_slice(raw)?)
    }

    pub fn command(&self) -> Result<HourglassCommand, CommandParseError> {
        match self.cmd {
            HourglassVerb::Set => self
                .value
                .map(HourglassCommand::Set)
                .ok_or(CommandParseError::MissingValue { cmd: "set" }),
            HourglassVerb::Update => self
                .value
                .map(HourglassCommand::Update)
                .ok_or(CommandParseError::MissingValue { cmd: "update" }),
            HourglassVerb::Start => Ok(HourglassCommand::Start {
                issued_at: self.issued_at,
            }),
            HourglassVerb::Reset => Ok(HourglassCommand::Reset),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OccupancyConfigUpdate {
    pub min_move_rate: f32,
    pub occupied_range: f32,
    pub max_range: f32,
    pub occupied_variance: f32,
    pub range_end: f32,
    #[serde(default)]
    pub low_res_interval_ms: Option<u64>,
    #[serde(default)]
    pub high_res_interval_ms: Option<u64>,
    #[serde(default)]
    pub auth: Option<String>,
}

impl OccupancyConfigUpdate {
    pub fn parse(raw: &[u8]) -> Result<Self, CommandParseError> {
        Ok(serde_json::from_slice(raw)?)
    }

    pub fn apply_to(&self, current: &ClassifierConfig) -> ClassifierConfig {
        ClassifierConfig {
            min_move_rate: self.min_move_rate,
            occupied_range: self.occupied_range,
            occupied_variance: self.occupied_variance,
            max_range: self.max_range,
            range_end: self.range_end,
            low_res_interval_ms: self
                .low_res_interval_ms
                .unwrap_or(current.low_res_interval_ms),
            high_res_interval_ms: self
                .high_res_interval_ms
                .unwrap_or(current.high_res_interval_ms),
            startup_delay_ms: current.startup_delay_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum LcdVerb {
    Lcd,
    Led,
}

#[derive(Debug, Deserialize)]
struct LcdRequest {
    cmd: LcdVerb,
    value: String,
    #[serde(default)]
    state: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LcdCommand {
    Text(String),
    Led { color: LedColor, on: bool },
}

impl LcdCommand {
    pub fn parse(raw: &[u8]) -> Result<Self, CommandParseError> {
        let request: LcdRequest = serde_json::from_slice(raw)?;
        match request.cmd {
            LcdVerb::Lcd => Ok(Self::Text(request.value)),
            LcdVerb::Led => {
                let color = LedColor::parse(request.value.trim())
                    .ok_or_else(|| CommandParseError::UnknownColor(request.value.clone()))?;
                let on = match request.state {
                    0 => false,
                    1 => true,
                    other => return Err(CommandParseError::InvalidLedState(other)),
                };
                Ok(Self::Led { color, on })
            }
        }
    }
}

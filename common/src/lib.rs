pub mod beacon;
pub mod command;
pub mod config;
pub mod display;
pub mod hourglass;
pub mod latch;
pub mod occupancy;
pub mod topics;
pub mod types;

pub use beacon::BeaconSwitch;
pub use command::{CommandParseError, HourglassRequest, LcdCommand, OccupancyConfigUpdate};
pub use config::{ClassifierConfig, ConfigError, HourglassConfig, LatchPolicy, RuntimeConfig};
pub use hourglass::{CommandOutcome, CommandRejection, Hourglass, HourglassCommand, TickOutcome};
pub use latch::NotificationLatch;
pub use occupancy::{OccupancyDetector, RangeSampler, TickReport};
pub use topics::*;
pub use types::{
    BeaconMode, BeaconSource, BeaconStatus, HourglassStatus, LedColor, OccupancyPayload,
    StallState,
};

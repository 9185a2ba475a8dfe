use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_PASSPHRASE: &str = "arm1234";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{field} must be a finite number")]
    NotFinite { field: &'static str },
    #[error("{field} must not be negative")]
    Negative { field: &'static str },
    #[error("occupied_range ({occupied_range}) must be below max_range ({max_range})")]
    OccupiedBeyondMax { occupied_range: f32, max_range: f32 },
    #[error("max_range ({max_range}) must be below range_end ({range_end})")]
    MaxBeyondEnd { max_range: f32, range_end: f32 },
    #[error("sampling intervals must be non-zero")]
    ZeroInterval,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    pub min_move_rate: f32,
    pub occupied_range: f32,
    pub occupied_variance: f32,
    pub max_range: f32,
    pub range_end: f32,
    #[serde(default = "default_low_res_interval_ms")]
    pub low_res_interval_ms: u64,
    #[serde(default = "default_high_res_interval_ms")]
    pub high_res_interval_ms: u64,
    #[serde(default = "default_startup_delay_ms")]
    pub startup_delay_ms: u64,
}

fn default_low_res_interval_ms() -> u64 {
    1_000
}

fn default_high_res_interval_ms() -> u64 {
    150
}

fn default_startup_delay_ms() -> u64 {
    4_000
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            min_move_rate: 0.03,
            occupied_range: 0.12,
            occupied_variance: 0.01,
            max_range: 0.37,
            range_end: 0.60,
            low_res_interval_ms: default_low_res_interval_ms(),
            high_res_interval_ms: default_high_res_interval_ms(),
            startup_delay_ms: default_startup_delay_ms(),
        }
    }
}

impl ClassifierConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("min_move_rate", self.min_move_rate),
            ("occupied_range", self.occupied_range),
            ("occupied_variance", self.occupied_variance),
            ("max_range", self.max_range),
            ("range_end", self.range_end),
        ];
        for (field, value) in fields {
            if !value.is_finite() {
                return Err(ConfigError::NotFinite { field });
            }
            if value < 0.0 {
                return Err(ConfigError::Negative { field });
            }
        }

        if self.occupied_range >= self.max_range {
            return Err(ConfigError::OccupiedBeyondMax {
                occupied_range: self.occupied_range,
                max_range: self.max_range,
            });
        }
        if self.max_range >= self.range_end {
            return Err(ConfigError::MaxBeyondEnd {
                max_range: self.max_range,
                range_end: self.range_end,
            });
        }
        if self.low_res_interval_ms == 0 || self.high_res_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        Ok(())
    }

    pub fn occupied_upper_bound(&self) -> f32 {
        self.occupied_range + self.occupied_variance
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LatchPolicy {
    Auto,
    // A capture workflow rearms the latch once it is done.
    External,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OccupancyPolicy {
    pub latch: LatchPolicy,
    pub occupancy_config_auth: bool,
    pub sensor_stale_timeout_ms: u64,
    #[serde(default = "default_range_trigger_m")]
    pub range_trigger_m: f32,
}

fn default_range_trigger_m() -> f32 {
    1.0
}

impl Default for OccupancyPolicy {
    fn default() -> Self {
        Self {
            latch: LatchPolicy::Auto,
            occupancy_config_auth: false,
            sensor_stale_timeout_ms: 5_000,
            range_trigger_m: default_range_trigger_m(),
        }
    }
}

pub fn valid_range_trigger(meters: f32) -> bool {
    meters.is_finite() && meters > 0.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HourglassConfig {
    pub passphrase: String,
    pub tick_ms: u64,
    pub max_skew_seconds: i64,
    pub allow_put_start: bool,
}

impl Default for HourglassConfig {
    fn default() -> Self {
        Self {
            passphrase: DEFAULT_PASSPHRASE.to_string(),
            tick_ms: 1_000,
            max_skew_seconds: 5,
            allow_put_start: true,
        }
    }
}

impl HourglassConfig {
    pub fn sanitize(&mut self) {
        if self.passphrase.is_empty() {
            self.passphrase = DEFAULT_PASSPHRASE.to_string();
        }
        self.tick_ms = self.tick_ms.clamp(10, 60_000);
        self.max_skew_seconds = self.max_skew_seconds.clamp(0, 300);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_user: String,
    pub mqtt_pass: String,
    pub client_id: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            mqtt_host: "127.0.0.1".to_string(),
            mqtt_port: 1883,
            mqtt_user: String::new(),
            mqtt_pass: String::new(),
            client_id: "parking-meter-node".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceInfo {
    pub manufacturer: String,
    #[serde(rename = "deviceType")]
    pub device_type: String,
    pub model: String,
    pub serial: String,
    #[serde(rename = "firmwareVersion")]
    pub firmware_version: String,
    #[serde(rename = "hardwareVersion")]
    pub hardware_version: String,
    #[serde(rename = "softwareVersion")]
    pub software_version: String,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            manufacturer: "ARM/NXP".to_string(),
            device_type: "parking-meter-v2".to_string(),
            model: "K64F".to_string(),
            serial: "0123456789".to_string(),
            firmware_version: "2.0.0".to_string(),
            hardware_version: "2.0.0".to_string(),
            software_version: "2.0.0".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LocationCoords {
    pub lat: String,
    pub lng: String,
}

impl Default for LocationCoords {
    fn default() -> Self {
        Self {
            lat: "30.243982".to_string(),
            lng: "-97.844694".to_string(),
        }
    }
}

impl LocationCoords {
    pub fn validate(&self) -> bool {
        let lat = self.lat.trim().parse::<f64>().ok();
        let lng = self.lng.trim().parse::<f64>().ok();
        matches!(
            (lat, lng),
            (Some(lat), Some(lng)) if (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lng)
        )
    }
}

pub const EPOCH_TIMESTAMP: &str = "1970-01-01,00:00:00,GMT";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationalState {
    Available,
    Occupied,
    Maintenance,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotAssignment {
    #[serde(rename = "spaceid")]
    pub space_id: u32,
    #[serde(rename = "regionid")]
    pub region_id: u32,
    #[serde(rename = "lotid")]
    pub lot_id: u32,
}

// Field names follow the fleet inventory format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationMetadata {
    pub id: u32,
    pub installation_date: String,
    pub installer_id: u32,
    pub installer_email: String,
    pub operational_state: OperationalState,
    pub operation_expiration: String,
    pub last_maintenance_date: String,
    pub last_maintenance_operation: String,
    #[serde(rename = "last_maintenance_operation_detail")]
    pub last_maintenance_detail: String,
    pub last_maintenance_status: String,
    pub metadata: LotAssignment,
}

impl Default for LocationMetadata {
    fn default() -> Self {
        Self {
            id: 0,
            installation_date: EPOCH_TIMESTAMP.to_string(),
            installer_id: 0,
            installer_email: "nobody@nowhere.com".to_string(),
            operational_state: OperationalState::Available,
            operation_expiration: EPOCH_TIMESTAMP.to_string(),
            last_maintenance_date: EPOCH_TIMESTAMP.to_string(),
            last_maintenance_operation: "boot".to_string(),
            last_maintenance_detail: String::new(),
            last_maintenance_status: "Success".to_string(),
            metadata: LotAssignment::default(),
        }
    }
}

impl LocationMetadata {
    pub fn validate(&self) -> bool {
        let email_ok = self
            .installer_email
            .split_once('@')
            .is_some_and(|(user, host)| !user.is_empty() && !host.is_empty());
        let dates = [
            &self.installation_date,
            &self.operation_expiration,
            &self.last_maintenance_date,
        ];
        email_ok && dates.iter().all(|date| !date.trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub occupancy: OccupancyPolicy,
    #[serde(default)]
    pub hourglass: HourglassConfig,
    pub network: NetworkConfig,
    #[serde(default)]
    pub device: DeviceInfo,
    #[serde(default)]
    pub location: LocationCoords,
    #[serde(default)]
    pub metadata: LocationMetadata,
    pub timezone: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            classifier: ClassifierConfig::default(),
            occupancy: OccupancyPolicy::default(),
            hourglass: HourglassConfig::default(),
            network: NetworkConfig::default(),
            device: DeviceInfo::default(),
            location: LocationCoords::default(),
            metadata: LocationMetadata::default(),
            timezone: "America/Chicago".to_string(),
        }
    }
}

impl RuntimeConfig {
    pub fn sanitize(&mut self) {
        if self.classifier.validate().is_err() {
            self.classifier = ClassifierConfig::default();
        }
        self.hourglass.sanitize();
        self.occupancy.sensor_stale_timeout_ms =
            self.occupancy.sensor_stale_timeout_ms.clamp(500, 600_000);
        if !valid_range_trigger(self.occupancy.range_trigger_m) {
            self.occupancy.range_trigger_m = default_range_trigger_m();
        }
        if !self.location.validate() {
            self.location = LocationCoords::default();
        }
        if !self.metadata.validate() {
            self.metadata = LocationMetadata::default();
        }
    }
}

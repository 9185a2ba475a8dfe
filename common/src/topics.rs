pub const TOPIC_SENSOR_RANGE: &str = "parking/sensor/range";
pub const TOPIC_SENSOR_STATUS: &str = "parking/sensor/status";

pub const TOPIC_METER_OCCUPANCY: &str = "parking/meter/occupancy";
pub const TOPIC_METER_HOURGLASS: &str = "parking/meter/hourglass";
pub const TOPIC_METER_BEACON: &str = "parking/meter/beacon";
pub const TOPIC_METER_STATUS: &str = "parking/meter/status";

pub const TOPIC_CMD_HOURGLASS: &str = "parking/cmnd/hourglass";
pub const TOPIC_CMD_CAPTURE_DONE: &str = "parking/cmnd/capture/done";
pub const TOPIC_CMD_BEACON: &str = "parking/cmnd/beacon";

use crate::types::{BeaconMode, LedColor, StallState};

pub const LCD_LINE_LENGTH: usize = 24;
pub const BAR_SLOTS: usize = 20;
pub const LOW_TIME_PERCENT: f64 = 25.0;

#[derive(Debug, Clone, PartialEq)]
pub struct MeterDisplay {
    pub time_line: String,
    pub log_line: String,
    pub led: LedColor,
    pub percent_remaining: f64,
}

pub fn percent_remaining(remaining: i64, fill: i64) -> f64 {
    if fill <= 0 {
        return 0.0;
    }
    (remaining.max(0) as f64 * 100.0) / fill as f64
}

pub fn remaining_bar(remaining: i64, fill: i64) -> String {
    let percent = percent_remaining(remaining, fill).min(100.0);
    let filled = ((percent / 100.0) * BAR_SLOTS as f64) as usize;
    let mut bar = "*".repeat(filled);
    bar.push_str(&" ".repeat(BAR_SLOTS - filled));
    bar
}

pub fn meter_display(remaining: i64, fill: i64) -> MeterDisplay {
    if remaining <= 0 {
        return MeterDisplay {
            time_line: "Time: EXPIRED".to_string(),
            log_line: "Remain: NONE".to_string(),
            led: LedColor::Red,
            percent_remaining: 0.0,
        };
    }

    let percent = percent_remaining(remaining, fill);
    MeterDisplay {
        time_line: format!("Time: {}", remaining_bar(remaining, fill)),
        log_line: fit_log_line(&format!("Rem: {remaining}sec / {fill}sec")),
        led: if percent <= LOW_TIME_PERCENT {
            LedColor::Yellow
        } else {
            LedColor::Green
        },
        percent_remaining: percent,
    }
}

pub fn stall_led(state: StallState) -> LedColor {
    match state {
        StallState::Empty => LedColor::Blue,
        StallState::Arriving | StallState::Departing => LedColor::Yellow,
        StallState::Occupied => LedColor::Red,
    }
}

pub fn beacon_log_line(mode: BeaconMode) -> &'static str {
    match mode {
        BeaconMode::Free => "FREE PARKING",
        BeaconMode::Disabled => "BEACON-OFF",
        BeaconMode::Paid => "PAID-FOR PARKING",
    }
}

pub fn title_line(firmware_version: &str) -> String {
    format!("Parking Meter FW_v{firmware_version}")
}

pub fn fit_log_line(text: &str) -> String {
    text.chars().take(LCD_LINE_LENGTH).collect()
}

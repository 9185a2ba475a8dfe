use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use tracing::{debug, info};

use parking_meter_common::{
    display::{fit_log_line, title_line, MeterDisplay},
    LedColor,
};

#[derive(Debug, Clone, PartialEq)]
pub enum PanelUpdate {
    Time(String),
    Log(String),
    Led { color: LedColor, on: bool },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PanelSnapshot {
    pub title: String,
    #[serde(rename = "timeLine")]
    pub time_line: String,
    #[serde(rename = "logLine")]
    pub log_line: String,
    pub led: Option<LedColor>,
    #[serde(rename = "ledOn")]
    pub led_on: bool,
}

/// LCD and status LED of the meter housing.
pub trait DisplaySink: Send + Sync + 'static {
    fn show(&self, update: PanelUpdate);
    fn snapshot(&self) -> PanelSnapshot;

    fn show_meter(&self, display: &MeterDisplay) {
        self.show(PanelUpdate::Time(display.time_line.clone()));
        self.show(PanelUpdate::Log(display.log_line.clone()));
        self.show(PanelUpdate::Led {
            color: display.led,
            on: true,
        });
    }
}

/// Host stand-in for the LCD: keeps the last frame and traces every change.
pub struct TracingPanel {
    frame: Mutex<PanelSnapshot>,
}

impl TracingPanel {
    pub fn new(firmware_version: &str) -> Self {
        let title = title_line(firmware_version);
        info!("lcd: {title}");
        Self {
            frame: Mutex::new(PanelSnapshot {
                title,
                ..PanelSnapshot::default()
            }),
        }
    }
}

impl DisplaySink for TracingPanel {
    fn show(&self, update: PanelUpdate) {
        let mut frame = self.frame.lock().unwrap_or_else(PoisonError::into_inner);
        match update {
            PanelUpdate::Time(line) => {
                debug!("lcd time: {line}");
                frame.time_line = line;
            }
            PanelUpdate::Log(line) => {
                let line = fit_log_line(&line);
                info!("lcd log: {line}");
                frame.log_line = line;
            }
            PanelUpdate::Led { color, on } => {
                if frame.led != Some(color) || frame.led_on != on {
                    debug!("led {} {}", color.as_str(), if on { "on" } else { "off" });
                }
                frame.led = Some(color);
                frame.led_on = on;
            }
        }
    }

    fn snapshot(&self) -> PanelSnapshot {
        self.frame
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

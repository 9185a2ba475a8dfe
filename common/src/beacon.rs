use crate::types::{BeaconMode, BeaconSource, BeaconStatus};

// Automatic requests only reach the output in Paid mode.
#[derive(Debug, Clone)]
pub struct BeaconSwitch {
    mode: BeaconMode,
    requested: bool,
    output: bool,
    last_source: Option<BeaconSource>,
}

impl Default for BeaconSwitch {
    fn default() -> Self {
        Self {
            mode: BeaconMode::Paid,
            requested: true,
            output: true,
            last_source: None,
        }
    }
}

impl BeaconSwitch {
    pub fn mode(&self) -> BeaconMode {
        self.mode
    }

    pub fn output(&self) -> bool {
        self.output
    }

    pub fn request(&mut self, source: BeaconSource, on: bool) -> Option<bool> {
        self.requested = on;
        self.last_source = Some(source);
        let next = self.mode == BeaconMode::Paid && on;
        self.apply(next)
    }

    pub fn set_mode(&mut self, mode: BeaconMode) -> Option<bool> {
        self.mode = mode;
        self.last_source = Some(BeaconSource::Switch);
        let next = match mode {
            BeaconMode::Paid => {
                self.requested = true;
                true
            }
            BeaconMode::Free | BeaconMode::Disabled => false,
        };
        self.apply(next)
    }

    fn apply(&mut self, next: bool) -> Option<bool> {
        if self.output == next {
            return None;
        }
        self.output = next;
        Some(next)
    }

    pub fn status(&self) -> BeaconStatus {
        BeaconStatus {
            on: self.output,
            mode: self.mode.as_str(),
            requested: self.requested,
            last_source: self.last_source.map(BeaconSource::as_str),
        }
    }
}

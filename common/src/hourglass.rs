use thiserror::Error;

use crate::{
    config::HourglassConfig,
    display::meter_display,
    types::HourglassStatus,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HourglassCommand {
    Set(i64),
    Update(i64),
    Start { issued_at: Option<i64> },
    Reset,
}

impl HourglassCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Set(_) => "set",
            Self::Update(_) => "update",
            Self::Start { .. } => "start",
            Self::Reset => "reset",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Filled { fill_seconds: i64 },
    Extended { added: i64, fill_seconds: i64 },
    Started { remaining_seconds: i64, skew_seconds: i64 },
    AlreadyRunning,
    Reset,
}

impl CommandOutcome {
    pub fn changed_state(&self) -> bool {
        !matches!(self, Self::AlreadyRunning)
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Filled { fill_seconds } => format!("countdown set to {fill_seconds}s"),
            Self::Extended {
                added,
                fill_seconds,
            } => format!("added {added}s, total {fill_seconds}s"),
            Self::Started {
                remaining_seconds,
                skew_seconds,
            } => format!("countdown started at {remaining_seconds}s (skew {skew_seconds}s)"),
            Self::AlreadyRunning => "countdown already running".to_string(),
            Self::Reset => "countdown reset".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandRejection {
    #[error("authentication failed")]
    Unauthenticated,
    #[error("value must be positive (got {0})")]
    InvalidValue(i64),
    #[error("countdown is active ({remaining}s of {fill}s); wait for expiry")]
    Running { remaining: i64, fill: i64 },
    #[error("countdown has expired; a new set is required")]
    Expired,
    #[error("no countdown value has been set")]
    NotSet,
    #[error("start over PUT is disabled")]
    PutStartDisabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Idle,
    Counting { remaining_seconds: i64 },
    Expired,
}

#[derive(Debug, Clone)]
pub struct Hourglass {
    passphrase: String,
    max_skew_seconds: i64,
    fill_seconds: i64,
    remaining_seconds: i64,
    pending_add_seconds: i64,
    running: bool,
    expired: bool,
}

impl Hourglass {
    pub fn new(config: &HourglassConfig) -> Self {
        Self {
            passphrase: config.passphrase.clone(),
            max_skew_seconds: config.max_skew_seconds.max(0),
            fill_seconds: 0,
            remaining_seconds: 0,
            pending_add_seconds: 0,
            running: false,
            expired: false,
        }
    }

    pub fn fill_seconds(&self) -> i64 {
        self.fill_seconds
    }

    pub fn remaining_seconds(&self) -> i64 {
        self.remaining_seconds
    }

    pub fn pending_add_seconds(&self) -> i64 {
        self.pending_add_seconds
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_expired(&self) -> bool {
        self.expired
    }

    pub fn authenticate(&self, auth: &str) -> Result<(), CommandRejection> {
        if auth == self.passphrase {
            Ok(())
        } else {
            Err(CommandRejection::Unauthenticated)
        }
    }

    pub fn execute(
        &mut self,
        auth: &str,
        command: HourglassCommand,
        now_epoch: i64,
    ) -> Result<CommandOutcome, CommandRejection> {
        self.authenticate(auth)?;
        match command {
            HourglassCommand::Set(value) => self.set(value),
            HourglassCommand::Update(delta) => self.update(delta),
            HourglassCommand::Start { issued_at } => self.start(issued_at, now_epoch),
            HourglassCommand::Reset => {
                self.reset();
                Ok(CommandOutcome::Reset)
            }
        }
    }

    fn set(&mut self, value: i64) -> Result<CommandOutcome, CommandRejection> {
        if value <= 0 {
            return Err(CommandRejection::InvalidValue(value));
        }
        if self.running {
            return Err(CommandRejection::Running {
                remaining: self.remaining_seconds,
                fill: self.fill_seconds,
            });
        }

        self.reset();
        self.fill_seconds = value;
        self.remaining_seconds = value;
        Ok(CommandOutcome::Filled {
            fill_seconds: value,
        })
    }

    fn update(&mut self, delta: i64) -> Result<CommandOutcome, CommandRejection> {
        if delta <= 0 {
            return Err(CommandRejection::InvalidValue(delta));
        }
        if self.expired {
            return Err(CommandRejection::Expired);
        }
        if self.fill_seconds <= 0 {
            return Err(CommandRejection::NotSet);
        }

        self.fill_seconds = self.fill_seconds.saturating_add(delta);
        if self.running {
            self.pending_add_seconds = self.pending_add_seconds.saturating_add(delta);
        } else {
            self.remaining_seconds = self.remaining_seconds.saturating_add(delta);
        }
        Ok(CommandOutcome::Extended {
            added: delta,
            fill_seconds: self.fill_seconds,
        })
    }

    fn start(
        &mut self,
        issued_at: Option<i64>,
        now_epoch: i64,
    ) -> Result<CommandOutcome, CommandRejection> {
        if self.fill_seconds <= 0 {
            return Err(CommandRejection::NotSet);
        }
        if self.running {
            return Ok(CommandOutcome::AlreadyRunning);
        }

        let skew = self.skew_seconds(issued_at, now_epoch);
        self.remaining_seconds = (self.fill_seconds - skew).max(0);
        self.pending_add_seconds = 0;
        self.expired = false;
        self.running = true;
        Ok(CommandOutcome::Started {
            remaining_seconds: self.remaining_seconds,
            skew_seconds: skew,
        })
    }

    pub fn skew_seconds(&self, issued_at: Option<i64>, now_epoch: i64) -> i64 {
        issued_at
            .map(|issued| now_epoch.saturating_sub(issued).clamp(0, self.max_skew_seconds))
            .unwrap_or(0)
    }

    pub fn reset(&mut self) {
        self.running = false;
        self.remaining_seconds = 0;
        self.pending_add_seconds = 0;
        self.expired = false;
    }

    pub fn tick(&mut self) -> TickOutcome {
        if !self.running {
            return TickOutcome::Idle;
        }

        self.remaining_seconds -= 1;
        if self.pending_add_seconds > 0 {
            self.remaining_seconds = self
                .remaining_seconds
                .saturating_add(self.pending_add_seconds);
            self.pending_add_seconds = 0;
        }

        if self.remaining_seconds < 0 {
            self.remaining_seconds = 0;
            self.running = false;
            self.expired = true;
            return TickOutcome::Expired;
        }

        TickOutcome::Counting {
            remaining_seconds: self.remaining_seconds,
        }
    }

    pub fn status(&self) -> HourglassStatus {
        let display = meter_display(self.remaining_seconds, self.fill_seconds);
        HourglassStatus {
            fill_seconds: self.fill_seconds,
            remaining_seconds: self.remaining_seconds,
            pending_add_seconds: self.pending_add_seconds,
            running: self.running,
            expired: self.expired,
            percent_remaining: display.percent_remaining,
            led: display.led,
            time_line: display.time_line,
            log_line: display.log_line,
        }
    }
}

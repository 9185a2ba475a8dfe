use std::{sync::Arc, time::Duration};

use chrono::Utc;
use tokio::{
    sync::{mpsc, oneshot, watch},
    time::MissedTickBehavior,
};
use tracing::{info, warn};

use parking_meter_common::{
    display::meter_display, BeaconSource, CommandOutcome, CommandRejection, Hourglass,
    HourglassCommand, HourglassConfig, HourglassStatus, TickOutcome,
};

use crate::{
    beacon::BeaconHandle,
    notifier::{Notification, Notifier},
    panel::DisplaySink,
};

pub type CommandResult = Result<CommandOutcome, CommandRejection>;

struct CommandEnvelope {
    origin: CommandOrigin,
    auth: String,
    command: HourglassCommand,
    reply: oneshot::Sender<CommandResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOrigin {
    Put,
    Post,
    Mqtt,
}

/// Client side of the hourglass task. The task owns the countdown; callers
/// only see snapshots.
#[derive(Clone)]
pub struct HourglassHandle {
    tx: mpsc::Sender<CommandEnvelope>,
    status: watch::Receiver<HourglassStatus>,
}

impl HourglassHandle {
    pub async fn submit(
        &self,
        origin: CommandOrigin,
        auth: String,
        command: HourglassCommand,
    ) -> anyhow::Result<CommandResult> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(CommandEnvelope {
                origin,
                auth,
                command,
                reply,
            })
            .await
            .map_err(|_| anyhow::anyhow!("hourglass task is not running"))?;
        Ok(response.await?)
    }

    pub fn status(&self) -> HourglassStatus {
        self.status.borrow().clone()
    }
}

struct HourglassTask {
    hourglass: Hourglass,
    allow_put_start: bool,
    beacon: BeaconHandle,
    notifier: Notifier,
    panel: Arc<dyn DisplaySink>,
    status: watch::Sender<HourglassStatus>,
}

pub fn spawn_hourglass(
    config: &HourglassConfig,
    beacon: BeaconHandle,
    notifier: Notifier,
    panel: Arc<dyn DisplaySink>,
) -> HourglassHandle {
    let hourglass = Hourglass::new(config);
    let (tx, rx) = mpsc::channel(16);
    let (status_tx, status) = watch::channel(hourglass.status());
    let tick = Duration::from_millis(config.tick_ms);

    let task = HourglassTask {
        hourglass,
        allow_put_start: config.allow_put_start,
        beacon,
        notifier,
        panel,
        status: status_tx,
    };
    tokio::spawn(task.run(rx, tick));

    HourglassHandle { tx, status }
}

impl HourglassTask {
    async fn run(mut self, mut rx: mpsc::Receiver<CommandEnvelope>, tick: Duration) {
        let mut ticker = tokio::time::interval(tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                envelope = rx.recv() => {
                    let Some(envelope) = envelope else {
                        break;
                    };
                    let result = self
                        .apply(envelope.origin, &envelope.auth, envelope.command)
                        .await;
                    if matches!(result, Ok(CommandOutcome::Started { .. })) {
                        // First decrement lands one full period after the start.
                        ticker.reset();
                    }
                    let _ = envelope.reply.send(result);
                }
                _ = ticker.tick(), if self.hourglass.is_running() => {
                    self.on_tick().await;
                }
            }
        }
    }

    async fn apply(
        &mut self,
        origin: CommandOrigin,
        auth: &str,
        command: HourglassCommand,
    ) -> CommandResult {
        let was_running = self.hourglass.is_running();
        let result = self.execute(origin, auth, command);

        match &result {
            Ok(CommandOutcome::Started { .. }) => {
                info!("hourglass {}", result_detail(&result));
                self.beacon.request(BeaconSource::Hourglass, false).await;
                self.refresh_panel();
            }
            Ok(CommandOutcome::AlreadyRunning) => {
                info!("hourglass start ignored: countdown already running");
            }
            Ok(CommandOutcome::Reset) if was_running => {
                info!("hourglass reset while running");
                self.beacon.request(BeaconSource::Hourglass, true).await;
                self.refresh_panel();
            }
            Ok(outcome) => {
                info!("hourglass {}", outcome.describe());
                self.refresh_panel();
            }
            Err(CommandRejection::Unauthenticated) => {
                warn!("hourglass {} rejected: authentication failed", command.name());
            }
            Err(rejection) => {
                info!("hourglass {} ignored: {rejection}", command.name());
            }
        }

        self.publish_status();
        result
    }

    fn execute(
        &mut self,
        origin: CommandOrigin,
        auth: &str,
        command: HourglassCommand,
    ) -> CommandResult {
        self.hourglass.authenticate(auth)?;
        if origin == CommandOrigin::Put
            && matches!(command, HourglassCommand::Start { .. })
            && !self.allow_put_start
        {
            return Err(CommandRejection::PutStartDisabled);
        }
        self.hourglass.execute(auth, command, Utc::now().timestamp())
    }

    async fn on_tick(&mut self) {
        match self.hourglass.tick() {
            TickOutcome::Counting { .. } => self.refresh_panel(),
            TickOutcome::Expired => {
                info!(
                    "hourglass expired after {}s",
                    self.hourglass.fill_seconds()
                );
                self.refresh_panel();
                self.notifier.send(Notification::HourglassExpired);
                self.beacon.request(BeaconSource::Hourglass, true).await;
            }
            TickOutcome::Idle => {}
        }
        self.publish_status();
    }

    fn refresh_panel(&self) {
        self.panel.show_meter(&meter_display(
            self.hourglass.remaining_seconds(),
            self.hourglass.fill_seconds(),
        ));
    }

    fn publish_status(&self) {
        self.status.send_replace(self.hourglass.status());
    }
}

pub fn result_detail(result: &CommandResult) -> String {
    match result {
        Ok(outcome) => outcome.describe(),
        Err(rejection) => rejection.to_string(),
    }
}

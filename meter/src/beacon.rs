use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{info, warn};

use parking_meter_common::{
    display::beacon_log_line, BeaconMode, BeaconSource, BeaconStatus, BeaconSwitch,
};

use crate::{
    notifier::{Notification, Notifier},
    panel::{DisplaySink, PanelUpdate},
};

/// Digital output driving the BLE advertiser.
pub trait BeaconOutput: Send + 'static {
    fn write(&mut self, on: bool);
}

pub struct LoggedBeacon;

impl BeaconOutput for LoggedBeacon {
    fn write(&mut self, on: bool) {
        info!("beacon output {}", if on { "ON" } else { "OFF" });
    }
}

enum BeaconMessage {
    Request {
        source: BeaconSource,
        on: bool,
    },
    Mode {
        mode: BeaconMode,
        ack: oneshot::Sender<BeaconStatus>,
    },
}

#[derive(Clone)]
pub struct BeaconHandle {
    tx: mpsc::Sender<BeaconMessage>,
    status: watch::Receiver<BeaconStatus>,
}

impl BeaconHandle {
    pub async fn request(&self, source: BeaconSource, on: bool) {
        if self
            .tx
            .send(BeaconMessage::Request { source, on })
            .await
            .is_err()
        {
            warn!("beacon writer gone; dropped {} request", source.as_str());
        }
    }

    /// Applies a switch mode and waits for the writer to settle the output.
    pub async fn set_mode(&self, mode: BeaconMode) -> anyhow::Result<BeaconStatus> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(BeaconMessage::Mode { mode, ack })
            .await
            .map_err(|_| anyhow::anyhow!("beacon writer gone"))?;
        Ok(done.await?)
    }

    pub fn status(&self) -> BeaconStatus {
        self.status.borrow().clone()
    }

    #[cfg(test)]
    pub fn subscribe(&self) -> watch::Receiver<BeaconStatus> {
        self.status.clone()
    }
}

pub fn spawn_beacon_writer<O>(
    mut output: O,
    notifier: Notifier,
    panel: Arc<dyn DisplaySink>,
) -> BeaconHandle
where
    O: BeaconOutput,
{
    let mut switch = BeaconSwitch::default();
    let (tx, mut rx) = mpsc::channel(16);
    let (status_tx, status) = watch::channel(switch.status());

    output.write(switch.output());

    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let (changed, ack) = match message {
                BeaconMessage::Request { source, on } => {
                    let changed = switch.request(source, on);
                    if changed.is_none() && switch.mode() != BeaconMode::Paid {
                        info!(
                            "beacon {} request from {} held by {} mode",
                            if on { "on" } else { "off" },
                            source.as_str(),
                            switch.mode().as_str()
                        );
                    }
                    (changed, None)
                }
                BeaconMessage::Mode { mode, ack } => {
                    panel.show(PanelUpdate::Log(beacon_log_line(mode).to_string()));
                    (switch.set_mode(mode), Some(ack))
                }
            };

            if let Some(on) = changed {
                output.write(on);
                notifier.send(Notification::Beacon(on));
            }

            let snapshot = switch.status();
            status_tx.send_replace(snapshot.clone());
            if let Some(ack) = ack {
                let _ = ack.send(snapshot);
            }
        }
    });

    BeaconHandle { tx, status }
}

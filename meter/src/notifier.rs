use rumqttc::{AsyncClient, QoS};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use parking_meter_common::{
    OccupancyPayload, TOPIC_METER_BEACON, TOPIC_METER_HOURGLASS, TOPIC_METER_OCCUPANCY,
};

const NOTIFY_QUEUE_DEPTH: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Occupancy(OccupancyPayload),
    HourglassExpired,
    Beacon(bool),
}

impl Notification {
    pub fn topic(&self) -> &'static str {
        match self {
            Self::Occupancy(_) => TOPIC_METER_OCCUPANCY,
            Self::HourglassExpired => TOPIC_METER_HOURGLASS,
            Self::Beacon(_) => TOPIC_METER_BEACON,
        }
    }

    pub fn payload(&self) -> anyhow::Result<Vec<u8>> {
        Ok(match self {
            Self::Occupancy(payload) => serde_json::to_vec(payload)?,
            Self::HourglassExpired => b"0".to_vec(),
            Self::Beacon(on) => switch_digit(*on).as_bytes().to_vec(),
        })
    }

    fn retain(&self) -> bool {
        !matches!(self, Self::HourglassExpired)
    }
}

pub fn switch_digit(on: bool) -> &'static str {
    if on {
        "1"
    } else {
        "0"
    }
}

/// Sending half of the outbound notification queue.
///
/// Never waits on the publisher: a full queue drops the notification.
#[derive(Clone)]
pub struct Notifier {
    tx: mpsc::Sender<Notification>,
}

impl Notifier {
    pub fn channel() -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(NOTIFY_QUEUE_DEPTH);
        (Self { tx }, rx)
    }

    pub fn send(&self, notification: Notification) {
        match self.tx.try_send(notification) {
            Ok(()) => {}
            Err(TrySendError::Full(dropped)) => {
                warn!("notification queue full, dropped {dropped:?}");
            }
            Err(TrySendError::Closed(dropped)) => {
                warn!("notification dropped, publisher gone: {dropped:?}");
            }
        }
    }
}

pub fn spawn_notify_publisher(mqtt: AsyncClient, mut rx: mpsc::Receiver<Notification>) {
    tokio::spawn(async move {
        while let Some(notification) = rx.recv().await {
            let body = match notification.payload() {
                Ok(body) => body,
                Err(err) => {
                    warn!("notification serialization failed: {err:#}");
                    continue;
                }
            };

            debug!("publishing {notification:?} to {}", notification.topic());
            if let Err(err) = mqtt
                .publish(
                    notification.topic(),
                    QoS::AtLeastOnce,
                    notification.retain(),
                    body,
                )
                .await
            {
                warn!("notification publish failed: {err}");
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn occupancy_payload_matches_resource_format() {
        let notification = Notification::Occupancy(OccupancyPayload { count: 4, state: 1 });
        assert_eq!(notification.topic(), TOPIC_METER_OCCUPANCY);
        assert_eq!(
            notification.payload().unwrap(),
            br#"{"count":4,"state":1}"#.to_vec()
        );
    }

    #[test]
    fn beacon_payload_is_switch_digit() {
        assert_eq!(Notification::Beacon(true).payload().unwrap(), b"1".to_vec());
        assert_eq!(Notification::Beacon(false).payload().unwrap(), b"0".to_vec());
        assert!(Notification::Beacon(false).retain());
        assert!(!Notification::HourglassExpired.retain());
    }

    #[test]
    fn send_is_a_no_op_once_the_publisher_is_gone() {
        let (notifier, rx) = Notifier::channel();
        drop(rx);
        notifier.send(Notification::HourglassExpired);
    }

    #[test]
    fn full_queue_drops_instead_of_waiting() {
        let (notifier, mut rx) = Notifier::channel();

        for count in 0..NOTIFY_QUEUE_DEPTH as u64 + 8 {
            notifier.send(Notification::Occupancy(OccupancyPayload { count, state: 0 }));
        }

        let mut queued = Vec::new();
        while let Ok(notification) = rx.try_recv() {
            queued.push(notification);
        }
        assert_eq!(queued.len(), NOTIFY_QUEUE_DEPTH);
        assert_eq!(
            queued.last(),
            Some(&Notification::Occupancy(OccupancyPayload {
                count: NOTIFY_QUEUE_DEPTH as u64 - 1,
                state: 0
            }))
        );
    }
}

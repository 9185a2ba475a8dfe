use std::time::Duration;

use anyhow::Context;
use rumqttc::{AsyncClient, LastWill, MqttOptions, QoS};
use tracing::{debug, info, warn};

use parking_meter_common::{TOPIC_SENSOR_RANGE, TOPIC_SENSOR_STATUS};

/// Distance with the stall empty, in meters.
const EMPTY_RANGE_M: f32 = 0.55;
/// Distance with a car parked over the sensor.
const PARKED_RANGE_M: f32 = 0.10;
const APPROACH_STEPS: u64 = 6;
const DWELL_STEPS: u64 = 40;
const CYCLE_STEPS: u64 = 2 * (DWELL_STEPS + APPROACH_STEPS);

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mqtt_host = std::env::var("MQTT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let mqtt_port = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(1883);
    let period_ms = std::env::var("SENSOR_PERIOD_MS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(150);

    let mut mqtt_options = MqttOptions::new("parking-meter-sensor", mqtt_host, mqtt_port);
    mqtt_options.set_last_will(LastWill::new(
        TOPIC_SENSOR_STATUS,
        "offline",
        QoS::AtLeastOnce,
        true,
    ));

    if let Ok(user) = std::env::var("MQTT_USER") {
        let pass = std::env::var("MQTT_PASS").unwrap_or_default();
        mqtt_options.set_credentials(user, pass);
    }

    let (mqtt, mut eventloop) = AsyncClient::new(mqtt_options, 32);

    mqtt.publish(TOPIC_SENSOR_STATUS, QoS::AtLeastOnce, true, "online")
        .await
        .context("failed to publish sensor online status")?;

    tokio::spawn(async move {
        loop {
            if let Err(err) = eventloop.poll().await {
                warn!("sensor mqtt poll error: {err}");
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    });

    info!("range finder publishing every {period_ms}ms");

    let mut tick: u64 = 0;
    let mut interval = tokio::time::interval(Duration::from_millis(period_ms.max(10)));

    loop {
        interval.tick().await;

        // Hardware integration point: replace with the ultrasonic driver read.
        let meters = simulated_range(tick);
        tick = tick.saturating_add(1);

        debug!("range {meters:.3}m");
        mqtt.publish(TOPIC_SENSOR_RANGE, QoS::AtMostOnce, false, format!("{meters:.3}"))
            .await
            .context("failed to publish range reading")?;
    }
}

/// Repeating park/leave cycle: empty dwell, approach, parked dwell, departure.
fn simulated_range(tick: u64) -> f32 {
    let phase = tick % CYCLE_STEPS;
    let span = EMPTY_RANGE_M - PARKED_RANGE_M;
    let step = span / APPROACH_STEPS as f32;

    if phase < DWELL_STEPS {
        EMPTY_RANGE_M
    } else if phase < DWELL_STEPS + APPROACH_STEPS {
        EMPTY_RANGE_M - step * (phase - DWELL_STEPS + 1) as f32
    } else if phase < 2 * DWELL_STEPS + APPROACH_STEPS {
        PARKED_RANGE_M
    } else {
        PARKED_RANGE_M + step * (phase - 2 * DWELL_STEPS - APPROACH_STEPS + 1) as f32
    }
}

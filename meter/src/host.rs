use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{Offset, Utc};
use chrono_tz::Tz;
use rumqttc::{AsyncClient, Event, Incoming, LastWill, MqttOptions, QoS};
use serde::Serialize;
use tokio::{net::TcpListener, sync::Mutex};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use parking_meter_common::{
    config::{valid_range_trigger, LocationCoords, LocationMetadata},
    BeaconMode, HourglassCommand, HourglassRequest, LcdCommand,
    OccupancyConfigUpdate, RuntimeConfig, TOPIC_CMD_BEACON, TOPIC_CMD_CAPTURE_DONE,
    TOPIC_CMD_HOURGLASS, TOPIC_METER_STATUS, TOPIC_SENSOR_RANGE,
};

use crate::{
    beacon::{spawn_beacon_writer, BeaconHandle, LoggedBeacon},
    hourglass::{result_detail, spawn_hourglass, CommandOrigin, HourglassHandle},
    notifier::{spawn_notify_publisher, switch_digit, Notifier},
    occupancy::OccupancyService,
    panel::{DisplaySink, PanelUpdate, TracingPanel},
    store::AppStore,
};

const MAX_MQTT_PAYLOAD_BYTES: usize = 512;

#[derive(Clone)]
pub struct AppState {
    occupancy: OccupancyService,
    hourglass: HourglassHandle,
    beacon: BeaconHandle,
    panel: Arc<dyn DisplaySink>,
    runtime: Arc<Mutex<RuntimeConfig>>,
    store: AppStore,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
struct CommandReply {
    applied: bool,
    detail: String,
}

#[derive(Debug, Serialize)]
struct RearmReply {
    rearmed: bool,
}

#[derive(Debug, Serialize)]
struct LocationMetadataView {
    #[serde(flatten)]
    metadata: LocationMetadata,
    location: LocationCoords,
    hardware_version: String,
    firmware_version: String,
    current_time: String,
}

#[derive(Debug, Serialize)]
struct RangeTriggerReply {
    #[serde(rename = "triggerRange")]
    trigger_range: f32,
}

#[derive(Debug, Serialize)]
struct TimeStatus {
    #[serde(rename = "timeSynced")]
    time_synced: bool,
    timezone: String,
    #[serde(rename = "nowEpoch")]
    now_epoch: i64,
    #[serde(rename = "localTime")]
    local_time: Option<String>,
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = AppStore::new();
    let mut runtime = store.load_runtime_config().await.unwrap_or_else(|err| {
        warn!("failed to load runtime config from store: {err:#}");
        RuntimeConfig::default()
    });
    runtime.sanitize();

    let mqtt_host = std::env::var("MQTT_HOST").unwrap_or(runtime.network.mqtt_host.clone());
    let mqtt_port = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(runtime.network.mqtt_port);

    let mut mqtt_options =
        MqttOptions::new(runtime.network.client_id.clone(), mqtt_host, mqtt_port);
    mqtt_options.set_keep_alive(Duration::from_secs(30));
    mqtt_options.set_last_will(LastWill::new(
        TOPIC_METER_STATUS,
        "offline",
        QoS::AtLeastOnce,
        true,
    ));
    let mqtt_user = std::env::var("MQTT_USER").unwrap_or(runtime.network.mqtt_user.clone());
    let mqtt_pass = std::env::var("MQTT_PASS").unwrap_or(runtime.network.mqtt_pass.clone());
    if !mqtt_user.is_empty() {
        mqtt_options.set_credentials(mqtt_user, mqtt_pass);
    }

    let (mqtt, eventloop) = AsyncClient::new(mqtt_options, 64);

    let (notifier, notifications) = Notifier::channel();
    spawn_notify_publisher(mqtt.clone(), notifications);
    let app_state = build_app_state(runtime, store, notifier);

    subscribe_topics(&mqtt).await?;
    mqtt.publish(TOPIC_METER_STATUS, QoS::AtLeastOnce, true, "online")
        .await
        .context("failed to publish meter online status")?;
    spawn_mqtt_loop(app_state.clone(), eventloop);

    let app = build_router(app_state);

    let port = std::env::var("METER_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind meter server at {addr}"))?;

    info!("parking meter listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn build_app_state(runtime: RuntimeConfig, store: AppStore, notifier: Notifier) -> AppState {
    let panel: Arc<dyn DisplaySink> = Arc::new(TracingPanel::new(&runtime.device.firmware_version));
    let beacon = spawn_beacon_writer(LoggedBeacon, notifier.clone(), panel.clone());
    let hourglass = spawn_hourglass(
        &runtime.hourglass,
        beacon.clone(),
        notifier.clone(),
        panel.clone(),
    );
    let occupancy = OccupancyService::new(
        runtime.classifier,
        &runtime.occupancy,
        beacon.clone(),
        notifier,
        panel.clone(),
    );

    AppState {
        occupancy,
        hourglass,
        beacon,
        panel,
        runtime: Arc::new(Mutex::new(runtime)),
        store,
    }
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/occupancy", get(handle_get_occupancy))
        .route(
            "/api/occupancy/config",
            get(handle_get_occupancy_config).put(handle_put_occupancy_config),
        )
        .route("/api/occupancy/rearm", post(handle_rearm))
        .route(
            "/api/hourglass",
            get(handle_get_hourglass)
                .put(handle_put_hourglass)
                .post(handle_post_hourglass),
        )
        .route("/api/hourglass/status", get(handle_get_hourglass_status))
        .route("/api/beacon", get(handle_get_beacon).put(handle_put_beacon))
        .route("/api/lcd", get(handle_get_lcd).put(handle_put_lcd))
        .route(
            "/api/location",
            get(handle_get_location).put(handle_put_location),
        )
        .route(
            "/api/location/metadata",
            get(handle_get_location_metadata).put(handle_put_location_metadata),
        )
        .route("/api/range", get(handle_get_range).put(handle_put_range))
        .route("/api/device", get(handle_get_device))
        .route("/api/time", get(handle_get_time))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

async fn subscribe_topics(mqtt: &AsyncClient) -> anyhow::Result<()> {
    let topics = [
        TOPIC_SENSOR_RANGE,
        TOPIC_CMD_HOURGLASS,
        TOPIC_CMD_CAPTURE_DONE,
        TOPIC_CMD_BEACON,
    ];

    for topic in topics {
        mqtt.subscribe(topic, QoS::AtMostOnce).await?;
    }
    Ok(())
}

fn spawn_mqtt_loop(app_state: AppState, mut eventloop: rumqttc::EventLoop) {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(message))) => {
                    if let Err(err) =
                        handle_mqtt_message(&app_state, message.topic, message.payload.to_vec())
                            .await
                    {
                        warn!("mqtt message handling error: {err:#}");
                    }
                }
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt connected");
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("mqtt poll error: {err}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}

async fn handle_mqtt_message(
    app_state: &AppState,
    topic: String,
    payload: Vec<u8>,
) -> anyhow::Result<()> {
    if payload.len() > MAX_MQTT_PAYLOAD_BYTES {
        warn!(
            "dropping oversized MQTT payload on topic {} ({} bytes)",
            topic,
            payload.len()
        );
        return Ok(());
    }

    match topic.as_str() {
        TOPIC_SENSOR_RANGE => {
            let message = std::str::from_utf8(&payload).context("non utf8 range reading")?;
            match message.trim().parse::<f32>() {
                Ok(meters) => app_state.occupancy.record_range(meters),
                Err(_) => debug!("ignoring unparseable range reading {message:?}"),
            }
        }
        TOPIC_CMD_HOURGLASS => {
            let request = HourglassRequest::parse(&payload).context("bad hourglass command")?;
            let command = request.command()?;
            let result = app_state
                .hourglass
                .submit(CommandOrigin::Mqtt, request.auth, command)
                .await?;
            debug!("mqtt hourglass {}: {}", command.name(), result_detail(&result));
        }
        TOPIC_CMD_CAPTURE_DONE => {
            app_state.occupancy.rearm();
        }
        TOPIC_CMD_BEACON => {
            let message = String::from_utf8(payload).context("non utf8 beacon command")?;
            app_state
                .beacon
                .set_mode(BeaconMode::from_switch_value(&message))
                .await?;
        }
        _ => {}
    }

    Ok(())
}

async fn handle_get_occupancy(State(state): State<AppState>) -> impl IntoResponse {
    if state.occupancy.ensure_started() {
        info!("occupancy sampling task started");
    }
    Json(state.occupancy.payload().await)
}

async fn handle_get_occupancy_config(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.occupancy.config().await)
}

async fn handle_put_occupancy_config(
    State(state): State<AppState>,
    body: Bytes,
) -> impl IntoResponse {
    let update = match OccupancyConfigUpdate::parse(&body) {
        Ok(update) => update,
        Err(err) => return error_response(StatusCode::BAD_REQUEST, &err.to_string()),
    };

    let (auth_required, passphrase) = {
        let runtime = state.runtime.lock().await;
        (
            runtime.occupancy.occupancy_config_auth,
            runtime.hourglass.passphrase.clone(),
        )
    };
    if auth_required && update.auth.as_deref() != Some(passphrase.as_str()) {
        warn!("occupancy config update rejected: authentication failed");
        return error_response(StatusCode::UNAUTHORIZED, "authentication failed");
    }

    let config = update.apply_to(&state.occupancy.config().await);
    if let Err(err) = state.occupancy.set_config(config).await {
        return error_response(StatusCode::BAD_REQUEST, &err.to_string());
    }
    info!("occupancy thresholds updated: {config:?}");

    let runtime = {
        let mut runtime = state.runtime.lock().await;
        runtime.classifier = config;
        runtime.clone()
    };
    if let Err(err) = state.store.save_runtime_config(&runtime).await {
        warn!("failed to persist occupancy config: {err:#}");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to persist occupancy settings",
        );
    }

    Json(config).into_response()
}

async fn handle_rearm(State(state): State<AppState>) -> impl IntoResponse {
    Json(RearmReply {
        rearmed: state.occupancy.rearm(),
    })
}

async fn handle_get_hourglass(State(state): State<AppState>) -> impl IntoResponse {
    state.hourglass.status().remaining_seconds.to_string()
}

async fn handle_get_hourglass_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.hourglass.status())
}

async fn handle_put_hourglass(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
    let parsed = HourglassRequest::parse(&body)
        .and_then(|request| Ok((request.command()?, request.auth)));
    let (command, auth) = match parsed {
        Ok(parsed) => parsed,
        Err(err) => return error_response(StatusCode::BAD_REQUEST, &err.to_string()),
    };

    submit_hourglass(&state, CommandOrigin::Put, auth, command).await
}

async fn handle_post_hourglass(State(state): State<AppState>, body: String) -> impl IntoResponse {
    submit_hourglass(
        &state,
        CommandOrigin::Post,
        body,
        HourglassCommand::Start { issued_at: None },
    )
    .await
}

async fn submit_hourglass(
    state: &AppState,
    origin: CommandOrigin,
    auth: String,
    command: HourglassCommand,
) -> axum::response::Response {
    match state.hourglass.submit(origin, auth, command).await {
        Ok(result) => Json(CommandReply {
            applied: matches!(&result, Ok(outcome) if outcome.changed_state()),
            detail: result_detail(&result),
        })
        .into_response(),
        Err(err) => {
            warn!("hourglass command failed: {err:#}");
            error_response(StatusCode::SERVICE_UNAVAILABLE, "Hourglass unavailable")
        }
    }
}

async fn handle_get_beacon(State(state): State<AppState>) -> impl IntoResponse {
    switch_digit(state.beacon.status().on)
}

async fn handle_put_beacon(State(state): State<AppState>, body: String) -> impl IntoResponse {
    let mode = BeaconMode::from_switch_value(&body);
    match state.beacon.set_mode(mode).await {
        Ok(status) => Json(status).into_response(),
        Err(err) => {
            warn!("beacon mode update failed: {err:#}");
            error_response(StatusCode::SERVICE_UNAVAILABLE, "Beacon unavailable")
        }
    }
}

async fn handle_get_lcd(State(state): State<AppState>) -> impl IntoResponse {
    state.panel.snapshot().log_line
}

async fn handle_put_lcd(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
    let command = match LcdCommand::parse(&body) {
        Ok(command) => command,
        Err(err) => return error_response(StatusCode::BAD_REQUEST, &err.to_string()),
    };

    match command {
        LcdCommand::Text(text) => state.panel.show(PanelUpdate::Log(text)),
        LcdCommand::Led { color, on } => state.panel.show(PanelUpdate::Led { color, on }),
    }
    Json(state.panel.snapshot()).into_response()
}

async fn handle_get_location(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.runtime.lock().await.location.clone())
}

async fn handle_put_location(
    State(state): State<AppState>,
    body: Bytes,
) -> impl IntoResponse {
    let location = match serde_json::from_slice::<LocationCoords>(&body) {
        Ok(location) if location.validate() => location,
        Ok(_) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "lat must be within -90..90 and lng within -180..180",
            )
        }
        Err(err) => return error_response(StatusCode::BAD_REQUEST, &err.to_string()),
    };

    let runtime = {
        let mut runtime = state.runtime.lock().await;
        runtime.location = location.clone();
        runtime.clone()
    };
    if let Err(err) = state.store.save_runtime_config(&runtime).await {
        warn!("failed to persist location update: {err:#}");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to persist location",
        );
    }

    Json(location).into_response()
}

async fn handle_get_location_metadata(State(state): State<AppState>) -> impl IntoResponse {
    Json(metadata_view(&*state.runtime.lock().await))
}

async fn handle_put_location_metadata(
    State(state): State<AppState>,
    body: Bytes,
) -> impl IntoResponse {
    let metadata = match serde_json::from_slice::<LocationMetadata>(&body) {
        Ok(metadata) if metadata.validate() => metadata,
        Ok(_) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "installer_email must be an address and dates must not be empty",
            )
        }
        Err(err) => return error_response(StatusCode::BAD_REQUEST, &err.to_string()),
    };

    let runtime = {
        let mut runtime = state.runtime.lock().await;
        runtime.metadata = metadata;
        runtime.clone()
    };
    if let Err(err) = state.store.save_runtime_config(&runtime).await {
        warn!("failed to persist location metadata: {err:#}");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to persist location metadata",
        );
    }
    info!("location metadata updated for meter {}", runtime.metadata.id);

    Json(metadata_view(&runtime)).into_response()
}

fn metadata_view(runtime: &RuntimeConfig) -> LocationMetadataView {
    LocationMetadataView {
        metadata: runtime.metadata.clone(),
        location: runtime.location.clone(),
        hardware_version: runtime.device.hardware_version.clone(),
        firmware_version: runtime.device.firmware_version.clone(),
        current_time: Utc::now().format("%Y-%m-%d,%H:%M:%S,UTC").to_string(),
    }
}

async fn handle_get_range(State(state): State<AppState>) -> impl IntoResponse {
    let trigger = state.runtime.lock().await.occupancy.range_trigger_m;
    switch_digit(state.occupancy.object_detected(trigger))
}

async fn handle_put_range(State(state): State<AppState>, body: String) -> impl IntoResponse {
    let trigger = match body.trim().parse::<f32>() {
        Ok(meters) if valid_range_trigger(meters) => meters,
        _ => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "trigger range must be a positive number of meters",
            )
        }
    };

    let runtime = {
        let mut runtime = state.runtime.lock().await;
        runtime.occupancy.range_trigger_m = trigger;
        runtime.clone()
    };
    if let Err(err) = state.store.save_runtime_config(&runtime).await {
        warn!("failed to persist range trigger: {err:#}");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to persist range trigger",
        );
    }
    info!("range trigger distance set to {trigger:.1} m");

    Json(RangeTriggerReply {
        trigger_range: trigger,
    })
    .into_response()
}

async fn handle_get_device(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.runtime.lock().await.device.clone())
}

async fn handle_get_time(State(state): State<AppState>) -> impl IntoResponse {
    let timezone = state.runtime.lock().await.timezone.clone();
    let local = now_in_timezone(&timezone);
    Json(TimeStatus {
        time_synced: local.is_some(),
        timezone,
        now_epoch: Utc::now().timestamp(),
        local_time: local.map(|now| now.to_rfc3339()),
    })
}

fn now_in_timezone(timezone: &str) -> Option<chrono::DateTime<chrono::FixedOffset>> {
    let tz: Tz = timezone.parse().ok()?;
    let local = Utc::now().with_timezone(&tz);
    Some(local.with_timezone(&local.offset().fix()))
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use axum::{body::Body, http::Request, response::Response};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::{notifier::Notification, store::scratch_dir};

    fn test_app(runtime: RuntimeConfig) -> (Router, tokio::sync::mpsc::Receiver<Notification>) {
        let (notifier, rx) = Notifier::channel();
        let store = AppStore::at(scratch_dir("router"));
        (build_router(build_app_state(runtime, store, notifier)), rx)
    }

    async fn call(app: &Router, method: &str, uri: &str, body: impl Into<Body>) -> Response {
        app.clone()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(body.into())
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn body_json(response: Response) -> Value {
        serde_json::from_str(&body_text(response).await).unwrap()
    }

    #[tokio::test]
    async fn occupancy_starts_empty() {
        let (app, _rx) = test_app(RuntimeConfig::default());

        let response = call(&app, "GET", "/api/occupancy", Body::empty()).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"count": 0, "state": 0}));
    }

    #[tokio::test]
    async fn hourglass_set_and_post_start() {
        let (app, _rx) = test_app(RuntimeConfig::default());

        let set = call(
            &app,
            "PUT",
            "/api/hourglass",
            r#"{"cmd":"set","value":60,"auth":"arm1234"}"#,
        )
        .await;
        assert_eq!(set.status(), StatusCode::OK);
        assert_eq!(body_json(set).await["applied"], json!(true));

        let start = call(&app, "POST", "/api/hourglass", "arm1234").await;
        assert_eq!(body_json(start).await["applied"], json!(true));

        let status = body_json(call(&app, "GET", "/api/hourglass/status", Body::empty()).await).await;
        assert_eq!(status["running"], json!(true));
        assert_eq!(status["fillSeconds"], json!(60));

        let remaining = body_text(call(&app, "GET", "/api/hourglass", Body::empty()).await).await;
        assert!(remaining.parse::<i64>().unwrap() <= 60);
    }

    #[tokio::test]
    async fn hourglass_rejects_bad_auth_without_changing_state() {
        let (app, _rx) = test_app(RuntimeConfig::default());

        let response = call(
            &app,
            "PUT",
            "/api/hourglass",
            r#"{"cmd":"set","value":60,"auth":"letmein"}"#,
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({"applied": false, "detail": "authentication failed"})
        );
        let remaining = body_text(call(&app, "GET", "/api/hourglass", Body::empty()).await).await;
        assert_eq!(remaining, "0");
    }

    #[tokio::test]
    async fn malformed_hourglass_payloads_are_bad_requests() {
        let (app, _rx) = test_app(RuntimeConfig::default());

        for body in [
            "not json",
            r#"{"cmd":"set","auth":"arm1234"}"#,
            r#"{"cmd":"launch","value":5,"auth":"arm1234"}"#,
        ] {
            let response = call(&app, "PUT", "/api/hourglass", body).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{body}");
            assert!(body_json(response).await["error"].is_string());
        }
    }

    #[tokio::test]
    async fn occupancy_config_validates_and_persists() {
        let (app, _rx) = test_app(RuntimeConfig::default());

        let invalid = call(
            &app,
            "PUT",
            "/api/occupancy/config",
            r#"{"min_move_rate":0.03,"occupied_range":0.50,"max_range":0.37,"occupied_variance":0.01,"range_end":0.60}"#,
        )
        .await;
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

        let valid = call(
            &app,
            "PUT",
            "/api/occupancy/config",
            r#"{"min_move_rate":0.05,"occupied_range":0.10,"max_range":0.40,"occupied_variance":0.02,"range_end":0.70}"#,
        )
        .await;
        assert_eq!(valid.status(), StatusCode::OK);

        let current =
            body_json(call(&app, "GET", "/api/occupancy/config", Body::empty()).await).await;
        assert_eq!(current["max_range"], json!(0.4));
        assert_eq!(current["low_res_interval_ms"], json!(1000));
    }

    #[tokio::test]
    async fn occupancy_config_auth_policy_is_enforced() {
        let mut runtime = RuntimeConfig::default();
        runtime.occupancy.occupancy_config_auth = true;
        let (app, _rx) = test_app(runtime);
        let body = r#"{"min_move_rate":0.05,"occupied_range":0.10,"max_range":0.40,"occupied_variance":0.02,"range_end":0.70}"#;

        let rejected = call(&app, "PUT", "/api/occupancy/config", body).await;
        assert_eq!(rejected.status(), StatusCode::UNAUTHORIZED);

        let with_auth = body.replace('}', r#","auth":"arm1234"}"#);
        let accepted = call(&app, "PUT", "/api/occupancy/config", with_auth).await;
        assert_eq!(accepted.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn rearm_reports_whether_latch_was_closed() {
        let (app, _rx) = test_app(RuntimeConfig::default());
        let response = call(&app, "POST", "/api/occupancy/rearm", Body::empty()).await;
        assert_eq!(body_json(response).await, json!({"rearmed": false}));
    }

    #[tokio::test]
    async fn beacon_switch_modes() {
        let (app, _rx) = test_app(RuntimeConfig::default());
        assert_eq!(
            body_text(call(&app, "GET", "/api/beacon", Body::empty()).await).await,
            "1"
        );

        let free = call(&app, "PUT", "/api/beacon", "0").await;
        assert_eq!(body_json(free).await["mode"], json!("FREE"));
        assert_eq!(
            body_text(call(&app, "GET", "/api/beacon", Body::empty()).await).await,
            "0"
        );
        assert_eq!(
            body_text(call(&app, "GET", "/api/lcd", Body::empty()).await).await,
            "FREE PARKING"
        );

        call(&app, "PUT", "/api/beacon", "1").await;
        assert_eq!(
            body_text(call(&app, "GET", "/api/beacon", Body::empty()).await).await,
            "1"
        );
    }

    #[tokio::test]
    async fn lcd_accepts_text_and_led_commands() {
        let (app, _rx) = test_app(RuntimeConfig::default());

        let text = call(&app, "PUT", "/api/lcd", r#"{"cmd":"lcd","value":"hello"}"#).await;
        assert_eq!(body_json(text).await["logLine"], json!("hello"));

        let led = call(
            &app,
            "PUT",
            "/api/lcd",
            r#"{"cmd":"led","value":"green","state":1}"#,
        )
        .await;
        let frame = body_json(led).await;
        assert_eq!(frame["led"], json!("green"));
        assert_eq!(frame["ledOn"], json!(true));

        let bad = call(&app, "PUT", "/api/lcd", r#"{"cmd":"led","value":"pink"}"#).await;
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn location_is_validated() {
        let (app, _rx) = test_app(RuntimeConfig::default());

        let current = body_json(call(&app, "GET", "/api/location", Body::empty()).await).await;
        assert_eq!(current, json!({"lat": "30.243982", "lng": "-97.844694"}));

        let bad = call(&app, "PUT", "/api/location", r#"{"lat":"91","lng":"0"}"#).await;
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);

        let good = call(&app, "PUT", "/api/location", r#"{"lat":"47.6","lng":"-122.3"}"#).await;
        assert_eq!(good.status(), StatusCode::OK);
        let current = body_json(call(&app, "GET", "/api/location", Body::empty()).await).await;
        assert_eq!(current["lat"], json!("47.6"));
    }

    #[tokio::test]
    async fn location_metadata_embeds_coords_and_persists() {
        let dir = scratch_dir("metadata");
        let (notifier, _rx) = Notifier::channel();
        let app = build_router(build_app_state(
            RuntimeConfig::default(),
            AppStore::at(dir.clone()),
            notifier,
        ));

        let current =
            body_json(call(&app, "GET", "/api/location/metadata", Body::empty()).await).await;
        assert_eq!(current["operational_state"], json!("Available"));
        assert_eq!(current["installer_email"], json!("nobody@nowhere.com"));
        assert_eq!(current["location"]["lat"], json!("30.243982"));
        assert_eq!(current["firmware_version"], json!("2.0.0"));
        assert_eq!(current["metadata"], json!({"spaceid": 0, "regionid": 0, "lotid": 0}));
        assert!(current["current_time"].is_string());

        let mut update = current.clone();
        update["id"] = json!(17);
        update["operational_state"] = json!("Maintenance");
        update["metadata"]["lotid"] = json!(9);
        let saved = call(&app, "PUT", "/api/location/metadata", update.to_string()).await;
        assert_eq!(saved.status(), StatusCode::OK);
        assert_eq!(body_json(saved).await["id"], json!(17));

        let stored = AppStore::at(dir.clone()).load_runtime_config().await.unwrap();
        assert_eq!(stored.metadata.metadata.lot_id, 9);
        assert_eq!(
            stored.metadata.operational_state,
            parking_meter_common::config::OperationalState::Maintenance
        );

        let bad = call(
            &app,
            "PUT",
            "/api/location/metadata",
            r#"{"installer_email":"nobody"}"#,
        )
        .await;
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
        let _ = tokio::fs::remove_dir_all(dir).await;
    }

    #[tokio::test]
    async fn range_resource_reports_objects_inside_the_trigger() {
        let (notifier, _rx) = Notifier::channel();
        let state = build_app_state(
            RuntimeConfig::default(),
            AppStore::at(scratch_dir("range")),
            notifier,
        );
        let app = build_router(state.clone());

        assert_eq!(
            body_text(call(&app, "GET", "/api/range", Body::empty()).await).await,
            "0"
        );

        handle_mqtt_message(&state, TOPIC_SENSOR_RANGE.to_string(), b"0.42".to_vec())
            .await
            .unwrap();
        assert_eq!(
            body_text(call(&app, "GET", "/api/range", Body::empty()).await).await,
            "1"
        );

        let tighter = call(&app, "PUT", "/api/range", "0.3").await;
        assert_eq!(body_json(tighter).await, json!({"triggerRange": 0.3}));
        assert_eq!(
            body_text(call(&app, "GET", "/api/range", Body::empty()).await).await,
            "0"
        );

        for bad in ["-1", "far", "0"] {
            let response = call(&app, "PUT", "/api/range", bad).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{bad}");
        }
    }

    #[tokio::test]
    async fn device_and_time_resources() {
        let (app, _rx) = test_app(RuntimeConfig::default());

        let device = body_json(call(&app, "GET", "/api/device", Body::empty()).await).await;
        assert_eq!(device["manufacturer"], json!("ARM/NXP"));
        assert_eq!(device["firmwareVersion"], json!("2.0.0"));

        let time = body_json(call(&app, "GET", "/api/time", Body::empty()).await).await;
        assert_eq!(time["timeSynced"], json!(true));
        assert_eq!(time["timezone"], json!("America/Chicago"));
    }

    #[tokio::test]
    async fn mqtt_commands_reach_the_resources() {
        let (notifier, _rx) = Notifier::channel();
        let state = build_app_state(
            RuntimeConfig::default(),
            AppStore::at(scratch_dir("mqtt")),
            notifier,
        );

        handle_mqtt_message(
            &state,
            TOPIC_CMD_HOURGLASS.to_string(),
            br#"{"cmd":"set","value":45,"auth":"arm1234"}"#.to_vec(),
        )
        .await
        .unwrap();
        assert_eq!(state.hourglass.status().fill_seconds, 45);

        handle_mqtt_message(&state, TOPIC_CMD_BEACON.to_string(), b"2".to_vec())
            .await
            .unwrap();
        assert_eq!(state.beacon.status().mode, "DISABLED");

        handle_mqtt_message(&state, TOPIC_SENSOR_RANGE.to_string(), b"0.42".to_vec())
            .await
            .unwrap();
        assert!(handle_mqtt_message(
            &state,
            TOPIC_CMD_HOURGLASS.to_string(),
            b"{broken".to_vec()
        )
        .await
        .is_err());

        let oversized = vec![b'9'; MAX_MQTT_PAYLOAD_BYTES + 1];
        handle_mqtt_message(&state, TOPIC_SENSOR_RANGE.to_string(), oversized)
            .await
            .unwrap();
    }
}

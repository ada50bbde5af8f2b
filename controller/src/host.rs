use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::Local;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

use relay_common::{
    BoardConfig, ChannelScheduleUpdate, RelayError, RelayState, ScheduleUpdate,
};

use crate::bank::RelayBank;
use crate::gpio::SimulatedPins;
use crate::scheduler::{self, SystemClock};
use crate::store::ScheduleStore;
use crate::surface::ControlSurface;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
struct Ack {
    msg: &'static str,
}

#[derive(Debug, Serialize)]
struct ChannelStateBody {
    channel: u16,
    state: &'static str,
}

#[derive(Debug, Deserialize)]
struct RebootParams {
    #[serde(default)]
    hold: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct SchedulePayload {
    schedule: Vec<ChannelScheduleUpdate>,
}

#[derive(Debug, Serialize)]
struct TimeBody {
    time: String,
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = BoardConfig::default();

    let data_dir = std::env::var("RELAY_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./.relay"));
    let schedule_path = data_dir.join("channels.json");

    let driver = Arc::new(SimulatedPins::new());
    let bank = Arc::new(
        RelayBank::new(driver, &config).context("relay board initialization failed")?,
    );
    info!(channels = bank.channel_count(), "relay bank initialized");

    let store = Arc::new(
        ScheduleStore::load(schedule_path, bank.channel_count())
            .await
            .context("failed to load channel schedule config")?,
    );

    // Clean slate: drive every channel off so the status mirror and the
    // hardware agree before the API or the scheduler can observe either.
    let every_channel: Vec<u16> = (1..=bank.channel_count()).collect();
    bank.set_all(&every_channel, RelayState::Off)
        .await
        .context("startup all-off sweep failed")?;

    let surface = ControlSurface::new(
        bank.clone(),
        store.clone(),
        config.name.clone(),
        config.reboot_hold(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler_handle = scheduler::spawn(
        bank,
        store,
        Arc::new(SystemClock),
        config.tick(),
        shutdown_rx,
    );

    let app = Router::new()
        .route("/api/status", get(handle_board_status))
        .route("/api/status/{channel}", get(handle_channel_status))
        .route("/api/on/{channel}", post(handle_on))
        .route("/api/off/{channel}", post(handle_off))
        .route("/api/toggle/{channel}", post(handle_toggle))
        .route("/api/reboot/{channel}", post(handle_reboot))
        .route("/api/all_on", post(handle_all_on))
        .route("/api/all_off", post(handle_all_off))
        .route("/api/light_on", post(handle_lights_on))
        .route("/api/light_off", post(handle_lights_off))
        .route(
            "/api/schedule",
            get(handle_get_schedule).put(handle_save_schedule),
        )
        .route(
            "/api/schedule/{channel}",
            get(handle_channel_schedule).put(handle_update_schedule),
        )
        .route("/api/time", get(handle_time))
        .with_state(surface);

    let port = std::env::var("RELAY_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind relay controller at {addr}"))?;

    info!("relay controller listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    scheduler_handle.await?;
    info!("relay controller stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {err}");
    }
}

async fn handle_board_status(State(surface): State<ControlSurface>) -> impl IntoResponse {
    Json(surface.board_status().await)
}

async fn handle_channel_status(
    State(surface): State<ControlSurface>,
    Path(channel): Path<u16>,
) -> Response {
    match surface.status(channel).await {
        Ok(state) => Json(ChannelStateBody {
            channel,
            state: state.as_str(),
        })
        .into_response(),
        Err(err) => error_response(&err),
    }
}

async fn handle_on(State(surface): State<ControlSurface>, Path(channel): Path<u16>) -> Response {
    ack(surface.set_on(channel).await)
}

async fn handle_off(State(surface): State<ControlSurface>, Path(channel): Path<u16>) -> Response {
    ack(surface.set_off(channel).await)
}

async fn handle_toggle(
    State(surface): State<ControlSurface>,
    Path(channel): Path<u16>,
) -> Response {
    match surface.toggle(channel).await {
        Ok(state) => Json(ChannelStateBody {
            channel,
            state: state.as_str(),
        })
        .into_response(),
        Err(err) => error_response(&err),
    }
}

async fn handle_reboot(
    State(surface): State<ControlSurface>,
    Path(channel): Path<u16>,
    Query(params): Query<RebootParams>,
) -> Response {
    ack(surface.reboot(channel, params.hold).await)
}

async fn handle_all_on(State(surface): State<ControlSurface>) -> Response {
    ack(surface.all_on().await)
}

async fn handle_all_off(State(surface): State<ControlSurface>) -> Response {
    ack(surface.all_off().await)
}

async fn handle_lights_on(State(surface): State<ControlSurface>) -> Response {
    ack(surface.lights_on().await)
}

async fn handle_lights_off(State(surface): State<ControlSurface>) -> Response {
    ack(surface.lights_off().await)
}

async fn handle_get_schedule(State(surface): State<ControlSurface>) -> impl IntoResponse {
    Json(surface.schedule().await)
}

async fn handle_save_schedule(
    State(surface): State<ControlSurface>,
    Json(payload): Json<SchedulePayload>,
) -> Response {
    ack(surface.save_schedule(&payload.schedule).await)
}

async fn handle_channel_schedule(
    State(surface): State<ControlSurface>,
    Path(channel): Path<u16>,
) -> Response {
    match surface.channel_schedule(channel).await {
        Ok(entry) => Json(entry).into_response(),
        Err(err) => error_response(&err),
    }
}

async fn handle_update_schedule(
    State(surface): State<ControlSurface>,
    Path(channel): Path<u16>,
    Json(fields): Json<ScheduleUpdate>,
) -> Response {
    ack(surface.update_schedule(channel, fields).await)
}

async fn handle_time() -> impl IntoResponse {
    Json(TimeBody {
        time: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
    })
}

fn ack(result: Result<(), RelayError>) -> Response {
    match result {
        Ok(()) => Json(Ack { msg: "success" }).into_response(),
        Err(err) => error_response(&err),
    }
}

fn error_response(err: &RelayError) -> Response {
    let status = match err {
        RelayError::InvalidChannel(_) => StatusCode::NOT_FOUND,
        RelayError::Validation(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        warn!("request failed: {err}");
    }
    (status, Json(ErrorBody {
        error: err.to_string(),
    }))
        .into_response()
}

//! # Edge server module
//!
//! This module abstracts over the HTTP side of the edge executable: it maps
//! the remote control routes onto the motion executor and the camera gate.
//! Handlers run the blocking core calls on the runtime's blocking pool, so
//! a long drive does not stall unrelated requests such as sensor reads.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use axum::{
    extract::{Path, Query},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Router,
};
use color_eyre::{eyre::WrapErr, Result};
use log::{info, warn};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::spawn_blocking;

use robot_ctrl::camera_gate::{CameraGate, CameraGateError, GatePolicy};
use robot_ctrl::frame_source::CameraSession;
use robot_ctrl::motion_exec::{MotionError, MotionExecutor};
use robot_if::frame::JpegFrame;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Body served on the readiness route.
const READY_STRING: &str = "GoPiGo edge controller ready";

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Everything the handlers need, shared across requests.
pub struct RobotState {
    /// Motion executor owning the board
    pub exec: MotionExecutor,

    /// Camera gate over the executor's motion guard
    pub gate: CameraGate,

    /// Lazily initialised camera session
    pub camera: CameraSession,

    /// Policy used when a camera request doesn't specify one
    pub camera_wait_default: bool,
}

/// Query string accepted by the camera routes.
#[derive(Deserialize)]
struct CameraQuery {
    /// Override of the default gate policy: `?wait=true` blocks until the
    /// robot is still, `?wait=false` fails fast.
    wait: Option<bool>,
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Serve the robot control API until the process is stopped.
pub async fn serve(bind_address: &str, state: Arc<RobotState>) -> Result<()> {
    let addr: SocketAddr = bind_address
        .parse()
        .wrap_err("Invalid bind address in parameters")?;

    let app = Router::new()
        .route("/", get(index))
        .route("/version", get(version))
        .route("/forward/:cm", post(forward))
        .route("/backward/:cm", post(backward))
        .route("/left/:deg", post(left))
        .route("/right/:deg", post(right))
        .route("/servo/:deg", post(servo))
        .route("/distance", get(distance))
        .route("/power", get(power))
        .route("/camera", get(camera_base64))
        .route("/camera.jpg", get(camera_jpeg))
        .layer(Extension(state));

    info!("Serving robot control API on {}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .wrap_err("HTTP server failed")?;

    Ok(())
}

/// Resolve once the process receives an interrupt.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Cannot listen for the interrupt signal: {}", e);
        return;
    }

    info!("Interrupt received, shutting down");
}

// ------------------------------------------------------------------------------------------------
// HANDLERS
// ------------------------------------------------------------------------------------------------

async fn index() -> &'static str {
    READY_STRING
}

async fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

async fn forward(
    Path(cm): Path<i64>,
    Extension(state): Extension<Arc<RobotState>>,
) -> Response {
    motion_response(spawn_blocking(move || state.exec.forward(cm as f64)).await)
}

async fn backward(
    Path(cm): Path<i64>,
    Extension(state): Extension<Arc<RobotState>>,
) -> Response {
    motion_response(spawn_blocking(move || state.exec.backward(cm as f64)).await)
}

async fn left(Path(deg): Path<i64>, Extension(state): Extension<Arc<RobotState>>) -> Response {
    motion_response(spawn_blocking(move || state.exec.left(deg as f64)).await)
}

async fn right(Path(deg): Path<i64>, Extension(state): Extension<Arc<RobotState>>) -> Response {
    motion_response(spawn_blocking(move || state.exec.right(deg as f64)).await)
}

async fn servo(Path(deg): Path<i64>, Extension(state): Extension<Arc<RobotState>>) -> Response {
    motion_response(spawn_blocking(move || state.exec.rotate_servo(deg as f64)).await)
}

async fn distance(Extension(state): Extension<Arc<RobotState>>) -> Response {
    match spawn_blocking(move || state.exec.distance_mm()).await {
        Ok(Ok(mm)) => mm.to_string().into_response(),
        Ok(Err(e)) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
        Err(e) => join_error(e),
    }
}

async fn power(Extension(state): Extension<Arc<RobotState>>) -> Response {
    match spawn_blocking(move || state.exec.battery_v()).await {
        Ok(Ok(v)) => v.to_string().into_response(),
        Ok(Err(e)) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
        Err(e) => join_error(e),
    }
}

async fn camera_base64(
    Query(query): Query<CameraQuery>,
    Extension(state): Extension<Arc<RobotState>>,
) -> Response {
    match gated_frame(state, query).await {
        Ok(frame) => frame.to_base64().into_response(),
        Err(response) => response,
    }
}

async fn camera_jpeg(
    Query(query): Query<CameraQuery>,
    Extension(state): Extension<Arc<RobotState>>,
) -> Response {
    match gated_frame(state, query).await {
        Ok(frame) => ([(header::CONTENT_TYPE, "image/jpeg")], frame.data).into_response(),
        Err(response) => response,
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Run a gated camera read on the blocking pool.
async fn gated_frame(
    state: Arc<RobotState>,
    query: CameraQuery,
) -> std::result::Result<JpegFrame, Response> {
    let policy = select_policy(query.wait, state.camera_wait_default);

    match spawn_blocking(move || read_frame(&state, policy)).await {
        Ok(Ok(frame)) => Ok(frame),
        Ok(Err(e)) => {
            warn!("Camera read failed: {}", e);
            Err((camera_status(&e), e.to_string()).into_response())
        }
        Err(e) => Err(join_error(e)),
    }
}

/// The blocking half of a camera request: init the session, pass the gate.
fn read_frame(state: &RobotState, policy: GatePolicy) -> Result<JpegFrame, CameraGateError> {
    let source = state.camera.get_or_init()?;
    state.gate.acquire(&source, policy)
}

/// Resolve the per-request policy override against the configured default.
fn select_policy(wait: Option<bool>, wait_default: bool) -> GatePolicy {
    if wait.unwrap_or(wait_default) {
        GatePolicy::Wait
    } else {
        GatePolicy::FailFast
    }
}

/// Map a motion command result onto the "OK"/423/500 response contract.
fn motion_response(
    result: std::result::Result<std::result::Result<(), MotionError>, tokio::task::JoinError>,
) -> Response {
    match result {
        Ok(Ok(())) => "OK".into_response(),
        Ok(Err(e @ MotionError::AlreadyMoving)) => {
            (StatusCode::LOCKED, e.to_string()).into_response()
        }
        Ok(Err(e @ MotionError::Board(_))) => {
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
        Err(e) => join_error(e),
    }
}

/// HTTP status for each camera failure mode.
fn camera_status(e: &CameraGateError) -> StatusCode {
    match e {
        CameraGateError::Locked | CameraGateError::Stabilising => StatusCode::LOCKED,
        CameraGateError::WaitTimeout => StatusCode::REQUEST_TIMEOUT,
        CameraGateError::Source(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// A blocking task panicked or was cancelled.
fn join_error(e: tokio::task::JoinError) -> Response {
    warn!("Blocking task failed: {}", e);
    (StatusCode::INTERNAL_SERVER_ERROR, "internal task failure").into_response()
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use robot_ctrl::frame_source::FrameSourceError;

    #[test]
    fn test_camera_status_codes() {
        assert_eq!(camera_status(&CameraGateError::Locked), StatusCode::LOCKED);
        assert_eq!(
            camera_status(&CameraGateError::Stabilising),
            StatusCode::LOCKED
        );
        assert_eq!(
            camera_status(&CameraGateError::WaitTimeout),
            StatusCode::REQUEST_TIMEOUT
        );
        assert_eq!(
            camera_status(&CameraGateError::Source(FrameSourceError::FrameUnavailable)),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_policy_selection() {
        assert_eq!(select_policy(None, false), GatePolicy::FailFast);
        assert_eq!(select_policy(None, true), GatePolicy::Wait);
        assert_eq!(select_policy(Some(true), false), GatePolicy::Wait);
        assert_eq!(select_policy(Some(false), true), GatePolicy::FailFast);
    }
}

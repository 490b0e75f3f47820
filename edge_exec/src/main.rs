//! # Edge Controller Executable
//!
//! This executable exposes the robot to remote control over HTTP. Motion
//! commands, sensor reads and camera captures arrive as requests and are
//! mapped onto the control core, which enforces the motion/camera
//! mutual-exclusion protocol.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// HTTP server abstraction.
mod edge_server;

/// Parameters for the edge executable.
mod params;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Result};
use log::{info, warn};
use std::sync::Arc;

// Internal
use edge_server::RobotState;
use params::EdgeExecParams;
use robot_ctrl::board::SimBoard;
use robot_ctrl::camera_gate::CameraGate;
use robot_ctrl::frame_source::CameraSession;
use robot_ctrl::motion_exec::MotionExecutor;
use robot_ctrl::motion_guard::MotionGuard;
use util::{
    logger::{logger_init, LevelFilter},
    session::Session,
};

// ------------------------------------------------------------------------------------------------
// MAIN
// ------------------------------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new("edge_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Trace, &session).wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("Edge Controller Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    info!("Initialising...");

    // ---- LOAD PARAMETERS ----

    let params: EdgeExecParams =
        util::params::load("edge_exec.toml").wrap_err("Failed to load parameters")?;

    info!("Parameters loaded");

    // ---- INIT CONTROL CORE ----

    // The real GoPiGo3 board slots in behind the Board trait; until that
    // backend lands the executable drives the simulated board.
    warn!("No hardware backend configured, using the simulated board");

    let guard = Arc::new(MotionGuard::new());

    let state = Arc::new(RobotState {
        exec: MotionExecutor::new(SimBoard::new(), guard.clone(), params.motion_exec.clone()),
        gate: CameraGate::new(guard, params.camera_gate.clone()),
        camera: CameraSession::new(params.camera.clone()),
        camera_wait_default: params.camera_wait_default,
    });

    info!("Control core initialised");

    // ---- SERVE ----

    edge_server::serve(&params.bind_address, state.clone()).await?;

    // ---- SHUTDOWN ----

    // The camera session stops its refresh thread on drop, the board only
    // needs an explicit reset if the deployment asks for one.
    if params.reset_on_exit {
        info!("Resetting the board before exit");

        if let Err(e) = state.exec.reset() {
            warn!("Board reset on exit failed: {}", e);
        }
    }

    Ok(())
}

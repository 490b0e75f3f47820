//! # Edge Executable Parameters

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Deserialize;

use robot_ctrl::camera_gate::CameraGateParams;
use robot_ctrl::frame_source::CameraParams;
use robot_ctrl::motion_exec::MotionExecParams;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct EdgeExecParams {
    /// Address the HTTP server binds to, e.g. "0.0.0.0:5000"
    pub bind_address: String,

    /// If true camera requests without an explicit `wait` query use the
    /// wait policy rather than failing fast
    pub camera_wait_default: bool,

    /// If true the board is reset when the server shuts down
    pub reset_on_exit: bool,

    /// Motion executor parameters
    pub motion_exec: MotionExecParams,

    /// Camera gate parameters
    pub camera_gate: CameraGateParams,

    /// Camera device parameters
    pub camera: CameraParams,
}

//! # Message Queue Executable Parameters

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Deserialize;

use robot_ctrl::motion_exec::MotionExecParams;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct MqExecParams {
    /// Motion executor parameters
    pub motion_exec: MotionExecParams,

    /// If true the board is reset when the connection loop ends
    pub reset_on_exit: bool,
}

//! # Robot Control Library
//!
//! This library holds the robot's coordination core: the state machine which
//! tracks whether the robot is executing a motion command, the executor which
//! wraps every hardware motion call in that state machine, and the camera
//! gate which refuses to hand out frames while the robot is moving or still
//! settling after a move.
//!
//! The hardware itself sits behind the [`board::Board`] trait; the capture
//! device behind [`frame_source::FrameCapture`]. Transport executables
//! (`edge_exec`, `mq_exec`) compose these pieces and map their requests onto
//! them.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

/// Hardware board boundary.
pub mod board;

/// Camera read eligibility policies.
pub mod camera_gate;

/// Background-refreshed camera frame buffer.
pub mod frame_source;

/// Motion executor wrapping board calls in the guard.
pub mod motion_exec;

/// Shared motion state flag and stop timestamp.
pub mod motion_guard;

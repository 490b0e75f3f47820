//! # Robot Interface Library
//!
//! This library provides the types shared between the robot's transport
//! executables: the commands that may be issued to the robot and the camera
//! frames it returns. Both the HTTP executable (`edge_exec`) and the message
//! queue executable (`mq_exec`) map their inbound requests onto these types.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod cmd;
pub mod frame;

//! # Request dispatch module
//!
//! Maps a queue request body onto the motion executor and produces the reply
//! string. Every failure mode is reported back to the sender as a
//! descriptive string rather than killing the process: an operator typo must
//! not take the robot offline.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::info;

use robot_ctrl::motion_exec::{MotionError, MotionExecutor};
use robot_if::cmd::RobotCmd;

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Execute the request in the given JSON body, returning the reply body.
pub fn dispatch(exec: &MotionExecutor, body: &str) -> String {
    let cmd = match RobotCmd::from_json(body) {
        Ok(c) => c,
        Err(e) => return e.to_string(),
    };

    info!("Start executing -> {:?}", cmd);
    let reply = execute(exec, cmd);
    info!("Stop executing -> {:?}: {}", cmd, reply);

    reply
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Run a parsed command against the executor.
fn execute(exec: &MotionExecutor, cmd: RobotCmd) -> String {
    match cmd {
        RobotCmd::Forward { cm } => motion_reply(exec.forward(cm)),
        RobotCmd::Backward { cm } => motion_reply(exec.backward(cm)),
        RobotCmd::Left { deg } => motion_reply(exec.left(deg)),
        RobotCmd::Right { deg } => motion_reply(exec.right(deg)),
        RobotCmd::Servo { deg } => motion_reply(exec.rotate_servo(deg)),
        RobotCmd::Distance => reading_reply(exec.distance_mm()),
        RobotCmd::Power => reading_reply(exec.battery_v()),
        RobotCmd::Status => "OK".into(),
        RobotCmd::Reset => motion_reply(exec.reset()),
    }
}

fn motion_reply(result: Result<(), MotionError>) -> String {
    match result {
        Ok(()) => "OK".into(),
        Err(e) => e.to_string(),
    }
}

fn reading_reply(result: Result<f64, MotionError>) -> String {
    match result {
        Ok(value) => value.to_string(),
        Err(e) => e.to_string(),
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use robot_ctrl::board::SimBoard;
    use robot_ctrl::motion_exec::MotionExecParams;
    use robot_ctrl::motion_guard::MotionGuard;
    use std::sync::Arc;

    /// An executor over a fast simulated board.
    fn executor() -> MotionExecutor {
        let mut board = SimBoard::new();
        board.drive_speed_cms = 10_000.0;
        board.turn_rate_degs = 10_000.0;

        MotionExecutor::new(
            board,
            Arc::new(MotionGuard::new()),
            MotionExecParams {
                settle_time_s: 0.0,
                servo_uses_guard: true,
            },
        )
    }

    #[test]
    fn test_motion_ops_reply_ok() {
        let exec = executor();

        for body in &[
            r#"{"operation": "forward", "parameter": "10"}"#,
            r#"{"operation": "backward", "parameter": "10"}"#,
            r#"{"operation": "left", "parameter": "30"}"#,
            r#"{"operation": "right", "parameter": "30"}"#,
            r#"{"operation": "servo", "parameter": "90"}"#,
            r#"{"operation": "reset"}"#,
            r#"{"operation": "status"}"#,
        ] {
            assert_eq!(dispatch(&exec, body), "OK", "body: {}", body);
        }
    }

    #[test]
    fn test_sensor_ops_reply_readings() {
        let exec = executor();

        assert_eq!(
            dispatch(&exec, r#"{"operation": "distance"}"#),
            SimBoard::new().distance_mm.to_string()
        );
        assert_eq!(
            dispatch(&exec, r#"{"operation": "power"}"#),
            SimBoard::new().battery_v.to_string()
        );
    }

    #[test]
    fn test_unknown_operation_reported_to_sender() {
        let exec = executor();

        assert_eq!(
            dispatch(&exec, r#"{"operation": "dance"}"#),
            "operation dance not implemented"
        );
    }

    #[test]
    fn test_bad_requests_reported_to_sender() {
        let exec = executor();

        // Malformed JSON and bad parameters come back as strings, they
        // never panic the endpoint
        assert!(dispatch(&exec, "not json").contains("invalid JSON"));
        assert!(dispatch(&exec, r#"{"operation": "forward"}"#).contains("requires a parameter"));
        assert!(
            dispatch(&exec, r#"{"operation": "forward", "parameter": "ten"}"#)
                .contains("Invalid parameter")
        );
    }
}

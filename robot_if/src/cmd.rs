//! # Robot command module
//!
//! Commands are the instructions sent to the robot by a remote operator. The
//! HTTP executable builds them directly from its routes, while the message
//! queue executable parses them out of JSON request bodies of the form
//! `{"operation": "...", "parameter": "..."}`.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{Deserialize, Serialize};
use serde_json::{self, Value};
use thiserror::Error;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// A command that can be executed by the robot.
///
/// Distances and angles keep the sign the operator gave them, the sign
/// normalisation for `Backward` and `Left` is the motion executor's job.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub enum RobotCmd {
    /// Drive forward by the given number of centimeters.
    Forward {
        /// Distance to drive in centimeters.
        cm: f64,
    },

    /// Drive backward by the given number of centimeters.
    Backward {
        /// Distance to drive in centimeters.
        cm: f64,
    },

    /// Turn left (anticlockwise) by the given angle.
    Left {
        /// Angle to turn in degrees.
        deg: f64,
    },

    /// Turn right (clockwise) by the given angle.
    Right {
        /// Angle to turn in degrees.
        deg: f64,
    },

    /// Rotate the camera servo to the given angle.
    Servo {
        /// Target servo angle in degrees.
        deg: f64,
    },

    /// Read the distance sensor, result in millimeters.
    Distance,

    /// Read the battery voltage, result in volts.
    Power,

    /// Report whether the robot is alive.
    Status,

    /// Reset the robot board to its power-on state.
    Reset,
}

/// Possible command parsing errors.
#[derive(Debug, Error)]
pub enum CmdParseError {
    #[error("Request contains invalid JSON: {0}")]
    InvalidJson(serde_json::Error),

    #[error("Expected \"operation\" to be a string")]
    MissingOperation,

    #[error("operation {0} not implemented")]
    UnknownOperation(String),

    #[error("Operation {0:?} requires a parameter but none was given")]
    MissingParameter(String),

    #[error("Invalid parameter {1:?} for operation {0:?}: expected a number")]
    InvalidParameter(String, String),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl RobotCmd {
    /// Parse a command from a JSON request body.
    ///
    /// The expected shape is `{"operation": string, "parameter": string}`,
    /// with `parameter` optional for the operations which don't take one.
    pub fn from_json(json_str: &str) -> Result<Self, CmdParseError> {
        // Parse the JSON string into a value
        let val: Value = match serde_json::from_str(json_str) {
            Ok(v) => v,
            Err(e) => return Err(CmdParseError::InvalidJson(e)),
        };

        // Get the operation name
        let operation = match val["operation"].as_str() {
            Some(s) => s,
            None => return Err(CmdParseError::MissingOperation),
        };

        // The parameter may be absent, or present as either a string or a
        // bare number
        let parameter = match &val["parameter"] {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        };

        Self::from_operation(operation, parameter.as_deref())
    }

    /// Build a command from an operation name and optional parameter string.
    pub fn from_operation(
        operation: &str,
        parameter: Option<&str>,
    ) -> Result<Self, CmdParseError> {
        match operation {
            "forward" => Ok(RobotCmd::Forward {
                cm: parse_param(operation, parameter)?,
            }),
            "backward" => Ok(RobotCmd::Backward {
                cm: parse_param(operation, parameter)?,
            }),
            "left" => Ok(RobotCmd::Left {
                deg: parse_param(operation, parameter)?,
            }),
            "right" => Ok(RobotCmd::Right {
                deg: parse_param(operation, parameter)?,
            }),
            "servo" => Ok(RobotCmd::Servo {
                deg: parse_param(operation, parameter)?,
            }),
            "distance" => Ok(RobotCmd::Distance),
            "power" => Ok(RobotCmd::Power),
            "status" => Ok(RobotCmd::Status),
            "reset" => Ok(RobotCmd::Reset),
            other => Err(CmdParseError::UnknownOperation(other.into())),
        }
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Parse the numeric parameter required by a motion operation.
fn parse_param(operation: &str, parameter: Option<&str>) -> Result<f64, CmdParseError> {
    let raw = match parameter {
        Some(p) => p,
        None => return Err(CmdParseError::MissingParameter(operation.into())),
    };

    raw.trim()
        .parse::<f64>()
        .map_err(|_| CmdParseError::InvalidParameter(operation.into(), raw.into()))
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_motion_ops() {
        let cmd = RobotCmd::from_json(r#"{"operation": "forward", "parameter": "10"}"#).unwrap();
        assert_eq!(cmd, RobotCmd::Forward { cm: 10.0 });

        let cmd = RobotCmd::from_json(r#"{"operation": "left", "parameter": "30"}"#).unwrap();
        assert_eq!(cmd, RobotCmd::Left { deg: 30.0 });

        // Numeric parameters are accepted as well as strings
        let cmd = RobotCmd::from_json(r#"{"operation": "servo", "parameter": 45}"#).unwrap();
        assert_eq!(cmd, RobotCmd::Servo { deg: 45.0 });
    }

    #[test]
    fn test_parse_parameterless_ops() {
        for (op, cmd) in &[
            ("distance", RobotCmd::Distance),
            ("power", RobotCmd::Power),
            ("status", RobotCmd::Status),
            ("reset", RobotCmd::Reset),
        ] {
            let parsed =
                RobotCmd::from_json(&format!(r#"{{"operation": "{}"}}"#, op)).unwrap();
            assert_eq!(parsed, *cmd);
        }
    }

    #[test]
    fn test_unknown_operation() {
        let err = RobotCmd::from_json(r#"{"operation": "dance"}"#).unwrap_err();
        match &err {
            CmdParseError::UnknownOperation(op) => assert_eq!(op, "dance"),
            e => panic!("Unexpected error: {:?}", e),
        }

        // The error string is the exact reply sent back over the queue
        assert_eq!(err.to_string(), "operation dance not implemented");
    }

    #[test]
    fn test_bad_parameters() {
        assert!(matches!(
            RobotCmd::from_json(r#"{"operation": "forward"}"#),
            Err(CmdParseError::MissingParameter(_))
        ));
        assert!(matches!(
            RobotCmd::from_json(r#"{"operation": "forward", "parameter": "ten"}"#),
            Err(CmdParseError::InvalidParameter(_, _))
        ));
        assert!(matches!(
            RobotCmd::from_json("not json"),
            Err(CmdParseError::InvalidJson(_))
        ));
    }
}

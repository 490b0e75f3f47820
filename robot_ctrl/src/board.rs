//! # Board module
//!
//! Boundary to the robot's hardware. All calls are blocking: a drive call
//! returns once the robot has physically covered the commanded distance.
//! The real GoPiGo3 SDK lives on the other side of this trait; the software
//! ships with a simulated board which sleeps in proportion to the commanded
//! motion, which is what the rest of the stack is tested against.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::time::Duration;
use thiserror::Error;

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Blocking interface to the robot's hardware board.
///
/// Sign conventions are the raw hardware ones: positive distance drives
/// forward, positive angle turns clockwise (to the right). Callers wanting
/// "backward" or "left" semantics negate before calling.
pub trait Board: Send {
    /// Drive in a straight line by the given distance, blocking until done.
    fn drive_cm(&mut self, cm: f64) -> Result<(), BoardError>;

    /// Turn on the spot by the given angle, blocking until done.
    fn turn_degrees(&mut self, deg: f64) -> Result<(), BoardError>;

    /// Rotate the camera servo to the given absolute angle.
    fn rotate_servo(&mut self, deg: f64) -> Result<(), BoardError>;

    /// Read the forward distance sensor in millimeters.
    fn read_distance_mm(&mut self) -> Result<f64, BoardError>;

    /// Read the battery voltage in volts.
    fn read_battery_v(&mut self) -> Result<f64, BoardError>;

    /// Reset the board to its power-on state.
    fn reset_all(&mut self) -> Result<(), BoardError>;
}

// ---------------------------------------------------------------------------
// ENUMS
// ---------------------------------------------------------------------------

/// Errors which can occur in a [`Board`] implementation
#[derive(Debug, Error)]
pub enum BoardError {
    #[error("Could not communicate with the board: {0}")]
    CommsError(String),

    #[error("The requested sensor is not attached")]
    SensorNotAttached,
}

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

/// A simulated board for running without hardware.
///
/// Motion calls sleep for the time the real robot would take at the
/// configured rates, so the guard and gate see realistic motion durations.
pub struct SimBoard {
    /// Simulated drive speed in centimeters/second.
    pub drive_speed_cms: f64,

    /// Simulated turn rate in degrees/second.
    pub turn_rate_degs: f64,

    /// Value returned by the simulated distance sensor.
    pub distance_mm: f64,

    /// Value returned by the simulated battery monitor.
    pub battery_v: f64,

    /// Current servo angle in degrees.
    pub servo_deg: f64,
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl SimBoard {
    /// Create a simulated board with rates close to a real GoPiGo3.
    pub fn new() -> Self {
        Self {
            drive_speed_cms: 15.0,
            turn_rate_degs: 90.0,
            distance_mm: 300.0,
            battery_v: 9.6,
            servo_deg: 90.0,
        }
    }

    fn sleep_for(&self, magnitude: f64, rate: f64) {
        if rate > 0.0 {
            std::thread::sleep(Duration::from_secs_f64(magnitude.abs() / rate));
        }
    }
}

impl Default for SimBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl Board for SimBoard {
    fn drive_cm(&mut self, cm: f64) -> Result<(), BoardError> {
        self.sleep_for(cm, self.drive_speed_cms);
        Ok(())
    }

    fn turn_degrees(&mut self, deg: f64) -> Result<(), BoardError> {
        self.sleep_for(deg, self.turn_rate_degs);
        Ok(())
    }

    fn rotate_servo(&mut self, deg: f64) -> Result<(), BoardError> {
        self.servo_deg = deg;
        Ok(())
    }

    fn read_distance_mm(&mut self) -> Result<f64, BoardError> {
        Ok(self.distance_mm)
    }

    fn read_battery_v(&mut self) -> Result<f64, BoardError> {
        Ok(self.battery_v)
    }

    fn reset_all(&mut self) -> Result<(), BoardError> {
        self.servo_deg = 90.0;
        Ok(())
    }
}

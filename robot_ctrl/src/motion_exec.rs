//! # Motion executor module
//!
//! The motion executor is the only path from a transport request to a board
//! motion call. Every drive and turn is wrapped in the motion guard: the
//! permit is taken before the hardware call and released after it — on
//! success, failure or panic — so the moving flag can never be left stuck.
//!
//! Sign normalisation lives here: `backward` is a negative `forward`
//! distance, `left` a negative `right` angle, matching the board's raw
//! conventions.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, trace};
use serde::Deserialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;

// Internal
use crate::board::{Board, BoardError};
use crate::motion_guard::{MotionGuard, MotionGuardError};

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

/// Parameters for the motion executor
#[derive(Debug, Clone, Deserialize)]
pub struct MotionExecParams {
    /// Time in seconds to wait after a drive/turn completes before declaring
    /// the motion done, letting physical momentum dissipate.
    pub settle_time_s: f64,

    /// Whether servo rotation takes the motion guard.
    ///
    /// The servo is fast enough that some deployments choose to let camera
    /// reads race it; this is a policy choice, not an oversight.
    pub servo_uses_guard: bool,
}

/// Executes motion commands against the board under the motion guard.
pub struct MotionExecutor {
    /// Exclusive handle on the hardware. The board mutex is independent of
    /// the guard's: it serialises raw hardware access, while the guard
    /// carries the "moving" semantic across the call's duration.
    board: Mutex<Box<dyn Board>>,

    guard: Arc<MotionGuard>,

    params: MotionExecParams,
}

// ---------------------------------------------------------------------------
// ENUMS
// ---------------------------------------------------------------------------

/// Errors which can occur when executing a motion command
#[derive(Debug, Error)]
pub enum MotionError {
    #[error("A motion command is already executing")]
    AlreadyMoving,

    #[error("Board error: {0}")]
    Board(#[from] BoardError),
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl Default for MotionExecParams {
    fn default() -> Self {
        Self {
            settle_time_s: 0.2,
            servo_uses_guard: true,
        }
    }
}

impl MotionExecutor {
    /// Create a new executor owning the given board.
    pub fn new<B: Board + 'static>(
        board: B,
        guard: Arc<MotionGuard>,
        params: MotionExecParams,
    ) -> Self {
        Self {
            board: Mutex::new(Box::new(board)),
            guard,
            params,
        }
    }

    /// The guard this executor reports motion through.
    pub fn guard(&self) -> &Arc<MotionGuard> {
        &self.guard
    }

    /// Drive forward by the given distance in centimeters.
    pub fn forward(&self, cm: f64) -> Result<(), MotionError> {
        self.drive_cm(cm)
    }

    /// Drive backward by the given distance in centimeters.
    ///
    /// A positive distance is normalised to a negative forward drive; a
    /// distance the caller already negated is passed through unchanged.
    pub fn backward(&self, cm: f64) -> Result<(), MotionError> {
        self.drive_cm(if cm > 0.0 { -cm } else { cm })
    }

    /// Turn left (anticlockwise) by the given angle in degrees.
    pub fn left(&self, deg: f64) -> Result<(), MotionError> {
        self.turn_degrees(if deg > 0.0 { -deg } else { deg })
    }

    /// Turn right (clockwise) by the given angle in degrees.
    pub fn right(&self, deg: f64) -> Result<(), MotionError> {
        self.turn_degrees(deg)
    }

    /// Drive by a raw signed distance, under the motion guard.
    pub fn drive_cm(&self, cm: f64) -> Result<(), MotionError> {
        debug!("Executing drive of {} cm", cm);
        self.guarded(|board| board.drive_cm(cm))
    }

    /// Turn by a raw signed angle, under the motion guard.
    pub fn turn_degrees(&self, deg: f64) -> Result<(), MotionError> {
        debug!("Executing turn of {} deg", deg);
        self.guarded(|board| board.turn_degrees(deg))
    }

    /// Rotate the camera servo to the given angle.
    ///
    /// Takes the motion guard only if `servo_uses_guard` is set.
    pub fn rotate_servo(&self, deg: f64) -> Result<(), MotionError> {
        debug!("Rotating servo to {} deg", deg);

        if self.params.servo_uses_guard {
            let _permit = self.guard.begin()?;
            self.lock_board().rotate_servo(deg)?;
        } else {
            self.lock_board().rotate_servo(deg)?;
        }

        Ok(())
    }

    /// Read the distance sensor. Does not touch the guard.
    pub fn distance_mm(&self) -> Result<f64, MotionError> {
        Ok(self.lock_board().read_distance_mm()?)
    }

    /// Read the battery voltage. Does not touch the guard.
    pub fn battery_v(&self) -> Result<f64, MotionError> {
        Ok(self.lock_board().read_battery_v()?)
    }

    /// Reset the board. Does not touch the guard.
    pub fn reset(&self) -> Result<(), MotionError> {
        Ok(self.lock_board().reset_all()?)
    }

    /// Run a board motion call inside a guard permit.
    ///
    /// The permit is taken first and dropped last, so the moving flag covers
    /// the hardware call and the settle time, and is cleared whether the
    /// call succeeds, fails or panics.
    fn guarded<F>(&self, motion: F) -> Result<(), MotionError>
    where
        F: FnOnce(&mut dyn Board) -> Result<(), BoardError>,
    {
        let _permit = self.guard.begin()?;

        let result = motion(self.lock_board().as_mut());

        if self.params.settle_time_s > 0.0 {
            trace!("Settling for {} s", self.params.settle_time_s);
            std::thread::sleep(Duration::from_secs_f64(self.params.settle_time_s));
        }

        Ok(result?)
    }

    /// Lock the board, recovering from poisoning.
    ///
    /// A panic in one board call must not brick every later command.
    fn lock_board(&self) -> MutexGuard<'_, Box<dyn Board>> {
        self.board.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl From<MotionGuardError> for MotionError {
    fn from(e: MotionGuardError) -> Self {
        match e {
            MotionGuardError::AlreadyMoving => MotionError::AlreadyMoving,
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

//! # Camera gate module
//!
//! The gate decides whether a camera read may proceed given the motion
//! guard's state: a moving robot produces a blurred frame, and so does one
//! that stopped a moment ago and is still rocking on its suspension. Two
//! policies are supported, chosen per request:
//!
//! - fail fast: reject with `Locked`/`Stabilising` and let the caller retry;
//! - wait: block until the robot has stopped (bounded by a timeout), sleep
//!   out whatever remains of the stabilization window, then read.
//!
//! After passing the gate the first few buffered snapshots are discarded so
//! a frame captured during the motion is never handed out.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, trace};
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

// Internal
use crate::frame_source::{self, FrameSource, FrameSourceError};
use crate::motion_guard::{MotionGuard, MotionSnapshot};
use robot_if::frame::JpegFrame;

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

/// Parameters for the camera gate
#[derive(Debug, Clone, Deserialize)]
pub struct CameraGateParams {
    /// Length in seconds of the stabilization window measured from the end
    /// of the last motion.
    pub stab_window_s: f64,

    /// Maximum time in seconds a wait-policy read will wait for motion to
    /// complete before failing with a timeout.
    pub wait_timeout_s: f64,

    /// If true a read arriving exactly at the window boundary is treated as
    /// outside the window.
    pub boundary_exclusive: bool,

    /// Number of buffered snapshots to discard after the gate passes.
    pub flush_frames: u32,

    /// Delay in seconds between flush re-reads.
    pub flush_delay_s: f64,
}

/// Decides camera read eligibility against the motion guard.
pub struct CameraGate {
    guard: Arc<MotionGuard>,

    params: CameraGateParams,
}

// ---------------------------------------------------------------------------
// ENUMS
// ---------------------------------------------------------------------------

/// Gate behaviour for a single camera read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatePolicy {
    /// Reject immediately if the robot is moving or stabilising.
    FailFast,

    /// Block until the robot is still, bounded by the wait timeout.
    Wait,
}

/// Errors which can occur during a gated camera read
#[derive(Debug, Error)]
pub enum CameraGateError {
    #[error("Robot is moving, image would be blurry")]
    Locked,

    #[error("Robot is stabilising after motion, image would be blurry")]
    Stabilising,

    #[error("Timed out waiting for the robot to stop moving")]
    WaitTimeout,

    #[error(transparent)]
    Source(#[from] FrameSourceError),
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl Default for CameraGateParams {
    fn default() -> Self {
        Self {
            stab_window_s: 0.5,
            wait_timeout_s: 15.0,
            boundary_exclusive: true,
            flush_frames: 2,
            flush_delay_s: 0.05,
        }
    }
}

impl CameraGate {
    /// Create a gate over the given motion guard.
    pub fn new(guard: Arc<MotionGuard>, params: CameraGateParams) -> Self {
        Self { guard, params }
    }

    /// Perform a gated read: apply the policy, flush stale snapshots, then
    /// return the latest frame re-encoded for delivery.
    pub fn acquire(
        &self,
        source: &FrameSource,
        policy: GatePolicy,
    ) -> Result<JpegFrame, CameraGateError> {
        match policy {
            GatePolicy::FailFast => self.check_now()?,
            GatePolicy::Wait => self.wait_until_stable()?,
        }

        self.flush(source);

        let frame = source.read()?;
        Ok(frame_source::encode_jpeg(&frame)?)
    }

    /// Fail-fast eligibility check against the current guard state.
    fn check_now(&self) -> Result<(), CameraGateError> {
        let snap = self.guard.snapshot();

        if snap.moving {
            debug!("Camera read rejected: motion in progress");
            return Err(CameraGateError::Locked);
        }

        if self.remaining_window(&snap).is_some() {
            debug!("Camera read rejected: inside stabilization window");
            return Err(CameraGateError::Stabilising);
        }

        Ok(())
    }

    /// Wait-policy eligibility: block until stopped and stabilised.
    ///
    /// The wait timeout bounds only the wait for motion to end. Once the
    /// robot has stopped the remaining stabilization window is slept out
    /// even if that runs past the deadline, so a motion ending inside the
    /// timeout always lets the read through. A new motion can start during
    /// the sleep, in which case the loop waits for it under what is left of
    /// the deadline.
    fn wait_until_stable(&self) -> Result<(), CameraGateError> {
        let deadline = Instant::now() + Duration::from_secs_f64(self.params.wait_timeout_s);

        loop {
            let now = Instant::now();
            let snap = if now < deadline {
                match self.guard.wait_until_stopped(deadline - now) {
                    Some(s) => s,
                    None => return Err(CameraGateError::WaitTimeout),
                }
            } else {
                let snap = self.guard.snapshot();
                if snap.moving {
                    return Err(CameraGateError::WaitTimeout);
                }
                snap
            };

            match self.remaining_window(&snap) {
                None => return Ok(()),
                Some(remaining) => {
                    trace!("Sleeping {:?} of stabilization window", remaining);
                    std::thread::sleep(remaining);
                }
            }
        }
    }

    /// Time left inside the stabilization window, `None` if outside it.
    fn remaining_window(&self, snap: &MotionSnapshot) -> Option<Duration> {
        let last_stop = snap.last_stop?;
        let window = Duration::from_secs_f64(self.params.stab_window_s);
        let elapsed = last_stop.elapsed();

        let outside = if self.params.boundary_exclusive {
            elapsed >= window
        } else {
            elapsed > window
        };

        if outside {
            None
        } else {
            Some(window - elapsed)
        }
    }

    /// Discard buffered snapshots which may predate the end of motion.
    fn flush(&self, source: &FrameSource) {
        for _ in 0..self.params.flush_frames {
            let _ = source.read();
            if self.params.flush_delay_s > 0.0 {
                std::thread::sleep(Duration::from_secs_f64(self.params.flush_delay_s));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::frame_source::test::FakeCapture;
    use std::thread;

    /// A gate with short windows for test speed, over a fresh guard.
    fn gate(stab_window_s: f64, wait_timeout_s: f64) -> CameraGate {
        CameraGate::new(
            Arc::new(MotionGuard::new()),
            CameraGateParams {
                stab_window_s,
                wait_timeout_s,
                boundary_exclusive: true,
                flush_frames: 2,
                flush_delay_s: 0.0,
            },
        )
    }

    /// A healthy frame source producing fake frames every millisecond.
    fn healthy_source() -> FrameSource {
        let source = FrameSource::start(FakeCapture::new(None), Duration::from_millis(1)).unwrap();
        source
            .wait_for_frame(Duration::from_secs(1))
            .expect("fake capture should produce frames");
        source
    }

    #[test]
    fn test_fail_fast_locked_while_moving() {
        let gate = gate(0.5, 15.0);
        let source = healthy_source();

        let _permit = gate.guard.begin().unwrap();

        assert!(matches!(
            gate.acquire(&source, GatePolicy::FailFast),
            Err(CameraGateError::Locked)
        ));
    }

    #[test]
    fn test_fail_fast_stabilising_after_motion() {
        let gate = gate(0.5, 15.0);
        let source = healthy_source();

        // Motion ends now; a read shortly after is inside the window
        drop(gate.guard.begin().unwrap());
        thread::sleep(Duration::from_millis(100));

        assert!(matches!(
            gate.acquire(&source, GatePolicy::FailFast),
            Err(CameraGateError::Stabilising)
        ));

        // Outside the window the read succeeds
        thread::sleep(Duration::from_millis(450));
        assert!(matches!(
            gate.acquire(&source, GatePolicy::FailFast),
            Err(CameraGateError::Source(FrameSourceError::EncodeError(_)))
        ));
    }

    #[test]
    fn test_fail_fast_proceeds_when_never_moved() {
        let gate = gate(0.5, 15.0);
        let source = healthy_source();

        // Fake frames aren't valid JPEG, so passing the gate surfaces the
        // encode step
        assert!(matches!(
            gate.acquire(&source, GatePolicy::FailFast),
            Err(CameraGateError::Source(FrameSourceError::EncodeError(_)))
        ));
    }

    #[test]
    fn test_wait_sleeps_out_stabilization_window() {
        let gate = gate(0.5, 15.0);
        let source = healthy_source();

        // Motion ends at t=0; the read arrives at t=0.2 and must not pass
        // the gate before ~t=0.5
        drop(gate.guard.begin().unwrap());
        thread::sleep(Duration::from_millis(200));

        let start = Instant::now();
        let result = gate.acquire(&source, GatePolicy::Wait);
        let elapsed = start.elapsed();

        assert!(matches!(
            result,
            Err(CameraGateError::Source(FrameSourceError::EncodeError(_)))
        ));
        assert!(elapsed >= Duration::from_millis(250));
        assert!(elapsed < Duration::from_millis(600));
    }

    #[test]
    fn test_wait_blocks_until_motion_ends() {
        let gate = Arc::new(gate(0.1, 15.0));
        let source = healthy_source();

        let permit = gate.guard.begin().unwrap();

        let g = gate.clone();
        let reader = thread::spawn(move || {
            let start = Instant::now();
            let result = g.acquire(&healthy_source(), GatePolicy::Wait);
            (result, start.elapsed())
        });

        thread::sleep(Duration::from_millis(300));
        drop(permit);

        let (result, elapsed) = reader.join().unwrap();
        assert!(matches!(
            result,
            Err(CameraGateError::Source(FrameSourceError::EncodeError(_)))
        ));
        // Waited for motion end plus the stabilization window
        assert!(elapsed >= Duration::from_millis(350));
        drop(source);
    }

    #[test]
    fn test_wait_stabilization_may_outlast_timeout() {
        // Motion ends inside the timeout, but the remaining stabilization
        // window runs past it. The read must still pass the gate rather
        // than time out.
        let gate = Arc::new(gate(0.5, 0.4));
        let source = healthy_source();

        let permit = gate.guard.begin().unwrap();

        let g = gate.clone();
        let reader = thread::spawn(move || {
            let start = Instant::now();
            let result = g.acquire(&healthy_source(), GatePolicy::Wait);
            (result, start.elapsed())
        });

        thread::sleep(Duration::from_millis(200));
        drop(permit);

        let (result, elapsed) = reader.join().unwrap();
        assert!(matches!(
            result,
            Err(CameraGateError::Source(FrameSourceError::EncodeError(_)))
        ));
        // Motion end plus the full window lands past the 0.4 s timeout
        assert!(elapsed >= Duration::from_millis(550));
        assert!(elapsed < Duration::from_millis(1500));
        drop(source);
    }

    #[test]
    fn test_wait_times_out_when_motion_never_ends() {
        let gate = gate(0.5, 0.3);
        let source = healthy_source();

        let _permit = gate.guard.begin().unwrap();

        let start = Instant::now();
        let result = gate.acquire(&source, GatePolicy::Wait);
        let elapsed = start.elapsed();

        assert!(matches!(result, Err(CameraGateError::WaitTimeout)));
        assert!(elapsed >= Duration::from_millis(300));
        assert!(elapsed < Duration::from_secs(2));
    }

    #[test]
    fn test_dead_source_surfaces_camera_unavailable() {
        let gate = gate(0.5, 15.0);
        let source = FrameSource::start(FakeCapture::new(Some(0)), Duration::from_millis(1)).unwrap();
        thread::sleep(Duration::from_millis(50));

        assert!(matches!(
            gate.acquire(&source, GatePolicy::FailFast),
            Err(CameraGateError::Source(FrameSourceError::CameraUnavailable(
                _
            )))
        ));
    }
}

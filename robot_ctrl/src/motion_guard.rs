//! # Motion guard module
//!
//! The motion guard is the shared record of whether the robot is currently
//! executing a motion command, plus the instant at which the last motion
//! finished. Motion commands set the flag for their full physical duration,
//! and camera reads consult it before touching the frame buffer.
//!
//! The mutex here only ever wraps the flag read/write itself. The "robot is
//! moving" state persists across the hardware call through the flag, never by
//! holding the lock, so the critical sections stay a few instructions long.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use thiserror::Error;

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

/// Tracks whether a motion command is executing and when the last one ended.
///
/// The only way to set the moving flag is [`MotionGuard::begin`], which hands
/// back a [`MotionPermit`]. Dropping the permit clears the flag and stamps
/// the stop time, so the flag is released on every exit path, including a
/// panic in the wrapped hardware call.
pub struct MotionGuard {
    state: Mutex<MotionState>,

    /// Signalled on every motion end so waiters don't have to poll.
    stopped: Condvar,
}

/// The guarded state itself, only ever touched under the mutex.
struct MotionState {
    moving: bool,
    last_stop: Option<Instant>,
}

/// An atomic read of the guard's state.
#[derive(Debug, Clone, Copy)]
pub struct MotionSnapshot {
    /// True while a motion command is executing.
    pub moving: bool,

    /// When the last motion command finished, `None` if the robot has not
    /// moved since startup.
    pub last_stop: Option<Instant>,
}

/// Permit proving that the holder is the one in-flight motion command.
///
/// Created by [`MotionGuard::begin`], released on drop.
#[must_use = "dropping the permit immediately would end the motion at once"]
pub struct MotionPermit<'a> {
    guard: &'a MotionGuard,
}

// ---------------------------------------------------------------------------
// ENUMS
// ---------------------------------------------------------------------------

/// Errors which can occur when acquiring the [`MotionGuard`]
#[derive(Debug, Error)]
pub enum MotionGuardError {
    #[error("A motion command is already executing")]
    AlreadyMoving,
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl MotionGuard {
    /// Create a new guard with no motion in progress and no stop recorded.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MotionState {
                moving: false,
                last_stop: None,
            }),
            stopped: Condvar::new(),
        }
    }

    /// Mark the start of a motion command.
    ///
    /// Fails with [`MotionGuardError::AlreadyMoving`] if another motion
    /// command holds the permit, so two concurrent commands can never
    /// interleave their begin/end transitions.
    pub fn begin(&self) -> Result<MotionPermit<'_>, MotionGuardError> {
        let mut state = self.lock_state();

        if state.moving {
            return Err(MotionGuardError::AlreadyMoving);
        }

        state.moving = true;
        Ok(MotionPermit { guard: self })
    }

    /// Atomically read the moving flag and last stop time.
    pub fn snapshot(&self) -> MotionSnapshot {
        let state = self.lock_state();
        MotionSnapshot {
            moving: state.moving,
            last_stop: state.last_stop,
        }
    }

    /// Block until no motion is executing, or until `timeout` elapses.
    ///
    /// Returns the snapshot taken at the moment the robot was observed
    /// stopped, or `None` if the timeout elapsed first. Waiting is done on
    /// the guard's condvar, re-checking the flag on every wake, so a waiter
    /// that starts after a motion's begin cannot miss the paired end.
    pub fn wait_until_stopped(&self, timeout: Duration) -> Option<MotionSnapshot> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock_state();

        while state.moving {
            let now = Instant::now();
            if now >= deadline {
                return None;
            }

            let (next, _) = self
                .stopped
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            state = next;
        }

        Some(MotionSnapshot {
            moving: state.moving,
            last_stop: state.last_stop,
        })
    }

    /// Mark the end of the in-flight motion command.
    ///
    /// Only called from the permit's drop, keeping begin/end strictly paired.
    fn end(&self) {
        let mut state = self.lock_state();
        state.moving = false;
        state.last_stop = Some(Instant::now());
        drop(state);

        self.stopped.notify_all();
    }

    /// Lock the state, recovering from poisoning.
    ///
    /// The lock is only ever held over scalar reads/writes, so a poisoned
    /// lock still holds consistent data. Recovering here is what lets a
    /// permit drop clear the flag even during a panic unwind.
    fn lock_state(&self) -> MutexGuard<'_, MotionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MotionGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MotionPermit<'_> {
    fn drop(&mut self) {
        self.guard.end();
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_begin_end_pairing() {
        let guard = MotionGuard::new();
        assert!(!guard.snapshot().moving);
        assert!(guard.snapshot().last_stop.is_none());

        {
            let _permit = guard.begin().unwrap();
            assert!(guard.snapshot().moving);
        }

        let snap = guard.snapshot();
        assert!(!snap.moving);
        assert!(snap.last_stop.is_some());
    }

    #[test]
    fn test_overlapping_motion_rejected() {
        let guard = MotionGuard::new();
        let _permit = guard.begin().unwrap();

        assert!(matches!(guard.begin(), Err(MotionGuardError::AlreadyMoving)));
    }

    #[test]
    fn test_permit_released_on_panic() {
        let guard = Arc::new(MotionGuard::new());

        let g = guard.clone();
        let result = thread::spawn(move || {
            let _permit = g.begin().unwrap();
            panic!("simulated hardware fault");
        })
        .join();

        assert!(result.is_err());
        assert!(!guard.snapshot().moving);
        assert!(guard.snapshot().last_stop.is_some());
    }

    #[test]
    fn test_wait_observes_stop() {
        let guard = Arc::new(MotionGuard::new());
        let permit = guard.begin().unwrap();

        let g = guard.clone();
        let waiter = thread::spawn(move || g.wait_until_stopped(Duration::from_secs(5)));

        thread::sleep(Duration::from_millis(100));
        drop(permit);

        let snap = waiter.join().unwrap().expect("waiter should not time out");
        assert!(!snap.moving);
        assert!(snap.last_stop.is_some());
    }

    #[test]
    fn test_wait_times_out() {
        let guard = MotionGuard::new();
        let _permit = guard.begin().unwrap();

        let start = Instant::now();
        let result = guard.wait_until_stopped(Duration::from_millis(200));
        let elapsed = start.elapsed();

        assert!(result.is_none());
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_secs(2));
    }

    #[test]
    fn test_wait_returns_immediately_when_stopped() {
        let guard = MotionGuard::new();

        let start = Instant::now();
        assert!(guard.wait_until_stopped(Duration::from_secs(5)).is_some());
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}

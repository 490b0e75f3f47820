//! # Frame source module
//!
//! The frame source keeps a continuously refreshed copy of the newest camera
//! frame so a camera request never blocks on device I/O: a background thread
//! owns the capture device exclusively and publishes each frame as an
//! immutable snapshot into a shared slot. Readers clone the `Arc`, they never
//! see the mutable buffer.
//!
//! If the device dies the refresh thread exits and latches the source dead;
//! from then on every read deterministically fails with `CameraUnavailable`
//! rather than serving stale frames.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use chrono::Utc;
use log::{debug, info, warn};
use serde::Deserialize;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

// Internal
use robot_if::frame::JpegFrame;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Poll interval used while waiting for the first frame to appear.
const WARMUP_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// JPEG quality used when re-encoding frames for delivery.
const JPEG_QUALITY: u8 = 90;

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A capture device which can produce raw JPEG-compressed frames.
///
/// The V4L2 implementation is [`V4lCapture`]; tests substitute their own.
pub trait FrameCapture: Send {
    /// Capture the next frame, blocking until the device produces one.
    fn grab(&mut self) -> Result<Vec<u8>, CaptureError>;
}

// ---------------------------------------------------------------------------
// ENUMS
// ---------------------------------------------------------------------------

/// Errors which can occur in a [`FrameCapture`] implementation
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Could not open the capture device: {0}")]
    OpenError(String),

    #[error("Could not capture a frame: {0}")]
    CaptureFailed(String),
}

/// Errors which can occur when reading from the [`FrameSource`]
#[derive(Debug, Error)]
pub enum FrameSourceError {
    #[error("Could not open or read from the camera: {0}")]
    CameraUnavailable(String),

    #[error("Could not read a frame from the camera")]
    FrameUnavailable,

    #[error("Could not encode the frame: {0}")]
    EncodeError(String),
}

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

/// Parameters for the camera session
#[derive(Debug, Clone, Deserialize)]
pub struct CameraParams {
    /// Path to the V4L2 video device.
    pub video_device: String,

    /// Interval in seconds between refreshes of the frame buffer.
    pub refresh_interval_s: f64,

    /// Maximum time in seconds to wait for the first frame after opening
    /// the device.
    pub warmup_timeout_s: f64,
}

/// State shared between the refresh thread and readers.
struct Shared {
    /// The most recent frame, `None` until the first capture lands.
    latest: Mutex<Option<Arc<JpegFrame>>>,

    /// Cleared by the refresh thread when the device dies, and used to ask
    /// the thread to stop on drop.
    alive: AtomicBool,
}

/// A background-refreshed single-slot buffer of the newest camera frame.
pub struct FrameSource {
    shared: Arc<Shared>,

    join_handle: Option<thread::JoinHandle<()>>,
}

/// Lazily initialised process-lifetime camera session.
///
/// The capture device is only opened on the first camera request; once open
/// the frame source lives until the process exits.
pub struct CameraSession {
    params: CameraParams,

    source: Mutex<Option<Arc<FrameSource>>>,
}

/// V4L2 capture device backed by rscam.
pub struct V4lCapture {
    camera: rscam::Camera,
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl Default for CameraParams {
    fn default() -> Self {
        Self {
            video_device: "/dev/video0".into(),
            refresh_interval_s: 0.01,
            warmup_timeout_s: 2.0,
        }
    }
}

impl FrameSource {
    /// Start the refresh thread around an already opened capture device.
    pub fn start<C: FrameCapture + 'static>(
        mut capture: C,
        refresh_interval: Duration,
    ) -> Result<Self, FrameSourceError> {
        let shared = Arc::new(Shared {
            latest: Mutex::new(None),
            alive: AtomicBool::new(true),
        });

        let thread_shared = shared.clone();
        let join_handle = thread::Builder::new()
            .name("frame_source".into())
            .spawn(move || refresh_loop(&mut capture, &thread_shared, refresh_interval))
            .map_err(|e| {
                FrameSourceError::CameraUnavailable(format!(
                    "could not start the refresh thread: {}",
                    e
                ))
            })?;

        Ok(Self {
            shared,
            join_handle: Some(join_handle),
        })
    }

    /// Whether the capture device is still producing frames.
    pub fn alive(&self) -> bool {
        self.shared.alive.load(Ordering::Relaxed)
    }

    /// Get the latest frame snapshot without blocking on device I/O.
    pub fn read(&self) -> Result<Arc<JpegFrame>, FrameSourceError> {
        if !self.alive() {
            return Err(FrameSourceError::CameraUnavailable(
                "capture device stopped producing frames".into(),
            ));
        }

        self.shared
            .latest
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(FrameSourceError::FrameUnavailable)
    }

    /// Block until the first frame is available or the timeout elapses.
    ///
    /// Used once at session startup, while the device warms up.
    pub fn wait_for_frame(&self, timeout: Duration) -> Result<Arc<JpegFrame>, FrameSourceError> {
        let deadline = Instant::now() + timeout;

        loop {
            match self.read() {
                Ok(frame) => return Ok(frame),
                Err(FrameSourceError::FrameUnavailable) => {
                    if Instant::now() >= deadline {
                        return Err(FrameSourceError::FrameUnavailable);
                    }
                    thread::sleep(WARMUP_POLL_INTERVAL);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.shared.alive.store(false, Ordering::Relaxed);
        if let Some(handle) = self.join_handle.take() {
            handle.join().ok();
        }
    }
}

impl CameraSession {
    /// Create a session, without opening the device yet.
    pub fn new(params: CameraParams) -> Self {
        Self {
            params,
            source: Mutex::new(None),
        }
    }

    /// Get the frame source, opening the capture device on first use.
    ///
    /// A failed open is not cached: the next request retries the device.
    pub fn get_or_init(&self) -> Result<Arc<FrameSource>, FrameSourceError> {
        let mut slot = self.source.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(source) = slot.as_ref() {
            return Ok(source.clone());
        }

        info!("Initialising camera for the first time");

        let capture = V4lCapture::open(&self.params.video_device)
            .map_err(|e| FrameSourceError::CameraUnavailable(e.to_string()))?;

        let source = Arc::new(FrameSource::start(
            capture,
            Duration::from_secs_f64(self.params.refresh_interval_s),
        )?);

        source.wait_for_frame(Duration::from_secs_f64(self.params.warmup_timeout_s))?;

        *slot = Some(source.clone());
        Ok(source)
    }
}

impl V4lCapture {
    /// Open and start the given V4L2 device in 640x480 MJPG mode.
    pub fn open(device: &str) -> Result<Self, CaptureError> {
        let mut camera =
            rscam::Camera::new(device).map_err(|e| CaptureError::OpenError(e.to_string()))?;

        camera
            .start(&rscam::Config {
                interval: (1, 30),
                resolution: (640, 480),
                format: b"MJPG",
                ..Default::default()
            })
            .map_err(|e| CaptureError::OpenError(format!("{:?}", e)))?;

        Ok(Self { camera })
    }
}

impl FrameCapture for V4lCapture {
    fn grab(&mut self) -> Result<Vec<u8>, CaptureError> {
        let frame = self
            .camera
            .capture()
            .map_err(|e| CaptureError::CaptureFailed(e.to_string()))?;

        Ok(frame.to_vec())
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Re-encode a raw captured frame as a clean baseline JPEG.
///
/// Device MJPG frames are not always well-formed JPEG files, so frames are
/// decoded and re-encoded before delivery to a client.
pub fn encode_jpeg(frame: &JpegFrame) -> Result<JpegFrame, FrameSourceError> {
    let image = image::load_from_memory_with_format(&frame.data, image::ImageFormat::Jpeg)
        .map_err(|e| FrameSourceError::EncodeError(e.to_string()))?;

    let mut data = Cursor::new(Vec::new());
    image
        .write_to(&mut data, image::ImageOutputFormat::Jpeg(JPEG_QUALITY))
        .map_err(|e| FrameSourceError::EncodeError(e.to_string()))?;

    Ok(JpegFrame {
        timestamp: frame.timestamp,
        data: data.into_inner(),
    })
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Body of the refresh thread: pull the newest frame into the shared slot
/// until the device fails or the source is dropped.
fn refresh_loop<C: FrameCapture>(capture: &mut C, shared: &Shared, interval: Duration) {
    debug!("Frame refresh thread started");

    while shared.alive.load(Ordering::Relaxed) {
        match capture.grab() {
            Ok(data) => {
                let frame = Arc::new(JpegFrame {
                    timestamp: Utc::now(),
                    data,
                });

                *shared.latest.lock().unwrap_or_else(|e| e.into_inner()) = Some(frame);
            }
            Err(e) => {
                warn!("Capture device failed, stopping refresh thread: {}", e);
                shared.alive.store(false, Ordering::Relaxed);
                break;
            }
        }

        thread::sleep(interval);
    }

    debug!("Frame refresh thread exited");
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod test {
    use super::*;

    /// Capture which produces numbered fake frames, optionally dying after
    /// a set number of grabs.
    pub(crate) struct FakeCapture {
        counter: u8,
        fail_after: Option<u8>,
    }

    impl FakeCapture {
        pub(crate) fn new(fail_after: Option<u8>) -> Self {
            Self {
                counter: 0,
                fail_after,
            }
        }
    }

    impl FrameCapture for FakeCapture {
        fn grab(&mut self) -> Result<Vec<u8>, CaptureError> {
            if let Some(limit) = self.fail_after {
                if self.counter >= limit {
                    return Err(CaptureError::CaptureFailed("device gone".into()));
                }
            }
            self.counter = self.counter.wrapping_add(1);
            Ok(vec![self.counter])
        }
    }

    #[test]
    fn test_read_returns_latest_snapshot() {
        let source = FrameSource::start(FakeCapture::new(None), Duration::from_millis(1)).unwrap();

        let first = source
            .wait_for_frame(Duration::from_secs(1))
            .expect("expected a frame during warmup");
        assert!(!first.data.is_empty());

        // The buffer refreshes behind our back
        thread::sleep(Duration::from_millis(50));
        let later = source.read().unwrap();
        assert!(later.data[0] > first.data[0]);
    }

    #[test]
    fn test_dead_device_latches_unavailable() {
        let source = FrameSource::start(FakeCapture::new(Some(3)), Duration::from_millis(1)).unwrap();

        // Give the refresh thread time to hit the failure
        thread::sleep(Duration::from_millis(100));

        assert!(!source.alive());
        assert!(matches!(
            source.read(),
            Err(FrameSourceError::CameraUnavailable(_))
        ));

        // And it stays that way
        assert!(matches!(
            source.read(),
            Err(FrameSourceError::CameraUnavailable(_))
        ));
    }

    #[test]
    fn test_warmup_timeout() {
        // A device that dies immediately never produces a frame
        let source = FrameSource::start(FakeCapture::new(Some(0)), Duration::from_millis(1)).unwrap();
        thread::sleep(Duration::from_millis(50));

        assert!(matches!(
            source.wait_for_frame(Duration::from_millis(100)),
            Err(FrameSourceError::CameraUnavailable(_))
        ));
    }

    #[test]
    fn test_encode_rejects_garbage() {
        let frame = JpegFrame {
            timestamp: Utc::now(),
            data: vec![1, 2, 3, 4],
        };

        assert!(matches!(
            encode_jpeg(&frame),
            Err(FrameSourceError::EncodeError(_))
        ));
    }

    #[test]
    fn test_encode_valid_jpeg() {
        // Build a tiny valid JPEG to feed through the encoder
        let img = image::DynamicImage::ImageRgb8(image::RgbImage::new(4, 4));
        let mut data = Cursor::new(Vec::new());
        img.write_to(&mut data, image::ImageOutputFormat::Jpeg(90))
            .unwrap();

        let frame = JpegFrame {
            timestamp: Utc::now(),
            data: data.into_inner(),
        };

        let encoded = encode_jpeg(&frame).unwrap();
        assert!(!encoded.data.is_empty());
        assert_eq!(encoded.timestamp, frame.timestamp);
    }
}

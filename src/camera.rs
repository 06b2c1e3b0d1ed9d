//! Camera lifecycle and still-frame capture.
//!
//! This module owns the camera device for one capture session: opening the
//! stream, gating the shoot control on stream readiness, extracting a still
//! frame as an encoded JPEG, and releasing every track on teardown.

use crate::config::CaptureConfig;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that end the camera session. None of these is retried
/// automatically; each maps to a distinct user-facing message.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CameraError {
    #[error("Camera is not supported in this execution context")]
    Unsupported,

    #[error("Camera permission denied")]
    Denied,

    #[error("No camera device available")]
    NoDevice,

    #[error("Camera device is busy")]
    Busy,
}

impl CameraError {
    /// Guidance shown to the user for this failure.
    pub fn user_message(&self) -> &'static str {
        match self {
            CameraError::Unsupported => {
                "The camera can only be used over a secure (HTTPS) connection in a supported browser."
            }
            CameraError::Denied => {
                "Camera access was denied. Please allow camera access in your browser's site settings."
            }
            CameraError::NoDevice => "No usable camera device was found.",
            CameraError::Busy => {
                "The camera could not be started. Check whether another app is using it."
            }
        }
    }
}

/// Recoverable failures of the shoot action. The caller re-enables the
/// shoot control and prompts a retry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Camera stream is not ready")]
    NotReady,

    #[error("Shoot control is disabled")]
    Disabled,

    #[error("Still frame encoding failed: {0}")]
    EncodeFailed(String),
}

impl CaptureError {
    /// Guidance shown to the user for this failure.
    pub fn user_message(&self) -> &'static str {
        match self {
            CaptureError::NotReady => {
                "The camera is not ready yet. Please try again in a moment."
            }
            CaptureError::Disabled => "A capture is already in progress.",
            CaptureError::EncodeFailed(_) => {
                "The photo could not be processed. Please try again."
            }
        }
    }
}

/// Signal that unlocked the shoot control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Stream reported its metadata.
    Metadata,
    /// First frame arrived before any metadata event.
    FirstFrame,
    /// Neither signal arrived within the configured bound; the control is
    /// enabled anyway and a not-ready shoot is handled as recoverable.
    FallbackTimer,
}

/// A raw frame snapshot from the open stream (RGB24).
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub data: Bytes,
    pub width: u32,
    pub height: u32,
}

/// An encoded still image ready for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StillImage {
    /// JPEG bytes.
    pub data: Bytes,
    /// Source frame width in pixels.
    pub width: u32,
    /// Source frame height in pixels.
    pub height: u32,
}

impl StillImage {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Statistics for the capture session.
#[derive(Debug, Default, Clone)]
pub struct CaptureStats {
    pub stills_captured: u64,
    pub not_ready_rejections: u64,
    pub encode_failures: u64,
    pub last_capture_at: Option<Instant>,
}

/// Camera device backend. The real backend lives outside this crate;
/// tests substitute fakes.
#[async_trait::async_trait]
pub trait CameraDevice: Send {
    /// Acquire the stream. Errors are terminal for the session.
    async fn open(&mut self) -> Result<(), CameraError>;

    /// Resolve when the stream signals readiness (metadata or first
    /// frame). `None` means the stream will never signal.
    async fn await_readiness(&mut self) -> Option<Readiness>;

    /// Snapshot the current frame. A stream that has produced no frame
    /// yet reports zero dimensions rather than an error.
    fn grab_frame(&mut self) -> Result<RawFrame, CaptureError>;

    /// Stop every track backing the stream. Must be idempotent.
    fn stop_tracks(&mut self);

    fn is_open(&self) -> bool;
}

/// Owns the camera device and the shoot gate for one capture session.
pub struct CaptureController<D: CameraDevice> {
    device: D,
    config: CaptureConfig,
    shoot_enabled: AtomicBool,
    submission_in_flight: AtomicBool,
    stream_open: AtomicBool,
    stats: RwLock<CaptureStats>,
}

impl<D: CameraDevice> CaptureController<D> {
    /// Create a controller around a closed device.
    pub fn new(device: D, config: CaptureConfig) -> Self {
        Self {
            device,
            config,
            shoot_enabled: AtomicBool::new(false),
            submission_in_flight: AtomicBool::new(false),
            stream_open: AtomicBool::new(false),
            stats: RwLock::new(CaptureStats::default()),
        }
    }

    /// Whether the shoot control is currently enabled.
    pub fn shoot_enabled(&self) -> bool {
        self.shoot_enabled.load(Ordering::SeqCst)
    }

    /// Whether the stream is open.
    pub fn is_open(&self) -> bool {
        self.stream_open.load(Ordering::SeqCst)
    }

    /// Get current capture statistics.
    pub fn stats(&self) -> CaptureStats {
        self.stats.read().clone()
    }

    /// Open the stream and wait for a readiness signal, bounded by the
    /// configured fallback timer. The shoot control is enabled on return.
    pub async fn open(&mut self) -> Result<Readiness, CameraError> {
        self.device.open().await?;
        self.stream_open.store(true, Ordering::SeqCst);

        let readiness = match tokio::time::timeout(
            self.config.readiness_fallback(),
            self.device.await_readiness(),
        )
        .await
        {
            Ok(Some(signal)) => signal,
            Ok(None) | Err(_) => {
                warn!("No readiness signal within bound, enabling shoot anyway");
                Readiness::FallbackTimer
            }
        };

        self.shoot_enabled.store(true, Ordering::SeqCst);
        info!(readiness = ?readiness, "Camera stream open");
        Ok(readiness)
    }

    /// Extract and encode a still frame.
    ///
    /// Disables the shoot control on entry. On any failure the control is
    /// re-enabled before returning; on success it stays disabled until
    /// [`complete_submission`](Self::complete_submission) so at most one
    /// submission is in flight per camera session.
    pub fn capture_still(&mut self) -> Result<StillImage, CaptureError> {
        if self.submission_in_flight.load(Ordering::SeqCst) {
            return Err(CaptureError::Disabled);
        }
        if !self.shoot_enabled.swap(false, Ordering::SeqCst) {
            return Err(CaptureError::Disabled);
        }

        let frame = match self.device.grab_frame() {
            Ok(frame) => frame,
            Err(e) => {
                self.reopen_gate();
                return Err(e);
            }
        };

        if frame.width == 0 || frame.height == 0 {
            self.stats.write().not_ready_rejections += 1;
            self.reopen_gate();
            debug!("Frame has zero dimensions, shoot rejected as not ready");
            return Err(CaptureError::NotReady);
        }

        let encoded = match encode_jpeg(&frame, self.config.jpeg_quality) {
            Ok(data) => data,
            Err(e) => {
                self.stats.write().encode_failures += 1;
                self.reopen_gate();
                return Err(e);
            }
        };

        self.submission_in_flight.store(true, Ordering::SeqCst);

        {
            let mut stats = self.stats.write();
            stats.stills_captured += 1;
            stats.last_capture_at = Some(Instant::now());
        }

        debug!(
            width = frame.width,
            height = frame.height,
            jpeg_bytes = encoded.len(),
            "Still frame captured"
        );

        Ok(StillImage {
            data: encoded,
            width: frame.width,
            height: frame.height,
        })
    }

    /// Mark the in-flight submission finished and re-enable the shoot
    /// control. Called on every submission exit path, success or failure.
    pub fn complete_submission(&self) {
        self.submission_in_flight.store(false, Ordering::SeqCst);
        if self.stream_open.load(Ordering::SeqCst) {
            self.shoot_enabled.store(true, Ordering::SeqCst);
        }
    }

    /// Stop every track and close the session.
    pub fn close(&mut self) {
        if self.stream_open.swap(false, Ordering::SeqCst) {
            info!("Stopping camera tracks");
            self.device.stop_tracks();
        }
        self.shoot_enabled.store(false, Ordering::SeqCst);
        self.submission_in_flight.store(false, Ordering::SeqCst);
    }

    fn reopen_gate(&self) {
        if self.stream_open.load(Ordering::SeqCst) {
            self.shoot_enabled.store(true, Ordering::SeqCst);
        }
    }
}

impl<D: CameraDevice> Drop for CaptureController<D> {
    fn drop(&mut self) {
        if self.stream_open.swap(false, Ordering::SeqCst) {
            self.device.stop_tracks();
        }
    }
}

/// Encode an RGB24 frame as JPEG at the given quality.
fn encode_jpeg(frame: &RawFrame, quality: u8) -> Result<Bytes, CaptureError> {
    let expected = frame.width as usize * frame.height as usize * 3;
    if frame.data.len() != expected {
        return Err(CaptureError::EncodeFailed(format!(
            "frame buffer is {} bytes, expected {} for {}x{} RGB24",
            frame.data.len(),
            expected,
            frame.width,
            frame.height
        )));
    }

    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality)
        .encode(&frame.data, frame.width, frame.height, ExtendedColorType::Rgb8)
        .map_err(|e| CaptureError::EncodeFailed(e.to_string()))?;

    Ok(Bytes::from(out))
}

#[cfg(test)]
pub(crate) mod test_device {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::time::Duration;

    /// Scriptable camera backend for tests.
    pub(crate) struct FakeDevice {
        pub open_error: Option<CameraError>,
        pub readiness: Option<Readiness>,
        pub frame_width: u32,
        pub frame_height: u32,
        pub open: bool,
        pub stop_calls: Arc<AtomicUsize>,
    }

    impl FakeDevice {
        pub fn ready(width: u32, height: u32) -> Self {
            Self {
                open_error: None,
                readiness: Some(Readiness::Metadata),
                frame_width: width,
                frame_height: height,
                open: false,
                stop_calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub fn failing(error: CameraError) -> Self {
            Self {
                open_error: Some(error),
                ..Self::ready(0, 0)
            }
        }

        pub fn silent(width: u32, height: u32) -> Self {
            Self {
                readiness: None,
                ..Self::ready(width, height)
            }
        }
    }

    #[async_trait::async_trait]
    impl CameraDevice for FakeDevice {
        async fn open(&mut self) -> Result<(), CameraError> {
            if let Some(e) = self.open_error.clone() {
                return Err(e);
            }
            self.open = true;
            Ok(())
        }

        async fn await_readiness(&mut self) -> Option<Readiness> {
            match self.readiness {
                Some(signal) => Some(signal),
                None => {
                    // Outlast any test fallback bound.
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    None
                }
            }
        }

        fn grab_frame(&mut self) -> Result<RawFrame, CaptureError> {
            let len = self.frame_width as usize * self.frame_height as usize * 3;
            Ok(RawFrame {
                data: Bytes::from(vec![127u8; len]),
                width: self.frame_width,
                height: self.frame_height,
            })
        }

        fn stop_tracks(&mut self) {
            self.open = false;
            self.stop_calls.fetch_add(1, Ordering::SeqCst);
        }

        fn is_open(&self) -> bool {
            self.open
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_device::FakeDevice;
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn create_test_config() -> CaptureConfig {
        CaptureConfig {
            jpeg_quality: 92,
            readiness_fallback_ms: 20,
        }
    }

    #[tokio::test]
    async fn test_open_enables_shoot_on_metadata() {
        let mut controller =
            CaptureController::new(FakeDevice::ready(64, 48), create_test_config());
        assert!(!controller.shoot_enabled());

        let readiness = controller.open().await.unwrap();
        assert_eq!(readiness, Readiness::Metadata);
        assert!(controller.shoot_enabled());
        assert!(controller.is_open());
    }

    #[tokio::test]
    async fn test_open_falls_back_to_timer() {
        let mut controller =
            CaptureController::new(FakeDevice::silent(64, 48), create_test_config());
        let readiness = controller.open().await.unwrap();
        assert_eq!(readiness, Readiness::FallbackTimer);
        assert!(controller.shoot_enabled());
    }

    #[tokio::test]
    async fn test_open_maps_device_errors() {
        let mut controller = CaptureController::new(
            FakeDevice::failing(CameraError::Denied),
            create_test_config(),
        );
        let err = controller.open().await.unwrap_err();
        assert_eq!(err, CameraError::Denied);
        assert!(!controller.shoot_enabled());
        assert!(!controller.is_open());
    }

    #[test]
    fn test_distinct_user_messages_per_camera_error() {
        let messages = [
            CameraError::Unsupported.user_message(),
            CameraError::Denied.user_message(),
            CameraError::NoDevice.user_message(),
            CameraError::Busy.user_message(),
        ];
        for (i, a) in messages.iter().enumerate() {
            for b in &messages[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[tokio::test]
    async fn test_capture_produces_jpeg() {
        let mut controller =
            CaptureController::new(FakeDevice::ready(64, 48), create_test_config());
        controller.open().await.unwrap();

        let still = controller.capture_still().unwrap();
        assert_eq!(still.width, 64);
        assert_eq!(still.height, 48);
        // JPEG SOI marker
        assert_eq!(&still.data[..2], &[0xFF, 0xD8]);
        assert_eq!(controller.stats().stills_captured, 1);
    }

    #[tokio::test]
    async fn test_zero_dimension_frame_is_not_ready() {
        let mut controller =
            CaptureController::new(FakeDevice::ready(0, 0), create_test_config());
        controller.open().await.unwrap();

        let err = controller.capture_still().unwrap_err();
        assert_eq!(err, CaptureError::NotReady);
        // Recoverable: the gate reopens for a retry.
        assert!(controller.shoot_enabled());
        assert_eq!(controller.stats().not_ready_rejections, 1);
    }

    #[tokio::test]
    async fn test_shoot_disabled_while_submission_in_flight() {
        let mut controller =
            CaptureController::new(FakeDevice::ready(64, 48), create_test_config());
        controller.open().await.unwrap();

        controller.capture_still().unwrap();
        assert!(!controller.shoot_enabled());
        assert_eq!(
            controller.capture_still().unwrap_err(),
            CaptureError::Disabled
        );

        controller.complete_submission();
        assert!(controller.shoot_enabled());
        assert!(controller.capture_still().is_ok());
    }

    #[tokio::test]
    async fn test_capture_before_open_is_disabled() {
        let mut controller =
            CaptureController::new(FakeDevice::ready(64, 48), create_test_config());
        assert_eq!(
            controller.capture_still().unwrap_err(),
            CaptureError::Disabled
        );
    }

    #[tokio::test]
    async fn test_close_stops_tracks() {
        let device = FakeDevice::ready(64, 48);
        let stop_calls = device.stop_calls.clone();
        let mut controller = CaptureController::new(device, create_test_config());
        controller.open().await.unwrap();

        controller.close();
        assert_eq!(stop_calls.load(Ordering::SeqCst), 1);
        assert!(!controller.shoot_enabled());

        // Idempotent: a second close does not stop tracks again.
        controller.close();
        assert_eq!(stop_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_drop_stops_open_tracks_exactly_once() {
        let stop_calls = Arc::new(AtomicUsize::new(0));
        {
            let mut device = FakeDevice::ready(64, 48);
            device.stop_calls = stop_calls.clone();
            let mut controller = CaptureController::new(device, create_test_config());
            controller.open().await.unwrap();
        }
        assert_eq!(stop_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_drop_after_close_does_not_double_stop() {
        let stop_calls = Arc::new(AtomicUsize::new(0));
        {
            let mut device = FakeDevice::ready(64, 48);
            device.stop_calls = stop_calls.clone();
            let mut controller = CaptureController::new(device, create_test_config());
            controller.open().await.unwrap();
            controller.close();
        }
        assert_eq!(stop_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_encode_rejects_short_buffer() {
        let frame = RawFrame {
            data: Bytes::from(vec![0u8; 10]),
            width: 64,
            height: 48,
        };
        assert!(matches!(
            encode_jpeg(&frame, 92),
            Err(CaptureError::EncodeFailed(_))
        ));
    }
}

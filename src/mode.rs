//! Capture mode selection.
//!
//! Two mutually exclusive capture intents share one camera session: barcode
//! scanning and nutrition-label OCR. Switching retargets the submission
//! endpoint and the instructional text without touching the camera stream.

use tracing::debug;

/// Capture intent for the current camera session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CaptureMode {
    #[default]
    Barcode,
    Label,
}

impl CaptureMode {
    /// Wire value sent with the submission.
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureMode::Barcode => "barcode",
            CaptureMode::Label => "label",
        }
    }

    /// Upload filename for the captured still.
    pub fn filename(&self) -> &'static str {
        match self {
            CaptureMode::Barcode => "barcode.jpg",
            CaptureMode::Label => "label.jpg",
        }
    }

    /// User-facing framing instruction shown over the preview.
    pub fn instruction(&self) -> &'static str {
        match self {
            CaptureMode::Barcode => "Line the barcode up inside the frame",
            CaptureMode::Label => "Line the nutrition label up inside the frame",
        }
    }

    /// Resolve the initial mode from whichever toggle control is marked
    /// active at load. Unknown or absent markers fall back to barcode.
    /// The legacy "nutrition" marker maps to the label mode.
    pub fn from_marker(marker: Option<&str>) -> Self {
        match marker.map(str::trim) {
            Some("label") | Some("nutrition") => CaptureMode::Label,
            _ => CaptureMode::Barcode,
        }
    }
}

impl std::fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a mode switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeChange {
    /// The mode now in effect.
    pub mode: CaptureMode,
    /// Whether in-flight candidate/job state must be reset. The camera
    /// stream is never restarted on a mode switch.
    pub reset_resolution_state: bool,
}

/// Tracks the active capture mode.
#[derive(Debug, Default)]
pub struct ModeSelector {
    current: CaptureMode,
}

impl ModeSelector {
    /// Create a selector from the initial toggle marker.
    pub fn new(marker: Option<&str>) -> Self {
        Self {
            current: CaptureMode::from_marker(marker),
        }
    }

    /// The active mode.
    pub fn current(&self) -> CaptureMode {
        self.current
    }

    /// Switch modes. A no-op switch reports nothing to reset.
    pub fn set_mode(&mut self, mode: CaptureMode) -> ModeChange {
        let changed = self.current != mode;
        self.current = mode;
        if changed {
            debug!(mode = %mode, "Capture mode switched");
        }
        ModeChange {
            mode,
            reset_resolution_state: changed,
        }
    }

    /// Instruction text for the active mode.
    pub fn instruction(&self) -> &'static str {
        self.current.instruction()
    }
}

//! Mealscan - capture-to-commit workflow engine for meal logging
//!
//! This library drives the client-side workflow that turns a photographed
//! product into a committed nutrition record:
//!
//! - Camera lifecycle and still-frame capture (barcode or nutrition label)
//! - Multipart submission to the resolution service with anti-forgery
//!   protection
//! - Typed routing of every server outcome (candidates, OCR job, scan
//!   failure, no match, transport failure)
//! - Single-selection candidate review with draft prefill
//! - Pre-commit validation of the four macro fields
//! - At-most-once commit with server-directed redirect
//!
//! # Example
//!
//! ```rust,no_run
//! use mealscan::prelude::*;
//! use std::sync::Arc;
//!
//! # struct Device;
//! # #[async_trait::async_trait]
//! # impl mealscan::camera::CameraDevice for Device {
//! #     async fn open(&mut self) -> Result<(), CameraError> { Ok(()) }
//! #     async fn await_readiness(&mut self) -> Option<mealscan::camera::Readiness> { None }
//! #     fn grab_frame(&mut self) -> Result<mealscan::camera::RawFrame, CaptureError> { Err(CaptureError::NotReady) }
//! #     fn stop_tracks(&mut self) {}
//! #     fn is_open(&self) -> bool { false }
//! # }
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = WorkflowConfig::from_env()?;
//!     let session = SessionContext::new("20260102", "L")?;
//!     let cookies = Arc::new(CookieJar::parse("csrftoken=...", "csrftoken"));
//!
//!     let mut workflow =
//!         CaptureWorkflow::new(config, session, Device, cookies, None)?;
//!     workflow.start_camera().await?;
//!     let transition = workflow.shoot().await?;
//!     println!("next: {:?}", transition);
//!     Ok(())
//! }
//! ```

pub mod camera;
pub mod candidate;
pub mod commit;
pub mod config;
pub mod draft;
pub mod mode;
pub mod router;
pub mod session;
pub mod submit;
pub mod workflow;

// Re-export main types
pub use camera::{
    CameraDevice, CameraError, CaptureController, CaptureError, CaptureStats, RawFrame,
    Readiness, StillImage,
};
pub use candidate::{
    Candidate, CandidateResolver, NutritionSource, PanelState, SelectionError,
    MANUAL_CONFIRMATION_ADVISORY,
};
pub use commit::{CommitClient, CommitError, CommitOutcome, CommitPayload, CommitStats, Selection};
pub use config::{
    init_logging, CaptureConfig, ConfigValidationError, HttpConfig, LoggingConfig,
    WorkflowConfig,
};
pub use draft::{NutritionDraft, ValidatedNutrition, ValidationResult};
pub use mode::{CaptureMode, ModeChange, ModeSelector};
pub use router::{manual_search_url, JobHandleStore, Transition, TRANSPORT_RETRY_MESSAGE};
pub use session::{SessionContext, SessionContextError, TimeSlot};
pub use submit::{
    CookieJar, FetchError, JobNutrition, JobResult, SubmissionClient, SubmissionResult,
    SubmissionStats, TokenProvider, TOKEN_MISSING_MESSAGE,
};
pub use workflow::{CaptureWorkflow, CommitRefused, WorkflowError, WorkflowState};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::camera::{CameraDevice, CameraError, CaptureError, StillImage};
    pub use crate::candidate::{Candidate, CandidateResolver};
    pub use crate::commit::{CommitOutcome, CommitPayload, Selection};
    pub use crate::config::WorkflowConfig;
    pub use crate::draft::{NutritionDraft, ValidationResult};
    pub use crate::mode::CaptureMode;
    pub use crate::router::Transition;
    pub use crate::session::{SessionContext, TimeSlot};
    pub use crate::submit::{CookieJar, SubmissionClient, SubmissionResult, TokenProvider};
    pub use crate::workflow::{CaptureWorkflow, WorkflowError, WorkflowState};
}

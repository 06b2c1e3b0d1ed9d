//! The capture-to-commit state machine.
//!
//! One workflow owns one camera session, one session context, and one
//! resolution attempt at a time. Every asynchronous boundary disables its
//! triggering control on entry and re-enables it on every failure exit,
//! which is the system's sole concurrency-control mechanism: at most one
//! in-flight operation per control, no queue, no lock.

use crate::camera::{CameraDevice, CameraError, CaptureController, Readiness};
use crate::candidate::{CandidateResolver, SelectionError};
use crate::commit::{
    CommitClient, CommitError, CommitOutcome, CommitPayload, Selection,
};
use crate::config::{ConfigValidationError, WorkflowConfig};
use crate::draft::{validate, NutritionDraft, ValidationResult};
use crate::mode::{CaptureMode, ModeSelector};
use crate::router::{route, JobHandleStore, Transition, TRANSPORT_RETRY_MESSAGE};
use crate::session::SessionContext;
use crate::submit::{SubmissionClient, TokenProvider};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

/// Workflow phases. Transitions are exactly the ones the methods below
/// perform; there is no other way to move between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    Idle,
    CameraReady,
    Capturing,
    Submitting,
    CandidateReview,
    AwaitingJob,
    Validating,
    Committing,
    Error,
}

/// Failures that end or refuse a workflow step.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Config(#[from] ConfigValidationError),

    #[error("Workflow client setup failed: {0}")]
    Setup(String),

    /// Unrecoverable for this screen; ends in a redirect, not a retry.
    #[error(transparent)]
    Camera(#[from] CameraError),

    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error("Action not available in state {0:?}")]
    InvalidState(WorkflowState),
}

/// Why a commit was refused before any network call.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommitRefused {
    #[error("Commit not available in state {0:?}")]
    WrongState(WorkflowState),

    #[error("No candidate or job selected")]
    NoSelection,

    #[error("Draft is invalid (missing: {missing_fields:?}, malformed: {malformed_fields:?})")]
    Invalid {
        missing_fields: Vec<&'static str>,
        malformed_fields: Vec<&'static str>,
    },

    #[error("A commit is already in flight")]
    InFlight,
}

/// The capture-to-commit workflow for one meal log entry.
pub struct CaptureWorkflow<D: CameraDevice> {
    session: SessionContext,
    mode: ModeSelector,
    camera: CaptureController<D>,
    submitter: SubmissionClient,
    committer: CommitClient,
    resolver: Option<CandidateResolver>,
    active_draft_id: Option<String>,
    jobs: JobHandleStore,
    draft: NutritionDraft,
    job_advisory: Option<String>,
    state: WorkflowState,
    workflow_id: Uuid,
}

impl<D: CameraDevice> CaptureWorkflow<D> {
    /// Wire a workflow from its collaborators. The session context is
    /// required by construction: a workflow without one cannot exist.
    pub fn new(
        config: WorkflowConfig,
        session: SessionContext,
        device: D,
        tokens: Arc<dyn TokenProvider>,
        initial_mode: Option<&str>,
    ) -> Result<Self, WorkflowError> {
        config.validate()?;

        let submitter = SubmissionClient::new(config.http.clone(), tokens.clone())
            .map_err(|e| WorkflowError::Setup(e.to_string()))?;
        let committer = CommitClient::new(config.http.clone(), tokens)
            .map_err(|e| WorkflowError::Setup(e.to_string()))?;
        let camera = CaptureController::new(device, config.capture.clone());

        let workflow_id = Uuid::new_v4();
        info!(
            workflow_id = %workflow_id,
            record_date = %session.record_date_compact(),
            time_slot = session.time_slot().code(),
            "Capture workflow created"
        );

        Ok(Self {
            session,
            mode: ModeSelector::new(initial_mode),
            camera,
            submitter,
            committer,
            resolver: None,
            active_draft_id: None,
            jobs: JobHandleStore::default(),
            draft: NutritionDraft::default(),
            job_advisory: None,
            state: WorkflowState::Idle,
            workflow_id,
        })
    }

    /// Current state.
    pub fn state(&self) -> WorkflowState {
        self.state
    }

    /// The session context anchoring this workflow.
    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    /// The active capture mode.
    pub fn mode(&self) -> CaptureMode {
        self.mode.current()
    }

    /// Framing instruction for the active mode.
    pub fn instruction(&self) -> &'static str {
        self.mode.instruction()
    }

    /// The nutrition draft under construction.
    pub fn draft(&self) -> &NutritionDraft {
        &self.draft
    }

    /// Mutable access for user edits to the draft fields.
    pub fn draft_mut(&mut self) -> &mut NutritionDraft {
        &mut self.draft
    }

    /// The candidate resolver, present while reviewing barcode matches.
    pub fn resolver(&self) -> Option<&CandidateResolver> {
        self.resolver.as_ref()
    }

    /// The non-blocking manual-confirmation advisory currently raised.
    pub fn advisory(&self) -> Option<&str> {
        match &self.resolver {
            Some(resolver) => resolver.panel().advisory,
            None => self.job_advisory.as_deref(),
        }
    }

    /// Whether the shoot control is enabled.
    pub fn shoot_enabled(&self) -> bool {
        self.camera.shoot_enabled()
    }

    /// Whether the camera stream is open.
    pub fn camera_open(&self) -> bool {
        self.camera.is_open()
    }

    /// Capture statistics for this camera session.
    pub fn capture_stats(&self) -> crate::camera::CaptureStats {
        self.camera.stats()
    }

    /// Submission statistics for this workflow.
    pub fn submission_stats(&self) -> crate::submit::SubmissionStats {
        self.submitter.stats()
    }

    /// Commit statistics for this workflow.
    pub fn commit_stats(&self) -> crate::commit::CommitStats {
        self.committer.stats()
    }

    /// Whether the commit control is enabled.
    pub fn commit_enabled(&self) -> bool {
        match self.state {
            WorkflowState::CandidateReview => self
                .resolver
                .as_ref()
                .map(|r| r.panel().commit_enabled)
                .unwrap_or(false),
            WorkflowState::Validating => true,
            _ => false,
        }
    }

    /// Open the camera stream. A camera failure is unrecoverable for this
    /// workflow and moves it to the error state.
    pub async fn start_camera(&mut self) -> Result<Readiness, WorkflowError> {
        if self.state != WorkflowState::Idle {
            return Err(WorkflowError::InvalidState(self.state));
        }

        match self.camera.open().await {
            Ok(readiness) => {
                self.state = WorkflowState::CameraReady;
                Ok(readiness)
            }
            Err(e) => {
                warn!(workflow_id = %self.workflow_id, error = %e, "Camera session failed");
                self.state = WorkflowState::Error;
                Err(e.into())
            }
        }
    }

    /// Switch capture modes. Resets any in-flight candidate/job state but
    /// never restarts the camera stream.
    pub fn set_mode(&mut self, mode: CaptureMode) {
        let change = self.mode.set_mode(mode);
        if !change.reset_resolution_state {
            return;
        }

        self.resolver = None;
        self.active_draft_id = None;
        self.jobs.clear();
        self.draft.clear();
        self.job_advisory = None;

        if matches!(
            self.state,
            WorkflowState::CandidateReview | WorkflowState::AwaitingJob | WorkflowState::Validating
        ) {
            self.state = if self.camera.is_open() {
                WorkflowState::CameraReady
            } else {
                WorkflowState::Idle
            };
        }
    }

    /// Capture a still and submit it for resolution.
    ///
    /// Recoverable capture failures (stream not ready, encode failure)
    /// come back as a retry-in-place transition with the shoot control
    /// re-enabled; they never end the workflow.
    pub async fn shoot(&mut self) -> Result<Transition, WorkflowError> {
        if self.state != WorkflowState::CameraReady {
            return Err(WorkflowError::InvalidState(self.state));
        }

        self.state = WorkflowState::Capturing;
        let still = match self.camera.capture_still() {
            Ok(still) => still,
            Err(e) => {
                self.state = WorkflowState::CameraReady;
                return Ok(Transition::RetryCapture {
                    message: e.user_message().to_string(),
                });
            }
        };

        self.state = WorkflowState::Submitting;
        let result = self
            .submitter
            .submit(&still, self.mode.current(), &self.session)
            .await;
        self.camera.complete_submission();

        let transition = route(result, &self.session, &mut self.jobs);
        self.apply_transition(transition).await
    }

    async fn apply_transition(
        &mut self,
        transition: Transition,
    ) -> Result<Transition, WorkflowError> {
        match transition {
            Transition::CandidateReview {
                draft_id,
                candidates,
            } => {
                let candidates = if candidates.is_empty() {
                    match self.submitter.fetch_candidates(&draft_id).await {
                        Ok(candidates) => candidates,
                        Err(e) => {
                            warn!(
                                workflow_id = %self.workflow_id,
                                draft_id = %draft_id,
                                error = %e,
                                "Candidate fetch failed"
                            );
                            self.state = WorkflowState::CameraReady;
                            return Ok(Transition::RetryCapture {
                                message: TRANSPORT_RETRY_MESSAGE.to_string(),
                            });
                        }
                    }
                } else {
                    candidates
                };

                self.draft.clear();
                self.job_advisory = None;
                self.resolver = Some(CandidateResolver::new(candidates.clone()));
                self.active_draft_id = Some(draft_id.clone());
                self.state = WorkflowState::CandidateReview;
                Ok(Transition::CandidateReview {
                    draft_id,
                    candidates,
                })
            }
            Transition::JobResult { job_id } => {
                self.draft.clear();
                self.resolver = None;
                self.active_draft_id = None;
                self.state = WorkflowState::AwaitingJob;
                Ok(Transition::JobResult { job_id })
            }
            Transition::RetryCapture { message } => {
                self.state = WorkflowState::CameraReady;
                Ok(Transition::RetryCapture { message })
            }
            Transition::ManualSearch { message, context } => {
                // Navigation away tears the capture screen down.
                self.camera.close();
                self.state = WorkflowState::Idle;
                Ok(Transition::ManualSearch { message, context })
            }
        }
    }

    /// Fetch the OCR parse for the stored job and prefill the draft.
    ///
    /// A fetch failure is recoverable: the draft stays empty, the
    /// advisory says so, and commit remains gated by the validator only.
    pub async fn load_job_result(&mut self) -> Result<(), WorkflowError> {
        if self.state != WorkflowState::AwaitingJob {
            return Err(WorkflowError::InvalidState(self.state));
        }
        let job_id = match self.jobs.current() {
            Some(job_id) => job_id.to_string(),
            None => return Err(WorkflowError::InvalidState(self.state)),
        };

        match self.submitter.fetch_job_result(&job_id).await {
            Ok(result) => {
                let nutrition = &result.nutrition;
                self.draft.kcal = optional_input(nutrition.kcal);
                self.draft.carb_g = optional_input(nutrition.carb_g);
                self.draft.protein_g = optional_input(nutrition.protein_g);
                self.draft.fat_g = optional_input(nutrition.fat_g);

                self.job_advisory = if result.missing_fields.is_empty() {
                    None
                } else {
                    Some(format!(
                        "Some nutrition values are missing — please enter them: {}",
                        result.missing_fields.join(", ")
                    ))
                };
            }
            Err(e) => {
                warn!(
                    workflow_id = %self.workflow_id,
                    job_id = %job_id,
                    error = %e,
                    "OCR result fetch failed"
                );
                self.draft.clear();
                self.job_advisory = Some(
                    "The scan result could not be loaded. Please enter the values manually."
                        .to_string(),
                );
            }
        }

        self.state = WorkflowState::Validating;
        Ok(())
    }

    /// Select a candidate for review. Radio semantics; prefills the draft.
    pub fn select_candidate(&mut self, candidate_id: &str) -> Result<(), WorkflowError> {
        if self.state != WorkflowState::CandidateReview {
            return Err(WorkflowError::InvalidState(self.state));
        }
        let resolver = self
            .resolver
            .as_mut()
            .ok_or(WorkflowError::InvalidState(WorkflowState::CandidateReview))?;
        resolver.select(candidate_id, &mut self.draft)?;
        Ok(())
    }

    /// Clear the candidate selection, restoring the pre-selection state.
    pub fn deselect_candidate(&mut self) -> Result<(), WorkflowError> {
        if self.state != WorkflowState::CandidateReview {
            return Err(WorkflowError::InvalidState(self.state));
        }
        if let Some(resolver) = self.resolver.as_mut() {
            resolver.deselect(&mut self.draft);
        }
        Ok(())
    }

    /// Validate the draft and submit the final record.
    ///
    /// Refused without a network call when nothing is selected or the
    /// draft fails validation; the refusal names the fields at fault. On
    /// rejection the draft and selection are preserved for a retry.
    pub async fn commit(&mut self) -> Result<CommitOutcome, CommitRefused> {
        let resume_state = match self.state {
            WorkflowState::CandidateReview => WorkflowState::CandidateReview,
            WorkflowState::Validating => WorkflowState::Validating,
            other => return Err(CommitRefused::WrongState(other)),
        };

        let mode = self.mode.current();
        let selection = match resume_state {
            WorkflowState::CandidateReview => {
                let candidate_id = self
                    .resolver
                    .as_ref()
                    .and_then(|r| r.current())
                    .map(|c| c.id.clone())
                    .ok_or(CommitRefused::NoSelection)?;
                let draft_id = self
                    .active_draft_id
                    .clone()
                    .ok_or(CommitRefused::NoSelection)?;
                Selection::Candidate {
                    draft_id,
                    candidate_id,
                }
            }
            _ => {
                let job_id = self
                    .jobs
                    .current()
                    .map(String::from)
                    .ok_or(CommitRefused::NoSelection)?;
                Selection::Job { job_id }
            }
        };

        self.state = WorkflowState::Validating;
        let nutrition = match validate(&self.draft, mode) {
            ValidationResult::Valid(nutrition) => nutrition,
            ValidationResult::Invalid {
                missing_fields,
                malformed_fields,
            } => {
                self.state = resume_state;
                return Err(CommitRefused::Invalid {
                    missing_fields,
                    malformed_fields,
                });
            }
        };

        self.state = WorkflowState::Committing;
        let payload = CommitPayload {
            session: self.session.clone(),
            source_mode: mode,
            selection,
            nutrition,
        };

        match self.committer.commit(&payload).await {
            Ok(CommitOutcome::Committed { redirect_url }) => {
                // Terminal: the redirect tears this screen down.
                self.camera.close();
                self.state = WorkflowState::Idle;
                Ok(CommitOutcome::Committed { redirect_url })
            }
            Ok(CommitOutcome::Rejected {
                message,
                missing_fields,
            }) => {
                self.state = resume_state;
                Ok(CommitOutcome::Rejected {
                    message,
                    missing_fields,
                })
            }
            Err(CommitError::AlreadyInFlight) => {
                self.state = resume_state;
                Err(CommitRefused::InFlight)
            }
            Err(CommitError::CreationFailed(message)) => {
                self.state = resume_state;
                Ok(CommitOutcome::Rejected {
                    message,
                    missing_fields: Vec::new(),
                })
            }
        }
    }

    /// Release the camera and reset to idle. Safe to call repeatedly.
    pub fn teardown(&mut self) {
        self.camera.close();
        self.state = WorkflowState::Idle;
    }
}

fn optional_input(value: Option<f64>) -> String {
    match value {
        Some(v) if v.fract() == 0.0 => format!("{}", v as i64),
        Some(v) => format!("{}", v),
        None => String::new(),
    }
}

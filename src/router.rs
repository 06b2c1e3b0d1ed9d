//! Resolution outcome routing.
//!
//! Given a normalized submission result, decides the next screen/state.
//! The routing match is total over the five-variant union; a new server
//! reason code must surface here as a compile error, not a fallthrough.

use crate::candidate::Candidate;
use crate::config::HttpConfig;
use crate::session::SessionContext;
use crate::submit::{SubmissionResult, TOKEN_MISSING_MESSAGE};
use tracing::{info, warn};

/// Generic message for transport failures; the underlying detail is
/// logged, never silently discarded.
pub const TRANSPORT_RETRY_MESSAGE: &str =
    "Something went wrong while submitting the photo. Please try again.";

/// Next step after a submission resolves.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Barcode path: review the candidate set.
    CandidateReview {
        draft_id: String,
        candidates: Vec<Candidate>,
    },
    /// Label path: hand off to the asynchronous job result view.
    JobResult { job_id: String },
    /// Stay on the capture screen with the shoot control re-enabled.
    RetryCapture { message: String },
    /// Leave for the manual-search entry point, carrying the session
    /// context so the user is not asked to re-establish it.
    ManualSearch {
        message: String,
        context: SessionContext,
    },
}

/// Session-scoped storage for the OCR job handle. Single slot: a new job
/// replaces whatever a previous attempt left behind.
#[derive(Debug, Default)]
pub struct JobHandleStore {
    current: Option<String>,
}

impl JobHandleStore {
    pub fn remember(&mut self, job_id: &str) {
        self.current = Some(job_id.to_string());
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn clear(&mut self) {
        self.current = None;
    }
}

/// Route a submission result to its transition.
///
/// `JobCreated` persists the job handle before the transition is
/// returned, so the result view can recover it after navigation.
pub fn route(
    result: SubmissionResult,
    ctx: &SessionContext,
    jobs: &mut JobHandleStore,
) -> Transition {
    match result {
        SubmissionResult::CandidatesReady {
            draft_id,
            candidates,
        } => {
            info!(draft_id = %draft_id, count = candidates.len(), "Routing to candidate review");
            Transition::CandidateReview {
                draft_id,
                candidates,
            }
        }
        SubmissionResult::JobCreated { job_id } => {
            jobs.remember(&job_id);
            info!(job_id = %job_id, "Routing to job result view");
            Transition::JobResult { job_id }
        }
        SubmissionResult::ScanFailed { message } => {
            info!("Scan failed, staying on capture screen");
            Transition::RetryCapture { message }
        }
        SubmissionResult::NoMatch { message } => {
            info!("No match, routing to manual search");
            Transition::ManualSearch {
                message,
                context: ctx.clone(),
            }
        }
        SubmissionResult::TransportError { detail } => {
            warn!(detail = %detail, "Transport failure, staying on capture screen");
            // The missing-token failure carries its own reload instruction;
            // every other transport detail stays in the logs.
            let message = if detail == TOKEN_MISSING_MESSAGE {
                detail
            } else {
                TRANSPORT_RETRY_MESSAGE.to_string()
            };
            Transition::RetryCapture { message }
        }
    }
}

/// Build the manual-search URL for a no-match transition.
pub fn manual_search_url(config: &HttpConfig, ctx: &SessionContext) -> String {
    format!(
        "{}?date={}&meal={}&focus=search",
        config.manual_search_path,
        ctx.display_date(),
        ctx.meal_label()
    )
}

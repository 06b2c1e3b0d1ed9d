//! Commit client for finalizing a resolved nutrition record.
//!
//! Exactly one network call per user click: an in-flight flag stands in
//! for the disabled commit control, so at-most-once semantics hold from
//! the client's perspective. On success the server is the sole source of
//! the redirect destination, with one documented fallback.

use crate::config::HttpConfig;
use crate::draft::ValidatedNutrition;
use crate::mode::CaptureMode;
use crate::session::SessionContext;
use crate::submit::{TokenProvider, TOKEN_MISSING_MESSAGE};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};

/// Generic failure message when the server offers none.
pub const COMMIT_FAILED_MESSAGE: &str = "The record could not be saved. Please try again.";

/// What the commit is anchored to on the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Barcode path: one candidate out of a server-held draft.
    Candidate {
        draft_id: String,
        candidate_id: String,
    },
    /// Label path: one completed OCR job.
    Job { job_id: String },
}

/// Everything the commit endpoint needs.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitPayload {
    pub session: SessionContext,
    pub source_mode: CaptureMode,
    pub selection: Selection,
    pub nutrition: ValidatedNutrition,
}

/// Terminal outcome of a commit attempt. The draft is preserved by the
/// caller on rejection so the user can retry without re-capturing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Persisted; navigate to the server-provided destination.
    Committed { redirect_url: String },
    /// Refused; re-enable the control and surface the message.
    Rejected {
        message: String,
        missing_fields: Vec<String>,
    },
}

/// Commit failures that never reach the network.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommitError {
    #[error("Failed to create commit client: {0}")]
    CreationFailed(String),

    #[error("A commit is already in flight")]
    AlreadyInFlight,
}

#[derive(Debug, Serialize)]
struct BarcodeCommitBody<'a> {
    draft_id: &'a str,
    candidate_id: &'a str,
    kcal: f64,
    carb_g: f64,
    protein_g: f64,
    fat_g: f64,
}

#[derive(Debug, Serialize)]
struct ManualCommitBody<'a> {
    job_id: &'a str,
    name: &'a str,
    kcal: f64,
    carb_g: f64,
    protein_g: f64,
    fat_g: f64,
}

#[derive(Debug, Deserialize)]
struct RawCommitResponse {
    ok: bool,
    #[serde(default)]
    redirect_url: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    missing_fields: Vec<String>,
}

/// Statistics for the commit client.
#[derive(Debug, Default, Clone)]
pub struct CommitStats {
    pub attempted: u64,
    pub committed: u64,
    pub rejected: u64,
}

/// HTTP client for the commit endpoints.
pub struct CommitClient {
    http: reqwest::Client,
    config: HttpConfig,
    tokens: Arc<dyn TokenProvider>,
    in_flight: AtomicBool,
    stats: RwLock<CommitStats>,
}

impl CommitClient {
    /// Create a client with the configured request timeout.
    pub fn new(config: HttpConfig, tokens: Arc<dyn TokenProvider>) -> Result<Self, CommitError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| CommitError::CreationFailed(e.to_string()))?;

        Ok(Self {
            http,
            config,
            tokens,
            in_flight: AtomicBool::new(false),
            stats: RwLock::new(CommitStats::default()),
        })
    }

    /// Whether a commit call is currently running.
    pub fn in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Get current commit statistics.
    pub fn stats(&self) -> CommitStats {
        self.stats.read().clone()
    }

    /// Submit the final record for persistence.
    ///
    /// Rejects a second call while one is running without touching the
    /// network. Every other failure resolves to `Rejected` with the
    /// server's message verbatim when one is present.
    #[instrument(skip(self, payload), fields(mode = %payload.source_mode))]
    pub async fn commit(&self, payload: &CommitPayload) -> Result<CommitOutcome, CommitError> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            warn!("Commit rejected: another commit is in flight");
            return Err(CommitError::AlreadyInFlight);
        }

        let outcome = self.commit_inner(payload).await;
        self.in_flight.store(false, Ordering::SeqCst);

        {
            let mut stats = self.stats.write();
            stats.attempted += 1;
            match &outcome {
                CommitOutcome::Committed { .. } => stats.committed += 1,
                CommitOutcome::Rejected { .. } => stats.rejected += 1,
            }
        }

        Ok(outcome)
    }

    async fn commit_inner(&self, payload: &CommitPayload) -> CommitOutcome {
        let token = match self.tokens.csrf_token() {
            Some(token) => token,
            None => {
                warn!("Anti-forgery token missing, commit not dispatched");
                return CommitOutcome::Rejected {
                    message: TOKEN_MISSING_MESSAGE.to_string(),
                    missing_fields: Vec::new(),
                };
            }
        };

        let nutrition = &payload.nutrition;
        let (path, body) = match &payload.selection {
            Selection::Candidate {
                draft_id,
                candidate_id,
            } => (
                &self.config.scan_commit_path,
                serde_json::to_value(BarcodeCommitBody {
                    draft_id,
                    candidate_id,
                    kcal: nutrition.kcal,
                    carb_g: nutrition.carb_g,
                    protein_g: nutrition.protein_g,
                    fat_g: nutrition.fat_g,
                }),
            ),
            Selection::Job { job_id } => (
                &self.config.manual_commit_path,
                serde_json::to_value(ManualCommitBody {
                    job_id,
                    name: &nutrition.name,
                    kcal: nutrition.kcal,
                    carb_g: nutrition.carb_g,
                    protein_g: nutrition.protein_g,
                    fat_g: nutrition.fat_g,
                }),
            ),
        };

        let body = match body {
            Ok(body) => body,
            Err(e) => {
                return CommitOutcome::Rejected {
                    message: e.to_string(),
                    missing_fields: Vec::new(),
                }
            }
        };

        let url = self.config.url_for(path);
        let response = self
            .http
            .post(&url)
            .header(self.config.csrf_header.as_str(), token)
            .json(&body)
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Commit request failed");
                return CommitOutcome::Rejected {
                    message: COMMIT_FAILED_MESSAGE.to_string(),
                    missing_fields: Vec::new(),
                };
            }
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                return CommitOutcome::Rejected {
                    message: e.to_string(),
                    missing_fields: Vec::new(),
                }
            }
        };

        let decoded: RawCommitResponse = match serde_json::from_str(&text) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(status = status.as_u16(), error = %e, "Commit response was not JSON");
                return CommitOutcome::Rejected {
                    message: COMMIT_FAILED_MESSAGE.to_string(),
                    missing_fields: Vec::new(),
                };
            }
        };

        if !status.is_success() || !decoded.ok {
            return CommitOutcome::Rejected {
                message: decoded
                    .error
                    .or(decoded.message)
                    .unwrap_or_else(|| COMMIT_FAILED_MESSAGE.to_string()),
                missing_fields: decoded.missing_fields,
            };
        }

        let redirect_url = decoded
            .redirect_url
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| self.config.default_redirect.clone());

        info!(redirect_url = %redirect_url, "Record committed");
        CommitOutcome::Committed { redirect_url }
    }
}

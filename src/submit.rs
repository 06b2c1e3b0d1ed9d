//! Submission client for the resolution service.
//!
//! Packages a captured still with the session context into a multipart
//! upload, attaches the anti-forgery token, and normalizes whatever comes
//! back into the typed [`SubmissionResult`] union. Bodies are read as text
//! first so an HTML error page becomes a typed transport failure with the
//! raw body attached for diagnostics, never an unhandled decode error.

use crate::camera::StillImage;
use crate::candidate::Candidate;
use crate::config::HttpConfig;
use crate::mode::CaptureMode;
use crate::session::SessionContext;
use parking_lot::RwLock;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Instruction surfaced when the anti-forgery token cannot be found.
/// No request is dispatched in that state.
pub const TOKEN_MISSING_MESSAGE: &str =
    "The anti-forgery token was not found. Please reload the page and try again.";

/// Normalized outcome of one capture submission.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionResult {
    /// Barcode path: the server holds a draft with product candidates.
    CandidatesReady {
        draft_id: String,
        candidates: Vec<Candidate>,
    },
    /// Label path: an asynchronous OCR job was created.
    JobCreated { job_id: String },
    /// Recognition failed; the user should re-frame and retry in place.
    ScanFailed { message: String },
    /// No product matched; terminal for this image.
    NoMatch { message: String },
    /// Network or decode failure; recoverable by retrying the request.
    TransportError { detail: String },
}

/// Errors from the auxiliary GET endpoints (candidate fetch, job result).
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request failed: {0}")]
    Http(String),

    #[error("Response could not be decoded: {0}")]
    Decode(String),

    #[error("Server rejected the request: {0}")]
    Rejected(String),
}

/// Source of the anti-forgery token.
pub trait TokenProvider: Send + Sync {
    fn csrf_token(&self) -> Option<String>;
}

/// Cookie storage snapshot taken at workflow entry.
#[derive(Debug, Clone, Default)]
pub struct CookieJar {
    cookies: HashMap<String, String>,
    csrf_cookie: String,
}

impl CookieJar {
    /// Parse a `name=value; name2=value2` cookie string.
    pub fn parse(raw: &str, csrf_cookie: &str) -> Self {
        let cookies = raw
            .split(';')
            .filter_map(|pair| {
                let (name, value) = pair.split_once('=')?;
                let name = name.trim();
                if name.is_empty() {
                    return None;
                }
                Some((name.to_string(), value.trim().to_string()))
            })
            .collect();

        Self {
            cookies,
            csrf_cookie: csrf_cookie.to_string(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }
}

impl TokenProvider for CookieJar {
    fn csrf_token(&self) -> Option<String> {
        self.get(&self.csrf_cookie)
            .filter(|v| !v.is_empty())
            .map(String::from)
    }
}

/// Raw wire shape of the submit-capture response.
#[derive(Debug, Deserialize)]
struct RawScanResponse {
    ok: bool,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    job_id: Option<String>,
    #[serde(default)]
    draft_id: Option<String>,
    #[serde(default)]
    candidates: Option<Vec<Candidate>>,
}

/// Raw wire shape of the candidate-fetch response.
#[derive(Debug, Deserialize)]
struct RawDraftResponse {
    ok: bool,
    #[serde(default)]
    candidates: Option<Vec<Candidate>>,
    #[serde(default)]
    error: Option<String>,
}

/// Nutrition fields returned by a completed OCR job.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct JobNutrition {
    #[serde(default)]
    pub kcal: Option<f64>,
    #[serde(default)]
    pub carb_g: Option<f64>,
    #[serde(default)]
    pub protein_g: Option<f64>,
    #[serde(default)]
    pub fat_g: Option<f64>,
}

/// Result of an OCR job, with the fields the parse could not recover.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobResult {
    pub nutrition: JobNutrition,
    pub missing_fields: Vec<String>,
}

/// Raw wire shape of the job-result response.
#[derive(Debug, Deserialize)]
struct RawJobResultResponse {
    ok: bool,
    #[serde(default)]
    nutrition: Option<JobNutrition>,
    #[serde(default)]
    missing_fields: Vec<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Statistics for the submission client, by outcome variant.
#[derive(Debug, Default, Clone)]
pub struct SubmissionStats {
    pub submissions: u64,
    pub candidates_ready: u64,
    pub jobs_created: u64,
    pub scan_failures: u64,
    pub no_matches: u64,
    pub transport_errors: u64,
}

/// HTTP client for capture submission and the auxiliary fetches.
pub struct SubmissionClient {
    http: reqwest::Client,
    config: HttpConfig,
    tokens: Arc<dyn TokenProvider>,
    stats: RwLock<SubmissionStats>,
}

impl SubmissionClient {
    /// Create a client with the configured request timeout.
    pub fn new(config: HttpConfig, tokens: Arc<dyn TokenProvider>) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| FetchError::Http(e.to_string()))?;

        Ok(Self {
            http,
            config,
            tokens,
            stats: RwLock::new(SubmissionStats::default()),
        })
    }

    /// Get current submission statistics.
    pub fn stats(&self) -> SubmissionStats {
        self.stats.read().clone()
    }

    fn record_outcome(&self, result: &SubmissionResult) {
        let mut stats = self.stats.write();
        stats.submissions += 1;
        match result {
            SubmissionResult::CandidatesReady { .. } => stats.candidates_ready += 1,
            SubmissionResult::JobCreated { .. } => stats.jobs_created += 1,
            SubmissionResult::ScanFailed { .. } => stats.scan_failures += 1,
            SubmissionResult::NoMatch { .. } => stats.no_matches += 1,
            SubmissionResult::TransportError { .. } => stats.transport_errors += 1,
        }
    }

    /// Submit a captured still for resolution.
    ///
    /// Every failure path resolves to a `SubmissionResult` variant; this
    /// call never surfaces an error type of its own.
    #[instrument(skip(self, image), fields(mode = %mode, bytes = image.len()))]
    pub async fn submit(
        &self,
        image: &StillImage,
        mode: CaptureMode,
        ctx: &SessionContext,
    ) -> SubmissionResult {
        let result = self.submit_inner(image, mode, ctx).await;
        self.record_outcome(&result);
        result
    }

    async fn submit_inner(
        &self,
        image: &StillImage,
        mode: CaptureMode,
        ctx: &SessionContext,
    ) -> SubmissionResult {
        let token = match self.tokens.csrf_token() {
            Some(token) => token,
            None => {
                warn!("Anti-forgery token missing, submission not dispatched");
                return SubmissionResult::TransportError {
                    detail: TOKEN_MISSING_MESSAGE.to_string(),
                };
            }
        };

        let path = match mode {
            CaptureMode::Barcode => &self.config.scan_path,
            CaptureMode::Label => &self.config.job_create_path,
        };
        let url = self.config.url_for(path);

        let part = match Part::bytes(image.data.to_vec())
            .file_name(mode.filename())
            .mime_str("image/jpeg")
        {
            Ok(part) => part,
            Err(e) => {
                return SubmissionResult::TransportError {
                    detail: e.to_string(),
                }
            }
        };

        let form = Form::new()
            .part("image", part)
            .text("rgs_dt", ctx.record_date_compact())
            .text("time_slot", ctx.time_slot().code())
            // Derived display fields kept for older server expectations.
            .text("date", ctx.display_date())
            .text("meal", ctx.meal_label())
            .text("mode", mode.as_str());

        let response = self
            .http
            .post(&url)
            .header(self.config.csrf_header.as_str(), token)
            .multipart(form)
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Submission request failed");
                return SubmissionResult::TransportError {
                    detail: e.to_string(),
                };
            }
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return SubmissionResult::TransportError {
                    detail: e.to_string(),
                }
            }
        };

        debug!(status = status.as_u16(), bytes = body.len(), "Scan response received");
        map_scan_response(&body)
    }

    /// Fetch the candidate set for a draft.
    #[instrument(skip(self))]
    pub async fn fetch_candidates(&self, draft_id: &str) -> Result<Vec<Candidate>, FetchError> {
        let url = self.config.url_for(&self.config.draft_path);
        let body = self.get_text(&url, &[("draft_id", draft_id)]).await?;

        let decoded: RawDraftResponse =
            serde_json::from_str(&body).map_err(|e| FetchError::Decode(e.to_string()))?;

        if !decoded.ok {
            return Err(FetchError::Rejected(
                decoded.error.unwrap_or_else(|| "DRAFT_NOT_FOUND".to_string()),
            ));
        }

        Ok(decoded.candidates.unwrap_or_default())
    }

    /// Fetch the nutrition parse of a completed OCR job.
    #[instrument(skip(self))]
    pub async fn fetch_job_result(&self, job_id: &str) -> Result<JobResult, FetchError> {
        let url = self.config.url_for(&self.config.job_result_path);
        let body = self.get_text(&url, &[("job_id", job_id)]).await?;

        let decoded: RawJobResultResponse =
            serde_json::from_str(&body).map_err(|e| FetchError::Decode(e.to_string()))?;

        if !decoded.ok {
            return Err(FetchError::Rejected(
                decoded.error.unwrap_or_else(|| "JOB_NOT_FOUND".to_string()),
            ));
        }

        Ok(JobResult {
            nutrition: decoded.nutrition.unwrap_or_default(),
            missing_fields: decoded.missing_fields,
        })
    }

    async fn get_text(&self, url: &str, query: &[(&str, &str)]) -> Result<String, FetchError> {
        let response = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| FetchError::Http(e.to_string()))?;

        response
            .text()
            .await
            .map_err(|e| FetchError::Http(e.to_string()))
    }
}

/// Map a raw response body into the submission result union.
///
/// Exactly one of the five variants is produced; an unrecognized shape is
/// a transport failure, never a silent default.
pub fn map_scan_response(body: &str) -> SubmissionResult {
    let decoded: RawScanResponse = match serde_json::from_str(body) {
        Ok(decoded) => decoded,
        Err(e) => {
            warn!(error = %e, "Scan response was not JSON");
            return SubmissionResult::TransportError {
                detail: format!("undecodable response: {}", truncate(body, 600)),
            };
        }
    };

    if decoded.ok {
        if let Some(job_id) = decoded.job_id.filter(|id| !id.is_empty()) {
            return SubmissionResult::JobCreated { job_id };
        }
        if let Some(draft_id) = decoded.draft_id.filter(|id| !id.is_empty()) {
            return SubmissionResult::CandidatesReady {
                draft_id,
                candidates: decoded.candidates.unwrap_or_default(),
            };
        }
        return SubmissionResult::TransportError {
            detail: "ok response carried neither job_id nor draft_id".to_string(),
        };
    }

    match decoded.reason.as_deref() {
        Some("SCAN_FAIL") => SubmissionResult::ScanFailed {
            message: decoded.message.unwrap_or_else(|| {
                "The code was not recognized. Line it up inside the frame and try again."
                    .to_string()
            }),
        },
        Some("NO_MATCH") => SubmissionResult::NoMatch {
            message: no_match_message(decoded.message),
        },
        _ if decoded.error.as_deref() == Some("no candidates found") => {
            SubmissionResult::NoMatch {
                message: no_match_message(decoded.message),
            }
        }
        _ => SubmissionResult::TransportError {
            detail: decoded
                .message
                .or(decoded.error)
                .unwrap_or_else(|| "unrecognized failure shape".to_string()),
        },
    }
}

fn no_match_message(message: Option<String>) -> String {
    message.unwrap_or_else(|| {
        "No product was found for this code. Please add it through search.".to_string()
    })
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

//! Barcode candidate review.
//!
//! The resolution service answers a barcode scan with a set of product
//! candidates held in a server-side draft. This module models those
//! candidates and the single-selection review panel that prefill the
//! nutrition draft for commit.

use crate::draft::NutritionDraft;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// Advisory shown when the selected candidate's nutrition cannot be
/// trusted as-is. Non-blocking; commit gating is the validator's job.
pub const MANUAL_CONFIRMATION_ADVISORY: &str =
    "Some nutrition values are missing or unreliable — please confirm or enter them.";

/// Provenance of a candidate's macro fields. Anything the server sends
/// other than the trusted `"api"` marker counts as unreliable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum NutritionSource {
    #[default]
    Api,
    Other,
}

impl From<String> for NutritionSource {
    fn from(raw: String) -> Self {
        if raw == "api" {
            NutritionSource::Api
        } else {
            NutritionSource::Other
        }
    }
}

/// A server-proposed product match for a scanned barcode.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Candidate {
    #[serde(rename = "candidate_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub flavor: Option<String>,
    #[serde(default)]
    pub kcal: Option<f64>,
    #[serde(default)]
    pub carb_g: Option<f64>,
    #[serde(default)]
    pub protein_g: Option<f64>,
    #[serde(default)]
    pub fat_g: Option<f64>,
    #[serde(default)]
    pub nutr_source: NutritionSource,
}

impl Candidate {
    /// Whether all four macro fields are present.
    pub fn has_all_nutrition(&self) -> bool {
        self.kcal.is_some()
            && self.carb_g.is_some()
            && self.protein_g.is_some()
            && self.fat_g.is_some()
    }

    /// Whether selecting this candidate must raise the manual-confirmation
    /// advisory. True when the source is untrusted or any macro is absent;
    /// the union of both rules is deliberate (see DESIGN.md).
    pub fn needs_manual_confirmation(&self) -> bool {
        self.nutr_source != NutritionSource::Api || !self.has_all_nutrition()
    }
}

/// Errors raised while manipulating the candidate selection.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("Unknown candidate: {0}")]
    UnknownCandidate(String),
}

/// View state of the review panel driven by the selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PanelState {
    /// Macro inputs accept edits only while a candidate is selected.
    pub inputs_enabled: bool,
    /// Non-blocking manual-confirmation advisory, when raised.
    pub advisory: Option<&'static str>,
    /// The commit control is enabled only while a candidate is selected.
    pub commit_enabled: bool,
}

/// Single-selection resolver over a candidate set.
///
/// Radio-button semantics implemented over independently checkable rows:
/// selecting a candidate implicitly deselects any previous one.
#[derive(Debug)]
pub struct CandidateResolver {
    candidates: Vec<Candidate>,
    selected: Option<String>,
    panel: PanelState,
}

impl CandidateResolver {
    /// Create a resolver with nothing selected and inputs locked.
    pub fn new(candidates: Vec<Candidate>) -> Self {
        Self {
            candidates,
            selected: None,
            panel: PanelState::default(),
        }
    }

    /// The candidate set under review.
    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    /// The currently selected candidate, if any.
    pub fn current(&self) -> Option<&Candidate> {
        let id = self.selected.as_deref()?;
        self.candidates.iter().find(|c| c.id == id)
    }

    /// Panel view state.
    pub fn panel(&self) -> &PanelState {
        &self.panel
    }

    /// Select a candidate, prefilling the draft from its macro fields.
    ///
    /// Absent fields become empty inputs, never zero. All four macro
    /// inputs are enabled for editing and commit becomes available.
    pub fn select(
        &mut self,
        candidate_id: &str,
        draft: &mut NutritionDraft,
    ) -> Result<&Candidate, SelectionError> {
        let index = self
            .candidates
            .iter()
            .position(|c| c.id == candidate_id)
            .ok_or_else(|| SelectionError::UnknownCandidate(candidate_id.to_string()))?;
        let candidate = self.candidates[index].clone();

        self.selected = Some(candidate.id.clone());

        draft.name = candidate.name.clone();
        draft.kcal = macro_input(candidate.kcal);
        draft.carb_g = macro_input(candidate.carb_g);
        draft.protein_g = macro_input(candidate.protein_g);
        draft.fat_g = macro_input(candidate.fat_g);

        self.panel.inputs_enabled = true;
        self.panel.commit_enabled = true;
        self.panel.advisory = if candidate.needs_manual_confirmation() {
            Some(MANUAL_CONFIRMATION_ADVISORY)
        } else {
            None
        };

        debug!(
            candidate_id = %candidate.id,
            advisory = self.panel.advisory.is_some(),
            "Candidate selected"
        );

        Ok(&self.candidates[index])
    }

    /// Clear the selection: inputs are cleared and re-disabled, the
    /// advisory is dropped, commit is disabled.
    pub fn deselect(&mut self, draft: &mut NutritionDraft) {
        self.selected = None;
        draft.clear();
        self.panel = PanelState::default();
        debug!("Candidate deselected");
    }
}

fn macro_input(value: Option<f64>) -> String {
    match value {
        Some(v) => format_macro(v),
        None => String::new(),
    }
}

/// Render a macro value the way the inputs display it: integral values
/// without a trailing `.0`.
fn format_macro(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

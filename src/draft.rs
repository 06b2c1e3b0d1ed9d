//! The mutable nutrition record under construction, and the pre-commit
//! validation gate.
//!
//! Draft fields hold raw input text; they only become numbers when the
//! validator admits them. All four macro fields are required regardless of
//! capture mode, and the label path additionally requires a product name.

use crate::mode::CaptureMode;

/// Field identifiers used in validation reports and server payloads.
pub const FIELD_NAME: &str = "name";
pub const FIELD_KCAL: &str = "kcal";
pub const FIELD_CARB: &str = "carb_g";
pub const FIELD_PROTEIN: &str = "protein_g";
pub const FIELD_FAT: &str = "fat_g";

/// The record being built for commit. Created empty or prefilled from a
/// candidate or an OCR job result; mutated by user edits; consumed once
/// on commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NutritionDraft {
    pub name: String,
    pub kcal: String,
    pub carb_g: String,
    pub protein_g: String,
    pub fat_g: String,
}

impl NutritionDraft {
    /// Reset every field to empty.
    pub fn clear(&mut self) {
        *self = NutritionDraft::default();
    }

    /// Whether every field is empty.
    pub fn is_clear(&self) -> bool {
        self == &NutritionDraft::default()
    }
}

/// A draft that passed validation, with parsed macro values.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedNutrition {
    pub name: String,
    pub kcal: f64,
    pub carb_g: f64,
    pub protein_g: f64,
    pub fat_g: f64,
}

/// Outcome of the pre-commit gate.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationResult {
    Valid(ValidatedNutrition),
    Invalid {
        missing_fields: Vec<&'static str>,
        malformed_fields: Vec<&'static str>,
    },
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid(_))
    }
}

enum FieldValue {
    Missing,
    Malformed,
    Value(f64),
}

/// A macro field is valid iff non-empty after trimming and parsing to a
/// finite number >= 0. Zero is valid; negative and non-numeric text are
/// malformed rather than missing.
fn parse_macro(raw: &str) -> FieldValue {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return FieldValue::Missing;
    }
    match trimmed.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => FieldValue::Value(v),
        _ => FieldValue::Malformed,
    }
}

/// Validate a draft for the given capture mode.
pub fn validate(draft: &NutritionDraft, mode: CaptureMode) -> ValidationResult {
    let mut missing_fields = Vec::new();
    let mut malformed_fields = Vec::new();

    let name = draft.name.trim().to_string();
    if mode == CaptureMode::Label && name.is_empty() {
        missing_fields.push(FIELD_NAME);
    }

    let mut admit = |field: &'static str, raw: &str| match parse_macro(raw) {
        FieldValue::Missing => {
            missing_fields.push(field);
            0.0
        }
        FieldValue::Malformed => {
            malformed_fields.push(field);
            0.0
        }
        FieldValue::Value(v) => v,
    };

    let kcal = admit(FIELD_KCAL, &draft.kcal);
    let carb_g = admit(FIELD_CARB, &draft.carb_g);
    let protein_g = admit(FIELD_PROTEIN, &draft.protein_g);
    let fat_g = admit(FIELD_FAT, &draft.fat_g);

    if !missing_fields.is_empty() || !malformed_fields.is_empty() {
        return ValidationResult::Invalid {
            missing_fields,
            malformed_fields,
        };
    }

    ValidationResult::Valid(ValidatedNutrition {
        name,
        kcal,
        carb_g,
        protein_g,
        fat_g,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_filled_draft() -> NutritionDraft {
        NutritionDraft {
            name: "Granola Bar".to_string(),
            kcal: "190".to_string(),
            carb_g: "24.5".to_string(),
            protein_g: "4".to_string(),
            fat_g: "0".to_string(),
        }
    }

    #[test]
    fn test_complete_draft_is_valid() {
        let result = validate(&create_filled_draft(), CaptureMode::Barcode);
        match result {
            ValidationResult::Valid(nutrition) => {
                assert_eq!(nutrition.kcal, 190.0);
                assert_eq!(nutrition.carb_g, 24.5);
                assert_eq!(nutrition.fat_g, 0.0);
            }
            ValidationResult::Invalid { .. } => panic!("expected valid"),
        }
    }

    #[test]
    fn test_zero_is_accepted() {
        let mut draft = create_filled_draft();
        draft.kcal = "0".to_string();
        assert!(validate(&draft, CaptureMode::Barcode).is_valid());
    }

    #[test]
    fn test_empty_field_is_missing() {
        let mut draft = create_filled_draft();
        draft.protein_g = "  ".to_string();
        match validate(&draft, CaptureMode::Barcode) {
            ValidationResult::Invalid {
                missing_fields,
                malformed_fields,
            } => {
                assert_eq!(missing_fields, vec![FIELD_PROTEIN]);
                assert!(malformed_fields.is_empty());
            }
            ValidationResult::Valid(_) => panic!("expected invalid"),
        }
    }

    #[test]
    fn test_negative_field_is_malformed() {
        let mut draft = create_filled_draft();
        draft.fat_g = "-1".to_string();
        match validate(&draft, CaptureMode::Barcode) {
            ValidationResult::Invalid {
                malformed_fields, ..
            } => assert_eq!(malformed_fields, vec![FIELD_FAT]),
            ValidationResult::Valid(_) => panic!("expected invalid"),
        }
    }

    #[test]
    fn test_non_numeric_field_is_malformed() {
        let mut draft = create_filled_draft();
        draft.carb_g = "lots".to_string();
        match validate(&draft, CaptureMode::Barcode) {
            ValidationResult::Invalid {
                malformed_fields, ..
            } => assert_eq!(malformed_fields, vec![FIELD_CARB]),
            ValidationResult::Valid(_) => panic!("expected invalid"),
        }
    }

    #[test]
    fn test_non_finite_is_malformed() {
        let mut draft = create_filled_draft();
        draft.kcal = "NaN".to_string();
        assert!(!validate(&draft, CaptureMode::Barcode).is_valid());
        draft.kcal = "inf".to_string();
        assert!(!validate(&draft, CaptureMode::Barcode).is_valid());
    }

    #[test]
    fn test_every_macro_field_is_required() {
        for field in [FIELD_KCAL, FIELD_CARB, FIELD_PROTEIN, FIELD_FAT] {
            let mut draft = create_filled_draft();
            match field {
                FIELD_KCAL => draft.kcal.clear(),
                FIELD_CARB => draft.carb_g.clear(),
                FIELD_PROTEIN => draft.protein_g.clear(),
                _ => draft.fat_g.clear(),
            }
            match validate(&draft, CaptureMode::Label) {
                ValidationResult::Invalid { missing_fields, .. } => {
                    assert_eq!(missing_fields, vec![field]);
                }
                ValidationResult::Valid(_) => panic!("expected invalid for {}", field),
            }
        }
    }

    #[test]
    fn test_name_required_only_for_label_mode() {
        let mut draft = create_filled_draft();
        draft.name = "   ".to_string();

        assert!(validate(&draft, CaptureMode::Barcode).is_valid());

        match validate(&draft, CaptureMode::Label) {
            ValidationResult::Invalid { missing_fields, .. } => {
                assert_eq!(missing_fields, vec![FIELD_NAME]);
            }
            ValidationResult::Valid(_) => panic!("expected invalid"),
        }
    }

    #[test]
    fn test_name_is_trimmed_on_validation() {
        let mut draft = create_filled_draft();
        draft.name = "  Granola Bar  ".to_string();
        match validate(&draft, CaptureMode::Label) {
            ValidationResult::Valid(nutrition) => assert_eq!(nutrition.name, "Granola Bar"),
            ValidationResult::Invalid { .. } => panic!("expected valid"),
        }
    }

    #[test]
    fn test_clear_resets_draft() {
        let mut draft = create_filled_draft();
        draft.clear();
        assert!(draft.is_clear());
    }
}

//! # Validation Module
//!
//! Input validation for session creation.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Therapist program editor (web)                               │
//! │  ├── Basic format checks                                               │
//! │  └── Immediate feedback                                                │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Session creation (Rust)                                      │
//! │  └── THIS MODULE: ids, totals, starting position                       │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Reducer                                                      │
//! │  └── Keeps 1 ≤ current ≤ total for the whole session                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use physio_core::types::SessionPlan;
//! use physio_core::validation::validate_plan;
//!
//! assert!(validate_plan(&SessionPlan::new("patient-1", "program-1")).is_ok());
//! assert!(validate_plan(&SessionPlan::new("", "program-1")).is_err());
//! ```

use crate::error::ValidationError;
use crate::types::SessionPlan;
use crate::{MAX_TOTAL_REPS, MAX_TOTAL_SETS};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Maximum length of user and program identifiers.
const MAX_ID_LEN: usize = 128;

// =============================================================================
// String Validators
// =============================================================================

/// Validates an opaque identifier (user id, program id).
///
/// ## Rules
/// - Must not be empty
/// - At most 128 characters
/// - No whitespace
pub fn validate_identifier(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.len() > MAX_ID_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_ID_LEN,
        });
    }

    if value.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must not contain whitespace".to_string(),
        });
    }

    Ok(())
}

/// Validates the exercise display name.
pub fn validate_exercise_name(name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: "exercise".to_string(),
        });
    }

    if name.len() > 100 {
        return Err(ValidationError::TooLong {
            field: "exercise".to_string(),
            max: 100,
        });
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

fn validate_range(field: &str, value: u32, min: u32, max: u32) -> ValidationResult<()> {
    if value < min || value > max {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: min as i64,
            max: max as i64,
        });
    }
    Ok(())
}

// =============================================================================
// Plan Validator
// =============================================================================

/// Validates a complete session plan.
///
/// ## Rules
/// - `user_id`, `program_id`: see [`validate_identifier`]
/// - `total_sets` in `1..=20`, `total_reps` in `1..=100`
/// - starting position inside the totals
pub fn validate_plan(plan: &SessionPlan) -> ValidationResult<()> {
    validate_identifier("user_id", &plan.user_id)?;
    validate_identifier("program_id", &plan.program_id)?;
    validate_exercise_name(&plan.exercise)?;

    validate_range("total_sets", plan.total_sets, 1, MAX_TOTAL_SETS)?;
    validate_range("total_reps", plan.total_reps, 1, MAX_TOTAL_REPS)?;
    validate_range("start_set", plan.start_set, 1, plan.total_sets)?;
    validate_range("start_rep", plan.start_rep, 1, plan.total_reps)?;

    Ok(())
}

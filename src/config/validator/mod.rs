//! Configuration validation with comprehensive error and warning detection.
//!
//! Mirrors the teacher's accumulate-then-report pattern: validation collects
//! every problem it finds rather than bailing on the first one, so an
//! operator sees the whole list of things to fix in one pass.

mod checks;

use std::fmt;

use super::types::MbcasConfig;

#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }
}

#[derive(Debug, Clone)]
pub enum ValidationError {
    InvalidValue { field: &'static str, reason: String },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::InvalidValue { field, reason } => {
                write!(f, "{field}: {reason}")
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate(config: &MbcasConfig) -> ValidationResult {
        let mut result = ValidationResult::default();
        checks::check_allocation_bounds(config, &mut result);
        checks::check_rates(config, &mut result);
        checks::check_step_limits(config, &mut result);
        checks::check_q_learning(config, &mut result);
        checks::check_intervals(config, &mut result);
        result
    }
}

//! Request validation used by the validation stage.

mod validation;
pub use validation::{is_valid_email, RequestValidator, Section, ValidatedRequest, ValidationError};

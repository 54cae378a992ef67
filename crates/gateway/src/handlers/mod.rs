//! API handlers module

pub mod ask;
pub mod classify;
pub mod health;
pub mod search;

use switchyard_common::errors::{AppError, Result};
use validator::Validate;

/// Reject a request body that fails its validation rules
pub(crate) fn validate<T: Validate>(request: &T) -> Result<()> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })
}

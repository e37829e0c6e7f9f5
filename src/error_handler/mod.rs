//! Forecast error tracking and range calibration (spec.md §4.3).

pub mod error_handler;
pub mod types;

pub use error_handler::{ErrorHandler, MAX_ERROR_HORIZON};
pub use types::Calibration;

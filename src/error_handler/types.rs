//! spec.md §4.3/§8's calibration method selector.
//!
//! Grounded on the `Calibration` enum in the teacher's `trcf/types.rs`;
//! trimmed to this crate's three variants (the teacher defines the same
//! three).

/// How [`super::ErrorHandler::calibrate`] widens a freshly issued forecast's
/// bounds using the empirical error distribution accumulated so far.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Calibration {
    /// No change to the forecast's bounds.
    NONE,
    /// Shift `values` by the empirical error median; widen `upper`/`lower`
    /// relative to the *original* `values`, not the shifted one, so the
    /// interval is typically narrower than [`Calibration::SIMPLE`]'s (the
    /// interval precision is correspondingly lower, roughly `1 - 2 *
    /// percentile`).
    MINIMAL,
    /// Shift `values` by the empirical error median; widen `upper`/`lower`
    /// relative to the already-shifted `values`, additively combining the
    /// model's own bounds with the observed error distribution.
    SIMPLE,
}

use thiserror::Error;

/// Errors returned by the point store, error handler and forest-state mapper.
///
/// All errors surface to the caller; nothing in this crate recovers
/// internally. `IllegalState` indicates a bug (an internal consistency
/// assertion failed) and is logged at `error` level before being returned,
/// since callers are permitted to ignore it by policy but should not do so
/// silently.
#[derive(Error, Debug, PartialEq, Clone)]
pub enum RCFError {
    /// A violated precondition: dimension mismatch, non-positive horizon,
    /// percentile outside `(0, 0.5)`, negative index, and similar caller
    /// bugs. Raised before any state is mutated.
    #[error("invalid argument: {msg}")]
    InvalidArgument { msg: &'static str },

    /// A handle was out of range or is not currently allocated.
    #[error("invalid handle: {msg}")]
    InvalidHandle { msg: &'static str },

    /// The point store is full even after compaction.
    #[error("point store at capacity: {msg}")]
    Capacity { msg: &'static str },

    /// A serialized payload had internally inconsistent lengths.
    #[error("misaligned serialized state: {msg}")]
    Misaligned { msg: &'static str },

    /// The state mapper was asked to rebuild a forest without a required
    /// piece of saved state (e.g. no coordinator state and no externally
    /// supplied point store).
    #[error("missing state: {msg}")]
    MissingState { msg: &'static str },

    /// A state descriptor's embedded version string was not recognized.
    #[error("unsupported state version: {msg}")]
    UnsupportedVersion { msg: &'static str },

    /// An internal consistency assertion failed. Indicates a bug in this
    /// crate rather than caller misuse; fatal by policy.
    #[error("illegal internal state: {msg}")]
    IllegalState { msg: &'static str },
}

impl RCFError {
    /// Construct an `IllegalState` error, logging it at `error` level first.
    ///
    /// `IllegalState` is specified as fatal by policy (spec.md §7): a caller
    /// that chooses to swallow the `Result` should still see the assertion
    /// failure in logs.
    pub fn illegal_state(msg: &'static str) -> Self {
        log::error!("illegal internal state: {msg}");
        RCFError::IllegalState { msg }
    }
}

/// Result alias used throughout this crate.
pub type Result<T> = std::result::Result<T, RCFError>;

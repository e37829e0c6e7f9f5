//! Core engineering for a streaming Random Cut Forest system: the point
//! store, forecast error calibration, and forest-state mapping.
//!
//! This crate implements three tightly coupled subsystems that sit
//! underneath an RCF-based anomaly detector/forecaster:
//!
//! - [`point_store`] — a compacting, reference-counted, variable-layout
//!   array arena that stores overlapping shingled vectors once and hands
//!   out stable integer handles to many tree consumers.
//! - [`error_handler`] — a ring-buffer tracker of past forecasts vs.
//!   actuals that computes per-leadtime, per-coordinate error
//!   distributions and calibrates predicted ranges.
//! - [`mapper`] — a coordinated snapshot/restore of a forest (point store,
//!   samplers, optional tree structures) preserving statistical
//!   equivalence.
//!
//! The randomized cut-tree algorithm, stream samplers, and top-level
//! forecaster façade are out of scope; [`contracts`] names the trait seams
//! those collaborators plug into.

pub mod common;
pub mod contracts;
pub mod error_handler;
pub mod errors;
pub mod mapper;
pub mod point_store;
pub mod types;
pub(crate) mod util;

pub use contracts::{
    ForecastDescriptor, ForestLike, PointStoreContract, RestoreContext, SamplerLike, StateMapper,
    TreeLike,
};
pub use error_handler::{Calibration, ErrorHandler, MAX_ERROR_HORIZON};
pub use errors::{RCFError, Result};
pub use mapper::{ForestStateMapper, MapperConfig, StateDescriptor};
pub use point_store::PointStore;
pub use types::{Handle, PointIndex, INFEASIBLE};

//! External interface contracts this core exposes to its collaborators
//! (trees, samplers, the forecaster façade) — spec.md §6.
//!
//! These are the seams at which out-of-scope machinery (the cut-tree, the
//! stream samplers, the top-level forecaster) plugs into the point store,
//! error handler and mapper this crate implements. None of the
//! implementors named here (a real sampler, a real tree) live in this
//! crate; only the trait contracts do.

use crate::common::{RangeVector, Weighted};
use crate::errors::Result;
use crate::point_store::PointStore;
use crate::types::Handle;

/// spec.md §6's `IPointStore<Handle, Vector>`.
pub trait PointStoreContract {
    /// Append a point (or, with internal shingling enabled, a
    /// `baseDimension`-length update) and return its handle, or
    /// [`crate::types::INFEASIBLE`] while the internal shingle buffer is
    /// still warming up.
    fn add(&mut self, point: &[f32], sequence_num: u64) -> Result<Handle>;

    fn increment_ref_count(&mut self, handle: Handle) -> Result<()>;

    fn decrement_ref_count(&mut self, handle: Handle) -> Result<usize>;

    fn get_numeric_vector(&self, handle: Handle) -> Result<Vec<f32>>;

    fn transform_to_shingled_point(&self, point: &[f32]) -> Result<Vec<f32>>;

    fn transform_indices(&self, indices: &[usize]) -> Result<Vec<usize>>;

    fn get_dimensions(&self) -> usize;

    fn get_shingle_size(&self) -> usize;

    fn is_internal_rotation_enabled(&self) -> bool;

    fn is_internal_shingling_enabled(&self) -> bool;

    fn size(&self) -> usize;

    /// Maximum number of live points this store can hold at once.
    fn capacity(&self) -> usize;
}

/// A per-tree sampler, as seen from the mapper (spec.md §4.4). A real
/// sampler holds a weighted reservoir of point handles and owns the
/// ref-count increments/decrements that follow from accepting or evicting
/// one; this core only needs to read/replay its contents during a
/// snapshot/restore, so the contract is deliberately narrow.
pub trait SamplerLike {
    /// The handles currently held by this sampler, each paired with its
    /// sampler-assigned weight, in an implementation-defined but stable
    /// order.
    fn sampled_handles(&self) -> Vec<Weighted<Handle>>;

    /// Rebuild this sampler's internal state from a previously captured
    /// `sampled_handles()` snapshot.
    fn restore_handles(&mut self, handles: &[Weighted<Handle>]) -> Result<()>;
}

/// A single tree, as seen from the mapper. Out of scope to implement (the
/// cut-tree algorithm itself, per spec.md §1's Non-goals); this trait only
/// names what the mapper needs from one.
pub trait TreeLike {
    /// Whether this tree currently has a materialized cut structure (as
    /// opposed to only a sampler with no tree built from it yet).
    fn has_structure(&self) -> bool;

    /// An opaque, implementation-defined snapshot of the tree's bounding
    /// boxes and cut structure, consulted only if `saveTreeState` is set.
    /// `spec.md` specifies this at a semantic level only (§1 Non-goals
    /// excludes byte-exact serialization formats).
    fn structure_snapshot(&self) -> Option<Vec<u8>>;

    /// Replace this tree's structure from a previously captured
    /// `structure_snapshot()`.
    fn restore_structure(&mut self, snapshot: &[u8]) -> Result<()>;
}

/// The forest, as seen from the mapper: a point store plus one sampler (and
/// optionally one tree) per component.
pub trait ForestLike {
    type Sampler: SamplerLike;
    type Tree: TreeLike;

    fn number_of_trees(&self) -> usize;
    fn dimensions(&self) -> usize;
    fn shingle_size(&self) -> usize;
    fn sample_size(&self) -> usize;
    fn time_decay(&self) -> f64;
    fn output_after(&self) -> usize;
    fn total_updates(&self) -> u64;

    /// Whether trees track the center of mass of their bounding boxes.
    fn center_of_mass(&self) -> bool;
    /// Whether samplers retain the sequence index each sample was taken at.
    fn store_sequence_indexes(&self) -> bool;
    /// Whether trees cache bounding boxes rather than recomputing them.
    fn bounding_box_caching(&self) -> bool;
    /// Whether the forest maintains its own internal shingle buffer rather
    /// than expecting pre-shingled input.
    fn internal_shingling(&self) -> bool;
    /// Whether the forest stores points as `f32` (true) or `f64` (false).
    fn single_precision(&self) -> bool;

    fn sampler(&self, tree_index: usize) -> &Self::Sampler;
    fn sampler_mut(&mut self, tree_index: usize) -> &mut Self::Sampler;
    fn tree(&self, tree_index: usize) -> Option<&Self::Tree>;
    fn tree_mut(&mut self, tree_index: usize) -> Option<&mut Self::Tree>;
}

/// spec.md §6's `ForecastDescriptor`: data-only statistics derived by the
/// error handler, handed to the (out-of-scope) forecaster façade.
#[derive(Clone, Debug, PartialEq)]
pub struct ForecastDescriptor {
    pub error_mean: Vec<f32>,
    pub error_rmse_high: Vec<f64>,
    pub error_rmse_low: Vec<f64>,
    pub observed_error_distribution: RangeVector,
    pub interval_precision: Vec<f32>,
}

/// An externally-supplied shell used to rehydrate a forest: an empty `F`
/// already sized to the descriptor being loaded (right `number_of_trees`,
/// empty samplers, etc. — constructing that machinery is itself out of this
/// core's scope, spec.md §1) plus, optionally, a point store to reuse when
/// the descriptor carries no coordinator state of its own.
pub struct RestoreContext<F> {
    pub empty_forest: F,
    pub external_point_store: Option<PointStore>,
}

/// spec.md §6's `StateMapper` contract. The point store is a concrete
/// [`PointStore`] rather than a generic contract, since — unlike the
/// sampler/tree/forest collaborators — it is itself implemented in this
/// crate (spec.md §4.4: "consulting the point store, the samplers, and
/// optionally tree structures").
pub trait StateMapper<F: ForestLike> {
    type State;

    /// `point_store` is consulted when `saveCoordinatorState` is enabled;
    /// pass `None` for a legacy/partial snapshot that relies entirely on
    /// replaying sampler contents.
    fn to_state(&self, forest: &F, point_store: Option<&PointStore>) -> Result<Self::State>;

    fn to_model(
        &self,
        state: &Self::State,
        context: RestoreContext<F>,
        seed: u64,
    ) -> Result<(F, PointStore)>;
}

//! Data-only pieces of a forest's persisted state (spec.md §6). No teacher
//! analogue exists for this module (the retrieved snapshot never reached a
//! state-mapper); these are a direct transcription of spec.md §6's
//! "Persisted state layout" paragraph into named structs, following the
//! crate's established value-semantics style (`RangeVector`, `DiVector`).

use crate::types::Handle;

/// State-format version this mapper produces and the only one it accepts on
/// load (spec.md §6: "Compatibility across versions is signalled by an
/// embedded version string; loaders must reject unknown versions").
pub const CURRENT_VERSION: &str = "rcf-core-state-v1";

/// Which optional pieces of forest state a [`super::ForestStateMapper`]
/// saves or expects to load (spec.md §4.4).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MapperConfig {
    /// Include bounding boxes and cut structure; requires a compact tree
    /// layout.
    pub save_tree_state: bool,
    /// Include a point-store snapshot.
    pub save_coordinator_state: bool,
    /// Include per-tree sampler snapshots.
    pub save_sampler_state: bool,
    /// Include concurrency hints (spec.md §5's parallel read fan-out).
    pub save_executor_context: bool,
    /// Ask leaves to apply lossless layout compression (e.g. delta coding
    /// of indices) to their snapshots.
    pub compress: bool,
    /// Allow saving samplers only and repopulating trees at load time from
    /// sampler contents, trading a smaller snapshot for a longer load.
    pub partial_trees_in_use: bool,
}

impl Default for MapperConfig {
    /// `saveCoordinatorState` and `saveSamplerState` default on per spec.md
    /// §4.4; the rest default off.
    fn default() -> Self {
        MapperConfig {
            save_tree_state: false,
            save_coordinator_state: true,
            save_sampler_state: true,
            save_executor_context: false,
            compress: false,
            partial_trees_in_use: false,
        }
    }
}

/// A point-store snapshot at the semantic level spec.md §1's Non-goals
/// call for (no byte-exact format): the construction parameters plus every
/// live `(handle, logical vector)` pair.
#[derive(Clone, Debug, PartialEq)]
pub struct PointStoreSnapshot {
    pub dimensions: usize,
    pub shingle_size: usize,
    pub capacity: usize,
    pub internal_shingling_enabled: bool,
    pub internal_rotation_enabled: bool,
    pub points: Vec<(Handle, Vec<f32>)>,
}

/// Concurrency hints captured when `saveExecutorContext` is set (spec.md
/// §6); consulted only to restore the orchestrator's parallel read-fan-out
/// sizing (spec.md §5), never the ingest path itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExecutorContextSnapshot {
    pub parallel_enabled: bool,
    pub thread_pool_size: usize,
}

/// A single tree's saved sampler contents: the handles it holds, each with
/// its sampler-assigned weight (spec.md §4.4's `compactSamplerStates`).
pub type CompactSamplerState = Vec<crate::common::Weighted<Handle>>;

/// A single tree's saved cut structure, opaque to this crate (spec.md §1's
/// Non-goals exclude re-specifying the cut-tree algorithm; §4.4's
/// `compactRandomCutTreeStates`). `None` when that tree has no materialized
/// structure (e.g. `partialTreesInUse`).
pub type CompactTreeState = Option<Vec<u8>>;

/// spec.md §6's persisted state descriptor.
#[derive(Clone, Debug, PartialEq)]
pub struct StateDescriptor {
    pub version: String,

    pub number_of_trees: usize,
    pub dimensions: usize,
    pub time_decay: f64,
    pub sample_size: usize,
    pub shingle_size: usize,
    pub output_after: usize,

    pub center_of_mass: bool,
    pub store_sequence_indexes: bool,
    pub bounding_box_caching: bool,
    pub internal_shingling: bool,
    pub single_precision: bool,
    pub compress: bool,
    pub partial_trees_in_use: bool,

    pub total_updates: u64,

    pub point_store_state: Option<PointStoreSnapshot>,
    pub compact_sampler_states: Option<Vec<CompactSamplerState>>,
    pub compact_random_cut_tree_states: Option<Vec<CompactTreeState>>,
    pub executor_context: Option<ExecutorContextSnapshot>,
}

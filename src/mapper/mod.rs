//! Forest-to-state mapping: snapshot/restore a forest's point store,
//! samplers and (optionally) tree structures (spec.md §4.4).

pub mod forest_state_mapper;
pub mod types;

pub use forest_state_mapper::ForestStateMapper;
pub use types::{
    CompactSamplerState, CompactTreeState, ExecutorContextSnapshot, MapperConfig,
    PointStoreSnapshot, StateDescriptor, CURRENT_VERSION,
};

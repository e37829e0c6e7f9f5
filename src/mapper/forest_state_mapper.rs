//! `ForestStateMapper`: converts between a live forest and a plain state
//! descriptor, preserving statistical equivalence (spec.md §4.4).
//!
//! No teacher analogue (the retrieved `rcflib` snapshot never reached a
//! state-mapper module). Built directly from spec.md §4.4/§6's contract, in
//! the crate's general multi-collaborator-orchestration idiom: a plain
//! struct holding configuration, `Result`-returning methods,
//! `check_argument` preconditions, matching how the rest of this crate
//! (`PointStore`, `ErrorHandler`) is shaped.

use crate::contracts::{ForestLike, RestoreContext, SamplerLike, StateMapper, TreeLike};
use crate::errors::{RCFError, Result};
use crate::mapper::types::{
    CompactSamplerState, CompactTreeState, ExecutorContextSnapshot, MapperConfig,
    PointStoreSnapshot, StateDescriptor, CURRENT_VERSION,
};
use crate::point_store::PointStore;
use crate::util::check_argument;

#[derive(Clone, Debug)]
pub struct ForestStateMapper {
    config: MapperConfig,
}

impl ForestStateMapper {
    pub fn new(config: MapperConfig) -> Self {
        ForestStateMapper { config }
    }

    pub fn config(&self) -> &MapperConfig {
        &self.config
    }
}

impl<F: ForestLike> StateMapper<F> for ForestStateMapper {
    type State = StateDescriptor;

    fn to_state(&self, forest: &F, point_store: Option<&PointStore>) -> Result<StateDescriptor> {
        let number_of_trees = forest.number_of_trees();

        let point_store_state = if self.config.save_coordinator_state {
            let store = point_store.ok_or(RCFError::MissingState {
                msg: "saveCoordinatorState is set but no point store was supplied",
            })?;
            Some(PointStoreSnapshot {
                dimensions: store.get_dimensions(),
                shingle_size: store.get_shingle_size(),
                capacity: store.capacity(),
                internal_shingling_enabled: store.is_internal_shingling_enabled(),
                internal_rotation_enabled: store.is_internal_rotation_enabled(),
                points: store.live_points(),
            })
        } else {
            None
        };

        let compact_sampler_states: Option<Vec<CompactSamplerState>> =
            if self.config.save_sampler_state {
                Some(
                    (0..number_of_trees)
                        .map(|i| forest.sampler(i).sampled_handles())
                        .collect(),
                )
            } else {
                None
            };

        let compact_random_cut_tree_states: Option<Vec<CompactTreeState>> =
            if self.config.save_tree_state {
                Some(
                    (0..number_of_trees)
                        .map(|i| match forest.tree(i) {
                            Some(tree) if tree.has_structure() => tree.structure_snapshot(),
                            _ => None,
                        })
                        .collect(),
                )
            } else {
                None
            };

        let executor_context = if self.config.save_executor_context {
            Some(ExecutorContextSnapshot {
                parallel_enabled: true,
                thread_pool_size: rayon::current_num_threads(),
            })
        } else {
            None
        };

        Ok(StateDescriptor {
            version: CURRENT_VERSION.to_string(),
            number_of_trees,
            dimensions: forest.dimensions(),
            time_decay: forest.time_decay(),
            sample_size: forest.sample_size(),
            shingle_size: forest.shingle_size(),
            output_after: forest.output_after(),
            center_of_mass: forest.center_of_mass(),
            store_sequence_indexes: forest.store_sequence_indexes(),
            bounding_box_caching: forest.bounding_box_caching(),
            internal_shingling: forest.internal_shingling(),
            single_precision: forest.single_precision(),
            compress: self.config.compress,
            partial_trees_in_use: self.config.partial_trees_in_use,
            total_updates: forest.total_updates(),
            point_store_state,
            compact_sampler_states,
            compact_random_cut_tree_states,
            executor_context,
        })
    }

    fn to_model(
        &self,
        state: &StateDescriptor,
        context: RestoreContext<F>,
        seed: u64,
    ) -> Result<(F, PointStore)> {
        let _ = seed; // reserved: replaying sampler contents into a fresh cut-tree is the
                      // (out-of-scope) tree's own randomized algorithm, not this mapper's.
        if state.version != CURRENT_VERSION {
            return Err(RCFError::UnsupportedVersion {
                msg: "state descriptor version not recognized by this mapper",
            });
        }

        let RestoreContext {
            mut empty_forest,
            external_point_store,
        } = context;

        check_argument(
            empty_forest.number_of_trees() == state.number_of_trees,
            "forest shell has a different number of trees than the descriptor",
        )?;
        check_argument(
            empty_forest.dimensions() == state.dimensions,
            "forest shell has different dimensions than the descriptor",
        )?;

        let (mut point_store, restored_from_snapshot) = match (&state.point_store_state, external_point_store) {
            (Some(snapshot), _) => {
                let store = PointStore::from_snapshot(
                    snapshot.dimensions,
                    snapshot.shingle_size,
                    snapshot.capacity,
                    snapshot.internal_shingling_enabled,
                    snapshot.internal_rotation_enabled,
                    &snapshot.points,
                    None,
                )?;
                (store, true)
            }
            (None, Some(external)) => (external, false),
            (None, None) => {
                return Err(RCFError::MissingState {
                    msg: "no coordinator state in the descriptor and no external point store supplied",
                });
            }
        };

        if let Some(sampler_states) = &state.compact_sampler_states {
            check_argument(
                sampler_states.len() == state.number_of_trees,
                "sampler state count does not match number_of_trees",
            )?;
            for (i, handles) in sampler_states.iter().enumerate() {
                empty_forest.sampler_mut(i).restore_handles(handles)?;
                for weighted in handles {
                    point_store.increment_ref_count(weighted.value)?;
                }
            }
        }

        // Trees with a saved structure are rehydrated directly. Trees with
        // none (either `saveTreeState` was off, or `partialTreesInUse` was
        // set and this particular tree was left sampler-only) stay empty
        // here; rebuilding their cut structure from the just-restored
        // sampler contents is the tree's own randomized algorithm, out of
        // this mapper's scope (spec.md §1 Non-goals).
        if let Some(tree_states) = &state.compact_random_cut_tree_states {
            check_argument(
                tree_states.len() == state.number_of_trees,
                "tree state count does not match number_of_trees",
            )?;
            for (i, snapshot) in tree_states.iter().enumerate() {
                if let Some(bytes) = snapshot {
                    if let Some(tree) = empty_forest.tree_mut(i) {
                        tree.restore_structure(bytes)?;
                    }
                }
            }
        }

        // Release the transient "builder hold" `PointStore::from_snapshot`
        // placed on every restored handle now that the real owners
        // (rebuilt samplers) have re-incremented it for each ownership
        // they hold (spec.md §9, "cyclic ownership"). A handle no sampler
        // claimed drops back to zero and is freed here, which is correct:
        // nothing in the restored forest references it any more.
        if restored_from_snapshot {
            if let Some(snapshot) = &state.point_store_state {
                for (handle, _) in &snapshot.points {
                    point_store.decrement_ref_count(*handle)?;
                }
            }
        }

        Ok((empty_forest, point_store))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Weighted;
    use crate::types::Handle;

    #[derive(Clone, Default)]
    struct MockSampler {
        handles: Vec<Weighted<Handle>>,
    }

    impl SamplerLike for MockSampler {
        fn sampled_handles(&self) -> Vec<Weighted<Handle>> {
            self.handles.clone()
        }

        fn restore_handles(&mut self, handles: &[Weighted<Handle>]) -> Result<()> {
            self.handles = handles.to_vec();
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct MockTree {
        structure: Option<Vec<u8>>,
    }

    impl TreeLike for MockTree {
        fn has_structure(&self) -> bool {
            self.structure.is_some()
        }

        fn structure_snapshot(&self) -> Option<Vec<u8>> {
            self.structure.clone()
        }

        fn restore_structure(&mut self, snapshot: &[u8]) -> Result<()> {
            self.structure = Some(snapshot.to_vec());
            Ok(())
        }
    }

    #[derive(Clone)]
    struct MockForest {
        dimensions: usize,
        shingle_size: usize,
        sample_size: usize,
        time_decay: f64,
        output_after: usize,
        total_updates: u64,
        samplers: Vec<MockSampler>,
        trees: Vec<MockTree>,
    }

    impl MockForest {
        fn new(number_of_trees: usize, dimensions: usize) -> Self {
            MockForest {
                dimensions,
                shingle_size: 1,
                sample_size: 256,
                time_decay: 0.001,
                output_after: 32,
                total_updates: 0,
                samplers: vec![MockSampler::default(); number_of_trees],
                trees: vec![MockTree::default(); number_of_trees],
            }
        }
    }

    impl ForestLike for MockForest {
        type Sampler = MockSampler;
        type Tree = MockTree;

        fn number_of_trees(&self) -> usize {
            self.samplers.len()
        }
        fn dimensions(&self) -> usize {
            self.dimensions
        }
        fn shingle_size(&self) -> usize {
            self.shingle_size
        }
        fn sample_size(&self) -> usize {
            self.sample_size
        }
        fn time_decay(&self) -> f64 {
            self.time_decay
        }
        fn output_after(&self) -> usize {
            self.output_after
        }
        fn total_updates(&self) -> u64 {
            self.total_updates
        }
        fn center_of_mass(&self) -> bool {
            false
        }
        fn store_sequence_indexes(&self) -> bool {
            false
        }
        fn bounding_box_caching(&self) -> bool {
            true
        }
        fn internal_shingling(&self) -> bool {
            false
        }
        fn single_precision(&self) -> bool {
            true
        }
        fn sampler(&self, tree_index: usize) -> &MockSampler {
            &self.samplers[tree_index]
        }
        fn sampler_mut(&mut self, tree_index: usize) -> &mut MockSampler {
            &mut self.samplers[tree_index]
        }
        fn tree(&self, tree_index: usize) -> Option<&MockTree> {
            Some(&self.trees[tree_index])
        }
        fn tree_mut(&mut self, tree_index: usize) -> Option<&mut MockTree> {
            Some(&mut self.trees[tree_index])
        }
    }

    fn build_populated_forest() -> (MockForest, PointStore) {
        let mut point_store = PointStore::new(4, 1, 16, false, false, None).unwrap();
        let mut forest = MockForest::new(3, 4);
        let mut handles = Vec::new();
        for i in 0..5 {
            let v = [i as f32, i as f32, i as f32, i as f32];
            handles.push(point_store.add(&v, i as u64).unwrap());
        }
        for (tree_idx, sampler) in forest.samplers.iter_mut().enumerate() {
            let picked: Vec<Handle> = handles.iter().cloned().skip(tree_idx).take(3).collect();
            for &h in &picked {
                point_store.increment_ref_count(h).unwrap();
            }
            sampler.handles = picked.into_iter().map(|h| Weighted::new(h, 1.0)).collect();
        }
        (forest, point_store)
    }

    #[test]
    fn round_trip_preserves_configuration_and_sampler_contents() {
        let (forest, point_store) = build_populated_forest();
        let mapper = ForestStateMapper::new(MapperConfig::default());
        let state = mapper.to_state(&forest, Some(&point_store)).unwrap();

        let shell = MockForest::new(3, 4);
        let context = RestoreContext {
            empty_forest: shell,
            external_point_store: None,
        };
        let (restored, restored_store) = mapper.to_model(&state, context, 42).unwrap();

        assert_eq!(restored.number_of_trees(), forest.number_of_trees());
        assert_eq!(restored.dimensions(), forest.dimensions());
        assert_eq!(restored.sample_size(), forest.sample_size());
        for i in 0..3 {
            let original: Vec<Handle> = forest.sampler(i).handles.iter().map(|w| w.value).collect();
            let restored_handles: Vec<Handle> =
                restored.sampler(i).handles.iter().map(|w| w.value).collect();
            assert_eq!(original, restored_handles);
            for &h in &restored_handles {
                assert_eq!(
                    restored_store.get_numeric_vector(h).unwrap(),
                    point_store.get_numeric_vector(h).unwrap()
                );
            }
        }
    }

    #[test]
    fn to_model_rejects_unknown_version() {
        let (forest, point_store) = build_populated_forest();
        let mapper = ForestStateMapper::new(MapperConfig::default());
        let mut state = mapper.to_state(&forest, Some(&point_store)).unwrap();
        state.version = "some-other-format-v9".to_string();

        let context = RestoreContext {
            empty_forest: MockForest::new(3, 4),
            external_point_store: None,
        };
        let err = mapper.to_model(&state, context, 1).unwrap_err();
        assert!(matches!(err, RCFError::UnsupportedVersion { .. }));
    }

    #[test]
    fn to_state_requires_point_store_when_coordinator_state_enabled() {
        let (forest, _point_store) = build_populated_forest();
        let mapper = ForestStateMapper::new(MapperConfig::default());
        let err = mapper.to_state(&forest, None).unwrap_err();
        assert!(matches!(err, RCFError::MissingState { .. }));
    }

    #[test]
    fn to_model_requires_coordinator_state_or_external_store() {
        let (forest, point_store) = build_populated_forest();
        let config = MapperConfig {
            save_coordinator_state: false,
            ..MapperConfig::default()
        };
        let mapper = ForestStateMapper::new(config);
        let state = mapper.to_state(&forest, Some(&point_store)).unwrap();
        assert!(state.point_store_state.is_none());

        let context = RestoreContext {
            empty_forest: MockForest::new(3, 4),
            external_point_store: None,
        };
        let err = mapper.to_model(&state, context, 1).unwrap_err();
        assert!(matches!(err, RCFError::MissingState { .. }));
    }

    #[test]
    fn to_model_accepts_an_externally_supplied_point_store() {
        let (forest, point_store) = build_populated_forest();
        let config = MapperConfig {
            save_coordinator_state: false,
            ..MapperConfig::default()
        };
        let mapper = ForestStateMapper::new(config);
        let state = mapper.to_state(&forest, Some(&point_store)).unwrap();

        let context = RestoreContext {
            empty_forest: MockForest::new(3, 4),
            external_point_store: Some(point_store),
        };
        let (restored, _store) = mapper.to_model(&state, context, 1).unwrap();
        assert_eq!(restored.sampler(0).handles.len(), 3);
    }

    #[test]
    fn orphaned_handle_is_freed_after_restore() {
        let mut point_store = PointStore::new(2, 1, 8, false, false, None).unwrap();
        let mut forest = MockForest::new(1, 2);
        let kept = point_store.add(&[1.0, 1.0], 0).unwrap();
        let orphan = point_store.add(&[2.0, 2.0], 1).unwrap();
        point_store.increment_ref_count(kept).unwrap();
        forest.samplers[0].handles = vec![Weighted::new(kept, 1.0)];
        // `orphan` stays live in the store (ref count 1) but no sampler
        // references it -- as if its owning tree had already evicted it
        // without yet compacting.

        let mapper = ForestStateMapper::new(MapperConfig::default());
        let state = mapper.to_state(&forest, Some(&point_store)).unwrap();
        let context = RestoreContext {
            empty_forest: MockForest::new(1, 2),
            external_point_store: None,
        };
        let (_restored, restored_store) = mapper.to_model(&state, context, 7).unwrap();

        assert!(restored_store.get_numeric_vector(kept).is_ok());
        assert!(restored_store.get_numeric_vector(orphan).is_err());
        let _ = point_store; // silence unused warning if reordered
    }
}

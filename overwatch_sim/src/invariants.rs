//! Engine-wide invariants checked after every simulated tick.

use nalgebra::Point3;
use overwatch_core::{CellKey, MonitorEngine};
use std::collections::HashSet;

/// Relative tolerance for centroid comparisons.
const CENTROID_EPSILON: f64 = 1e-6;

/// Verifies every invariant against the engine's latest pass.
///
/// `camera_position` must be the position the latest clustering pass saw.
pub fn check_all(engine: &MonitorEngine, camera_position: Point3<f64>) -> Result<(), InvariantViolation> {
    check_scene_partition(engine)?;
    check_cluster_flags(engine)?;
    check_buckets(engine, camera_position)?;
    check_focus(engine)?;
    Ok(())
}

/// Every entity is listed in the bucket of its own scene.
pub fn check_scene_partition(engine: &MonitorEngine) -> Result<(), InvariantViolation> {
    let store = engine.store();
    for (key, entity) in store.iter() {
        if !store.scene_data(entity.scene_type, &entity.origin_id).contains(&key) {
            return Err(InvariantViolation::ScenePartition(entity.id.clone()));
        }
    }
    Ok(())
}

/// `cluster_id` set ⇔ listed in that bucket ⇔ not single; exempt entities
/// are never clustered; every scene entity is accounted for exactly once.
pub fn check_cluster_flags(engine: &MonitorEngine) -> Result<(), InvariantViolation> {
    let store = engine.store();
    let clusters = engine.cluster_map();
    let singles = engine.single_data();
    let scene: HashSet<_> = engine.current_scene_data().iter().copied().collect();

    for (key, entity) in store.iter() {
        match entity.cluster_id {
            Some(cell) => {
                if entity.is_single {
                    return Err(InvariantViolation::FlagMismatch(entity.id.clone()));
                }
                if entity.is_exempt() {
                    return Err(InvariantViolation::ExemptClustered(entity.id.clone()));
                }
                if !scene.contains(&key) {
                    return Err(InvariantViolation::ClusteredOffScene(entity.id.clone()));
                }
                let listed = clusters.get(&cell).is_some_and(|b| b.members.contains(&key));
                if !listed {
                    return Err(InvariantViolation::Membership {
                        id: entity.id.clone(),
                        cell: cell.to_string(),
                    });
                }
            }
            None => {
                if !entity.is_single {
                    return Err(InvariantViolation::FlagMismatch(entity.id.clone()));
                }
                if scene.contains(&key) && !singles.contains(&key) {
                    return Err(InvariantViolation::Unaccounted(entity.id.clone()));
                }
            }
        }
    }

    let clustered: usize = clusters.values().map(|b| b.len()).sum();
    if clustered + singles.len() != scene.len() {
        return Err(InvariantViolation::Accounting {
            clustered,
            singles: singles.len(),
            scene: scene.len(),
        });
    }
    Ok(())
}

/// Buckets are non-empty, hold members of their own cell, carry the mean
/// member position and are not within dispersal range of the camera.
pub fn check_buckets(engine: &MonitorEngine, camera_position: Point3<f64>) -> Result<(), InvariantViolation> {
    let store = engine.store();
    let config = engine.cluster_config();
    let cell_size = engine.cluster_band().map(|band| config.cell_size(band));

    for (cell, bucket) in engine.cluster_map().iter() {
        if bucket.is_empty() {
            return Err(InvariantViolation::EmptyBucket(cell.to_string()));
        }

        let mut sum = nalgebra::Vector3::zeros();
        for (_, entity) in store.resolve(&bucket.members) {
            sum += entity.position.coords;
            if let Some(size) = cell_size {
                let expected = CellKey::for_position(&entity.position, size);
                if expected != *cell {
                    return Err(InvariantViolation::WrongCell {
                        id: entity.id.clone(),
                        cell: cell.to_string(),
                        expected: expected.to_string(),
                    });
                }
            }
        }

        let mean = Point3::from(sum / bucket.len() as f64);
        let error = nalgebra::distance(&mean, &bucket.centroid);
        if error > CENTROID_EPSILON * (1.0 + mean.coords.norm()) {
            return Err(InvariantViolation::Centroid {
                cell: cell.to_string(),
                error,
            });
        }

        let distance = nalgebra::distance(&bucket.centroid, &camera_position);
        if distance < config.nearest_distance {
            return Err(InvariantViolation::NotDispersed {
                cell: cell.to_string(),
                distance,
            });
        }
    }
    Ok(())
}

/// Search/follow targets stay visible and single.
pub fn check_focus(engine: &MonitorEngine) -> Result<(), InvariantViolation> {
    let targets = [engine.search_target(), engine.follow_target()];
    for id in targets.iter().flatten() {
        let Some(entity) = engine.store().get_by_id(id) else {
            return Err(InvariantViolation::DanglingTarget(id.clone()));
        };
        if !entity.visible || !entity.is_single {
            return Err(InvariantViolation::FocusClustered(id.clone()));
        }
    }
    Ok(())
}

/// A broken engine invariant.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvariantViolation {
    #[error("{0} missing from its scene bucket")]
    ScenePartition(String),

    #[error("{0} has cluster_id and is_single out of step")]
    FlagMismatch(String),

    #[error("Exempt entity {0} is clustered")]
    ExemptClustered(String),

    #[error("{0} is clustered outside the current scene")]
    ClusteredOffScene(String),

    #[error("{id} points at bucket {cell} which does not list it")]
    Membership { id: String, cell: String },

    #[error("{0} is neither clustered nor single")]
    Unaccounted(String),

    #[error("{clustered} clustered + {singles} singles != {scene} entities in scene")]
    Accounting {
        clustered: usize,
        singles: usize,
        scene: usize,
    },

    #[error("Bucket {0} is empty")]
    EmptyBucket(String),

    #[error("{id} sits in bucket {cell} but belongs in {expected}")]
    WrongCell {
        id: String,
        cell: String,
        expected: String,
    },

    #[error("Bucket {cell} centroid is off by {error:.6}")]
    Centroid { cell: String, error: f64 },

    #[error("Bucket {cell} survived at {distance:.1} from the camera")]
    NotDispersed { cell: String, distance: f64 },

    #[error("Focus target {0} no longer exists")]
    DanglingTarget(String),

    #[error("Focus target {0} is hidden or clustered")]
    FocusClustered(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::SimCamera;
    use crate::crowd::{CrowdConfig, CrowdOracle};
    use overwatch_core::{Collaborators, EngineConfig};
    use overwatch_env::{FlatProjector, RecordingHost};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_fresh_crowd_satisfies_invariants() {
        let camera = Rc::new(RefCell::new(SimCamera::new(Point3::new(0.0, 120.0, 0.0))));
        let mut engine = MonitorEngine::new(
            EngineConfig::default(),
            Box::new(FlatProjector::default()),
            Collaborators {
                camera: Box::new(camera.clone()),
                controller: Box::new(camera.clone()),
                host: Box::new(RecordingHost::default()),
            },
        )
        .unwrap();

        let mut oracle = CrowdOracle::new(9, CrowdConfig { indoor_fraction: 0.3, ..Default::default() });
        engine.apply_diff(oracle.spawn(150));
        let position = camera.borrow().position;

        assert_eq!(check_all(&engine, position), Ok(()));
    }
}

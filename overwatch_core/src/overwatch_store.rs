//! The "STORE" Engine - Canonical entity map with scene/floor partitioning
//!
//! Entities live in a `SlotMap` arena. Every other structure (scene
//! buckets, cluster buckets, the single list) refers to them by
//! [`EntityKey`], so removing an entity never leaves a dangling reference:
//! a stale key simply stops resolving.
//!
//! Scene bucketing:
//! - Outdoor: one flat list
//! - Indoor: building → floor → list, building derived from the origin id

use crate::entity::{
    EntityDiff, EntityKey, Exemptions, MarkerKind, RawEntity, TrackedEntity, WireDiff,
};
use overwatch_env::{CameraReader, PositionProjector, SceneRef, SceneType};
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;
use std::collections::HashMap;
use tracing::{debug, warn};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for the EntityStore
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Separator between the building prefix and the floor part of an
    /// origin id (default: `_`, so `"B01_F2"` belongs to building `"B01"`)
    pub building_separator: char,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            building_separator: '_',
        }
    }
}

impl StoreConfig {
    /// Derives the building id from an origin id.
    ///
    /// Origin ids without a separator are their own building.
    pub fn building_of(&self, origin_id: &str) -> String {
        origin_id
            .split(self.building_separator)
            .next()
            .unwrap_or(origin_id)
            .to_string()
    }
}

// ============================================================================
// DIFF REPORT (Output)
// ============================================================================

/// Which part of a diff an entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffOp {
    Add,
    Remove,
    Update,
}

/// A diff entry that was skipped.
#[derive(Debug, Clone)]
pub struct RejectedEntry {
    pub op: DiffOp,
    /// Position of the entry within its list
    pub index: usize,
    pub error: DiffError,
}

/// An entity that left the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovedEntity {
    pub id: String,
    pub key: EntityKey,
}

/// Outcome of applying one diff.
#[derive(Debug, Clone, Default)]
pub struct DiffReport {
    /// Newly inserted entities
    pub added: Vec<EntityKey>,

    /// Entities replaced in place (including duplicate adds)
    pub updated: Vec<EntityKey>,

    /// Subset of `updated` that moved to another scene bucket
    pub scene_changed: Vec<EntityKey>,

    /// Entities that left the store
    pub removed: Vec<RemovedEntity>,

    /// Entries skipped as malformed
    pub rejected: Vec<RejectedEntry>,
}

impl DiffReport {
    /// Returns true if no entry was rejected.
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }

    /// Number of entries that changed the store.
    pub fn applied(&self) -> usize {
        self.added.len() + self.updated.len() + self.removed.len()
    }

    fn reject(&mut self, op: DiffOp, index: usize, error: DiffError) {
        warn!("Rejected {:?} entry #{}: {}", op, index, error);
        self.rejected.push(RejectedEntry { op, index, error });
    }
}

/// What happened to a single add/update entry.
enum Applied {
    Inserted(EntityKey),
    Replaced { key: EntityKey, scene_changed: bool },
}

// ============================================================================
// SCENE BUCKETS
// ============================================================================

#[derive(Debug, Default)]
struct SceneBuckets {
    outdoor: Vec<EntityKey>,
    indoor: HashMap<String, HashMap<String, Vec<EntityKey>>>,
}

impl SceneBuckets {
    fn get(&self, scene_type: SceneType, building_id: &str, origin_id: &str) -> &[EntityKey] {
        match scene_type {
            SceneType::Outdoor => &self.outdoor,
            SceneType::Indoor => self
                .indoor
                .get(building_id)
                .and_then(|floors| floors.get(origin_id))
                .map(Vec::as_slice)
                .unwrap_or(&[]),
        }
    }

    fn insert(&mut self, entity: &TrackedEntity, key: EntityKey) {
        match entity.scene_type {
            SceneType::Outdoor => self.outdoor.push(key),
            SceneType::Indoor => self
                .indoor
                .entry(entity.building_id.clone())
                .or_default()
                .entry(entity.origin_id.clone())
                .or_default()
                .push(key),
        }
    }

    fn remove(&mut self, entity: &TrackedEntity, key: EntityKey) {
        match entity.scene_type {
            SceneType::Outdoor => self.outdoor.retain(|k| *k != key),
            SceneType::Indoor => {
                if let Some(floors) = self.indoor.get_mut(&entity.building_id) {
                    if let Some(list) = floors.get_mut(&entity.origin_id) {
                        list.retain(|k| *k != key);
                        // Clean up empty floors and buildings
                        if list.is_empty() {
                            floors.remove(&entity.origin_id);
                        }
                    }
                    if floors.is_empty() {
                        self.indoor.remove(&entity.building_id);
                    }
                }
            }
        }
    }
}

// ============================================================================
// ENTITY STORE
// ============================================================================

/// Canonical store of tracked entities.
///
/// Applies incremental diffs and answers scene-bucket lookups. The store
/// owns the position projector: positions are computed exactly once per
/// add/update and never recomputed afterwards.
pub struct EntityStore {
    /// Entity arena
    entities: SlotMap<EntityKey, TrackedEntity>,

    /// Feed id → arena key
    ids: HashMap<String, EntityKey>,

    /// Indoor/outdoor partitions
    scenes: SceneBuckets,

    projector: Box<dyn PositionProjector>,

    config: StoreConfig,
}

impl EntityStore {
    /// Create a new EntityStore with default configuration.
    pub fn new(projector: Box<dyn PositionProjector>) -> Self {
        Self::with_config(projector, StoreConfig::default())
    }

    /// Create a new EntityStore with the given configuration.
    pub fn with_config(projector: Box<dyn PositionProjector>, config: StoreConfig) -> Self {
        Self {
            entities: SlotMap::with_key(),
            ids: HashMap::new(),
            scenes: SceneBuckets::default(),
            projector,
            config,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    // ========================================================================
    // DIFF APPLICATION
    // ========================================================================

    /// Applies an incremental diff: every add, then every remove, then every
    /// update.
    ///
    /// Entries are applied independently. A malformed entry is logged and
    /// skipped; the rest of the batch still applies. Removing or updating an
    /// unknown id is a no-op.
    pub fn apply_diff(&mut self, diff: EntityDiff) -> DiffReport {
        self.apply_entries(
            diff.add.into_iter().map(Ok),
            diff.remove.into_iter().map(Ok),
            diff.update.into_iter().map(Ok),
        )
    }

    /// Applies a diff in its JSON wire form.
    ///
    /// Only a body that is not a `{add, remove, update}` object fails as a
    /// whole. Each entry is decoded on its own, so an entry with a bad
    /// `sceneType` or an incomplete coordinate lands in
    /// [`DiffReport::rejected`] as [`DiffError::Malformed`] while its
    /// siblings still apply.
    pub fn apply_diff_json(&mut self, json: &str) -> Result<DiffReport, serde_json::Error> {
        let wire = WireDiff::from_json(json)?;
        Ok(self.apply_entries(
            wire.add.into_iter().map(WireDiff::decode_entry),
            wire.remove.into_iter().map(WireDiff::decode_removal),
            wire.update.into_iter().map(WireDiff::decode_entry),
        ))
    }

    fn apply_entries(
        &mut self,
        add: impl IntoIterator<Item = Result<RawEntity, DiffError>>,
        remove: impl IntoIterator<Item = Result<RawEntity, DiffError>>,
        update: impl IntoIterator<Item = Result<RawEntity, DiffError>>,
    ) -> DiffReport {
        let mut report = DiffReport::default();

        for (index, entry) in add.into_iter().enumerate() {
            match entry.and_then(|raw| self.add(raw)) {
                Ok(applied) => Self::record(&mut report, applied),
                Err(error) => report.reject(DiffOp::Add, index, error),
            }
        }

        for (index, entry) in remove.into_iter().enumerate() {
            let raw = match entry {
                Ok(raw) => raw,
                Err(error) => {
                    report.reject(DiffOp::Remove, index, error);
                    continue;
                }
            };
            let Some(id) = raw.valid_id() else {
                report.reject(DiffOp::Remove, index, DiffError::MissingId);
                continue;
            };
            match self.remove(id) {
                Some(key) => report.removed.push(RemovedEntity {
                    id: id.to_string(),
                    key,
                }),
                None => debug!("Remove of unknown id {} ignored", id),
            }
        }

        for (index, entry) in update.into_iter().enumerate() {
            match entry.and_then(|raw| self.update(raw)) {
                Ok(Some(applied)) => Self::record(&mut report, applied),
                Ok(None) => {}
                Err(error) => report.reject(DiffOp::Update, index, error),
            }
        }

        debug!(
            "Diff applied: +{} ~{} -{} ({} rejected, {} entities)",
            report.added.len(),
            report.updated.len(),
            report.removed.len(),
            report.rejected.len(),
            self.len()
        );

        report
    }

    fn record(report: &mut DiffReport, applied: Applied) {
        match applied {
            Applied::Inserted(key) => report.added.push(key),
            Applied::Replaced { key, scene_changed } => {
                report.updated.push(key);
                if scene_changed {
                    report.scene_changed.push(key);
                }
            }
        }
    }

    /// Inserts a new entity. A known id is replaced in place instead.
    fn add(&mut self, raw: RawEntity) -> Result<Applied, DiffError> {
        let id = raw.valid_id().ok_or(DiffError::MissingId)?.to_string();

        if let Some(&key) = self.ids.get(&id) {
            debug!("Add of known id {} applied as update", id);
            return self.replace(key, id, raw);
        }

        let entity = self.materialize(id.clone(), raw)?;
        let key = self.entities.insert(entity);
        self.ids.insert(id, key);

        if let Some(entity) = self.entities.get(key) {
            self.scenes.insert(entity, key);
        }

        Ok(Applied::Inserted(key))
    }

    /// Replaces a known entity. Returns `Ok(None)` for unknown ids.
    fn update(&mut self, raw: RawEntity) -> Result<Option<Applied>, DiffError> {
        let id = raw.valid_id().ok_or(DiffError::MissingId)?.to_string();

        match self.ids.get(&id) {
            Some(&key) => self.replace(key, id, raw).map(Some),
            None => {
                debug!("Update of unknown id {} ignored", id);
                Ok(None)
            }
        }
    }

    /// Swaps in a freshly projected representation under the same key.
    ///
    /// Exemptions and visibility carry over. Cluster membership carries over
    /// only if the entity stays in its scene bucket.
    fn replace(&mut self, key: EntityKey, id: String, raw: RawEntity) -> Result<Applied, DiffError> {
        let mut fresh = self.materialize(id, raw)?;

        let Some(slot) = self.entities.get_mut(key) else {
            return Err(DiffError::Stale(fresh.id));
        };

        let scene_changed =
            slot.scene_type != fresh.scene_type || slot.origin_id != fresh.origin_id;

        fresh.exemptions = slot.exemptions;
        fresh.visible = slot.visible;
        if !scene_changed {
            fresh.cluster_id = slot.cluster_id;
            fresh.is_single = slot.is_single;
        }

        let old = std::mem::replace(slot, fresh);

        if scene_changed {
            self.scenes.remove(&old, key);
            if let Some(entity) = self.entities.get(key) {
                self.scenes.insert(entity, key);
            }
        }

        Ok(Applied::Replaced { key, scene_changed })
    }

    /// Detaches an entity from the map and its scene bucket.
    fn remove(&mut self, id: &str) -> Option<EntityKey> {
        let key = self.ids.remove(id)?;
        let entity = self.entities.remove(key)?;
        self.scenes.remove(&entity, key);
        Some(key)
    }

    /// Projects a raw entry into a detached entity.
    fn materialize(&self, id: String, raw: RawEntity) -> Result<TrackedEntity, DiffError> {
        let coordinate = raw
            .coordinate
            .ok_or_else(|| DiffError::MissingCoordinate(id.clone()))?;

        let position = self
            .projector
            .project(&coordinate, &raw.origin_id, raw.scene_type)
            .map_err(|e| DiffError::Projection {
                id: id.clone(),
                reason: e.to_string(),
            })?;

        Ok(TrackedEntity {
            building_id: self.config.building_of(&raw.origin_id),
            kind: MarkerKind::from_type_str(&raw.kind),
            id,
            name: raw.name,
            origin_id: raw.origin_id,
            scene_type: raw.scene_type,
            coordinate,
            position,
            cluster_id: None,
            is_single: true,
            visible: true,
            exemptions: Exemptions::empty(),
        })
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    /// Resolves a key to its entity.
    pub fn get(&self, key: EntityKey) -> Option<&TrackedEntity> {
        self.entities.get(key)
    }

    /// Resolves a key to its entity, mutably.
    pub fn get_mut(&mut self, key: EntityKey) -> Option<&mut TrackedEntity> {
        self.entities.get_mut(key)
    }

    /// Looks up the key of a feed id.
    pub fn key_of(&self, id: &str) -> Option<EntityKey> {
        self.ids.get(id).copied()
    }

    /// Looks up an entity by feed id.
    pub fn get_by_id(&self, id: &str) -> Option<&TrackedEntity> {
        self.key_of(id).and_then(|key| self.get(key))
    }

    /// All entities with their keys.
    pub fn iter(&self) -> impl Iterator<Item = (EntityKey, &TrackedEntity)> {
        self.entities.iter()
    }

    /// All entities, mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (EntityKey, &mut TrackedEntity)> {
        self.entities.iter_mut()
    }

    /// Number of tracked entities.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    // ========================================================================
    // SCENE QUERIES
    // ========================================================================

    /// Live key list of one scene bucket.
    ///
    /// Outdoor ignores `origin_id`. Unknown buckets yield an empty slice.
    pub fn scene_data(&self, scene_type: SceneType, origin_id: &str) -> &[EntityKey] {
        let building_id = self.config.building_of(origin_id);
        self.scenes.get(scene_type, &building_id, origin_id)
    }

    /// Live key list of the bucket named by `scene`.
    pub fn scene_keys(&self, scene: &SceneRef) -> &[EntityKey] {
        self.scene_data(scene.scene_type, &scene.origin_id)
    }

    /// Live key list of the bucket the camera is currently showing.
    pub fn current_scene_data(&self, camera: &dyn CameraReader) -> &[EntityKey] {
        self.scene_keys(&camera.current_scene())
    }

    /// Resolves a key list into entities, skipping stale keys.
    pub fn resolve<'a>(
        &'a self,
        keys: &'a [EntityKey],
    ) -> impl Iterator<Item = (EntityKey, &'a TrackedEntity)> + 'a {
        keys.iter()
            .filter_map(move |&key| self.get(key).map(|entity| (key, entity)))
    }

    /// Buildings with at least one indoor entity.
    pub fn buildings(&self) -> Vec<&str> {
        let mut buildings: Vec<&str> = self.scenes.indoor.keys().map(String::as_str).collect();
        buildings.sort_unstable();
        buildings
    }

    /// Floors of a building with at least one entity.
    pub fn floors(&self, building_id: &str) -> Vec<&str> {
        let mut floors: Vec<&str> = self
            .scenes
            .indoor
            .get(building_id)
            .map(|floors| floors.keys().map(String::as_str).collect())
            .unwrap_or_default();
        floors.sort_unstable();
        floors
    }
}

/// Errors that reject a single diff entry.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DiffError {
    #[error("Entry has no id")]
    MissingId,

    #[error("Entry {0} has no coordinate")]
    MissingCoordinate(String),

    #[error("Projection failed for {id}: {reason}")]
    Projection { id: String, reason: String },

    #[error("Entry {0} points at a released slot")]
    Stale(String),

    #[error("Malformed entry {}: {reason}", .id.as_deref().unwrap_or("without id"))]
    Malformed { id: Option<String>, reason: String },
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overwatch_cluster::CellKey;
    use overwatch_env::{Coordinate, FixedCamera, FlatProjector};

    fn store() -> EntityStore {
        EntityStore::new(Box::new(FlatProjector::default()))
    }

    fn indoor(id: &str, origin: &str, x: f64) -> RawEntity {
        RawEntity::new(id, origin, SceneType::Indoor, Coordinate::new(x, 0.0, 0.0)).with_kind("staff")
    }

    fn outdoor(id: &str, x: f64, z: f64) -> RawEntity {
        RawEntity::new(id, "site", SceneType::Outdoor, Coordinate::new(x, 0.0, z))
    }

    #[test]
    fn test_add_partitions_by_scene() {
        let mut store = store();
        let report = store.apply_diff(EntityDiff {
            add: vec![
                indoor("p1", "B1_F1", 0.0),
                indoor("p2", "B1_F2", 0.0),
                outdoor("v1", 5.0, 5.0),
            ],
            ..Default::default()
        });

        assert!(report.is_clean());
        assert_eq!(report.added.len(), 3);
        assert_eq!(store.len(), 3);
        assert_eq!(store.scene_data(SceneType::Indoor, "B1_F1").len(), 1);
        assert_eq!(store.scene_data(SceneType::Indoor, "B1_F2").len(), 1);
        assert_eq!(store.scene_data(SceneType::Outdoor, "anything").len(), 1);
        assert_eq!(store.buildings(), vec!["B1"]);
        assert_eq!(store.floors("B1"), vec!["B1_F1", "B1_F2"]);

        let p1 = store.get_by_id("p1").unwrap();
        assert_eq!(p1.building_id, "B1");
        assert_eq!(p1.kind, MarkerKind::Staff);
        assert!(p1.is_single);
        assert!(p1.cluster_id.is_none());
    }

    #[test]
    fn test_unknown_bucket_is_empty() {
        let store = store();
        assert!(store.scene_data(SceneType::Indoor, "B9_F9").is_empty());
        assert!(store.scene_data(SceneType::Outdoor, "").is_empty());
    }

    #[test]
    fn test_current_scene_follows_camera() {
        let mut store = store();
        store.apply_diff(EntityDiff {
            add: vec![indoor("p1", "B1_F1", 0.0), outdoor("v1", 0.0, 0.0)],
            ..Default::default()
        });

        let camera = FixedCamera::indoor("B1_F1", [0.0, 50.0, 0.0]);
        let keys = store.current_scene_data(&camera);
        assert_eq!(keys.len(), 1);
        assert_eq!(store.get(keys[0]).unwrap().id, "p1");
    }

    #[test]
    fn test_floor_change_rebuckets() {
        // diff1 adds p1 on F1, diff2 moves it to F2
        let mut store = store();
        store.apply_diff(EntityDiff {
            add: vec![indoor("p1", "F1", 1.0)],
            ..Default::default()
        });
        let key = store.key_of("p1").unwrap();

        let report = store.apply_diff(EntityDiff {
            update: vec![indoor("p1", "F2", 2.0)],
            ..Default::default()
        });

        assert_eq!(report.scene_changed, vec![key]);
        assert!(store.scene_data(SceneType::Indoor, "F1").is_empty());
        assert_eq!(store.scene_data(SceneType::Indoor, "F2"), &[key]);

        let p1 = store.get(key).unwrap();
        assert_eq!(p1.id, "p1");
        assert_eq!(p1.kind, MarkerKind::Staff);
        assert_eq!(p1.position.x, 2.0);
    }

    #[test]
    fn test_update_carries_exemptions() {
        let mut store = store();
        store.apply_diff(EntityDiff {
            add: vec![indoor("p1", "B1_F1", 0.0)],
            ..Default::default()
        });
        let key = store.key_of("p1").unwrap();
        {
            let entity = store.get_mut(key).unwrap();
            entity.exemptions = Exemptions::SEARCHED;
            entity.visible = true;
        }

        store.apply_diff(EntityDiff {
            update: vec![indoor("p1", "B1_F3", 4.0)],
            ..Default::default()
        });

        let entity = store.get(key).unwrap();
        assert_eq!(entity.exemptions, Exemptions::SEARCHED);
        assert!(entity.is_single);
        assert!(entity.cluster_id.is_none());
    }

    #[test]
    fn test_same_scene_update_keeps_cluster_state() {
        let mut store = store();
        store.apply_diff(EntityDiff {
            add: vec![outdoor("v1", 0.0, 0.0)],
            ..Default::default()
        });
        let key = store.key_of("v1").unwrap();
        {
            let entity = store.get_mut(key).unwrap();
            entity.cluster_id = Some(CellKey::new(0, 0));
            entity.is_single = false;
        }

        let report = store.apply_diff(EntityDiff {
            update: vec![outdoor("v1", 3.0, 0.0)],
            ..Default::default()
        });

        assert!(report.scene_changed.is_empty());
        let entity = store.get(key).unwrap();
        assert_eq!(entity.cluster_id, Some(CellKey::new(0, 0)));
        assert!(!entity.is_single);
        assert_eq!(entity.position.x, 3.0);
    }

    #[test]
    fn test_malformed_entries_are_skipped_individually() {
        let mut store = store();
        let no_coordinate = RawEntity {
            id: Some("p2".into()),
            origin_id: "site".into(),
            ..Default::default()
        };
        let report = store.apply_diff(EntityDiff {
            add: vec![RawEntity::default(), no_coordinate, outdoor("p3", 0.0, 0.0)],
            remove: vec![RawEntity::default()],
            ..Default::default()
        });

        assert_eq!(report.rejected.len(), 3);
        assert_eq!(report.rejected[0].error, DiffError::MissingId);
        assert_eq!(report.rejected[1].error, DiffError::MissingCoordinate("p2".into()));
        assert_eq!(report.rejected[2].op, DiffOp::Remove);
        assert_eq!(store.len(), 1);
        assert!(store.get_by_id("p3").is_some());
    }

    #[test]
    fn test_json_batch_keeps_good_entries_beside_bad_scene_type() {
        let mut store = store();
        let report = store
            .apply_diff_json(
                r#"{"add": [
                    {"id": "good", "coordinate": {"x": 1.0, "y": 0.0, "z": 1.0},
                     "originId": "site", "sceneType": 0},
                    {"id": "bad", "coordinate": {"x": 2.0, "y": 0.0, "z": 2.0},
                     "originId": "site", "sceneType": 7}
                ]}"#,
            )
            .unwrap();

        assert_eq!(report.added.len(), 1);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].op, DiffOp::Add);
        assert_eq!(report.rejected[0].index, 1);
        assert!(matches!(
            &report.rejected[0].error,
            DiffError::Malformed { id: Some(id), .. } if id == "bad"
        ));
        assert_eq!(store.len(), 1);
        assert!(store.get_by_id("good").is_some());
        assert!(store.get_by_id("bad").is_none());
    }

    #[test]
    fn test_json_batch_keeps_good_entries_beside_incomplete_coordinate() {
        let mut store = store();
        store
            .apply_diff_json(
                r#"{"add": [{"id": "v1", "coordinate": {"x": 0.0, "y": 0.0, "z": 0.0}}]}"#,
            )
            .unwrap();

        let report = store
            .apply_diff_json(
                r#"{"update": [
                    {"id": "v1", "coordinate": {"x": 1.0, "z": 1.0}},
                    {"id": "v1", "coordinate": {"x": 5.0, "y": 0.0, "z": 5.0}}
                ], "add": [
                    {"id": "v2", "coordinate": {"x": 3.0, "z": 3.0}},
                    {"id": "v3", "coordinate": {"x": 4.0, "y": 0.0, "z": 4.0}}
                ]}"#,
            )
            .unwrap();

        assert_eq!(report.added.len(), 1);
        assert_eq!(report.updated.len(), 1);
        assert_eq!(report.rejected.len(), 2);
        assert_eq!(report.rejected[0].op, DiffOp::Add);
        assert_eq!(report.rejected[0].index, 0);
        assert_eq!(report.rejected[1].op, DiffOp::Update);
        assert_eq!(report.rejected[1].index, 0);
        assert!(report
            .rejected
            .iter()
            .all(|entry| matches!(entry.error, DiffError::Malformed { .. })));

        assert!(store.get_by_id("v2").is_none());
        assert!(store.get_by_id("v3").is_some());
        assert_eq!(store.get_by_id("v1").unwrap().coordinate.x, 5.0);
    }

    #[test]
    fn test_json_body_that_is_not_a_diff_fails() {
        let mut store = store();
        assert!(store.apply_diff_json("[1, 2, 3]").is_err());
        assert!(store.apply_diff_json(r#"{"add": {"id": "p1"}}"#).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn test_projection_failure_rejects_entry() {
        let mut store = store();
        let report = store.apply_diff(EntityDiff {
            add: vec![outdoor("bad", f64::INFINITY, 0.0), outdoor("good", 1.0, 1.0)],
            ..Default::default()
        });

        assert_eq!(report.rejected.len(), 1);
        assert!(matches!(report.rejected[0].error, DiffError::Projection { .. }));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_unknown_ids_are_noops() {
        let mut store = store();
        let report = store.apply_diff(EntityDiff {
            remove: vec![RawEntity::removal("ghost")],
            update: vec![outdoor("ghost", 0.0, 0.0)],
            ..Default::default()
        });

        assert!(report.is_clean());
        assert_eq!(report.applied(), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_remove_then_update_in_one_diff() {
        let mut store = store();
        store.apply_diff(EntityDiff {
            add: vec![outdoor("v1", 0.0, 0.0)],
            ..Default::default()
        });

        let report = store.apply_diff(EntityDiff {
            remove: vec![RawEntity::removal("v1")],
            update: vec![outdoor("v1", 9.0, 9.0)],
            ..Default::default()
        });

        assert_eq!(report.removed.len(), 1);
        assert!(report.updated.is_empty());
        assert!(store.get_by_id("v1").is_none());
        assert!(store.scene_data(SceneType::Outdoor, "").is_empty());
    }

    #[test]
    fn test_duplicate_add_replaces() {
        let mut store = store();
        store.apply_diff(EntityDiff {
            add: vec![outdoor("v1", 0.0, 0.0)],
            ..Default::default()
        });
        let report = store.apply_diff(EntityDiff {
            add: vec![outdoor("v1", 7.0, 0.0)],
            ..Default::default()
        });

        assert!(report.added.is_empty());
        assert_eq!(report.updated.len(), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.scene_data(SceneType::Outdoor, "").len(), 1);
        assert_eq!(store.get_by_id("v1").unwrap().position.x, 7.0);
    }

    #[test]
    fn test_stale_keys_stop_resolving() {
        let mut store = store();
        store.apply_diff(EntityDiff {
            add: vec![outdoor("a", 0.0, 0.0)],
            ..Default::default()
        });
        let old_key = store.key_of("a").unwrap();

        store.apply_diff(EntityDiff {
            remove: vec![RawEntity::removal("a")],
            ..Default::default()
        });
        store.apply_diff(EntityDiff {
            add: vec![outdoor("b", 0.0, 0.0)],
            ..Default::default()
        });

        let new_key = store.key_of("b").unwrap();
        assert_ne!(new_key, old_key);
        assert!(store.get(old_key).is_none());

        let live: Vec<EntityKey> = store.resolve(&[old_key, new_key]).map(|(key, _)| key).collect();
        assert_eq!(live, vec![new_key]);
        assert_eq!(store.get(new_key).unwrap().id, "b");
    }

    #[test]
    fn test_empty_floors_are_pruned() {
        let mut store = store();
        store.apply_diff(EntityDiff {
            add: vec![indoor("p1", "B2_F1", 0.0)],
            ..Default::default()
        });
        store.apply_diff(EntityDiff {
            remove: vec![RawEntity::removal("p1")],
            ..Default::default()
        });

        assert!(store.buildings().is_empty());
        assert!(store.floors("B2").is_empty());
    }
}

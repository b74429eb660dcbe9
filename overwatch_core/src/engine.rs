//! MonitorEngine - the facade the dashboard talks to.
//!
//! Owns the store, the built-in modules and the collaborators. Every
//! mutating call ends in exactly one orchestration run; camera moves
//! re-enter the clusterer directly.

use crate::box_select::{Anchor, BoxSelect, BoxSelectError, PointOutcome};
use crate::config::{ConfigError, EngineConfig};
use crate::entity::{EntityDiff, EntityKey, MarkerKind};
use crate::filter::FilterModule;
use crate::focus::{FollowModule, SearchModule};
use crate::overwatch_cluster::{
    CellKey, ClusterBucket, ClusterConfig, ClusterStats, SpatialClusterer, ZoomBand,
};
use crate::overwatch_store::{DiffReport, EntityStore};
use crate::pipeline::{ModuleHandle, PassContext, PassOutcome, UpdatePipeline};
use nalgebra::Point3;
use overwatch_env::{CameraController, CameraReader, HostChannel, PositionProjector, SelectionReport};
use std::cell::{Ref, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use tracing::{debug, warn};

/// The host-side collaborators the engine calls into.
pub struct Collaborators {
    pub camera: Box<dyn CameraReader>,
    pub controller: Box<dyn CameraController>,
    pub host: Box<dyn HostChannel>,
}

/// Camera notifications from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraEvent {
    /// Position or altitude changed
    Moved,

    /// The operator switched floor or scene
    FloorChanged,
}

pub struct MonitorEngine {
    store: EntityStore,
    pipeline: UpdatePipeline,

    filter: Rc<RefCell<FilterModule>>,
    clusterer: Rc<RefCell<SpatialClusterer>>,
    box_select: Rc<RefCell<BoxSelect>>,
    search: Rc<RefCell<SearchModule>>,
    follow: Rc<RefCell<FollowModule>>,

    camera: Box<dyn CameraReader>,
    controller: Box<dyn CameraController>,
    host: Box<dyn HostChannel>,

    /// Last panning state pushed to the controller
    panning: Option<bool>,
}

impl MonitorEngine {
    /// Builds an engine with the built-in modules registered.
    pub fn new(
        config: EngineConfig,
        projector: Box<dyn PositionProjector>,
        collaborators: Collaborators,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let filter = Rc::new(RefCell::new(FilterModule::new()));
        let clusterer = Rc::new(RefCell::new(SpatialClusterer::new(config.cluster)));
        let box_select = Rc::new(RefCell::new(BoxSelect::new(config.box_select)));
        let search = Rc::new(RefCell::new(SearchModule::new(config.focus.clone())));
        let follow = Rc::new(RefCell::new(FollowModule::new(config.focus)));

        let mut pipeline = UpdatePipeline::new(config.pipeline);
        pipeline.add(filter.clone());
        pipeline.add(clusterer.clone());
        pipeline.add(box_select.clone());
        pipeline.add(search.clone());
        pipeline.add(follow.clone());

        Ok(Self {
            store: EntityStore::with_config(projector, config.store),
            pipeline,
            filter,
            clusterer,
            box_select,
            search,
            follow,
            camera: collaborators.camera,
            controller: collaborators.controller,
            host: collaborators.host,
            panning: None,
        })
    }

    // ========================================================================
    // ORCHESTRATION
    // ========================================================================

    /// Runs every registered module in order.
    pub fn update_modules(&mut self) -> PassOutcome {
        let mut ctx = PassContext::new(
            &mut self.store,
            self.camera.as_ref(),
            self.controller.as_mut(),
            self.host.as_mut(),
        );
        let outcome = self.pipeline.run(&mut ctx);
        debug!("Update run finished after {} passes", outcome.passes);
        outcome
    }

    /// Applies a diff and runs the modules.
    pub fn apply_diff(&mut self, diff: EntityDiff) -> DiffReport {
        let report = self.store.apply_diff(diff);
        self.settle_diff(&report);
        report
    }

    /// Parses a JSON diff and applies it.
    ///
    /// Malformed entries are rejected one by one; only a body that is not a
    /// diff object fails outright.
    pub fn apply_diff_json(&mut self, json: &str) -> Result<DiffReport, serde_json::Error> {
        let report = self.store.apply_diff_json(json)?;
        self.settle_diff(&report);
        Ok(report)
    }

    /// Drops removed keys from clustering and focus, then runs the modules.
    fn settle_diff(&mut self, report: &DiffReport) {
        {
            let mut clusterer = self.clusterer.borrow_mut();
            for removed in &report.removed {
                clusterer.detach(&mut self.store, removed.key);
            }
            for &key in &report.scene_changed {
                clusterer.detach(&mut self.store, key);
            }
        }

        for removed in &report.removed {
            if self.search.borrow_mut().forget(removed.key) {
                debug!("Search target {} removed", removed.id);
            }
            if self.follow.borrow_mut().forget(removed.key) {
                debug!("Follow target {} removed", removed.id);
            }
        }

        self.sync_panning();
        self.update_modules();
    }

    /// Reacts to a camera notification.
    ///
    /// A move only reclusters (zoom band and dispersal depend on the camera);
    /// a floor change runs every module.
    pub fn handle_camera_event(&mut self, event: CameraEvent) {
        match event {
            CameraEvent::Moved => {
                let mut clusterer = self.clusterer.borrow_mut();
                clusterer.recluster(&mut self.store, self.camera.as_ref());
            }
            CameraEvent::FloorChanged => {
                self.update_modules();
            }
        }
    }

    /// Panning is allowed only while nothing is searched or followed.
    fn sync_panning(&mut self) {
        let focused = self.search.borrow().is_active() || self.follow.borrow().is_active();
        let enabled = !focused;
        if self.panning != Some(enabled) {
            self.controller.set_panning_enabled(enabled);
            self.panning = Some(enabled);
        }
    }

    // ========================================================================
    // SEARCH / FOLLOW
    // ========================================================================

    /// Searches an entity by id.
    pub fn search(&mut self, id: &str) -> Result<(), EngineError> {
        let key = self.require(id)?;
        let current = self.camera.current_scene();
        self.search.borrow_mut().search(
            &mut self.store,
            &mut self.clusterer.borrow_mut(),
            self.controller.as_mut(),
            &current,
            key,
        );
        self.sync_panning();
        self.update_modules();
        Ok(())
    }

    /// Ends the search, if any.
    pub fn clear_search(&mut self) {
        let cleared = self.search.borrow_mut().clear(&mut self.store);
        if cleared.is_some() {
            self.sync_panning();
            self.update_modules();
        }
    }

    /// Follows an entity by id.
    pub fn follow(&mut self, id: &str) -> Result<(), EngineError> {
        let key = self.require(id)?;
        let current = self.camera.current_scene();
        self.follow.borrow_mut().follow(
            &mut self.store,
            &mut self.clusterer.borrow_mut(),
            self.controller.as_mut(),
            &current,
            key,
        );
        self.sync_panning();
        self.update_modules();
        Ok(())
    }

    /// Stops following, if anything is followed.
    pub fn unfollow(&mut self) {
        let cleared = self.follow.borrow_mut().clear(&mut self.store);
        if cleared.is_some() {
            self.sync_panning();
            self.update_modules();
        }
    }

    pub fn search_target(&self) -> Option<String> {
        self.search.borrow().target().map(|t| t.id.clone())
    }

    pub fn follow_target(&self) -> Option<String> {
        self.follow.borrow().target().map(|t| t.id.clone())
    }

    fn require(&self, id: &str) -> Result<EntityKey, EngineError> {
        self.store
            .key_of(id)
            .ok_or_else(|| EngineError::UnknownEntity(id.to_string()))
    }

    // ========================================================================
    // FILTER & CLUSTER SETTINGS
    // ========================================================================

    pub fn set_filter_rule(&mut self, kind: MarkerKind, visible: bool) {
        self.filter.borrow_mut().set_rule(kind, visible);
        self.update_modules();
    }

    pub fn set_filter_rules(&mut self, rules: impl IntoIterator<Item = (MarkerKind, bool)>) {
        self.filter.borrow_mut().set_rules(rules);
        self.update_modules();
    }

    pub fn clear_filter_rules(&mut self) {
        self.filter.borrow_mut().clear_rules();
        self.update_modules();
    }

    pub fn set_cluster_active(&mut self, active: bool) {
        self.clusterer.borrow_mut().set_active(active);
        self.update_modules();
    }

    pub fn set_density_factor(&mut self, k: f64) -> Result<(), ConfigError> {
        self.clusterer.borrow_mut().set_density_factor(k)?;
        self.update_modules();
        Ok(())
    }

    // ========================================================================
    // BOX SELECT
    // ========================================================================

    /// Adds a clicked ground point; a closing click runs the modules so the
    /// selection is evaluated and reported.
    pub fn box_select_add_point(&mut self, point: Point3<f64>) -> Result<PointOutcome, BoxSelectError> {
        let outcome = self.box_select.borrow_mut().add_point(point)?;
        if outcome == PointOutcome::Closed {
            self.update_modules();
        }
        Ok(outcome)
    }

    pub fn box_select_delete_point(&mut self) -> usize {
        self.box_select.borrow_mut().delete_point()
    }

    pub fn box_select_cancel(&mut self) {
        self.box_select.borrow_mut().cancel();
    }

    pub fn add_camera_anchor(&mut self, anchor: Anchor) {
        self.box_select.borrow_mut().add_camera_anchor(anchor);
    }

    pub fn add_building_anchor(&mut self, anchor: Anchor) {
        self.box_select.borrow_mut().add_building_anchor(anchor);
    }

    pub fn remove_anchor(&mut self, id: &str) -> bool {
        self.box_select.borrow_mut().remove_anchor(id)
    }

    // ========================================================================
    // EXTERNAL MODULES
    // ========================================================================

    /// Registers an external module such as a render sync.
    pub fn register_module(&mut self, module: ModuleHandle) -> bool {
        self.pipeline.add(module)
    }

    pub fn unregister_module(&mut self, module: &ModuleHandle) -> bool {
        let removed = self.pipeline.remove(module);
        if !removed {
            warn!("Unregister of a module that was never registered");
        }
        removed
    }

    /// Names of registered modules in execution order.
    pub fn module_order(&mut self) -> Vec<&'static str> {
        self.pipeline.execution_order()
    }

    // ========================================================================
    // QUERY SURFACE
    // ========================================================================

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    /// Keys of the scene bucket the camera shows.
    pub fn current_scene_data(&self) -> &[EntityKey] {
        self.store.current_scene_data(self.camera.as_ref())
    }

    pub fn is_cluster_active(&self) -> bool {
        self.clusterer.borrow().is_active()
    }

    /// Entities drawn as plain markers.
    pub fn single_data(&self) -> Ref<'_, [EntityKey]> {
        Ref::map(self.clusterer.borrow(), |c| c.singles())
    }

    /// Cluster buckets of the latest pass.
    pub fn cluster_map(&self) -> Ref<'_, HashMap<CellKey, ClusterBucket>> {
        Ref::map(self.clusterer.borrow(), |c| c.clusters())
    }

    pub fn cluster_stats(&self) -> ClusterStats {
        self.clusterer.borrow().stats()
    }

    pub fn cluster_config(&self) -> ClusterConfig {
        self.clusterer.borrow().config().clone()
    }

    /// Zoom band of the latest clustering pass.
    pub fn cluster_band(&self) -> Option<ZoomBand> {
        self.clusterer.borrow().band()
    }

    /// Selection of the closed box-select polygon, if any.
    pub fn box_select_result(&self) -> Option<SelectionReport> {
        self.box_select.borrow().result().cloned()
    }

    pub fn box_select_count(&self) -> usize {
        self.box_select.borrow().count()
    }

    pub fn total_passes(&self) -> u64 {
        self.pipeline.total_passes()
    }
}

/// Errors surfaced by engine commands.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("Unknown entity: {0}")]
    UnknownEntity(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Exemptions, RawEntity};
    use crate::pipeline::{order, Updatable};
    use approx::assert_relative_eq;
    use overwatch_env::{
        ControllerCall, Coordinate, FixedCamera, FlatProjector, HostMessage, RecordingController,
        RecordingHost, SceneRef, SceneType,
    };

    struct Harness {
        engine: MonitorEngine,
        camera: Rc<RefCell<FixedCamera>>,
        controller: Rc<RefCell<RecordingController>>,
        host: Rc<RefCell<RecordingHost>>,
    }

    fn harness(camera: FixedCamera) -> Harness {
        let camera = Rc::new(RefCell::new(camera));
        let controller = Rc::new(RefCell::new(RecordingController::new()));
        let host = Rc::new(RefCell::new(RecordingHost::default()));
        let engine = MonitorEngine::new(
            EngineConfig::default(),
            Box::new(FlatProjector::default()),
            Collaborators {
                camera: Box::new(camera.clone()),
                controller: Box::new(controller.clone()),
                host: Box::new(host.clone()),
            },
        )
        .unwrap();
        Harness {
            engine,
            camera,
            controller,
            host,
        }
    }

    fn outdoor(id: &str, x: f64, z: f64, kind: &str) -> RawEntity {
        RawEntity::new(id, "site", SceneType::Outdoor, Coordinate::new(x, 0.0, z)).with_kind(kind)
    }

    fn five_in_one_cell() -> EntityDiff {
        EntityDiff {
            add: (0..5).map(|i| outdoor(&format!("p{}", i), i as f64, i as f64, "staff")).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_module_order() {
        let mut h = harness(FixedCamera::outdoor([5_000.0, 45.0, 5_000.0]));
        assert_eq!(
            h.engine.module_order(),
            vec!["filter", "cluster", "box_select", "search", "follow"]
        );
    }

    #[test]
    fn test_diff_clusters_current_scene() {
        let mut h = harness(FixedCamera::outdoor([5_000.0, 45.0, 5_000.0]));
        let mut diff = five_in_one_cell();
        diff.add.push(RawEntity::new("in", "B1_F1", SceneType::Indoor, Coordinate::new(0.0, 0.0, 0.0)));

        let report = h.engine.apply_diff(diff);

        assert_eq!(report.added.len(), 6);
        assert_eq!(h.engine.current_scene_data().len(), 5);
        assert_eq!(h.engine.cluster_map().len(), 1);
        assert!(h.engine.single_data().is_empty());
        assert!(h.engine.is_cluster_active());
        // Panning state is pushed once
        assert_eq!(h.controller.borrow().calls, vec![ControllerCall::Panning(true)]);
    }

    #[test]
    fn test_search_in_five_member_cluster() {
        let mut h = harness(FixedCamera::outdoor([5_000.0, 45.0, 5_000.0]));
        h.engine.apply_diff(five_in_one_cell());

        h.engine.search("p3").unwrap();

        let key = h.engine.store().key_of("p3").unwrap();
        assert_eq!(h.engine.cluster_map().values().next().unwrap().len(), 4);
        assert_eq!(&*h.engine.single_data(), &[key]);
        assert!(h.engine.store().get(key).unwrap().is_single);
        assert!(!h.controller.borrow().panning_enabled);
        assert!(h.controller.borrow().last_focus().is_some());

        h.engine.clear_search();
        assert!(h.controller.borrow().panning_enabled);
        assert_eq!(h.engine.cluster_map().values().next().unwrap().len(), 5);
        assert!(h.engine.single_data().is_empty());
    }

    #[test]
    fn test_search_unknown_id() {
        let mut h = harness(FixedCamera::outdoor([5_000.0, 45.0, 5_000.0]));
        assert_eq!(
            h.engine.search("ghost"),
            Err(EngineError::UnknownEntity("ghost".into()))
        );
        assert!(h.engine.follow("ghost").is_err());
        assert!(h.engine.search_target().is_none());
    }

    #[test]
    fn test_panning_stays_off_while_either_focus_is_active() {
        let mut h = harness(FixedCamera::outdoor([5_000.0, 45.0, 5_000.0]));
        h.engine.apply_diff(five_in_one_cell());

        h.engine.search("p0").unwrap();
        h.engine.follow("p1").unwrap();
        h.engine.clear_search();
        assert!(!h.controller.borrow().panning_enabled);

        h.engine.unfollow();
        assert!(h.controller.borrow().panning_enabled);
    }

    #[test]
    fn test_removal_cascades_into_focus() {
        let mut h = harness(FixedCamera::outdoor([5_000.0, 45.0, 5_000.0]));
        h.engine.apply_diff(five_in_one_cell());
        h.engine.follow("p2").unwrap();

        h.engine.apply_diff(EntityDiff {
            remove: vec![RawEntity::removal("p2")],
            ..Default::default()
        });

        assert!(h.engine.follow_target().is_none());
        assert!(h.controller.borrow().panning_enabled);
        assert_eq!(h.engine.cluster_stats().clustered_entities, 4);
    }

    #[test]
    fn test_removal_cascades_into_search() {
        let mut h = harness(FixedCamera::outdoor([5_000.0, 45.0, 5_000.0]));
        h.engine.apply_diff(five_in_one_cell());
        h.engine.search("p3").unwrap();
        assert_eq!(h.engine.search_target().as_deref(), Some("p3"));
        assert!(!h.controller.borrow().panning_enabled);

        let report = h
            .engine
            .apply_diff_json(r#"{"remove": [{"id": "p3"}], "add": [{"id": "p9", "sceneType": 7}]}"#)
            .unwrap();

        assert_eq!(report.removed.len(), 1);
        assert_eq!(report.rejected.len(), 1);
        assert!(h.engine.search_target().is_none());
        assert!(h.controller.borrow().panning_enabled);
        assert_eq!(
            h.controller.borrow().calls.last(),
            Some(&ControllerCall::Panning(true))
        );
        assert!(h.engine.single_data().is_empty());
        assert_eq!(h.engine.cluster_stats().clustered_entities, 4);
    }

    #[test]
    fn test_camera_approach_disperses() {
        let mut h = harness(FixedCamera::outdoor([5_000.0, 45.0, 5_000.0]));
        h.engine.apply_diff(five_in_one_cell());
        assert_eq!(h.engine.cluster_map().len(), 1);

        // Centroid sits at (2, 0, 2); move about 50 units away
        h.camera.borrow_mut().position = Point3::new(2.0, 45.0, 25.0);
        h.engine.handle_camera_event(CameraEvent::Moved);

        assert!(h.engine.cluster_map().is_empty());
        assert_eq!(h.engine.single_data().len(), 5);
    }

    #[test]
    fn test_zoom_out_changes_band() {
        let mut h = harness(FixedCamera::outdoor([5_000.0, 20.0, 5_000.0]));
        h.engine.apply_diff(EntityDiff {
            add: vec![outdoor("a", 10.0, 0.0, "staff"), outdoor("b", 60.0, 0.0, "staff")],
            ..Default::default()
        });
        // S band: cell 80 / sqrt(3) = 46.2, so a and b split
        assert_eq!(h.engine.cluster_map().len(), 2);

        h.camera.borrow_mut().position.y = 300.0;
        h.engine.handle_camera_event(CameraEvent::Moved);
        assert_eq!(h.engine.cluster_map().len(), 1);
    }

    #[test]
    fn test_floor_change_switches_bucket() {
        let mut h = harness(FixedCamera::indoor("B1_F1", [5_000.0, 45.0, 5_000.0]));
        h.engine.apply_diff(EntityDiff {
            add: vec![
                RawEntity::new("a", "B1_F1", SceneType::Indoor, Coordinate::new(0.0, 0.0, 0.0)),
                RawEntity::new("b", "B1_F2", SceneType::Indoor, Coordinate::new(0.0, 0.0, 0.0)),
                RawEntity::new("c", "B1_F2", SceneType::Indoor, Coordinate::new(1.0, 0.0, 1.0)),
            ],
            ..Default::default()
        });
        assert_eq!(h.engine.cluster_stats().clustered_entities, 1);

        h.camera.borrow_mut().scene = SceneRef::indoor("B1_F2");
        h.engine.handle_camera_event(CameraEvent::FloorChanged);

        assert_eq!(h.engine.current_scene_data().len(), 2);
        assert_eq!(h.engine.cluster_stats().clustered_entities, 2);
    }

    #[test]
    fn test_filter_rule_excludes_kind() {
        let mut h = harness(FixedCamera::outdoor([5_000.0, 45.0, 5_000.0]));
        h.engine.apply_diff(EntityDiff {
            add: vec![
                outdoor("s", 0.0, 0.0, "staff"),
                outdoor("v", 0.0, 0.0, "vehicle"),
                outdoor("w", 1.0, 0.0, "staff"),
            ],
            ..Default::default()
        });

        h.engine.set_filter_rule(MarkerKind::Vehicle, false);

        let v = h.engine.store().get_by_id("v").unwrap();
        assert!(!v.visible);
        assert!(v.exemptions.contains(Exemptions::FILTERED_OUT));
        assert_eq!(h.engine.cluster_stats().clustered_entities, 2);
        assert_eq!(h.engine.single_data().len(), 1);

        h.engine.clear_filter_rules();
        assert_eq!(h.engine.cluster_stats().clustered_entities, 3);
    }

    #[test]
    fn test_cluster_toggle_and_density() {
        let mut h = harness(FixedCamera::outdoor([5_000.0, 45.0, 5_000.0]));
        h.engine.apply_diff(five_in_one_cell());

        h.engine.set_cluster_active(false);
        assert!(!h.engine.is_cluster_active());
        assert!(h.engine.cluster_map().is_empty());
        assert_eq!(h.engine.single_data().len(), 5);

        h.engine.set_cluster_active(true);
        assert!(h.engine.set_density_factor(-1.0).is_err());
        h.engine.set_density_factor(1.0).unwrap();
        assert_eq!(h.engine.cluster_map().len(), 1);
    }

    #[test]
    fn test_followed_entity_changing_floor_reenters() {
        let mut h = harness(FixedCamera::indoor("B1_F1", [5_000.0, 45.0, 5_000.0]));
        h.engine.apply_diff(EntityDiff {
            add: vec![RawEntity::new("p", "B1_F1", SceneType::Indoor, Coordinate::new(0.0, 0.0, 0.0))],
            ..Default::default()
        });
        h.engine.follow("p").unwrap();
        let before = h.engine.total_passes();

        h.engine.apply_diff(EntityDiff {
            update: vec![RawEntity::new("p", "B1_F2", SceneType::Indoor, Coordinate::new(0.0, 0.0, 0.0))],
            ..Default::default()
        });

        // One re-entry for the scene switch
        assert_eq!(h.engine.total_passes() - before, 2);
        assert!(h
            .controller
            .borrow()
            .calls
            .contains(&ControllerCall::SwitchScene(SceneRef::indoor("B1_F2"))));
        assert_eq!(h.engine.follow_target().as_deref(), Some("p"));
    }

    #[test]
    fn test_box_select_reports_once() {
        let mut h = harness(FixedCamera::outdoor([5_000.0, 45.0, 5_000.0]));
        h.engine.apply_diff(five_in_one_cell());
        h.engine.add_building_anchor(Anchor::new("B7", Point3::new(3.0, 0.0, 1.0), SceneRef::outdoor()));

        for (x, z) in [(-10.0, -10.0), (10.0, -10.0), (10.0, 10.0), (-10.0, 10.0)] {
            h.engine.box_select_add_point(Point3::new(x, 0.0, z)).unwrap();
        }
        assert_eq!(
            h.engine.box_select_add_point(Point3::new(-9.0, 0.0, -9.0)),
            Ok(PointOutcome::Closed)
        );
        h.engine.apply_diff(EntityDiff::default());

        let result = h.engine.box_select_result().unwrap();
        assert_eq!(result.person.len(), 5);
        assert_eq!(result.buildings, vec!["B7".to_string()]);
        assert_eq!(h.host.borrow().messages.len(), 1);
        assert!(matches!(h.host.borrow().messages[0], HostMessage::SelectBack(_)));

        h.engine.box_select_cancel();
        assert!(h.engine.box_select_result().is_none());
        assert_eq!(h.engine.box_select_count(), 0);
    }

    struct RenderSync {
        frames: Rc<RefCell<usize>>,
    }

    impl Updatable for RenderSync {
        fn order(&self) -> i32 {
            order::RENDER_SYNC
        }

        fn name(&self) -> &'static str {
            "render_sync"
        }

        fn update(&mut self, _ctx: &mut PassContext<'_>) {
            *self.frames.borrow_mut() += 1;
        }
    }

    #[test]
    fn test_external_module_runs_last() {
        let mut h = harness(FixedCamera::outdoor([5_000.0, 45.0, 5_000.0]));
        let frames = Rc::new(RefCell::new(0));
        let module: ModuleHandle = Rc::new(RefCell::new(RenderSync { frames: frames.clone() }));

        assert!(h.engine.register_module(module.clone()));
        assert_eq!(h.engine.module_order().last(), Some(&"render_sync"));

        h.engine.apply_diff(five_in_one_cell());
        assert_eq!(*frames.borrow(), 1);

        assert!(h.engine.unregister_module(&module));
        h.engine.apply_diff(EntityDiff::default());
        assert_eq!(*frames.borrow(), 1);
    }

    #[test]
    fn test_centroid_matches_members() {
        let mut h = harness(FixedCamera::outdoor([5_000.0, 45.0, 5_000.0]));
        h.engine.apply_diff(five_in_one_cell());

        let map = h.engine.cluster_map();
        let bucket = map.values().next().unwrap();
        assert_relative_eq!(bucket.centroid.x, 2.0);
        assert_relative_eq!(bucket.centroid.z, 2.0);
    }
}

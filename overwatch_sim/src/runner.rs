//! Scenario runner - drives the engine with a simulated crowd and operator.

use crate::camera::SimCamera;
use crate::crowd::{CrowdConfig, CrowdOracle};
use crate::invariants;
use crate::scenarios::ScenarioId;

use nalgebra::Point3;
use overwatch_core::{
    Anchor, BoxSelectError, CameraEvent, Collaborators, EngineConfig, EntityDiff, MonitorEngine,
    PointOutcome, ZoomBand,
};
use overwatch_env::{FlatProjector, HostMessage, RecordingHost, SceneRef};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, info, warn};

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Total ticks executed
    pub total_ticks: u64,

    /// Final simulation time in seconds
    pub final_time_secs: f64,

    /// Number of tracked entities at end
    pub final_entity_count: usize,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScenarioMetrics {
    /// Feed diffs handed to the engine
    pub diffs_applied: u64,

    /// Diff entries the store rejected
    pub entries_rejected: u64,

    /// Module passes the pipeline ran
    pub passes: u64,

    /// Largest bucket count seen after a tick
    pub max_clusters: usize,

    /// Largest single-marker count seen after a tick
    pub max_singles: usize,

    /// Messages posted to the host page
    pub host_messages: u64,

    /// Full invariant sweeps performed
    pub invariant_checks: u64,

    /// Camera focus/track/scene calls made by the engine
    pub focus_calls: u64,
    pub track_calls: u64,
    pub scene_switches: u64,

    /// Lasso polygons closed
    pub selections: u64,

    /// Lasso points rejected as self-intersecting
    pub rejected_points: u64,
}

/// Runs Overwatch scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Ticks per scenario
    ticks: u64,

    /// Initial crowd size
    entities: usize,

    /// Seconds per tick
    dt: f64,

    config: EngineConfig,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            ticks: 300,
            entities: 400,
            dt: 0.1,
            config: EngineConfig::default(),
        }
    }

    /// Sets the number of ticks.
    pub fn with_ticks(mut self, ticks: u64) -> Self {
        self.ticks = ticks;
        self
    }

    /// Sets the initial crowd size.
    pub fn with_entities(mut self, entities: usize) -> Self {
        self.entities = entities;
        self
    }

    /// Sets the engine configuration.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);

        let crowd = match scenario {
            ScenarioId::FloorHop => CrowdConfig {
                indoor_fraction: 0.7,
                floor_hop_probability: 0.02,
                ..Default::default()
            },
            ScenarioId::FocusChurn => CrowdConfig {
                indoor_fraction: 0.3,
                floor_hop_probability: 0.01,
                ..Default::default()
            },
            _ => CrowdConfig::default(),
        };

        let mut session = match Session::new(self.seed, self.config.clone(), crowd) {
            Ok(session) => session,
            Err(reason) => {
                return ScenarioResult {
                    scenario,
                    seed: self.seed,
                    passed: false,
                    total_ticks: 0,
                    final_time_secs: 0.0,
                    final_entity_count: 0,
                    failure_reason: Some(reason),
                    metrics: ScenarioMetrics::default(),
                }
            }
        };

        let outcome = session
            .populate(self.entities)
            .and_then(|_| match scenario {
                ScenarioId::Crowd => self.run_crowd(&mut session),
                ScenarioId::FloorHop => self.run_floor_hop(&mut session),
                ScenarioId::ZoomSweep => self.run_zoom_sweep(&mut session),
                ScenarioId::FocusChurn => self.run_focus_churn(&mut session),
                ScenarioId::Lasso => self.run_lasso(&mut session),
            });

        let metrics = session.finish();
        let passed = outcome.is_ok();
        if passed {
            info!(
                "✓ {} complete: {} diffs, {} passes, peak {} clusters",
                scenario.name(),
                metrics.diffs_applied,
                metrics.passes,
                metrics.max_clusters
            );
        }

        ScenarioResult {
            scenario,
            seed: self.seed,
            passed,
            total_ticks: session.ticks,
            final_time_secs: session.oracle.time(),
            final_entity_count: session.engine.store().len(),
            failure_reason: outcome.err(),
            metrics,
        }
    }

    /// OW-001: Crowd - random walk with churn.
    ///
    /// **Assertion**: the store mirrors the crowd (count and positions) and
    /// every invariant holds after each tick.
    fn run_crowd(&self, session: &mut Session) -> Result<(), String> {
        info!("OW-001: Crowd - random walk with churn");

        for tick in 0..self.ticks {
            let diff = session.oracle.step(self.dt);
            session.apply(diff)?;

            if tick % 20 == 10 {
                let diff = session.oracle.spawn(8);
                session.apply(diff)?;
                let diff = session.oracle.despawn(5);
                session.apply(diff)?;
            }

            session.check(tick)?;
            session.check_ground_truth(tick)?;

            if tick % 50 == 0 {
                let stats = session.engine.cluster_stats();
                debug!(
                    "  t={:.1}s | entities={} | clusters={} | singles={}",
                    session.oracle.time(),
                    session.engine.store().len(),
                    stats.clusters,
                    stats.singles
                );
            }
        }
        Ok(())
    }

    /// OW-002: FloorHop - indoor crowd with the operator switching floors.
    ///
    /// **Assertion**: the current scene bucket always holds exactly the
    /// members standing in the scene the camera shows.
    fn run_floor_hop(&self, session: &mut Session) -> Result<(), String> {
        info!("OW-002: FloorHop - floor changes on both sides");

        let scenes = session.oracle.scenes();
        for tick in 0..self.ticks {
            let diff = session.oracle.step(self.dt);
            session.apply(diff)?;

            if tick % 15 == 0 {
                let index = session.oracle.gen_range(0.0..scenes.len() as f64) as usize;
                let scene = scenes[index.min(scenes.len() - 1)].clone();
                debug!("  operator shows {}", scene);
                session.camera.borrow_mut().show(scene);
                session.engine.handle_camera_event(CameraEvent::FloorChanged);
                session.sync_camera();
            }

            session.check(tick)?;
            session.check_ground_truth(tick)?;
        }
        Ok(())
    }

    /// OW-003: ZoomSweep - altitude sweep and fly-throughs.
    ///
    /// **Assertion**: the clusterer always uses the band of the current
    /// altitude, and no bucket survives near the camera.
    fn run_zoom_sweep(&self, session: &mut Session) -> Result<(), String> {
        info!("OW-003: ZoomSweep - altitude sweep across bands");

        const ALTITUDES: [f64; 7] = [10.0, 45.0, 90.0, 180.0, 500.0, 2_000.0, 59.999];

        for tick in 0..self.ticks {
            let altitude = ALTITUDES[(tick as usize) % ALTITUDES.len()];

            // Every third tick dive onto an existing bucket
            let target = if tick % 3 == 0 {
                let clusters = session.engine.cluster_map();
                let mut centroids: Vec<Point3<f64>> = clusters.values().map(|b| b.centroid).collect();
                centroids.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.z.total_cmp(&b.z)));
                centroids.first().copied()
            } else {
                None
            };

            {
                let mut camera = session.camera.borrow_mut();
                if let Some(centroid) = target {
                    camera.fly_to(Point3::new(centroid.x, altitude, centroid.z));
                } else {
                    camera.set_altitude(altitude);
                }
            }
            session.engine.handle_camera_event(CameraEvent::Moved);
            session.sync_camera();

            let expected = ZoomBand::from_altitude(altitude);
            if session.engine.cluster_band() != Some(expected) {
                return Err(format!(
                    "tick {}: altitude {} clustered as {:?}, expected {:?}",
                    tick,
                    altitude,
                    session.engine.cluster_band(),
                    expected
                ));
            }

            if tick % 25 == 24 {
                let k = session.oracle.gen_range(1.0..5.0);
                session
                    .engine
                    .set_density_factor(k)
                    .map_err(|e| format!("tick {}: {}", tick, e))?;
                session.sync_camera();
            }

            if tick % 40 == 39 {
                session.engine.set_cluster_active(false);
                session.sync_camera();
                session.check(tick)?;
                if !session.engine.cluster_map().is_empty() {
                    return Err(format!("tick {}: buckets survived deactivation", tick));
                }
                session.engine.set_cluster_active(true);
                session.sync_camera();
            }

            let diff = session.oracle.step(self.dt);
            session.apply(diff)?;
            session.check(tick)?;
        }
        Ok(())
    }

    /// OW-004: FocusChurn - search/follow/clear with targets leaving.
    ///
    /// **Assertion**: panning is enabled exactly when nothing is searched or
    /// followed, and focus targets stay visible singles.
    fn run_focus_churn(&self, session: &mut Session) -> Result<(), String> {
        info!("OW-004: FocusChurn - search/follow churn");

        for tick in 0..self.ticks {
            let diff = session.oracle.step(self.dt);
            session.apply(diff)?;

            let roll = session.oracle.gen_range(0.0..1.0);
            if roll < 0.15 {
                if let Some(id) = session.pick_feed_id() {
                    session.engine.search(&id).map_err(|e| format!("tick {}: {}", tick, e))?;
                }
            } else if roll < 0.30 {
                if let Some(id) = session.pick_feed_id() {
                    session.engine.follow(&id).map_err(|e| format!("tick {}: {}", tick, e))?;
                }
            } else if roll < 0.38 {
                session.engine.clear_search();
            } else if roll < 0.46 {
                session.engine.unfollow();
            } else if roll < 0.56 {
                let diff = session.oracle.despawn(3);
                session.apply(diff)?;
            } else if roll < 0.62 {
                let diff = session.oracle.spawn(3);
                session.apply(diff)?;
            }
            session.sync_camera();

            if session.engine.search("missing").is_ok() {
                return Err(format!("tick {}: search of an unknown id succeeded", tick));
            }

            let focused =
                session.engine.search_target().is_some() || session.engine.follow_target().is_some();
            let panning = session.camera.borrow().panning_enabled;
            if panning == focused {
                return Err(format!(
                    "tick {}: panning {} while focus active = {}",
                    tick, panning, focused
                ));
            }

            session.check(tick)?;
        }
        Ok(())
    }

    /// OW-005: Lasso - random rectangles against brute force.
    ///
    /// **Assertion**: each closure selects exactly the visible markers and
    /// anchors inside the rectangle and reports once; bowties never close.
    fn run_lasso(&self, session: &mut Session) -> Result<(), String> {
        info!("OW-005: Lasso - polygon selection vs brute force");

        let outdoor = SceneRef::outdoor();
        let mut anchors = Vec::new();
        for i in 0..12 {
            let position = Point3::new(
                session.oracle.gen_range(-500.0..500.0),
                0.0,
                session.oracle.gen_range(-500.0..500.0),
            );
            let anchor = Anchor::new(format!("cam-{:02}", i), position, outdoor.clone());
            session.engine.add_camera_anchor(anchor.clone());
            anchors.push(anchor);
        }
        // Never selected from the outdoor scene
        session
            .engine
            .add_building_anchor(Anchor::new("B1", Point3::origin(), SceneRef::indoor("B1_F1")));

        for tick in 0..self.ticks {
            let diff = session.oracle.step(self.dt);
            session.apply(diff)?;

            if tick % 10 == 0 {
                let x0 = session.oracle.gen_range(-500.0..300.0);
                let z0 = session.oracle.gen_range(-500.0..300.0);
                let width = session.oracle.gen_range(50.0..300.0);
                let depth = session.oracle.gen_range(50.0..300.0);
                self.lasso_rectangle(session, tick, &anchors, (x0, z0), (x0 + width, z0 + depth))?;
            }

            if tick % 50 == 25 {
                self.lasso_bowtie(session, tick)?;
            }

            session.check(tick)?;
        }
        Ok(())
    }

    fn lasso_rectangle(
        &self,
        session: &mut Session,
        tick: u64,
        anchors: &[Anchor],
        (x0, z0): (f64, f64),
        (x1, z1): (f64, f64),
    ) -> Result<(), String> {
        let clicks = [
            Point3::new(x0, 0.0, z0),
            Point3::new(x1, 0.0, z0),
            Point3::new(x1, 0.0, z1),
            Point3::new(x0, 0.0, z1),
            Point3::new(x0 + 1.0, 0.0, z0 + 1.0),
        ];

        let before = session.host.borrow().messages.len();
        let mut closed = false;
        for click in clicks {
            match session.engine.box_select_add_point(click) {
                Ok(PointOutcome::Closed) => closed = true,
                Ok(_) => {}
                Err(e) => return Err(format!("tick {}: rectangle click rejected: {}", tick, e)),
            }
        }
        session.sync_camera();
        if !closed {
            return Err(format!("tick {}: rectangle did not close", tick));
        }
        session.metrics.selections += 1;

        let inside = |p: &Point3<f64>| p.x > x0 && p.x < x1 && p.z > z0 && p.z < z1;
        let store = session.engine.store();
        let mut expected_person: Vec<String> = store
            .resolve(store.scene_keys(&SceneRef::outdoor()))
            .filter(|(_, e)| e.visible && inside(&e.position))
            .map(|(_, e)| e.id.clone())
            .collect();
        let mut expected_camera: Vec<String> = anchors
            .iter()
            .filter(|a| inside(&a.position))
            .map(|a| a.id.clone())
            .collect();

        let Some(mut report) = session.engine.box_select_result() else {
            return Err(format!("tick {}: closed lasso has no result", tick));
        };
        report.person.sort();
        report.camera.sort();
        expected_person.sort();
        expected_camera.sort();

        if report.person != expected_person || report.camera != expected_camera {
            return Err(format!(
                "tick {}: lasso selected {} markers/{} anchors, brute force {}/{}",
                tick,
                report.person.len(),
                report.camera.len(),
                expected_person.len(),
                expected_camera.len()
            ));
        }
        if !report.buildings.is_empty() {
            return Err(format!("tick {}: indoor anchor selected outdoors", tick));
        }

        let posted = session.host.borrow().messages.len() - before;
        if posted != 1 {
            return Err(format!("tick {}: closure posted {} reports", tick, posted));
        }
        if !matches!(session.host.borrow().messages.last(), Some(HostMessage::SelectBack(_))) {
            return Err(format!("tick {}: last host message is not a selection", tick));
        }

        // Later passes refresh silently
        let diff = session.oracle.step(self.dt);
        session.apply(diff)?;
        let posted = session.host.borrow().messages.len() - before;
        if posted != 1 {
            return Err(format!("tick {}: selection re-posted on a later pass", tick));
        }

        session.engine.box_select_cancel();
        Ok(())
    }

    fn lasso_bowtie(&self, session: &mut Session, tick: u64) -> Result<(), String> {
        let clicks = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(100.0, 0.0, 0.0),
            Point3::new(0.0, 0.0, 100.0),
            Point3::new(100.0, 0.0, 100.0),
        ];
        for click in clicks {
            session
                .engine
                .box_select_add_point(click)
                .map_err(|e| format!("tick {}: bowtie vertex rejected early: {}", tick, e))?;
        }

        match session.engine.box_select_add_point(Point3::new(1.0, 0.0, 1.0)) {
            Err(BoxSelectError::SelfIntersection { .. }) => {
                session.metrics.rejected_points += 1;
            }
            other => {
                warn!("Bowtie closure accepted: {:?}", other);
                return Err(format!("tick {}: bowtie closed ({:?})", tick, other));
            }
        }
        if session.engine.box_select_count() != 4 || session.engine.box_select_result().is_some() {
            return Err(format!("tick {}: rejected closure changed the polygon", tick));
        }

        session.engine.box_select_cancel();
        Ok(())
    }
}

// ============================================================================
// SESSION
// ============================================================================

/// One engine wired to a simulated camera, host and crowd.
struct Session {
    engine: MonitorEngine,
    camera: Rc<RefCell<SimCamera>>,
    host: Rc<RefCell<RecordingHost>>,
    oracle: CrowdOracle,
    metrics: ScenarioMetrics,

    /// Camera position the latest clustering pass saw
    seen_position: Point3<f64>,

    ticks: u64,
}

impl Session {
    fn new(seed: u64, config: EngineConfig, crowd: CrowdConfig) -> Result<Self, String> {
        let start = Point3::new(0.0, 150.0, 0.0);
        let camera = Rc::new(RefCell::new(SimCamera::new(start)));
        let host = Rc::new(RefCell::new(RecordingHost::default()));

        let engine = MonitorEngine::new(
            config,
            Box::new(FlatProjector::default()),
            Collaborators {
                camera: Box::new(camera.clone()),
                controller: Box::new(camera.clone()),
                host: Box::new(host.clone()),
            },
        )
        .map_err(|e| format!("engine config rejected: {}", e))?;

        // Separate stream so the crowd does not depend on engine config
        let physics_seed = seed.wrapping_mul(0x9e3779b97f4a7c15);

        Ok(Self {
            engine,
            camera,
            host,
            oracle: CrowdOracle::new(physics_seed, crowd),
            metrics: ScenarioMetrics::default(),
            seen_position: start,
            ticks: 0,
        })
    }

    fn populate(&mut self, count: usize) -> Result<(), String> {
        let diff = self.oracle.spawn(count);
        self.apply(diff)
    }

    /// Feeds a diff to the engine; rejected entries fail the run.
    fn apply(&mut self, diff: EntityDiff) -> Result<(), String> {
        let report = self.engine.apply_diff(diff);
        self.metrics.diffs_applied += 1;
        self.metrics.entries_rejected += report.rejected.len() as u64;
        self.sync_camera();

        match report.rejected.first() {
            Some(entry) => Err(format!("store rejected entry {}: {}", entry.index, entry.error)),
            None => Ok(()),
        }
    }

    /// Reports a camera the engine itself moved, as a host would.
    fn sync_camera(&mut self) {
        let position = self.camera.borrow().position;
        if position != self.seen_position {
            self.engine.handle_camera_event(CameraEvent::Moved);
            self.seen_position = position;
        }
    }

    fn pick_feed_id(&mut self) -> Option<String> {
        let id = self.oracle.pick()?;
        self.oracle.member(id).map(|m| m.feed_id())
    }

    /// Runs the invariant sweep and records peaks.
    fn check(&mut self, tick: u64) -> Result<(), String> {
        self.ticks = tick + 1;
        self.metrics.invariant_checks += 1;

        let stats = self.engine.cluster_stats();
        self.metrics.max_clusters = self.metrics.max_clusters.max(stats.clusters);
        self.metrics.max_singles = self.metrics.max_singles.max(stats.singles);

        invariants::check_all(&self.engine, self.seen_position)
            .map_err(|violation| format!("tick {}: {}", tick, violation))
    }

    /// Compares the store with the crowd it mirrors.
    fn check_ground_truth(&self, tick: u64) -> Result<(), String> {
        let store = self.engine.store();
        if store.len() != self.oracle.len() {
            return Err(format!(
                "tick {}: store holds {} entities, crowd has {}",
                tick,
                store.len(),
                self.oracle.len()
            ));
        }

        for member in self.oracle.members() {
            let Some(entity) = store.get_by_id(&member.feed_id()) else {
                return Err(format!("tick {}: {} missing from store", tick, member.feed_id()));
            };
            if entity.scene() != member.scene
                || entity.position.x != member.coordinate.x
                || entity.position.z != member.coordinate.z
            {
                return Err(format!("tick {}: {} out of sync", tick, member.feed_id()));
            }
        }

        let scene = self.camera.borrow().scene.clone();
        let expected = self.oracle.members().filter(|m| m.scene.same_bucket(&scene)).count();
        let listed = self.engine.current_scene_data().len();
        if listed != expected {
            return Err(format!(
                "tick {}: scene {} lists {} entities, crowd has {}",
                tick, scene, listed, expected
            ));
        }
        Ok(())
    }

    fn finish(&mut self) -> ScenarioMetrics {
        let camera = self.camera.borrow();
        self.metrics.passes = self.engine.total_passes();
        self.metrics.host_messages = self.host.borrow().messages.len() as u64;
        self.metrics.focus_calls = camera.focus_calls;
        self.metrics.track_calls = camera.track_calls;
        self.metrics.scene_switches = camera.scene_switches;
        self.metrics.clone()
    }
}

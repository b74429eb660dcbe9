//! Search and Follow.
//!
//! Both hold at most one target and share the same exemption contract: the
//! target is pulled out of its cluster, forced visible and stays single
//! until released. Search recenters once (and again if the target changes
//! scene); Follow keeps tracking the target through every position update.
//!
//! Panning is not touched here. The engine owns the panning decision since
//! it depends on both modules at once.

use crate::entity::{EntityKey, Exemptions};
use crate::overwatch_cluster::SpatialClusterer;
use crate::overwatch_store::EntityStore;
use crate::pipeline::{order, PassContext, Updatable};
use nalgebra::{Point3, Vector3};
use overwatch_env::{CameraController, FocusRequest, SceneRef};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Recenter parameters for Search and Follow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FocusSettings {
    /// Distance from the target once the tween settles (default: 60.0)
    pub distance: f64,

    /// Tween duration in seconds (default: 1.0)
    pub duration: f64,

    /// Eye offset relative to the target
    pub offset: Vector3<f64>,
}

impl Default for FocusSettings {
    fn default() -> Self {
        Self {
            distance: 60.0,
            duration: 1.0,
            offset: Vector3::new(0.0, 40.0, 40.0),
        }
    }
}

impl FocusSettings {
    fn request(&self, position: Point3<f64>) -> FocusRequest {
        FocusRequest {
            position,
            distance: self.distance,
            duration: self.duration,
            offset: self.offset,
        }
    }
}

/// The entity a focus module is locked on.
#[derive(Debug, Clone, PartialEq)]
pub struct FocusTarget {
    pub key: EntityKey,
    pub id: String,

    /// Scene the target was last seen in
    pub scene: SceneRef,

    /// Position the camera was last sent to
    pub position: Point3<f64>,
}

/// Marks `key` with `flag`, pulls it out of its cluster and forces it
/// visible. Returns the new target, or `None` for unknown keys.
fn engage(
    store: &mut EntityStore,
    clusterer: &mut SpatialClusterer,
    key: EntityKey,
    flag: Exemptions,
) -> Option<FocusTarget> {
    let entity = store.get_mut(key)?;
    entity.exemptions.insert(flag);
    entity.visible = true;
    let target = FocusTarget {
        key,
        id: entity.id.clone(),
        scene: entity.scene(),
        position: entity.position,
    };
    clusterer.pull_from_cluster(store, key);
    Some(target)
}

fn release(store: &mut EntityStore, target: &FocusTarget, flag: Exemptions) {
    if let Some(entity) = store.get_mut(target.key) {
        entity.exemptions.remove(flag);
    }
}

/// Switches the camera to the target scene if needed, then recenters.
fn recenter(
    controller: &mut dyn CameraController,
    current: &SceneRef,
    target: &FocusTarget,
    settings: &FocusSettings,
) {
    if !current.same_bucket(&target.scene) {
        controller.switch_scene(&target.scene);
    }
    controller.focus(settings.request(target.position));
}

// ============================================================================
// SEARCH
// ============================================================================

/// One-shot "find this entity" focus.
#[derive(Debug, Default)]
pub struct SearchModule {
    settings: FocusSettings,
    target: Option<FocusTarget>,
}

impl SearchModule {
    pub fn new(settings: FocusSettings) -> Self {
        Self { settings, target: None }
    }

    pub fn target(&self) -> Option<&FocusTarget> {
        self.target.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.target.is_some()
    }

    /// Makes `key` the search target, replacing any previous one.
    ///
    /// Returns false for unknown keys; the previous target is kept then.
    pub fn search(
        &mut self,
        store: &mut EntityStore,
        clusterer: &mut SpatialClusterer,
        controller: &mut dyn CameraController,
        current: &SceneRef,
        key: EntityKey,
    ) -> bool {
        if store.get(key).is_none() {
            return false;
        }
        if let Some(previous) = self.target.take() {
            release(store, &previous, Exemptions::SEARCHED);
        }
        let Some(target) = engage(store, clusterer, key, Exemptions::SEARCHED) else {
            return false;
        };

        debug!("Searching {} in {}", target.id, target.scene);
        recenter(controller, current, &target, &self.settings);
        self.target = Some(target);
        true
    }

    /// Releases the target so it can rejoin clustering on the next pass.
    pub fn clear(&mut self, store: &mut EntityStore) -> Option<FocusTarget> {
        let target = self.target.take()?;
        release(store, &target, Exemptions::SEARCHED);
        Some(target)
    }

    /// Drops the target if it is `key`, which has left the store.
    pub fn forget(&mut self, key: EntityKey) -> bool {
        if self.target.as_ref().is_some_and(|t| t.key == key) {
            self.target = None;
            return true;
        }
        false
    }
}

impl Updatable for SearchModule {
    fn order(&self) -> i32 {
        order::FOCUS
    }

    fn name(&self) -> &'static str {
        "search"
    }

    fn update(&mut self, ctx: &mut PassContext<'_>) {
        let Some(target) = self.target.as_mut() else {
            return;
        };
        let Some(entity) = ctx.store.get_mut(target.key) else {
            self.target = None;
            return;
        };
        entity.exemptions.insert(Exemptions::SEARCHED);
        entity.visible = true;

        let scene = entity.scene();
        if scene.same_bucket(&target.scene) {
            return;
        }

        // The target changed floors: search again on the new one
        target.scene = scene;
        target.position = entity.position;
        debug!("Search target {} moved to {}", target.id, target.scene);
        let current = ctx.current_scene();
        recenter(ctx.controller, &current, target, &self.settings);
        ctx.request_pass();
    }
}

// ============================================================================
// FOLLOW
// ============================================================================

/// Continuous focus that tracks its target across updates.
#[derive(Debug, Default)]
pub struct FollowModule {
    settings: FocusSettings,
    target: Option<FocusTarget>,
}

impl FollowModule {
    pub fn new(settings: FocusSettings) -> Self {
        Self { settings, target: None }
    }

    pub fn target(&self) -> Option<&FocusTarget> {
        self.target.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.target.is_some()
    }

    /// Starts following `key`, replacing any previous target.
    ///
    /// Returns false for unknown keys.
    pub fn follow(
        &mut self,
        store: &mut EntityStore,
        clusterer: &mut SpatialClusterer,
        controller: &mut dyn CameraController,
        current: &SceneRef,
        key: EntityKey,
    ) -> bool {
        if store.get(key).is_none() {
            return false;
        }
        if let Some(previous) = self.target.take() {
            release(store, &previous, Exemptions::FOLLOWED);
        }
        let Some(target) = engage(store, clusterer, key, Exemptions::FOLLOWED) else {
            return false;
        };

        debug!("Following {} in {}", target.id, target.scene);
        recenter(controller, current, &target, &self.settings);
        self.target = Some(target);
        true
    }

    /// Stops following.
    pub fn clear(&mut self, store: &mut EntityStore) -> Option<FocusTarget> {
        let target = self.target.take()?;
        release(store, &target, Exemptions::FOLLOWED);
        Some(target)
    }

    /// Drops the target if it is `key`, which has left the store.
    pub fn forget(&mut self, key: EntityKey) -> bool {
        if self.target.as_ref().is_some_and(|t| t.key == key) {
            self.target = None;
            return true;
        }
        false
    }
}

impl Updatable for FollowModule {
    fn order(&self) -> i32 {
        order::FOCUS
    }

    fn name(&self) -> &'static str {
        "follow"
    }

    fn update(&mut self, ctx: &mut PassContext<'_>) {
        let Some(target) = self.target.as_mut() else {
            return;
        };
        let Some(entity) = ctx.store.get_mut(target.key) else {
            self.target = None;
            return;
        };
        entity.exemptions.insert(Exemptions::FOLLOWED);
        entity.visible = true;

        let scene = entity.scene();
        let position = entity.position;

        if !scene.same_bucket(&target.scene) {
            target.scene = scene;
            target.position = position;
            debug!("Followed {} moved to {}", target.id, target.scene);
            ctx.controller.switch_scene(&target.scene);
            ctx.controller.track(position, self.settings.duration);
            ctx.request_pass();
        } else if position != target.position {
            target.position = position;
            ctx.controller.track(position, self.settings.duration);
        }
    }
}

//! The "CLUSTER" Engine - Zoom-adaptive grid clustering
//!
//! Collapses spatially-near entities of the current scene into aggregates:
//! 1. Zoom band from camera altitude (S, M, L, XL, XXL)
//! 2. Cell size = band span / sqrt(density factor)
//! 3. Grid placement on the ground plane (x, z)
//! 4. Centroid per non-empty bucket
//! 5. Camera-proximity dispersal
//!
//! Buckets are rebuilt wholesale every pass; nothing is patched across pass
//! boundaries.

use crate::config::ConfigError;
use crate::entity::EntityKey;
use crate::overwatch_store::EntityStore;
use crate::pipeline::{order, PassContext, Updatable};
use nalgebra::{Point3, Vector3};
use overwatch_env::CameraReader;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for the SpatialClusterer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Clustering on/off (default: on)
    pub active: bool,

    /// Density factor `k`; cell size is `span / sqrt(k)` (default: 3.0)
    pub density_factor: f64,

    /// Clusters whose centroid is closer than this to the camera are
    /// dispersed (default: 100.0 world units)
    pub nearest_distance: f64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            active: true,
            density_factor: 3.0,
            nearest_distance: 100.0,
        }
    }
}

impl ClusterConfig {
    /// Effective grid cell size for a band.
    pub fn cell_size(&self, band: ZoomBand) -> f64 {
        band.span() / self.density_factor.sqrt()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.density_factor.is_finite() && self.density_factor > 0.0) {
            return Err(ConfigError::DensityFactor(self.density_factor));
        }
        if !(self.nearest_distance.is_finite() && self.nearest_distance >= 0.0) {
            return Err(ConfigError::NearestDistance(self.nearest_distance));
        }
        Ok(())
    }
}

// ============================================================================
// ZOOM BANDS
// ============================================================================

/// Discrete level-of-detail tier derived from camera altitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ZoomBand {
    S,
    M,
    L,
    Xl,
    Xxl,
}

/// Upper altitude bound (exclusive) of every band but the last.
const BAND_LIMITS: [(f64, ZoomBand); 4] = [
    (30.0, ZoomBand::S),
    (60.0, ZoomBand::M),
    (120.0, ZoomBand::L),
    (240.0, ZoomBand::Xl),
];

impl ZoomBand {
    /// Selects the band for a camera altitude.
    ///
    /// Negative altitudes clamp to `S`, anything past the last limit
    /// (including NaN) to `XXL`.
    pub fn from_altitude(altitude: f64) -> Self {
        BAND_LIMITS
            .iter()
            .find(|(limit, _)| altitude < *limit)
            .map(|(_, band)| *band)
            .unwrap_or(ZoomBand::Xxl)
    }

    /// Base cell span of the band.
    pub fn span(&self) -> f64 {
        match self {
            ZoomBand::S => 80.0,
            ZoomBand::M => 160.0,
            ZoomBand::L => 240.0,
            ZoomBand::Xl => 320.0,
            ZoomBand::Xxl => 400.0,
        }
    }
}

// ============================================================================
// CELLS & BUCKETS
// ============================================================================

/// Grid cell index.
///
/// Displayed as `"{ix}_{iz}"`, the bucket key the renderer sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellKey {
    pub ix: i64,
    pub iz: i64,
}

impl CellKey {
    pub fn new(ix: i64, iz: i64) -> Self {
        Self { ix, iz }
    }

    /// The cell holding `position` on the ground plane.
    pub fn for_position(position: &Point3<f64>, cell_size: f64) -> Self {
        Self {
            ix: cell_index(position.x, cell_size),
            iz: cell_index(position.z, cell_size),
        }
    }
}

impl std::fmt::Display for CellKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.ix, self.iz)
    }
}

/// Per-axis cell index.
///
/// Truncates `s / cell_size` toward zero, then steps one cell down when the
/// remainder `s % cell_size` is negative. Positive remainders are never
/// adjusted. On the negative side the float quotient and the exact remainder
/// can disagree near cell boundaries, in which case the result is one below
/// `floor(s / cell_size)`.
pub fn cell_index(s: f64, cell_size: f64) -> i64 {
    let mut index = (s / cell_size).trunc() as i64;
    if s % cell_size < 0.0 {
        index -= 1;
    }
    index
}

/// An aggregate of entities sharing one grid cell.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterBucket {
    pub key: CellKey,

    /// Members in placement order
    pub members: Vec<EntityKey>,

    /// Mean member position
    pub centroid: Point3<f64>,
}

impl ClusterBucket {
    fn new(key: CellKey) -> Self {
        Self {
            key,
            members: Vec::new(),
            centroid: Point3::origin(),
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Recomputes the centroid. Empty buckets keep their last value; they
    /// are never published.
    fn refresh_centroid(&mut self, store: &EntityStore) {
        let (sum, count) = store
            .resolve(&self.members)
            .fold((Vector3::zeros(), 0usize), |(sum, count), (_, e)| {
                (sum + e.position.coords, count + 1)
            });
        if count > 0 {
            self.centroid = Point3::from(sum / count as f64);
        }
    }
}

/// Statistics about the latest clustering pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterStats {
    pub clusters: usize,
    pub clustered_entities: usize,
    pub singles: usize,
    pub largest_cluster: usize,
}

// ============================================================================
// SPATIAL CLUSTERER
// ============================================================================

/// Grid clusterer for the current scene bucket.
///
/// Owns the cluster map and the single list. Entity flags
/// (`cluster_id`, `is_single`) are kept in step with both.
#[derive(Debug)]
pub struct SpatialClusterer {
    config: ClusterConfig,
    buckets: HashMap<CellKey, ClusterBucket>,
    singles: Vec<EntityKey>,
    band: Option<ZoomBand>,
}

impl SpatialClusterer {
    pub fn new(config: ClusterConfig) -> Self {
        Self {
            config,
            buckets: HashMap::new(),
            singles: Vec::new(),
            band: None,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(ClusterConfig::default())
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn is_active(&self) -> bool {
        self.config.active
    }

    /// Turns clustering on or off; takes effect on the next pass.
    pub fn set_active(&mut self, active: bool) {
        self.config.active = active;
    }

    /// Changes the density factor `k`; takes effect on the next pass.
    pub fn set_density_factor(&mut self, k: f64) -> Result<(), ConfigError> {
        let candidate = ClusterConfig {
            density_factor: k,
            ..self.config.clone()
        };
        candidate.validate()?;
        self.config = candidate;
        Ok(())
    }

    /// Zoom band used by the latest pass.
    pub fn band(&self) -> Option<ZoomBand> {
        self.band
    }

    /// Cluster map of the latest pass.
    pub fn clusters(&self) -> &HashMap<CellKey, ClusterBucket> {
        &self.buckets
    }

    /// Entities drawn as plain markers.
    pub fn singles(&self) -> &[EntityKey] {
        &self.singles
    }

    pub fn stats(&self) -> ClusterStats {
        ClusterStats {
            clusters: self.buckets.len(),
            clustered_entities: self.buckets.values().map(ClusterBucket::len).sum(),
            singles: self.singles.len(),
            largest_cluster: self.buckets.values().map(ClusterBucket::len).max().unwrap_or(0),
        }
    }

    // ========================================================================
    // FULL PASS
    // ========================================================================

    /// Rebuilds every bucket for the scene the camera shows.
    pub fn recluster(&mut self, store: &mut EntityStore, camera: &dyn CameraReader) {
        let keys = store.current_scene_data(camera).to_vec();
        self.clear(store);

        let band = ZoomBand::from_altitude(camera.altitude());
        self.band = Some(band);

        if !self.config.active {
            for key in keys {
                self.mark_single(store, key);
            }
            debug!("Clustering inactive: {} singles", self.singles.len());
            return;
        }

        let cell_size = self.config.cell_size(band);
        for key in keys {
            let Some(entity) = store.get(key) else {
                continue;
            };
            if entity.is_exempt() {
                self.mark_single(store, key);
            } else {
                let cell = CellKey::for_position(&entity.position, cell_size);
                self.place(store, key, cell);
            }
        }

        for bucket in self.buckets.values_mut() {
            bucket.refresh_centroid(store);
        }

        let dispersed = self.disperse_near(store, camera.position());

        debug!(
            "Clustered {:?} (cell {:.1}): {} buckets, {} singles, {} dispersed",
            band,
            cell_size,
            self.buckets.len(),
            self.singles.len(),
            dispersed
        );
    }

    /// Drops every bucket and single, resetting member flags.
    fn clear(&mut self, store: &mut EntityStore) {
        for bucket in self.buckets.values() {
            for &key in &bucket.members {
                if let Some(entity) = store.get_mut(key) {
                    entity.make_single();
                }
            }
        }
        self.buckets.clear();
        self.singles.clear();
    }

    // ========================================================================
    // DISPERSAL
    // ========================================================================

    /// Dissolves every bucket whose centroid lies within
    /// `nearest_distance` of `camera_position`.
    ///
    /// Returns the number of buckets dissolved.
    pub fn disperse_near(&mut self, store: &mut EntityStore, camera_position: Point3<f64>) -> usize {
        let threshold = self.config.nearest_distance;
        let near: Vec<CellKey> = self
            .buckets
            .values()
            .filter(|b| nalgebra::distance(&b.centroid, &camera_position) < threshold)
            .map(|b| b.key)
            .collect();

        for cell in &near {
            if let Some(bucket) = self.buckets.remove(cell) {
                for key in bucket.members {
                    self.mark_single(store, key);
                }
            }
        }

        near.len()
    }

    // ========================================================================
    // MEMBERSHIP
    // ========================================================================

    /// Takes an entity out of its bucket and makes it single.
    ///
    /// Idempotent for entities that are already single. Returns false for
    /// unknown keys.
    pub fn pull_from_cluster(&mut self, store: &mut EntityStore, key: EntityKey) -> bool {
        let Some(entity) = store.get_mut(key) else {
            return false;
        };
        let previous = entity.cluster_id.take();
        entity.is_single = true;

        if let Some(cell) = previous {
            self.leave_bucket(store, cell, key);
        }
        if !self.singles.contains(&key) {
            self.singles.push(key);
        }
        true
    }

    /// Puts an entity into the bucket of `cell`.
    ///
    /// Returns false for unknown keys.
    pub fn push_to_cluster(&mut self, store: &mut EntityStore, key: EntityKey, cell: CellKey) -> bool {
        if !self.place(store, key, cell) {
            return false;
        }
        if let Some(bucket) = self.buckets.get_mut(&cell) {
            bucket.refresh_centroid(store);
        }
        true
    }

    /// Forgets a key that left the store or its scene.
    pub fn detach(&mut self, store: &mut EntityStore, key: EntityKey) {
        self.singles.retain(|k| *k != key);

        let cell = self
            .buckets
            .values()
            .find(|b| b.members.contains(&key))
            .map(|b| b.key);
        if let Some(cell) = cell {
            self.leave_bucket(store, cell, key);
        }
        if let Some(entity) = store.get_mut(key) {
            entity.make_single();
        }
    }

    fn place(&mut self, store: &mut EntityStore, key: EntityKey, cell: CellKey) -> bool {
        let Some(entity) = store.get_mut(key) else {
            return false;
        };
        let previous = entity.cluster_id.replace(cell);
        entity.is_single = false;

        if let Some(prev) = previous.filter(|prev| *prev != cell) {
            self.leave_bucket(store, prev, key);
        }

        let bucket = self
            .buckets
            .entry(cell)
            .or_insert_with(|| ClusterBucket::new(cell));
        if !bucket.members.contains(&key) {
            bucket.members.push(key);
        }
        self.singles.retain(|k| *k != key);
        true
    }

    fn mark_single(&mut self, store: &mut EntityStore, key: EntityKey) {
        if let Some(entity) = store.get_mut(key) {
            entity.make_single();
            if !self.singles.contains(&key) {
                self.singles.push(key);
            }
        }
    }

    fn leave_bucket(&mut self, store: &EntityStore, cell: CellKey, key: EntityKey) {
        let Some(bucket) = self.buckets.get_mut(&cell) else {
            return;
        };
        bucket.members.retain(|k| *k != key);
        if bucket.is_empty() {
            self.buckets.remove(&cell);
        } else {
            bucket.refresh_centroid(store);
        }
    }
}

impl Updatable for SpatialClusterer {
    fn order(&self) -> i32 {
        order::CLUSTER
    }

    fn name(&self) -> &'static str {
        "cluster"
    }

    fn update(&mut self, ctx: &mut PassContext<'_>) {
        self.recluster(ctx.store, ctx.camera);
    }
}

// ============================================================================
// TESTS
// ============================================================================

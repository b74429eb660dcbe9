//! Ground truth crowd for simulation.
//!
//! The CrowdOracle owns the "real" site population:
//! - True coordinates, velocities and floors of every member
//! - Random-walk kinematics with bounded site extent
//! - Floor hops between indoor floors and the outdoor site
//!
//! Every change comes out as an [`EntityDiff`], exactly what the live feed
//! would deliver.

use nalgebra::Vector3;
use overwatch_core::{EntityDiff, RawEntity};
use overwatch_env::{Coordinate, SceneRef, SceneType};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const KINDS: [&str; 4] = ["staff", "visitor", "contractor", "vehicle"];

/// Standard deviation of spawn positions around a hot spot
const SPAWN_SPREAD: f64 = 25.0;

/// Parameters of the simulated site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrowdConfig {
    /// Members stay within `[-extent, extent]` on x and z
    pub site_extent: f64,

    /// Buildings on the site
    pub buildings: usize,

    /// Floors per building
    pub floors: usize,

    /// Fraction of members spawned indoors
    pub indoor_fraction: f64,

    /// Per-tick chance that a member changes floor
    pub floor_hop_probability: f64,

    /// Standard deviation of the per-tick velocity jitter (units/s)
    pub speed_jitter: f64,

    /// Members spawn around this many hot spots, so clusters form
    pub hot_spots: usize,
}

impl Default for CrowdConfig {
    fn default() -> Self {
        Self {
            site_extent: 600.0,
            buildings: 2,
            floors: 3,
            indoor_fraction: 0.0,
            floor_hop_probability: 0.0,
            speed_jitter: 0.8,
            hot_spots: 6,
        }
    }
}

/// One member of the simulated crowd.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrowdMember {
    pub id: u64,

    /// Raw feed coordinate
    pub coordinate: Vector3<f64>,

    /// Velocity on the ground plane (y stays 0)
    pub velocity: Vector3<f64>,

    pub kind: String,
    pub scene: SceneRef,
}

impl CrowdMember {
    /// Feed id of the member.
    pub fn feed_id(&self) -> String {
        format!("m{:05}", self.id)
    }

    fn raw(&self) -> RawEntity {
        RawEntity::new(
            self.feed_id(),
            self.scene.origin_id.clone(),
            self.scene.scene_type,
            Coordinate::new(self.coordinate.x, self.coordinate.y, self.coordinate.z),
        )
        .with_kind(self.kind.clone())
        .with_name(format!("Member {}", self.id))
    }
}

/// The CrowdOracle - maintains ground truth and emits feed diffs.
pub struct CrowdOracle {
    config: CrowdConfig,
    rng: ChaCha8Rng,

    /// Ordered so iteration (and therefore RNG consumption) is deterministic
    members: BTreeMap<u64, CrowdMember>,

    hot_spots: Vec<Vector3<f64>>,
    next_id: u64,
    current_time: f64,
}

impl CrowdOracle {
    /// Creates an empty crowd driven by `seed`.
    pub fn new(seed: u64, config: CrowdConfig) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let extent = config.site_extent * 0.8;
        let hot_spots = (0..config.hot_spots.max(1))
            .map(|_| Vector3::new(rng.gen_range(-extent..extent), 0.0, rng.gen_range(-extent..extent)))
            .collect();

        Self {
            config,
            rng,
            members: BTreeMap::new(),
            hot_spots,
            next_id: 0,
            current_time: 0.0,
        }
    }

    pub fn config(&self) -> &CrowdConfig {
        &self.config
    }

    pub fn time(&self) -> f64 {
        self.current_time
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn members(&self) -> impl Iterator<Item = &CrowdMember> {
        self.members.values()
    }

    pub fn member(&self, id: u64) -> Option<&CrowdMember> {
        self.members.get(&id)
    }

    /// Every scene a member can be in.
    pub fn scenes(&self) -> Vec<SceneRef> {
        let mut scenes = vec![SceneRef::outdoor()];
        for b in 0..self.config.buildings {
            for f in 1..=self.config.floors {
                scenes.push(SceneRef::indoor(format!("B{}_F{}", b + 1, f)));
            }
        }
        scenes
    }

    fn random_scene(&mut self) -> SceneRef {
        if self.config.buildings == 0 || self.config.floors == 0 {
            return SceneRef::outdoor();
        }
        let b = self.rng.gen_range(1..=self.config.buildings);
        let f = self.rng.gen_range(1..=self.config.floors);
        SceneRef::indoor(format!("B{}_F{}", b, f))
    }

    /// Spawns `count` members around the hot spots.
    pub fn spawn(&mut self, count: usize) -> EntityDiff {
        let mut diff = EntityDiff::default();

        for _ in 0..count {
            let spot = self.hot_spots[self.rng.gen_range(0..self.hot_spots.len())];
            let coordinate = Vector3::new(
                spot.x + SPAWN_SPREAD * self.normal(),
                0.0,
                spot.z + SPAWN_SPREAD * self.normal(),
            );
            let scene = if self.rng.gen_bool(self.config.indoor_fraction.clamp(0.0, 1.0)) {
                self.random_scene()
            } else {
                SceneRef::outdoor()
            };
            let kind = KINDS.choose(&mut self.rng).copied().unwrap_or("staff");

            let member = CrowdMember {
                id: self.next_id,
                coordinate,
                velocity: Vector3::zeros(),
                kind: kind.to_string(),
                scene,
            };
            self.next_id += 1;
            diff.add.push(member.raw());
            self.members.insert(member.id, member);
        }

        diff
    }

    /// Removes up to `count` random members.
    pub fn despawn(&mut self, count: usize) -> EntityDiff {
        let mut ids: Vec<u64> = self.members.keys().copied().collect();
        ids.shuffle(&mut self.rng);

        let mut diff = EntityDiff::default();
        for id in ids.into_iter().take(count) {
            if let Some(member) = self.members.remove(&id) {
                diff.remove.push(RawEntity::removal(member.feed_id()));
            }
        }
        diff
    }

    /// Advances the random walk by `dt` seconds.
    pub fn step(&mut self, dt: f64) -> EntityDiff {
        self.current_time += dt;

        let jitter = self.config.speed_jitter;
        let extent = self.config.site_extent;
        let hop = self.config.floor_hop_probability.clamp(0.0, 1.0);

        let ids: Vec<u64> = self.members.keys().copied().collect();
        let mut diff = EntityDiff::default();

        for id in ids {
            let hops = self.rng.gen_bool(hop);
            let new_scene = if hops { Some(self.random_scene_or_outdoor()) } else { None };
            let dv = Vector3::new(jitter * self.normal(), 0.0, jitter * self.normal());

            let Some(member) = self.members.get_mut(&id) else {
                continue;
            };
            member.velocity = (member.velocity + dv) * 0.95;
            member.coordinate += member.velocity * dt;

            // Reflect at the site boundary
            for axis in [0, 2] {
                if member.coordinate[axis].abs() > extent {
                    member.coordinate[axis] = member.coordinate[axis].clamp(-extent, extent);
                    member.velocity[axis] = -member.velocity[axis];
                }
            }
            if let Some(scene) = new_scene {
                member.scene = scene;
            }

            diff.update.push(member.raw());
        }

        diff
    }

    fn normal(&mut self) -> f64 {
        self.rng.sample(StandardNormal)
    }

    fn random_scene_or_outdoor(&mut self) -> SceneRef {
        if self.rng.gen_bool(0.25) {
            SceneRef::outdoor()
        } else {
            self.random_scene()
        }
    }

    /// Picks a random member id, if any.
    pub fn pick(&mut self) -> Option<u64> {
        let ids: Vec<u64> = self.members.keys().copied().collect();
        ids.choose(&mut self.rng).copied()
    }

    /// Random value in `range` from the oracle's stream.
    pub fn gen_range(&mut self, range: std::ops::Range<f64>) -> f64 {
        self.rng.gen_range(range)
    }

    /// Random boolean with probability `p`.
    pub fn gen_bool(&mut self, p: f64) -> bool {
        self.rng.gen_bool(p.clamp(0.0, 1.0))
    }
}

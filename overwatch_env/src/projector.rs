//! Coordinate projection abstraction.

use crate::error::EnvError;
use crate::types::{Coordinate, SceneType};
use nalgebra::Point3;

/// Maps raw feed coordinates into the world space markers are drawn in.
///
/// The store calls this exactly once per add and once per update; positions
/// are never recomputed internally.
///
/// # Implementations
///
/// - **Dashboard**: wraps the scene graph's floor transforms
/// - **Local / Simulation**: [`FlatProjector`](crate::FlatProjector)
pub trait PositionProjector {
    /// Projects a raw coordinate observed in `origin_id`.
    ///
    /// # Returns
    /// * `Ok(point)` - World-space position
    /// * `Err(EnvError::Projection)` - The coordinate cannot be placed
    fn project(
        &self,
        coordinate: &Coordinate,
        origin_id: &str,
        scene_type: SceneType,
    ) -> Result<Point3<f64>, EnvError>;
}

//! Simulated operator camera.
//!
//! Implements both camera seams. Recenter tweens settle instantly: a focus
//! or track request moves the camera straight to the target plus offset,
//! which is the state a real tween converges to.

use nalgebra::{Point3, Vector3};
use overwatch_env::{CameraController, CameraReader, FocusRequest, SceneRef};

#[derive(Debug, Clone)]
pub struct SimCamera {
    pub position: Point3<f64>,
    pub scene: SceneRef,
    pub panning_enabled: bool,

    /// Eye offset used by the last focus request
    last_offset: Vector3<f64>,

    pub focus_calls: u64,
    pub track_calls: u64,
    pub scene_switches: u64,
}

impl SimCamera {
    /// A camera hovering over the outdoor site.
    pub fn new(position: Point3<f64>) -> Self {
        Self {
            position,
            scene: SceneRef::outdoor(),
            panning_enabled: true,
            last_offset: Vector3::zeros(),
            focus_calls: 0,
            track_calls: 0,
            scene_switches: 0,
        }
    }

    /// Operator pan/zoom.
    pub fn fly_to(&mut self, position: Point3<f64>) {
        self.position = position;
    }

    pub fn set_altitude(&mut self, altitude: f64) {
        self.position.y = altitude;
    }

    /// Operator floor switch.
    pub fn show(&mut self, scene: SceneRef) {
        self.scene = scene;
    }
}

impl CameraReader for SimCamera {
    fn position(&self) -> Point3<f64> {
        self.position
    }

    fn current_scene(&self) -> SceneRef {
        self.scene.clone()
    }
}

impl CameraController for SimCamera {
    fn focus(&mut self, request: FocusRequest) {
        self.focus_calls += 1;
        self.last_offset = request.offset;
        self.position = request.position + request.offset;
    }

    fn track(&mut self, position: Point3<f64>, _duration: f64) {
        self.track_calls += 1;
        self.position = position + self.last_offset;
    }

    fn set_panning_enabled(&mut self, enabled: bool) {
        self.panning_enabled = enabled;
    }

    fn switch_scene(&mut self, scene: &SceneRef) {
        if !self.scene.same_bucket(scene) {
            self.scene_switches += 1;
        }
        self.scene = scene.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_focus_then_track_keeps_offset() {
        let mut camera = SimCamera::new(Point3::new(0.0, 200.0, 0.0));
        camera.focus(FocusRequest {
            position: Point3::new(10.0, 0.0, 10.0),
            distance: 60.0,
            duration: 1.0,
            offset: Vector3::new(0.0, 40.0, 40.0),
        });
        assert_eq!(camera.position, Point3::new(10.0, 40.0, 50.0));
        assert_eq!(camera.altitude(), 40.0);

        camera.track(Point3::new(20.0, 0.0, 10.0), 0.5);
        assert_eq!(camera.position, Point3::new(20.0, 40.0, 50.0));
        assert_eq!((camera.focus_calls, camera.track_calls), (1, 1));
    }

    #[test]
    fn test_scene_switch_counts_changes_only() {
        let mut camera = SimCamera::new(Point3::new(0.0, 200.0, 0.0));
        camera.switch_scene(&SceneRef::outdoor());
        camera.switch_scene(&SceneRef::indoor("B1_F2"));

        assert_eq!(camera.scene_switches, 1);
        assert_eq!(camera.current_scene(), SceneRef::indoor("B1_F2"));
    }
}

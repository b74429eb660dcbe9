//! Camera/viewport abstraction.

use crate::types::SceneRef;
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;

/// Read-only view of the operator's camera.
///
/// The clusterer derives its zoom band from [`altitude`](Self::altitude) and
/// disperses clusters near [`position`](Self::position). The store resolves
/// the "current" scene bucket through [`current_scene`](Self::current_scene).
pub trait CameraReader {
    /// World-space camera position.
    fn position(&self) -> Point3<f64>;

    /// Current camera altitude (drives zoom-band selection).
    ///
    /// Defaults to the vertical component of [`position`](Self::position).
    fn altitude(&self) -> f64 {
        self.position().y
    }

    /// The scene/floor the operator is currently looking at.
    fn current_scene(&self) -> SceneRef;
}

/// A fire-and-forget recenter request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FocusRequest {
    /// Point to look at
    pub position: Point3<f64>,

    /// Distance from the target once the tween settles
    pub distance: f64,

    /// Tween duration in seconds
    pub duration: f64,

    /// Eye offset relative to the target
    pub offset: Vector3<f64>,
}

/// Camera side effects requested by Search/Follow.
///
/// Every call is fire-and-forget: it never blocks the update pass, and a new
/// `focus`/`track` supersedes whatever tween is still in flight.
pub trait CameraController {
    /// Starts a recenter tween towards `request.position`.
    fn focus(&mut self, request: FocusRequest);

    /// Continues a path-interpolated follow towards `position`.
    fn track(&mut self, position: Point3<f64>, duration: f64);

    /// Enables or disables operator panning.
    fn set_panning_enabled(&mut self, enabled: bool);

    /// Asks the host to show a different scene/floor.
    fn switch_scene(&mut self, scene: &SceneRef);
}

// Shared handles let one object serve as both reader and controller, and let
// callers keep inspecting a collaborator after handing it to the engine.

impl<T: CameraReader + ?Sized> CameraReader for Rc<RefCell<T>> {
    fn position(&self) -> Point3<f64> {
        self.borrow().position()
    }

    fn altitude(&self) -> f64 {
        self.borrow().altitude()
    }

    fn current_scene(&self) -> SceneRef {
        self.borrow().current_scene()
    }
}

impl<T: CameraController + ?Sized> CameraController for Rc<RefCell<T>> {
    fn focus(&mut self, request: FocusRequest) {
        self.borrow_mut().focus(request);
    }

    fn track(&mut self, position: Point3<f64>, duration: f64) {
        self.borrow_mut().track(position, duration);
    }

    fn set_panning_enabled(&mut self, enabled: bool) {
        self.borrow_mut().set_panning_enabled(enabled);
    }

    fn switch_scene(&mut self, scene: &SceneRef) {
        self.borrow_mut().switch_scene(scene);
    }
}

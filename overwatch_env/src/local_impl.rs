//! Local collaborator implementations.
//!
//! These back the simulation harness and the test suites, and are a
//! reasonable starting point for headless hosts.

use crate::camera::{CameraController, CameraReader, FocusRequest};
use crate::error::EnvError;
use crate::host::{HostChannel, HostMessage};
use crate::projector::PositionProjector;
use crate::types::{Coordinate, SceneRef, SceneType};
use nalgebra::Point3;
use std::io::Write;

/// Projector for sites drawn 1:1 on a flat ground plane.
///
/// Coordinates are scaled uniformly. Indoor floors are stacked: the trailing
/// digits of the origin id (`"B2_F3"` → 3) select the floor and lift the
/// point by `floor_height` per level.
#[derive(Debug, Clone, Copy)]
pub struct FlatProjector {
    /// Units per raw coordinate unit
    pub scale: f64,

    /// Vertical spacing between indoor floors
    pub floor_height: f64,
}

impl Default for FlatProjector {
    fn default() -> Self {
        Self {
            scale: 1.0,
            floor_height: 4.0,
        }
    }
}

impl FlatProjector {
    fn floor_level(origin_id: &str) -> f64 {
        let digits: String = origin_id
            .chars()
            .rev()
            .take_while(|c| c.is_ascii_digit())
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        digits.parse::<u32>().map(f64::from).unwrap_or(0.0)
    }
}

impl PositionProjector for FlatProjector {
    fn project(
        &self,
        coordinate: &Coordinate,
        origin_id: &str,
        scene_type: SceneType,
    ) -> Result<Point3<f64>, EnvError> {
        if !coordinate.is_finite() {
            return Err(EnvError::projection(format!(
                "non-finite coordinate {:?} in {}",
                coordinate, origin_id
            )));
        }

        let lift = match scene_type {
            SceneType::Outdoor => 0.0,
            SceneType::Indoor => Self::floor_level(origin_id) * self.floor_height,
        };

        Ok(Point3::new(
            coordinate.x * self.scale,
            coordinate.y * self.scale + lift,
            coordinate.z * self.scale,
        ))
    }
}

/// A camera that stays wherever it is put.
#[derive(Debug, Clone)]
pub struct FixedCamera {
    pub position: Point3<f64>,
    pub scene: SceneRef,
}

impl FixedCamera {
    /// A camera over the outdoor site.
    pub fn outdoor(position: [f64; 3]) -> Self {
        Self {
            position: Point3::from(position),
            scene: SceneRef::outdoor(),
        }
    }

    /// A camera looking at an indoor floor.
    pub fn indoor(origin_id: impl Into<String>, position: [f64; 3]) -> Self {
        Self {
            position: Point3::from(position),
            scene: SceneRef::indoor(origin_id),
        }
    }
}

impl CameraReader for FixedCamera {
    fn position(&self) -> Point3<f64> {
        self.position
    }

    fn current_scene(&self) -> SceneRef {
        self.scene.clone()
    }
}

/// One recorded controller call.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerCall {
    Focus(FocusRequest),
    Track(Point3<f64>),
    Panning(bool),
    SwitchScene(SceneRef),
}

/// Controller that records every request instead of animating.
#[derive(Debug, Clone, Default)]
pub struct RecordingController {
    pub calls: Vec<ControllerCall>,
    pub panning_enabled: bool,
}

impl RecordingController {
    /// Creates a controller with panning enabled.
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            panning_enabled: true,
        }
    }

    /// Returns the most recent focus request, if any.
    pub fn last_focus(&self) -> Option<&FocusRequest> {
        self.calls.iter().rev().find_map(|call| match call {
            ControllerCall::Focus(request) => Some(request),
            _ => None,
        })
    }
}

impl CameraController for RecordingController {
    fn focus(&mut self, request: FocusRequest) {
        self.calls.push(ControllerCall::Focus(request));
    }

    fn track(&mut self, position: Point3<f64>, _duration: f64) {
        self.calls.push(ControllerCall::Track(position));
    }

    fn set_panning_enabled(&mut self, enabled: bool) {
        self.panning_enabled = enabled;
        self.calls.push(ControllerCall::Panning(enabled));
    }

    fn switch_scene(&mut self, scene: &SceneRef) {
        self.calls.push(ControllerCall::SwitchScene(scene.clone()));
    }
}

/// Host channel that keeps every posted message in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingHost {
    pub messages: Vec<HostMessage>,
}

impl HostChannel for RecordingHost {
    fn post(&mut self, message: HostMessage) -> Result<(), EnvError> {
        self.messages.push(message);
        Ok(())
    }
}

/// Host channel writing one JSON message per line.
#[derive(Debug)]
pub struct JsonLinesHost<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesHost<W> {
    /// Wraps a writer.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> HostChannel for JsonLinesHost<W> {
    fn post(&mut self, message: HostMessage) -> Result<(), EnvError> {
        let line = message.to_json()?;
        writeln!(self.writer, "{}", line).map_err(|e| EnvError::host(e.to_string()))
    }
}

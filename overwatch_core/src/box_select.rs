//! The "LASSO" Engine - Ground-plane polygon selection
//!
//! The operator clicks vertices on the ground; the polygon is kept in 2D
//! (x, z) with the vertical axis dropped. A vertex whose new edge would cross
//! an existing edge is rejected and the session stays open. Clicking back
//! near the first vertex closes the polygon, after which the next pass
//! evaluates it against:
//! - visible entities of the current scene
//! - equipment/camera anchors
//! - building anchors
//!
//! and posts the result to the host exactly once per closure.

use crate::overwatch_store::EntityStore;
use crate::pipeline::{order, PassContext, Updatable};
use geo::algorithm::line_intersection::{line_intersection, LineIntersection};
use geo::{Contains, Coord, Line, LineString, Point, Polygon};
use nalgebra::Point3;
use overwatch_env::{HostMessage, SceneRef, SelectionReport};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Configuration for BoxSelect
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BoxSelectConfig {
    /// A click this close to the first vertex closes the polygon
    /// (default: 5.0 world units)
    pub closest_distance_to_adhere: f64,
}

impl Default for BoxSelectConfig {
    fn default() -> Self {
        Self {
            closest_distance_to_adhere: 5.0,
        }
    }
}

/// A fixed selectable point: a piece of equipment or a building.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    pub id: String,
    pub position: Point3<f64>,

    /// Scene the anchor is drawn in
    pub scene: SceneRef,
}

impl Anchor {
    pub fn new(id: impl Into<String>, position: Point3<f64>, scene: SceneRef) -> Self {
        Self {
            id: id.into(),
            position,
            scene,
        }
    }
}

/// Result of a successful `add_point`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointOutcome {
    /// Vertex committed; holds the new vertex count
    Added(usize),

    /// Click repeated the last vertex and was ignored
    Duplicate,

    /// The polygon was closed
    Closed,
}

fn ground(point: &Point3<f64>) -> Coord<f64> {
    Coord {
        x: point.x,
        y: point.z,
    }
}

fn distance(a: Coord<f64>, b: Coord<f64>) -> f64 {
    (a.x - b.x).hypot(a.y - b.y)
}

/// Polygon draw session plus the latest selection.
#[derive(Debug, Default)]
pub struct BoxSelect {
    config: BoxSelectConfig,
    vertices: Vec<Coord<f64>>,
    closed: bool,

    /// Closure not yet reported to the host
    pending_report: bool,

    cameras: Vec<Anchor>,
    buildings: Vec<Anchor>,
    result: Option<SelectionReport>,
}

impl BoxSelect {
    pub fn new(config: BoxSelectConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Number of committed vertices.
    pub fn count(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Committed vertices as ground-plane (x, z) pairs.
    pub fn vertices(&self) -> Vec<(f64, f64)> {
        self.vertices.iter().map(|c| (c.x, c.y)).collect()
    }

    /// Selection of the current closed polygon.
    pub fn result(&self) -> Option<&SelectionReport> {
        self.result.as_ref()
    }

    // ========================================================================
    // ANCHORS
    // ========================================================================

    /// Registers an equipment/camera anchor, replacing one with the same id.
    pub fn add_camera_anchor(&mut self, anchor: Anchor) {
        self.cameras.retain(|a| a.id != anchor.id);
        self.cameras.push(anchor);
    }

    /// Registers a building anchor, replacing one with the same id.
    pub fn add_building_anchor(&mut self, anchor: Anchor) {
        self.buildings.retain(|a| a.id != anchor.id);
        self.buildings.push(anchor);
    }

    /// Removes an anchor of either kind.
    pub fn remove_anchor(&mut self, id: &str) -> bool {
        let before = self.cameras.len() + self.buildings.len();
        self.cameras.retain(|a| a.id != id);
        self.buildings.retain(|a| a.id != id);
        before != self.cameras.len() + self.buildings.len()
    }

    // ========================================================================
    // DRAWING
    // ========================================================================

    /// Adds a clicked point.
    ///
    /// # Returns
    /// * `Ok(PointOutcome::Closed)` - The point snapped to the first vertex
    /// * `Ok(PointOutcome::Added(count))` - Vertex committed
    /// * `Err(BoxSelectError::SelfIntersection)` - Rejected; the session stays open
    pub fn add_point(&mut self, point: Point3<f64>) -> Result<PointOutcome, BoxSelectError> {
        if self.closed {
            return Err(BoxSelectError::PolygonClosed);
        }
        if !(point.x.is_finite() && point.z.is_finite()) {
            return Err(BoxSelectError::NonFinitePoint);
        }

        let candidate = ground(&point);
        let (Some(&first), Some(&last)) = (self.vertices.first(), self.vertices.last()) else {
            self.vertices.push(candidate);
            return Ok(PointOutcome::Added(1));
        };

        if self.vertices.len() > 1
            && distance(candidate, first) <= self.config.closest_distance_to_adhere
        {
            return self.close(first, last);
        }

        if candidate == last {
            return Ok(PointOutcome::Duplicate);
        }

        let edge = Line::new(last, candidate);
        let segments = self.vertices.len() - 1;
        for index in 0..segments {
            // The previous edge shares `last` with the new one
            let adjacent = index + 1 == segments;
            if Self::crosses(edge, self.segment(index), adjacent) {
                warn!(
                    "Box-select point ({:.2}, {:.2}) rejected: crosses segment {}",
                    candidate.x, candidate.y, index
                );
                return Err(BoxSelectError::SelfIntersection { segment: index });
            }
        }

        self.vertices.push(candidate);
        Ok(PointOutcome::Added(self.vertices.len()))
    }

    /// Closes the ring with the edge `last → first`.
    fn close(&mut self, first: Coord<f64>, last: Coord<f64>) -> Result<PointOutcome, BoxSelectError> {
        let edge = Line::new(last, first);
        let segments = self.vertices.len() - 1;

        // The first and last committed edges meet the closing edge at its
        // endpoints; only the ones in between can cross it.
        for index in 1..segments.saturating_sub(1) {
            if Self::crosses(edge, self.segment(index), false) {
                warn!("Box-select closure rejected: crosses segment {}", index);
                return Err(BoxSelectError::SelfIntersection { segment: index });
            }
        }

        self.closed = true;
        self.pending_report = true;
        debug!("Box-select polygon closed with {} vertices", self.vertices.len());
        Ok(PointOutcome::Closed)
    }

    /// Removes the last vertex, or reopens a closed polygon.
    ///
    /// Returns the vertex count afterwards.
    pub fn delete_point(&mut self) -> usize {
        if self.closed {
            self.closed = false;
            self.pending_report = false;
            self.result = None;
        } else {
            self.vertices.pop();
        }
        self.vertices.len()
    }

    /// Discards the polygon and its selection.
    pub fn cancel(&mut self) {
        self.vertices.clear();
        self.closed = false;
        self.pending_report = false;
        self.result = None;
    }

    fn segment(&self, index: usize) -> Line<f64> {
        Line::new(self.vertices[index], self.vertices[index + 1])
    }

    /// Adjacent segments always touch at their shared vertex; for them only
    /// an overlap counts.
    fn crosses(edge: Line<f64>, committed: Line<f64>, adjacent: bool) -> bool {
        match line_intersection(edge, committed) {
            None => false,
            Some(LineIntersection::Collinear { .. }) => true,
            Some(LineIntersection::SinglePoint { .. }) => !adjacent,
        }
    }

    // ========================================================================
    // EVALUATION
    // ========================================================================

    /// Runs point-in-polygon against entities and anchors of `scene`.
    ///
    /// Returns `None` while the polygon is open.
    pub fn evaluate(&self, store: &EntityStore, scene: &SceneRef) -> Option<SelectionReport> {
        if !self.closed {
            return None;
        }
        let polygon = Polygon::new(LineString::from(self.vertices.clone()), vec![]);
        let inside = |position: &Point3<f64>| polygon.contains(&Point::from(ground(position)));

        let person = store
            .resolve(store.scene_keys(scene))
            .filter(|(_, e)| e.visible && inside(&e.position))
            .map(|(_, e)| e.id.clone())
            .collect();

        let pick = |anchors: &[Anchor]| -> Vec<String> {
            anchors
                .iter()
                .filter(|a| a.scene.same_bucket(scene) && inside(&a.position))
                .map(|a| a.id.clone())
                .collect()
        };

        Some(SelectionReport {
            person,
            camera: pick(&self.cameras),
            buildings: pick(&self.buildings),
        })
    }
}

impl Updatable for BoxSelect {
    fn order(&self) -> i32 {
        order::BOX_SELECT
    }

    fn name(&self) -> &'static str {
        "box_select"
    }

    fn update(&mut self, ctx: &mut PassContext<'_>) {
        let scene = ctx.current_scene();
        let Some(report) = self.evaluate(ctx.store, &scene) else {
            return;
        };

        if self.pending_report {
            self.pending_report = false;
            debug!(
                "Box-select: {} people, {} cameras, {} buildings",
                report.person.len(),
                report.camera.len(),
                report.buildings.len()
            );
            if let Err(e) = ctx.host.post(HostMessage::SelectBack(report.clone())) {
                warn!("Failed to post box-select result: {}", e);
            }
        }
        self.result = Some(report);
    }
}

/// Recoverable drawing errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BoxSelectError {
    #[error("New edge crosses committed segment {segment}")]
    SelfIntersection { segment: usize },

    #[error("Polygon is already closed")]
    PolygonClosed,

    #[error("Point has a non-finite ground coordinate")]
    NonFinitePoint,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{EntityDiff, RawEntity};
    use overwatch_env::{Coordinate, FixedCamera, FlatProjector, RecordingController, RecordingHost, SceneType};

    fn p(x: f64, z: f64) -> Point3<f64> {
        Point3::new(x, 0.0, z)
    }

    fn square(select: &mut BoxSelect) {
        select.add_point(p(0.0, 0.0)).unwrap();
        select.add_point(p(100.0, 0.0)).unwrap();
        select.add_point(p(100.0, 100.0)).unwrap();
        select.add_point(p(0.0, 100.0)).unwrap();
    }

    #[test]
    fn test_crossing_second_segment_is_rejected() {
        let mut select = BoxSelect::default();
        select.add_point(p(0.0, 0.0)).unwrap();
        select.add_point(p(100.0, 0.0)).unwrap();
        select.add_point(p(100.0, 100.0)).unwrap();

        // Backtracks over the second edge (100,0)-(100,100)
        let result = select.add_point(p(100.0, 50.0));

        assert_eq!(result, Err(BoxSelectError::SelfIntersection { segment: 1 }));
        assert_eq!(select.count(), 3);
        assert!(!select.is_closed());

        // Session stays open
        assert_eq!(select.add_point(p(0.0, 100.0)), Ok(PointOutcome::Added(4)));
    }

    #[test]
    fn test_crossing_earlier_segment_is_rejected() {
        let mut select = BoxSelect::default();
        select.add_point(p(0.0, 0.0)).unwrap();
        select.add_point(p(100.0, 0.0)).unwrap();
        select.add_point(p(50.0, 50.0)).unwrap();

        assert_eq!(
            select.add_point(p(50.0, -50.0)),
            Err(BoxSelectError::SelfIntersection { segment: 0 })
        );
        assert_eq!(select.count(), 3);
    }

    #[test]
    fn test_snap_to_first_vertex_closes() {
        let mut select = BoxSelect::default();
        square(&mut select);

        assert_eq!(select.add_point(p(2.0, 1.0)), Ok(PointOutcome::Closed));
        assert!(select.is_closed());
        assert_eq!(select.count(), 4);
        assert_eq!(select.add_point(p(50.0, 50.0)), Err(BoxSelectError::PolygonClosed));
    }

    #[test]
    fn test_single_vertex_never_closes() {
        let mut select = BoxSelect::default();
        select.add_point(p(0.0, 0.0)).unwrap();
        assert_eq!(select.add_point(p(1.0, 1.0)), Ok(PointOutcome::Added(2)));
        assert!(!select.is_closed());
    }

    #[test]
    fn test_closing_edge_crossing_is_rejected() {
        // Zig-zag whose closing edge (0,100)->(0,0) passes through (0,50)
        let mut select = BoxSelect::default();
        select.add_point(p(0.0, 0.0)).unwrap();
        select.add_point(p(50.0, 0.0)).unwrap();
        select.add_point(p(-50.0, 50.0)).unwrap();
        select.add_point(p(50.0, 100.0)).unwrap();
        select.add_point(p(0.0, 100.0)).unwrap();

        assert!(matches!(
            select.add_point(p(0.0, 1.0)),
            Err(BoxSelectError::SelfIntersection { .. })
        ));
        assert!(!select.is_closed());
    }

    #[test]
    fn test_delete_point_reopens_then_pops() {
        let mut select = BoxSelect::default();
        square(&mut select);
        select.add_point(p(0.0, 0.0)).unwrap();

        assert_eq!(select.delete_point(), 4);
        assert!(!select.is_closed());
        assert_eq!(select.delete_point(), 3);
        select.cancel();
        assert_eq!(select.count(), 0);
        assert_eq!(select.delete_point(), 0);
    }

    #[test]
    fn test_rejects_non_finite_point() {
        let mut select = BoxSelect::default();
        assert_eq!(select.add_point(p(f64::NAN, 0.0)), Err(BoxSelectError::NonFinitePoint));
        assert_eq!(select.count(), 0);
    }

    #[test]
    fn test_closure_selects_and_reports_once() {
        let mut store = EntityStore::new(Box::new(FlatProjector::default()));
        store.apply_diff(EntityDiff {
            add: vec![
                RawEntity::new("in", "site", SceneType::Outdoor, Coordinate::new(50.0, 0.0, 50.0)),
                RawEntity::new("out", "site", SceneType::Outdoor, Coordinate::new(150.0, 0.0, 50.0)),
                RawEntity::new("hidden", "site", SceneType::Outdoor, Coordinate::new(20.0, 0.0, 20.0)),
                RawEntity::new("upstairs", "B1_F1", SceneType::Indoor, Coordinate::new(50.0, 0.0, 50.0)),
            ],
            ..Default::default()
        });
        let hidden = store.key_of("hidden").unwrap();
        store.get_mut(hidden).unwrap().visible = false;

        let mut select = BoxSelect::default();
        select.add_camera_anchor(Anchor::new("cam-1", p(10.0, 90.0), SceneRef::outdoor()));
        select.add_camera_anchor(Anchor::new("cam-2", p(500.0, 500.0), SceneRef::outdoor()));
        select.add_camera_anchor(Anchor::new("cam-3", p(10.0, 10.0), SceneRef::indoor("B1_F1")));
        select.add_building_anchor(Anchor::new("B1", p(80.0, 20.0), SceneRef::outdoor()));
        square(&mut select);
        select.add_point(p(0.0, 0.0)).unwrap();

        let camera = FixedCamera::outdoor([0.0, 200.0, 0.0]);
        let mut controller = RecordingController::new();
        let mut host = RecordingHost::default();
        for _ in 0..2 {
            let mut ctx = PassContext::new(&mut store, &camera, &mut controller, &mut host);
            select.update(&mut ctx);
        }

        let expected = SelectionReport {
            person: vec!["in".into()],
            camera: vec!["cam-1".into()],
            buildings: vec!["B1".into()],
        };
        assert_eq!(select.result(), Some(&expected));
        assert_eq!(host.messages, vec![HostMessage::SelectBack(expected)]);
    }

    #[test]
    fn test_open_polygon_has_no_result() {
        let mut store = EntityStore::new(Box::new(FlatProjector::default()));
        let mut select = BoxSelect::default();
        square(&mut select);

        assert!(select.evaluate(&store, &SceneRef::outdoor()).is_none());

        let camera = FixedCamera::outdoor([0.0, 200.0, 0.0]);
        let mut controller = RecordingController::new();
        let mut host = RecordingHost::default();
        let mut ctx = PassContext::new(&mut store, &camera, &mut controller, &mut host);
        select.update(&mut ctx);

        assert!(select.result().is_none());
        assert!(host.messages.is_empty());
    }
}

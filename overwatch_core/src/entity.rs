//! Tracked entity model and the incremental diff feed.

use crate::overwatch_cluster::CellKey;
use crate::overwatch_store::DiffError;
use bitflags::bitflags;
use nalgebra::Point3;
use overwatch_env::{Coordinate, SceneRef, SceneType};
use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

// ============================================================================
// IDENTITY
// ============================================================================

new_key_type! {
    /// Stable handle into the [`EntityStore`](crate::EntityStore) arena.
    ///
    /// Cluster buckets, scene buckets and the single list hold keys, never
    /// references. A key whose entity was removed stops resolving, even
    /// after its slot is reused.
    pub struct EntityKey;
}

bitflags! {
    /// Reasons an entity is excluded from clustering.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Exemptions: u8 {
        /// Active search target
        const SEARCHED = 1 << 0;
        /// Active follow target
        const FOLLOWED = 1 << 1;
        /// Hidden by a filter rule
        const FILTERED_OUT = 1 << 2;
    }
}

impl Exemptions {
    /// Search or follow currently focuses this entity.
    pub fn is_focused(&self) -> bool {
        self.intersects(Exemptions::SEARCHED | Exemptions::FOLLOWED)
    }
}

/// Marker kinds drawn on the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerKind {
    Staff,
    Visitor,
    Contractor,
    Vehicle,
    Unknown,
}

impl MarkerKind {
    /// Derives the kind from the feed's free-form `type` field.
    pub fn from_type_str(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "staff" | "employee" | "person" | "personnel" => MarkerKind::Staff,
            "visitor" | "guest" => MarkerKind::Visitor,
            "contractor" | "worker" => MarkerKind::Contractor,
            "vehicle" | "car" | "truck" | "forklift" => MarkerKind::Vehicle,
            _ => MarkerKind::Unknown,
        }
    }

    /// All kinds, in a stable order.
    pub fn all() -> [MarkerKind; 5] {
        [
            MarkerKind::Staff,
            MarkerKind::Visitor,
            MarkerKind::Contractor,
            MarkerKind::Vehicle,
            MarkerKind::Unknown,
        ]
    }

    /// Feed name of the kind.
    pub fn name(&self) -> &'static str {
        match self {
            MarkerKind::Staff => "staff",
            MarkerKind::Visitor => "visitor",
            MarkerKind::Contractor => "contractor",
            MarkerKind::Vehicle => "vehicle",
            MarkerKind::Unknown => "unknown",
        }
    }
}

// ============================================================================
// TRACKED ENTITY
// ============================================================================

/// One tracked marker in the store.
#[derive(Debug, Clone)]
pub struct TrackedEntity {
    /// Unique feed id
    pub id: String,

    /// Display name
    pub name: String,

    /// Scene/floor identifier
    pub origin_id: String,

    /// Indoor or outdoor
    pub scene_type: SceneType,

    /// Raw coordinate as received
    pub coordinate: Coordinate,

    /// World position (projected once per add/update)
    pub position: Point3<f64>,

    /// Marker kind derived from the feed `type`
    pub kind: MarkerKind,

    /// Building prefix of `origin_id`
    pub building_id: String,

    /// Cell of the cluster bucket holding this entity
    pub cluster_id: Option<CellKey>,

    /// Drawn as a plain marker rather than as part of an aggregate
    pub is_single: bool,

    /// Visibility after filter rules
    pub visible: bool,

    /// Active clustering exemptions
    pub exemptions: Exemptions,
}

impl TrackedEntity {
    /// The scene bucket this entity lives in.
    pub fn scene(&self) -> SceneRef {
        SceneRef {
            scene_type: self.scene_type,
            origin_id: self.origin_id.clone(),
        }
    }

    /// Returns true if clustering must leave this entity alone.
    pub fn is_exempt(&self) -> bool {
        !self.exemptions.is_empty()
    }

    /// Drops any cluster membership and marks the entity single.
    pub(crate) fn make_single(&mut self) {
        self.cluster_id = None;
        self.is_single = true;
    }
}

// ============================================================================
// DIFF FEED (Input)
// ============================================================================

/// One entry of the diff feed, as deserialized from the wire.
///
/// `id` and `coordinate` are optional here so malformed entries can be
/// rejected one at a time instead of failing the whole batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEntity {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub coordinate: Option<Coordinate>,

    #[serde(default)]
    pub origin_id: String,

    #[serde(default)]
    pub scene_type: SceneType,

    #[serde(default)]
    pub name: String,

    #[serde(rename = "type", default)]
    pub kind: String,
}

impl RawEntity {
    /// Builds a well-formed entry.
    pub fn new(
        id: impl Into<String>,
        origin_id: impl Into<String>,
        scene_type: SceneType,
        coordinate: Coordinate,
    ) -> Self {
        Self {
            id: Some(id.into()),
            coordinate: Some(coordinate),
            origin_id: origin_id.into(),
            scene_type,
            name: String::new(),
            kind: String::new(),
        }
    }

    /// Sets the feed `type`.
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    /// Sets the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// A removal entry only needs the id.
    pub fn removal(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Default::default()
        }
    }

    /// The id, if present and non-empty.
    pub fn valid_id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }
}

/// An incremental `{add, remove, update}` batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityDiff {
    #[serde(default)]
    pub add: Vec<RawEntity>,

    #[serde(default)]
    pub remove: Vec<RawEntity>,

    #[serde(default)]
    pub update: Vec<RawEntity>,
}

impl EntityDiff {
    /// Parses a diff from its JSON wire form.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Returns true if the batch carries no entries.
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty() && self.update.is_empty()
    }

    /// Total number of entries.
    pub fn len(&self) -> usize {
        self.add.len() + self.remove.len() + self.update.len()
    }
}

/// A diff whose entries are still undecoded JSON values.
///
/// Entries are decoded one at a time so a malformed entry only costs
/// itself, not the batch around it.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct WireDiff {
    #[serde(default)]
    pub add: Vec<serde_json::Value>,

    #[serde(default)]
    pub remove: Vec<serde_json::Value>,

    #[serde(default)]
    pub update: Vec<serde_json::Value>,
}

impl WireDiff {
    pub(crate) fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Decodes an add/update entry.
    pub(crate) fn decode_entry(value: serde_json::Value) -> Result<RawEntity, DiffError> {
        let id = Self::id_of(&value);
        serde_json::from_value(value).map_err(|e| DiffError::Malformed {
            id,
            reason: e.to_string(),
        })
    }

    /// Decodes a remove entry. Only the id is read.
    pub(crate) fn decode_removal(value: serde_json::Value) -> Result<RawEntity, DiffError> {
        match value {
            serde_json::Value::Object(_) => {
                Ok(Self::id_of(&value).map(RawEntity::removal).unwrap_or_default())
            }
            other => Err(DiffError::Malformed {
                id: None,
                reason: format!("expected an object, got {}", other),
            }),
        }
    }

    fn id_of(value: &serde_json::Value) -> Option<String> {
        value
            .get("id")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_kind_aliases() {
        assert_eq!(MarkerKind::from_type_str("Personnel"), MarkerKind::Staff);
        assert_eq!(MarkerKind::from_type_str(" truck "), MarkerKind::Vehicle);
        assert_eq!(MarkerKind::from_type_str("drone"), MarkerKind::Unknown);
    }

    #[test]
    fn test_diff_from_json() {
        let json = r#"{
            "add": [
                {"id": "p1", "coordinate": {"x": 1.0, "y": 0.0, "z": 2.0},
                 "originId": "B1_F2", "sceneType": 1, "name": "Ada", "type": "staff"}
            ],
            "remove": [{"id": "p9"}]
        }"#;

        let diff = EntityDiff::from_json(json).unwrap();
        assert_eq!(diff.len(), 2);
        assert!(diff.update.is_empty());

        let entry = &diff.add[0];
        assert_eq!(entry.valid_id(), Some("p1"));
        assert_eq!(entry.scene_type, SceneType::Indoor);
        assert_eq!(entry.origin_id, "B1_F2");
        assert_eq!(entry.kind, "staff");
        assert_eq!(diff.remove[0].coordinate, None);
    }

    #[test]
    fn test_missing_id_survives_parsing() {
        let diff = EntityDiff::from_json(r#"{"add": [{"originId": "F1"}]}"#).unwrap();
        assert_eq!(diff.add[0].valid_id(), None);

        let empty = RawEntity { id: Some(String::new()), ..Default::default() };
        assert_eq!(empty.valid_id(), None);
    }

    #[test]
    fn test_wire_entries_decode_independently() {
        let wire = WireDiff::from_json(
            r#"{
                "add": [
                    {"id": "ok", "coordinate": {"x": 1.0, "y": 0.0, "z": 2.0}, "sceneType": 0},
                    {"id": "bad-scene", "coordinate": {"x": 1.0, "y": 0.0, "z": 2.0}, "sceneType": 7},
                    {"id": "no-y", "coordinate": {"x": 1.0, "z": 2.0}}
                ],
                "remove": [{"id": "gone", "sceneType": 7}, 12]
            }"#,
        )
        .unwrap();

        let adds: Vec<_> = wire.add.into_iter().map(WireDiff::decode_entry).collect();
        assert_eq!(adds[0].as_ref().unwrap().valid_id(), Some("ok"));
        assert!(matches!(
            &adds[1],
            Err(DiffError::Malformed { id: Some(id), .. }) if id == "bad-scene"
        ));
        assert!(matches!(
            &adds[2],
            Err(DiffError::Malformed { id: Some(id), .. }) if id == "no-y"
        ));

        let removes: Vec<_> = wire.remove.into_iter().map(WireDiff::decode_removal).collect();
        assert_eq!(removes[0].as_ref().unwrap().valid_id(), Some("gone"));
        assert!(matches!(removes[1], Err(DiffError::Malformed { id: None, .. })));
    }

    #[test]
    fn test_exemption_focus() {
        assert!(Exemptions::SEARCHED.is_focused());
        assert!((Exemptions::FOLLOWED | Exemptions::FILTERED_OUT).is_focused());
        assert!(!Exemptions::FILTERED_OUT.is_focused());
        assert!(!Exemptions::empty().is_focused());
    }
}

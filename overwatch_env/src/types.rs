//! Common types shared between the core and its collaborators.

use serde::{Deserialize, Serialize};

/// Which half of the scene graph an entity belongs to.
///
/// On the wire this is the integer `sceneType`: `0` is outdoor, `1` is indoor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum SceneType {
    /// Open site, one flat bucket
    #[default]
    Outdoor,

    /// Inside a building, bucketed by building then floor
    Indoor,
}

impl TryFrom<u8> for SceneType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SceneType::Outdoor),
            1 => Ok(SceneType::Indoor),
            other => Err(format!("Unknown sceneType: {}", other)),
        }
    }
}

impl From<SceneType> for u8 {
    fn from(value: SceneType) -> Self {
        match value {
            SceneType::Outdoor => 0,
            SceneType::Indoor => 1,
        }
    }
}

/// A raw feed coordinate in external units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Coordinate {
    /// Creates a coordinate from its components.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Returns true if every component is finite.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Identifies one scene bucket: the outdoor site or a single indoor floor.
///
/// For outdoor scenes `origin_id` is informational only; every outdoor
/// entity shares one bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SceneRef {
    pub scene_type: SceneType,
    pub origin_id: String,
}

impl SceneRef {
    /// The outdoor site.
    pub fn outdoor() -> Self {
        Self {
            scene_type: SceneType::Outdoor,
            origin_id: String::new(),
        }
    }

    /// An indoor floor identified by its origin id.
    pub fn indoor(origin_id: impl Into<String>) -> Self {
        Self {
            scene_type: SceneType::Indoor,
            origin_id: origin_id.into(),
        }
    }

    /// Returns true if both refs resolve to the same bucket.
    pub fn same_bucket(&self, other: &SceneRef) -> bool {
        match (self.scene_type, other.scene_type) {
            (SceneType::Outdoor, SceneType::Outdoor) => true,
            (SceneType::Indoor, SceneType::Indoor) => self.origin_id == other.origin_id,
            _ => false,
        }
    }
}

impl std::fmt::Display for SceneRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.scene_type {
            SceneType::Outdoor => write!(f, "outdoor"),
            SceneType::Indoor => write!(f, "indoor:{}", self.origin_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scene_type_wire_format() {
        let indoor: SceneType = serde_json::from_str("1").unwrap();
        assert_eq!(indoor, SceneType::Indoor);
        assert_eq!(serde_json::to_string(&SceneType::Outdoor).unwrap(), "0");
        assert!(serde_json::from_str::<SceneType>("7").is_err());
    }

    #[test]
    fn test_outdoor_refs_share_a_bucket() {
        let a = SceneRef { scene_type: SceneType::Outdoor, origin_id: "site-a".into() };
        assert!(a.same_bucket(&SceneRef::outdoor()));
        assert!(!SceneRef::indoor("B1_F1").same_bucket(&SceneRef::indoor("B1_F2")));
        assert!(!SceneRef::indoor("B1_F1").same_bucket(&SceneRef::outdoor()));
    }
}

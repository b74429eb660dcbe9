//! Simulation scenarios.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// OW-001: Outdoor crowd random walk with churn
    Crowd,

    /// OW-002: Indoor crowd hopping floors while the operator switches floors
    FloorHop,

    /// OW-003: Camera sweeps through every zoom band and dives into clusters
    ZoomSweep,

    /// OW-004: Random search/follow/clear with target removals
    FocusChurn,

    /// OW-005: Random lasso polygons checked against brute force
    Lasso,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::Crowd,
            ScenarioId::FloorHop,
            ScenarioId::ZoomSweep,
            ScenarioId::FocusChurn,
            ScenarioId::Lasso,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::Crowd => "crowd",
            ScenarioId::FloorHop => "floor_hop",
            ScenarioId::ZoomSweep => "zoom_sweep",
            ScenarioId::FocusChurn => "focus_churn",
            ScenarioId::Lasso => "lasso",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::Crowd => "Outdoor crowd random walk with spawns and removals",
            ScenarioId::FloorHop => "Indoor crowd changing floors, operator switching floors",
            ScenarioId::ZoomSweep => "Altitude sweep across all zoom bands plus fly-throughs",
            ScenarioId::FocusChurn => "Search/follow churn with targets leaving the feed",
            ScenarioId::Lasso => "Random lasso polygons vs brute-force containment",
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "crowd" | "ow-001" => Ok(ScenarioId::Crowd),
            "floor_hop" | "floorhop" | "ow-002" => Ok(ScenarioId::FloorHop),
            "zoom_sweep" | "zoomsweep" | "ow-003" => Ok(ScenarioId::ZoomSweep),
            "focus_churn" | "focuschurn" | "ow-004" => Ok(ScenarioId::FocusChurn),
            "lasso" | "ow-005" => Ok(ScenarioId::Lasso),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_parse_back() {
        for scenario in ScenarioId::all() {
            assert_eq!(scenario.name().parse::<ScenarioId>(), Ok(scenario));
        }
        assert_eq!("OW-004".parse::<ScenarioId>(), Ok(ScenarioId::FocusChurn));
        assert!("split_brain".parse::<ScenarioId>().is_err());
    }
}

//! Overwatch Deterministic Simulation Harness
//!
//! Drives the clustering engine with a seeded crowd and a scripted operator
//! so every run is reproducible from a single 64-bit seed.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                   ScenarioRunner                     │
//! │                                                      │
//! │  CrowdOracle ──EntityDiff──► MonitorEngine           │
//! │  (ground truth)               │        ▲             │
//! │                     focus/track│        │position     │
//! │                               ▼        │             │
//! │                          SimCamera ─────┘             │
//! │                                                      │
//! │  invariants::check_all after every tick              │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use overwatch_sim::{ScenarioId, ScenarioRunner};
//!
//! let result = ScenarioRunner::new(42).with_ticks(200).run(ScenarioId::Crowd);
//! assert!(result.passed);
//! ```

pub mod camera;
pub mod crowd;
pub mod invariants;
pub mod runner;
pub mod scenarios;

pub use camera::SimCamera;
pub use crowd::{CrowdConfig, CrowdMember, CrowdOracle};
pub use invariants::{check_all, InvariantViolation};
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use scenarios::ScenarioId;

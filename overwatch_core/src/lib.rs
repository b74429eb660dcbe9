//! Overwatch Core - Marker clustering for live monitoring dashboards
//!
//! This library keeps thousands of moving markers readable on an
//! indoor/outdoor site map:
//! 1. **Store**: incremental add/remove/update diffs, partitioned by scene and floor
//! 2. **Cluster**: zoom-adaptive grid aggregation with camera-proximity dispersal
//! 3. **Pipeline**: ordered modules (filter, cluster, box select, search, follow)
//!    run once per pass, with bounded re-entry
//! 4. **Lasso**: ground-plane polygon selection reported back to the host page

pub mod entity;
pub mod overwatch_store;
pub mod overwatch_cluster;
pub mod pipeline;
pub mod filter;
pub mod focus;
pub mod box_select;
pub mod config;
pub mod engine;

// Re-export key types for convenience
pub use entity::{EntityDiff, EntityKey, Exemptions, MarkerKind, RawEntity, TrackedEntity};
pub use overwatch_store::{DiffError, DiffReport, EntityStore, StoreConfig};
pub use overwatch_cluster::{CellKey, ClusterBucket, ClusterConfig, ClusterStats, SpatialClusterer, ZoomBand};
pub use pipeline::{ModuleHandle, PassContext, PassOutcome, PipelineConfig, UpdatePipeline, Updatable};
pub use filter::FilterModule;
pub use focus::{FocusSettings, FollowModule, SearchModule};
pub use box_select::{Anchor, BoxSelect, BoxSelectConfig, BoxSelectError, PointOutcome};
pub use config::{ConfigError, EngineConfig};
pub use engine::{CameraEvent, Collaborators, EngineError, MonitorEngine};

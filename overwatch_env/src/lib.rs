//! Overwatch Environment Abstraction Layer
//!
//! This crate provides the collaborator seams that let the Overwatch core
//! run against a real dashboard host **or** a deterministic simulation.
//!
//! # Core Concept: Collaborators
//!
//! The clustering core never renders, animates or talks to the host page.
//! Everything outside its own state is reached through four traits:
//! - [`PositionProjector`]: raw feed coordinate → world-space point
//! - [`CameraReader`]: altitude, position and the current scene/floor
//! - [`CameraController`]: fire-and-forget recenter, path tracking, panning
//! - [`HostChannel`]: outbound messages to the embedding page
//!
//! # Example
//!
//! ```ignore
//! use overwatch_env::{FixedCamera, FlatProjector, RecordingController, RecordingHost};
//!
//! let camera = FixedCamera::outdoor([0.0, 200.0, 0.0]);
//! let projector = FlatProjector::default();
//! ```

mod camera;
mod error;
mod host;
mod local_impl;
mod projector;
mod types;

pub use camera::{CameraController, CameraReader, FocusRequest};
pub use error::EnvError;
pub use host::{HostChannel, HostMessage, SelectionReport};
pub use local_impl::{
    ControllerCall, FixedCamera, FlatProjector, JsonLinesHost, RecordingController, RecordingHost,
};
pub use projector::PositionProjector;
pub use types::{Coordinate, SceneRef, SceneType};

//! Ordered update orchestration.
//!
//! Every store mutation or camera/floor change ends in one orchestration
//! run: registered [`Updatable`] modules are stable-sorted by `order` and
//! each is updated once per pass. A module may ask for another full pass
//! (e.g. a followed entity changed floors); the number of passes per run is
//! capped by [`PipelineConfig::max_passes`].

use crate::overwatch_store::EntityStore;
use overwatch_env::{CameraController, CameraReader, HostChannel, SceneRef};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, warn};

/// Conventional module orders.
pub mod order {
    pub const FILTER: i32 = 0;
    pub const CLUSTER: i32 = 1;
    pub const BOX_SELECT: i32 = 2;
    pub const FOCUS: i32 = 3;
    pub const RENDER_SYNC: i32 = 10;
}

/// Configuration for the UpdatePipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum passes per run, including the first (default: 3)
    pub max_passes: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { max_passes: 3 }
    }
}

/// Everything a module may touch during a pass.
pub struct PassContext<'a> {
    pub store: &'a mut EntityStore,
    pub camera: &'a dyn CameraReader,
    pub controller: &'a mut dyn CameraController,
    pub host: &'a mut dyn HostChannel,
    rerun_requested: bool,
}

impl<'a> PassContext<'a> {
    pub fn new(
        store: &'a mut EntityStore,
        camera: &'a dyn CameraReader,
        controller: &'a mut dyn CameraController,
        host: &'a mut dyn HostChannel,
    ) -> Self {
        Self {
            store,
            camera,
            controller,
            host,
            rerun_requested: false,
        }
    }

    /// Asks the pipeline for one more full pass after this one.
    pub fn request_pass(&mut self) {
        self.rerun_requested = true;
    }

    /// Returns true if a module asked for another pass.
    pub fn rerun_requested(&self) -> bool {
        self.rerun_requested
    }

    /// The scene the camera currently shows.
    pub fn current_scene(&self) -> SceneRef {
        self.camera.current_scene()
    }

    fn take_rerun(&mut self) -> bool {
        std::mem::replace(&mut self.rerun_requested, false)
    }
}

/// A module reacting to store mutations and camera changes.
pub trait Updatable {
    /// Position in the pass; lower runs first.
    fn order(&self) -> i32;

    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Runs the module once for the current pass.
    fn update(&mut self, ctx: &mut PassContext<'_>);
}

/// Shared handle to a registered module.
pub type ModuleHandle = Rc<RefCell<dyn Updatable>>;

/// Result of one orchestration run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassOutcome {
    /// Passes executed
    pub passes: usize,

    /// A module asked for another pass after the cap was reached
    pub truncated: bool,
}

/// Flat registry of modules, run in stable ascending `order`.
pub struct UpdatePipeline {
    modules: Vec<ModuleHandle>,
    config: PipelineConfig,
    total_passes: u64,
}

impl UpdatePipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            modules: Vec::new(),
            config,
            total_passes: 0,
        }
    }

    /// Registers a module. Registering the same handle twice is a no-op.
    pub fn add(&mut self, module: ModuleHandle) -> bool {
        if self.contains(&module) {
            return false;
        }
        self.modules.push(module);
        true
    }

    /// Unregisters a module by reference.
    pub fn remove(&mut self, module: &ModuleHandle) -> bool {
        let before = self.modules.len();
        self.modules.retain(|m| !Rc::ptr_eq(m, module));
        self.modules.len() != before
    }

    pub fn contains(&self, module: &ModuleHandle) -> bool {
        self.modules.iter().any(|m| Rc::ptr_eq(m, module))
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Passes executed since creation.
    pub fn total_passes(&self) -> u64 {
        self.total_passes
    }

    /// Names of registered modules in execution order.
    pub fn execution_order(&mut self) -> Vec<&'static str> {
        self.sort();
        self.modules
            .iter()
            .filter_map(|m| m.try_borrow().ok().map(|m| m.name()))
            .collect()
    }

    fn sort(&mut self) {
        // A module that is currently borrowed elsewhere sorts last
        self.modules
            .sort_by_key(|m| m.try_borrow().map(|m| m.order()).unwrap_or(i32::MAX));
    }

    /// Runs passes until no module asks for another one, or the cap is hit.
    pub fn run(&mut self, ctx: &mut PassContext<'_>) -> PassOutcome {
        let max_passes = self.config.max_passes.max(1);
        let mut outcome = PassOutcome::default();

        loop {
            self.sort();
            for module in &self.modules {
                match module.try_borrow_mut() {
                    Ok(mut module) => module.update(ctx),
                    Err(_) => warn!("Skipping module busy elsewhere during pass"),
                }
            }
            outcome.passes += 1;
            self.total_passes += 1;

            if !ctx.take_rerun() {
                break;
            }
            if outcome.passes >= max_passes {
                warn!(
                    "Pass re-entry truncated after {} passes; latest pass stands",
                    outcome.passes
                );
                outcome.truncated = true;
                break;
            }
            debug!("Module requested another pass ({} so far)", outcome.passes);
        }

        outcome
    }
}

//! Vine growth on triangle surfaces with oriented-particle shape matching.
//!
//! Main components:
//! - [`simulation`]: the driver owning all plants; start here.
//! - [`phases`]: the per-tick passes run on each plant.
//! - [`group`]: a plant as an arena of particles, with apical and lateral
//!   growth.
//! - [`particle`]: per-particle growth, anchoring and orientation rules.
//! - [`shape_matching`]: the group-wise constraint solver.
//! - [`goal_buffer`]: scratch storage for blending shape-matching targets.
//! - [`surface`], [`light`], [`observer`]: what the simulation needs from
//!   the outside world.
//! - [`config`]: growth options and particle tuning.
//! - [`math`]: vector and matrix helpers.
//! - [`error`], [`types`]: shared error and id types.

pub mod config;
pub mod error;
pub mod goal_buffer;
pub mod group;
pub mod light;
pub mod math;
pub mod observer;
pub mod particle;
pub mod phases;
pub mod shape_matching;
pub mod simulation;
pub mod surface;
pub mod types;

pub use config::{GrowthConfig, ParticleParams};
pub use error::{Result, SimError};
pub use light::{LightSource, PointLight, StemMaterial, SurfaceMaterial};
pub use observer::GroupObserver;
pub use simulation::{Simulation, TickReport};
pub use surface::{SurfaceQuery, Triangle, TriangleSurface};
pub use types::{ParticleId, PlantId};

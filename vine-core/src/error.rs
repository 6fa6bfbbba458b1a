//! Error types for the vine simulation.

use crate::types::{ParticleId, PlantId};
use thiserror::Error;

/// Errors surfaced by the simulation core.
///
/// Geometric degeneracy (parallel vectors, zero-area triangles) is never an
/// error; it is recovered locally. Growth limits are reported as `bool` or
/// `Option` outcomes of the growth operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimError {
    /// A surface was built without any triangles
    #[error("surface has no triangles")]
    EmptySurface,

    /// A configuration value is out of range
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A particle state became NaN or infinite
    #[error("{plant}: particle {particle} has a non-finite {quantity}")]
    NonFinite {
        plant: PlantId,
        particle: ParticleId,
        quantity: &'static str,
    },

    /// No plant with this id exists
    #[error("unknown plant: {0}")]
    UnknownPlant(PlantId),
}

pub type Result<T> = std::result::Result<T, SimError>;

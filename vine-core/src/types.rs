use std::fmt;

/// Identifier for a particle in a [`crate::group::PlantGroup`].
///
/// This is an index into `PlantGroup::particles`, and is only meaningful
/// within the lifetime of a given `PlantGroup` instance.
pub type ParticleId = usize;

/// Identifier of one plant, assigned when its seed is created.
///
/// Renderers key their cached geometry by this id. It displays as
/// `plant-<n>` for collaborators that want a string key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlantId(pub u32);

impl fmt::Display for PlantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "plant-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plant_id_displays_as_string_key() {
        assert_eq!(PlantId(7).to_string(), "plant-7");
    }
}

use crate::types::ParticleId;
use glam::Vec3;

/// A temporary buffer that accumulates weighted shape-matching targets per
/// particle.
///
/// Every particle belongs to several overlapping shape-matching groups (its
/// own, its parent's, and each child's). Each group proposes a target
/// position for all of its members. For each `ParticleId`, this buffer
/// stores:
///
/// - The weighted sum of all proposed target positions.
/// - The total weight of the contributions that were added.
///
/// The goal position of a particle is then the weighted **average** of its
/// targets.
///
/// Internally, `sum[i]` and `weight[i]` correspond to particle `i` of the
/// plant group being solved.
#[derive(Debug)]
pub struct GoalBuffer {
    /// Weighted sum of target positions for each particle.
    sum: Vec<Vec3>,
    /// Total contribution weight for each particle.
    pub weight: Vec<f32>,
}

impl GoalBuffer {
    /// Creates a new [`GoalBuffer`] with the given length.
    ///
    /// All sums are initialized to `Vec3::ZERO` and all weights to `0`.
    ///
    /// ### Parameters
    /// - `len` - Number of particles this buffer can store targets for.
    pub fn with_len(len: usize) -> Self {
        Self {
            sum: vec![Vec3::ZERO; len],
            weight: vec![0.0; len],
        }
    }

    /// Ensures that the internal storage has exactly the given length.
    ///
    /// After this call, all entries are cleared, even if the length was
    /// already correct.
    ///
    /// ### Parameters
    /// - `len` - Desired length of the internal buffers.
    pub fn ensure_len(&mut self, len: usize) {
        if self.sum.len() != len {
            self.sum.resize(len, Vec3::ZERO);
            self.weight.resize(len, 0.0);
        }
        self.clear();
    }

    /// Clears all accumulated targets, keeping the length.
    pub fn clear(&mut self) {
        self.sum.fill(Vec3::ZERO);
        self.weight.fill(0.0);
    }

    /// Adds one weighted target position for the given particle.
    ///
    /// Contributions with a non-positive weight are ignored.
    ///
    /// ### Panics
    /// Panics if `id` is out of bounds for the internal arrays.
    #[inline]
    pub fn add(&mut self, id: ParticleId, target: Vec3, weight: f32) {
        if weight > 0.0 {
            self.sum[id] += target * weight;
            self.weight[id] += weight;
        }
    }

    /// Returns the weighted average target for a particle, or `None` if it
    /// received no contribution.
    #[inline]
    pub fn goal(&self, id: ParticleId) -> Option<Vec3> {
        let w = self.weight[id];
        (w > 0.0).then(|| self.sum[id] / w)
    }

    pub fn len(&self) -> usize {
        self.sum.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sum.is_empty()
    }
}

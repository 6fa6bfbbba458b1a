use crate::config::{GrowthConfig, ParticleParams};
use crate::error::{Result, SimError};
use crate::light::darkened;
use crate::math::{random_perpendicular, rotate};
use crate::particle::Particle;
use crate::shape_matching;
use crate::types::{ParticleId, PlantId};
use glam::Vec3;
use rand::Rng;

/// Each lateral branch a particle already carries scales its chance of
/// carrying another by this factor.
const BRANCH_COUNT_DECAY: f32 = 0.7;

/// All particles of one plant.
///
/// The group owns every particle; hierarchy links are indices into
/// `particles`. Index `0` is always the seed.
#[derive(Clone, Debug)]
pub struct PlantGroup {
    pub id: PlantId,
    pub particles: Vec<Particle>,
    /// Set once the plant hit a non-finite state; halted plants are skipped.
    pub halted: bool,
}

impl PlantGroup {
    pub fn new(id: PlantId, seed: Particle) -> Self {
        Self {
            id,
            particles: vec![seed],
            halted: false,
        }
    }

    pub fn seed(&self) -> &Particle {
        &self.particles[0]
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    /// Appends `child` below `parent` and links both directions.
    pub fn add_child(&mut self, parent: ParticleId, mut child: Particle) -> ParticleId {
        let id = self.particles.len();
        child.parent = Some(parent);
        child.depth = self.particles[parent].depth + 1;
        self.particles.push(child);
        self.particles[parent].children.push(id);
        id
    }

    /// The shape-matching group centered on `id`: itself, its parent and
    /// its direct children.
    pub fn group_members(&self, id: ParticleId) -> Vec<ParticleId> {
        let p = &self.particles[id];
        let mut members = Vec::with_capacity(2 + p.children.len());
        members.push(id);
        members.extend(p.parent);
        members.extend(p.children.iter().copied());
        members
    }

    /// Whether `id` may grow a lateral branch at time `now`.
    pub fn can_branch(
        &self,
        id: ParticleId,
        now: f32,
        cooldown: f32,
        params: &ParticleParams,
    ) -> bool {
        let p = &self.particles[id];
        !p.is_seed
            && p.is_fully_grown()
            && p.branch_count < params.max_lateral_branches
            && p.last_branch_time.is_none_or(|t| now - t >= cooldown)
    }

    /// Extends the stem with a new tip particle half a height ahead of `id`.
    ///
    /// Only fires once the height of `id` reached its cap, and at most once
    /// per particle.
    pub fn grow_apical_child(
        &mut self,
        id: ParticleId,
        params: &ParticleParams,
        rng: &mut impl Rng,
    ) -> Option<ParticleId> {
        let p = &self.particles[id];
        if p.has_apical_child() || !p.is_height_capped() {
            return None;
        }

        let position = p.position + p.direction() * (p.height() * 0.5);
        let mut child = Particle::sprout(
            position,
            p.orientation,
            p.depth + 1,
            p.material.clone(),
            params,
            rng,
        );
        child.is_lateral_branch = p.is_lateral_branch;

        let child_id = self.add_child(id, child);
        self.particles[id].apical_child = Some(child_id);
        shape_matching::update_centers_of_mass(self, id);
        shape_matching::update_centers_of_mass(self, child_id);

        log::debug!("{}: apical child {child_id} from {id} at {position}", self.id);
        Some(child_id)
    }

    /// Grows a side branch off the fully grown particle `id`.
    ///
    /// The branch leaves the stem at a random angle in
    /// `[min_branch_angle, max_branch_angle]`, bent around a random axis
    /// perpendicular to the stem, starting at the stem's surface.
    pub fn grow_lateral_branch(
        &mut self,
        id: ParticleId,
        now: f32,
        cfg: &GrowthConfig,
        params: &ParticleParams,
        rng: &mut impl Rng,
    ) -> Option<ParticleId> {
        if !self.can_branch(id, now, cfg.lateral_branch_cooldown, params) {
            return None;
        }

        let p = &self.particles[id];
        let bend_axis = random_perpendicular(p.direction(), rng);
        let bend = rng.random_range(params.min_branch_angle..=params.max_branch_angle);
        let orientation = rotate(p.orientation, bend_axis, bend);
        let position = p.position + orientation * Vec3::Z * (p.dimensions.x * 0.5);
        let material = darkened(p.material.as_ref(), params.branch_darkening);

        let mut child = Particle::sprout(position, orientation, p.depth + 1, material, params, rng);
        child.is_lateral_branch = true;
        child.dimensions = params.initial_dimensions * params.branch_size_factor;
        child.refresh_mass(params);

        let child_id = self.add_child(id, child);
        let parent = &mut self.particles[id];
        parent.branch_count += 1;
        parent.last_branch_time = Some(now);
        shape_matching::update_centers_of_mass(self, id);
        shape_matching::update_centers_of_mass(self, child_id);

        log::debug!(
            "{}: lateral branch {child_id} from {id} at {bend:.3} rad",
            self.id
        );
        Some(child_id)
    }

    /// Attempts at most one lateral branch anywhere on the plant.
    ///
    /// The attempt itself happens with probability
    /// `lateral_branch_probability * dt`. Particles are then scanned from a
    /// random start index (wrapping around) so no position is favoured;
    /// each eligible particle branches with probability
    /// `(weight / max_weight) * 0.7^branch_count * branch_selection_factor`,
    /// where `max_weight` is the largest weight among eligible particles.
    /// The first particle that passes its draw branches and the scan stops.
    ///
    /// ### Returns
    /// The id of the new branch particle, if one was grown.
    pub fn try_grow_branch(
        &mut self,
        dt: f32,
        now: f32,
        cfg: &GrowthConfig,
        params: &ParticleParams,
        rng: &mut impl Rng,
    ) -> Option<ParticleId> {
        let gate = (cfg.lateral_branch_probability * dt).clamp(0.0, 1.0);
        if rng.random::<f32>() >= gate {
            return None;
        }

        let cooldown = cfg.lateral_branch_cooldown;
        let max_weight = (0..self.particles.len())
            .filter(|&id| self.can_branch(id, now, cooldown, params))
            .map(|id| self.particles[id].weight)
            .fold(0.0f32, f32::max);
        if max_weight <= 0.0 {
            return None;
        }

        let n = self.particles.len();
        let start = rng.random_range(0..n);
        for k in 0..n {
            let id = (start + k) % n;
            if !self.can_branch(id, now, cooldown, params) {
                continue;
            }

            let p = &self.particles[id];
            let probability = (p.weight / max_weight)
                * BRANCH_COUNT_DECAY.powi(p.branch_count as i32)
                * params.branch_selection_factor;
            if rng.random::<f32>() < probability {
                return self.grow_lateral_branch(id, now, cfg, params, rng);
            }
        }
        None
    }

    /// Checks every particle for NaN or infinite state.
    ///
    /// ### Errors
    /// [`SimError::NonFinite`] naming the first offending particle.
    pub fn validate(&self) -> Result<()> {
        for (particle, p) in self.particles.iter().enumerate() {
            if let Some(quantity) = p.first_non_finite() {
                return Err(SimError::NonFinite {
                    plant: self.id,
                    particle,
                    quantity,
                });
            }
        }
        Ok(())
    }
}

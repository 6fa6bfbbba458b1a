//! Per-tick passes over a single plant.
//!
//! [`crate::simulation::Simulation::tick`] runs them in this fixed order:
//! 1. [`self_growth_phase`]: particles grow and re-anchor to the surface.
//! 2. [`orientation_phase`]: penetration avoidance, growth bias, surface
//!    adaptation and phototropism turn each growing tip.
//! 3. [`branching_phase`]: at most one lateral branch per plant, when
//!    lateral branching is enabled.
//! 4. [`apical_phase`]: particles that reached full height extend the stem.
//! 5. [`relaxation_phase`]: one shape-matching step, when enabled.
//! 6. [`sync_phase`]: world transforms for rendering.

use crate::config::{GrowthConfig, ParticleParams};
use crate::goal_buffer::GoalBuffer;
use crate::group::PlantGroup;
use crate::light::LightSource;
use crate::shape_matching;
use crate::surface::SurfaceQuery;
use crate::types::ParticleId;
use rand::Rng;

/// Grows every particle of the plant for `dt` seconds.
///
/// Seeds and fully grown particles are skipped by
/// [`crate::particle::Particle::self_growth`].
///
/// ### Parameters
/// - `group` - The plant to grow.
/// - `dt` - Time step in seconds.
/// - `cfg` - Provides the global `growth_rate` multiplier.
/// - `params` - Growth rates and caps.
/// - `surface` - Used to re-anchor each grown particle.
///
/// ### Returns
/// The number of particles that grew.
pub fn self_growth_phase(
    group: &mut PlantGroup,
    dt: f32,
    cfg: &GrowthConfig,
    params: &ParticleParams,
    surface: &impl SurfaceQuery,
) -> usize {
    group
        .particles
        .iter_mut()
        .map(|p| p.self_growth(dt, cfg.growth_rate, params, surface))
        .filter(|&grew| grew)
        .count()
}

/// Applies the orientation rules to every particle.
///
/// Only growing tips actually turn: seeds and particles that already have
/// an apical child keep their orientation.
pub fn orientation_phase(
    group: &mut PlantGroup,
    dt: f32,
    params: &ParticleParams,
    light: &impl LightSource,
    surface: &impl SurfaceQuery,
) {
    for p in group.particles.iter_mut() {
        p.plant_orientation(dt, params, light, surface);
    }
}

/// Gives the plant one chance to grow a lateral branch.
///
/// Does nothing when `cfg.lateral_branching` is off; otherwise defers to
/// [`PlantGroup::try_grow_branch`].
///
/// ### Returns
/// The new branch particle, if one was grown.
pub fn branching_phase(
    group: &mut PlantGroup,
    dt: f32,
    now: f32,
    cfg: &GrowthConfig,
    params: &ParticleParams,
    rng: &mut impl Rng,
) -> Option<ParticleId> {
    if !cfg.lateral_branching {
        return None;
    }
    group.try_grow_branch(dt, now, cfg, params, rng)
}

/// Extends the stem at every particle that reached its full height.
///
/// Only particles that existed when the phase started are considered, so
/// a stem grows at most one particle per tick along any path.
///
/// ### Returns
/// The ids of all newly created particles, in creation order.
pub fn apical_phase(
    group: &mut PlantGroup,
    params: &ParticleParams,
    rng: &mut impl Rng,
) -> Vec<ParticleId> {
    let existing = group.particles.len();
    (0..existing)
        .filter_map(|id| group.grow_apical_child(id, params, rng))
        .collect()
}

/// Runs one shape-matching step, see [`shape_matching::relax`].
pub fn relaxation_phase(
    group: &mut PlantGroup,
    dt: f32,
    params: &ParticleParams,
    acc: &mut GoalBuffer,
) {
    shape_matching::relax(group, dt, params, acc);
}

/// Refreshes the world transform of every particle.
pub fn sync_phase(group: &mut PlantGroup) {
    for p in group.particles.iter_mut() {
        p.sync_transform();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::light::{PointLight, StemMaterial};
    use crate::particle::Particle;
    use crate::surface::TriangleSurface;
    use crate::types::PlantId;
    use glam::{Quat, Vec3};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    const DT: f32 = 1.0 / 60.0;

    fn floor() -> TriangleSurface {
        TriangleSurface::plane(
            Vec3::new(-2.0, 0.0, -2.0),
            Vec3::new(0.0, 0.0, 4.0),
            Vec3::new(4.0, 0.0, 0.0),
            4,
            4,
        )
        .unwrap()
    }

    fn seeded_plant(params: &ParticleParams) -> PlantGroup {
        let up = Quat::from_rotation_arc(Vec3::Z, Vec3::Y);
        let seed = Particle::seed(Vec3::ZERO, up, Box::new(StemMaterial::default()), params);
        PlantGroup::new(PlantId(0), seed)
    }

    #[test]
    fn self_growth_phase_skips_seed() {
        let params = ParticleParams::default();
        let cfg = GrowthConfig::default();
        let mut rng = StdRng::seed_from_u64(1);
        let mut group = seeded_plant(&params);

        assert_eq!(self_growth_phase(&mut group, DT, &cfg, &params, &floor()), 0);

        apical_phase(&mut group, &params, &mut rng);
        assert_eq!(self_growth_phase(&mut group, DT, &cfg, &params, &floor()), 1);
    }

    #[test]
    fn zero_growth_rate_freezes_dimensions() {
        let params = ParticleParams::default();
        let cfg = GrowthConfig {
            growth_rate: 0.0,
            ..GrowthConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(2);
        let mut group = seeded_plant(&params);
        apical_phase(&mut group, &params, &mut rng);
        let before = group.particles[1].dimensions;

        for _ in 0..10 {
            self_growth_phase(&mut group, DT, &cfg, &params, &floor());
        }

        assert_eq!(group.particles[1].dimensions, before);
    }

    #[test]
    fn apical_phase_grows_one_particle_per_capped_tip() {
        let params = ParticleParams::default();
        let mut rng = StdRng::seed_from_u64(3);
        let mut group = seeded_plant(&params);

        let first = apical_phase(&mut group, &params, &mut rng);
        assert_eq!(first, vec![1]);

        // The new particle is still short, and the seed is already extended.
        assert!(apical_phase(&mut group, &params, &mut rng).is_empty());

        let p = &mut group.particles[1];
        p.dimensions = p.max_dimensions;
        assert_eq!(apical_phase(&mut group, &params, &mut rng), vec![2]);
    }

    #[test]
    fn branching_phase_respects_the_switch() {
        let params = ParticleParams::default();
        let cfg = GrowthConfig {
            lateral_branching: false,
            lateral_branch_probability: 1.0,
            ..GrowthConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(4);
        let mut group = seeded_plant(&params);
        apical_phase(&mut group, &params, &mut rng);
        let p = &mut group.particles[1];
        p.dimensions = p.max_dimensions;
        p.refresh_mass(&params);

        assert!(branching_phase(&mut group, 10.0, 0.0, &cfg, &params, &mut rng).is_none());

        let enabled = GrowthConfig {
            lateral_branching: true,
            ..cfg
        };
        assert!(branching_phase(&mut group, 10.0, 0.0, &enabled, &params, &mut rng).is_some());
    }

    #[test]
    fn orientation_phase_keeps_seed_fixed() {
        let params = ParticleParams::default();
        let light = PointLight::new(Vec3::new(3.0, 0.5, 0.0));
        let mut rng = StdRng::seed_from_u64(5);
        let mut group = seeded_plant(&params);
        apical_phase(&mut group, &params, &mut rng);
        let seed_orientation = group.seed().orientation;

        for _ in 0..60 {
            orientation_phase(&mut group, DT, &params, &light, &floor());
        }

        assert_eq!(group.seed().orientation, seed_orientation);
        assert!((group.particles[1].orientation.length() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn sync_phase_builds_world_transforms() {
        let params = ParticleParams::default();
        let mut group = seeded_plant(&params);
        group.particles[0].position = Vec3::new(1.0, 2.0, 3.0);

        sync_phase(&mut group);

        let (scale, _, translation) = group.seed().world_transform.to_scale_rotation_translation();
        assert!(translation.abs_diff_eq(Vec3::new(1.0, 2.0, 3.0), 1e-6));
        assert!(scale.abs_diff_eq(params.max_dimensions(), 1e-5));
    }
}

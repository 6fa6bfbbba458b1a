//! The simulation driver: owns every plant and advances them tick by tick.

use crate::config::{GrowthConfig, ParticleParams};
use crate::error::{Result, SimError};
use crate::goal_buffer::GoalBuffer;
use crate::group::PlantGroup;
use crate::light::{LightSource, SurfaceMaterial};
use crate::observer::GroupObserver;
use crate::particle::Particle;
use crate::phases::{
    apical_phase, branching_phase, orientation_phase, relaxation_phase, self_growth_phase,
    sync_phase,
};
use crate::surface::SurfaceQuery;
use crate::types::PlantId;
use glam::{Quat, Vec3};
use rand::SeedableRng;
use rand::rngs::StdRng;

/// What happened during one [`Simulation::tick`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TickReport {
    /// Particles created across all plants.
    pub spawned: usize,
    /// Plants that went non-finite during this tick and were halted.
    pub halted: Vec<PlantId>,
    /// Set when the configuration was invalid and the tick was skipped.
    pub config_error: Option<SimError>,
}

/// A set of independently growing plants sharing one configuration and one
/// random generator.
///
/// `config` and `params` may be changed between ticks; the next tick picks
/// the new values up.
pub struct Simulation {
    pub config: GrowthConfig,
    pub params: ParticleParams,
    plants: Vec<PlantGroup>,
    rng: StdRng,
    elapsed: f32,
    next_plant: u32,
    acc: GoalBuffer,
}

impl Simulation {
    /// Creates an empty simulation with default settings and a seeded RNG.
    pub fn new(seed: u64) -> Self {
        Self::with_settings(GrowthConfig::default(), ParticleParams::default(), seed)
    }

    pub fn with_settings(config: GrowthConfig, params: ParticleParams, seed: u64) -> Self {
        Self::with_rng(config, params, StdRng::seed_from_u64(seed))
    }

    /// Like [`Simulation::new`] but seeded from the operating system.
    pub fn from_entropy() -> Self {
        Self::with_rng(
            GrowthConfig::default(),
            ParticleParams::default(),
            StdRng::from_os_rng(),
        )
    }

    fn with_rng(config: GrowthConfig, params: ParticleParams, rng: StdRng) -> Self {
        Self {
            config,
            params,
            plants: Vec::new(),
            rng,
            elapsed: 0.0,
            next_plant: 0,
            acc: GoalBuffer::with_len(0),
        }
    }

    /// Plants a new seed and returns the id of the plant it starts.
    ///
    /// The seed's local `+Z` axis is the direction the first stem particle
    /// grows in.
    pub fn create_seed_particle(
        &mut self,
        position: Vec3,
        orientation: Quat,
        material: Box<dyn SurfaceMaterial>,
    ) -> PlantId {
        let id = PlantId(self.next_plant);
        self.next_plant += 1;

        let seed = Particle::seed(position, orientation, material, &self.params);
        self.plants.push(PlantGroup::new(id, seed));
        log::info!("{id}: seeded at {position}");
        id
    }

    /// Advances every live plant by `dt` seconds.
    ///
    /// Each plant runs the passes of [`crate::phases`] in order, is then
    /// validated, and finally reported to `observer` when rendering is
    /// enabled. A plant whose state became non-finite is halted instead of
    /// reported and stays halted; the other plants are unaffected.
    ///
    /// An invalid configuration skips the whole tick and is returned in
    /// [`TickReport::config_error`]. A non-positive `dt` is a no-op.
    pub fn tick(
        &mut self,
        dt: f32,
        surface: &impl SurfaceQuery,
        light: &impl LightSource,
        observer: &mut impl GroupObserver,
    ) -> TickReport {
        let mut report = TickReport::default();

        if let Err(err) = self.config.validate().and_then(|()| self.params.validate()) {
            log::error!("skipping tick: {err}");
            report.config_error = Some(err);
            return report;
        }
        if dt.is_nan() || dt <= 0.0 {
            log::warn!("ignoring tick with dt = {dt}");
            return report;
        }

        self.elapsed += dt;
        let now = self.elapsed;
        let cfg = &self.config;
        let params = &self.params;

        for plant in self.plants.iter_mut().filter(|p| !p.halted) {
            let before = plant.len();

            self_growth_phase(plant, dt, cfg, params, surface);
            orientation_phase(plant, dt, params, light, surface);
            branching_phase(plant, dt, now, cfg, params, &mut self.rng);
            apical_phase(plant, params, &mut self.rng);
            if cfg.shape_matching {
                relaxation_phase(plant, dt, params, &mut self.acc);
            }
            sync_phase(plant);

            report.spawned += plant.len() - before;

            if let Err(err) = plant.validate() {
                log::error!("halting {}: {err}", plant.id);
                plant.halted = true;
                report.halted.push(plant.id);
                observer.on_plant_halted(plant.id);
                continue;
            }
            if cfg.rendering {
                observer.on_group_updated(plant.id, &plant.particles);
            }
        }

        log::trace!(
            "t = {now:.3}: {} particles, {} spawned",
            self.particle_count(),
            report.spawned
        );
        report
    }

    /// ### Errors
    /// [`SimError::UnknownPlant`] if no plant has this id.
    pub fn plant(&self, id: PlantId) -> Result<&PlantGroup> {
        self.plants
            .iter()
            .find(|p| p.id == id)
            .ok_or(SimError::UnknownPlant(id))
    }

    pub fn plant_mut(&mut self, id: PlantId) -> Result<&mut PlantGroup> {
        self.plants
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(SimError::UnknownPlant(id))
    }

    pub fn plants(&self) -> &[PlantGroup] {
        &self.plants
    }

    /// Discards a plant and all of its particles.
    pub fn remove_plant(&mut self, id: PlantId) -> Result<PlantGroup> {
        let index = self
            .plants
            .iter()
            .position(|p| p.id == id)
            .ok_or(SimError::UnknownPlant(id))?;
        log::info!("{id}: removed");
        Ok(self.plants.remove(index))
    }

    /// Removes every plant and restarts the clock. Plant ids keep counting.
    pub fn clear(&mut self) {
        self.plants.clear();
        self.elapsed = 0.0;
    }

    pub fn particle_count(&self) -> usize {
        self.plants.iter().map(PlantGroup::len).sum()
    }

    /// Simulated seconds since creation or the last [`Simulation::clear`].
    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::light::{PointLight, StemMaterial};
    use crate::particle::Particle;
    use crate::surface::TriangleSurface;

    const DT: f32 = 1.0 / 60.0;

    #[derive(Default)]
    struct Recorder {
        updates: Vec<(PlantId, usize)>,
        halted: Vec<PlantId>,
    }

    impl GroupObserver for Recorder {
        fn on_group_updated(&mut self, plant: PlantId, particles: &[Particle]) {
            self.updates.push((plant, particles.len()));
        }

        fn on_plant_halted(&mut self, plant: PlantId) {
            self.halted.push(plant);
        }
    }

    fn floor() -> TriangleSurface {
        TriangleSurface::plane(
            Vec3::new(-2.0, 0.0, -2.0),
            Vec3::new(0.0, 0.0, 4.0),
            Vec3::new(4.0, 0.0, 0.0),
            8,
            8,
        )
        .unwrap()
    }

    fn up() -> Quat {
        Quat::from_rotation_arc(Vec3::Z, Vec3::Y)
    }

    fn plant_at(sim: &mut Simulation, x: f32) -> PlantId {
        sim.create_seed_particle(Vec3::new(x, 0.0, 0.0), up(), Box::new(StemMaterial::default()))
    }

    #[test]
    fn plant_ids_are_sequential_and_printable() {
        let mut sim = Simulation::new(1);
        let a = plant_at(&mut sim, 0.0);
        let b = plant_at(&mut sim, 1.0);

        assert_eq!(a.to_string(), "plant-0");
        assert_eq!(b.to_string(), "plant-1");
        assert_eq!(sim.plants().len(), 2);
        assert_eq!(sim.particle_count(), 2);
    }

    #[test]
    fn plant_grows_a_consistent_hierarchy() {
        let mut sim = Simulation::new(7);
        let id = plant_at(&mut sim, 0.0);
        let surface = floor();
        let light = PointLight::new(Vec3::new(0.5, 2.0, 0.0));

        let mut spawned = 0;
        for _ in 0..900 {
            let report = sim.tick(DT, &surface, &light, &mut ());
            assert!(report.halted.is_empty());
            spawned += report.spawned;
        }

        let plant = sim.plant(id).unwrap();
        assert!(plant.len() >= 4, "only {} particles", plant.len());
        assert_eq!(spawned, plant.len() - 1);
        assert!(plant.validate().is_ok());

        let caps = sim.params.max_dimensions();
        for (i, p) in plant.particles.iter().enumerate() {
            assert!((p.orientation.length() - 1.0).abs() < 1e-4);
            assert!(p.dimensions.cmple(caps).all());
            if let Some(parent) = p.parent {
                assert_eq!(p.depth, plant.particles[parent].depth + 1);
                assert!(plant.particles[parent].children.contains(&i));
            } else {
                assert!(p.is_seed);
            }
            if let Some(apical) = p.apical_child {
                assert!(p.children.contains(&apical));
                assert_eq!(p.children.iter().filter(|&&c| c == apical).count(), 1);
            }
        }
        assert_eq!(plant.seed().position, Vec3::ZERO);
    }

    #[test]
    fn same_seed_gives_same_plants() {
        let surface = floor();
        let light = PointLight::new(Vec3::new(1.0, 1.5, 0.5));
        let run = || {
            let mut sim = Simulation::new(42);
            sim.config.lateral_branch_probability = 2.0;
            plant_at(&mut sim, 0.0);
            for _ in 0..600 {
                sim.tick(DT, &surface, &light, &mut ());
            }
            sim.plants()[0]
                .particles
                .iter()
                .map(|p| p.position)
                .collect::<Vec<_>>()
        };

        assert_eq!(run(), run());
    }

    #[test]
    fn observer_sees_each_plant_once_per_tick() {
        let mut sim = Simulation::new(2);
        let a = plant_at(&mut sim, -0.5);
        let b = plant_at(&mut sim, 0.5);
        let light = PointLight::new(Vec3::Y * 2.0);
        let mut recorder = Recorder::default();

        for _ in 0..3 {
            sim.tick(DT, &floor(), &light, &mut recorder);
        }

        let ids: Vec<PlantId> = recorder.updates.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![a, b, a, b, a, b]);
        // The first stem particle appears during the first tick.
        assert!(recorder.updates.iter().all(|&(_, n)| n == 2));
    }

    #[test]
    fn disabled_rendering_sends_no_updates() {
        let mut sim = Simulation::new(3);
        sim.config.rendering = false;
        plant_at(&mut sim, 0.0);
        let mut recorder = Recorder::default();

        for _ in 0..5 {
            sim.tick(DT, &floor(), &PointLight::new(Vec3::Y), &mut recorder);
        }

        assert!(recorder.updates.is_empty());
        assert_eq!(sim.particle_count(), 2);
    }

    #[test]
    fn non_finite_plant_is_halted_alone() {
        let mut sim = Simulation::new(4);
        let broken = plant_at(&mut sim, -0.5);
        let healthy = plant_at(&mut sim, 0.5);
        let light = PointLight::new(Vec3::Y * 2.0);
        let mut recorder = Recorder::default();
        sim.tick(DT, &floor(), &light, &mut recorder);

        sim.plant_mut(broken).unwrap().particles[1].velocity = Vec3::splat(f32::NAN);
        let report = sim.tick(DT, &floor(), &light, &mut recorder);

        assert_eq!(report.halted, vec![broken]);
        assert_eq!(recorder.halted, vec![broken]);
        assert!(sim.plant(broken).unwrap().halted);
        assert!(!sim.plant(healthy).unwrap().halted);

        recorder.updates.clear();
        let report = sim.tick(DT, &floor(), &light, &mut recorder);
        assert!(report.halted.is_empty());
        assert_eq!(recorder.updates.len(), 1);
        assert_eq!(recorder.updates[0].0, healthy);
    }

    #[test]
    fn invalid_config_skips_the_tick() {
        let mut sim = Simulation::new(5);
        plant_at(&mut sim, 0.0);
        sim.config.growth_rate = f32::NAN;

        let report = sim.tick(DT, &floor(), &PointLight::new(Vec3::Y), &mut ());

        assert!(matches!(report.config_error, Some(SimError::InvalidConfig(_))));
        assert_eq!(sim.particle_count(), 1);
        assert_eq!(sim.elapsed(), 0.0);

        sim.config.growth_rate = 1.0;
        let report = sim.tick(DT, &floor(), &PointLight::new(Vec3::Y), &mut ());
        assert_eq!(report.config_error, None);
        assert_eq!(report.spawned, 1);
    }

    #[test]
    fn non_positive_dt_is_ignored() {
        let mut sim = Simulation::new(6);
        plant_at(&mut sim, 0.0);

        let report = sim.tick(0.0, &floor(), &PointLight::new(Vec3::Y), &mut ());

        assert_eq!(report, TickReport::default());
        assert_eq!(sim.particle_count(), 1);
    }

    #[test]
    fn turning_tips_carry_angular_velocity() {
        let mut sim = Simulation::new(11);
        let id = plant_at(&mut sim, 0.0);
        let surface = floor();
        let light = PointLight::new(Vec3::new(2.0, 0.5, 0.0));
        let mut fastest = 0.0f32;

        for _ in 0..600 {
            let plant = sim.plant(id).unwrap();
            let before: Vec<Quat> = plant.particles.iter().map(|p| p.orientation).collect();
            sim.tick(DT, &surface, &light, &mut ());

            let plant = sim.plant(id).unwrap();
            assert_eq!(plant.seed().angular_velocity, Vec3::ZERO);
            for (p, q) in plant.particles.iter().zip(&before) {
                let delta = p.orientation * q.inverse();
                let turned = 2.0 * delta.xyz().length().atan2(delta.w.abs());
                let integrated = p.angular_velocity.length() * DT;
                assert!((integrated - turned).abs() < 1e-3, "{integrated} vs {turned}");
                fastest = fastest.max(p.angular_velocity.length());
            }
        }

        assert!(fastest > 0.1, "fastest angular velocity {fastest}");
    }

    #[test]
    fn disabled_branching_grows_a_single_stem() {
        let mut sim = Simulation::new(8);
        sim.config.lateral_branching = false;
        sim.config.lateral_branch_probability = 10.0;
        let id = plant_at(&mut sim, 0.0);
        let light = PointLight::new(Vec3::Y * 2.0);

        for _ in 0..900 {
            sim.tick(DT, &floor(), &light, &mut ());
        }

        let plant = sim.plant(id).unwrap();
        assert!(plant.particles.iter().all(|p| !p.is_lateral_branch));
        assert!(plant.particles.iter().all(|p| p.children.len() <= 1));
    }

    #[test]
    fn removed_plants_are_unknown() {
        let mut sim = Simulation::new(9);
        let a = plant_at(&mut sim, 0.0);
        let b = plant_at(&mut sim, 1.0);

        let removed = sim.remove_plant(a).unwrap();
        assert_eq!(removed.id, a);
        assert_eq!(sim.plant(a).unwrap_err(), SimError::UnknownPlant(a));
        assert!(sim.plant(b).is_ok());
        assert!(matches!(sim.remove_plant(a), Err(SimError::UnknownPlant(_))));

        let c = plant_at(&mut sim, 2.0);
        assert_ne!(c, a);
    }

    #[test]
    fn clear_drops_plants_and_time() {
        let mut sim = Simulation::new(10);
        plant_at(&mut sim, 0.0);
        sim.tick(DT, &floor(), &PointLight::new(Vec3::Y), &mut ());

        sim.clear();

        assert!(sim.plants().is_empty());
        assert_eq!(sim.elapsed(), 0.0);
    }
}

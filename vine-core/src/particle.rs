//! Oriented growth particle.
//!
//! A particle is an ellipsoid segment of stem with a position, an
//! orientation (its local `+Z` is the growth direction) and dimensions that
//! grow over time. Particles that only need their own state (growth,
//! anchoring, penetration handling, orientation rules) are updated here;
//! operations that touch parents or children live on
//! [`crate::group::PlantGroup`].

use crate::config::ParticleParams;
use crate::light::{LightSource, SurfaceMaterial};
use crate::math::{project_on_plane, random_unit_vector, rotate, smooth_lerp};
use crate::surface::SurfaceQuery;
use crate::types::ParticleId;
use glam::{Mat3, Mat4, Quat, Vec3};
use rand::Rng;
use std::f32::consts::PI;

/// Normals closer than ~45° are blended, others replace the smoothed normal.
const NORMAL_AGREEMENT: f32 = 0.7;
const NORMAL_SMOOTHING: f32 = 0.3;
/// Blend of the preferred direction towards a freshly corrected direction.
const CORRECTION_BLEND: f32 = 0.5;
/// Growth steps that land within this fraction of a step of the cap snap to it.
const GROWTH_SNAP: f32 = 0.01;
/// Squared length below which a cross product has no usable axis.
const AXIS_EPS: f32 = 1e-8;

/// Where a particle is in its growth lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GrowthStage {
    Growing,
    FullyGrown,
    HasApicalChild,
}

/// Fixed per-stem drift, chosen once when a non-seed particle is created.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GrowthBias {
    pub axis: Vec3,
    pub angle: f32,
}

impl GrowthBias {
    pub fn random(max_angle: f32, rng: &mut impl Rng) -> Self {
        Self {
            axis: random_unit_vector(rng),
            angle: rng.random_range(-max_angle..=max_angle),
        }
    }

    pub fn rotation(&self) -> Quat {
        Quat::from_axis_angle(self.axis, self.angle)
    }
}

#[derive(Clone, Debug)]
pub struct Particle {
    // Hierarchy
    pub parent: Option<ParticleId>,
    pub children: Vec<ParticleId>,
    pub apical_child: Option<ParticleId>,
    pub depth: u32,
    pub is_seed: bool,
    pub is_lateral_branch: bool,

    // Kinematics
    pub position: Vec3,
    pub previous_position: Option<Vec3>,
    pub rest_position: Vec3,
    pub predicted_position: Vec3,
    pub target_position: Vec3,
    pub goal_position: Vec3,
    pub orientation: Quat,
    pub previous_orientation: Quat,
    pub rest_orientation: Quat,
    pub predicted_orientation: Quat,
    pub rotation: Mat3,
    pub rest_rotation: Mat3,
    pub velocity: Vec3,
    pub angular_velocity: Vec3,

    // Surface anchoring
    pub anchor: Option<Vec3>,
    pub normal: Option<Vec3>,
    pub smoothed_normal: Option<Vec3>,
    pub last_valid_normal: Option<Vec3>,
    /// Surface normal at the look-ahead point of the last penetration check.
    pub penetration_normal: Option<Vec3>,
    pub is_penetrating: bool,

    // Growth
    pub dimensions: Vec3,
    pub max_dimensions: Vec3,
    pub density: f32,
    pub mass: f32,
    pub weight: f32,
    pub moment: Mat3,
    pub growth_bias: Option<GrowthBias>,
    pub preferred_direction: Vec3,

    // Branching
    pub branch_count: u32,
    pub last_branch_time: Option<f32>,

    // Shape matching, for the group centered on this particle
    pub center_of_mass: Vec3,
    pub rest_center_of_mass: Vec3,
    pub optimal_rotation: Mat3,

    pub world_transform: Mat4,
    pub material: Box<dyn SurfaceMaterial>,
}

impl Particle {
    fn new(
        position: Vec3,
        orientation: Quat,
        dimensions: Vec3,
        depth: u32,
        material: Box<dyn SurfaceMaterial>,
        params: &ParticleParams,
    ) -> Self {
        let orientation = orientation.normalize();
        let rotation = Mat3::from_quat(orientation);
        let direction = orientation * Vec3::Z;

        let mut particle = Self {
            parent: None,
            children: Vec::with_capacity(2),
            apical_child: None,
            depth,
            is_seed: false,
            is_lateral_branch: false,

            position,
            previous_position: None,
            rest_position: position,
            predicted_position: position,
            target_position: position,
            goal_position: position,
            orientation,
            previous_orientation: orientation,
            rest_orientation: orientation,
            predicted_orientation: orientation,
            rotation,
            rest_rotation: rotation,
            velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,

            anchor: None,
            normal: None,
            smoothed_normal: None,
            last_valid_normal: None,
            penetration_normal: None,
            is_penetrating: false,

            dimensions,
            max_dimensions: params.max_dimensions(),
            density: params.density,
            mass: 0.0,
            weight: 0.0,
            moment: Mat3::ZERO,
            growth_bias: None,
            preferred_direction: direction,

            branch_count: 0,
            last_branch_time: None,

            center_of_mass: position,
            rest_center_of_mass: position,
            optimal_rotation: Mat3::IDENTITY,

            world_transform: Mat4::IDENTITY,
            material,
        };
        particle.refresh_mass(params);
        particle.sync_transform();
        particle
    }

    /// Creates the root particle of a new plant.
    ///
    /// Seeds start at full size, so they immediately qualify for apical
    /// growth (spawning the first stem particle) while never growing or
    /// rotating themselves.
    pub fn seed(
        position: Vec3,
        orientation: Quat,
        material: Box<dyn SurfaceMaterial>,
        params: &ParticleParams,
    ) -> Self {
        let mut seed = Self::new(
            position,
            orientation,
            params.max_dimensions(),
            0,
            material,
            params,
        );
        seed.is_seed = true;
        seed
    }

    /// Creates a growing (non-seed) particle with a random growth bias.
    pub fn sprout(
        position: Vec3,
        orientation: Quat,
        depth: u32,
        material: Box<dyn SurfaceMaterial>,
        params: &ParticleParams,
        rng: &mut impl Rng,
    ) -> Self {
        let mut particle = Self::new(
            position,
            orientation,
            params.initial_dimensions,
            depth,
            material,
            params,
        );
        particle.growth_bias = Some(GrowthBias::random(params.growth_bias_max_angle, rng));
        particle
    }

    /// Unit growth direction (local `+Z` in world space).
    pub fn direction(&self) -> Vec3 {
        (self.orientation * Vec3::Z).normalize_or(Vec3::Z)
    }

    /// Point half a height ahead of the center along the growth direction.
    pub fn tip(&self) -> Vec3 {
        self.position + self.direction() * (self.dimensions.z * 0.5)
    }

    pub fn height(&self) -> f32 {
        self.dimensions.z
    }

    pub fn has_apical_child(&self) -> bool {
        self.apical_child.is_some()
    }

    pub fn is_fully_grown(&self) -> bool {
        self.dimensions.cmpge(self.max_dimensions).all()
    }

    pub fn is_height_capped(&self) -> bool {
        self.dimensions.z >= self.max_dimensions.z
    }

    pub fn stage(&self) -> GrowthStage {
        if self.has_apical_child() {
            GrowthStage::HasApicalChild
        } else if self.is_fully_grown() {
            GrowthStage::FullyGrown
        } else {
            GrowthStage::Growing
        }
    }

    /// Recomputes mass, weight and the ellipsoid moment matrix from the
    /// current dimensions.
    pub fn refresh_mass(&mut self, params: &ParticleParams) {
        let half = self.dimensions * 0.5;
        let volume = 4.0 / 3.0 * PI * half.x * half.y * half.z;
        self.mass = self.density * volume;
        self.weight = self.mass * (-params.depth_weight_decay * self.depth as f32).exp();
        self.moment = Mat3::from_diagonal(half * half * (self.mass / 5.0));
    }

    /// Grows the particle for `dt` seconds.
    ///
    /// Widths (`x`, `y`) and height (`z`) grow at their own rates scaled by
    /// `growth_rate`, clamped at the particle's caps. Mass and the surface
    /// anchor are refreshed afterwards.
    ///
    /// ### Returns
    /// `false` without touching anything for seeds, fully grown particles
    /// and non-positive `dt`.
    pub fn self_growth(
        &mut self,
        dt: f32,
        growth_rate: f32,
        params: &ParticleParams,
        surface: &impl SurfaceQuery,
    ) -> bool {
        if self.is_seed || self.is_fully_grown() || dt.is_nan() || dt <= 0.0 {
            return false;
        }

        let width_step = params.width_growth_rate * growth_rate * dt;
        let height_step = params.height_growth_rate * growth_rate * dt;
        let caps = self.max_dimensions;
        self.dimensions = Vec3::new(
            grow_axis(self.dimensions.x, width_step, caps.x),
            grow_axis(self.dimensions.y, width_step, caps.y),
            grow_axis(self.dimensions.z, height_step, caps.z),
        );

        self.refresh_mass(params);
        self.update_anchor(surface);
        true
    }

    /// Re-anchors the particle to the closest point of the surface.
    ///
    /// The smoothed normal is blended towards the new normal when the two
    /// agree to within ~45°, and reset to it otherwise. Degenerate
    /// triangles update the anchor but leave the normals untouched.
    pub fn update_anchor(&mut self, surface: &impl SurfaceQuery) {
        let tri = surface.closest_triangle(self.position);
        self.anchor = Some(tri.closest_point(self.position));

        let Some(normal) = tri.normal() else {
            log::debug!("degenerate closest triangle near {}", self.position);
            return;
        };

        self.normal = Some(normal);
        self.smoothed_normal = Some(match self.last_valid_normal {
            Some(last) if last.dot(normal) > NORMAL_AGREEMENT => {
                let previous = self.smoothed_normal.unwrap_or(last);
                smooth_lerp(previous, normal, NORMAL_SMOOTHING).normalize_or(normal)
            }
            _ => normal,
        });
        self.last_valid_normal = Some(normal);
    }

    /// Checks whether the particle is about to grow into the surface.
    ///
    /// Looks `look_ahead_distance` beyond the tip. The particle is
    /// penetrating when that point is closer to the surface than half the
    /// particle's height and the growth direction points against the
    /// surface normal there. Seeds never penetrate.
    pub fn check_penetration(
        &mut self,
        params: &ParticleParams,
        surface: &impl SurfaceQuery,
    ) -> bool {
        self.is_penetrating = false;
        if self.is_seed {
            return false;
        }

        let dir = self.direction();
        let look_ahead = self.tip() + dir * params.look_ahead_distance;
        let tri = surface.closest_triangle(look_ahead);
        let Some(normal) = tri.normal() else {
            return false;
        };
        self.penetration_normal = Some(normal);

        let distance = look_ahead.distance(tri.closest_point(look_ahead));
        self.is_penetrating = distance < self.dimensions.z * 0.5 && dir.dot(normal) < 0.0;
        self.is_penetrating
    }

    /// Rotates a penetrating particle away from the surface.
    ///
    /// The turn is around `dir × normal` (falling back to world-up, then
    /// world-x when the growth direction is parallel to the normal) by
    /// `angle(dir, normal) * correction_strength * dt`, capped at
    /// `max_rotation_per_frame`.
    ///
    /// ### Returns
    /// `true` if a correction was applied.
    pub fn correct_penetration(&mut self, dt: f32, params: &ParticleParams) -> bool {
        if !self.is_penetrating || self.is_seed {
            return false;
        }
        let Some(normal) = self.smoothed_normal.or(self.penetration_normal) else {
            return false;
        };

        let dir = self.direction();
        let Some(axis) = [normal, Vec3::Y, Vec3::X]
            .into_iter()
            .find_map(|towards| rotation_axis(dir, towards))
        else {
            return false;
        };

        let angle = (dir.angle_between(normal) * params.correction_strength * dt)
            .clamp(0.0, params.max_rotation_per_frame);
        self.orientation = rotate(self.orientation, axis, angle);

        let corrected = self.direction();
        self.preferred_direction =
            smooth_lerp(self.preferred_direction, corrected, CORRECTION_BLEND).normalize_or(corrected);
        log::trace!("corrected penetration by {angle:.4} rad at {}", self.position);
        true
    }

    /// Applies the per-frame orientation rules.
    ///
    /// In order: penetration check and correction (halving `dt` for the
    /// remaining rules if it fired), growth-bias drift of the preferred
    /// direction, surface adaptation, phototropism and a final penetration
    /// check. Every rotation is capped at `max_rotation_per_frame`.
    ///
    /// Seeds and particles that already extended an apical child keep their
    /// orientation. Rule-driven rotation is treated as plastic growth: the
    /// rest orientation follows it.
    ///
    /// The orientation before the rules run is kept in
    /// `previous_orientation`, so the turn shows up as angular velocity when
    /// the particle is next integrated.
    pub fn plant_orientation(
        &mut self,
        dt: f32,
        params: &ParticleParams,
        light: &impl LightSource,
        surface: &impl SurfaceQuery,
    ) {
        self.previous_orientation = self.orientation;
        if self.is_seed || self.has_apical_child() {
            return;
        }

        let mut dt = dt;
        if self.check_penetration(params, surface) && self.correct_penetration(dt, params) {
            dt *= 0.5;
        }

        self.update_preferred_direction(params);
        self.adapt_to_surface(dt, params);
        self.apply_phototropism(dt, params, light);

        if self.check_penetration(params, surface) {
            self.correct_penetration(dt, params);
        }

        self.rest_orientation = self.orientation;
        self.rotation = Mat3::from_quat(self.orientation);
        self.rest_rotation = self.rotation;
    }

    /// Drifts the preferred direction towards the growth-bias rotation of
    /// the current direction.
    pub fn update_preferred_direction(&mut self, params: &ParticleParams) {
        let Some(bias) = self.growth_bias else {
            return;
        };
        let dir = self.direction();
        let biased = bias.rotation() * dir;
        self.preferred_direction =
            smooth_lerp(self.preferred_direction, biased, params.preferred_direction_smoothing)
                .normalize_or(dir);
    }

    /// Direction the surface-adaptation rule steers towards.
    ///
    /// Half towards the anchor and half along the preferred direction
    /// projected onto the surface tangent plane. Falls back to whichever of
    /// the two is available, then to world-up.
    pub fn target_direction(&self) -> Vec3 {
        let to_anchor = self
            .anchor
            .map(|anchor| anchor - self.position)
            .filter(|v| v.length_squared() > AXIS_EPS)
            .map(Vec3::normalize);
        let tangent = self
            .smoothed_normal
            .map(|n| project_on_plane(self.preferred_direction, n))
            .filter(|v| v.length_squared() > AXIS_EPS)
            .map(Vec3::normalize);

        match (to_anchor, tangent) {
            (Some(a), Some(t)) => (a * 0.5 + t * 0.5).normalize_or(t),
            (Some(a), None) => a,
            (None, Some(t)) => t,
            (None, None) => Vec3::Y,
        }
    }

    fn adapt_to_surface(&mut self, dt: f32, params: &ParticleParams) {
        let dir = self.direction();
        let target = self.target_direction();
        let Some(axis) = rotation_axis(dir, target) else {
            return;
        };

        let max = params.max_rotation_per_frame;
        let angle = ((1.0 - dir.dot(target)) * params.surface_adaptation_strength * dt).clamp(-max, max);
        self.orientation = rotate(self.orientation, axis, angle);
    }

    /// Turns the particle by `dot(dir, light_dir)` scaled with an
    /// inverse-square falloff of the light distance (floored at
    /// `min_light_distance`).
    pub fn apply_phototropism(&mut self, dt: f32, params: &ParticleParams, light: &impl LightSource) {
        let to_light = light.position() - self.position;
        let Some(light_dir) = to_light.try_normalize() else {
            return;
        };
        let distance = to_light.length().max(params.min_light_distance);
        let falloff = 1.0 / (distance * distance);

        let dir = self.direction();
        let Some(axis) = rotation_axis(dir, light_dir) else {
            return;
        };

        let max = params.max_rotation_per_frame;
        let angle = (dir.dot(light_dir) * params.phototropism_strength * dt * falloff).clamp(-max, max);
        self.orientation = rotate(self.orientation, axis, angle);
    }

    /// Standard explicit Euler prediction `x + v·dt + ½·a·dt²`.
    pub fn euler_step(&self, dt: f32, acceleration: Vec3) -> Vec3 {
        self.position + self.velocity * dt + acceleration * (0.5 * dt * dt)
    }

    /// Refreshes the rotation matrix and world transform from the current
    /// position, orientation and dimensions.
    pub fn sync_transform(&mut self) {
        self.rotation = Mat3::from_quat(self.orientation);
        self.world_transform =
            Mat4::from_scale_rotation_translation(self.dimensions, self.orientation, self.position);
    }

    /// Name of the first state quantity that is NaN or infinite, if any.
    pub fn first_non_finite(&self) -> Option<&'static str> {
        if !self.position.is_finite() {
            Some("position")
        } else if !self.orientation.is_finite() {
            Some("orientation")
        } else if !self.dimensions.is_finite() {
            Some("dimensions")
        } else if !self.velocity.is_finite() {
            Some("velocity")
        } else if !self.angular_velocity.is_finite() {
            Some("angular velocity")
        } else {
            None
        }
    }

    pub fn is_finite(&self) -> bool {
        self.first_non_finite().is_none()
    }
}

fn grow_axis(current: f32, step: f32, cap: f32) -> f32 {
    if current >= cap {
        return cap;
    }
    let next = current + step;
    if next >= cap - step * GROWTH_SNAP {
        cap
    } else {
        next
    }
}

/// Unit axis rotating `from` towards `towards`, or `None` when they are
/// (anti)parallel.
pub(crate) fn rotation_axis(from: Vec3, towards: Vec3) -> Option<Vec3> {
    let axis = from.cross(towards);
    (axis.length_squared() > AXIS_EPS).then(|| axis.normalize())
}

use crate::error::{Result, SimError};
use glam::Vec3;

/// Process-wide growth options, mutable between ticks.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GrowthConfig {
    /// Global multiplier on all dimension growth.
    pub growth_rate: f32,
    pub lateral_branching: bool,
    /// Chance per unit time that a plant attempts a lateral branch.
    pub lateral_branch_probability: f32,
    /// Minimum time between two branches of the same particle.
    pub lateral_branch_cooldown: f32,
    /// Whether observers are notified after each tick.
    pub rendering: bool,
    pub shape_matching: bool,
}

impl Default for GrowthConfig {
    fn default() -> Self {
        Self {
            growth_rate: 1.0,
            lateral_branching: true,
            lateral_branch_probability: 0.5,
            lateral_branch_cooldown: 2.0,
            rendering: true,
            shape_matching: true,
        }
    }
}

impl GrowthConfig {
    pub fn validate(&self) -> Result<()> {
        non_negative("growth_rate", self.growth_rate)?;
        non_negative("lateral_branch_probability", self.lateral_branch_probability)?;
        non_negative("lateral_branch_cooldown", self.lateral_branch_cooldown)?;
        Ok(())
    }
}

/// Tuning constants of the particle growth rules and the solver.
///
/// Dimensions are ellipsoid extents: `x`/`y` are widths, `z` is the height
/// along the growth direction. Angles are radians, rates are per second.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParticleParams {
    pub max_width: f32,
    pub max_height: f32,
    pub width_growth_rate: f32,
    pub height_growth_rate: f32,
    pub initial_dimensions: Vec3,
    pub density: f32,
    /// Weight is `mass * exp(-depth_weight_decay * depth)`.
    pub depth_weight_decay: f32,

    pub look_ahead_distance: f32,
    pub correction_strength: f32,
    pub max_rotation_per_frame: f32,
    pub surface_adaptation_strength: f32,
    pub phototropism_strength: f32,
    pub min_light_distance: f32,
    pub growth_bias_max_angle: f32,
    pub preferred_direction_smoothing: f32,

    pub min_branch_angle: f32,
    pub max_branch_angle: f32,
    pub branch_size_factor: f32,
    pub branch_darkening: f32,
    pub branch_selection_factor: f32,
    pub max_lateral_branches: u32,

    /// Fraction of the way predicted positions move towards their goal.
    pub stiffness: f32,
    pub velocity_damping: f32,
    pub gravity: Vec3,
}

impl Default for ParticleParams {
    fn default() -> Self {
        Self {
            max_width: 0.04,
            max_height: 0.2,
            width_growth_rate: 0.01,
            height_growth_rate: 0.05,
            initial_dimensions: Vec3::new(0.01, 0.01, 0.02),
            density: 1.0,
            depth_weight_decay: 0.05,

            look_ahead_distance: 0.05,
            correction_strength: 4.0,
            max_rotation_per_frame: 0.05,
            surface_adaptation_strength: 2.0,
            phototropism_strength: 1.5,
            min_light_distance: 0.5,
            growth_bias_max_angle: 0.15,
            preferred_direction_smoothing: 0.1,

            min_branch_angle: 30f32.to_radians(),
            max_branch_angle: 60f32.to_radians(),
            branch_size_factor: 0.7,
            branch_darkening: 0.85,
            branch_selection_factor: 1.0,
            max_lateral_branches: 3,

            stiffness: 0.2,
            velocity_damping: 0.9,
            gravity: Vec3::ZERO,
        }
    }
}

impl ParticleParams {
    /// Full-grown dimensions `(max_width, max_width, max_height)`.
    pub fn max_dimensions(&self) -> Vec3 {
        Vec3::new(self.max_width, self.max_width, self.max_height)
    }

    pub fn validate(&self) -> Result<()> {
        positive("max_width", self.max_width)?;
        positive("max_height", self.max_height)?;
        positive("density", self.density)?;
        for (name, value) in [
            ("width_growth_rate", self.width_growth_rate),
            ("height_growth_rate", self.height_growth_rate),
            ("depth_weight_decay", self.depth_weight_decay),
            ("look_ahead_distance", self.look_ahead_distance),
            ("correction_strength", self.correction_strength),
            ("max_rotation_per_frame", self.max_rotation_per_frame),
            ("surface_adaptation_strength", self.surface_adaptation_strength),
            ("phototropism_strength", self.phototropism_strength),
            ("growth_bias_max_angle", self.growth_bias_max_angle),
            ("min_branch_angle", self.min_branch_angle),
            ("branch_size_factor", self.branch_size_factor),
            ("branch_selection_factor", self.branch_selection_factor),
        ] {
            non_negative(name, value)?;
        }
        positive("min_light_distance", self.min_light_distance)?;
        unit_interval("preferred_direction_smoothing", self.preferred_direction_smoothing)?;
        unit_interval("branch_darkening", self.branch_darkening)?;
        unit_interval("stiffness", self.stiffness)?;
        unit_interval("velocity_damping", self.velocity_damping)?;

        if self.max_branch_angle < self.min_branch_angle || !self.max_branch_angle.is_finite() {
            return Err(SimError::InvalidConfig(format!(
                "branch angle range [{}, {}] is empty",
                self.min_branch_angle, self.max_branch_angle
            )));
        }
        let dims = self.initial_dimensions;
        if !dims.is_finite()
            || dims.min_element() < 0.0
            || dims.x > self.max_width
            || dims.y > self.max_width
            || dims.z > self.max_height
        {
            return Err(SimError::InvalidConfig(format!(
                "initial_dimensions {dims} must lie within [0, {}]",
                self.max_dimensions()
            )));
        }
        if !self.gravity.is_finite() {
            return Err(SimError::InvalidConfig("gravity must be finite".into()));
        }
        Ok(())
    }
}

fn non_negative(name: &str, value: f32) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(SimError::InvalidConfig(format!("{name} must be >= 0, got {value}")))
    }
}

fn positive(name: &str, value: f32) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(SimError::InvalidConfig(format!("{name} must be > 0, got {value}")))
    }
}

fn unit_interval(name: &str, value: f32) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(SimError::InvalidConfig(format!("{name} must be in [0, 1], got {value}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(GrowthConfig::default().validate().is_ok());
        assert!(ParticleParams::default().validate().is_ok());
    }

    #[test]
    fn negative_growth_rate_is_rejected() {
        let cfg = GrowthConfig {
            growth_rate: -1.0,
            ..GrowthConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(SimError::InvalidConfig(_))));
    }

    #[test]
    fn inverted_branch_angles_are_rejected() {
        let params = ParticleParams {
            min_branch_angle: 1.0,
            max_branch_angle: 0.5,
            ..ParticleParams::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn oversized_initial_dimensions_are_rejected() {
        let params = ParticleParams {
            initial_dimensions: Vec3::new(0.01, 0.01, 1.0),
            ..ParticleParams::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn stiffness_outside_unit_interval_is_rejected() {
        let params = ParticleParams {
            stiffness: 1.5,
            ..ParticleParams::default()
        };
        assert!(params.validate().is_err());
    }
}

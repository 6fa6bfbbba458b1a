//! Narrow capabilities the growth rules need from the scene: where the light
//! is, and a material whose color can be tinted.

use glam::Vec3;
use std::fmt::Debug;

/// Anything with a world-space position that plants grow towards.
pub trait LightSource {
    fn position(&self) -> Vec3;
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointLight {
    pub position: Vec3,
}

impl PointLight {
    pub fn new(position: Vec3) -> Self {
        Self { position }
    }
}

impl LightSource for PointLight {
    fn position(&self) -> Vec3 {
        self.position
    }
}

/// Material attached to a particle. Only its color is visible to the core.
pub trait SurfaceMaterial: Debug {
    fn color(&self) -> Vec3;
    fn set_color(&mut self, color: Vec3);
    fn clone_box(&self) -> Box<dyn SurfaceMaterial>;
}

impl Clone for Box<dyn SurfaceMaterial> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Clones `material` and scales its color by `factor` (clamped to `[0, 1]`).
pub fn darkened(material: &dyn SurfaceMaterial, factor: f32) -> Box<dyn SurfaceMaterial> {
    let mut copy = material.clone_box();
    copy.set_color(material.color() * factor.clamp(0.0, 1.0));
    copy
}

/// Plain RGB material.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StemMaterial {
    pub color: Vec3,
}

impl StemMaterial {
    pub fn new(color: Vec3) -> Self {
        Self { color }
    }
}

impl Default for StemMaterial {
    fn default() -> Self {
        Self::new(Vec3::new(0.25, 0.55, 0.2))
    }
}

impl SurfaceMaterial for StemMaterial {
    fn color(&self) -> Vec3 {
        self.color
    }

    fn set_color(&mut self, color: Vec3) {
        self.color = color;
    }

    fn clone_box(&self) -> Box<dyn SurfaceMaterial> {
        Box::new(*self)
    }
}

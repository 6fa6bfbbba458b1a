use crate::particle::Particle;
use crate::types::PlantId;

/// Receives plant state after each tick, typically to rebuild render data.
pub trait GroupObserver {
    /// Called once per tick for every live plant, after all passes ran.
    fn on_group_updated(&mut self, plant: PlantId, particles: &[Particle]);

    /// Called once when a plant stops updating because its state went
    /// non-finite.
    fn on_plant_halted(&mut self, _plant: PlantId) {}
}

/// Discards all notifications.
impl GroupObserver for () {
    fn on_group_updated(&mut self, _plant: PlantId, _particles: &[Particle]) {}
}

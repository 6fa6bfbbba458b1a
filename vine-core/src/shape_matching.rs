//! Oriented-particle shape matching over overlapping local groups.
//!
//! Every particle owns one group: itself, its parent and its direct
//! children (see [`PlantGroup::group_members`]). One relaxation step runs:
//! 1. [`predict`]: snapshot the current position and predict the next one
//!    with an explicit Euler step.
//! 2. [`update_centers_of_mass`], [`update_optimal_rotation`] and
//!    [`update_target_position`] for every group.
//! 3. [`update_goal_positions`]: every group proposes a target for each of
//!    its members; the proposals are averaged per particle in a
//!    [`GoalBuffer`].
//! 4. [`apply_stiffness`]: only move part of the way towards the goal.
//! 5. [`integrate`]: derive velocities from the move and commit it.
//!
//! Seeds are pinned: they take part in the groups of their children but
//! never move themselves.

use crate::config::ParticleParams;
use crate::goal_buffer::GoalBuffer;
use crate::group::PlantGroup;
use crate::math::{outer, polar_decomposition};
use crate::types::ParticleId;
use glam::{Mat3, Vec3};

/// Rotation angles below this produce no angular velocity; the axis of a
/// near-identity quaternion is numerically meaningless.
const ANGULAR_DEAD_ZONE: f32 = 1e-6;

/// Snapshots the current state and predicts the next one.
///
/// Velocities are damped by `velocity_damping`, then
/// `predicted = x + v·dt + ½·g·dt²`. The predicted orientation starts from
/// the current one, which already includes this tick's rule-driven turn;
/// `previous_orientation` is left as snapshotted by
/// [`crate::particle::Particle::plant_orientation`].
pub fn predict(group: &mut PlantGroup, dt: f32, params: &ParticleParams) {
    for p in group.particles.iter_mut() {
        p.previous_position = Some(p.position);
        p.predicted_orientation = p.orientation;

        if p.is_seed {
            p.velocity = Vec3::ZERO;
            p.predicted_position = p.position;
            continue;
        }
        p.velocity *= params.velocity_damping;
        p.predicted_position = p.euler_step(dt, params.gravity);
    }
}

/// Mass-weighted center of the group owned by `id`, in the predicted and the
/// rest configuration.
///
/// A massless group falls back to the owner's own positions.
pub fn update_centers_of_mass(group: &mut PlantGroup, id: ParticleId) {
    let mut total = 0.0;
    let mut center = Vec3::ZERO;
    let mut rest_center = Vec3::ZERO;
    for m in group.group_members(id) {
        let p = &group.particles[m];
        total += p.mass;
        center += p.predicted_position * p.mass;
        rest_center += p.rest_position * p.mass;
    }

    let owner = &mut group.particles[id];
    if total > 0.0 {
        owner.center_of_mass = center / total;
        owner.rest_center_of_mass = rest_center / total;
    } else {
        owner.center_of_mass = owner.predicted_position;
        owner.rest_center_of_mass = owner.rest_position;
    }
}

/// Least-squares rotation taking the rest shape of the group owned by `id`
/// onto its predicted shape.
///
/// Builds `A = Σ (m·x⊗x_rest + R·M·R_restᵗ) − M_total·c⊗c_rest` and keeps
/// its rotational part. The sum is evaluated on offsets from the two
/// centers, which is the same matrix without the cancellation between two
/// large terms.
///
/// Expects [`update_centers_of_mass`] to have run for `id`.
pub fn update_optimal_rotation(group: &mut PlantGroup, id: ParticleId) {
    let owner = &group.particles[id];
    let center = owner.center_of_mass;
    let rest_center = owner.rest_center_of_mass;

    let mut a = Mat3::ZERO;
    for m in group.group_members(id) {
        let p = &group.particles[m];
        let offset = p.predicted_position - center;
        let rest_offset = p.rest_position - rest_center;
        let rotation = Mat3::from_quat(p.predicted_orientation);
        a += outer(offset, rest_offset) * p.mass;
        a += rotation * p.moment * p.rest_rotation.transpose();
    }

    group.particles[id].optimal_rotation = polar_decomposition(a);
}

/// Target of `id` inside its own group: `R·(x_rest − c_rest) + c`.
pub fn update_target_position(group: &mut PlantGroup, id: ParticleId) {
    let p = &mut group.particles[id];
    p.target_position =
        p.optimal_rotation * (p.rest_position - p.rest_center_of_mass) + p.center_of_mass;
}

/// Blends the targets every group proposes into one goal per particle.
///
/// Each group proposes `R·(x_rest − c_rest) + c` for all of its members,
/// weighted by the weight of the group's owner. Particles that receive no
/// weighted proposal keep their predicted position as goal; seeds keep
/// their current position.
///
/// ### Parameters
/// - `group` - Plant whose centers and optimal rotations are up to date.
/// - `acc` - Scratch buffer, resized and cleared here.
pub fn update_goal_positions(group: &mut PlantGroup, acc: &mut GoalBuffer) {
    acc.ensure_len(group.particles.len());

    for owner_id in 0..group.particles.len() {
        let owner = &group.particles[owner_id];
        let (rotation, center, rest_center, weight) = (
            owner.optimal_rotation,
            owner.center_of_mass,
            owner.rest_center_of_mass,
            owner.weight,
        );
        for m in group.group_members(owner_id) {
            let target = rotation * (group.particles[m].rest_position - rest_center) + center;
            acc.add(m, target, weight);
        }
    }

    for (id, p) in group.particles.iter_mut().enumerate() {
        p.goal_position = if p.is_seed {
            p.position
        } else {
            acc.goal(id).unwrap_or(p.predicted_position)
        };
    }
}

/// Moves each goal only `stiffness` of the way from the prediction:
/// `goal = predicted + s·(goal − predicted)`.
pub fn apply_stiffness(group: &mut PlantGroup, stiffness: f32) {
    for p in group.particles.iter_mut().filter(|p| !p.is_seed) {
        p.goal_position = p.predicted_position + (p.goal_position - p.predicted_position) * stiffness;
    }
}

/// Commits goals and predicted orientations, deriving velocities.
///
/// - `velocity = (goal − position) / dt`, then `position = goal`.
/// - Angular velocity comes from the relative rotation between the
///   predicted and the previous orientation, flipped to the shorter path;
///   angles inside a small dead zone give zero.
/// - `orientation = predicted_orientation`.
///
/// Seeds and non-positive `dt` are left untouched.
pub fn integrate(group: &mut PlantGroup, dt: f32) {
    if dt.is_nan() || dt <= 0.0 {
        return;
    }

    for p in group.particles.iter_mut().filter(|p| !p.is_seed) {
        p.velocity = (p.goal_position - p.position) / dt;
        p.position = p.goal_position;

        let mut delta = p.predicted_orientation * p.previous_orientation.inverse();
        if delta.w < 0.0 {
            delta = -delta;
        }
        let sin_half = delta.xyz().length();
        let angle = 2.0 * sin_half.atan2(delta.w);
        p.angular_velocity = if angle > ANGULAR_DEAD_ZONE {
            delta.xyz() / sin_half * (angle / dt)
        } else {
            Vec3::ZERO
        };

        p.orientation = p.predicted_orientation.normalize();
    }
}

/// Runs one full shape-matching step over the plant.
///
/// ### Parameters
/// - `group` - Plant to relax.
/// - `dt` - Time step in seconds.
/// - `params` - Damping, gravity and stiffness.
/// - `acc` - Scratch buffer for the goal blend.
pub fn relax(group: &mut PlantGroup, dt: f32, params: &ParticleParams, acc: &mut GoalBuffer) {
    predict(group, dt, params);
    for id in 0..group.particles.len() {
        update_centers_of_mass(group, id);
        update_optimal_rotation(group, id);
        update_target_position(group, id);
    }
    update_goal_positions(group, acc);
    apply_stiffness(group, params.stiffness);
    integrate(group, dt);
}

//! Rigid-body capability boundary
//!
//! The vehicle controller and the projectile subsystem never talk to a
//! physics engine directly; they speak [`RigidBodyWorld`]. The trait carries
//! exactly the operations the game core needs: body lifecycle, transform and
//! velocity access, impulses, friction, ray probes, contact draining, and
//! stepping. [`KinematicWorld`] is the reference implementation used by the
//! headless client and the tests; a real engine backend can replace it
//! without touching the control logic.

use glam::{Quat, Vec3};
use std::collections::HashMap;

pub const GRAVITY: f32 = -9.81;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BodyHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Dynamic,
    Fixed,
}

/// Everything needed to create a body and its collider in one call.
#[derive(Debug, Clone)]
pub struct BodyDesc {
    pub kind: BodyKind,
    pub translation: Vec3,
    pub rotation: Quat,
    pub half_extents: Vec3,
    pub mass: f32,
    pub linear_damping: f32,
    pub friction: f32,
    pub restitution: f32,
}

impl Default for BodyDesc {
    fn default() -> Self {
        Self {
            kind: BodyKind::Dynamic,
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            half_extents: Vec3::splat(0.5),
            mass: 1.0,
            linear_damping: 0.0,
            friction: 0.8,
            restitution: 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContactEvent {
    pub body: BodyHandle,
    pub other: BodyHandle,
}

/// Axis-aligned box used for projectile containment tests and ray probes.
#[derive(Debug, Clone, Copy)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn from_center(center: Vec3, half_extents: Vec3) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    /// Grows the box by a uniform factor around its center.
    pub fn expanded(&self, factor: f32) -> Self {
        let center = (self.min + self.max) * 0.5;
        let half = (self.max - self.min) * 0.5 * factor;
        Self::from_center(center, half)
    }

    pub fn contains(&self, point: Vec3) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
            && point.z >= self.min.z
            && point.z <= self.max.z
    }

    pub fn overlaps(&self, other: &Aabb) -> bool {
        !(self.max.x <= other.min.x
            || other.max.x <= self.min.x
            || self.max.y <= other.min.y
            || other.max.y <= self.min.y
            || self.max.z <= other.min.z
            || other.max.z <= self.min.z)
    }
}

/// Slab-method ray/box test. Returns the entry distance when the ray hits
/// within `max_len`.
pub fn ray_aabb_intersect(origin: Vec3, dir: Vec3, max_len: f32, aabb: &Aabb) -> Option<f32> {
    let inv = Vec3::new(1.0 / dir.x, 1.0 / dir.y, 1.0 / dir.z);

    let t1 = (aabb.min - origin) * inv;
    let t2 = (aabb.max - origin) * inv;

    let t_min = t1.min(t2);
    let t_max = t1.max(t2);

    let near = t_min.x.max(t_min.y).max(t_min.z);
    let far = t_max.x.min(t_max.y).min(t_max.z);

    if near <= far && far >= 0.0 && near <= max_len {
        Some(near.max(0.0))
    } else {
        None
    }
}

/// The capability the game core consumes. Getters return `None` for unknown
/// handles so a partially-initialized vehicle can no-op for the tick instead
/// of crashing the frame loop.
pub trait RigidBodyWorld {
    fn create_body(&mut self, desc: BodyDesc) -> BodyHandle;
    fn remove_body(&mut self, handle: BodyHandle);

    fn translation(&self, handle: BodyHandle) -> Option<Vec3>;
    fn set_translation(&mut self, handle: BodyHandle, translation: Vec3);
    fn rotation(&self, handle: BodyHandle) -> Option<Quat>;
    fn set_rotation(&mut self, handle: BodyHandle, rotation: Quat);

    fn linear_velocity(&self, handle: BodyHandle) -> Option<Vec3>;
    fn set_linear_velocity(&mut self, handle: BodyHandle, velocity: Vec3);
    fn angular_velocity(&self, handle: BodyHandle) -> Option<Vec3>;
    fn set_angular_velocity(&mut self, handle: BodyHandle, velocity: Vec3);

    fn apply_impulse(&mut self, handle: BodyHandle, impulse: Vec3);
    fn apply_torque_impulse(&mut self, handle: BodyHandle, torque: Vec3);
    fn set_friction(&mut self, handle: BodyHandle, friction: f32);

    /// Nearest hit distance along `dir` from `origin`, ignoring `exclude`.
    fn cast_ray(&self, origin: Vec3, dir: Vec3, max_len: f32, exclude: BodyHandle) -> Option<f32>;

    /// Removes and returns the contact events queued for `handle` since the
    /// last drain.
    fn drain_contacts(&mut self, handle: BodyHandle) -> Vec<ContactEvent>;

    fn step(&mut self, dt: f32);
}

#[derive(Debug)]
struct Body {
    kind: BodyKind,
    translation: Vec3,
    rotation: Quat,
    linear_velocity: Vec3,
    angular_velocity: Vec3,
    inv_mass: f32,
    linear_damping: f32,
    friction: f32,
    half_extents: Vec3,
    contacts: Vec<ContactEvent>,
}

impl Body {
    fn aabb(&self) -> Aabb {
        Aabb::from_center(self.translation, self.half_extents)
    }
}

/// Reference integrator: gravity, damping, impulses via inverse mass, a
/// ground plane at y = 0, and AABB obstacles that produce contact events and
/// a shallow-axis pushback.
pub struct KinematicWorld {
    bodies: HashMap<BodyHandle, Body>,
    next_handle: u32,
}

impl KinematicWorld {
    pub fn new() -> Self {
        Self {
            bodies: HashMap::new(),
            next_handle: 1,
        }
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn friction_of(&self, handle: BodyHandle) -> Option<f32> {
        self.bodies.get(&handle).map(|b| b.friction)
    }

    fn fixed_aabbs(&self) -> Vec<(BodyHandle, Aabb)> {
        self.bodies
            .iter()
            .filter(|(_, body)| body.kind == BodyKind::Fixed)
            .map(|(handle, body)| (*handle, body.aabb()))
            .collect()
    }
}

impl Default for KinematicWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl RigidBodyWorld for KinematicWorld {
    fn create_body(&mut self, desc: BodyDesc) -> BodyHandle {
        let handle = BodyHandle(self.next_handle);
        self.next_handle += 1;

        let inv_mass = match desc.kind {
            BodyKind::Dynamic if desc.mass > 0.0 => 1.0 / desc.mass,
            _ => 0.0,
        };

        self.bodies.insert(
            handle,
            Body {
                kind: desc.kind,
                translation: desc.translation,
                rotation: desc.rotation,
                linear_velocity: Vec3::ZERO,
                angular_velocity: Vec3::ZERO,
                inv_mass,
                linear_damping: desc.linear_damping,
                friction: desc.friction,
                half_extents: desc.half_extents,
                contacts: Vec::new(),
            },
        );
        handle
    }

    fn remove_body(&mut self, handle: BodyHandle) {
        self.bodies.remove(&handle);
    }

    fn translation(&self, handle: BodyHandle) -> Option<Vec3> {
        self.bodies.get(&handle).map(|b| b.translation)
    }

    fn set_translation(&mut self, handle: BodyHandle, translation: Vec3) {
        if let Some(body) = self.bodies.get_mut(&handle) {
            body.translation = translation;
        }
    }

    fn rotation(&self, handle: BodyHandle) -> Option<Quat> {
        self.bodies.get(&handle).map(|b| b.rotation)
    }

    fn set_rotation(&mut self, handle: BodyHandle, rotation: Quat) {
        if let Some(body) = self.bodies.get_mut(&handle) {
            body.rotation = rotation;
        }
    }

    fn linear_velocity(&self, handle: BodyHandle) -> Option<Vec3> {
        self.bodies.get(&handle).map(|b| b.linear_velocity)
    }

    fn set_linear_velocity(&mut self, handle: BodyHandle, velocity: Vec3) {
        if let Some(body) = self.bodies.get_mut(&handle) {
            body.linear_velocity = velocity;
        }
    }

    fn angular_velocity(&self, handle: BodyHandle) -> Option<Vec3> {
        self.bodies.get(&handle).map(|b| b.angular_velocity)
    }

    fn set_angular_velocity(&mut self, handle: BodyHandle, velocity: Vec3) {
        if let Some(body) = self.bodies.get_mut(&handle) {
            body.angular_velocity = velocity;
        }
    }

    fn apply_impulse(&mut self, handle: BodyHandle, impulse: Vec3) {
        if let Some(body) = self.bodies.get_mut(&handle) {
            body.linear_velocity += impulse * body.inv_mass;
        }
    }

    fn apply_torque_impulse(&mut self, handle: BodyHandle, torque: Vec3) {
        if let Some(body) = self.bodies.get_mut(&handle) {
            // Unit-sphere inertia approximation; good enough for control
            body.angular_velocity += torque * body.inv_mass;
        }
    }

    fn set_friction(&mut self, handle: BodyHandle, friction: f32) {
        if let Some(body) = self.bodies.get_mut(&handle) {
            body.friction = friction;
        }
    }

    fn cast_ray(&self, origin: Vec3, dir: Vec3, max_len: f32, exclude: BodyHandle) -> Option<f32> {
        let mut nearest: Option<f32> = None;
        for (handle, body) in &self.bodies {
            if *handle == exclude {
                continue;
            }
            if let Some(t) = ray_aabb_intersect(origin, dir, max_len, &body.aabb()) {
                nearest = Some(match nearest {
                    Some(best) if best <= t => best,
                    _ => t,
                });
            }
        }
        nearest
    }

    fn drain_contacts(&mut self, handle: BodyHandle) -> Vec<ContactEvent> {
        self.bodies
            .get_mut(&handle)
            .map(|body| std::mem::take(&mut body.contacts))
            .unwrap_or_default()
    }

    fn step(&mut self, dt: f32) {
        let obstacles = self.fixed_aabbs();
        let dynamic: Vec<BodyHandle> = self
            .bodies
            .iter()
            .filter(|(_, body)| body.kind == BodyKind::Dynamic)
            .map(|(handle, _)| *handle)
            .collect();

        for handle in dynamic {
            let Some(body) = self.bodies.get_mut(&handle) else {
                continue;
            };

            body.linear_velocity.y += GRAVITY * dt;
            // Rapier-style proportional damping
            body.linear_velocity *= 1.0 / (1.0 + body.linear_damping * dt);
            body.angular_velocity *= 1.0 / (1.0 + body.linear_damping * dt);

            body.translation += body.linear_velocity * dt;
            let spin = body.angular_velocity * dt;
            if spin.length_squared() > 0.0 {
                body.rotation = (Quat::from_scaled_axis(spin) * body.rotation).normalize();
            }

            // Ground plane at y = 0
            if body.translation.y - body.half_extents.y < 0.0 {
                body.translation.y = body.half_extents.y;
                if body.linear_velocity.y < 0.0 {
                    body.linear_velocity.y = 0.0;
                }
            }

            let aabb = body.aabb();
            for (other, obstacle) in &obstacles {
                if aabb.overlaps(obstacle) {
                    // Push out along the shallowest axis and kill that
                    // velocity component
                    let overlap_x = (aabb.max.x.min(obstacle.max.x) - aabb.min.x.max(obstacle.min.x)).abs();
                    let overlap_z = (aabb.max.z.min(obstacle.max.z) - aabb.min.z.max(obstacle.min.z)).abs();
                    let center = (obstacle.min + obstacle.max) * 0.5;
                    if overlap_x < overlap_z {
                        let sign = if body.translation.x < center.x { -1.0 } else { 1.0 };
                        body.translation.x += sign * overlap_x;
                        body.linear_velocity.x = 0.0;
                    } else {
                        let sign = if body.translation.z < center.z { -1.0 } else { 1.0 };
                        body.translation.z += sign * overlap_z;
                        body.linear_velocity.z = 0.0;
                    }
                    body.contacts.push(ContactEvent {
                        body: handle,
                        other: *other,
                    });
                }
            }
        }
    }
}

//! Vehicle dynamics controller
//!
//! Translates boolean key state into forces on one rigid body per simulation
//! tick. The controller keeps an internal "intended speed" scalar as a
//! smoothing layer over raw impulses, stabilizes the chassis upright, clamps
//! runaway spin, detects drifting, and reacts to ray-probe and contact-queue
//! collisions with debounced speed penalties.

use crate::input::InputState;
use crate::physics::{BodyDesc, BodyHandle, BodyKind, RigidBodyWorld};
use glam::{Quat, Vec3};
use log::{debug, warn};
use shared::SPAWN_HEIGHT;
use std::time::{Duration, Instant};

pub const MAX_SPEED: f32 = 30.0;
pub const MAX_REVERSE_SPEED: f32 = 10.0;
pub const ACCELERATION: f32 = 24.0;
pub const REVERSE_ACCELERATION: f32 = 14.0;
/// Multiplicative per-tick rolling friction on the intended speed scalar.
pub const IDLE_DECAY: f32 = 0.96;
/// Per-axis angular velocity ceiling, rad/s.
pub const ANGULAR_CEILING: f32 = 4.0;
pub const TURN_TORQUE: f32 = 9.0;
pub const UPRIGHT_GAIN: f32 = 14.0;
pub const ENGINE_IMPULSE: f32 = 2.5;
pub const DOWNFORCE_IMPULSE: f32 = 0.6;
pub const VEHICLE_LINEAR_DAMPING: f32 = 2.5;
pub const VEHICLE_MASS: f32 = 1.0;
pub const VEHICLE_HALF_EXTENTS: Vec3 = Vec3::new(1.0, 0.6, 2.0);

pub const DRIFT_SPEED_THRESHOLD: f32 = 12.0;
pub const GRIP_FRICTION: f32 = 1.2;
pub const DRIFT_FRICTION: f32 = 0.4;
pub const SKID_LIFETIME: Duration = Duration::from_secs(2);
/// Rear-wheel contact points in chassis space (forward is -Z).
pub const REAR_WHEEL_OFFSETS: [Vec3; 2] =
    [Vec3::new(-0.8, -0.4, 1.6), Vec3::new(0.8, -0.4, 1.6)];

pub const PROBE_RAY_LENGTH: f32 = 2.5;
pub const PROBE_LATERAL_OFFSET: f32 = 0.6;
pub const FRONT_HIT_SPEED_SCALE: f32 = 0.45;
pub const REAR_HIT_SPEED_SCALE: f32 = 0.75;
pub const PROBE_DEBOUNCE: Duration = Duration::from_millis(600);
pub const CONTACT_SPEED_SCALE: f32 = 0.2;
pub const CONTACT_DEBOUNCE: Duration = Duration::from_millis(800);

/// Rescales so every axis respects the ceiling while the spin direction is
/// preserved.
pub fn clamp_angular_velocity(velocity: Vec3, ceiling: f32) -> Vec3 {
    let max_axis = velocity.abs().max_element();
    if max_axis > ceiling {
        velocity * (ceiling / max_axis)
    } else {
        velocity
    }
}

/// A fading tire mark left while drifting.
#[derive(Debug, Clone, Copy)]
pub struct SkidMark {
    pub position: Vec3,
    pub spawned: Instant,
}

/// Per-vehicle control state. The rigid body itself lives in the physics
/// capability; the controller only holds the handle.
pub struct VehicleController {
    body: Option<BodyHandle>,
    spawn_point: Vec3,
    speed: f32,
    drifting: bool,
    skid_marks: Vec<SkidMark>,
    last_probe_penalty: Option<Instant>,
    last_contact_penalty: Option<Instant>,
}

impl VehicleController {
    pub fn new() -> Self {
        Self {
            body: None,
            spawn_point: Vec3::new(0.0, SPAWN_HEIGHT, 0.0),
            speed: 0.0,
            drifting: false,
            skid_marks: Vec::new(),
            last_probe_penalty: None,
            last_contact_penalty: None,
        }
    }

    /// Creates the chassis body. Until this has been called every update is
    /// a silent no-op, so the frame loop tolerates a vehicle that is still
    /// initializing.
    pub fn spawn(&mut self, world: &mut dyn RigidBodyWorld, position: Vec3, rotation: Quat) {
        self.spawn_point = position;
        self.speed = 0.0;
        self.drifting = false;
        let handle = world.create_body(BodyDesc {
            kind: BodyKind::Dynamic,
            translation: position,
            rotation,
            half_extents: VEHICLE_HALF_EXTENTS,
            mass: VEHICLE_MASS,
            linear_damping: VEHICLE_LINEAR_DAMPING,
            friction: GRIP_FRICTION,
            restitution: 0.1,
        });
        self.body = Some(handle);
    }

    pub fn despawn(&mut self, world: &mut dyn RigidBodyWorld) {
        if let Some(handle) = self.body.take() {
            world.remove_body(handle);
        }
        self.skid_marks.clear();
    }

    pub fn body(&self) -> Option<BodyHandle> {
        self.body
    }

    pub fn is_ready(&self) -> bool {
        self.body.is_some()
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn is_drifting(&self) -> bool {
        self.drifting
    }

    pub fn skid_marks(&self) -> &[SkidMark] {
        &self.skid_marks
    }

    pub fn transform(&self, world: &dyn RigidBodyWorld) -> Option<(Vec3, Quat)> {
        let body = self.body?;
        Some((world.translation(body)?, world.rotation(body)?))
    }

    /// One simulation tick of vehicle control.
    pub fn update(
        &mut self,
        world: &mut dyn RigidBodyWorld,
        input: &InputState,
        dt: f32,
        now: Instant,
    ) {
        let Some(body) = self.body else {
            debug!("Vehicle update skipped: body not initialized");
            return;
        };
        let (Some(translation), Some(rotation), Some(angular)) = (
            world.translation(body),
            world.rotation(body),
            world.angular_velocity(body),
        ) else {
            warn!("Vehicle update skipped: body state unavailable");
            return;
        };

        // Numeric corruption is recovered, not propagated
        if !translation.is_finite() {
            warn!("Non-finite vehicle position, resetting to spawn");
            world.set_translation(
                body,
                Vec3::new(self.spawn_point.x, SPAWN_HEIGHT, self.spawn_point.z),
            );
            world.set_linear_velocity(body, Vec3::ZERO);
            world.set_angular_velocity(body, Vec3::ZERO);
            self.speed = 0.0;
            return;
        }

        let clamped = clamp_angular_velocity(angular, ANGULAR_CEILING);
        if clamped != angular {
            world.set_angular_velocity(body, clamped);
        }

        let forward = rotation * Vec3::NEG_Z;

        if input.forward {
            self.speed = (self.speed + ACCELERATION * dt).min(MAX_SPEED);
        } else if input.reverse {
            self.speed = (self.speed - REVERSE_ACCELERATION * dt).max(-MAX_REVERSE_SPEED);
        } else {
            self.speed *= IDLE_DECAY;
            if self.speed.abs() < 0.01 {
                self.speed = 0.0;
            }
        }

        // Steering authority grows with speed
        let speed_ratio = (self.speed.abs() / MAX_SPEED).clamp(0.0, 1.0);
        let mut yaw = 0.0;
        if input.left {
            yaw += 1.0;
        }
        if input.right {
            yaw -= 1.0;
        }
        if yaw != 0.0 && speed_ratio > 0.0 {
            world.apply_torque_impulse(body, Vec3::Y * yaw * TURN_TORQUE * speed_ratio * dt);
        }

        // Upright stabilization runs every tick, not only when flipped
        let local_up = rotation * Vec3::Y;
        let corrective = local_up.cross(Vec3::Y);
        world.apply_torque_impulse(body, corrective * UPRIGHT_GAIN * dt);

        world.apply_impulse(body, forward * self.speed * ENGINE_IMPULSE * dt);
        world.apply_impulse(body, Vec3::new(0.0, -DOWNFORCE_IMPULSE, 0.0));

        let turning = input.left || input.right;
        self.drifting = self.speed.abs() > DRIFT_SPEED_THRESHOLD && turning && !input.forward;
        world.set_friction(
            body,
            if self.drifting {
                DRIFT_FRICTION
            } else {
                GRIP_FRICTION
            },
        );
        if self.drifting {
            for offset in REAR_WHEEL_OFFSETS {
                self.skid_marks.push(SkidMark {
                    position: translation + rotation * offset,
                    spawned: now,
                });
            }
        }
        self.skid_marks
            .retain(|mark| now.duration_since(mark.spawned) < SKID_LIFETIME);

        self.apply_probe_penalties(world, body, translation, rotation, forward, now);
        self.apply_contact_penalty(world, body, now);
    }

    /// Forward/backward ray probes. A hit inside the probe length slows the
    /// vehicle, head-on harder than a rear graze, at most once per debounce
    /// window.
    fn apply_probe_penalties(
        &mut self,
        world: &mut dyn RigidBodyWorld,
        body: BodyHandle,
        translation: Vec3,
        rotation: Quat,
        forward: Vec3,
        now: Instant,
    ) {
        if let Some(last) = self.last_probe_penalty {
            if now.duration_since(last) < PROBE_DEBOUNCE {
                return;
            }
        }

        let lateral = rotation * Vec3::X * PROBE_LATERAL_OFFSET;
        let probes = [
            (translation + lateral, forward, FRONT_HIT_SPEED_SCALE),
            (translation - lateral, forward, FRONT_HIT_SPEED_SCALE),
            (translation + lateral, -forward, REAR_HIT_SPEED_SCALE),
            (translation - lateral, -forward, REAR_HIT_SPEED_SCALE),
        ];

        for (origin, dir, scale) in probes {
            if world.cast_ray(origin, dir, PROBE_RAY_LENGTH, body).is_some() {
                debug!("Probe hit, scaling speed by {}", scale);
                self.speed *= scale;
                self.last_probe_penalty = Some(now);
                return;
            }
        }
    }

    /// Full-stop style penalty from the capability's contact queue, with its
    /// own debounce independent of the ray probes.
    fn apply_contact_penalty(
        &mut self,
        world: &mut dyn RigidBodyWorld,
        body: BodyHandle,
        now: Instant,
    ) {
        let contacts = world.drain_contacts(body);
        if contacts.is_empty() {
            return;
        }
        if let Some(last) = self.last_contact_penalty {
            if now.duration_since(last) < CONTACT_DEBOUNCE {
                return;
            }
        }
        debug!("Contact impact, scaling speed by {}", CONTACT_SPEED_SCALE);
        self.speed *= CONTACT_SPEED_SCALE;
        self.last_contact_penalty = Some(now);
    }
}

impl Default for VehicleController {
    fn default() -> Self {
        Self::new()
    }
}

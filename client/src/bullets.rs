//! Client-side projectile simulation
//!
//! Every peer simulates every bullet locally; only the firing client raises
//! hit claims, and only the server resolves them. A claimed bullet is hidden
//! speculatively rather than destroyed: the server's `BulletRemoved` ack
//! finalizes the removal, and a bounded reconcile window rolls the bullet
//! back to visible if no ack ever arrives.
//!
//! Bullets are advanced here as point projectiles instead of as bodies in
//! the rigid-body capability: they need only straight-line integration with
//! per-kind damping and point-containment tests, never contact response, and
//! keeping them out of the world keeps the vehicle's ray probes and contact
//! queue free of bullet hits.

use crate::physics::Aabb;
use crate::vehicle::VEHICLE_HALF_EXTENTS;
use glam::{Quat, Vec3};
use log::debug;
use shared::{
    epoch_micros, BulletId, Message, PlayerId, ARENA_HALF_EXTENT, BULLET_SPEED, BULLET_TTL_MS,
    MAX_LIVE_BULLETS, SELF_HIT_GRACE_MS,
};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Spawn distance ahead of the vehicle center, past the chassis front face.
pub const MUZZLE_OFFSET: f32 = 2.5;
/// Remote echoes fly with damping the locally-fired copy does not have, so
/// their initial velocity is compensated upward to land in roughly the same
/// place.
pub const REMOTE_BULLET_DAMPING: f32 = 0.5;
pub const REMOTE_VELOCITY_COMPENSATION: f32 = 1.1;
/// Hit volumes are the vehicle box grown by this factor; generous on purpose,
/// since the claim is only a request the server still arbitrates.
pub const HIT_VOLUME_SCALE: f32 = 1.5;
/// How long a speculatively-hidden bullet waits for the server ack before it
/// is rolled back to visible.
pub const CLAIM_ACK_WINDOW: Duration = Duration::from_secs(1);

/// A hit the firing client wants the server to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HitClaim {
    pub bullet_id: BulletId,
    pub target: PlayerId,
}

#[derive(Debug)]
struct Bullet {
    id: BulletId,
    position: Vec3,
    velocity: Vec3,
    damping: f32,
    spawned: Instant,
    ttl: Duration,
    hidden_since: Option<Instant>,
}

impl Bullet {
    fn age(&self, now: Instant) -> Duration {
        now.duration_since(self.spawned)
    }

    fn out_of_bounds(&self) -> bool {
        self.position.x.abs() > ARENA_HALF_EXTENT
            || self.position.y.abs() > ARENA_HALF_EXTENT
            || self.position.z.abs() > ARENA_HALF_EXTENT
    }
}

/// All live projectiles known to this client, oldest first. Bounded: firing
/// past capacity evicts the oldest record.
pub struct BulletStore {
    local_player: PlayerId,
    bullets: Vec<Bullet>,
    cooldowns: HashMap<BulletId, Instant>,
}

impl BulletStore {
    pub fn new(local_player: PlayerId) -> Self {
        Self {
            local_player,
            bullets: Vec::new(),
            cooldowns: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.bullets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bullets.is_empty()
    }

    pub fn contains(&self, id: BulletId) -> bool {
        self.bullets.iter().any(|b| b.id == id)
    }

    pub fn is_hidden(&self, id: BulletId) -> bool {
        self.bullets
            .iter()
            .any(|b| b.id == id && b.hidden_since.is_some())
    }

    /// Positions of the bullets the scene should draw.
    pub fn visible_positions(&self) -> Vec<(BulletId, Vec3)> {
        self.bullets
            .iter()
            .filter(|b| b.hidden_since.is_none())
            .map(|b| (b.id, b.position))
            .collect()
    }

    /// Spawns a locally-fired bullet ahead of the muzzle and returns the
    /// creation message to send. The self-hit cooldown is armed here so the
    /// bullet cannot claim against its own firer right away.
    pub fn fire(&mut self, position: Vec3, rotation: Quat, now: Instant) -> Message {
        let forward = rotation * Vec3::NEG_Z;
        let id = BulletId {
            owner: self.local_player,
            spawn_micros: epoch_micros(),
        };
        let spawn = position + forward * MUZZLE_OFFSET;
        let velocity = forward * BULLET_SPEED;

        self.push(Bullet {
            id,
            position: spawn,
            velocity,
            damping: 0.0,
            spawned: now,
            ttl: Duration::from_millis(BULLET_TTL_MS),
            hidden_since: None,
        });
        self.cooldowns
            .insert(id, now + Duration::from_millis(SELF_HIT_GRACE_MS));

        Message::CreateBullet {
            id,
            position: spawn,
            velocity,
            ttl_ms: BULLET_TTL_MS,
        }
    }

    /// Materializes a bullet another peer fired. Our own echo comes back from
    /// the broadcast path too and is skipped.
    pub fn on_created(
        &mut self,
        id: BulletId,
        position: Vec3,
        velocity: Vec3,
        ttl_ms: u64,
        now: Instant,
    ) {
        if id.owner == self.local_player || self.contains(id) {
            return;
        }
        self.push(Bullet {
            id,
            position,
            velocity: velocity * REMOTE_VELOCITY_COMPENSATION,
            damping: REMOTE_BULLET_DAMPING,
            spawned: now,
            ttl: Duration::from_millis(ttl_ms),
            hidden_since: None,
        });
    }

    /// Server ack: the bullet is gone for good, whether it was speculatively
    /// hidden here or still visible.
    pub fn on_removed(&mut self, id: BulletId) {
        self.bullets.retain(|b| b.id != id);
        self.cooldowns.remove(&id);
    }

    /// One simulation tick: advance, expire, roll back unacked claims, and
    /// test this client's own bullets against the given hit volumes.
    ///
    /// `targets` carries every player's current center, the local player
    /// included; the self-hit cooldown gates claims against the firer.
    pub fn update(
        &mut self,
        targets: &[(PlayerId, Vec3)],
        dt: f32,
        now: Instant,
    ) -> Vec<HitClaim> {
        for bullet in &mut self.bullets {
            bullet.velocity *= 1.0 / (1.0 + bullet.damping * dt);
            bullet.position += bullet.velocity * dt;
        }

        self.bullets.retain(|b| {
            let keep = b.age(now) < b.ttl && !b.out_of_bounds();
            if !keep {
                debug!("Bullet {} expired locally", b.id);
            }
            keep
        });
        let live: Vec<BulletId> = self.bullets.iter().map(|b| b.id).collect();
        self.cooldowns.retain(|id, _| live.contains(id));

        let mut claims = Vec::new();
        for bullet in &mut self.bullets {
            if let Some(hidden) = bullet.hidden_since {
                if now.duration_since(hidden) >= CLAIM_ACK_WINDOW {
                    debug!("No ack for claimed bullet {}, rolling back", bullet.id);
                    bullet.hidden_since = None;
                } else {
                    continue;
                }
            }
            if bullet.id.owner != self.local_player {
                continue;
            }

            for (target, center) in targets {
                if *target == bullet.id.owner {
                    if let Some(expiry) = self.cooldowns.get(&bullet.id) {
                        if now < *expiry {
                            continue;
                        }
                    }
                }
                let volume = Aabb::from_center(*center, VEHICLE_HALF_EXTENTS)
                    .expanded(HIT_VOLUME_SCALE);
                if volume.contains(bullet.position) {
                    debug!("Bullet {} claims hit on player {}", bullet.id, target);
                    bullet.hidden_since = Some(now);
                    claims.push(HitClaim {
                        bullet_id: bullet.id,
                        target: *target,
                    });
                    break;
                }
            }
        }
        claims
    }

    fn push(&mut self, bullet: Bullet) {
        if self.bullets.len() >= MAX_LIVE_BULLETS {
            let evicted = self.bullets.remove(0);
            debug!("Bullet capacity reached, evicting {}", evicted.id);
            self.cooldowns.remove(&evicted.id);
        }
        self.bullets.push(bullet);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    const DT: f32 = 1.0 / 60.0;

    fn remote_id(micros: u64) -> BulletId {
        BulletId {
            owner: 99,
            spawn_micros: micros,
        }
    }

    #[test]
    fn test_fire_spawns_ahead_with_muzzle_velocity() {
        let mut store = BulletStore::new(1);
        let msg = store.fire(Vec3::new(0.0, 1.0, 0.0), Quat::IDENTITY, Instant::now());

        match msg {
            Message::CreateBullet {
                id,
                position,
                velocity,
                ttl_ms,
            } => {
                assert_eq!(id.owner, 1);
                // Forward is -Z for an identity orientation
                assert_approx_eq!(position.z, -MUZZLE_OFFSET, 1e-5);
                assert_approx_eq!(velocity.z, -BULLET_SPEED, 1e-5);
                assert_eq!(ttl_ms, BULLET_TTL_MS);
            }
            other => panic!("Expected CreateBullet, got {:?}", other),
        }
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_own_echo_is_skipped() {
        let mut store = BulletStore::new(1);
        let now = Instant::now();
        let msg = store.fire(Vec3::ZERO, Quat::IDENTITY, now);
        let Message::CreateBullet {
            id,
            position,
            velocity,
            ttl_ms,
        } = msg
        else {
            panic!("Expected CreateBullet");
        };

        store.on_created(id, position, velocity, ttl_ms, now);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_remote_bullet_velocity_is_compensated() {
        let mut store = BulletStore::new(1);
        let now = Instant::now();
        store.on_created(
            remote_id(1),
            Vec3::ZERO,
            Vec3::new(0.0, 0.0, -BULLET_SPEED),
            BULLET_TTL_MS,
            now,
        );

        store.update(&[], DT, now);
        let positions = store.visible_positions();
        assert_eq!(positions.len(), 1);
        // Compensation outweighs one tick of damping
        assert!(positions[0].1.z < -BULLET_SPEED * DT);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut store = BulletStore::new(1);
        let now = Instant::now();
        for micros in 0..(MAX_LIVE_BULLETS + 3) as u64 {
            store.on_created(
                remote_id(micros),
                Vec3::ZERO,
                Vec3::Z,
                BULLET_TTL_MS,
                now,
            );
        }

        assert_eq!(store.len(), MAX_LIVE_BULLETS);
        assert!(!store.contains(remote_id(0)));
        assert!(store.contains(remote_id((MAX_LIVE_BULLETS + 2) as u64)));
    }

    #[test]
    fn test_bullets_expire_by_age() {
        let mut store = BulletStore::new(1);
        let now = Instant::now();
        store.fire(Vec3::ZERO, Quat::IDENTITY, now);

        store.update(&[], 0.0, now + Duration::from_millis(BULLET_TTL_MS + 1));
        assert!(store.is_empty());
    }

    #[test]
    fn test_vertically_escaping_bullet_expires() {
        let mut store = BulletStore::new(1);
        let now = Instant::now();
        // A peer can report any velocity, including straight up
        store.on_created(
            remote_id(1),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, 500.0, 0.0),
            BULLET_TTL_MS,
            now,
        );

        store.update(&[], 1.0, now + Duration::from_secs(1));
        assert!(store.is_empty());
    }

    #[test]
    fn test_bullets_expire_out_of_bounds() {
        let mut store = BulletStore::new(1);
        let now = Instant::now();
        // Fired near the arena edge, heading out
        store.fire(
            Vec3::new(0.0, 1.0, -(ARENA_HALF_EXTENT - 1.0)),
            Quat::IDENTITY,
            now,
        );

        store.update(&[], 1.0, now + Duration::from_secs(1));
        assert!(store.is_empty());
    }

    #[test]
    fn test_hit_claim_hides_bullet_until_ack() {
        let mut store = BulletStore::new(1);
        let now = Instant::now();
        let Message::CreateBullet { id, position, .. } =
            store.fire(Vec3::new(0.0, 1.0, 0.0), Quat::IDENTITY, now)
        else {
            panic!("Expected CreateBullet");
        };

        // Target sitting right on the muzzle point
        let claims = store.update(&[(2, position)], 0.0, now);
        assert_eq!(
            claims,
            vec![HitClaim {
                bullet_id: id,
                target: 2,
            }]
        );
        assert!(store.is_hidden(id));
        assert!(store.visible_positions().is_empty());

        // No duplicate claim while hidden
        let claims = store.update(&[(2, position)], 0.0, now + Duration::from_millis(100));
        assert!(claims.is_empty());

        // The ack finalizes the removal
        store.on_removed(id);
        assert!(!store.contains(id));
    }

    #[test]
    fn test_unacked_claim_rolls_back() {
        let mut store = BulletStore::new(1);
        let now = Instant::now();
        let Message::CreateBullet { id, position, .. } =
            store.fire(Vec3::new(0.0, 1.0, 0.0), Quat::IDENTITY, now)
        else {
            panic!("Expected CreateBullet");
        };

        let claims = store.update(&[(2, position)], 0.0, now);
        assert_eq!(claims.len(), 1);
        assert!(store.is_hidden(id));

        // Ack never arrives: the bullet reappears and may claim again
        let later = now + CLAIM_ACK_WINDOW + Duration::from_millis(50);
        let claims = store.update(&[(2, position)], 0.0, later);
        assert!(!store.is_hidden(id) || claims.len() == 1);
        assert_eq!(claims.len(), 1);
    }

    #[test]
    fn test_self_hit_gated_by_cooldown() {
        let mut store = BulletStore::new(1);
        let now = Instant::now();
        store.fire(Vec3::new(0.0, 1.0, 0.0), Quat::IDENTITY, now);

        // The muzzle point is still inside our own expanded hit volume, but
        // the grace window suppresses the claim
        let claims = store.update(&[(1, Vec3::new(0.0, 1.0, 0.0))], 0.0, now);
        assert!(claims.is_empty());

        // After the window the same geometry does claim
        let later = now + Duration::from_millis(SELF_HIT_GRACE_MS + 100);
        let claims = store.update(&[(1, Vec3::new(0.0, 1.0, 0.0))], 0.0, later);
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].target, 1);
    }

    #[test]
    fn test_remote_bullets_never_claim() {
        let mut store = BulletStore::new(1);
        let now = Instant::now();
        store.on_created(remote_id(1), Vec3::new(0.0, 1.0, 0.0), Vec3::ZERO, BULLET_TTL_MS, now);

        // A target sits exactly on the remote bullet; claims stay with the owner
        let claims = store.update(&[(2, Vec3::new(0.0, 1.0, 0.0))], 0.0, now);
        assert!(claims.is_empty());
    }
}

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const MAX_HEALTH: i32 = 100;
pub const HIT_DAMAGE: i32 = 10;
pub const WIN_SCORE: u32 = 3;
pub const BULLET_TTL_MS: u64 = 3000;
pub const BULLET_SPEED: f32 = 60.0;
pub const SELF_HIT_GRACE_MS: u64 = 500;
pub const ARENA_HALF_EXTENT: f32 = 120.0;
pub const MAX_LIVE_BULLETS: usize = 32;
pub const SPAWN_HEIGHT: f32 = 2.0;

/// Opaque session identifier handed out by the server transport on connect.
pub type PlayerId = u32;

/// Fixed spawn table. Slots are assigned round-robin as clients connect.
pub const SPAWN_SLOTS: [[f32; 3]; 2] = [[-20.0, SPAWN_HEIGHT, 0.0], [20.0, SPAWN_HEIGHT, 0.0]];

pub fn spawn_position(slot: usize) -> Vec3 {
    Vec3::from_array(SPAWN_SLOTS[slot % SPAWN_SLOTS.len()])
}

/// Microseconds since the unix epoch. Used to mint bullet ids and to stamp
/// input samples; resolution is high enough that two shots from one owner
/// never collide.
pub fn epoch_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_micros() as u64
}

/// Globally unique projectile id: the firing player plus the high-resolution
/// spawn timestamp. Every peer keys its locally-simulated copy by this value,
/// and the server keys its bullet table by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BulletId {
    pub owner: PlayerId,
    pub spawn_micros: u64,
}

impl fmt::Display for BulletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.spawn_micros)
    }
}

/// Authoritative per-player record. The server owns these; clients hold a
/// read-only mirror for every player except their own.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PlayerState {
    pub id: PlayerId,
    pub position: Vec3,
    pub rotation: Quat,
    pub health: i32,
    pub score: u32,
    pub spawn_slot: usize,
}

impl PlayerState {
    pub fn new(id: PlayerId, spawn_slot: usize) -> Self {
        Self {
            id,
            position: spawn_position(spawn_slot),
            rotation: Quat::IDENTITY,
            health: MAX_HEALTH,
            score: 0,
            spawn_slot,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ScoreEntry {
    pub id: PlayerId,
    pub score: u32,
}

/// The complete wire catalog. One fixed schema per event; anything that does
/// not decode into this enum is dropped at the boundary.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Message {
    // client -> server
    Connect {
        client_version: u32,
    },
    UpdatePosition {
        position: Vec3,
        rotation: Quat,
    },
    CreateBullet {
        id: BulletId,
        position: Vec3,
        velocity: Vec3,
        /// Single authoritative lifetime, chosen at creation time and honored
        /// by both the firing client and the server expiry sweep.
        ttl_ms: u64,
    },
    BulletHit {
        bullet_id: BulletId,
        target: PlayerId,
    },
    Disconnect,

    // server -> client
    Initialize {
        id: PlayerId,
        players: Vec<PlayerState>,
    },
    PlayerJoined {
        player: PlayerState,
    },
    PlayerMoved {
        id: PlayerId,
        position: Vec3,
        rotation: Quat,
    },
    PlayerLeft {
        id: PlayerId,
    },
    BulletCreated {
        id: BulletId,
        position: Vec3,
        velocity: Vec3,
        ttl_ms: u64,
    },
    BulletRemoved {
        id: BulletId,
    },
    PlayerHealthUpdate {
        id: PlayerId,
        health: i32,
    },
    ScoreUpdate {
        scores: Vec<ScoreEntry>,
    },
    GameOver {
        winner: PlayerId,
        scores: Vec<ScoreEntry>,
    },
    Rejected {
        reason: String,
    },
}

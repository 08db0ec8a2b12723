//! Authoritative combat session
//!
//! The session owns the player table, the bullet table, the self-hit cooldown
//! table, and the score threshold. All of it lives behind one explicit object
//! so several independent matches can coexist and tests can construct a
//! session with injected tuning. Handlers mutate state and return the
//! messages to deliver; they never touch sockets.

use glam::{Quat, Vec3};
use log::{debug, info};
use shared::{
    spawn_position, BulletId, Message, PlayerId, PlayerState, ScoreEntry, HIT_DAMAGE, MAX_HEALTH,
    SELF_HIT_GRACE_MS, WIN_SCORE,
};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Delivery scope for a session effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    One(PlayerId),
    AllExcept(PlayerId),
    All,
}

/// A message the transport layer should deliver on the session's behalf.
#[derive(Debug, Clone)]
pub struct Outbound {
    pub to: Target,
    pub msg: Message,
}

impl Outbound {
    fn one(id: PlayerId, msg: Message) -> Self {
        Self {
            to: Target::One(id),
            msg,
        }
    }

    fn except(id: PlayerId, msg: Message) -> Self {
        Self {
            to: Target::AllExcept(id),
            msg,
        }
    }

    fn all(msg: Message) -> Self {
        Self {
            to: Target::All,
            msg,
        }
    }
}

/// Tuning knobs, defaulting to the shared constants. Injected so the combat
/// scenarios can run with small thresholds.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub max_health: i32,
    pub hit_damage: i32,
    pub win_score: u32,
    pub self_hit_grace: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_health: MAX_HEALTH,
            hit_damage: HIT_DAMAGE,
            win_score: WIN_SCORE,
            self_hit_grace: Duration::from_millis(SELF_HIT_GRACE_MS),
        }
    }
}

#[derive(Debug, Clone)]
struct BulletRecord {
    // Stored as reported; the server assigns no semantics beyond the key
    #[allow(dead_code)]
    position: Vec3,
    #[allow(dead_code)]
    velocity: Vec3,
    expires_at: Instant,
}

/// Per-match authoritative state. Movement and hit claims are accepted as
/// reported by clients; the server never runs physics. That trust boundary is
/// a deliberate design limitation (see DESIGN.md).
pub struct Session {
    config: SessionConfig,
    players: HashMap<PlayerId, PlayerState>,
    bullets: HashMap<BulletId, BulletRecord>,
    cooldowns: HashMap<BulletId, Instant>,
    next_slot: usize,
    winner: Option<PlayerId>,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            players: HashMap::new(),
            bullets: HashMap::new(),
            cooldowns: HashMap::new(),
            next_slot: 0,
            winner: None,
        }
    }

    /// Registers a new player: round-robin spawn slot, default health and
    /// score, full snapshot to the newcomer, arrival broadcast to the rest.
    pub fn connect(&mut self, id: PlayerId) -> Vec<Outbound> {
        let slot = self.next_slot;
        self.next_slot = self.next_slot.wrapping_add(1);

        let mut player = PlayerState::new(id, slot);
        player.health = self.config.max_health;
        info!("Player {} joined in spawn slot {}", id, player.spawn_slot);
        self.players.insert(id, player.clone());

        let snapshot: Vec<PlayerState> = self.players.values().cloned().collect();
        vec![
            Outbound::one(
                id,
                Message::Initialize {
                    id,
                    players: snapshot,
                },
            ),
            Outbound::except(id, Message::PlayerJoined { player }),
        ]
    }

    /// Stores a client-reported transform and rebroadcasts it verbatim.
    pub fn update_position(&mut self, id: PlayerId, position: Vec3, rotation: Quat) -> Vec<Outbound> {
        let Some(player) = self.players.get_mut(&id) else {
            return Vec::new();
        };
        player.position = position;
        player.rotation = rotation;

        vec![Outbound::except(
            id,
            Message::PlayerMoved {
                id,
                position,
                rotation,
            },
        )]
    }

    /// Stores a fired bullet keyed by id, arms its self-hit cooldown, and
    /// echoes the creation to every other peer. The TTL from the creation
    /// message is the one the expiry sweep enforces.
    pub fn create_bullet(
        &mut self,
        id: BulletId,
        position: Vec3,
        velocity: Vec3,
        ttl_ms: u64,
        now: Instant,
    ) -> Vec<Outbound> {
        self.bullets.insert(
            id,
            BulletRecord {
                position,
                velocity,
                expires_at: now + Duration::from_millis(ttl_ms),
            },
        );
        self.cooldowns.insert(id, now + self.config.self_hit_grace);

        vec![Outbound::except(
            id.owner,
            Message::BulletCreated {
                id,
                position,
                velocity,
                ttl_ms,
            },
        )]
    }

    /// The combat resolution state machine. The first valid claim against a
    /// bullet wins; the record is deleted in the same step, so every later
    /// claim naming the same id is a no-op. Stale references (unknown bullet,
    /// departed target) are expected races, not errors.
    pub fn bullet_hit(&mut self, bullet_id: BulletId, target: PlayerId, now: Instant) -> Vec<Outbound> {
        if !self.bullets.contains_key(&bullet_id) {
            debug!("Ignoring claim for unknown bullet {}", bullet_id);
            return Vec::new();
        }
        if !self.players.contains_key(&target) {
            debug!("Ignoring claim against departed player {}", target);
            return Vec::new();
        }

        // A projectile cannot hurt its own firer until the muzzle grace
        // period has elapsed. The bullet keeps flying.
        if target == bullet_id.owner {
            if let Some(expiry) = self.cooldowns.get(&bullet_id) {
                if now < *expiry {
                    debug!("Rejecting self-hit within grace period: {}", bullet_id);
                    return Vec::new();
                }
            }
        }

        self.bullets.remove(&bullet_id);
        self.cooldowns.remove(&bullet_id);

        let mut out = vec![Outbound::all(Message::BulletRemoved { id: bullet_id })];
        let attacker = bullet_id.owner;

        let (new_health, eliminated) = {
            let Some(player) = self.players.get_mut(&target) else {
                return out;
            };
            player.health -= self.config.hit_damage;
            if player.health <= 0 {
                // Reset within the same step: stored health never goes
                // negative, and the victim reappears at their original slot.
                player.health = self.config.max_health;
                player.position = spawn_position(player.spawn_slot);
                player.rotation = Quat::IDENTITY;
                (player.health, true)
            } else {
                (player.health, false)
            }
        };

        out.push(Outbound::all(Message::PlayerHealthUpdate {
            id: target,
            health: new_health,
        }));

        if eliminated {
            info!("Player {} eliminated by {}", target, attacker);
            let attacker_score = {
                let Some(player) = self.players.get_mut(&attacker) else {
                    return out;
                };
                player.score += 1;
                player.score
            };

            out.push(Outbound::all(Message::ScoreUpdate {
                scores: self.score_table(),
            }));

            if attacker_score >= self.config.win_score && self.winner.is_none() {
                self.winner = Some(attacker);
                info!("Game over, winner: {}", attacker);
                out.push(Outbound::all(Message::GameOver {
                    winner: attacker,
                    scores: self.score_table(),
                }));
            }
        }

        out
    }

    /// Removes overdue bullets and announces each removal. Driven by the
    /// server tick, independent of any client's own lifetime tracking.
    pub fn expire_bullets(&mut self, now: Instant) -> Vec<Outbound> {
        let expired: Vec<BulletId> = self
            .bullets
            .iter()
            .filter(|(_, record)| now >= record.expires_at)
            .map(|(id, _)| *id)
            .collect();

        let mut out = Vec::with_capacity(expired.len());
        for id in expired {
            self.bullets.remove(&id);
            self.cooldowns.remove(&id);
            debug!("Bullet {} expired", id);
            out.push(Outbound::all(Message::BulletRemoved { id }));
        }
        out
    }

    /// Drops the player record and tells the remaining peers to tear down
    /// their mirror. Bullets the departed player fired stay in flight until
    /// their TTL or a hit consumes them.
    pub fn disconnect(&mut self, id: PlayerId) -> Vec<Outbound> {
        if self.players.remove(&id).is_none() {
            return Vec::new();
        }
        info!("Player {} left", id);
        vec![Outbound::all(Message::PlayerLeft { id })]
    }

    /// Zeroes every score and rebroadcasts the table. The session does not
    /// call this itself on game over; match restart is the embedder's call.
    pub fn reset_scores(&mut self) -> Vec<Outbound> {
        for player in self.players.values_mut() {
            player.score = 0;
        }
        self.winner = None;
        vec![Outbound::all(Message::ScoreUpdate {
            scores: self.score_table(),
        })]
    }

    pub fn score_table(&self) -> Vec<ScoreEntry> {
        let mut scores: Vec<ScoreEntry> = self
            .players
            .values()
            .map(|p| ScoreEntry {
                id: p.id,
                score: p.score,
            })
            .collect();
        scores.sort_by_key(|entry| entry.id);
        scores
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn bullet_count(&self) -> usize {
        self.bullets.len()
    }

    pub fn health(&self, id: PlayerId) -> Option<i32> {
        self.players.get(&id).map(|p| p.health)
    }

    pub fn score(&self, id: PlayerId) -> Option<u32> {
        self.players.get(&id).map(|p| p.score)
    }

    pub fn winner(&self) -> Option<PlayerId> {
        self.winner
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

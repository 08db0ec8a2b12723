//! Client game state
//!
//! [`ClientWorld`] owns the local vehicle, the locally-simulated bullets, and
//! a read-only mirror of every remote player. Remote transforms snap to the
//! last received values; the frequent rebroadcast cadence stands in for
//! interpolation. Every handler tolerates messages that arrive before
//! `Initialize` or reference players it has never seen.

use crate::bullets::BulletStore;
use crate::input::InputState;
use crate::physics::{BodyDesc, BodyHandle, BodyKind, KinematicWorld, RigidBodyWorld};
use crate::scene::{EntityId, Scene};
use crate::vehicle::{VehicleController, VEHICLE_HALF_EXTENTS};
use glam::{Quat, Vec3};
use log::{debug, info, warn};
use shared::{spawn_position, Message, PlayerId, PlayerState, ScoreEntry};
use std::collections::HashMap;
use std::time::Instant;

/// A remote player's last known state plus its obstacle body, which lets the
/// local vehicle collide with peers and local bullets test containment.
struct RemoteMirror {
    body: BodyHandle,
    state: PlayerState,
}

pub struct ClientWorld {
    local_id: Option<PlayerId>,
    local_state: Option<PlayerState>,
    world: KinematicWorld,
    vehicle: VehicleController,
    bullets: Option<BulletStore>,
    remotes: HashMap<PlayerId, RemoteMirror>,
    scores: Vec<ScoreEntry>,
    game_over: Option<(PlayerId, Vec<ScoreEntry>)>,
}

impl ClientWorld {
    pub fn new() -> Self {
        Self {
            local_id: None,
            local_state: None,
            world: KinematicWorld::new(),
            vehicle: VehicleController::new(),
            bullets: None,
            remotes: HashMap::new(),
            scores: Vec::new(),
            game_over: None,
        }
    }

    pub fn local_id(&self) -> Option<PlayerId> {
        self.local_id
    }

    pub fn is_initialized(&self) -> bool {
        self.local_id.is_some()
    }

    pub fn remote_count(&self) -> usize {
        self.remotes.len()
    }

    pub fn scores(&self) -> &[ScoreEntry] {
        &self.scores
    }

    pub fn game_over(&self) -> Option<&(PlayerId, Vec<ScoreEntry>)> {
        self.game_over.as_ref()
    }

    pub fn health_of(&self, id: PlayerId) -> Option<i32> {
        if self.local_id == Some(id) {
            return self.local_state.as_ref().map(|s| s.health);
        }
        self.remotes.get(&id).map(|m| m.state.health)
    }

    pub fn local_transform(&self) -> Option<(Vec3, Quat)> {
        self.vehicle.transform(&self.world)
    }

    /// Applies one server message. Unknown references are logged and dropped;
    /// nothing here can panic the frame loop.
    pub fn apply(&mut self, msg: Message, scene: &mut dyn Scene, now: Instant) {
        match msg {
            Message::Initialize { id, players } => self.on_initialize(id, players, scene),
            Message::PlayerJoined { player } => self.add_remote(player, scene),
            Message::PlayerMoved {
                id,
                position,
                rotation,
            } => self.on_player_moved(id, position, rotation, scene),
            Message::PlayerLeft { id } => self.on_player_left(id, scene),
            Message::BulletCreated {
                id,
                position,
                velocity,
                ttl_ms,
            } => {
                if let Some(bullets) = self.bullets.as_mut() {
                    bullets.on_created(id, position, velocity, ttl_ms, now);
                    if self.local_id != Some(id.owner) {
                        scene.add(EntityId::Bullet(id), position, Quat::IDENTITY);
                    }
                }
            }
            Message::BulletRemoved { id } => {
                if let Some(bullets) = self.bullets.as_mut() {
                    bullets.on_removed(id);
                }
                scene.remove(EntityId::Bullet(id));
            }
            Message::PlayerHealthUpdate { id, health } => self.on_health_update(id, health),
            Message::ScoreUpdate { scores } => {
                self.scores = scores;
            }
            Message::GameOver { winner, scores } => {
                info!("Game over, winner: {}", winner);
                self.game_over = Some((winner, scores));
            }
            Message::Rejected { reason } => {
                warn!("Server rejected us: {}", reason);
            }
            other => {
                debug!("Ignoring server-bound message: {:?}", other);
            }
        }
    }

    /// One simulation tick: drive the vehicle, step physics, fire and advance
    /// bullets, and return the messages to send. Before `Initialize` arrives
    /// this is a no-op returning nothing.
    pub fn tick(
        &mut self,
        scene: &mut dyn Scene,
        input: &InputState,
        fire: bool,
        dt: f32,
        now: Instant,
    ) -> Vec<Message> {
        let Some(local_id) = self.local_id else {
            return Vec::new();
        };

        self.vehicle.update(&mut self.world, input, dt, now);
        self.world.step(dt);

        let Some((position, rotation)) = self.vehicle.transform(&self.world) else {
            return Vec::new();
        };
        if let Some(state) = self.local_state.as_mut() {
            state.position = position;
            state.rotation = rotation;
        }
        scene.update(EntityId::Vehicle(local_id), position, rotation);

        let mut outgoing = Vec::new();
        if let Some(bullets) = self.bullets.as_mut() {
            if fire {
                let msg = bullets.fire(position, rotation, now);
                if let Message::CreateBullet {
                    id,
                    position: spawn,
                    ..
                } = &msg
                {
                    scene.add(EntityId::Bullet(*id), *spawn, Quat::IDENTITY);
                }
                outgoing.push(msg);
            }

            let mut targets: Vec<(PlayerId, Vec3)> = vec![(local_id, position)];
            targets.extend(
                self.remotes
                    .iter()
                    .map(|(id, mirror)| (*id, mirror.state.position)),
            );

            for claim in bullets.update(&targets, dt, now) {
                outgoing.push(Message::BulletHit {
                    bullet_id: claim.bullet_id,
                    target: claim.target,
                });
                scene.remove(EntityId::Bullet(claim.bullet_id));
            }

            for (id, bullet_position) in bullets.visible_positions() {
                scene.update(EntityId::Bullet(id), bullet_position, Quat::IDENTITY);
            }
        }

        outgoing.push(Message::UpdatePosition { position, rotation });
        outgoing
    }

    fn on_initialize(&mut self, id: PlayerId, players: Vec<PlayerState>, scene: &mut dyn Scene) {
        info!("Initialized as player {} with {} players", id, players.len());

        // A reconnect replaces everything we had
        self.teardown(scene);
        self.local_id = Some(id);
        self.bullets = Some(BulletStore::new(id));

        for player in players {
            if player.id == id {
                self.vehicle
                    .spawn(&mut self.world, player.position, player.rotation);
                scene.add(EntityId::Vehicle(id), player.position, player.rotation);
                self.local_state = Some(player);
            } else {
                self.add_remote(player, scene);
            }
        }
    }

    fn add_remote(&mut self, player: PlayerState, scene: &mut dyn Scene) {
        if Some(player.id) == self.local_id || self.remotes.contains_key(&player.id) {
            return;
        }
        debug!("Adding remote mirror for player {}", player.id);
        let body = self.world.create_body(BodyDesc {
            kind: BodyKind::Fixed,
            translation: player.position,
            rotation: player.rotation,
            half_extents: VEHICLE_HALF_EXTENTS,
            ..BodyDesc::default()
        });
        scene.add(EntityId::Vehicle(player.id), player.position, player.rotation);
        self.remotes.insert(player.id, RemoteMirror { body, state: player });
    }

    fn on_player_moved(
        &mut self,
        id: PlayerId,
        position: Vec3,
        rotation: Quat,
        scene: &mut dyn Scene,
    ) {
        let Some(mirror) = self.remotes.get_mut(&id) else {
            debug!("Movement for unknown player {}", id);
            return;
        };
        // Snap to the reported transform; the rebroadcast cadence is the
        // smoothing
        mirror.state.position = position;
        mirror.state.rotation = rotation;
        self.world.set_translation(mirror.body, position);
        self.world.set_rotation(mirror.body, rotation);
        scene.update(EntityId::Vehicle(id), position, rotation);
    }

    fn on_player_left(&mut self, id: PlayerId, scene: &mut dyn Scene) {
        if let Some(mirror) = self.remotes.remove(&id) {
            info!("Player {} left", id);
            self.world.remove_body(mirror.body);
            scene.remove(EntityId::Vehicle(id));
        }
    }

    fn on_health_update(&mut self, id: PlayerId, health: i32) {
        if self.local_id == Some(id) {
            let respawned = self
                .local_state
                .as_ref()
                .map(|s| health > s.health)
                .unwrap_or(false);
            if let Some(state) = self.local_state.as_mut() {
                state.health = health;
            }
            // A health jump upward is the server's elimination reset; put the
            // chassis back on our spawn slot
            if respawned {
                if let (Some(body), Some(state)) = (self.vehicle.body(), self.local_state.as_ref())
                {
                    info!("Eliminated, respawning at slot {}", state.spawn_slot);
                    self.world
                        .set_translation(body, spawn_position(state.spawn_slot));
                    self.world.set_rotation(body, Quat::IDENTITY);
                    self.world.set_linear_velocity(body, Vec3::ZERO);
                    self.world.set_angular_velocity(body, Vec3::ZERO);
                }
            }
        } else if let Some(mirror) = self.remotes.get_mut(&id) {
            mirror.state.health = health;
        }
    }

    fn teardown(&mut self, scene: &mut dyn Scene) {
        if let Some(id) = self.local_id.take() {
            scene.remove(EntityId::Vehicle(id));
        }
        self.vehicle.despawn(&mut self.world);
        let ids: Vec<PlayerId> = self.remotes.keys().copied().collect();
        for id in ids {
            self.on_player_left(id, scene);
        }
        if let Some(bullets) = self.bullets.take() {
            for (id, _) in bullets.visible_positions() {
                scene.remove(EntityId::Bullet(id));
            }
        }
        self.local_state = None;
        self.scores.clear();
        self.game_over = None;
    }
}

impl Default for ClientWorld {
    fn default() -> Self {
        Self::new()
    }
}

//! Client network layer
//!
//! Owns the UDP socket and the main loop: inbound datagrams are decoded and
//! applied to the [`ClientWorld`], and a fixed-rate tick drives the vehicle,
//! the bullet simulation, and the outgoing position/fire/claim messages.

use crate::game::ClientWorld;
use crate::input::InputManager;
use crate::scene::Scene;
use bincode::{deserialize, serialize};
use log::{error, info, warn};
use shared::Message;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::time::interval;

/// Protocol version sent in the connect handshake; must match the server's.
pub const PROTOCOL_VERSION: u32 = 1;

pub struct Client {
    socket: UdpSocket,
    server_addr: SocketAddr,
    running: bool,

    world: ClientWorld,
    input: InputManager,
    scene: Box<dyn Scene>,
    tick_duration: Duration,
}

impl Client {
    pub async fn new(
        server_addr: &str,
        scene: Box<dyn Scene>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let server_addr = server_addr.parse()?;

        Ok(Client {
            socket,
            server_addr,
            running: true,
            world: ClientWorld::new(),
            input: InputManager::new(),
            scene,
            tick_duration: Duration::from_millis(16),
        })
    }

    /// The embedder's window layer pushes key state in through this.
    pub fn input_mut(&mut self) -> &mut InputManager {
        &mut self.input
    }

    pub fn world(&self) -> &ClientWorld {
        &self.world
    }

    async fn connect(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!("Connecting to server at {}", self.server_addr);
        self.send_message(&Message::Connect {
            client_version: PROTOCOL_VERSION,
        })
        .await
    }

    async fn send_message(&self, msg: &Message) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(msg)?;
        self.socket.send_to(&data, self.server_addr).await?;
        Ok(())
    }

    /// Applies one server message. The world tolerates anything out of order;
    /// only an explicit rejection stops the loop.
    fn handle_message(&mut self, msg: Message, now: Instant) {
        match msg {
            Message::Rejected { reason } => {
                warn!("Server rejected connection: {}", reason);
                self.running = false;
            }
            other => self.world.apply(other, self.scene.as_mut(), now),
        }
    }

    async fn tick(&mut self, now: Instant) {
        let dt = self.tick_duration.as_secs_f32();
        let (input, fire) = self.input.sample();
        let outgoing = self.world.tick(self.scene.as_mut(), &input, fire, dt, now);

        for msg in outgoing {
            if let Err(e) = self.send_message(&msg).await {
                error!("Failed to send to server: {}", e);
            }
        }
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.connect().await?;

        let mut tick_interval = interval(self.tick_duration);
        let mut buffer = [0u8; 2048];

        while self.running {
            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, _)) => {
                            if let Ok(msg) = deserialize::<Message>(&buffer[0..len]) {
                                self.handle_message(msg, Instant::now());
                            } else {
                                warn!("Dropping undecodable datagram");
                            }
                        }
                        Err(e) => error!("Error receiving datagram: {}", e),
                    }
                },

                _ = tick_interval.tick() => {
                    self.tick(Instant::now()).await;
                },
            }
        }

        if self.world.local_id().is_some() {
            let _ = self.send_message(&Message::Disconnect).await;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::NullScene;
    use glam::{Quat, Vec3};
    use shared::PlayerState;

    async fn local_client() -> Client {
        Client::new("127.0.0.1:9000", Box::new(NullScene))
            .await
            .expect("bind should succeed")
    }

    #[tokio::test]
    async fn test_client_binds_ephemeral_port() {
        let client = local_client().await;
        assert!(client.running);
        assert!(client.world().local_id().is_none());
    }

    #[tokio::test]
    async fn test_initialize_message_populates_world() {
        let mut client = local_client().await;
        client.handle_message(
            Message::Initialize {
                id: 4,
                players: vec![PlayerState::new(4, 0)],
            },
            Instant::now(),
        );

        assert_eq!(client.world().local_id(), Some(4));
        assert!(client.running);
    }

    #[tokio::test]
    async fn test_rejection_stops_the_loop() {
        let mut client = local_client().await;
        client.handle_message(
            Message::Rejected {
                reason: "Server full".to_string(),
            },
            Instant::now(),
        );
        assert!(!client.running);
    }

    #[tokio::test]
    async fn test_tick_before_initialize_sends_nothing() {
        let mut client = local_client().await;
        // No world yet; the tick must not panic or send
        client.tick(Instant::now()).await;
        assert!(client.world().local_id().is_none());
    }

    #[tokio::test]
    async fn test_moved_message_for_unknown_player_is_dropped() {
        let mut client = local_client().await;
        client.handle_message(
            Message::PlayerMoved {
                id: 9,
                position: Vec3::ONE,
                rotation: Quat::IDENTITY,
            },
            Instant::now(),
        );
        assert!(client.running);
    }
}

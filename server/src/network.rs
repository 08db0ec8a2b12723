//! Server network layer handling UDP communications and session coordination

use crate::clients::ClientRegistry;
use crate::session::{Outbound, Session, SessionConfig, Target};
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::Message;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;

/// Protocol version this server speaks; mismatched clients are rejected.
pub const PROTOCOL_VERSION: u32 = 1;

/// Messages sent from network tasks to the main server loop
#[derive(Debug)]
pub enum ServerMessage {
    DatagramReceived {
        msg: Message,
        addr: SocketAddr,
    },
    ClientTimeout {
        client_id: shared::PlayerId,
    },
    #[allow(dead_code)]
    Shutdown,
}

/// Messages sent from the session loop to the sender task
#[derive(Debug)]
pub enum WireMessage {
    Send {
        msg: Message,
        addr: SocketAddr,
    },
    Broadcast {
        msg: Message,
        exclude: Option<shared::PlayerId>,
    },
}

/// Main server coordinating the transport tasks and the authoritative session
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientRegistry>>,
    session: Session,
    tick_duration: Duration,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    wire_tx: mpsc::UnboundedSender<WireMessage>,
    wire_rx: mpsc::UnboundedReceiver<WireMessage>,
}

impl Server {
    pub async fn new(
        addr: &str,
        tick_duration: Duration,
        max_clients: usize,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", addr);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (wire_tx, wire_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientRegistry::new(max_clients))),
            session: Session::new(SessionConfig::default()),
            tick_duration,
            server_tx,
            server_rx,
            wire_tx,
            wire_rx,
        })
    }

    /// Spawns the task that continuously listens for incoming datagrams
    async fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 2048];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(msg) = deserialize::<Message>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::DatagramReceived { msg, addr })
                            {
                                error!("Failed to forward datagram to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Dropping undecodable datagram from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving datagram: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns the task that drains the outgoing message queue
    async fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let clients = Arc::clone(&self.clients);
        let mut wire_rx = std::mem::replace(&mut self.wire_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = wire_rx.recv().await {
                match message {
                    WireMessage::Send { msg, addr } => {
                        if let Err(e) = Self::send_message_impl(&socket, &msg, addr).await {
                            error!("Failed to send to {}: {}", addr, e);
                        }
                    }
                    WireMessage::Broadcast { msg, exclude } => {
                        let client_addrs = {
                            let clients_guard = clients.read().await;
                            clients_guard.get_client_addrs()
                        };

                        for (client_id, addr) in client_addrs {
                            if Some(client_id) == exclude {
                                continue;
                            }

                            if let Err(e) = Self::send_message_impl(&socket, &msg, addr).await {
                                error!("Failed to send to client {}: {}", client_id, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns the task that monitors client timeouts
    async fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts()
                };

                for client_id in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout { client_id }) {
                        error!("Failed to send timeout message: {}", e);
                        break;
                    }
                }
            }
        });
    }

    async fn send_message_impl(
        socket: &UdpSocket,
        msg: &Message,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(msg)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn queue_send(&self, msg: Message, addr: SocketAddr) {
        if let Err(e) = self.wire_tx.send(WireMessage::Send { msg, addr }) {
            error!("Failed to queue message for sending: {}", e);
        }
    }

    fn queue_broadcast(&self, msg: Message, exclude: Option<shared::PlayerId>) {
        if let Err(e) = self.wire_tx.send(WireMessage::Broadcast { msg, exclude }) {
            error!("Failed to queue broadcast: {}", e);
        }
    }

    /// Maps session effects onto the wire: directed sends need an address
    /// lookup, broadcast scopes go straight to the sender task.
    async fn dispatch(&self, outbound: Vec<Outbound>) {
        for effect in outbound {
            match effect.to {
                Target::One(id) => {
                    let addr = {
                        let clients = self.clients.read().await;
                        clients.addr_of(id)
                    };
                    match addr {
                        Some(addr) => self.queue_send(effect.msg, addr),
                        None => debug!("Dropping message for departed client {}", id),
                    }
                }
                Target::AllExcept(id) => self.queue_broadcast(effect.msg, Some(id)),
                Target::All => self.queue_broadcast(effect.msg, None),
            }
        }
    }

    /// Applies one inbound datagram to the session and dispatches the effects
    async fn handle_message(&mut self, msg: Message, addr: SocketAddr) {
        {
            let mut clients = self.clients.write().await;
            clients.touch(addr);
        }

        match msg {
            Message::Connect { client_version } => {
                info!(
                    "Client connecting from {} (version: {})",
                    addr, client_version
                );

                if client_version != PROTOCOL_VERSION {
                    self.queue_send(
                        Message::Rejected {
                            reason: "Protocol version mismatch".to_string(),
                        },
                        addr,
                    );
                    return;
                }

                // Remove any existing connection from this address first
                let existing_client_id = {
                    let clients = self.clients.read().await;
                    clients.find_client_by_addr(addr)
                };

                if let Some(existing_id) = existing_client_id {
                    info!("Removing existing client {} from {}", existing_id, addr);
                    {
                        let mut clients = self.clients.write().await;
                        clients.remove_client(&existing_id);
                    }
                    let out = self.session.disconnect(existing_id);
                    self.dispatch(out).await;
                }

                let client_id = {
                    let mut clients = self.clients.write().await;
                    clients.add_client(addr)
                };

                match client_id {
                    Some(client_id) => {
                        let out = self.session.connect(client_id);
                        self.dispatch(out).await;
                    }
                    None => {
                        self.queue_send(
                            Message::Rejected {
                                reason: "Server full".to_string(),
                            },
                            addr,
                        );
                    }
                }
            }

            Message::UpdatePosition { position, rotation } => {
                let client_id = {
                    let clients = self.clients.read().await;
                    clients.find_client_by_addr(addr)
                };

                if let Some(client_id) = client_id {
                    let out = self.session.update_position(client_id, position, rotation);
                    self.dispatch(out).await;
                }
            }

            Message::CreateBullet {
                id,
                position,
                velocity,
                ttl_ms,
            } => {
                let known = {
                    let clients = self.clients.read().await;
                    clients.find_client_by_addr(addr).is_some()
                };

                if known {
                    let out = self
                        .session
                        .create_bullet(id, position, velocity, ttl_ms, Instant::now());
                    self.dispatch(out).await;
                }
            }

            Message::BulletHit { bullet_id, target } => {
                let known = {
                    let clients = self.clients.read().await;
                    clients.find_client_by_addr(addr).is_some()
                };

                if known {
                    let out = self.session.bullet_hit(bullet_id, target, Instant::now());
                    self.dispatch(out).await;
                }
            }

            Message::Disconnect => {
                let client_id = {
                    let clients = self.clients.read().await;
                    clients.find_client_by_addr(addr)
                };

                if let Some(client_id) = client_id {
                    {
                        let mut clients = self.clients.write().await;
                        clients.remove_client(&client_id);
                    }
                    let out = self.session.disconnect(client_id);
                    self.dispatch(out).await;
                }
            }

            _ => {
                warn!("Unexpected message type from client at {}", addr);
            }
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_network_receiver().await;
        self.spawn_network_sender().await;
        self.spawn_timeout_checker().await;

        let mut tick_interval = interval(self.tick_duration);
        let mut tick: u64 = 0;

        info!("Server started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::DatagramReceived { msg, addr }) => {
                            self.handle_message(msg, addr).await;
                        },
                        Some(ServerMessage::ClientTimeout { client_id }) => {
                            let out = self.session.disconnect(client_id);
                            self.dispatch(out).await;
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                _ = tick_interval.tick() => {
                    let out = self.session.expire_bullets(Instant::now());
                    self.dispatch(out).await;

                    tick += 1;
                    if tick % 300 == 0 {
                        let client_count = {
                            let clients = self.clients.read().await;
                            clients.len()
                        };
                        if client_count > 0 {
                            debug!(
                                "Tick {}: {} clients, {} bullets in flight",
                                tick,
                                client_count,
                                self.session.bullet_count()
                            );
                        }
                    }
                },
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use shared::BulletId;
    use std::net::{IpAddr, Ipv4Addr};
    use tokio::sync::mpsc;

    #[test]
    fn test_server_message_creation() {
        let msg = Message::Connect {
            client_version: PROTOCOL_VERSION,
        };
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 8080);

        let event = ServerMessage::DatagramReceived {
            msg: msg.clone(),
            addr,
        };

        match event {
            ServerMessage::DatagramReceived { msg: m, addr: a } => {
                assert_eq!(a, addr);
                match m {
                    Message::Connect { client_version } => {
                        assert_eq!(client_version, PROTOCOL_VERSION);
                    }
                    _ => panic!("Unexpected message type"),
                }
            }
            _ => panic!("Unexpected event type"),
        }
    }

    #[test]
    fn test_wire_message_broadcast_exclusion() {
        let msg = Message::BulletRemoved {
            id: BulletId {
                owner: 5,
                spawn_micros: 7,
            },
        };

        let wire = WireMessage::Broadcast {
            msg,
            exclude: Some(5),
        };

        match wire {
            WireMessage::Broadcast { exclude, .. } => assert_eq!(exclude, Some(5)),
            _ => panic!("Unexpected wire message type"),
        }
    }

    #[test]
    fn test_channel_communication() {
        let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 8080);
        let event = ServerMessage::DatagramReceived {
            msg: Message::UpdatePosition {
                position: Vec3::new(1.0, 2.0, 3.0),
                rotation: glam::Quat::IDENTITY,
            },
            addr,
        };

        assert!(tx.send(event).is_ok());

        match rx.try_recv() {
            Ok(ServerMessage::DatagramReceived { msg, addr: a }) => {
                assert_eq!(a, addr);
                assert!(matches!(msg, Message::UpdatePosition { .. }));
            }
            _ => panic!("Expected a datagram event"),
        }
    }

    #[test]
    fn test_datagram_roundtrip() {
        let messages = vec![
            Message::Connect {
                client_version: PROTOCOL_VERSION,
            },
            Message::Disconnect,
            Message::BulletHit {
                bullet_id: BulletId {
                    owner: 1,
                    spawn_micros: 99,
                },
                target: 2,
            },
            Message::Rejected {
                reason: "Server full".to_string(),
            },
        ];

        for msg in messages {
            let bytes = serialize(&msg).unwrap();
            assert!(bytes.len() < 2048, "Datagram exceeds receive buffer");
            let decoded: Message = deserialize(&bytes).unwrap();

            match (&msg, &decoded) {
                (Message::Connect { .. }, Message::Connect { .. }) => {}
                (Message::Disconnect, Message::Disconnect) => {}
                (Message::BulletHit { .. }, Message::BulletHit { .. }) => {}
                (Message::Rejected { .. }, Message::Rejected { .. }) => {}
                _ => panic!("Message type mismatch after roundtrip"),
            }
        }
    }
}

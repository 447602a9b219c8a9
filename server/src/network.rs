//! Server network layer handling UDP communication and relay dispatch

use crate::client_manager::ClientManager;
use crate::config::ServerConfig;
use crate::registry::Registry;
use crate::router::{Delivery, Outbound, Router};
use log::{debug, error, info, warn};
use shared::{decode, encode, ClientId, Packet, MAX_PACKET_SIZE, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::interval;

pub type ServerResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Messages sent from network tasks to the main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    ClientTimeout { client_id: ClientId },
    Shutdown,
}

/// One encoded-once packet and every address that should receive it
#[derive(Debug)]
pub struct Outgoing {
    pub packet: Packet,
    pub addrs: Vec<SocketAddr>,
}

/// A snapshot waiting in the volatile queue, stamped when it was queued
#[derive(Debug)]
pub struct Queued {
    pub queued_at: Instant,
    pub message: Outgoing,
}

impl Queued {
    fn new(message: Outgoing) -> Self {
        Self {
            queued_at: Instant::now(),
            message,
        }
    }

    /// The message, unless it sat in the queue longer than `max_age`
    pub fn fresh(self, max_age: Duration) -> Option<Outgoing> {
        (self.queued_at.elapsed() <= max_age).then_some(self.message)
    }
}

/// Stops a running [`Server`] from another task
#[derive(Clone)]
pub struct ShutdownHandle(mpsc::UnboundedSender<ServerMessage>);

impl ShutdownHandle {
    pub fn shutdown(&self) {
        if self.0.send(ServerMessage::Shutdown).is_err() {
            debug!("Server already stopped");
        }
    }
}

/// UDP relay: one main loop owning the router, plus receiver, sender and timeout tasks
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    router: Router,
    config: ServerConfig,
    tasks: Vec<JoinHandle<()>>,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    reliable_tx: mpsc::UnboundedSender<Outgoing>,
    reliable_rx: Option<mpsc::UnboundedReceiver<Outgoing>>,
    volatile_tx: mpsc::Sender<Queued>,
    volatile_rx: Option<mpsc::Receiver<Queued>>,
}

impl Server {
    pub async fn new(config: ServerConfig) -> ServerResult<Self> {
        let socket = Arc::new(UdpSocket::bind(&config.bind_addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let registry = match config.rng_seed {
            Some(seed) => Registry::with_seed(config.default_capacity, seed),
            None => Registry::new(config.default_capacity),
        };
        let router = Router::new(registry, &config.admin_password);
        let clients = ClientManager::new(config.max_clients, config.client_timeout);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (reliable_tx, reliable_rx) = mpsc::unbounded_channel();
        let (volatile_tx, volatile_rx) = mpsc::channel(config.volatile_queue.max(1));

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(clients)),
            router,
            config,
            tasks: Vec::new(),
            server_tx,
            server_rx,
            reliable_tx,
            reliable_rx: Some(reliable_rx),
            volatile_tx,
            volatile_rx: Some(volatile_rx),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(self.server_tx.clone())
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&mut self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        self.tasks.push(tokio::spawn(async move {
            let mut buffer = vec![0u8; MAX_PACKET_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => match decode(&buffer[..len]) {
                        Ok(packet) => {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        }
                        Err(e) => warn!("Rejected datagram from {}: {}", addr, e),
                    },
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        }));
    }

    /// Spawns task that drains both outgoing queues, reliable first
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let max_age = self.config.snapshot_max_age;
        let (Some(mut reliable_rx), Some(mut volatile_rx)) =
            (self.reliable_rx.take(), self.volatile_rx.take())
        else {
            warn!("Network sender already running");
            return;
        };

        self.tasks.push(tokio::spawn(async move {
            loop {
                let message = tokio::select! {
                    biased;
                    Some(message) = reliable_rx.recv() => message,
                    Some(queued) = volatile_rx.recv() => match queued.fresh(max_age) {
                        Some(message) => message,
                        None => {
                            debug!("Discarding stale snapshot");
                            continue;
                        }
                    },
                    else => break,
                };
                Self::send_impl(&socket, &message).await;
            }
        }));
    }

    /// Spawns task that monitors client timeouts
    fn spawn_timeout_checker(&mut self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        self.tasks.push(tokio::spawn(async move {
            let mut interval = interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts()
                };

                for client_id in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout { client_id }) {
                        error!("Failed to send timeout message: {}", e);
                        return;
                    }
                }
            }
        }));
    }

    async fn send_impl(socket: &UdpSocket, message: &Outgoing) {
        let data = match encode(&message.packet) {
            Ok(data) => data,
            Err(e) => {
                error!("Failed to encode outgoing packet: {}", e);
                return;
            }
        };

        for addr in &message.addrs {
            if let Err(e) = socket.send_to(&data, addr).await {
                error!("Failed to send packet to {}: {}", addr, e);
            }
        }
    }

    fn queue(&self, message: Outgoing, delivery: Delivery) {
        match delivery {
            Delivery::Reliable => {
                if let Err(e) = self.reliable_tx.send(message) {
                    error!("Failed to queue packet for sending: {}", e);
                }
            }
            Delivery::Volatile => match self.volatile_tx.try_send(Queued::new(message)) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => debug!("Snapshot queue full, dropping snapshot"),
                Err(TrySendError::Closed(_)) => error!("Snapshot queue closed"),
            },
        }
    }

    fn send_to_addr(&self, packet: Packet, addr: SocketAddr) {
        self.queue(
            Outgoing {
                packet,
                addrs: vec![addr],
            },
            Delivery::Reliable,
        );
    }

    /// Resolves router output to addresses and queues it
    async fn dispatch(&self, outbound: Vec<Outbound>) {
        for item in outbound {
            match item {
                Outbound::Deliver {
                    audience,
                    packet,
                    delivery,
                } => {
                    let recipients = self.router.resolve(&audience);
                    let addrs: Vec<SocketAddr> = {
                        let clients = self.clients.read().await;
                        recipients
                            .into_iter()
                            .filter_map(|id| clients.addr_of(id))
                            .collect()
                    };
                    if !addrs.is_empty() {
                        self.queue(Outgoing { packet, addrs }, delivery);
                    }
                }
                Outbound::Drop { client_id } => {
                    let mut clients = self.clients.write().await;
                    clients.remove_client(&client_id);
                }
            }
        }
    }

    async fn disconnect_client(&mut self, client_id: ClientId) {
        {
            let mut clients = self.clients.write().await;
            clients.remove_client(&client_id);
        }
        let outbound = self.router.handle_disconnect(client_id);
        self.dispatch(outbound).await;
    }

    /// Handles connection lifecycle here and hands everything else to the router
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Connect { client_version } => {
                info!(
                    "Client connecting from {} (version: {})",
                    addr, client_version
                );

                if client_version != PROTOCOL_VERSION {
                    warn!("Rejecting client version {} from {}", client_version, addr);
                    self.send_to_addr(
                        Packet::Disconnected {
                            reason: "Incompatible client version".to_string(),
                        },
                        addr,
                    );
                    return;
                }

                // Remove existing connection if present
                let existing_client_id = {
                    let clients = self.clients.read().await;
                    clients.find_client_by_addr(addr)
                };
                if let Some(existing_id) = existing_client_id {
                    info!("Removing existing client {} from {}", existing_id, addr);
                    self.disconnect_client(existing_id).await;
                }

                let client_id = {
                    let mut clients = self.clients.write().await;
                    clients.add_client(addr)
                };

                let response = match client_id {
                    Some(client_id) => Packet::Connected { client_id },
                    None => Packet::Disconnected {
                        reason: "Server full".to_string(),
                    },
                };
                self.send_to_addr(response, addr);
            }

            Packet::Disconnect => {
                let client_id = {
                    let clients = self.clients.read().await;
                    clients.find_client_by_addr(addr)
                };
                if let Some(client_id) = client_id {
                    self.disconnect_client(client_id).await;
                }
            }

            packet => {
                let client_id = {
                    let mut clients = self.clients.write().await;
                    let client_id = clients.find_client_by_addr(addr);
                    if let Some(client_id) = client_id {
                        clients.touch(client_id);
                    }
                    client_id
                };

                match client_id {
                    Some(client_id) => {
                        let outbound = self.router.handle_packet(client_id, Some(addr), packet);
                        self.dispatch(outbound).await;
                    }
                    None => warn!("Packet from unconnected address {}", addr),
                }
            }
        }
    }

    /// Main server loop; returns after a shutdown request
    pub async fn run(&mut self) -> ServerResult<()> {
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();

        let mut lobby_interval = interval(self.config.lobby_refresh);

        info!("Server started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        }
                        Some(ServerMessage::ClientTimeout { client_id }) => {
                            info!("Client {} timed out", client_id);
                            let outbound = self.router.handle_disconnect(client_id);
                            self.dispatch(outbound).await;
                        }
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                }

                _ = lobby_interval.tick() => {
                    let connected = {
                        let clients = self.clients.read().await;
                        clients.client_ids()
                    };
                    let outbound = self.router.lobby_refresh(&connected);
                    if !outbound.is_empty() {
                        debug!("Refreshing room list for {} lobby clients", outbound.len());
                    }
                    self.dispatch(outbound).await;
                }
            }
        }

        for task in self.tasks.drain(..) {
            task.abort();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{MovementSnapshot, DEFAULT_ROOM_ID};
    use tokio_test::assert_ok;

    fn test_config() -> ServerConfig {
        ServerConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            rng_seed: Some(1),
            volatile_queue: 1,
            ..ServerConfig::default()
        }
    }

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn drain_reliable(server: &mut Server) -> Vec<Outgoing> {
        let rx = server.reliable_rx.as_mut().unwrap();
        let mut sent = Vec::new();
        while let Ok(message) = rx.try_recv() {
            sent.push(message);
        }
        sent
    }

    async fn connect_and_join(server: &mut Server, port: u16, name: &str) {
        server
            .handle_packet(
                Packet::Connect {
                    client_version: PROTOCOL_VERSION,
                },
                addr(port),
            )
            .await;
        server
            .handle_packet(
                Packet::RegisterPlayer {
                    username: name.to_string(),
                    room_id: None,
                },
                addr(port),
            )
            .await;
    }

    #[test]
    fn test_server_message_creation() {
        let msg = ServerMessage::PacketReceived {
            packet: Packet::Connect { client_version: 1 },
            addr: addr(8080),
        };

        match msg {
            ServerMessage::PacketReceived { packet, addr: a } => {
                assert_eq!(a, addr(8080));
                assert_eq!(packet, Packet::Connect { client_version: 1 });
            }
            _ => panic!("Unexpected message type"),
        }
    }

    #[tokio::test]
    async fn test_server_binds_ephemeral_port() {
        let server = assert_ok!(Server::new(test_config()).await);
        assert_ne!(server.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn test_connect_handshake() {
        let mut server = assert_ok!(Server::new(test_config()).await);

        server
            .handle_packet(
                Packet::Connect {
                    client_version: PROTOCOL_VERSION,
                },
                addr(9001),
            )
            .await;

        let sent = drain_reliable(&mut server);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].packet, Packet::Connected { client_id: 1 });
        assert_eq!(sent[0].addrs, vec![addr(9001)]);
    }

    #[tokio::test]
    async fn test_wrong_version_rejected() {
        let mut server = assert_ok!(Server::new(test_config()).await);

        server
            .handle_packet(Packet::Connect { client_version: 999 }, addr(9001))
            .await;

        let sent = drain_reliable(&mut server);
        assert!(matches!(sent[0].packet, Packet::Disconnected { .. }));
        assert!(server.clients.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_reconnect_cleans_previous_membership() {
        let mut server = assert_ok!(Server::new(test_config()).await);
        connect_and_join(&mut server, 9001, "Rex").await;
        assert_eq!(server.router.registry().members(DEFAULT_ROOM_ID), vec![1]);

        server
            .handle_packet(
                Packet::Connect {
                    client_version: PROTOCOL_VERSION,
                },
                addr(9001),
            )
            .await;

        assert!(server.router.registry().members(DEFAULT_ROOM_ID).is_empty());
        assert_eq!(server.clients.read().await.client_ids(), vec![2]);
    }

    #[tokio::test]
    async fn test_unconnected_sender_ignored() {
        let mut server = assert_ok!(Server::new(test_config()).await);

        server.handle_packet(Packet::GetRooms, addr(9001)).await;

        assert!(drain_reliable(&mut server).is_empty());
    }

    #[tokio::test]
    async fn test_snapshots_dropped_when_queue_full() {
        let mut server = assert_ok!(Server::new(test_config()).await);
        connect_and_join(&mut server, 9001, "a").await;
        connect_and_join(&mut server, 9002, "b").await;

        for step in 0..3 {
            let snapshot = MovementSnapshot {
                rotation: step as f32,
                ..MovementSnapshot::default()
            };
            server
                .handle_packet(Packet::PlayerMovement(snapshot), addr(9001))
                .await;
        }

        // Capacity 1: the first snapshot is queued, later ones are discarded
        let rx = server.volatile_rx.as_mut().unwrap();
        let first = rx.try_recv().unwrap().message;
        assert!(rx.try_recv().is_err());
        assert_eq!(first.addrs, vec![addr(9002)]);
        match first.packet {
            Packet::PlayerMoved { player_id, snapshot } => {
                assert_eq!(player_id, 1);
                assert_eq!(snapshot.rotation, 0.0);
            }
            other => panic!("Unexpected packet {:?}", other),
        }
    }

    #[test]
    fn test_stale_snapshots_are_not_sent() {
        let max_age = ServerConfig::default().snapshot_max_age;
        let outgoing = || Outgoing {
            packet: Packet::PlayerMoved {
                player_id: 1,
                snapshot: MovementSnapshot::default(),
            },
            addrs: vec![addr(9002)],
        };

        let fresh = Queued::new(outgoing());
        assert!(fresh.fresh(max_age).is_some());

        let stale = Queued {
            queued_at: Instant::now()
                .checked_sub(Duration::from_millis(500))
                .unwrap(),
            message: outgoing(),
        };
        assert!(stale.fresh(max_age).is_none());
    }

    #[test]
    fn test_snapshot_backlog_is_short() {
        let config = ServerConfig::default();
        // One full room's worth of snapshots, all younger than two send intervals
        assert!(config.volatile_queue <= shared::DEFAULT_ROOM_CAPACITY);
        assert!(config.snapshot_max_age <= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_disconnect_notifies_room() {
        let mut server = assert_ok!(Server::new(test_config()).await);
        connect_and_join(&mut server, 9001, "a").await;
        connect_and_join(&mut server, 9002, "b").await;
        drain_reliable(&mut server);

        server.handle_packet(Packet::Disconnect, addr(9001)).await;

        let sent = drain_reliable(&mut server);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].packet, Packet::DisconnectPlayer { player_id: 1 });
        assert_eq!(sent[0].addrs, vec![addr(9002)]);
    }

    #[tokio::test]
    async fn test_shutdown_stops_run_loop() {
        let mut server = assert_ok!(Server::new(test_config()).await);
        let handle = server.shutdown_handle();
        handle.shutdown();

        let result = tokio::time::timeout(Duration::from_secs(2), server.run()).await;
        assert!(matches!(result, Ok(Ok(()))));
    }
}

//! UDP transport for the client
//!
//! The render loop is synchronous, so the socket lives on a dedicated thread
//! running a small tokio runtime. Packets cross the boundary over channels:
//! snapshots through a bounded queue that drops when full, everything else
//! through an unbounded one.

use log::{debug, error, info, warn};
use shared::{decode, encode, Packet, MAX_PACKET_SIZE};
use std::net::SocketAddr;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, sleep};

pub type NetworkResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub server_addr: String,
    /// Simulated latency, split evenly between send and receive
    pub fake_ping_ms: u64,
    pub volatile_queue: usize,
    pub heartbeat: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:8080".to_string(),
            fake_ping_ms: 0,
            volatile_queue: 8,
            heartbeat: Duration::from_secs(1),
        }
    }
}

struct Channels {
    reliable_rx: mpsc::UnboundedReceiver<Packet>,
    volatile_rx: mpsc::Receiver<Packet>,
    inbound_tx: mpsc::UnboundedSender<Packet>,
    shutdown_rx: oneshot::Receiver<()>,
}

#[derive(Debug)]
pub struct NetworkHandle {
    reliable_tx: mpsc::UnboundedSender<Packet>,
    volatile_tx: mpsc::Sender<Packet>,
    inbound_rx: mpsc::UnboundedReceiver<Packet>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
    dropped_snapshots: u64,
    fake_ping_ms: u64,
}

impl NetworkHandle {
    /// Binds a socket and starts the transport thread
    pub fn spawn(config: NetworkConfig) -> NetworkResult<Self> {
        let server_addr: SocketAddr = config.server_addr.parse()?;

        let (reliable_tx, reliable_rx) = mpsc::unbounded_channel();
        let (volatile_tx, volatile_rx) = mpsc::channel(config.volatile_queue.max(1));
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let channels = Channels {
            reliable_rx,
            volatile_rx,
            inbound_tx,
            shutdown_rx,
        };
        let fake_ping_ms = config.fake_ping_ms;
        let heartbeat = config.heartbeat;

        let thread = std::thread::Builder::new()
            .name("network".to_string())
            .spawn(move || {
                runtime.block_on(async move {
                    let result = run_transport(server_addr, fake_ping_ms, heartbeat, channels).await;
                    if let Err(e) = result {
                        error!("Transport stopped: {}", e);
                    }
                });
            })?;

        info!("Transport started for {}", server_addr);

        Ok(Self {
            reliable_tx,
            volatile_tx,
            inbound_rx,
            shutdown_tx: Some(shutdown_tx),
            thread: Some(thread),
            dropped_snapshots: 0,
            fake_ping_ms,
        })
    }

    /// Queues a packet; returns false if it was dropped
    pub fn send(&mut self, packet: Packet) -> bool {
        if !packet.is_volatile() {
            return self.reliable_tx.send(packet).is_ok();
        }

        match self.volatile_tx.try_send(packet) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.dropped_snapshots += 1;
                debug!("Snapshot queue full, dropped ({} total)", self.dropped_snapshots);
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Next received packet, if any, without blocking
    pub fn try_recv(&mut self) -> Option<Packet> {
        self.inbound_rx.try_recv().ok()
    }

    pub fn dropped_snapshots(&self) -> u64 {
        self.dropped_snapshots
    }

    pub fn fake_ping_ms(&self) -> u64 {
        self.fake_ping_ms
    }

    /// Stops the transport after flushing what is already queued
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Transport thread panicked");
            }
        }
    }
}

impl Drop for NetworkHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn send_packet(socket: &UdpSocket, packet: &Packet, fake_ping_ms: u64) {
    if fake_ping_ms > 0 {
        sleep(Duration::from_millis(fake_ping_ms / 2)).await;
    }

    match encode(packet) {
        Ok(data) => {
            if let Err(e) = socket.send(&data).await {
                error!("Error sending packet: {}", e);
            }
        }
        Err(e) => warn!("Refusing to send packet: {}", e),
    }
}

async fn run_transport(
    server_addr: SocketAddr,
    fake_ping_ms: u64,
    heartbeat: Duration,
    channels: Channels,
) -> NetworkResult<()> {
    let Channels {
        mut reliable_rx,
        mut volatile_rx,
        inbound_tx,
        mut shutdown_rx,
    } = channels;

    let bind_addr = if server_addr.is_ipv4() {
        "0.0.0.0:0"
    } else {
        "[::]:0"
    };
    let socket = UdpSocket::bind(bind_addr).await?;
    socket.connect(server_addr).await?;

    let mut heartbeat = interval(heartbeat);
    let mut buffer = vec![0u8; MAX_PACKET_SIZE];

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown_rx => {
                // Flush reliable traffic such as a final Disconnect
                while let Ok(packet) = reliable_rx.try_recv() {
                    send_packet(&socket, &packet, 0).await;
                }
                break;
            }

            Some(packet) = reliable_rx.recv() => {
                send_packet(&socket, &packet, fake_ping_ms).await;
            }

            Some(packet) = volatile_rx.recv() => {
                send_packet(&socket, &packet, fake_ping_ms).await;
            }

            result = socket.recv(&mut buffer) => {
                match result {
                    Ok(len) => {
                        if fake_ping_ms > 0 {
                            sleep(Duration::from_millis(fake_ping_ms / 2)).await;
                        }

                        match decode(&buffer[..len]) {
                            Ok(packet) => {
                                if inbound_tx.send(packet).is_err() {
                                    break;
                                }
                            }
                            Err(e) => warn!("Dropping malformed packet from server: {}", e),
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        sleep(Duration::from_millis(100)).await;
                    }
                }
            }

            _ = heartbeat.tick() => {
                send_packet(&socket, &Packet::Heartbeat, 0).await;
            }
        }
    }

    info!("Transport closed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::MovementSnapshot;
    use tokio_test::assert_err;

    #[test]
    fn test_invalid_address_rejected() {
        let config = NetworkConfig {
            server_addr: "not an address".to_string(),
            ..NetworkConfig::default()
        };
        assert_err!(NetworkHandle::spawn(config));
    }

    #[test]
    fn test_echo_roundtrip() {
        let echo = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        echo.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let addr = echo.local_addr().unwrap();

        let mut handle = NetworkHandle::spawn(NetworkConfig {
            server_addr: addr.to_string(),
            heartbeat: Duration::from_secs(60),
            ..NetworkConfig::default()
        })
        .unwrap();

        assert!(handle.send(Packet::GetRooms));

        // The first datagram may be the initial heartbeat tick
        let mut buf = [0u8; 2048];
        let mut echoed = false;
        for _ in 0..3 {
            let (len, from) = echo.recv_from(&mut buf).unwrap();
            if decode(&buf[..len]).unwrap() == Packet::GetRooms {
                echo.send_to(&buf[..len], from).unwrap();
                echoed = true;
                break;
            }
        }
        assert!(echoed);

        let mut received = None;
        for _ in 0..100 {
            if let Some(packet) = handle.try_recv() {
                received = Some(packet);
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(received, Some(Packet::GetRooms));
        handle.shutdown();
    }

    #[test]
    fn test_send_after_shutdown_fails() {
        let mut handle = NetworkHandle::spawn(NetworkConfig {
            server_addr: "127.0.0.1:9".to_string(),
            volatile_queue: 2,
            ..NetworkConfig::default()
        })
        .unwrap();
        handle.shutdown();

        assert!(!handle.send(Packet::PlayerMovement(MovementSnapshot::default())));
        assert!(!handle.send(Packet::Heartbeat));
        assert_eq!(handle.dropped_snapshots(), 0);
        assert!(handle.try_recv().is_none());
    }
}

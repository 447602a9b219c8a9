use shared::{DEFAULT_ROOM_CAPACITY, SNAPSHOT_INTERVAL_MS};
use std::time::Duration;

/// Runtime settings for the relay
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub max_clients: usize,
    /// Silence after which a connection is cleaned up
    pub client_timeout: Duration,
    /// How often lobby connections receive the public room list
    pub lobby_refresh: Duration,
    pub admin_password: String,
    pub default_capacity: usize,
    /// Snapshot backlog allowed before new snapshots are dropped
    pub volatile_queue: usize,
    /// Queued snapshots older than this are discarded instead of sent
    pub snapshot_max_age: Duration,
    /// Fixed seed for join codes; random when unset
    pub rng_seed: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            max_clients: 64,
            client_timeout: Duration::from_secs(5),
            lobby_refresh: Duration::from_secs(2),
            admin_password: "placeholder".to_string(),
            default_capacity: DEFAULT_ROOM_CAPACITY,
            volatile_queue: DEFAULT_ROOM_CAPACITY,
            snapshot_max_age: Duration::from_millis(SNAPSHOT_INTERVAL_MS * 2),
            rng_seed: None,
        }
    }
}

use clap::Parser;
use log::info;
use server::config::ServerConfig;
use server::network::Server;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Maximum concurrent connections
    #[arg(short, long, default_value = "64")]
    max_connections: usize,

    /// Seconds of silence before a connection is dropped
    #[arg(long, default_value = "5")]
    timeout_secs: u64,

    /// Interval for pushing room lists to lobby clients
    #[arg(long, default_value = "2000")]
    lobby_refresh_ms: u64,

    /// Password for the administrative observer channel
    #[arg(long, default_value = "placeholder")]
    admin_password: String,

    /// Capacity of the permanent default room
    #[arg(long, default_value = "16")]
    default_capacity: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::init();

    let args = Args::parse();

    let config = ServerConfig {
        bind_addr: format!("{}:{}", args.host, args.port),
        max_clients: args.max_connections,
        client_timeout: Duration::from_secs(args.timeout_secs),
        lobby_refresh: Duration::from_millis(args.lobby_refresh_ms),
        admin_password: args.admin_password,
        default_capacity: args.default_capacity,
        ..ServerConfig::default()
    };

    info!(
        "Starting relay on {} (max {} connections)",
        config.bind_addr, config.max_clients
    );

    let mut server = Server::new(config).await?;
    server.run().await?;

    Ok(())
}

use clap::Parser;
use client::game::{ClientGame, JoinRequest, Session};
use client::input::InputManager;
use client::network::{NetworkConfig, NetworkHandle};
use client::rendering::{HudInfo, Renderer};
use client::world::ArenaWorld;
use log::{error, info};
use macroquad::prelude::*;
use shared::SPAWN_POSITION;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Name shown to other players
    #[arg(short = 'u', long, default_value = "Player")]
    username: String,

    /// Public room to join; the default room when omitted
    #[arg(short = 'r', long)]
    room: Option<String>,

    /// Join code of a private room, takes precedence over --room
    #[arg(short = 'c', long)]
    code: Option<String>,

    /// Stay in the lobby instead of joining a room
    #[arg(long)]
    lobby: bool,

    /// Simulate network latency in milliseconds
    #[arg(short = 'l', long, default_value = "0")]
    fake_ping: u64,

    /// Window width
    #[arg(short = 'w', long, default_value = "800")]
    width: usize,

    /// Window height (no short flag to avoid conflict with --help)
    #[arg(long, default_value = "600")]
    height: usize,
}

impl Args {
    fn join_request(&self) -> JoinRequest {
        match (&self.code, self.lobby) {
            (Some(code), _) => JoinRequest::Code(code.clone()),
            (None, true) => JoinRequest::None,
            (None, false) => JoinRequest::Room(self.room.clone()),
        }
    }
}

const ROOM_KEYS: [KeyCode; 9] = [
    KeyCode::Key1,
    KeyCode::Key2,
    KeyCode::Key3,
    KeyCode::Key4,
    KeyCode::Key5,
    KeyCode::Key6,
    KeyCode::Key7,
    KeyCode::Key8,
    KeyCode::Key9,
];

fn main() {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let conf = Conf {
        window_title: format!("Arena - {}", args.username),
        window_width: args.width as i32,
        window_height: args.height as i32,
        ..Default::default()
    };

    macroquad::Window::from_config(conf, run(args));
}

async fn run(args: Args) {
    info!("Connecting to: {}", args.server);
    if args.fake_ping > 0 {
        info!("Simulating {}ms latency", args.fake_ping);
    }

    let mut network = match NetworkHandle::spawn(NetworkConfig {
        server_addr: args.server.clone(),
        fake_ping_ms: args.fake_ping,
        ..NetworkConfig::default()
    }) {
        Ok(network) => network,
        Err(e) => {
            error!("Failed to start networking: {}", e);
            return;
        }
    };

    let mut game = ClientGame::new(
        ArenaWorld::new(SPAWN_POSITION),
        &args.username,
        args.join_request(),
    );
    let mut input = InputManager::new();
    let mut renderer = Renderer::new(args.width, args.height);

    loop {
        while let Some(packet) = network.try_recv() {
            game.handle_packet(packet);
        }

        if is_key_pressed(KeyCode::Escape) {
            if game.in_room() {
                game.leave_room();
            } else {
                game.disconnect();
            }
        }

        if *game.session() == Session::Lobby {
            let picked = ROOM_KEYS
                .iter()
                .position(|key| is_key_pressed(*key))
                .and_then(|i| game.available_rooms().get(i))
                .map(|room| room.id.clone());
            if let Some(room_id) = picked {
                game.join(JoinRequest::Room(Some(room_id)));
            }
        }

        for command in input.update() {
            game.apply_command(command);
        }
        game.frame(get_frame_time());

        for packet in game.drain_outbox() {
            network.send(packet);
        }

        let hud = HudInfo {
            fake_ping_ms: network.fake_ping_ms(),
            dropped_snapshots: network.dropped_snapshots(),
        };
        renderer.render(&game, &hud);

        if game.is_closed() && is_key_pressed(KeyCode::Escape) {
            break;
        }

        next_frame().await;
    }

    network.shutdown();
}

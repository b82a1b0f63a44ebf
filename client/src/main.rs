use clap::Parser;
use client::game::{ClientGame, Mode};
use client::input::InputManager;
use client::network::{ClientCommand, ClientConfig, Connection};
use client::rendering::{HudInfo, Renderer};
use log::info;
use macroquad::prelude::*;
use shared::{sanitize_player_name, Ranking};

const LEADERBOARD_LIMIT: u8 = 10;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Display name shown to the opponent and on the leaderboard
    #[arg(short = 'n', long, default_value = "")]
    name: String,

    /// Simulate network latency in milliseconds
    #[arg(short = 'l', long, default_value = "0")]
    fake_ping: u64,

    /// Start in local two-player mode without connecting
    #[arg(long)]
    offline: bool,

    /// Window width
    #[arg(short = 'w', long, default_value = "1280")]
    width: i32,

    /// Window height (no short flag to avoid conflict with --help)
    #[arg(long, default_value = "720")]
    height: i32,
}

impl Args {
    fn client_config(&self) -> ClientConfig {
        ClientConfig {
            server_addr: self.server.clone(),
            player_name: sanitize_player_name(&self.name, ""),
            fake_ping_ms: self.fake_ping,
            ..Default::default()
        }
    }
}

fn window_conf() -> Conf {
    let args = Args::parse();
    Conf {
        window_title: "Pong".to_string(),
        window_width: args.width,
        window_height: args.height,
        ..Default::default()
    }
}

#[macroquad::main(window_conf)]
async fn main() {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let config = args.client_config();

    info!("Starting client...");
    if args.offline {
        info!("Offline mode: W/S for the left paddle, Up/Down for the right");
    } else {
        info!("Connecting to: {}", config.server_addr);
        if args.fake_ping > 0 {
            info!("Simulating {}ms latency", args.fake_ping);
        }
        info!("Controls: W/S or Up/Down to move");
    }
    info!("Press O to switch online/offline, R to reconnect");
    info!("Press L for the leaderboard, Tab to switch its ranking");

    let mode = if args.offline {
        Mode::Offline
    } else {
        Mode::Online
    };
    let mut game = ClientGame::new(mode);
    let mut connection = (mode == Mode::Online).then(|| Connection::spawn(config.clone()));
    let mut input = InputManager::new();
    let mut renderer = Renderer::new();
    let mut ranking = Ranking::Wins;

    loop {
        let dt = get_frame_time();
        let (toggles, controls, to_send) = input.update();

        if toggles.offline {
            match game.mode() {
                Mode::Online => {
                    // Dropping the connection sends Disconnect.
                    connection = None;
                    game.set_mode(Mode::Offline);
                }
                Mode::Offline => {
                    game.set_mode(Mode::Online);
                    connection = Some(Connection::spawn(config.clone()));
                }
            }
        }

        if toggles.reconnect {
            info!("Reconnecting...");
            drop(connection.take());
            game.set_mode(Mode::Online);
            connection = Some(Connection::spawn(config.clone()));
        }

        let mut request_leaderboard = false;
        if toggles.ranking {
            ranking = match ranking {
                Ranking::Wins => Ranking::WinRate,
                Ranking::WinRate => Ranking::Wins,
            };
            request_leaderboard = game.leaderboard.is_some();
        }
        if toggles.leaderboard {
            if game.leaderboard.take().is_none() {
                request_leaderboard = true;
            }
        }

        let mut alive = true;
        if let Some(conn) = &mut connection {
            for event in conn.drain_events() {
                alive &= game.handle_network_event(event);
            }
            if request_leaderboard {
                conn.send(ClientCommand::RequestLeaderboard {
                    ranking,
                    limit: LEADERBOARD_LIMIT,
                });
            }
            if let (Some(direction), Some(_)) = (to_send, game.local_id()) {
                conn.send(ClientCommand::Input(direction));
            }
        }
        if !alive {
            connection = None;
        }

        game.update(dt, &controls);

        let snapshot = game.display_snapshot();
        let hud = HudInfo {
            mode: game.mode(),
            client_id: game.local_id(),
            status: &game.status,
            latency_ms: game.latency_ms,
            fake_ping_ms: args.fake_ping,
            leaderboard: game.leaderboard.as_ref(),
        };
        renderer.render(snapshot.as_ref(), &hud);

        next_frame().await;
    }
}

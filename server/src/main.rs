use clap::Parser;
use log::{error, info};
use server::game::MatchConfig;
use server::network::{Server, ServerConfig, ServerMessage};
use server::room::RoomConfig;
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

    /// Simulation ticks per second
    #[arg(short, long, default_value = "60")]
    tick_rate: u32,

    /// Maximum number of connected clients
    #[arg(short, long, default_value = "32")]
    max_clients: usize,

    /// Points needed to win a match
    #[arg(long, default_value = "5")]
    winning_score: u32,

    /// Pause before each serve, in milliseconds
    #[arg(long, default_value = "1000")]
    serve_delay_ms: u64,

    /// Seconds of silence before a client is dropped
    #[arg(long, default_value = "5")]
    client_timeout_secs: u64,

    /// Disable power-ups
    #[arg(long)]
    no_powerups: bool,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        ServerConfig {
            addr: format!("{}:{}", self.host, self.port),
            max_clients: self.max_clients,
            client_timeout: Duration::from_secs(self.client_timeout_secs),
            room: RoomConfig {
                tick_rate: self.tick_rate.max(1),
                rules: MatchConfig {
                    winning_score: self.winning_score.max(1),
                    serve_delay_ms: self.serve_delay_ms,
                    powerups_enabled: !self.no_powerups,
                },
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let config = Args::parse().into_config();
    info!(
        "Starting pong server on {} ({} Hz, first to {})",
        config.addr, config.room.tick_rate, config.room.rules.winning_score
    );

    let mut server = Server::new(config).await?;
    let control = server.control();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down gracefully...");
            if control.send(ServerMessage::Shutdown).is_err() {
                error!("Server loop already stopped");
            }
        }
    });

    server.run().await?;
    Ok(())
}

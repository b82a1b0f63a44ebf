use crate::game::Mode;
use macroquad::prelude::*;
use shared::{
    physics, LeaderboardEntry, MatchSnapshot, PaddleSnapshot, Phase, PlayerSide, PowerUpKind,
    Ranking, BALL_SIZE, GAME_HEIGHT, GAME_WIDTH, PADDLE_WIDTH, POWERUP_SIZE,
};

#[derive(Debug, Clone)]
pub struct HudInfo<'a> {
    pub mode: Mode,
    pub client_id: Option<u32>,
    pub status: &'a str,
    pub latency_ms: Option<u64>,
    pub fake_ping_ms: u64,
    pub leaderboard: Option<&'a (Ranking, Vec<LeaderboardEntry>)>,
}

/// Draws match snapshots scaled from field coordinates to the window.
pub struct Renderer {
    scale: f32,
    offset_x: f32,
    offset_y: f32,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

fn powerup_color(kind: PowerUpKind) -> Color {
    match kind {
        PowerUpKind::BigPaddle => GREEN,
        PowerUpKind::ShrinkOpponent => RED,
        PowerUpKind::SpeedUp => YELLOW,
        PowerUpKind::SlowDown => Color::from_rgba(0, 170, 255, 255),
    }
}

impl Renderer {
    pub fn new() -> Self {
        Self {
            scale: 1.0,
            offset_x: 0.0,
            offset_y: 0.0,
        }
    }

    /// Fits the field into the current window, letterboxed.
    fn fit_to_window(&mut self) {
        let (w, h) = (screen_width(), screen_height());
        self.scale = (w / GAME_WIDTH).min(h / GAME_HEIGHT);
        self.offset_x = (w - GAME_WIDTH * self.scale) / 2.0;
        self.offset_y = (h - GAME_HEIGHT * self.scale) / 2.0;
    }

    fn rect(&self, x: f32, y: f32, w: f32, h: f32, color: Color) {
        draw_rectangle(
            self.offset_x + x * self.scale,
            self.offset_y + y * self.scale,
            w * self.scale,
            h * self.scale,
            color,
        );
    }

    fn text(&self, text: &str, x: f32, y: f32, size: f32, color: Color) {
        draw_text(
            text,
            self.offset_x + x * self.scale,
            self.offset_y + y * self.scale,
            size * self.scale,
            color,
        );
    }

    pub fn render(&mut self, snapshot: Option<&MatchSnapshot>, hud: &HudInfo) {
        self.fit_to_window();
        clear_background(BLACK);
        self.rect(0.0, 0.0, GAME_WIDTH, GAME_HEIGHT, Color::from_rgba(26, 26, 26, 255));
        self.draw_center_line();

        if let Some(snapshot) = snapshot {
            for powerup in snapshot.powerups.iter().filter(|p| p.active) {
                let half = POWERUP_SIZE / 2.0;
                self.rect(
                    powerup.x - half,
                    powerup.y - half,
                    POWERUP_SIZE,
                    POWERUP_SIZE,
                    powerup_color(powerup.kind),
                );
            }

            for paddle in &snapshot.paddles {
                let is_local = Some(paddle.client_id) == hud.client_id;
                self.draw_paddle(paddle, is_local);
            }

            let half = BALL_SIZE / 2.0;
            self.rect(
                snapshot.ball.x - half,
                snapshot.ball.y - half,
                BALL_SIZE,
                BALL_SIZE,
                WHITE,
            );

            self.draw_scores(snapshot);
            if snapshot.phase == Phase::Finished {
                self.draw_winner(snapshot);
            }
        }

        self.draw_hud(hud);
    }

    fn draw_center_line(&self) {
        let dash = 20.0;
        let mut y = 0.0;
        while y < GAME_HEIGHT {
            self.rect(GAME_WIDTH / 2.0 - 2.0, y, 4.0, dash, Color::from_rgba(68, 68, 68, 255));
            y += dash * 2.0;
        }
    }

    fn draw_paddle(&self, paddle: &PaddleSnapshot, is_local: bool) {
        // Paddle positions are centers; macroquad draws from the top-left.
        let half_height = physics::paddle_half_height(paddle.paddle_scale);
        let x = paddle.side.paddle_x() - PADDLE_WIDTH / 2.0;
        let color = if !paddle.connected {
            GRAY
        } else if is_local {
            GREEN
        } else {
            Color::from_rgba(255, 68, 68, 255)
        };
        self.rect(x, paddle.y - half_height, PADDLE_WIDTH, half_height * 2.0, color);

        let label_x = match paddle.side {
            PlayerSide::Left => GAME_WIDTH / 4.0,
            PlayerSide::Right => GAME_WIDTH * 3.0 / 4.0,
        };
        self.text(&paddle.name, label_x - 40.0, GAME_HEIGHT - 20.0, 24.0, GRAY);
    }

    fn draw_scores(&self, snapshot: &MatchSnapshot) {
        self.text(
            &snapshot.score_left.to_string(),
            GAME_WIDTH / 4.0,
            70.0,
            64.0,
            WHITE,
        );
        self.text(
            &snapshot.score_right.to_string(),
            GAME_WIDTH * 3.0 / 4.0,
            70.0,
            64.0,
            WHITE,
        );
    }

    fn draw_winner(&self, snapshot: &MatchSnapshot) {
        let Some(side) = snapshot.winner else {
            return;
        };
        let name = snapshot
            .paddle_on(side)
            .map(|p| p.name.clone())
            .unwrap_or_else(|| format!("Player {}", side.player_number()));
        self.text(
            &format!("{} wins!", name),
            GAME_WIDTH / 2.0 - 120.0,
            GAME_HEIGHT / 2.0 - 60.0,
            48.0,
            YELLOW,
        );
    }

    fn draw_hud(&self, hud: &HudInfo) {
        let (mode_label, mode_color) = match hud.mode {
            Mode::Online if hud.client_id.is_some() => ("ONLINE", GREEN),
            Mode::Online => ("CONNECTING", YELLOW),
            Mode::Offline => ("OFFLINE", Color::from_rgba(0, 170, 255, 255)),
        };
        self.rect(10.0, 10.0, 10.0, 10.0, mode_color);
        self.text(mode_label, 26.0, 20.0, 16.0, WHITE);

        if hud.mode == Mode::Online {
            let total = hud.latency_ms.unwrap_or(0) + hud.fake_ping_ms;
            let color = if total < 50 {
                GREEN
            } else if total < 100 {
                YELLOW
            } else {
                RED
            };
            let label = match hud.latency_ms {
                Some(_) => format!("{}ms", total),
                None => "--ms".to_string(),
            };
            self.text(&label, 26.0, 40.0, 16.0, color);
        }

        if !hud.status.is_empty() {
            self.text(
                hud.status,
                GAME_WIDTH / 2.0 - 160.0,
                GAME_HEIGHT / 2.0 + 100.0,
                28.0,
                LIGHTGRAY,
            );
        }

        if let Some((ranking, entries)) = hud.leaderboard {
            self.draw_leaderboard(*ranking, entries);
        }
    }

    fn draw_leaderboard(&self, ranking: Ranking, entries: &[LeaderboardEntry]) {
        let x = GAME_WIDTH / 2.0 - 220.0;
        let mut y = 140.0;
        let height = 60.0 + entries.len() as f32 * 26.0;
        self.rect(x - 20.0, y - 40.0, 480.0, height, Color::from_rgba(0, 0, 0, 200));
        let title = match ranking {
            Ranking::Wins => "Top players by wins",
            Ranking::WinRate => "Top players by win rate",
        };
        self.text(title, x, y, 28.0, YELLOW);

        if entries.is_empty() {
            self.text("No games recorded yet", x, y + 30.0, 22.0, GRAY);
            return;
        }
        for (rank, entry) in entries.iter().enumerate() {
            y += 26.0;
            let line = format!(
                "{:>2}. {:<16} {:>3}W {:>3}L {:>3}%",
                rank + 1,
                entry.player_name,
                entry.wins,
                entry.losses,
                entry.win_rate
            );
            self.text(&line, x, y, 22.0, WHITE);
        }
    }
}

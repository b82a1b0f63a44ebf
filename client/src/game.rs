use crate::network::NetworkEvent;
use crate::offline::LocalMatch;
use log::{debug, info, warn};
use shared::physics::{self, BallState};
use shared::{
    Direction, LeaderboardEntry, MatchSnapshot, Phase, PlayerSide, Ranking, BALL_RADIUS,
    GAME_HEIGHT, GAME_WIDTH, INTERPOLATION_FACTOR, PADDLE_SPEED, RECONCILE_THRESHOLD,
};

/// Where a paddle is drawn, independent of where the server last put it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaddleView {
    /// Paddle center.
    pub y: f32,
    pub scale: f32,
}

impl Default for PaddleView {
    fn default() -> Self {
        Self {
            y: GAME_HEIGHT / 2.0,
            scale: 1.0,
        }
    }
}

/// Smoothed positions the renderer draws for an online match.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderState {
    pub left: PaddleView,
    pub right: PaddleView,
    pub ball: BallState,
    /// Tick of the last server frame the local paddle was reconciled against.
    pub reconciled_tick: Option<u32>,
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            left: PaddleView::default(),
            right: PaddleView::default(),
            ball: BallState::centered(),
            reconciled_tick: None,
        }
    }
}

impl RenderState {
    pub fn paddle(&self, side: PlayerSide) -> &PaddleView {
        match side {
            PlayerSide::Left => &self.left,
            PlayerSide::Right => &self.right,
        }
    }

    fn paddle_mut(&mut self, side: PlayerSide) -> &mut PaddleView {
        match side {
            PlayerSide::Left => &mut self.left,
            PlayerSide::Right => &mut self.right,
        }
    }
}

/// Latest authoritative state received from the server.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerFrame {
    pub tick: u32,
    pub snapshot: MatchSnapshot,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInput {
    /// Seconds since the previous rendered frame.
    pub dt: f32,
    /// Seconds since the latest server frame arrived.
    pub since_update: f32,
    pub direction: Direction,
    pub local_id: Option<u32>,
}

/// Snaps the prediction to the server value when they disagree by more
/// than `threshold`, otherwise keeps the prediction.
pub fn reconcile(predicted: f32, server: f32, threshold: f32) -> f32 {
    let error = server - predicted;
    if error.abs() > threshold {
        debug!("Reconciling local paddle, error {:.2}", error);
        server
    } else {
        predicted
    }
}

fn ease(current: f32, target: f32) -> f32 {
    current + (target - current) * INTERPOLATION_FACTOR
}

/// One rendered frame of an online match.
///
/// The local paddle is predicted from input and reconciled whenever a new
/// server frame shows up; the opponent paddle and the ball ease toward the
/// server, the ball after extrapolating along its velocity.
pub fn advance(
    previous: &RenderState,
    latest: Option<&ServerFrame>,
    frame: &FrameInput,
) -> RenderState {
    let Some(latest) = latest else {
        return previous.clone();
    };
    let snapshot = &latest.snapshot;
    let mut next = previous.clone();
    let new_frame = previous.reconciled_tick != Some(latest.tick);
    let local_side = frame
        .local_id
        .and_then(|id| snapshot.paddle(id))
        .map(|paddle| paddle.side);

    for server_paddle in &snapshot.paddles {
        let view = next.paddle_mut(server_paddle.side);
        view.scale = server_paddle.paddle_scale;

        if Some(server_paddle.side) == local_side {
            if snapshot.phase != Phase::Playing {
                view.y = server_paddle.y;
                continue;
            }
            let mut y = view.y;
            if new_frame {
                y = reconcile(y, server_paddle.y, RECONCILE_THRESHOLD);
            }
            let half = physics::paddle_half_height(view.scale);
            view.y = physics::move_paddle(y, frame.direction, PADDLE_SPEED, frame.dt, half);
        } else {
            view.y = ease(view.y, server_paddle.y);
        }
    }

    let server_ball = &snapshot.ball;
    if server_ball.vx == 0.0 && server_ball.vy == 0.0 {
        next.ball = BallState {
            x: server_ball.x,
            y: server_ball.y,
            vx: 0.0,
            vy: 0.0,
        };
    } else {
        let since = frame.since_update.max(0.0);
        let target_x = (server_ball.x + server_ball.vx * since)
            .clamp(BALL_RADIUS, GAME_WIDTH - BALL_RADIUS);
        let target_y = (server_ball.y + server_ball.vy * since)
            .clamp(BALL_RADIUS, GAME_HEIGHT - BALL_RADIUS);
        next.ball = BallState {
            x: ease(previous.ball.x, target_x),
            y: ease(previous.ball.y, target_y),
            vx: server_ball.vx,
            vy: server_ball.vy,
        };
    }

    next.reconciled_tick = Some(latest.tick);
    next
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Offline,
    Online,
}

/// Directions read from the keyboard this frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Controls {
    /// Online paddle: either key set.
    pub local: Direction,
    /// Offline left paddle (W/S).
    pub left: Direction,
    /// Offline right paddle (arrow keys).
    pub right: Direction,
}

/// Client-side view of the game in either mode.
pub struct ClientGame {
    mode: Mode,
    local_id: Option<u32>,
    render: RenderState,
    latest: Option<ServerFrame>,
    since_update: f32,
    local_match: LocalMatch,
    pub status: String,
    pub latency_ms: Option<u64>,
    pub leaderboard: Option<(Ranking, Vec<LeaderboardEntry>)>,
}

impl ClientGame {
    pub fn new(mode: Mode) -> Self {
        Self::with_local_match(mode, LocalMatch::new())
    }

    pub fn with_local_match(mode: Mode, local_match: LocalMatch) -> Self {
        let mut game = Self {
            mode,
            local_id: None,
            render: RenderState::default(),
            latest: None,
            since_update: 0.0,
            local_match,
            status: String::new(),
            latency_ms: None,
            leaderboard: None,
        };
        game.set_mode(mode);
        game
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Switches modes. Local velocities are zeroed on every switch and the
    /// local match only simulates (and scores) while offline.
    pub fn set_mode(&mut self, mode: Mode) {
        if mode != self.mode {
            info!("Switching to {:?} mode", mode);
        }
        self.mode = mode;
        self.local_match.zero_velocities();
        self.local_match.set_world_bounds(mode == Mode::Offline);
        self.clear_frames();
        self.latency_ms = None;
        self.local_id = None;
        if mode == Mode::Offline {
            self.status = "Offline: W/S and Up/Down".to_string();
        } else {
            self.status = "Connecting...".to_string();
        }
    }

    pub fn local_id(&self) -> Option<u32> {
        self.local_id
    }

    pub fn set_local_id(&mut self, client_id: Option<u32>) {
        self.local_id = client_id;
    }

    pub fn local_match(&self) -> &LocalMatch {
        &self.local_match
    }

    pub fn render_state(&self) -> &RenderState {
        &self.render
    }

    pub fn latest(&self) -> Option<&ServerFrame> {
        self.latest.as_ref()
    }

    /// Stores a new authoritative frame. Frames older than the current one
    /// are ignored.
    pub fn receive_frame(&mut self, tick: u32, snapshot: MatchSnapshot) {
        if self.mode != Mode::Online {
            return;
        }
        if let Some(current) = &self.latest {
            if tick < current.tick {
                debug!("Ignoring stale frame {} (have {})", tick, current.tick);
                return;
            }
        }
        self.latest = Some(ServerFrame { tick, snapshot });
        self.since_update = 0.0;
    }

    fn clear_frames(&mut self) {
        self.render = RenderState::default();
        self.latest = None;
        self.since_update = 0.0;
    }

    /// Applies an event from the network task. Returns false when the
    /// connection is gone, in which case the game has fallen back to
    /// offline play.
    pub fn handle_network_event(&mut self, event: NetworkEvent) -> bool {
        match event {
            NetworkEvent::Connected { client_id } => {
                self.local_id = Some(client_id);
                self.clear_frames();
                self.status = format!("Connected as player #{}", client_id);
            }
            NetworkEvent::Status(message) => self.status = message,
            NetworkEvent::GameStart => {
                self.clear_frames();
                self.status.clear();
            }
            NetworkEvent::GameEnd { reason } => {
                self.status = format!("{} - press R for a rematch", reason);
            }
            NetworkEvent::Frame { tick, snapshot } => self.receive_frame(tick, snapshot),
            NetworkEvent::Latency(ms) => self.latency_ms = Some(ms),
            NetworkEvent::Leaderboard { ranking, entries } => {
                self.leaderboard = Some((ranking, entries));
            }
            NetworkEvent::Disconnected { reason } => {
                warn!("Falling back to offline play: {}", reason);
                self.set_mode(Mode::Offline);
                self.status = format!("{} (offline)", reason);
                return false;
            }
        }
        true
    }

    pub fn update(&mut self, dt: f32, controls: &Controls) {
        match self.mode {
            Mode::Offline => {
                self.local_match.set_inputs(controls.left, controls.right);
                self.local_match.update(dt);
            }
            Mode::Online => {
                self.since_update += dt;
                let frame = FrameInput {
                    dt,
                    since_update: self.since_update,
                    direction: controls.local,
                    local_id: self.local_id,
                };
                self.render = advance(&self.render, self.latest.as_ref(), &frame);
            }
        }
    }

    /// What to draw this frame: the server state with smoothed positions
    /// substituted online, or the local match offline.
    pub fn display_snapshot(&self) -> Option<MatchSnapshot> {
        match self.mode {
            Mode::Offline => Some(self.local_match.snapshot()),
            Mode::Online => {
                let latest = self.latest.as_ref()?;
                let mut snapshot = latest.snapshot.clone();
                for paddle in &mut snapshot.paddles {
                    paddle.y = self.render.paddle(paddle.side).y;
                }
                snapshot.ball.x = self.render.ball.x;
                snapshot.ball.y = self.render.ball.y;
                Some(snapshot)
            }
        }
    }
}

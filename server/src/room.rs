//! One match per room, one task per room
//!
//! A room owns its `MatchState` and `TickScheduler` outright. Commands from
//! the server loop and scheduler deadlines are handled one at a time inside
//! the room task, so the match needs no locking. Everything a room wants to
//! say to its members goes through the server's outbound queue.

use crate::game::{JoinOutcome, LeaveOutcome, MatchConfig, MatchEvent, MatchState, WAITING_STATUS};
use crate::network::{GameMessage, ServerMessage};
use crate::scheduler::TickScheduler;
use log::{debug, info, warn};
use shared::{Direction, MatchSnapshot, Packet, Phase, KEYFRAME_INTERVAL_TICKS, SERVER_TICK_RATE};
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};

#[derive(Debug, Clone, PartialEq)]
pub struct RoomConfig {
    pub tick_rate: u32,
    pub rules: MatchConfig,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            tick_rate: SERVER_TICK_RATE,
            rules: MatchConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RoomCommand {
    Join { client_id: u32, name: String },
    Leave { client_id: u32 },
    Input { client_id: u32, direction: Direction },
}

/// Server-side view of a running room.
#[derive(Debug)]
pub struct RoomHandle {
    pub id: u32,
    pub commands: mpsc::UnboundedSender<RoomCommand>,
    pub members: Vec<u32>,
    pub started: bool,
}

impl RoomHandle {
    pub fn is_waiting(&self) -> bool {
        !self.started && self.members.len() < 2
    }

    /// Returns false once the room task has gone away.
    pub fn send(&self, command: RoomCommand) -> bool {
        self.commands.send(command).is_ok()
    }
}

pub struct Room {
    id: u32,
    state: MatchState,
    scheduler: TickScheduler,
    members: Vec<u32>,
    last_sent: Option<MatchSnapshot>,
    ticks_since_keyframe: u32,
    outbound: mpsc::UnboundedSender<GameMessage>,
    events: mpsc::UnboundedSender<ServerMessage>,
    closed: bool,
}

impl Room {
    pub fn new(
        id: u32,
        config: &RoomConfig,
        outbound: mpsc::UnboundedSender<GameMessage>,
        events: mpsc::UnboundedSender<ServerMessage>,
    ) -> Self {
        Self::with_state(id, config, MatchState::new(config.rules.clone()), outbound, events)
    }

    pub fn with_state(
        id: u32,
        config: &RoomConfig,
        state: MatchState,
        outbound: mpsc::UnboundedSender<GameMessage>,
        events: mpsc::UnboundedSender<ServerMessage>,
    ) -> Self {
        Self {
            id,
            state,
            scheduler: TickScheduler::new(config.tick_rate),
            members: Vec::new(),
            last_sent: None,
            ticks_since_keyframe: 0,
            outbound,
            events,
            closed: false,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn state(&self) -> &MatchState {
        &self.state
    }

    pub fn scheduler(&self) -> &TickScheduler {
        &self.scheduler
    }

    pub fn members(&self) -> &[u32] {
        &self.members
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn handle_command(&mut self, command: RoomCommand, now: Instant) {
        if self.closed {
            return;
        }

        match command {
            RoomCommand::Join { client_id, name } => match self.state.add_player(client_id, &name) {
                JoinOutcome::WaitingForOpponent { .. } => {
                    self.members.push(client_id);
                    self.send(
                        vec![client_id],
                        Packet::Status {
                            message: WAITING_STATUS.to_string(),
                        },
                    );
                    self.sync(true);
                }
                JoinOutcome::MatchStarted { .. } => {
                    self.members.push(client_id);
                    info!("Room {} starting match for {:?}", self.id, self.members);
                    self.send(self.members.clone(), Packet::GameStart);
                    self.scheduler.start(now);
                    self.sync(true);
                }
                JoinOutcome::Rejected => {
                    warn!("Room {} rejected client {}", self.id, client_id);
                }
            },

            RoomCommand::Leave { client_id } => {
                self.members.retain(|id| *id != client_id);
                match self.state.remove_player(client_id) {
                    LeaveOutcome::MatchAbandoned => {
                        self.sync(true);
                        if let Some(reason) = self.state.finish_reason() {
                            let packet = Packet::GameEnd {
                                reason: reason.to_string(),
                            };
                            self.send(self.members.clone(), packet);
                        }
                        self.close();
                    }
                    LeaveOutcome::Removed => {
                        if self.members.is_empty() {
                            self.close();
                        } else {
                            self.sync(true);
                        }
                    }
                    LeaveOutcome::Unknown => {
                        debug!("Room {}: leave from unknown client {}", self.id, client_id);
                    }
                }
            }

            RoomCommand::Input {
                client_id,
                direction,
            } => {
                if !self.state.set_input(client_id, direction) {
                    debug!("Room {}: dropped input from client {}", self.id, client_id);
                }
            }
        }
    }

    /// Runs one scheduled tick if the scheduler is running.
    pub fn on_tick(&mut self, now: Instant) {
        if self.closed {
            return;
        }
        let Some(dt) = self.scheduler.on_tick(now) else {
            return;
        };

        let events = self.state.tick(dt);
        let tick = self.state.tick_count();
        if tick % SERVER_TICK_RATE == 0 {
            debug!(
                "Room {} tick {} (drift {:.2}ms)",
                self.id,
                tick,
                self.scheduler.accumulated_drift() * 1000.0
            );
        }

        self.ticks_since_keyframe += 1;
        self.sync(self.ticks_since_keyframe >= KEYFRAME_INTERVAL_TICKS);

        for event in events {
            if let MatchEvent::Finished { reason, .. } = event {
                self.send(self.members.clone(), Packet::GameEnd { reason });
            }
        }

        if self.state.phase() == Phase::Finished {
            self.close();
        }
    }

    /// Sends the members whatever changed since the last sync.
    fn sync(&mut self, keyframe: bool) {
        let snapshot = self.state.snapshot();
        let tick = self.state.tick_count();

        let packet = match (&self.last_sent, keyframe) {
            (Some(previous), false) => {
                let delta = snapshot.diff(previous);
                if delta.is_empty() {
                    return;
                }
                Packet::StateDelta { tick, delta }
            }
            _ => {
                self.ticks_since_keyframe = 0;
                Packet::State {
                    tick,
                    snapshot: snapshot.clone(),
                }
            }
        };

        self.send(self.members.clone(), packet);
        self.last_sent = Some(snapshot);
    }

    fn send(&self, client_ids: Vec<u32>, packet: Packet) {
        if client_ids.is_empty() {
            return;
        }
        if let Err(e) = self
            .outbound
            .send(GameMessage::SendToClients { client_ids, packet })
        {
            warn!("Room {} could not queue packet: {}", self.id, e);
        }
    }

    /// Stops the tick loop and reports the room as closed. Runs once.
    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if self.scheduler.stop() {
            debug!("Room {} tick loop stopped", self.id);
        }

        info!("Room {} closed", self.id);
        let message = ServerMessage::RoomClosed {
            room_id: self.id,
            members: self.members.clone(),
            result: self.state.result(),
        };
        if let Err(e) = self.events.send(message) {
            warn!("Room {} could not report closing: {}", self.id, e);
        }
    }

    /// Drives the room until it closes or its command channel is dropped.
    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<RoomCommand>) {
        info!("Room {} opened", self.id);

        while !self.closed {
            let deadline = self.scheduler.deadline();
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command, Instant::now()),
                    None => {
                        debug!("Room {} command channel closed", self.id);
                        self.close();
                    }
                },
                _ = wait_until(deadline) => self.on_tick(Instant::now()),
            }
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

/// Spawns a room task and returns the handle the server keeps for it.
pub fn spawn_room(
    id: u32,
    config: &RoomConfig,
    outbound: mpsc::UnboundedSender<GameMessage>,
    events: mpsc::UnboundedSender<ServerMessage>,
) -> RoomHandle {
    let (commands, receiver) = mpsc::unbounded_channel();
    let room = Room::new(id, config, outbound, events);
    tokio::spawn(room.run(receiver));
    RoomHandle {
        id,
        commands,
        members: Vec::new(),
        started: false,
    }
}

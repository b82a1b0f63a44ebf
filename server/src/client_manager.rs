//! Connected client registry for the pong server
//!
//! This module tracks every client the server has accepted, including:
//! - Connection lifecycle (connect, disconnect, timeout)
//! - The display name each player chose when connecting
//! - Which room, if any, the client is currently playing in
//! - Capacity limits and address lookup for packet routing
//!
//! The registry is shared between the main server loop, the outbound sender
//! task (which resolves client ids to addresses) and the timeout checker.

use log::info;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

pub const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Represents a connected client
///
/// Each client maintains:
/// - Connection metadata (ID, address, last activity)
/// - The sanitized display name used in matches and on the leaderboard
/// - The room it was placed in by matchmaking
#[derive(Debug, Clone)]
pub struct Client {
    /// Unique client identifier assigned by the server
    pub id: u32,
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// Display name, already sanitized
    pub name: String,
    /// Room the client is playing in, if any
    pub room_id: Option<u32>,
    /// Last time we received any packet from this client
    pub last_seen: Instant,
}

impl Client {
    /// Creates a new client that is not yet in a room
    pub fn new(id: u32, addr: SocketAddr, name: String) -> Self {
        Self {
            id,
            addr,
            name,
            room_id: None,
            last_seen: Instant::now(),
        }
    }

    /// Records activity from this client
    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Checks if the client has exceeded the connection timeout
    ///
    /// Returns true if no packets have been received from this client
    /// within the specified timeout duration, indicating a likely disconnect.
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Manages all connected clients
///
/// The ClientManager enforces the server capacity limit, hands out client
/// ids and maps addresses back to clients. Client IDs start from 1 and are
/// never reused during the lifetime of the server.
pub struct ClientManager {
    /// Connected clients indexed by their unique ID
    clients: HashMap<u32, Client>,
    /// Next available client ID for new connections
    next_client_id: u32,
    /// Maximum number of concurrent clients allowed
    max_clients: usize,
    /// Silence after which a client is dropped
    timeout: Duration,
}

impl ClientManager {
    /// Creates a new client manager with the default timeout
    pub fn new(max_clients: usize) -> Self {
        Self::with_timeout(max_clients, DEFAULT_CLIENT_TIMEOUT)
    }

    pub fn with_timeout(max_clients: usize, timeout: Duration) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
            timeout,
        }
    }

    /// Attempts to add a new client connection
    ///
    /// Returns Some(client_id) if successful, None if server is at capacity.
    /// An empty name is replaced by "Player N" using the new client ID.
    pub fn add_client(&mut self, addr: SocketAddr, name: String) -> Option<u32> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        let name = if name.is_empty() {
            format!("Player {}", client_id)
        } else {
            name
        };

        info!("Client {} ({}) connected from {}", client_id, name, addr);
        self.clients
            .insert(client_id, Client::new(client_id, addr, name));

        Some(client_id)
    }

    /// Removes a client from the server
    ///
    /// Returns the removed client so the caller can clean up its room, or
    /// None if it was already gone. This handles both explicit
    /// disconnections and timeout cleanup.
    pub fn remove_client(&mut self, client_id: &u32) -> Option<Client> {
        let client = self.clients.remove(client_id)?;
        info!("Client {} disconnected", client.id);
        Some(client)
    }

    /// Finds a client ID by their network address
    ///
    /// Used to associate incoming packets with existing client connections.
    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<u32> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(id, _)| *id)
    }

    pub fn get(&self, client_id: u32) -> Option<&Client> {
        self.clients.get(&client_id)
    }

    /// Marks the client as recently active. Returns false for unknown ids.
    pub fn touch(&mut self, client_id: u32) -> bool {
        match self.clients.get_mut(&client_id) {
            Some(client) => {
                client.touch();
                true
            }
            None => false,
        }
    }

    pub fn set_room(&mut self, client_id: u32, room_id: Option<u32>) {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.room_id = room_id;
        }
    }

    /// Checks for and removes timed-out clients
    ///
    /// Returns the removed clients so their rooms can be told they left.
    pub fn check_timeouts(&mut self) -> Vec<Client> {
        let timeout = self.timeout;
        let timed_out: Vec<u32> = self
            .clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(timeout))
            .map(|(id, _)| *id)
            .collect();

        timed_out
            .iter()
            .filter_map(|client_id| self.remove_client(client_id))
            .collect()
    }

    /// Resolves client IDs to addresses, skipping clients that are gone
    pub fn addrs_for(&self, client_ids: &[u32]) -> Vec<(u32, SocketAddr)> {
        client_ids
            .iter()
            .filter_map(|id| self.clients.get(id).map(|client| (*id, client.addr)))
            .collect()
    }

    /// Returns the number of currently connected clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns true if no clients are currently connected
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

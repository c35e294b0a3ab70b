//! Client connection management and input queuing for the movement server
//!
//! This module handles the server-side bookkeeping for connected clients:
//! - Client connection lifecycle (connect, disconnect, timeout)
//! - Per-client input queues ordered by sequence number
//! - Duplicate and stale input rejection plus a per-client queue limit
//! - Acknowledgment tracking used to build each client's snapshot
//!
//! Inputs from different clients drive different bodies and carry timestamps
//! from unrelated client clocks, so ordering is only meaningful within one
//! client's queue.

use log::{debug, info};
use shared::BufferedInput;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Inputs a single client may have queued before new ones are refused.
pub const MAX_PENDING_INPUTS: usize = 256;

/// Default silence after which a client counts as disconnected.
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of queuing an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputAdmission {
    Queued,
    /// Sequence already applied.
    Stale,
    /// Sequence already waiting in the queue.
    Duplicate,
    /// The client's queue is full.
    RateLimited,
    UnknownClient,
}

/// A connected client and its queued inputs
#[derive(Debug)]
pub struct Client {
    /// Unique client identifier assigned by the server
    pub id: u32,
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// Last time we received any packet from this client
    pub last_seen: Instant,
    /// Highest input sequence number applied to this client's body
    pub last_processed_input: u32,
    /// Inputs waiting for the next tick, sorted by sequence
    pub pending_inputs: Vec<BufferedInput>,
}

impl Client {
    pub fn new(id: u32, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
            last_processed_input: 0,
            pending_inputs: Vec::new(),
        }
    }

    /// Queues an input in sequence order, so packets that arrive out of
    /// order are still applied in the order they were issued.
    pub fn add_input(&mut self, input: BufferedInput) -> InputAdmission {
        self.last_seen = Instant::now();

        if input.sequence <= self.last_processed_input {
            return InputAdmission::Stale;
        }

        match self
            .pending_inputs
            .binary_search_by_key(&input.sequence, |i| i.sequence)
        {
            Ok(_) => InputAdmission::Duplicate,
            Err(_) if self.pending_inputs.len() >= MAX_PENDING_INPUTS => {
                InputAdmission::RateLimited
            }
            Err(index) => {
                self.pending_inputs.insert(index, input);
                InputAdmission::Queued
            }
        }
    }

    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Returns true if nothing has been heard from the client within `timeout`.
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Manages all connected clients and their queued inputs
///
/// Enforces the server capacity limit and hands out inputs for each tick.
pub struct ClientManager {
    /// Connected clients indexed by their unique ID
    clients: HashMap<u32, Client>,
    /// Next available client ID for new connections
    next_client_id: u32,
    /// Maximum number of concurrent clients allowed
    max_clients: usize,
    timeout: Duration,
}

impl ClientManager {
    /// Creates an empty roster. Client IDs start from 1.
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
            timeout: CLIENT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Attempts to add a new client connection
    ///
    /// Returns Some(client_id) if successful, None if the server is full.
    pub fn add_client(&mut self, addr: SocketAddr) -> Option<u32> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        let client = Client::new(client_id, addr);
        info!("Client {} connected from {}", client_id, addr);
        self.clients.insert(client_id, client);

        Some(client_id)
    }

    /// Removes a client. Returns false if they were already gone.
    pub fn remove_client(&mut self, client_id: &u32) -> bool {
        if let Some(client) = self.clients.remove(client_id) {
            info!("Client {} disconnected", client.id);
            true
        } else {
            false
        }
    }

    /// Finds a client ID by their network address
    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<u32> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(id, _)| *id)
    }

    /// Queues an input for `client_id`.
    pub fn add_input(&mut self, client_id: u32, input: BufferedInput) -> InputAdmission {
        match self.clients.get_mut(&client_id) {
            Some(client) => {
                let admission = client.add_input(input);
                if admission != InputAdmission::Queued {
                    debug!(
                        "Input {} from client {}: {:?}",
                        input.sequence, client_id, admission
                    );
                }
                admission
            }
            None => InputAdmission::UnknownClient,
        }
    }

    /// Refreshes the activity timestamp without queuing anything.
    pub fn touch(&mut self, client_id: u32) {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.touch();
        }
    }

    /// Removes and returns every queued input, grouped by client and
    /// ordered by sequence within each client.
    pub fn drain_pending_inputs(&mut self) -> Vec<(u32, BufferedInput)> {
        let mut ids: Vec<u32> = self.clients.keys().copied().collect();
        ids.sort_unstable();

        let mut all_inputs = Vec::new();
        for id in ids {
            if let Some(client) = self.clients.get_mut(&id) {
                all_inputs.extend(client.pending_inputs.drain(..).map(|input| (id, input)));
            }
        }
        all_inputs
    }

    /// Records that `sequence` has been applied for `client_id`.
    pub fn mark_input_processed(&mut self, client_id: u32, sequence: u32) {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.last_processed_input = client.last_processed_input.max(sequence);
        }
    }

    pub fn last_processed_input(&self, client_id: u32) -> Option<u32> {
        self.clients.get(&client_id).map(|c| c.last_processed_input)
    }

    /// Removes clients that have been silent longer than the timeout and
    /// returns their IDs and addresses.
    pub fn check_timeouts(&mut self) -> Vec<(u32, SocketAddr)> {
        let timeout = self.timeout;
        let timed_out: Vec<(u32, SocketAddr)> = self
            .clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(timeout))
            .map(|(id, client)| (*id, client.addr))
            .collect();

        for (client_id, _) in &timed_out {
            self.remove_client(client_id);
        }

        timed_out
    }

    /// Client IDs, addresses and acknowledged sequences, for building snapshots.
    pub fn get_client_addrs(&self) -> Vec<(u32, SocketAddr, u32)> {
        self.clients
            .iter()
            .map(|(id, client)| (*id, client.addr, client.last_processed_input))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::MovementVector;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn test_addr2() -> SocketAddr {
        "127.0.0.1:8081".parse().unwrap()
    }

    fn input(sequence: u32) -> BufferedInput {
        BufferedInput {
            sequence,
            vector: MovementVector::from_raw(1.0, 0.0),
            speed_scale: 1.0,
            issued_at: sequence as u64 * 16,
            frame_delta: 0.016,
        }
    }

    #[test]
    fn test_client_creation() {
        let addr = test_addr();
        let client = Client::new(1, addr);

        assert_eq!(client.id, 1);
        assert_eq!(client.addr, addr);
        assert_eq!(client.last_processed_input, 0);
        assert!(client.pending_inputs.is_empty());
    }

    #[test]
    fn test_client_orders_inputs_by_sequence() {
        let mut client = Client::new(1, test_addr());

        assert_eq!(client.add_input(input(2)), InputAdmission::Queued);
        assert_eq!(client.add_input(input(1)), InputAdmission::Queued);

        assert_eq!(client.pending_inputs.len(), 2);
        assert_eq!(client.pending_inputs[0].sequence, 1);
        assert_eq!(client.pending_inputs[1].sequence, 2);
    }

    #[test]
    fn test_duplicate_and_stale_inputs_rejected() {
        let mut client = Client::new(1, test_addr());
        client.last_processed_input = 5;

        assert_eq!(client.add_input(input(4)), InputAdmission::Stale);
        assert_eq!(client.add_input(input(5)), InputAdmission::Stale);
        assert_eq!(client.add_input(input(6)), InputAdmission::Queued);
        assert_eq!(client.add_input(input(6)), InputAdmission::Duplicate);
        assert_eq!(client.pending_inputs.len(), 1);
    }

    #[test]
    fn test_pending_queue_is_capped() {
        let mut client = Client::new(1, test_addr());
        for seq in 1..=MAX_PENDING_INPUTS as u32 {
            assert_eq!(client.add_input(input(seq)), InputAdmission::Queued);
        }

        let next = MAX_PENDING_INPUTS as u32 + 1;
        assert_eq!(client.add_input(input(next)), InputAdmission::RateLimited);
    }

    #[test]
    fn test_client_timeout() {
        let mut client = Client::new(1, test_addr());

        assert!(!client.is_timed_out(Duration::from_secs(1)));

        client.last_seen = Instant::now() - Duration::from_secs(2);

        assert!(client.is_timed_out(Duration::from_secs(1)));
    }

    #[test]
    fn test_add_client_max_capacity() {
        let mut manager = ClientManager::new(1);

        assert_eq!(manager.add_client(test_addr()), Some(1));
        assert!(manager.add_client(test_addr2()).is_none());
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_remove_client() {
        let mut manager = ClientManager::new(2);
        let client_id = manager.add_client(test_addr()).unwrap();

        assert!(manager.remove_client(&client_id));
        assert!(!manager.remove_client(&client_id));
        assert!(manager.is_empty());
    }

    #[test]
    fn test_find_client_by_addr() {
        let mut manager = ClientManager::new(2);
        let client_id1 = manager.add_client(test_addr()).unwrap();
        let _client_id2 = manager.add_client(test_addr2()).unwrap();

        assert_eq!(manager.find_client_by_addr(test_addr()), Some(client_id1));

        let unknown_addr: SocketAddr = "192.168.1.1:9999".parse().unwrap();
        assert_eq!(manager.find_client_by_addr(unknown_addr), None);
    }

    #[test]
    fn test_add_input_to_nonexistent_client() {
        let mut manager = ClientManager::new(2);
        assert_eq!(manager.add_input(999, input(1)), InputAdmission::UnknownClient);
    }

    #[test]
    fn test_drain_groups_by_client_in_sequence_order() {
        let mut manager = ClientManager::new(3);
        let a = manager.add_client(test_addr()).unwrap();
        let b = manager.add_client(test_addr2()).unwrap();

        manager.add_input(b, input(1));
        manager.add_input(a, input(2));
        manager.add_input(a, input(1));

        let drained = manager.drain_pending_inputs();
        let order: Vec<(u32, u32)> = drained.iter().map(|(id, i)| (*id, i.sequence)).collect();
        assert_eq!(order, vec![(a, 1), (a, 2), (b, 1)]);

        assert!(manager.drain_pending_inputs().is_empty());
    }

    #[test]
    fn test_mark_input_processed_is_monotonic() {
        let mut manager = ClientManager::new(1);
        let id = manager.add_client(test_addr()).unwrap();

        manager.mark_input_processed(id, 7);
        manager.mark_input_processed(id, 3);

        assert_eq!(manager.last_processed_input(id), Some(7));
        assert_eq!(manager.get_client_addrs(), vec![(id, test_addr(), 7)]);
    }

    #[test]
    fn test_check_timeouts_removes_silent_clients() {
        let mut manager = ClientManager::new(2).with_timeout(Duration::from_millis(0));
        let id = manager.add_client(test_addr()).unwrap();
        std::thread::sleep(Duration::from_millis(5));

        assert_eq!(manager.check_timeouts(), vec![(id, test_addr())]);
        assert!(manager.is_empty());
    }

    #[test]
    fn test_touch_keeps_idle_client_alive() {
        let mut manager = ClientManager::new(2).with_timeout(Duration::from_millis(50));
        let idle = manager.add_client(test_addr()).unwrap();
        let silent = manager.add_client(test_addr2()).unwrap();

        for _ in 0..4 {
            std::thread::sleep(Duration::from_millis(20));
            manager.touch(idle);
        }

        assert_eq!(manager.check_timeouts(), vec![(silent, test_addr2())]);
        assert_eq!(manager.find_client_by_addr(test_addr()), Some(idle));
    }
}

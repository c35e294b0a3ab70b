use crate::game::ClientGameState;
use crate::input::{InputSource, Projection};
use crate::prediction::MotionEvent;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use rand::Rng;
use shared::{GameConfig, Packet, ServerSnapshot, TileGrid, Vector2, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::{interval, interval_at, sleep, Instant, MissedTickBehavior};

/// Idle clients send nothing else, so this must stay well below the
/// server's client timeout.
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(1);

/// Network conditions applied to outgoing traffic.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkConditions {
    /// Round-trip latency to simulate, split evenly across both directions.
    pub fake_ping_ms: u64,
    /// Fraction of outgoing input packets silently dropped.
    pub packet_loss: f64,
}

pub struct Client {
    socket: UdpSocket,
    server_addr: SocketAddr,
    client_id: Option<u32>,
    connected: bool,

    game_state: ClientGameState<TileGrid>,
    events: mpsc::UnboundedReceiver<MotionEvent>,
    input_source: Box<dyn InputSource + Send>,

    link: LinkConditions,
    tick_duration: Duration,
}

impl Client {
    pub async fn new(
        server_addr: &str,
        config: GameConfig,
        input_source: Box<dyn InputSource + Send>,
        link: LinkConditions,
        tick_rate: u32,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let server_addr = server_addr.parse()?;

        let mut game_state = ClientGameState::new(
            config,
            TileGrid::arena(),
            Vector2::ZERO,
            Projection::TopDown,
        );
        let events = game_state.subscribe();

        Ok(Client {
            socket,
            server_addr,
            client_id: None,
            connected: false,
            game_state,
            events,
            input_source,
            link,
            tick_duration: Duration::from_millis(1000 / tick_rate.max(1) as u64),
        })
    }

    async fn connect(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!("Connecting to server...");

        let packet = Packet::Connect {
            client_version: PROTOCOL_VERSION,
        };
        self.send_packet(&packet).await?;

        Ok(())
    }

    async fn send_packet(&self, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
        if self.link.fake_ping_ms > 0 {
            sleep(Duration::from_millis(self.link.fake_ping_ms / 2)).await;
        }

        let data = serialize(packet)?;
        self.socket.send_to(&data, self.server_addr).await?;
        Ok(())
    }

    fn handle_packet(&mut self, packet: Packet) {
        match packet {
            Packet::Connected {
                client_id,
                spawn_x,
                spawn_y,
            } => {
                info!("Connected! Client ID: {}", client_id);
                self.client_id = Some(client_id);
                self.connected = true;
                self.game_state.reset(Vector2::new(spawn_x, spawn_y));
                // Drop events produced by the reset itself.
                while self.events.try_recv().is_ok() {}
            }

            Packet::Snapshot { tick, .. } => {
                if !self.connected {
                    return;
                }
                if let Some(snapshot) = ServerSnapshot::from_packet(&packet) {
                    debug!(
                        "Snapshot for tick {} acks input {}",
                        tick, snapshot.last_acknowledged_sequence
                    );
                    self.game_state.on_server_snapshot(snapshot);
                }
            }

            Packet::Disconnected { reason } => {
                warn!("Disconnected: {}", reason);
                self.connected = false;
                self.client_id = None;
            }

            _ => {
                warn!("Unexpected packet type");
            }
        }
    }

    /// Forwards buffered inputs to the server, dropping some if packet loss
    /// is simulated.
    async fn flush_events(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let mut outgoing = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            match event {
                MotionEvent::Input(input) => outgoing.push(input),
                MotionEvent::Snapped { position } => {
                    info!("Position corrected to ({:.1}, {:.1})", position.x, position.y)
                }
                other => debug!("{:?}", other),
            }
        }

        for input in outgoing {
            let loss = self.link.packet_loss.clamp(0.0, 1.0);
            if loss > 0.0 && rand::thread_rng().gen_bool(loss) {
                debug!("Dropping input {} (simulated loss)", input.sequence);
                continue;
            }
            self.send_packet(&input.to_packet()).await?;
        }
        Ok(())
    }

    async fn keep_alive(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.connected {
            self.send_packet(&Packet::KeepAlive).await?;
        }
        Ok(())
    }

    fn tick(&mut self) {
        let dt = self.tick_duration.as_secs_f32();
        let held = self.input_source.held_input(self.game_state.now_ms());
        let report = self.game_state.tick(dt, held.as_ref());

        for correction in &report.corrections {
            debug!(
                "{:?} correction of {:.2} units, {} inputs replayed",
                correction.correction, correction.error, correction.replayed
            );
        }
    }

    pub fn game_state(&self) -> &ClientGameState<TileGrid> {
        &self.game_state
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.connect().await?;

        let mut tick_interval = interval(self.tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // Retry the handshake every second until it succeeds.
        let retry = Duration::from_secs(1);
        let mut connect_interval = interval_at(Instant::now() + retry, retry);
        let mut keep_alive_interval = interval(KEEP_ALIVE_INTERVAL);
        keep_alive_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut stats_interval = interval(Duration::from_secs(5));

        let mut buffer = [0u8; 2048];

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, _)) => {
                            if self.link.fake_ping_ms > 0 {
                                sleep(Duration::from_millis(self.link.fake_ping_ms / 2)).await;
                            }

                            match deserialize::<Packet>(&buffer[0..len]) {
                                Ok(packet) => self.handle_packet(packet),
                                Err(e) => warn!("Failed to deserialize packet: {}", e),
                            }
                        },
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                },

                _ = tick_interval.tick() => {
                    if !self.connected {
                        continue;
                    }

                    self.tick();
                    if let Err(e) = self.flush_events().await {
                        error!("Error sending input: {}", e);
                    }
                },

                _ = connect_interval.tick() => {
                    if !self.connected {
                        if let Err(e) = self.connect().await {
                            error!("Error connecting: {}", e);
                        }
                    }
                },

                _ = keep_alive_interval.tick() => {
                    if let Err(e) = self.keep_alive().await {
                        error!("Error sending keep-alive: {}", e);
                    }
                },

                _ = stats_interval.tick() => {
                    let stats = self.game_state.stats();
                    let state = self.game_state.state();
                    info!(
                        "At ({:.1}, {:.1}); corrections: {} accepted, {} smoothed, {} snapped, {} ignored",
                        state.position.x, state.position.y,
                        stats.accepted, stats.smoothed, stats.snapped, stats.ignored
                    );
                },

                _ = tokio::signal::ctrl_c() => {
                    info!("Shutting down client");
                    break;
                }
            }
        }

        if self.connected {
            let _ = self.send_packet(&Packet::Disconnect).await;
        }

        Ok(())
    }
}

//! Race host and fixed-rate tick loop
//!
//! A host owns one session and drives it at the simulation rate. Drone
//! messages arrive through a bounded inbox that is drained, never awaited,
//! at the start of every tick.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::net::protocol::{MessageKind, NetMessage};
use crate::race::player::{InputSource, NoInput};
use crate::race::session::{RaceResult, Session, SessionMode};
use crate::race::snapshot::{SnapshotBuilder, StandingsSnapshot};
use crate::race::terrain::Terrain;
use crate::util::time::{tick_delta, SIMULATION_TPS, STANDINGS_TPS, TICK_DURATION_MICROS};

/// Inbox capacity per host
const INBOX_CAPACITY: usize = 256;

/// Published to observers of a running host
#[derive(Debug, Clone)]
pub enum HostEvent {
    Standings(StandingsSnapshot),
    Finished(Vec<RaceResult>),
}

/// Latest standings, readable without subscribing
pub type StandingsBoard = Arc<RwLock<Option<StandingsSnapshot>>>;

/// Handle to a running host
#[derive(Clone)]
pub struct RaceHandle {
    pub id: Uuid,
    pub inbox_tx: mpsc::Sender<NetMessage>,
    pub events_tx: broadcast::Sender<HostEvent>,
    board: StandingsBoard,
}

impl RaceHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
        self.events_tx.subscribe()
    }

    /// Most recently published standings
    pub fn standings(&self) -> Option<StandingsSnapshot> {
        self.board.read().clone()
    }

    /// Queue a message for the next tick without waiting. Returns false when
    /// the inbox is full or the host has stopped.
    pub fn offer(&self, msg: NetMessage) -> bool {
        self.inbox_tx.try_send(msg).is_ok()
    }
}

/// Registry of running hosts, keyed by session id
pub struct HostRegistry {
    hosts: DashMap<Uuid, RaceHandle>,
}

impl HostRegistry {
    pub fn new() -> Self {
        Self {
            hosts: DashMap::new(),
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<RaceHandle> {
        self.hosts.get(id).map(|h| h.value().clone())
    }

    pub fn insert(&self, handle: RaceHandle) {
        self.hosts.insert(handle.id, handle);
    }

    pub fn remove(&self, id: &Uuid) -> Option<RaceHandle> {
        self.hosts.remove(id).map(|(_, h)| h)
    }

    pub fn active_sessions(&self) -> usize {
        self.hosts.len()
    }

    /// Route a message to the host running `session_id`
    pub fn route(&self, session_id: &Uuid, msg: NetMessage) -> bool {
        match self.hosts.get(session_id) {
            Some(handle) => handle.offer(msg),
            None => {
                debug!(session = %session_id, kind = %msg.kind, "No host for message");
                false
            }
        }
    }
}

impl Default for HostRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The authoritative race loop for one session
pub struct RaceHost {
    session: Session,
    terrain: Arc<dyn Terrain>,
    input: Box<dyn InputSource + Send + Sync>,
    inbox_rx: mpsc::Receiver<NetMessage>,
    events_tx: broadcast::Sender<HostEvent>,
    board: StandingsBoard,
    snapshot_builder: SnapshotBuilder,
    /// TIME mode session length (seconds)
    time_limit: Option<f64>,
    start_on_run: bool,
    paused: bool,
}

impl RaceHost {
    pub fn new(session: Session, terrain: Arc<dyn Terrain>) -> (Self, RaceHandle) {
        let (inbox_tx, inbox_rx) = mpsc::channel(INBOX_CAPACITY);
        let (events_tx, _) = broadcast::channel(64);
        let board: StandingsBoard = Arc::new(RwLock::new(None));

        let handle = RaceHandle {
            id: session.id(),
            inbox_tx,
            events_tx: events_tx.clone(),
            board: board.clone(),
        };

        let host = Self {
            session,
            terrain,
            input: Box::new(NoInput),
            inbox_rx,
            events_tx,
            board,
            snapshot_builder: SnapshotBuilder::new(SIMULATION_TPS / STANDINGS_TPS),
            time_limit: None,
            start_on_run: true,
            paused: false,
        };
        (host, handle)
    }

    /// Keyboard state for player contestants
    pub fn with_input(mut self, input: Box<dyn InputSource + Send + Sync>) -> Self {
        self.input = input;
        self
    }

    /// End a TIME session after this long
    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit.as_secs_f64());
        self
    }

    /// Hold the grid until a start message arrives
    pub fn wait_for_start(mut self) -> Self {
        self.start_on_run = false;
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Run the tick loop until the session ends. Returns the final classification.
    pub async fn run(mut self) -> Vec<RaceResult> {
        info!(session = %self.session.id(), mode = %self.session.mode(), "Race host started");

        if self.start_on_run && !self.session.is_started() {
            self.session.set_started();
        }

        let tick_duration = Duration::from_micros(TICK_DURATION_MICROS);
        let mut tick_interval = interval(tick_duration);
        tick_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tick_interval.tick().await;
            let tick_start = Instant::now();

            // Drain drone inbox
            self.process_inbox();

            if !self.paused {
                let summary = self.session.update(tick_delta(), &*self.terrain, &*self.input);
                if summary.is_notable() {
                    self.snapshot_builder.force_next();
                }
            }

            if self.snapshot_builder.should_send() {
                self.publish();
            }

            if let Some(reason) = self.end_reason() {
                info!(session = %self.session.id(), reason, "Race over");
                break;
            }

            let spent = tick_start.elapsed();
            if spent > tick_duration {
                warn!(
                    session = %self.session.id(),
                    spent_ms = spent.as_millis() as u64,
                    "Tick overran its budget"
                );
            }
        }

        if !self.session.is_finished() {
            self.session.set_finished();
        }
        self.publish();

        let results = self.session.results();
        let _ = self.events_tx.send(HostEvent::Finished(results.clone()));
        info!(session = %self.session.id(), ticks = self.session.tick(), "Race host stopped");
        results
    }

    fn process_inbox(&mut self) {
        while let Ok(msg) = self.inbox_rx.try_recv() {
            match msg.kind {
                MessageKind::Update => {
                    if let Err(e) = self.session.deliver(&msg) {
                        warn!(session = %self.session.id(), error = %e, "Malformed drone update");
                    }
                }
                MessageKind::Start => {
                    if !self.session.is_racing() {
                        self.session.set_started();
                    }
                }
                MessageKind::Stop => {
                    self.session.set_finished();
                }
                MessageKind::Pause => {
                    self.paused = !self.paused;
                    info!(session = %self.session.id(), paused = self.paused, "Pause toggled");
                }
                MessageKind::Chat => {
                    let text = msg.param("text").map(|p| p.as_text()).unwrap_or_default();
                    info!(session = %self.session.id(), text = %text, "Chat");
                }
            }
        }
    }

    fn end_reason(&self) -> Option<&'static str> {
        if self.session.is_finished() {
            return Some("stopped");
        }
        if !self.session.is_started() {
            return None;
        }
        match self.session.mode() {
            SessionMode::Race if self.session.is_empty() => Some("no contestants"),
            SessionMode::Race if self.session.all_finished() => Some("all contestants finished"),
            SessionMode::Race => None,
            SessionMode::Time => match self.time_limit {
                Some(limit) if self.session.elapsed_secs() >= limit => Some("time limit reached"),
                _ => None,
            },
        }
    }

    fn publish(&mut self) {
        let snapshot = self.snapshot_builder.build(&self.session);
        *self.board.write() = Some(snapshot.clone());
        let _ = self.events_tx.send(HostEvent::Standings(snapshot));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::race::circuit::CircuitData;
    use crate::race::terrain::OpenGround;

    fn empty_session(mode: SessionMode) -> Session {
        Session::new(mode, 1, Arc::new(CircuitData::empty("none")))
    }

    #[test]
    fn registry_routes_to_known_hosts() {
        let registry = HostRegistry::new();
        let (_host, handle) = RaceHost::new(empty_session(SessionMode::Race), Arc::new(OpenGround));
        let id = handle.id;
        registry.insert(handle);
        assert_eq!(registry.active_sessions(), 1);
        assert!(registry.route(&id, NetMessage::chat("hi")));
        assert!(!registry.route(&Uuid::new_v4(), NetMessage::chat("hi")));
        assert!(registry.remove(&id).is_some());
        assert_eq!(registry.active_sessions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn time_session_ends_at_limit() {
        let (host, handle) = RaceHost::new(empty_session(SessionMode::Time), Arc::new(OpenGround));
        let host = host.with_time_limit(Duration::from_secs(1));
        let mut events = handle.subscribe();

        let results = host.run().await;
        assert!(results.is_empty());

        let board = handle.standings().unwrap();
        assert!(board.finished);
        assert!(board.tick >= u64::from(SIMULATION_TPS));

        let mut saw_finish = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, HostEvent::Finished(_)) {
                saw_finish = true;
            }
        }
        assert!(saw_finish);
    }

    #[test]
    fn stop_message_ends_race() {
        let (host, handle) = RaceHost::new(empty_session(SessionMode::Time), Arc::new(OpenGround));
        let host = host.wait_for_start();
        assert!(handle.offer(NetMessage::new(MessageKind::Stop)));
        tokio_test::block_on(host.run());
        let board = handle.standings().unwrap();
        assert!(board.finished);
        assert_eq!(board.tick, 1);
    }
}

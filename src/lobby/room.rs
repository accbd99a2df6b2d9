use std::sync::Arc;
use std::time::{Duration, Instant};

use hashbrown::HashSet;
use parking_lot::{Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::RoomConfig;
use crate::game::archetypes::StructureKind;
use crate::game::buildings::{ActionError, SellOutcome};
use crate::game::game_loop::GameLoop;
use crate::game::grid::CellCoord;
use crate::game::performance::TickBudget;
use crate::game::state::{EntityId, PlayerId};
use crate::metrics::RoomGauges;
use crate::net::protocol::{self, ClientMessage, ServerMessage, Snapshot};

/// Snapshots buffered per subscriber before it starts lagging
const SNAPSHOT_CHANNEL_CAPACITY: usize = 64;

/// Room state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomState {
    /// Created, no player has joined yet
    Waiting,
    /// Simulation running
    Playing,
    /// Nexus destroyed
    Ended,
    /// Removed from the registry, tick task should stop
    Closing,
}

/// One room: its players and its authoritative simulation
pub struct GameRoom {
    pub id: Uuid,
    pub name: String,
    pub state: RoomState,
    pub max_players: usize,
    pub created_at: Instant,
    players: HashSet<PlayerId>,
    game_loop: GameLoop,
    budget: TickBudget,
}

impl GameRoom {
    pub fn new(name: String, config: RoomConfig, max_players: usize, tick_rate: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            state: RoomState::Waiting,
            max_players,
            created_at: Instant::now(),
            players: HashSet::new(),
            game_loop: GameLoop::new(config),
            budget: TickBudget::new(tick_rate),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= self.max_players
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn contains(&self, player_id: PlayerId) -> bool {
        self.players.contains(&player_id)
    }

    pub fn player_ids(&self) -> Vec<PlayerId> {
        self.players.iter().copied().collect()
    }

    pub fn game_loop(&self) -> &GameLoop {
        &self.game_loop
    }

    pub fn game_loop_mut(&mut self) -> &mut GameLoop {
        &mut self.game_loop
    }

    pub fn budget(&self) -> &TickBudget {
        &self.budget
    }

    /// Add a player. The first join starts the simulation.
    pub fn add_player(&mut self, player_id: PlayerId) -> Result<(), RoomError> {
        match self.state {
            RoomState::Ended => return Err(RoomError::GameEnded),
            RoomState::Closing => return Err(RoomError::Closing),
            // Emptied: the tick task is about to stop
            RoomState::Playing if self.players.is_empty() => return Err(RoomError::Closing),
            _ => {}
        }
        if self.players.contains(&player_id) {
            return Ok(());
        }
        if self.is_full() {
            return Err(RoomError::RoomFull);
        }
        if !self.budget.status().can_accept_players() {
            return Err(RoomError::Overloaded);
        }

        self.players.insert(player_id);
        if self.state == RoomState::Waiting {
            self.state = RoomState::Playing;
            info!("Room {} ({}) started", self.name, self.id);
        }
        Ok(())
    }

    pub fn remove_player(&mut self, player_id: PlayerId) -> bool {
        self.players.remove(&player_id)
    }

    /// Whether the tick task should stop
    pub fn should_close(&self) -> bool {
        match self.state {
            RoomState::Waiting => false,
            RoomState::Playing => self.players.is_empty(),
            RoomState::Ended | RoomState::Closing => true,
        }
    }

    /// Mark an emptied room as closing once its tick task stops
    pub fn retire(&mut self) {
        if self.state == RoomState::Playing {
            self.state = RoomState::Closing;
            info!("Room {} ({}) closed", self.name, self.id);
        }
    }

    /// Run one simulation step and time it. Returns the measured duration.
    pub fn tick(&mut self, dt: f32) -> Option<Duration> {
        if self.state != RoomState::Playing {
            return None;
        }
        self.budget.tick_start();
        self.game_loop.tick(dt);
        let elapsed = self.budget.tick_end();
        if self.game_loop.is_game_over() {
            self.state = RoomState::Ended;
        }
        elapsed
    }

    pub fn snapshot(&mut self) -> Snapshot {
        self.game_loop.serialize_snapshot()
    }

    pub fn gauges(&self) -> RoomGauges {
        let state = self.game_loop.state();
        RoomGauges {
            players: self.players.len() as u64,
            enemies: state.alive_enemy_count() as u64,
            turrets: state.turrets.len() as u64,
            projectiles: state.projectiles.len() as u64,
            wave: self.game_loop.director().wave() as u64,
            budget_status: self.budget.status().code(),
        }
    }

    fn ensure_member(&self, player_id: PlayerId) -> Result<(), RoomError> {
        if self.players.contains(&player_id) {
            Ok(())
        } else {
            Err(RoomError::PlayerNotFound)
        }
    }

    pub fn place_building(
        &mut self,
        player_id: PlayerId,
        cell: CellCoord,
        kind: StructureKind,
    ) -> Result<EntityId, RoomError> {
        self.ensure_member(player_id)?;
        Ok(self.game_loop.place_building(cell, kind, player_id)?)
    }

    pub fn sell_building(&mut self, player_id: PlayerId, cell: CellCoord) -> Result<SellOutcome, RoomError> {
        self.ensure_member(player_id)?;
        Ok(self.game_loop.sell_building(cell, player_id)?)
    }

    pub fn upgrade_building(&mut self, player_id: PlayerId, cell: CellCoord) -> Result<u8, RoomError> {
        self.ensure_member(player_id)?;
        Ok(self.game_loop.upgrade_building(cell, player_id)?)
    }

    pub fn collect_extractor(&mut self, player_id: PlayerId, cell: CellCoord) -> Result<u32, RoomError> {
        self.ensure_member(player_id)?;
        Ok(self.game_loop.collect_extractor(cell)?)
    }

    /// Apply a decoded client message
    pub fn handle_message(&mut self, player_id: PlayerId, message: ClientMessage) -> Result<(), RoomError> {
        match message {
            ClientMessage::Place { cell, kind } => {
                let kind = StructureKind::from_id(kind).ok_or(RoomError::UnknownKind(kind))?;
                self.place_building(player_id, cell, kind).map(|_| ())
            }
            ClientMessage::Sell { cell } => self.sell_building(player_id, cell).map(|_| ()),
            ClientMessage::Upgrade { cell } => self.upgrade_building(player_id, cell).map(|_| ()),
            ClientMessage::Collect { cell } => self.collect_extractor(player_id, cell).map(|_| ()),
        }
    }
}

/// Shared handle to a room. Ticks and player actions take the same lock.
#[derive(Clone)]
pub struct RoomHandle {
    id: Uuid,
    inner: Arc<Mutex<GameRoom>>,
    snapshots: broadcast::Sender<Arc<Vec<u8>>>,
}

impl RoomHandle {
    pub fn new(room: GameRoom) -> Self {
        let (snapshots, _) = broadcast::channel(SNAPSHOT_CHANNEL_CAPACITY);
        Self {
            id: room.id(),
            inner: Arc::new(Mutex::new(room)),
            snapshots,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Never hold the guard across an await point
    pub fn lock(&self) -> MutexGuard<'_, GameRoom> {
        self.inner.lock()
    }

    /// Retired or removed from the registry. The broadcast sender outlives the
    /// tick task, so subscribers check this rather than waiting for `Closed`.
    pub fn is_closing(&self) -> bool {
        self.lock().state == RoomState::Closing
    }

    /// Receive encoded `ServerMessage::Snapshot` frames
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Vec<u8>>> {
        self.snapshots.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.snapshots.receiver_count()
    }

    /// Fan an encoded frame out to every subscriber. Returns receivers reached.
    pub fn publish(&self, frame: Arc<Vec<u8>>) -> usize {
        self.snapshots.send(frame).unwrap_or(0)
    }

    /// Decode and apply a client frame. Rejections come back as a message for the sender.
    pub fn handle_frame(&self, player_id: PlayerId, frame: &[u8]) -> Option<ServerMessage> {
        let message: ClientMessage = match protocol::decode(frame) {
            Ok(message) => message,
            Err(e) => {
                debug!("Room {}: bad frame from {}: {}", self.id, player_id, e);
                return Some(ServerMessage::ActionRejected {
                    code: "malformed".to_string(),
                });
            }
        };
        match self.lock().handle_message(player_id, message) {
            Ok(()) => None,
            Err(e) => Some(ServerMessage::ActionRejected {
                code: e.code().to_string(),
            }),
        }
    }

    pub fn welcome(&self, player_id: PlayerId) -> ServerMessage {
        let room = self.lock();
        let state = room.game_loop().state();
        ServerMessage::Welcome {
            player_id,
            room_id: self.id,
            width: state.grid.width(),
            height: state.grid.height(),
            mode: room.game_loop().director().mode(),
        }
    }
}

/// Room errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum RoomError {
    #[error("Room is full")]
    RoomFull,
    #[error("Game has ended")]
    GameEnded,
    #[error("Room is closing")]
    Closing,
    #[error("Room is over its tick budget")]
    Overloaded,
    #[error("Player not found")]
    PlayerNotFound,
    #[error("Unknown structure kind {0}")]
    UnknownKind(u8),
    #[error(transparent)]
    Action(#[from] ActionError),
}

impl RoomError {
    pub fn code(&self) -> &'static str {
        match self {
            RoomError::RoomFull => "room_full",
            RoomError::GameEnded => "game_ended",
            RoomError::Closing => "closing",
            RoomError::Overloaded => "overloaded",
            RoomError::PlayerNotFound => "not_in_room",
            RoomError::UnknownKind(_) => "unknown_kind",
            RoomError::Action(e) => e.code(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::archetypes::TurretKind;
    use crate::game::constants::tick::DT;
    use crate::game::grid::CellState;
    use crate::game::state::ResourceBundle;

    fn test_room(max_players: usize) -> GameRoom {
        GameRoom::new(
            "Test Room".to_string(),
            RoomConfig::default().with_seed(9),
            max_players,
            20,
        )
    }

    fn buildable_cell(room: &mut GameRoom) -> CellCoord {
        let cell = CellCoord::new(3, 3);
        let state = room.game_loop_mut().state_mut();
        state.grid.set_cell_state(cell, CellState::Empty).unwrap();
        state.resources = ResourceBundle::new(1000, 1000, 1000);
        cell
    }

    #[test]
    fn test_room_new() {
        let room = test_room(4);
        assert_eq!(room.state, RoomState::Waiting);
        assert!(room.is_empty());
        assert!(!room.should_close());
    }

    #[test]
    fn test_first_join_starts_room() {
        let mut room = test_room(4);
        room.add_player(Uuid::new_v4()).unwrap();
        assert_eq!(room.state, RoomState::Playing);
        assert_eq!(room.player_count(), 1);
    }

    #[test]
    fn test_room_full() {
        let mut room = test_room(2);
        room.add_player(Uuid::new_v4()).unwrap();
        room.add_player(Uuid::new_v4()).unwrap();
        let result = room.add_player(Uuid::new_v4());
        assert!(matches!(result, Err(RoomError::RoomFull)));
    }

    #[test]
    fn test_waiting_room_does_not_tick() {
        let mut room = test_room(4);
        assert!(room.tick(DT).is_none());
        assert_eq!(room.game_loop().state().tick, 0);
    }

    #[test]
    fn test_close_when_last_player_leaves() {
        let mut room = test_room(4);
        let id = Uuid::new_v4();
        room.add_player(id).unwrap();
        room.tick(DT);
        assert!(!room.should_close());
        assert!(room.remove_player(id));
        assert!(room.should_close());
        assert!(matches!(room.add_player(Uuid::new_v4()), Err(RoomError::Closing)));

        room.retire();
        assert_eq!(room.state, RoomState::Closing);
        assert!(room.should_close());
    }

    #[test]
    fn test_handle_reports_closing() {
        let mut room = test_room(4);
        let player = Uuid::new_v4();
        room.add_player(player).unwrap();
        let handle = RoomHandle::new(room);
        let _rx = handle.subscribe();
        assert!(!handle.is_closing());

        handle.lock().remove_player(player);
        handle.lock().retire();
        assert!(handle.is_closing());
    }

    #[test]
    fn test_retire_keeps_ended_state() {
        let mut room = test_room(4);
        room.retire();
        assert_eq!(room.state, RoomState::Waiting);

        room.add_player(Uuid::new_v4()).unwrap();
        room.game_loop_mut().state_mut().damage_nexus(10_000.0);
        room.tick(DT);
        room.retire();
        assert_eq!(room.state, RoomState::Ended);
    }

    #[test]
    fn test_game_over_ends_room() {
        let mut room = test_room(4);
        room.add_player(Uuid::new_v4()).unwrap();
        room.game_loop_mut().state_mut().damage_nexus(10_000.0);
        room.tick(DT);
        assert_eq!(room.state, RoomState::Ended);
        assert!(room.should_close());
        assert!(matches!(room.add_player(Uuid::new_v4()), Err(RoomError::GameEnded)));
    }

    #[test]
    fn test_actions_require_membership() {
        let mut room = test_room(4);
        let cell = buildable_cell(&mut room);
        let result = room.place_building(Uuid::new_v4(), cell, StructureKind::Wall);
        assert!(matches!(result, Err(RoomError::PlayerNotFound)));
    }

    #[test]
    fn test_handle_message_place_and_reject() {
        let mut room = test_room(4);
        let player = Uuid::new_v4();
        room.add_player(player).unwrap();
        let cell = buildable_cell(&mut room);

        let place = ClientMessage::Place {
            cell,
            kind: TurretKind::Blaster.id(),
        };
        room.handle_message(player, place.clone()).unwrap();
        assert_eq!(room.game_loop().state().turrets.len(), 1);

        let err = room.handle_message(player, place).unwrap_err();
        assert_eq!(err.code(), "occupied");

        let err = room
            .handle_message(player, ClientMessage::Place { cell, kind: 77 })
            .unwrap_err();
        assert_eq!(err.code(), "unknown_kind");
    }

    #[test]
    fn test_handle_frame_through_handle() {
        let mut room = test_room(4);
        let player = Uuid::new_v4();
        room.add_player(player).unwrap();
        let cell = buildable_cell(&mut room);
        let handle = RoomHandle::new(room);

        let frame = protocol::encode(&ClientMessage::Place { cell, kind: 100 }).unwrap();
        assert!(handle.handle_frame(player, &frame).is_none());
        assert_eq!(handle.lock().game_loop().state().walls.len(), 1);

        match handle.handle_frame(player, &[1, 2]) {
            Some(ServerMessage::ActionRejected { code }) => assert_eq!(code, "malformed"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_publish_reaches_subscribers() {
        let handle = RoomHandle::new(test_room(4));
        assert_eq!(handle.publish(Arc::new(vec![1])), 0);
        let mut rx = handle.subscribe();
        assert_eq!(handle.publish(Arc::new(vec![1, 2, 3])), 1);
        assert_eq!(*rx.try_recv().unwrap(), vec![1, 2, 3]);
    }
}

use hashbrown::HashMap;
use tracing::info;
use uuid::Uuid;

use crate::config::{RoomConfig, ServerConfig};
use crate::game::state::PlayerId;
use crate::lobby::room::{GameRoom, RoomError, RoomHandle, RoomState};

/// Registry of live rooms
pub struct LobbyManager {
    rooms: HashMap<Uuid, RoomHandle>,
    player_rooms: HashMap<PlayerId, Uuid>,
    max_rooms: usize,
    max_players_per_room: usize,
    tick_rate: u32,
    default_room: RoomConfig,
}

impl LobbyManager {
    pub fn new(max_rooms: usize) -> Self {
        let defaults = ServerConfig::default();
        Self {
            rooms: HashMap::new(),
            player_rooms: HashMap::new(),
            max_rooms,
            max_players_per_room: defaults.max_players_per_room,
            tick_rate: defaults.tick_rate,
            default_room: defaults.room,
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            max_players_per_room: config.max_players_per_room,
            tick_rate: config.tick_rate,
            default_room: config.room.clone(),
            ..Self::new(config.max_rooms)
        }
    }

    /// Create a room with the default room settings
    pub fn create_room(&mut self, name: String) -> Result<RoomHandle, ManagerError> {
        let config = self.default_room.clone();
        self.create_room_with(name, config)
    }

    pub fn create_room_with(&mut self, name: String, config: RoomConfig) -> Result<RoomHandle, ManagerError> {
        if self.rooms.len() >= self.max_rooms {
            return Err(ManagerError::TooManyRooms);
        }
        config.validate().map_err(ManagerError::InvalidConfig)?;

        let room = GameRoom::new(name, config, self.max_players_per_room, self.tick_rate);
        let handle = RoomHandle::new(room);
        info!("Created room {} ({} rooms)", handle.id(), self.rooms.len() + 1);
        self.rooms.insert(handle.id(), handle.clone());
        Ok(handle)
    }

    /// First room still accepting players, or a new one
    pub fn find_or_create_room(&mut self) -> Result<RoomHandle, ManagerError> {
        let open = self.rooms.values().find(|handle| {
            let room = handle.lock();
            matches!(room.state, RoomState::Waiting | RoomState::Playing)
                && !room.should_close()
                && !room.is_full()
        });
        if let Some(handle) = open {
            return Ok(handle.clone());
        }
        self.create_room(format!("Room {}", self.rooms.len() + 1))
    }

    pub fn get_room(&self, room_id: Uuid) -> Option<RoomHandle> {
        self.rooms.get(&room_id).cloned()
    }

    /// Remove a room and tell its tick task to stop
    pub fn remove_room(&mut self, room_id: Uuid) -> Option<RoomHandle> {
        let handle = self.rooms.remove(&room_id)?;
        let mut room = handle.lock();
        for player_id in room.player_ids() {
            self.player_rooms.remove(&player_id);
        }
        room.state = RoomState::Closing;
        drop(room);
        Some(handle)
    }

    pub fn join_room(&mut self, room_id: Uuid, player_id: PlayerId) -> Result<RoomHandle, ManagerError> {
        if self.player_rooms.contains_key(&player_id) {
            return Err(ManagerError::AlreadyInRoom);
        }
        let handle = self.rooms.get(&room_id).ok_or(ManagerError::RoomNotFound)?;
        {
            let mut room = handle.lock();
            if room.should_close() {
                return Err(RoomError::Closing.into());
            }
            room.add_player(player_id)?;
        }
        self.player_rooms.insert(player_id, room_id);
        Ok(handle.clone())
    }

    pub fn leave_room(&mut self, player_id: PlayerId) -> Result<(), ManagerError> {
        let room_id = self
            .player_rooms
            .remove(&player_id)
            .ok_or(ManagerError::NotInRoom)?;

        if let Some(handle) = self.rooms.get(&room_id) {
            handle.lock().remove_player(player_id);
        }
        Ok(())
    }

    pub fn get_player_room(&self, player_id: PlayerId) -> Option<Uuid> {
        self.player_rooms.get(&player_id).copied()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn total_player_count(&self) -> usize {
        self.player_rooms.len()
    }

    /// Room browser listing
    pub fn list_rooms(&self) -> Vec<RoomInfo> {
        self.rooms
            .values()
            .map(|handle| {
                let room = handle.lock();
                RoomInfo {
                    id: room.id(),
                    name: room.name.clone(),
                    player_count: room.player_count(),
                    max_players: room.max_players,
                    state: room.state,
                    wave: room.game_loop().director().wave(),
                }
            })
            .collect()
    }

    /// Drop rooms whose tick task has finished. Returns the number removed.
    pub fn reap_closed(&mut self) -> usize {
        let closed: Vec<Uuid> = self
            .rooms
            .iter()
            .filter(|(_, handle)| {
                let room = handle.lock();
                room.state != RoomState::Waiting && room.should_close()
            })
            .map(|(id, _)| *id)
            .collect();
        for room_id in &closed {
            self.remove_room(*room_id);
        }
        closed.len()
    }

    pub fn shutdown_all_rooms(&mut self) {
        let ids: Vec<Uuid> = self.rooms.keys().copied().collect();
        for room_id in ids {
            self.remove_room(room_id);
        }
        self.player_rooms.clear();
        info!("All rooms shut down");
    }
}

impl Default for LobbyManager {
    fn default() -> Self {
        Self::new(100)
    }
}

/// Room information for listing
#[derive(Debug, Clone)]
pub struct RoomInfo {
    pub id: Uuid,
    pub name: String,
    pub player_count: usize,
    pub max_players: usize,
    pub state: RoomState,
    pub wave: u32,
}

/// Manager errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ManagerError {
    #[error("Too many rooms")]
    TooManyRooms,
    #[error("Room not found")]
    RoomNotFound,
    #[error("Already in a room")]
    AlreadyInRoom,
    #[error("Not in a room")]
    NotInRoom,
    #[error("Invalid room config: {0}")]
    InvalidConfig(String),
    #[error("Room error: {0}")]
    RoomError(#[from] RoomError),
}

use serde::{Deserialize, Serialize};

use crate::config::GameMode;
use crate::game::grid::{CellCoord, ResourceKind};
use crate::game::state::{
    Effect, EnemyMode, EntityId, GameState, PlayerId, ProjectileKind, ResourceBundle,
};
use crate::game::systems::director::Director;
use crate::util::vec2::Vec2;

/// Player actions forwarded by the transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientMessage {
    /// Build a structure by kind id (turrets 0-12, wall 100, extractor 101)
    Place { cell: CellCoord, kind: u8 },
    Sell { cell: CellCoord },
    Upgrade { cell: CellCoord },
    Collect { cell: CellCoord },
}

/// Messages from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ServerMessage {
    /// Sent once after joining a room
    Welcome {
        player_id: PlayerId,
        room_id: uuid::Uuid,
        width: u32,
        height: u32,
        mode: GameMode,
    },
    Snapshot(Snapshot),
    /// Action refused with a stable reason code
    ActionRejected { code: String },
}

/// Turret status flags
pub mod turret_flags {
    pub const SPEED_BOOSTED: u8 = 1 << 0;
    pub const DAMAGE_BOOSTED: u8 = 1 << 1;
}

/// Enemy status flags
pub mod enemy_flags {
    pub const SLOWED: u8 = 1 << 0;
    pub const BURNING: u8 = 1 << 1;
    pub const PROTECTED: u8 = 1 << 2;
    pub const ATTACKING: u8 = 1 << 3;
    pub const FLYING: u8 = 1 << 4;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NexusSnapshot {
    pub cell: CellCoord,
    pub health: f32,
    pub max_health: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurretSnapshot {
    pub id: EntityId,
    pub kind: u8,
    pub cell: CellCoord,
    pub position: Vec2,
    pub level: u8,
    pub health: f32,
    pub max_health: f32,
    pub angle: f32,
    pub flags: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WallSnapshot {
    pub id: EntityId,
    pub cell: CellCoord,
    pub level: u8,
    pub health: f32,
    pub max_health: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractorSnapshot {
    pub id: EntityId,
    pub cell: CellCoord,
    pub resource: ResourceKind,
    pub level: u8,
    pub stored: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnemySnapshot {
    pub id: EntityId,
    pub kind: u8,
    pub position: Vec2,
    pub heading: f32,
    pub health: f32,
    pub max_health: f32,
    pub flags: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectileSnapshot {
    pub id: EntityId,
    pub kind: ProjectileKind,
    /// Turret kind id that fired it
    pub source: u8,
    pub position: Vec2,
    pub end: Vec2,
}

/// Everything a client needs to render one tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub tick: u64,
    pub elapsed: f32,
    pub mode: GameMode,
    pub wave: u32,
    /// Seconds until the next wave, 0 while a wave runs
    pub rest_remaining: f32,
    pub difficulty: f32,
    pub resources: ResourceBundle,
    pub nexus: NexusSnapshot,
    pub turrets: Vec<TurretSnapshot>,
    pub walls: Vec<WallSnapshot>,
    pub extractors: Vec<ExtractorSnapshot>,
    pub enemies: Vec<EnemySnapshot>,
    pub projectiles: Vec<ProjectileSnapshot>,
    pub effects: Vec<Effect>,
    pub game_over: bool,
}

impl Snapshot {
    /// Project live entities and drain the effect queue
    pub fn capture(state: &mut GameState, director: &Director) -> Self {
        let turrets = state
            .turrets
            .iter()
            .map(|t| {
                let mut flags = 0;
                if t.speed_boost > 0.0 {
                    flags |= turret_flags::SPEED_BOOSTED;
                }
                if t.damage_boost > 0.0 {
                    flags |= turret_flags::DAMAGE_BOOSTED;
                }
                TurretSnapshot {
                    id: t.id,
                    kind: t.kind.id(),
                    cell: t.anchor,
                    position: t.position,
                    level: t.level,
                    health: t.health,
                    max_health: t.max_health(),
                    angle: t.angle,
                    flags,
                }
            })
            .collect();

        let walls = state
            .walls
            .iter()
            .map(|w| WallSnapshot {
                id: w.id,
                cell: w.cell,
                level: w.level,
                health: w.health,
                max_health: w.max_health(),
            })
            .collect();

        let extractors = state
            .extractors
            .iter()
            .map(|x| ExtractorSnapshot {
                id: x.id,
                cell: x.cell,
                resource: x.resource,
                level: x.level,
                stored: x.stored,
            })
            .collect();

        let enemies = state
            .enemies
            .iter()
            .filter(|e| e.is_alive())
            .map(|e| {
                let mut flags = 0;
                if e.slow_multiplier < 1.0 {
                    flags |= enemy_flags::SLOWED;
                }
                if e.burn.is_some() {
                    flags |= enemy_flags::BURNING;
                }
                if e.is_protected() {
                    flags |= enemy_flags::PROTECTED;
                }
                if matches!(e.mode, EnemyMode::AttackingObstacle(_)) {
                    flags |= enemy_flags::ATTACKING;
                }
                if e.is_flying() {
                    flags |= enemy_flags::FLYING;
                }
                EnemySnapshot {
                    id: e.id,
                    kind: e.kind.id(),
                    position: e.position,
                    heading: e.heading,
                    health: e.health,
                    max_health: e.max_health,
                    flags,
                }
            })
            .collect();

        let projectiles = state
            .projectiles
            .iter()
            .filter(|p| p.alive)
            .map(|p| ProjectileSnapshot {
                id: p.id,
                kind: p.kind,
                source: p.source.id(),
                position: p.position,
                end: p.end,
            })
            .collect();

        Self {
            tick: state.tick,
            elapsed: state.elapsed,
            mode: director.mode(),
            wave: director.wave(),
            rest_remaining: director.rest_remaining(),
            difficulty: director.difficulty(),
            resources: state.resources,
            nexus: NexusSnapshot {
                cell: state.nexus.cell,
                health: state.nexus.health,
                max_health: state.nexus.max_health,
            },
            turrets,
            walls,
            extractors,
            enemies,
            projectiles,
            effects: state.drain_effects(),
            game_over: state.game_over,
        }
    }
}

/// Encode a message using bincode
/// Uses legacy config for fixed-size integers
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, EncodeError> {
    bincode::serde::encode_to_vec(message, bincode::config::legacy())
        .map_err(|e| EncodeError(e.to_string()))
}

/// Decode a message using bincode
pub fn decode<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, DecodeError> {
    bincode::serde::decode_from_slice(data, bincode::config::legacy())
        .map(|(msg, _)| msg)
        .map_err(|e| DecodeError(e.to_string()))
}

/// JSON form for debugging and web clients
pub fn to_json<T: Serialize>(message: &T) -> Result<String, EncodeError> {
    serde_json::to_string(message).map_err(|e| EncodeError(e.to_string()))
}

pub fn from_json<T: for<'de> Deserialize<'de>>(data: &str) -> Result<T, DecodeError> {
    serde_json::from_str(data).map_err(|e| DecodeError(e.to_string()))
}

#[derive(Debug, thiserror::Error)]
#[error("Encode error: {0}")]
pub struct EncodeError(String);

#[derive(Debug, thiserror::Error)]
#[error("Decode error: {0}")]
pub struct DecodeError(String);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RoomConfig;
    use crate::game::archetypes::{EnemyKind, StructureKind, TurretKind};
    use crate::game::buildings;
    use crate::game::grid::CellState;
    use uuid::Uuid;

    fn populated_state() -> (GameState, Director) {
        let mut state = GameState::new(&RoomConfig::default().with_seed(21));
        state.resources = ResourceBundle::new(2000, 2000, 2000);
        let cell = CellCoord::new(4, 4);
        state.grid.set_cell_state(cell, CellState::Empty).unwrap();
        buildings::place(
            &mut state,
            cell,
            StructureKind::Turret(TurretKind::Blaster),
            Uuid::new_v4(),
        )
        .unwrap();
        let position = state.grid.cell_center(CellCoord::new(8, 8));
        state.spawn_enemy(EnemyKind::Flyer, position, 1.0, 1.0);
        state.push_effect(Effect::WaveStarted { wave: 1 });
        (state, Director::new(GameMode::Waves))
    }

    #[test]
    fn test_capture_projects_entities() {
        let (mut state, director) = populated_state();
        let snapshot = Snapshot::capture(&mut state, &director);

        assert_eq!(snapshot.turrets.len(), 1);
        assert_eq!(snapshot.turrets[0].kind, TurretKind::Blaster.id());
        assert_eq!(snapshot.enemies.len(), 1);
        let flags = snapshot.enemies[0].flags;
        assert_ne!(flags & enemy_flags::FLYING, 0);
        assert_ne!(flags & enemy_flags::PROTECTED, 0);
        assert_eq!(snapshot.effects, vec![Effect::WaveStarted { wave: 1 }]);
        assert_eq!(snapshot.nexus.health, snapshot.nexus.max_health);
    }

    #[test]
    fn test_capture_drains_effects() {
        let (mut state, director) = populated_state();
        let first = Snapshot::capture(&mut state, &director);
        let second = Snapshot::capture(&mut state, &director);
        assert_eq!(first.effects.len(), 1);
        assert!(second.effects.is_empty());
        assert!(state.effects.is_empty());
    }

    #[test]
    fn test_snapshot_bincode() {
        let (mut state, director) = populated_state();
        let snapshot = Snapshot::capture(&mut state, &director);
        let encoded = encode(&ServerMessage::Snapshot(snapshot.clone())).unwrap();
        let decoded: ServerMessage = decode(&encoded).unwrap();
        match decoded {
            ServerMessage::Snapshot(s) => assert_eq!(s, snapshot),
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_snapshot_json() {
        let (mut state, director) = populated_state();
        let snapshot = Snapshot::capture(&mut state, &director);
        let json = to_json(&snapshot).unwrap();
        assert!(json.contains("\"WaveStarted\""));
        let back: Snapshot = from_json(&json).unwrap();
        assert_eq!(back.turrets, snapshot.turrets);
    }

    #[test]
    fn test_client_message() {
        let msg = ClientMessage::Place {
            cell: CellCoord::new(3, 7),
            kind: 100,
        };
        let encoded = encode(&msg).unwrap();
        let decoded: ClientMessage = decode(&encoded).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_decode_garbage() {
        assert!(decode::<ClientMessage>(&[0xff, 0xff, 0xff, 0xff, 0x01]).is_err());
    }
}

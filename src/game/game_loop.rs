//! Per-room simulation composition root
//!
//! One `tick` runs every system in a fixed order:
//!
//! 1. director spawns
//! 2. invalidated paths recomputed
//! 3. extractor yield
//! 4. enemy movement, attacks and support abilities
//! 5. turret support pass then firing pass
//! 6. projectile motion and collision
//! 7. reaping of dead enemies and destroyed structures
//! 8. game-over check

use rand::Rng;
use tracing::{debug, info};

use crate::config::RoomConfig;
use crate::game::archetypes::{EnemyRole, StructureKind};
use crate::game::buildings::{self, ActionError, SellOutcome};
use crate::game::constants::enemy::SPLIT_SCATTER;
use crate::game::grid::CellCoord;
use crate::game::state::{Effect, EntityId, GameState, PlayerId};
use crate::game::systems::{combat, director::Director, economy, enemy, projectile};
use crate::net::protocol::Snapshot;
use crate::util::vec2::Vec2;

/// Authoritative simulation of one room
pub struct GameLoop {
    state: GameState,
    director: Director,
    config: RoomConfig,
}

impl GameLoop {
    pub fn new(config: RoomConfig) -> Self {
        let state = GameState::new(&config);
        let director = Director::new(config.mode);
        Self {
            state,
            director,
            config,
        }
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut GameState {
        &mut self.state
    }

    pub fn director(&self) -> &Director {
        &self.director
    }

    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    pub fn is_game_over(&self) -> bool {
        self.state.game_over
    }

    /// Advance the simulation by `dt` seconds. No-op once the game is over.
    pub fn tick(&mut self, dt: f32) {
        if self.state.game_over {
            return;
        }
        self.state.tick += 1;
        self.state.elapsed += dt;

        self.director.update(&mut self.state, dt);
        enemy::recompute_paths(&mut self.state);
        economy::update_extractors(&mut self.state, dt);
        enemy::update_enemies(&mut self.state, dt);
        combat::update_turrets(&mut self.state, dt);
        projectile::update_projectiles(&mut self.state, dt);
        self.reap();
        self.check_game_over();
    }

    /// Pay rewards, split splitters, drop dead enemies and destroyed structures
    fn reap(&mut self) {
        let state = &mut self.state;
        let mut children = Vec::new();

        for enemy in state.enemies.iter().filter(|e| !e.is_alive()) {
            let killed = enemy.health <= 0.0 && !enemy.reached_nexus;
            if killed {
                state.resources.add(enemy.archetype().reward);
                if let EnemyRole::Splitter { children: count, child } = enemy.archetype().role {
                    // Children inherit the parent's wave scaling
                    let parent = enemy.archetype();
                    let health_scale = enemy.max_health / parent.health.max(f32::EPSILON);
                    let speed_scale = enemy.speed / parent.speed.max(f32::EPSILON);
                    for _ in 0..count {
                        children.push((child, enemy.position, health_scale, speed_scale));
                    }
                }
            }
            state.effects.push(Effect::EnemyDeath {
                id: enemy.id,
                kind: enemy.kind,
                position: enemy.position,
            });
        }
        state.enemies.retain(|e| e.is_alive());

        for (kind, position, health_scale, speed_scale) in children {
            let angle = state.rng.gen_range(0.0..std::f32::consts::TAU);
            let offset = Vec2::from_angle(angle) * SPLIT_SCATTER;
            state.spawn_enemy(kind, position + offset, health_scale, speed_scale);
        }

        buildings::remove_destroyed(state);
    }

    fn check_game_over(&mut self) {
        if self.state.game_over || !self.state.nexus.is_destroyed() {
            return;
        }
        self.state.game_over = true;
        let wave = self.director.wave();
        let elapsed = self.state.elapsed;
        self.state.push_effect(Effect::GameOver { wave, elapsed });
        info!(
            "Nexus destroyed on wave {} after {:.1}s (tick {})",
            wave, elapsed, self.state.tick
        );
    }

    pub fn place_building(
        &mut self,
        cell: CellCoord,
        kind: StructureKind,
        actor: PlayerId,
    ) -> Result<EntityId, ActionError> {
        buildings::place(&mut self.state, cell, kind, actor)
    }

    pub fn sell_building(&mut self, cell: CellCoord, actor: PlayerId) -> Result<SellOutcome, ActionError> {
        buildings::sell(&mut self.state, cell, actor)
    }

    pub fn upgrade_building(&mut self, cell: CellCoord, actor: PlayerId) -> Result<u8, ActionError> {
        buildings::upgrade(&mut self.state, cell, actor)
    }

    pub fn collect_extractor(&mut self, cell: CellCoord) -> Result<u32, ActionError> {
        buildings::collect_extractor(&mut self.state, cell)
    }

    /// Project the current state into a snapshot, draining queued effects
    pub fn serialize_snapshot(&mut self) -> Snapshot {
        let snapshot = Snapshot::capture(&mut self.state, &self.director);
        debug!(
            "Snapshot tick {} with {} effects",
            snapshot.tick,
            snapshot.effects.len()
        );
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameMode;
    use crate::game::archetypes::{EnemyKind, TurretKind};
    use crate::game::constants::tick::DT;
    use crate::game::grid::CellState;
    use crate::game::state::{EnemyMode, ResourceBundle};
    use uuid::Uuid;

    fn test_loop() -> GameLoop {
        GameLoop::new(RoomConfig::default().with_seed(11))
    }

    fn spawn(game: &mut GameLoop, kind: EnemyKind, position: Vec2) -> usize {
        let state = game.state_mut();
        state.spawn_enemy(kind, position, 1.0, 1.0);
        state.enemies.len() - 1
    }

    #[test]
    fn test_tick_advances_clock() {
        let mut game = test_loop();
        game.tick(DT);
        game.tick(DT);
        assert_eq!(game.state().tick, 2);
        assert!((game.state().elapsed - 2.0 * DT).abs() < 1e-6);
    }

    #[test]
    fn test_killed_enemy_pays_reward() {
        let mut game = test_loop();
        let i = spawn(&mut game, EnemyKind::Grunt, Vec2::new(100.0, 100.0));
        let before = game.state().resources;
        let state = game.state_mut();
        state.enemies[i].health = 0.0;
        state.enemies[i].mode = EnemyMode::Dead;

        game.reap();
        assert!(game.state().enemies.is_empty());
        assert_eq!(game.state().resources.iron, before.iron + 5);
        assert!(matches!(game.state().effects[0], Effect::EnemyDeath { .. }));
    }

    #[test]
    fn test_nexus_contact_pays_nothing() {
        let mut game = test_loop();
        let i = spawn(&mut game, EnemyKind::Grunt, Vec2::new(100.0, 100.0));
        let before = game.state().resources;
        let state = game.state_mut();
        state.enemies[i].mode = EnemyMode::Dead;
        state.enemies[i].reached_nexus = true;

        game.reap();
        assert!(game.state().enemies.is_empty());
        assert_eq!(game.state().resources, before);
    }

    #[test]
    fn test_splitter_spawns_children() {
        let mut game = test_loop();
        let position = game.state().nexus.position + Vec2::new(-120.0, 0.0);
        let i = spawn(&mut game, EnemyKind::Splitter, position);
        let state = game.state_mut();
        state.enemies[i].health = -1.0;
        state.enemies[i].mode = EnemyMode::Dead;

        game.reap();
        let enemies = &game.state().enemies;
        assert_eq!(enemies.len(), 3);
        for child in enemies {
            assert_eq!(child.kind, EnemyKind::Mini);
            assert!(child.position.distance_to(position) <= SPLIT_SCATTER + 1e-3);
            assert!((child.max_health - child.archetype().health).abs() < 1e-3);
        }
    }

    #[test]
    fn test_game_over_freezes_room() {
        let mut game = test_loop();
        game.state_mut().damage_nexus(5000.0);
        game.tick(DT);
        assert!(game.is_game_over());
        let tick = game.state().tick;
        assert!(game
            .state()
            .effects
            .iter()
            .any(|e| matches!(e, Effect::GameOver { .. })));

        game.tick(DT);
        assert_eq!(game.state().tick, tick);
        let cell = CellCoord::new(2, 2);
        assert_eq!(
            game.place_building(cell, StructureKind::Wall, Uuid::new_v4()),
            Err(ActionError::GameOver)
        );
    }

    #[test]
    fn test_snapshot_drains_effects_once() {
        let mut game = test_loop();
        game.state_mut().damage_nexus(10.0);
        let first = game.serialize_snapshot();
        assert_eq!(first.effects.len(), 1);
        let second = game.serialize_snapshot();
        assert!(second.effects.is_empty());
    }

    #[test]
    fn test_turret_kills_grunt_over_time() {
        let mut game = GameLoop::new(
            RoomConfig::default()
                .with_seed(11)
                .with_mode(GameMode::Waves),
        );
        let owner = Uuid::new_v4();
        let state = game.state_mut();
        state.resources = ResourceBundle::new(1000, 1000, 1000);
        let cell = CellCoord::new(5, 5);
        state.grid.set_cell_state(cell, CellState::Empty).unwrap();
        let turret_pos = state.grid.cell_center(cell);
        game.place_building(cell, StructureKind::Turret(TurretKind::Laser), owner)
            .unwrap();

        let i = spawn(&mut game, EnemyKind::Grunt, turret_pos + Vec2::new(40.0, 0.0));
        let id = game.state().enemies[i].id;
        let iron = game.state().resources.iron;
        // Hold the grunt in place inside laser range
        for _ in 0..60 {
            if let Some(enemy) = game.state_mut().enemies.iter_mut().find(|e| e.id == id) {
                enemy.position = turret_pos + Vec2::new(40.0, 0.0);
                enemy.speed = 0.0;
            }
            game.tick(DT);
        }
        assert!(game.state().enemies.iter().all(|e| e.id != id));
        assert_eq!(game.state().resources.iron, iron + 5);
    }
}

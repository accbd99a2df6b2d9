//! Room state definitions and structures
//!
//! Contains every entity kind (structures, enemies, projectiles), the Nexus,
//! the resource pool and the effect queue. A `GameState` is exclusively owned
//! by one room; nothing here is global.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use uuid::Uuid;

use crate::config::RoomConfig;
use crate::game::archetypes::{
    self, EnemyArchetype, EnemyKind, Movement, StructureKind, TurretArchetype, TurretKind,
};
use crate::game::constants::enemy::SPAWN_PROTECTION;
use crate::game::constants::nexus::MAX_HEALTH;
use crate::game::grid::{CellCoord, Grid, ResourceKind};
use crate::util::vec2::Vec2;

/// Unique player identifier
pub type PlayerId = Uuid;

/// Entity identifier, unique across all entity kinds within a room
pub type EntityId = u64;

// ============================================================================
// Resources
// ============================================================================

/// Per-kind resource amounts (costs, refunds, rewards and the room pool)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResourceBundle {
    pub iron: u32,
    pub copper: u32,
    pub crystal: u32,
}

impl ResourceBundle {
    pub const ZERO: ResourceBundle = ResourceBundle::new(0, 0, 0);

    pub const fn new(iron: u32, copper: u32, crystal: u32) -> Self {
        Self {
            iron,
            copper,
            crystal,
        }
    }

    pub fn get(&self, kind: ResourceKind) -> u32 {
        match kind {
            ResourceKind::Iron => self.iron,
            ResourceKind::Copper => self.copper,
            ResourceKind::Crystal => self.crystal,
        }
    }

    pub fn add_kind(&mut self, kind: ResourceKind, amount: u32) {
        let slot = match kind {
            ResourceKind::Iron => &mut self.iron,
            ResourceKind::Copper => &mut self.copper,
            ResourceKind::Crystal => &mut self.crystal,
        };
        *slot = slot.saturating_add(amount);
    }

    pub fn add(&mut self, other: ResourceBundle) {
        self.iron = self.iron.saturating_add(other.iron);
        self.copper = self.copper.saturating_add(other.copper);
        self.crystal = self.crystal.saturating_add(other.crystal);
    }

    pub fn can_afford(&self, cost: ResourceBundle) -> bool {
        self.iron >= cost.iron && self.copper >= cost.copper && self.crystal >= cost.crystal
    }

    /// Deduct `cost` if every kind is affordable. Leaves the pool untouched otherwise.
    pub fn try_spend(&mut self, cost: ResourceBundle) -> bool {
        if !self.can_afford(cost) {
            return false;
        }
        self.iron -= cost.iron;
        self.copper -= cost.copper;
        self.crystal -= cost.crystal;
        true
    }

    /// Multiply each kind by `factor`, flooring the result
    pub fn scaled_floor(&self, factor: f32) -> ResourceBundle {
        let scale = |v: u32| (v as f64 * factor as f64).floor().max(0.0) as u32;
        ResourceBundle::new(scale(self.iron), scale(self.copper), scale(self.crystal))
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

// ============================================================================
// Structures
// ============================================================================

/// Cells covered by a square footprint of side `size` centered on `anchor`
pub fn footprint_cells(anchor: CellCoord, size: u8) -> SmallVec<[CellCoord; 9]> {
    let half = (size.max(1) as i32 - 1) / 2;
    let mut cells = SmallVec::new();
    for dy in -half..=half {
        for dx in -half..=half {
            cells.push(anchor.offset(dx, dy));
        }
    }
    cells
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turret {
    pub id: EntityId,
    pub kind: TurretKind,
    pub anchor: CellCoord,
    pub position: Vec2,
    pub level: u8,
    pub health: f32,
    /// Seconds until the next activation
    pub cooldown: f32,
    /// Facing angle in radians
    pub angle: f32,
    /// Fractional fire-rate bonus, restamped every tick
    pub speed_boost: f32,
    /// Fractional damage bonus, restamped every tick
    pub damage_boost: f32,
    /// Cumulative cost paid (placement + upgrades)
    pub invested: ResourceBundle,
    pub owner: PlayerId,
}

impl Turret {
    pub fn new(id: EntityId, kind: TurretKind, anchor: CellCoord, position: Vec2, owner: PlayerId) -> Self {
        let archetype = kind.archetype();
        Self {
            id,
            kind,
            anchor,
            position,
            level: 1,
            health: archetype.max_health,
            cooldown: 0.0,
            angle: 0.0,
            speed_boost: 0.0,
            damage_boost: 0.0,
            invested: archetype.cost,
            owner,
        }
    }

    #[inline]
    pub fn archetype(&self) -> &'static TurretArchetype {
        self.kind.archetype()
    }

    pub fn max_health(&self) -> f32 {
        self.archetype().max_health * archetypes::health_multiplier(self.level)
    }

    pub fn damage(&self) -> f32 {
        self.archetype().damage * archetypes::damage_multiplier(self.level)
    }

    pub fn range(&self) -> f32 {
        self.archetype().range * archetypes::range_multiplier(self.level)
    }

    pub fn min_range(&self) -> f32 {
        self.archetype().min_range
    }

    /// Activations per second before boosts
    pub fn fire_rate(&self) -> f32 {
        self.archetype().fire_rate * archetypes::fire_rate_multiplier(self.level)
    }

    pub fn cells(&self) -> SmallVec<[CellCoord; 9]> {
        footprint_cells(self.anchor, self.archetype().footprint)
    }

    pub fn occupies(&self, cell: CellCoord) -> bool {
        let half = (self.archetype().footprint as i32 - 1) / 2;
        (cell.x - self.anchor.x).abs() <= half && (cell.y - self.anchor.y).abs() <= half
    }

    #[inline]
    pub fn is_alive(&self) -> bool {
        self.health > 0.0
    }

    pub fn clear_buffs(&mut self) {
        self.speed_boost = 0.0;
        self.damage_boost = 0.0;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wall {
    pub id: EntityId,
    pub cell: CellCoord,
    pub position: Vec2,
    pub level: u8,
    pub health: f32,
    pub invested: ResourceBundle,
    pub owner: PlayerId,
}

impl Wall {
    pub fn new(id: EntityId, cell: CellCoord, position: Vec2, owner: PlayerId) -> Self {
        Self {
            id,
            cell,
            position,
            level: 1,
            health: archetypes::wall_max_health(1),
            invested: archetypes::WALL_COST,
            owner,
        }
    }

    pub fn max_health(&self) -> f32 {
        archetypes::wall_max_health(self.level)
    }

    #[inline]
    pub fn is_alive(&self) -> bool {
        self.health > 0.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Extractor {
    pub id: EntityId,
    pub cell: CellCoord,
    pub position: Vec2,
    pub resource: ResourceKind,
    pub level: u8,
    /// Accumulated yield not yet moved into the pool
    pub stored: f32,
    pub invested: ResourceBundle,
    pub owner: PlayerId,
}

impl Extractor {
    pub fn new(
        id: EntityId,
        cell: CellCoord,
        position: Vec2,
        resource: ResourceKind,
        owner: PlayerId,
    ) -> Self {
        Self {
            id,
            cell,
            position,
            resource,
            level: 1,
            stored: 0.0,
            invested: archetypes::EXTRACTOR_COST,
            owner,
        }
    }

    pub fn rate(&self) -> f32 {
        archetypes::extractor_rate(self.level)
    }

    pub fn capacity(&self) -> f32 {
        archetypes::extractor_capacity(self.level)
    }
}

/// Index of a structure in its owning collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructureRef {
    Turret(usize),
    Wall(usize),
    Extractor(usize),
}

// ============================================================================
// Enemies
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnemyMode {
    Pathing,
    /// Meleeing the structure with this id
    AttackingObstacle(EntityId),
    Dead,
}

/// Damage-over-time status. A new application replaces the old one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Burn {
    pub remaining: f32,
    pub dps: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Enemy {
    pub id: EntityId,
    pub kind: EnemyKind,
    pub position: Vec2,
    /// Heading in radians
    pub heading: f32,
    pub health: f32,
    pub max_health: f32,
    /// Base speed after wave scaling, world units per second
    pub speed: f32,
    pub path: Vec<CellCoord>,
    /// Index of the next waypoint in `path`
    pub path_index: usize,
    pub mode: EnemyMode,
    pub reached_nexus: bool,
    pub spawn_protection: f32,
    pub burn: Option<Burn>,
    /// Strongest slow currently applied (1.0 = none), restamped every tick
    pub slow_multiplier: f32,
    pub attack_cooldown: f32,
    /// Healer/summoner ability timer
    pub ability_cooldown: f32,
    pub repath_cooldown: f32,
}

impl Enemy {
    pub fn new(id: EntityId, kind: EnemyKind, position: Vec2, health_scale: f32, speed_scale: f32) -> Self {
        let archetype = kind.archetype();
        let health = archetype.health * health_scale.max(0.01);
        let ability_cooldown = match archetype.role {
            archetypes::EnemyRole::Healer { interval, .. } => interval,
            archetypes::EnemyRole::Summoner { interval, .. } => interval,
            _ => 0.0,
        };
        Self {
            id,
            kind,
            position,
            heading: 0.0,
            health,
            max_health: health,
            speed: archetype.speed * speed_scale.max(0.01),
            path: Vec::new(),
            path_index: 0,
            mode: EnemyMode::Pathing,
            reached_nexus: false,
            spawn_protection: SPAWN_PROTECTION,
            burn: None,
            slow_multiplier: 1.0,
            attack_cooldown: 0.0,
            ability_cooldown,
            repath_cooldown: 0.0,
        }
    }

    #[inline]
    pub fn archetype(&self) -> &'static EnemyArchetype {
        self.kind.archetype()
    }

    #[inline]
    pub fn is_alive(&self) -> bool {
        self.mode != EnemyMode::Dead
    }

    #[inline]
    pub fn is_flying(&self) -> bool {
        self.archetype().movement == Movement::Flying
    }

    #[inline]
    pub fn radius(&self) -> f32 {
        self.archetype().radius
    }

    #[inline]
    pub fn is_protected(&self) -> bool {
        self.spawn_protection > 0.0
    }

    /// Speed after slow
    pub fn current_speed(&self) -> f32 {
        self.speed * self.slow_multiplier
    }

    pub fn heading_vec(&self) -> Vec2 {
        Vec2::from_angle(self.heading)
    }

    /// Next waypoint, if the path is not exhausted
    pub fn next_waypoint(&self) -> Option<CellCoord> {
        self.path.get(self.path_index).copied()
    }

    pub fn set_path(&mut self, path: Vec<CellCoord>) {
        self.path = path;
        // The first cell is where the enemy already stands
        self.path_index = if self.path.len() > 1 { 1 } else { 0 };
    }
}

// ============================================================================
// Projectiles
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectileKind {
    Kinetic,
    /// Laser/railgun visual
    Beam,
    /// Tesla hop visual
    Arc,
    /// Flamethrower particle visual
    Flame,
}

#[derive(Debug, Clone)]
pub struct Projectile {
    pub id: EntityId,
    pub kind: ProjectileKind,
    pub source: TurretKind,
    pub position: Vec2,
    pub velocity: Vec2,
    /// Far endpoint for beam/arc visuals, equal to `position` otherwise
    pub end: Vec2,
    pub damage: f32,
    pub aoe_radius: Option<f32>,
    pub penetrating: bool,
    pub hits_air: bool,
    pub burn: Option<Burn>,
    pub ttl: Option<f32>,
    /// Enemies already hit (penetrating projectiles only)
    pub hit: SmallVec<[EntityId; 8]>,
    pub alive: bool,
}

impl Projectile {
    pub fn kinetic(id: EntityId, source: TurretKind, position: Vec2, velocity: Vec2, damage: f32) -> Self {
        Self {
            id,
            kind: ProjectileKind::Kinetic,
            source,
            position,
            velocity,
            end: position,
            damage,
            aoe_radius: None,
            penetrating: false,
            hits_air: true,
            burn: None,
            ttl: None,
            hit: SmallVec::new(),
            alive: true,
        }
    }

    /// Cosmetic projectile that never collides
    pub fn visual(
        id: EntityId,
        kind: ProjectileKind,
        source: TurretKind,
        from: Vec2,
        to: Vec2,
        velocity: Vec2,
        ttl: f32,
    ) -> Self {
        Self {
            id,
            kind,
            source,
            position: from,
            velocity,
            end: to,
            damage: 0.0,
            aoe_radius: None,
            penetrating: false,
            hits_air: false,
            burn: None,
            ttl: Some(ttl),
            hit: SmallVec::new(),
            alive: true,
        }
    }

    #[inline]
    pub fn is_visual(&self) -> bool {
        self.kind != ProjectileKind::Kinetic
    }
}

// ============================================================================
// Nexus and effects
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Nexus {
    pub cell: CellCoord,
    pub position: Vec2,
    pub health: f32,
    pub max_health: f32,
}

impl Nexus {
    pub fn new(cell: CellCoord, position: Vec2) -> Self {
        Self {
            cell,
            position,
            health: MAX_HEALTH,
            max_health: MAX_HEALTH,
        }
    }

    #[inline]
    pub fn is_destroyed(&self) -> bool {
        self.health <= 0.0
    }
}

/// One-shot visual event, queued during a tick and drained by the snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Effect {
    Explosion { position: Vec2, radius: f32 },
    EnemyDeath { id: EntityId, kind: EnemyKind, position: Vec2 },
    Shockwave { position: Vec2, radius: f32 },
    StructureDestroyed { id: EntityId, kind: StructureKind, cell: CellCoord },
    NexusHit { damage: f32, health: f32 },
    WaveStarted { wave: u32 },
    WaveCompleted { wave: u32 },
    GameOver { wave: u32, elapsed: f32 },
}

// ============================================================================
// Room state
// ============================================================================

/// Complete simulation state of one room
#[derive(Debug, Clone)]
pub struct GameState {
    pub tick: u64,
    /// Simulated seconds since room creation
    pub elapsed: f32,
    pub grid: Grid,
    pub nexus: Nexus,
    pub resources: ResourceBundle,
    pub turrets: Vec<Turret>,
    pub walls: Vec<Wall>,
    pub extractors: Vec<Extractor>,
    pub enemies: Vec<Enemy>,
    pub projectiles: Vec<Projectile>,
    /// Append-only between snapshots
    pub effects: Vec<Effect>,
    /// Set when occupancy changed; every ground path is recomputed next tick
    pub paths_dirty: bool,
    pub auto_drain_extractors: bool,
    pub game_over: bool,
    pub rng: StdRng,
    spawn_points: Vec<CellCoord>,
    next_entity_id: EntityId,
}

impl GameState {
    pub fn new(config: &RoomConfig) -> Self {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let grid = Grid::generate(config.width, config.height, &mut rng);
        let nexus = Nexus::new(grid.nexus(), grid.cell_center(grid.nexus()));
        let spawn_points = grid.edge_cells();

        Self {
            tick: 0,
            elapsed: 0.0,
            grid,
            nexus,
            resources: config.starting_resources,
            turrets: Vec::new(),
            walls: Vec::new(),
            extractors: Vec::new(),
            enemies: Vec::new(),
            projectiles: Vec::new(),
            effects: Vec::new(),
            paths_dirty: false,
            auto_drain_extractors: config.auto_drain_extractors,
            game_over: false,
            rng,
            spawn_points,
            next_entity_id: 1,
        }
    }

    /// Generate a new unique entity ID
    pub fn next_entity_id(&mut self) -> EntityId {
        let id = self.next_entity_id;
        self.next_entity_id += 1;
        id
    }

    pub fn push_effect(&mut self, effect: Effect) {
        self.effects.push(effect);
    }

    /// Take every queued effect, leaving the queue empty
    pub fn drain_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    /// World-space center of a random border spawn cell
    pub fn random_spawn_position(&mut self) -> Vec2 {
        if self.spawn_points.is_empty() {
            return self.grid.cell_center(CellCoord::new(0, 0));
        }
        let cell = self.spawn_points[self.rng.gen_range(0..self.spawn_points.len())];
        self.grid.cell_center(cell)
    }

    /// Shortest path from a world position to the Nexus, empty when blocked
    pub fn path_to_nexus(&self, from: Vec2) -> Vec<CellCoord> {
        self.grid
            .world_to_cell(self.grid.clamp_world(from))
            .and_then(|start| self.grid.find_path(start, self.nexus.cell))
            .unwrap_or_default()
    }

    /// Create an enemy and plan its route
    pub fn spawn_enemy(&mut self, kind: EnemyKind, position: Vec2, health_scale: f32, speed_scale: f32) -> EntityId {
        let id = self.next_entity_id();
        let position = self.grid.clamp_world(position);
        let mut enemy = Enemy::new(id, kind, position, health_scale, speed_scale);
        enemy.heading = (self.nexus.position - position).angle();
        if !enemy.is_flying() {
            enemy.set_path(self.path_to_nexus(position));
        }
        self.enemies.push(enemy);
        id
    }

    pub fn add_projectile(&mut self, mut projectile: Projectile) -> EntityId {
        let id = self.next_entity_id();
        projectile.id = id;
        self.projectiles.push(projectile);
        id
    }

    pub fn alive_enemy_count(&self) -> usize {
        self.enemies.iter().filter(|e| e.is_alive()).count()
    }

    /// Structure covering a cell
    pub fn structure_at(&self, cell: CellCoord) -> Option<StructureRef> {
        if let Some(i) = self.turrets.iter().position(|t| t.occupies(cell)) {
            return Some(StructureRef::Turret(i));
        }
        if let Some(i) = self.walls.iter().position(|w| w.cell == cell) {
            return Some(StructureRef::Wall(i));
        }
        self.extractors
            .iter()
            .position(|x| x.cell == cell)
            .map(StructureRef::Extractor)
    }

    /// Position of an attackable structure (turret or wall) by id
    pub fn obstacle_position(&self, id: EntityId) -> Option<Vec2> {
        self.turrets
            .iter()
            .find(|t| t.id == id && t.is_alive())
            .map(|t| t.position)
            .or_else(|| {
                self.walls
                    .iter()
                    .find(|w| w.id == id && w.is_alive())
                    .map(|w| w.position)
            })
    }

    /// Damage a turret or wall by id. Returns false if it no longer exists.
    pub fn damage_obstacle(&mut self, id: EntityId, amount: f32) -> bool {
        if let Some(turret) = self.turrets.iter_mut().find(|t| t.id == id && t.is_alive()) {
            turret.health -= amount;
            return true;
        }
        if let Some(wall) = self.walls.iter_mut().find(|w| w.id == id && w.is_alive()) {
            wall.health -= amount;
            return true;
        }
        false
    }

    /// Nearest live turret or wall within `radius` of `from`
    pub fn nearest_obstacle(&self, from: Vec2, radius: f32) -> Option<(EntityId, Vec2)> {
        let radius_sq = radius * radius;
        let turrets = self
            .turrets
            .iter()
            .filter(|t| t.is_alive())
            .map(|t| (t.id, t.position));
        let walls = self
            .walls
            .iter()
            .filter(|w| w.is_alive())
            .map(|w| (w.id, w.position));

        turrets
            .chain(walls)
            .map(|(id, pos)| (id, pos, from.distance_sq_to(pos)))
            .filter(|&(_, _, d)| d <= radius_sq)
            .min_by(|a, b| a.2.total_cmp(&b.2))
            .map(|(id, pos, _)| (id, pos))
    }

    /// Apply Nexus damage and emit the hit effect
    pub fn damage_nexus(&mut self, amount: f32) {
        self.nexus.health = (self.nexus.health - amount).max(0.0);
        let health = self.nexus.health;
        self.push_effect(Effect::NexusHit {
            damage: amount,
            health,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_state() -> GameState {
        GameState::new(&RoomConfig::default().with_seed(1))
    }

    #[test]
    fn test_bundle_try_spend_is_atomic() {
        let mut pool = ResourceBundle::new(100, 5, 0);
        assert!(!pool.try_spend(ResourceBundle::new(50, 10, 0)));
        assert_eq!(pool, ResourceBundle::new(100, 5, 0));
        assert!(pool.try_spend(ResourceBundle::new(50, 5, 0)));
        assert_eq!(pool, ResourceBundle::new(50, 0, 0));
    }

    #[test]
    fn test_bundle_scaled_floor() {
        let cost = ResourceBundle::new(100, 33, 1);
        assert_eq!(cost.scaled_floor(0.75), ResourceBundle::new(75, 24, 0));
    }

    #[test]
    fn test_bundle_add_kind() {
        let mut pool = ResourceBundle::ZERO;
        pool.add_kind(ResourceKind::Crystal, 3);
        assert_eq!(pool.get(ResourceKind::Crystal), 3);
        assert!(!pool.is_zero());
    }

    #[test]
    fn test_footprint_cells() {
        let anchor = CellCoord::new(5, 5);
        assert_eq!(footprint_cells(anchor, 1).as_slice(), &[anchor]);
        let big = footprint_cells(anchor, 3);
        assert_eq!(big.len(), 9);
        assert!(big.contains(&CellCoord::new(4, 4)));
        assert!(big.contains(&CellCoord::new(6, 6)));
    }

    #[test]
    fn test_entity_ids_are_unique() {
        let mut state = test_state();
        let a = state.next_entity_id();
        let b = state.next_entity_id();
        assert_ne!(a, b);
    }

    #[test]
    fn test_spawn_enemy_plans_path_to_nexus() {
        let mut state = test_state();
        let pos = state.grid.cell_center(CellCoord::new(0, 1));
        let id = state.spawn_enemy(EnemyKind::Grunt, pos, 1.0, 1.0);
        let enemy = state.enemies.iter().find(|e| e.id == id).unwrap();
        assert_eq!(enemy.path.last(), Some(&state.nexus.cell));
        assert!(enemy.is_protected());
        assert_eq!(enemy.mode, EnemyMode::Pathing);
    }

    #[test]
    fn test_flying_enemy_has_no_path() {
        let mut state = test_state();
        let pos = state.random_spawn_position();
        state.spawn_enemy(EnemyKind::Flyer, pos, 1.0, 1.0);
        assert!(state.enemies[0].path.is_empty());
    }

    #[test]
    fn test_enemy_scaling() {
        let enemy = Enemy::new(1, EnemyKind::Grunt, Vec2::ZERO, 1.5, 1.1);
        assert!((enemy.max_health - 90.0).abs() < 1e-3);
        assert!((enemy.speed - 55.0).abs() < 1e-3);
    }

    #[test]
    fn test_nexus_damage_emits_effect() {
        let mut state = test_state();
        state.damage_nexus(100.0);
        assert_eq!(state.nexus.health, 900.0);
        assert_eq!(
            state.drain_effects(),
            vec![Effect::NexusHit {
                damage: 100.0,
                health: 900.0
            }]
        );
        assert!(state.effects.is_empty());
    }
}

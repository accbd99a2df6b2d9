//! Structure lifecycle: placement, selling, upgrades, destruction
//!
//! Every action validates first and mutates only after all checks pass, so a
//! rejected request leaves the grid, the pool and the entity collections
//! exactly as they were.

use tracing::debug;

use crate::game::archetypes::{self, StructureKind};
use crate::game::constants::economy::SELL_REFUND_RATIO;
use crate::game::grid::{CellCoord, CellState};
use crate::game::state::{
    footprint_cells, Effect, EntityId, Extractor, GameState, PlayerId, ResourceBundle,
    StructureRef, Turret, Wall,
};

/// Rejected player action. No state was mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    #[error("Cell is out of bounds")]
    OutOfBounds,
    #[error("Cell cannot be built on")]
    NotBuildable,
    #[error("Cell is already occupied")]
    Occupied,
    #[error("Extractors must be placed on a resource cell")]
    RequiresResource,
    #[error("Not enough resources")]
    InsufficientResources,
    #[error("No structure at that cell")]
    NoStructure,
    #[error("Only the owner can do that")]
    NotOwner,
    #[error("Structure is already at max level")]
    MaxLevel,
    #[error("Game is over")]
    GameOver,
}

impl ActionError {
    /// Stable reason code for clients
    pub fn code(&self) -> &'static str {
        match self {
            ActionError::OutOfBounds => "out_of_bounds",
            ActionError::NotBuildable => "not_buildable",
            ActionError::Occupied => "occupied",
            ActionError::RequiresResource => "requires_resource",
            ActionError::InsufficientResources => "insufficient_resources",
            ActionError::NoStructure => "no_structure",
            ActionError::NotOwner => "not_owner",
            ActionError::MaxLevel => "max_level",
            ActionError::GameOver => "game_over",
        }
    }
}

/// Result of a successful sell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SellOutcome {
    pub kind: StructureKind,
    pub refund: ResourceBundle,
}

/// Check whether `kind` could be placed with its footprint at `cell`
pub fn can_place(state: &GameState, cell: CellCoord, kind: StructureKind) -> Result<(), ActionError> {
    let cells = footprint_cells(cell, kind.footprint());

    if cells.iter().any(|c| !state.grid.in_bounds(*c)) {
        return Err(ActionError::OutOfBounds);
    }
    if cells
        .iter()
        .any(|c| state.grid.cell_state(*c) == Some(CellState::Occupied))
    {
        return Err(ActionError::Occupied);
    }
    if cells.iter().any(|c| !state.grid.is_buildable(*c)) {
        return Err(ActionError::NotBuildable);
    }
    if kind == StructureKind::Extractor && state.grid.resource_at(cell).is_none() {
        return Err(ActionError::RequiresResource);
    }
    Ok(())
}

/// Place a structure, paying its cost from the room pool
pub fn place(
    state: &mut GameState,
    cell: CellCoord,
    kind: StructureKind,
    actor: PlayerId,
) -> Result<EntityId, ActionError> {
    if state.game_over {
        return Err(ActionError::GameOver);
    }
    can_place(state, cell, kind)?;
    let resource = state.grid.resource_at(cell);
    if !state.resources.try_spend(kind.cost()) {
        return Err(ActionError::InsufficientResources);
    }

    for c in footprint_cells(cell, kind.footprint()) {
        // Validated above, cannot fail
        let _ = state.grid.occupy(c);
    }

    let id = state.next_entity_id();
    let position = state.grid.cell_center(cell);
    match kind {
        StructureKind::Turret(turret_kind) => {
            state
                .turrets
                .push(Turret::new(id, turret_kind, cell, position, actor));
        }
        StructureKind::Wall => {
            state.walls.push(Wall::new(id, cell, position, actor));
        }
        StructureKind::Extractor => {
            if let Some(resource) = resource {
                state
                    .extractors
                    .push(Extractor::new(id, cell, position, resource, actor));
            }
        }
    }
    state.paths_dirty = true;

    debug!("Placed {:?} at ({}, {}) as entity {}", kind, cell.x, cell.y, id);
    Ok(id)
}

/// Sell the structure covering `cell` for a partial refund
pub fn sell(state: &mut GameState, cell: CellCoord, actor: PlayerId) -> Result<SellOutcome, ActionError> {
    if state.game_over {
        return Err(ActionError::GameOver);
    }
    if !state.grid.in_bounds(cell) {
        return Err(ActionError::OutOfBounds);
    }
    let found = state.structure_at(cell).ok_or(ActionError::NoStructure)?;

    let owner = match found {
        StructureRef::Turret(i) => state.turrets[i].owner,
        StructureRef::Wall(i) => state.walls[i].owner,
        StructureRef::Extractor(i) => state.extractors[i].owner,
    };
    if owner != actor {
        return Err(ActionError::NotOwner);
    }

    let (kind, invested, cells) = match found {
        StructureRef::Turret(i) => {
            let turret = state.turrets.remove(i);
            (StructureKind::Turret(turret.kind), turret.invested, turret.cells())
        }
        StructureRef::Wall(i) => {
            let wall = state.walls.remove(i);
            (StructureKind::Wall, wall.invested, footprint_cells(wall.cell, 1))
        }
        StructureRef::Extractor(i) => {
            let extractor = state.extractors.remove(i);
            // Whatever is stored goes back to the pool
            state
                .resources
                .add_kind(extractor.resource, extractor.stored.floor() as u32);
            (StructureKind::Extractor, extractor.invested, footprint_cells(extractor.cell, 1))
        }
    };

    for c in cells {
        state.grid.vacate(c);
    }
    let refund = invested.scaled_floor(SELL_REFUND_RATIO);
    state.resources.add(refund);
    state.paths_dirty = true;

    debug!("Sold {:?} at ({}, {}), refund {:?}", kind, cell.x, cell.y, refund);
    Ok(SellOutcome { kind, refund })
}

/// Upgrade the structure covering `cell` by one level. Returns the new level.
pub fn upgrade(state: &mut GameState, cell: CellCoord, _actor: PlayerId) -> Result<u8, ActionError> {
    if state.game_over {
        return Err(ActionError::GameOver);
    }
    if !state.grid.in_bounds(cell) {
        return Err(ActionError::OutOfBounds);
    }
    let found = state.structure_at(cell).ok_or(ActionError::NoStructure)?;

    let (kind, level) = match found {
        StructureRef::Turret(i) => (StructureKind::Turret(state.turrets[i].kind), state.turrets[i].level),
        StructureRef::Wall(i) => (StructureKind::Wall, state.walls[i].level),
        StructureRef::Extractor(i) => (StructureKind::Extractor, state.extractors[i].level),
    };
    if level >= kind.max_level() {
        return Err(ActionError::MaxLevel);
    }
    let cost = archetypes::upgrade_cost(kind.cost(), level);
    if !state.resources.try_spend(cost) {
        return Err(ActionError::InsufficientResources);
    }

    let new_level = level + 1;
    match found {
        StructureRef::Turret(i) => {
            let turret = &mut state.turrets[i];
            let old_max = turret.max_health();
            turret.level = new_level;
            turret.health += turret.max_health() - old_max;
            turret.invested.add(cost);
        }
        StructureRef::Wall(i) => {
            let wall = &mut state.walls[i];
            let old_max = wall.max_health();
            wall.level = new_level;
            wall.health += wall.max_health() - old_max;
            wall.invested.add(cost);
        }
        StructureRef::Extractor(i) => {
            let extractor = &mut state.extractors[i];
            extractor.level = new_level;
            extractor.invested.add(cost);
        }
    }

    debug!("Upgraded {:?} at ({}, {}) to level {}", kind, cell.x, cell.y, new_level);
    Ok(new_level)
}

/// Move an extractor's whole stored units into the pool. Returns the amount moved.
pub fn collect_extractor(state: &mut GameState, cell: CellCoord) -> Result<u32, ActionError> {
    if state.game_over {
        return Err(ActionError::GameOver);
    }
    if !state.grid.in_bounds(cell) {
        return Err(ActionError::OutOfBounds);
    }
    let Some(StructureRef::Extractor(i)) = state.structure_at(cell) else {
        return Err(ActionError::NoStructure);
    };
    let extractor = &mut state.extractors[i];
    let amount = extractor.stored.floor();
    extractor.stored -= amount;
    let resource = extractor.resource;
    state.resources.add_kind(resource, amount as u32);
    Ok(amount as u32)
}

/// Remove turrets and walls whose health reached zero. No refund.
/// Returns the number removed.
pub fn remove_destroyed(state: &mut GameState) -> usize {
    let mut destroyed: Vec<(EntityId, StructureKind, CellCoord, Vec<CellCoord>)> = Vec::new();

    state.turrets.retain(|t| {
        if t.is_alive() {
            return true;
        }
        destroyed.push((t.id, StructureKind::Turret(t.kind), t.anchor, t.cells().to_vec()));
        false
    });
    state.walls.retain(|w| {
        if w.is_alive() {
            return true;
        }
        destroyed.push((w.id, StructureKind::Wall, w.cell, vec![w.cell]));
        false
    });

    let count = destroyed.len();
    for (id, kind, cell, cells) in destroyed {
        for c in cells {
            state.grid.vacate(c);
        }
        state.push_effect(Effect::StructureDestroyed { id, kind, cell });
        debug!("{:?} {} destroyed at ({}, {})", kind, id, cell.x, cell.y);
    }
    if count > 0 {
        state.paths_dirty = true;
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RoomConfig;
    use crate::game::archetypes::TurretKind;
    use crate::game::grid::ResourceKind;
    use uuid::Uuid;

    const BLASTER: StructureKind = StructureKind::Turret(TurretKind::Blaster);

    fn test_state() -> GameState {
        let mut state = GameState::new(&RoomConfig::default().with_seed(3));
        state.resources = ResourceBundle::new(1000, 1000, 1000);
        state
    }

    /// A plain buildable cell away from the Nexus
    fn free_cell(state: &mut GameState) -> CellCoord {
        let cell = CellCoord::new(2, 2);
        state.grid.set_cell_state(cell, CellState::Empty).unwrap();
        cell
    }

    #[test]
    fn test_place_deducts_cost_and_occupies() {
        let mut state = test_state();
        let cell = free_cell(&mut state);
        let player = Uuid::new_v4();

        let id = place(&mut state, cell, BLASTER, player).unwrap();
        assert_eq!(state.resources.iron, 900);
        assert_eq!(state.grid.cell_state(cell), Some(CellState::Occupied));
        assert_eq!(state.turrets.len(), 1);
        assert_eq!(state.turrets[0].id, id);
        assert!(state.paths_dirty);

        assert_eq!(place(&mut state, cell, StructureKind::Wall, player), Err(ActionError::Occupied));
    }

    #[test]
    fn test_unaffordable_place_mutates_nothing() {
        let mut state = test_state();
        state.resources = ResourceBundle::new(99, 0, 0);
        let cell = free_cell(&mut state);
        let before = state.grid.cell_state(cell);

        let result = place(&mut state, cell, BLASTER, Uuid::new_v4());
        assert_eq!(result, Err(ActionError::InsufficientResources));
        assert_eq!(state.resources, ResourceBundle::new(99, 0, 0));
        assert_eq!(state.grid.cell_state(cell), before);
        assert!(state.turrets.is_empty());
        assert!(!state.paths_dirty);
    }

    #[test]
    fn test_place_rejections() {
        let mut state = test_state();
        let player = Uuid::new_v4();
        assert_eq!(
            place(&mut state, CellCoord::new(-1, 0), BLASTER, player),
            Err(ActionError::OutOfBounds)
        );
        assert_eq!(
            place(&mut state, CellCoord::new(0, 5), BLASTER, player),
            Err(ActionError::NotBuildable)
        );
        let nexus = state.nexus.cell;
        assert_eq!(place(&mut state, nexus, BLASTER, player), Err(ActionError::NotBuildable));
        let cell = free_cell(&mut state);
        assert_eq!(
            place(&mut state, cell, StructureKind::Extractor, player),
            Err(ActionError::RequiresResource)
        );
    }

    #[test]
    fn test_sell_refunds_three_quarters() {
        let mut state = test_state();
        state.resources = ResourceBundle::new(100, 0, 0);
        let cell = free_cell(&mut state);
        let player = Uuid::new_v4();

        place(&mut state, cell, BLASTER, player).unwrap();
        assert_eq!(state.resources.iron, 0);

        let outcome = sell(&mut state, cell, player).unwrap();
        assert_eq!(outcome.refund, ResourceBundle::new(75, 0, 0));
        assert_eq!(state.resources.iron, 75);
        assert_eq!(state.grid.cell_state(cell), Some(CellState::Empty));
        assert!(state.turrets.is_empty());
    }

    #[test]
    fn test_sell_restricted_to_owner() {
        let mut state = test_state();
        let cell = free_cell(&mut state);
        let owner = Uuid::new_v4();
        place(&mut state, cell, StructureKind::Wall, owner).unwrap();
        assert_eq!(sell(&mut state, cell, Uuid::new_v4()), Err(ActionError::NotOwner));
        assert_eq!(state.walls.len(), 1);
    }

    #[test]
    fn test_sell_restores_resource_cell() {
        let mut state = test_state();
        let cell = CellCoord::new(3, 3);
        state
            .grid
            .set_cell_state(cell, CellState::Resource(ResourceKind::Crystal))
            .unwrap();
        let player = Uuid::new_v4();

        place(&mut state, cell, StructureKind::Extractor, player).unwrap();
        assert_eq!(state.extractors[0].resource, ResourceKind::Crystal);
        sell(&mut state, cell, player).unwrap();
        assert_eq!(
            state.grid.cell_state(cell),
            Some(CellState::Resource(ResourceKind::Crystal))
        );
    }

    #[test]
    fn test_large_turret_occupies_footprint() {
        let mut state = test_state();
        let player = Uuid::new_v4();
        let anchor = CellCoord::new(4, 4);
        for c in footprint_cells(anchor, 3) {
            let _ = state.grid.set_cell_state(c, CellState::Empty);
        }
        place(&mut state, anchor, StructureKind::Turret(TurretKind::Bastion), player).unwrap();
        for c in footprint_cells(anchor, 3) {
            assert_eq!(state.grid.cell_state(c), Some(CellState::Occupied));
        }
        // Selling from any covered cell releases all of them
        sell(&mut state, CellCoord::new(5, 5), player).unwrap();
        for c in footprint_cells(anchor, 3) {
            assert_eq!(state.grid.cell_state(c), Some(CellState::Empty));
        }
    }

    #[test]
    fn test_upgrade_until_max() {
        let mut state = test_state();
        let cell = free_cell(&mut state);
        let player = Uuid::new_v4();
        place(&mut state, cell, BLASTER, player).unwrap();

        let iron_before = state.resources.iron;
        assert_eq!(upgrade(&mut state, cell, player), Ok(2));
        // floor(100 × 0.75)
        assert_eq!(state.resources.iron, iron_before - 75);
        assert_eq!(state.turrets[0].invested.iron, 175);
        assert!((state.turrets[0].health - 250.0).abs() < 1e-3);

        assert_eq!(upgrade(&mut state, cell, player), Ok(3));
        assert_eq!(upgrade(&mut state, cell, player), Ok(4));
        assert_eq!(upgrade(&mut state, cell, player), Ok(5));
        assert_eq!(upgrade(&mut state, cell, player), Err(ActionError::MaxLevel));
    }

    #[test]
    fn test_unaffordable_upgrade_mutates_nothing() {
        let mut state = test_state();
        let cell = free_cell(&mut state);
        let player = Uuid::new_v4();
        place(&mut state, cell, BLASTER, player).unwrap();
        state.resources = ResourceBundle::new(10, 0, 0);

        assert_eq!(upgrade(&mut state, cell, player), Err(ActionError::InsufficientResources));
        assert_eq!(state.turrets[0].level, 1);
        assert_eq!(state.resources.iron, 10);
    }

    #[test]
    fn test_collect_extractor() {
        let mut state = test_state();
        let cell = CellCoord::new(3, 3);
        state
            .grid
            .set_cell_state(cell, CellState::Resource(ResourceKind::Copper))
            .unwrap();
        let player = Uuid::new_v4();
        place(&mut state, cell, StructureKind::Extractor, player).unwrap();
        state.extractors[0].stored = 7.6;
        let copper = state.resources.copper;

        assert_eq!(collect_extractor(&mut state, cell), Ok(7));
        assert_eq!(state.resources.copper, copper + 7);
        assert!((state.extractors[0].stored - 0.6).abs() < 1e-4);
        let empty = free_cell(&mut state);
        assert_eq!(collect_extractor(&mut state, empty), Err(ActionError::NoStructure));
    }

    #[test]
    fn test_remove_destroyed_vacates_without_refund() {
        let mut state = test_state();
        let cell = free_cell(&mut state);
        place(&mut state, cell, StructureKind::Wall, Uuid::new_v4()).unwrap();
        state.paths_dirty = false;
        let pool = state.resources;
        state.walls[0].health = 0.0;

        assert_eq!(remove_destroyed(&mut state), 1);
        assert_eq!(state.grid.cell_state(cell), Some(CellState::Empty));
        assert_eq!(state.resources, pool);
        assert!(state.paths_dirty);
        assert!(matches!(
            state.effects.last(),
            Some(Effect::StructureDestroyed { kind: StructureKind::Wall, .. })
        ));
    }

    #[test]
    fn test_actions_rejected_after_game_over() {
        let mut state = test_state();
        let cell = free_cell(&mut state);
        state.game_over = true;
        assert_eq!(
            place(&mut state, cell, BLASTER, Uuid::new_v4()),
            Err(ActionError::GameOver)
        );
        assert_eq!(ActionError::GameOver.code(), "game_over");
    }
}

//! Extractor yield

use crate::game::state::GameState;

/// Accumulate extractor yield into each store, then drain whole units into
/// the pool when auto-drain is on. Returns the units drained.
pub fn update_extractors(state: &mut GameState, dt: f32) -> u32 {
    let mut drained = 0;
    for extractor in state.extractors.iter_mut() {
        extractor.stored = (extractor.stored + extractor.rate() * dt).min(extractor.capacity());
        if state.auto_drain_extractors && extractor.stored >= 1.0 {
            let whole = extractor.stored.floor();
            extractor.stored -= whole;
            state.resources.add_kind(extractor.resource, whole as u32);
            drained += whole as u32;
        }
    }
    drained
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RoomConfig;
    use crate::game::archetypes::StructureKind;
    use crate::game::buildings;
    use crate::game::grid::{CellCoord, CellState, ResourceKind};
    use crate::game::state::ResourceBundle;
    use uuid::Uuid;

    fn state_with_extractor(auto_drain: bool) -> GameState {
        let mut state = GameState::new(&RoomConfig {
            seed: Some(2),
            auto_drain_extractors: auto_drain,
            ..Default::default()
        });
        state.resources = ResourceBundle::new(1000, 1000, 0);
        let cell = CellCoord::new(2, 2);
        state
            .grid
            .set_cell_state(cell, CellState::Resource(ResourceKind::Crystal))
            .unwrap();
        buildings::place(&mut state, cell, StructureKind::Extractor, Uuid::new_v4()).unwrap();
        state
    }

    #[test]
    fn test_auto_drain_moves_whole_units() {
        let mut state = state_with_extractor(true);
        // 1.5/s for 1s
        for _ in 0..20 {
            update_extractors(&mut state, 0.05);
        }
        assert_eq!(state.resources.crystal, 1);
        assert!((state.extractors[0].stored - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_store_is_bounded_without_drain() {
        let mut state = state_with_extractor(false);
        update_extractors(&mut state, 1000.0);
        assert_eq!(state.extractors[0].stored, state.extractors[0].capacity());
        assert_eq!(state.resources.crystal, 0);
    }

    #[test]
    fn test_level_raises_rate() {
        let mut state = state_with_extractor(false);
        state.extractors[0].level = 3;
        update_extractors(&mut state, 1.0);
        assert!((state.extractors[0].stored - 3.0).abs() < 1e-4);
    }
}

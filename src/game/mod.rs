pub mod archetypes;
pub mod buildings;
pub mod constants;
pub mod game_loop;
pub mod grid;
pub mod performance;
pub mod state;
pub mod systems;

//! Occupancy grid and A* path planner
//!
//! The grid is the single owner of cell state for a room. All mutation goes
//! through validated accessors so the Nexus cell can never change and the
//! resource kind under a structure survives placement and removal.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use bitvec::prelude::*;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::game::constants::grid::{
    CELL_SIZE, RESOURCE_CLUSTERS, RESOURCE_CLUSTER_SIZE, RESOURCE_NEXUS_CLEARANCE,
};
use crate::util::vec2::Vec2;

/// Integer grid coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellCoord {
    pub x: i32,
    pub y: i32,
}

impl CellCoord {
    #[inline]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    #[inline]
    pub fn manhattan(&self, other: CellCoord) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }

    /// 4-directional neighbors (E, S, W, N), unchecked against bounds
    #[inline]
    pub fn neighbors(&self) -> [CellCoord; 4] {
        [
            CellCoord::new(self.x + 1, self.y),
            CellCoord::new(self.x, self.y + 1),
            CellCoord::new(self.x - 1, self.y),
            CellCoord::new(self.x, self.y - 1),
        ]
    }

    #[inline]
    pub fn offset(&self, dx: i32, dy: i32) -> CellCoord {
        CellCoord::new(self.x + dx, self.y + dy)
    }
}

/// Resource kinds found on the map and held in the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Iron,
    Copper,
    Crystal,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 3] = [
        ResourceKind::Iron,
        ResourceKind::Copper,
        ResourceKind::Crystal,
    ];
}

/// State of a single grid cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellState {
    Empty,
    Occupied,
    Resource(ResourceKind),
    Nexus,
    /// Outer ring: walkable, never buildable
    Border,
}

impl CellState {
    #[inline]
    pub fn is_walkable(&self) -> bool {
        !matches!(self, CellState::Occupied)
    }

    #[inline]
    pub fn is_buildable(&self) -> bool {
        matches!(self, CellState::Empty | CellState::Resource(_))
    }
}

/// Grid mutation errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GridError {
    #[error("Cell ({0}, {1}) is out of bounds")]
    OutOfBounds(i32, i32),
    #[error("The Nexus cell cannot change state")]
    NexusImmutable,
    #[error("A room has exactly one Nexus")]
    DuplicateNexus,
    #[error("Cell is not buildable")]
    NotBuildable,
}

/// Room occupancy grid
#[derive(Debug, Clone)]
pub struct Grid {
    width: u32,
    height: u32,
    cells: Vec<CellState>,
    /// Underlying resource per cell, kept while a structure sits on it
    resources: Vec<Option<ResourceKind>>,
    nexus: CellCoord,
}

impl Grid {
    /// Empty grid with a border ring and the Nexus at the center
    pub fn new(width: u32, height: u32) -> Self {
        let width = width.max(3);
        let height = height.max(3);
        let mut cells = vec![CellState::Empty; (width * height) as usize];
        for y in 0..height {
            for x in 0..width {
                if x == 0 || y == 0 || x == width - 1 || y == height - 1 {
                    cells[(y * width + x) as usize] = CellState::Border;
                }
            }
        }
        let nexus = CellCoord::new((width / 2) as i32, (height / 2) as i32);
        cells[(nexus.y as u32 * width + nexus.x as u32) as usize] = CellState::Nexus;

        Self {
            width,
            height,
            cells,
            resources: vec![None; (width * height) as usize],
            nexus,
        }
    }

    /// Grid with seeded resource clusters
    pub fn generate<R: Rng>(width: u32, height: u32, rng: &mut R) -> Self {
        let mut grid = Self::new(width, height);
        if grid.width < 5 || grid.height < 5 {
            return grid;
        }

        for _ in 0..RESOURCE_CLUSTERS {
            let kind = ResourceKind::ALL[rng.gen_range(0..ResourceKind::ALL.len())];
            let mut cell = CellCoord::new(
                rng.gen_range(1..grid.width as i32 - 1),
                rng.gen_range(1..grid.height as i32 - 1),
            );
            for _ in 0..RESOURCE_CLUSTER_SIZE {
                let near_nexus =
                    cell.manhattan(grid.nexus) <= RESOURCE_NEXUS_CLEARANCE as u32;
                if !near_nexus && grid.cell_state(cell) == Some(CellState::Empty) {
                    // Cannot fail: the cell is in bounds and not the Nexus
                    let _ = grid.set_cell_state(cell, CellState::Resource(kind));
                }
                let step = cell.neighbors()[rng.gen_range(0..4)];
                if grid.is_interior(step) {
                    cell = step;
                }
            }
        }

        grid
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn nexus(&self) -> CellCoord {
        self.nexus
    }

    #[inline]
    pub fn in_bounds(&self, cell: CellCoord) -> bool {
        cell.x >= 0 && cell.y >= 0 && (cell.x as u32) < self.width && (cell.y as u32) < self.height
    }

    fn is_interior(&self, cell: CellCoord) -> bool {
        cell.x > 0
            && cell.y > 0
            && (cell.x as u32) < self.width - 1
            && (cell.y as u32) < self.height - 1
    }

    #[inline]
    fn index(&self, cell: CellCoord) -> Option<usize> {
        if self.in_bounds(cell) {
            Some((cell.y as u32 * self.width + cell.x as u32) as usize)
        } else {
            None
        }
    }

    #[inline]
    fn coord(&self, index: usize) -> CellCoord {
        CellCoord::new(
            (index as u32 % self.width) as i32,
            (index as u32 / self.width) as i32,
        )
    }

    pub fn cell_state(&self, cell: CellCoord) -> Option<CellState> {
        self.index(cell).map(|i| self.cells[i])
    }

    /// Set a cell's state, keeping the resource map and Nexus invariant intact
    pub fn set_cell_state(&mut self, cell: CellCoord, state: CellState) -> Result<(), GridError> {
        let index = self
            .index(cell)
            .ok_or(GridError::OutOfBounds(cell.x, cell.y))?;
        if cell == self.nexus {
            return Err(GridError::NexusImmutable);
        }
        match state {
            CellState::Nexus => return Err(GridError::DuplicateNexus),
            CellState::Resource(kind) => self.resources[index] = Some(kind),
            CellState::Empty | CellState::Border => self.resources[index] = None,
            CellState::Occupied => {}
        }
        self.cells[index] = state;
        Ok(())
    }

    #[inline]
    pub fn is_walkable(&self, cell: CellCoord) -> bool {
        self.cell_state(cell).is_some_and(|s| s.is_walkable())
    }

    #[inline]
    pub fn is_buildable(&self, cell: CellCoord) -> bool {
        self.cell_state(cell).is_some_and(|s| s.is_buildable())
    }

    /// Resource kind under a cell (also while a structure covers it)
    pub fn resource_at(&self, cell: CellCoord) -> Option<ResourceKind> {
        self.index(cell).and_then(|i| self.resources[i])
    }

    /// Flip a buildable cell to Occupied
    pub fn occupy(&mut self, cell: CellCoord) -> Result<(), GridError> {
        let index = self
            .index(cell)
            .ok_or(GridError::OutOfBounds(cell.x, cell.y))?;
        if !self.cells[index].is_buildable() {
            return Err(GridError::NotBuildable);
        }
        self.cells[index] = CellState::Occupied;
        Ok(())
    }

    /// Restore an Occupied cell to its pre-placement state.
    /// Returns false if the cell was not Occupied.
    pub fn vacate(&mut self, cell: CellCoord) -> bool {
        let Some(index) = self.index(cell) else {
            return false;
        };
        if self.cells[index] != CellState::Occupied {
            return false;
        }
        self.cells[index] = match self.resources[index] {
            Some(kind) => CellState::Resource(kind),
            None => CellState::Empty,
        };
        true
    }

    /// World-space center of a cell
    #[inline]
    pub fn cell_center(&self, cell: CellCoord) -> Vec2 {
        Vec2::new(
            (cell.x as f32 + 0.5) * CELL_SIZE,
            (cell.y as f32 + 0.5) * CELL_SIZE,
        )
    }

    /// Cell containing a world-space point
    pub fn world_to_cell(&self, position: Vec2) -> Option<CellCoord> {
        if position.x < 0.0 || position.y < 0.0 {
            return None;
        }
        let cell = CellCoord::new(
            (position.x / CELL_SIZE) as i32,
            (position.y / CELL_SIZE) as i32,
        );
        self.in_bounds(cell).then_some(cell)
    }

    /// Whether a world-space point lies inside the room
    #[inline]
    pub fn contains_world(&self, position: Vec2) -> bool {
        position.x >= 0.0
            && position.y >= 0.0
            && position.x < self.width as f32 * CELL_SIZE
            && position.y < self.height as f32 * CELL_SIZE
    }

    /// Clamp a world-space point into the room
    pub fn clamp_world(&self, position: Vec2) -> Vec2 {
        let max_x = self.width as f32 * CELL_SIZE - 0.01;
        let max_y = self.height as f32 * CELL_SIZE - 0.01;
        Vec2::new(position.x.clamp(0.0, max_x), position.y.clamp(0.0, max_y))
    }

    /// Walkable border cells usable as spawn points
    pub fn edge_cells(&self) -> Vec<CellCoord> {
        (0..self.cells.len())
            .filter(|&i| self.cells[i] == CellState::Border)
            .map(|i| self.coord(i))
            .collect()
    }

    /// Count cells in a given state
    pub fn count(&self, state: CellState) -> usize {
        self.cells.iter().filter(|&&s| s == state).count()
    }

    /// Shortest 4-directional path from `start` to `goal`, both inclusive.
    ///
    /// The start cell is accepted even when it is not walkable, since an
    /// enemy may be standing on a freshly placed structure. Among equal
    /// f-scores the node enqueued first is expanded first, so exact cell
    /// sequences on ties are implementation-defined; only length is
    /// guaranteed optimal.
    pub fn find_path(&self, start: CellCoord, goal: CellCoord) -> Option<Vec<CellCoord>> {
        let start_index = self.index(start)?;
        let goal_index = self.index(goal)?;
        if !self.cells[goal_index].is_walkable() {
            return None;
        }
        if start_index == goal_index {
            return Some(vec![start]);
        }

        let len = self.cells.len();
        let mut g_score = vec![u32::MAX; len];
        let mut came_from = vec![usize::MAX; len];
        let mut closed = bitvec![0; len];
        let mut open = BinaryHeap::new();
        let mut seq: u64 = 0;

        g_score[start_index] = 0;
        open.push(OpenNode {
            f_score: start.manhattan(goal),
            seq,
            index: start_index,
        });

        while let Some(current) = open.pop() {
            if current.index == goal_index {
                return Some(self.reconstruct(&came_from, goal_index));
            }
            if closed[current.index] {
                continue;
            }
            closed.set(current.index, true);

            let current_cell = self.coord(current.index);
            let tentative_g = g_score[current.index] + 1;

            for neighbor in current_cell.neighbors() {
                let Some(n_index) = self.index(neighbor) else {
                    continue;
                };
                if closed[n_index] || !self.cells[n_index].is_walkable() {
                    continue;
                }
                if tentative_g < g_score[n_index] {
                    g_score[n_index] = tentative_g;
                    came_from[n_index] = current.index;
                    seq += 1;
                    open.push(OpenNode {
                        f_score: tentative_g + neighbor.manhattan(goal),
                        seq,
                        index: n_index,
                    });
                }
            }
        }

        None
    }

    fn reconstruct(&self, came_from: &[usize], goal_index: usize) -> Vec<CellCoord> {
        let mut path = vec![self.coord(goal_index)];
        let mut current = goal_index;
        while came_from[current] != usize::MAX {
            current = came_from[current];
            path.push(self.coord(current));
        }
        path.reverse();
        path
    }
}

/// Entry in the A* open set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OpenNode {
    f_score: u32,
    /// Insertion order, earlier wins among equal f-scores
    seq: u64,
    index: usize,
}

impl Ord for OpenNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: reverse both keys for min-first
        other
            .f_score
            .cmp(&self.f_score)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for OpenNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
